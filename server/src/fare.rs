use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use shared::model::VehicleCategory;
use std::collections::HashMap;

use crate::error::FareError;

pub const CAR_RATE_PER_HOUR: Decimal = dec!(1.5);
pub const BIKE_RATE_PER_HOUR: Decimal = dec!(1.0);
pub const RECURRING_USER_DISCOUNT: Decimal = dec!(0.05);
pub const FREE_PARKING_MINUTES: i64 = 30;
/// Digits kept after the decimal point.
pub const SCALE: u32 = 2;

const MILLIS_PER_HOUR: Decimal = dec!(3600000);

/// Pricing parameters. Categories missing from `rates` cannot be billed.
#[derive(Debug, Clone, PartialEq)]
pub struct FareSchedule {
    rates: HashMap<VehicleCategory, Decimal>,
    recurring_discount: Decimal,
    free_period: TimeDelta,
}

impl FareSchedule {
    pub fn new(
        car_rate: Decimal,
        bike_rate: Decimal,
        recurring_discount: Decimal,
        free_period: TimeDelta,
    ) -> Self {
        let rates = HashMap::from([
            (VehicleCategory::Car, car_rate),
            (VehicleCategory::Bike, bike_rate),
        ]);
        FareSchedule {
            rates,
            recurring_discount,
            free_period,
        }
    }

    pub fn rate(&self, category: VehicleCategory) -> Option<Decimal> {
        self.rates.get(&category).copied()
    }
}

impl Default for FareSchedule {
    fn default() -> Self {
        FareSchedule::new(
            CAR_RATE_PER_HOUR,
            BIKE_RATE_PER_HOUR,
            RECURRING_USER_DISCOUNT,
            TimeDelta::minutes(FREE_PARKING_MINUTES),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct FareCalculator {
    schedule: FareSchedule,
}

impl FareCalculator {
    pub fn new(schedule: FareSchedule) -> Self {
        FareCalculator { schedule }
    }

    /// Price of a visit.
    ///
    /// Visits up to the free period cost nothing, whatever the category.
    /// Longer visits are billed per hour at the category rate, discounted for
    /// recurring vehicles, then rounded half-up to cents.
    pub fn compute_fare(
        &self,
        category: VehicleCategory,
        in_time: DateTime<Utc>,
        out_time: Option<DateTime<Utc>>,
        recurring: bool,
    ) -> Result<Decimal, FareError> {
        let out = match out_time {
            Some(out) if out >= in_time => out,
            _ => return Err(FareError::InvalidInterval { in_time, out_time }),
        };

        let elapsed = out - in_time;
        if elapsed <= self.schedule.free_period {
            return Ok(Decimal::ZERO);
        }

        let rate = self
            .schedule
            .rate(category)
            .ok_or(FareError::UnsupportedCategory(category))?;

        let hours = Decimal::from(elapsed.num_milliseconds()) / MILLIS_PER_HOUR;
        let mut price = hours * rate;
        if recurring {
            price *= Decimal::ONE - self.schedule.recurring_discount;
        }

        Ok(price.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
    }
}
