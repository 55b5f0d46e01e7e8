use chrono::TimeDelta;
use clap::Parser;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::fare::{
    BIKE_RATE_PER_HOUR, CAR_RATE_PER_HOUR, FREE_PARKING_MINUTES, FareSchedule,
    RECURRING_USER_DISCOUNT,
};
use crate::manager::RecurringPolicy;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Parking lot allocation and billing server", long_about = None)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(short = 'a', long, default_value_t = String::from("0.0.0.0"))]
    pub address: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = 8080)]
    pub port: u16,

    /// Number of car spots, numbered from 1
    #[arg(long, default_value_t = 3)]
    pub car_spots: u32,

    /// Number of bike spots, numbered after the car spots
    #[arg(long, default_value_t = 2)]
    pub bike_spots: u32,

    /// Timeout for a single repository call in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Hourly rate for cars
    #[arg(long, default_value_t = CAR_RATE_PER_HOUR)]
    pub car_rate: Decimal,

    /// Hourly rate for bikes
    #[arg(long, default_value_t = BIKE_RATE_PER_HOUR)]
    pub bike_rate: Decimal,

    /// Discount for returning vehicles, as a fraction
    #[arg(long, default_value_t = RECURRING_USER_DISCOUNT)]
    pub recurring_discount: Decimal,

    /// Visits up to this many minutes are free
    #[arg(long, default_value_t = FREE_PARKING_MINUTES)]
    pub free_minutes: i64,

    /// Only count completed visits when deciding whether a vehicle is recurring
    #[arg(long)]
    pub closed_visits_only: bool,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn fare_schedule(&self) -> FareSchedule {
        FareSchedule::new(
            self.car_rate,
            self.bike_rate,
            self.recurring_discount,
            TimeDelta::minutes(self.free_minutes),
        )
    }

    pub fn recurring_policy(&self) -> RecurringPolicy {
        if self.closed_visits_only {
            RecurringPolicy::ClosedVisitsOnly
        } else {
            RecurringPolicy::AnyPriorTicket
        }
    }
}
