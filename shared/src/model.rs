use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// Kind of vehicle a spot is built for.
///
/// `Truck` is never offered at the entrance and has no rate; it only exists so
/// that a ticket carrying it can be represented and rejected by the fare
/// calculator instead of being silently mapped onto another category.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum VehicleCategory {
    Car,
    Bike,
    Truck,
}

impl VehicleCategory {
    /// Maps the entrance menu selection onto a category. Only the categories
    /// that can be parked are selectable.
    pub fn from_selection(selection: u8) -> Option<VehicleCategory> {
        match selection {
            1 => Some(VehicleCategory::Car),
            2 => Some(VehicleCategory::Bike),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "CAR",
            VehicleCategory::Bike => "BIKE",
            VehicleCategory::Truck => "TRUCK",
        }
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct SpotId(pub u32);

impl fmt::Display for SpotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct TicketId(pub u64);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Spot {
    pub id: SpotId,
    pub category: VehicleCategory,
    pub available: bool,
}

/// Snapshot of the spot a ticket was issued for, taken at entry.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ParkedSpot {
    pub id: SpotId,
    pub category: VehicleCategory,
}

/// A ticket that has not been persisted yet and therefore has no id.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NewTicket {
    pub spot: ParkedSpot,
    pub registration: String,
    pub in_time: DateTime<Utc>,
    pub recurring: bool,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Ticket {
    pub id: TicketId,
    pub spot: ParkedSpot,
    pub registration: String,
    pub in_time: DateTime<Utc>,
    pub out_time: Option<DateTime<Utc>>,
    pub price: Decimal,
    pub recurring: bool,
}

impl Ticket {
    pub fn from_new(id: TicketId, ticket: NewTicket) -> Self {
        Ticket {
            id,
            spot: ticket.spot,
            registration: ticket.registration,
            in_time: ticket.in_time,
            out_time: None,
            price: Decimal::ZERO,
            recurring: ticket.recurring,
        }
    }

    pub fn is_open(&self) -> bool {
        self.out_time.is_none()
    }

    /// Returns the closed form of this ticket. The receiver is left untouched
    /// so a failed persist never leaves a half-closed ticket around.
    pub fn closed(&self, out_time: DateTime<Utc>, price: Decimal) -> Ticket {
        Ticket {
            out_time: Some(out_time),
            price,
            ..self.clone()
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EntryReceipt {
    pub spot_id: SpotId,
    pub registration: String,
    pub in_time: DateTime<Utc>,
    pub recurring: bool,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExitReceipt {
    pub registration: String,
    pub in_time: DateTime<Utc>,
    pub out_time: DateTime<Utc>,
    pub price: Decimal,
}

/// Failure classes reported to a caller of the parking service.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    InvalidVehicleCategory,
    NoAvailableSpot,
    TicketNotFound,
    InvalidInterval,
    UnsupportedCategory,
    RepositoryFailure,
    InvalidRegistration,
    IllegalMessage,
}

impl ErrorKind {
    pub fn code(&self) -> u8 {
        match self {
            ErrorKind::InvalidVehicleCategory => 1,
            ErrorKind::NoAvailableSpot => 2,
            ErrorKind::TicketNotFound => 3,
            ErrorKind::InvalidInterval => 4,
            ErrorKind::UnsupportedCategory => 5,
            ErrorKind::RepositoryFailure => 6,
            ErrorKind::InvalidRegistration => 7,
            ErrorKind::IllegalMessage => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<ErrorKind> {
        match code {
            1 => Some(ErrorKind::InvalidVehicleCategory),
            2 => Some(ErrorKind::NoAvailableSpot),
            3 => Some(ErrorKind::TicketNotFound),
            4 => Some(ErrorKind::InvalidInterval),
            5 => Some(ErrorKind::UnsupportedCategory),
            6 => Some(ErrorKind::RepositoryFailure),
            7 => Some(ErrorKind::InvalidRegistration),
            8 => Some(ErrorKind::IllegalMessage),
            _ => None,
        }
    }
}
