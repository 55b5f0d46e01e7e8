use chrono::{DateTime, Utc};
use shared::model::{ErrorKind, VehicleCategory};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FareError {
    #[error("out time provided is incorrect: {}", display_time(.out_time))]
    InvalidInterval {
        in_time: DateTime<Utc>,
        out_time: Option<DateTime<Utc>>,
    },
    #[error("no fare configured for vehicle category {0}")]
    UnsupportedCategory(VehicleCategory),
}

fn display_time(time: &Option<DateTime<Utc>>) -> String {
    match time {
        Some(t) => t.to_rfc3339(),
        None => String::from("none"),
    }
}

/// Storage layer failures. Every repository call made by the manager is
/// bounded by a timeout, which is reported as `Timeout`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("{0} was not applied by the repository")]
    Rejected(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParkingError {
    #[error("invalid vehicle type selection: {0}")]
    InvalidVehicleCategory(u8),
    #[error("vehicle registration must not be empty")]
    InvalidRegistration,
    #[error("no parking spot available for {0}")]
    NoAvailableSpot(VehicleCategory),
    #[error("no open ticket for vehicle {0:?}")]
    TicketNotFound(String),
    #[error(transparent)]
    Fare(#[from] FareError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ParkingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParkingError::InvalidVehicleCategory(_) => ErrorKind::InvalidVehicleCategory,
            ParkingError::InvalidRegistration => ErrorKind::InvalidRegistration,
            ParkingError::NoAvailableSpot(_) => ErrorKind::NoAvailableSpot,
            ParkingError::TicketNotFound(_) => ErrorKind::TicketNotFound,
            ParkingError::Fare(FareError::InvalidInterval { .. }) => ErrorKind::InvalidInterval,
            ParkingError::Fare(FareError::UnsupportedCategory(_)) => {
                ErrorKind::UnsupportedCategory
            }
            ParkingError::Repository(_) => ErrorKind::RepositoryFailure,
        }
    }
}
