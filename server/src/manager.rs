use log::{debug, error, info, warn};
use shared::model::{EntryReceipt, ExitReceipt, NewTicket, ParkedSpot, Ticket, VehicleCategory};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

use crate::clock::Clock;
use crate::error::{ParkingError, RepositoryError};
use crate::fare::FareCalculator;
use crate::repository::{RepositoryResult, SpotRepository, TicketRepository};

pub const DEFAULT_REPOSITORY_TIMEOUT: Duration = Duration::from_secs(2);

const TICKET_SAVE: &str = "ticket save";

/// Which earlier tickets make a vehicle eligible for the recurring discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecurringPolicy {
    /// Any earlier ticket, open or closed.
    #[default]
    AnyPriorTicket,
    ClosedVisitsOnly,
}

/// Serializes ticket closing per registration.
#[derive(Default)]
struct RegistrationLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RegistrationLocks {
    async fn lock(&self, registration: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only referenced by the table are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(registration.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Allocates spots, issues tickets and closes them. This is the only place
/// where spots and tickets change state.
pub struct ParkingManager {
    spots: Arc<dyn SpotRepository>,
    tickets: Arc<dyn TicketRepository>,
    fares: FareCalculator,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    recurring_policy: RecurringPolicy,
    closing: RegistrationLocks,
}

impl ParkingManager {
    pub fn new(
        spots: Arc<dyn SpotRepository>,
        tickets: Arc<dyn TicketRepository>,
        fares: FareCalculator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ParkingManager {
            spots,
            tickets,
            fares,
            clock,
            timeout: DEFAULT_REPOSITORY_TIMEOUT,
            recurring_policy: RecurringPolicy::default(),
            closing: RegistrationLocks::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_recurring_policy(mut self, policy: RecurringPolicy) -> Self {
        self.recurring_policy = policy;
        self
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        match time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }

    /// Parks a vehicle: reserves a spot of the selected category and issues an
    /// open ticket for it.
    ///
    /// `selection` is the entrance menu code (1 car, 2 bike). Nothing is
    /// mutated when the selection or registration is invalid, and a reserved
    /// spot is handed back if the ticket cannot be issued.
    pub async fn process_incoming_vehicle(
        &self,
        selection: u8,
        registration: &str,
    ) -> Result<EntryReceipt, ParkingError> {
        let result = self.incoming(selection, registration).await;
        match &result {
            Ok(receipt) => info!(
                "Vehicle {} parked in spot {} at {} (recurring: {})",
                receipt.registration, receipt.spot_id, receipt.in_time, receipt.recurring
            ),
            Err(e) => error!("Unable to process incoming vehicle {:?}: {}", registration, e),
        }
        result
    }

    async fn incoming(
        &self,
        selection: u8,
        registration: &str,
    ) -> Result<EntryReceipt, ParkingError> {
        let category = VehicleCategory::from_selection(selection)
            .ok_or(ParkingError::InvalidVehicleCategory(selection))?;
        if registration.trim().is_empty() {
            return Err(ParkingError::InvalidRegistration);
        }

        let spot = self.reserve_spot(category).await?;
        match self.issue_ticket(spot, registration).await {
            Ok(ticket) => Ok(EntryReceipt {
                spot_id: ticket.spot.id,
                registration: ticket.registration,
                in_time: ticket.in_time,
                recurring: ticket.recurring,
            }),
            // The save may still land after its deadline, so the spot stays
            // occupied rather than risk an open ticket on a free spot.
            Err(
                e @ ParkingError::Repository(RepositoryError::Timeout {
                    operation: TICKET_SAVE,
                    ..
                }),
            ) => {
                warn!("Spot {} kept occupied after the ticket save timed out", spot.id);
                Err(e)
            }
            Err(e) => {
                self.release_reservation(spot).await;
                Err(e)
            }
        }
    }

    /// Claims the lowest free spot of the category. A lost claim means a
    /// concurrent entry took that spot, so the search restarts until a claim
    /// succeeds or the category is full.
    async fn reserve_spot(&self, category: VehicleCategory) -> Result<ParkedSpot, ParkingError> {
        loop {
            let candidate = self
                .call("next available spot", self.spots.next_available(category))
                .await?;
            let Some(spot_id) = candidate else {
                return Err(ParkingError::NoAvailableSpot(category));
            };

            let claimed = self
                .call("spot reservation", self.spots.update_availability(spot_id, false))
                .await?;
            if claimed {
                return Ok(ParkedSpot {
                    id: spot_id,
                    category,
                });
            }
            debug!("Spot {} was taken by a concurrent entry", spot_id);
        }
    }

    async fn issue_ticket(
        &self,
        spot: ParkedSpot,
        registration: &str,
    ) -> Result<Ticket, ParkingError> {
        let recurring = self.is_recurring(registration).await?;
        let ticket = NewTicket {
            spot,
            registration: registration.to_string(),
            in_time: self.clock.now(),
            recurring,
        };
        Ok(self.call(TICKET_SAVE, self.tickets.save(ticket)).await?)
    }

    async fn is_recurring(&self, registration: &str) -> Result<bool, ParkingError> {
        let recurring = match self.recurring_policy {
            RecurringPolicy::AnyPriorTicket => self
                .call("ticket lookup", self.tickets.find_by_registration(registration))
                .await?
                .is_some(),
            RecurringPolicy::ClosedVisitsOnly => self
                .call("ticket history", self.tickets.find_all_by_registration(registration))
                .await?
                .iter()
                .any(|ticket| !ticket.is_open()),
        };
        Ok(recurring)
    }

    async fn release_reservation(&self, spot: ParkedSpot) {
        match self
            .call("spot release", self.spots.update_availability(spot.id, true))
            .await
        {
            Ok(true) => debug!("Released spot {} after failed entry", spot.id),
            Ok(false) => warn!("Spot {} was already available on rollback", spot.id),
            Err(e) => error!("Unable to release spot {} after failed entry: {}", spot.id, e),
        }
    }

    /// Closes the open ticket of a leaving vehicle and frees its spot.
    ///
    /// The spot is only released once the closed ticket has been stored; if
    /// that update fails the spot stays occupied.
    pub async fn process_exiting_vehicle(
        &self,
        registration: &str,
    ) -> Result<ExitReceipt, ParkingError> {
        let result = if registration.trim().is_empty() {
            Err(ParkingError::TicketNotFound(registration.to_string()))
        } else {
            let _guard = self.closing.lock(registration).await;
            self.exiting(registration).await
        };
        match &result {
            Ok(receipt) => info!(
                "Vehicle {} left at {}, fare {}",
                receipt.registration, receipt.out_time, receipt.price
            ),
            Err(e) => error!("Unable to process exiting vehicle {:?}: {}", registration, e),
        }
        result
    }

    async fn exiting(&self, registration: &str) -> Result<ExitReceipt, ParkingError> {
        let ticket = self
            .call("ticket lookup", self.tickets.find_by_registration(registration))
            .await?
            .filter(Ticket::is_open)
            .ok_or_else(|| ParkingError::TicketNotFound(registration.to_string()))?;

        let out_time = self.clock.now();
        let price = self.fares.compute_fare(
            ticket.spot.category,
            ticket.in_time,
            Some(out_time),
            ticket.recurring,
        )?;
        let closed = ticket.closed(out_time, price);

        let updated = self
            .call("ticket update", self.tickets.update_on_close(&closed))
            .await?;
        if !updated {
            return Err(RepositoryError::Rejected("ticket update").into());
        }

        let released = self
            .call("spot release", self.spots.update_availability(closed.spot.id, true))
            .await?;
        if !released {
            warn!(
                "Spot {} was already available when ticket {:?} closed",
                closed.spot.id, closed.id
            );
        }

        Ok(ExitReceipt {
            registration: closed.registration,
            in_time: closed.in_time,
            out_time,
            price,
        })
    }
}
