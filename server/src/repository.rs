use async_trait::async_trait;
use log::debug;
use shared::model::{NewTicket, Spot, SpotId, Ticket, TicketId, VehicleCategory};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::error::RepositoryError;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait SpotRepository: Send + Sync {
    /// Lowest free spot id of the category, if any.
    async fn next_available(&self, category: VehicleCategory) -> RepositoryResult<Option<SpotId>>;

    /// Conditionally sets the availability of a spot. Returns `true` only when
    /// the stored flag actually changed, so two callers racing to occupy the
    /// same spot cannot both succeed.
    async fn update_availability(&self, spot_id: SpotId, available: bool) -> RepositoryResult<bool>;

    async fn find(&self, spot_id: SpotId) -> RepositoryResult<Option<Spot>>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// The open ticket for the registration if there is one, otherwise the
    /// most recent closed one.
    async fn find_by_registration(&self, registration: &str) -> RepositoryResult<Option<Ticket>>;

    /// Every ticket issued to the registration, oldest first.
    async fn find_all_by_registration(&self, registration: &str) -> RepositoryResult<Vec<Ticket>>;

    async fn save(&self, ticket: NewTicket) -> RepositoryResult<Ticket>;

    /// Stores the out time and price of a closed ticket. Returns `false` if the
    /// stored ticket is missing or already closed.
    async fn update_on_close(&self, ticket: &Ticket) -> RepositoryResult<bool>;
}

pub struct InMemorySpotRepository {
    spots: Mutex<BTreeMap<SpotId, Spot>>,
}

impl InMemorySpotRepository {
    /// Lays out `car_spots` car spots followed by `bike_spots` bike spots,
    /// numbered from 1.
    pub fn with_capacity(car_spots: u32, bike_spots: u32) -> Self {
        let spots = (1..=car_spots + bike_spots)
            .map(|n| {
                let category = if n <= car_spots {
                    VehicleCategory::Car
                } else {
                    VehicleCategory::Bike
                };
                let spot = Spot {
                    id: SpotId(n),
                    category,
                    available: true,
                };
                (spot.id, spot)
            })
            .collect();
        InMemorySpotRepository {
            spots: Mutex::new(spots),
        }
    }
}

#[async_trait]
impl SpotRepository for InMemorySpotRepository {
    async fn next_available(&self, category: VehicleCategory) -> RepositoryResult<Option<SpotId>> {
        let spots = self.spots.lock().await;
        Ok(spots
            .values()
            .find(|spot| spot.category == category && spot.available)
            .map(|spot| spot.id))
    }

    async fn update_availability(
        &self,
        spot_id: SpotId,
        available: bool,
    ) -> RepositoryResult<bool> {
        let mut spots = self.spots.lock().await;
        match spots.get_mut(&spot_id) {
            Some(spot) if spot.available != available => {
                spot.available = available;
                Ok(true)
            }
            Some(_) => {
                debug!("Spot {} already has availability {}", spot_id, available);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn find(&self, spot_id: SpotId) -> RepositoryResult<Option<Spot>> {
        Ok(self.spots.lock().await.get(&spot_id).copied())
    }
}

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: Mutex<Vec<Ticket>>,
}

impl InMemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_registration(&self, registration: &str) -> RepositoryResult<Option<Ticket>> {
        let tickets = self.tickets.lock().await;
        let mut issued = tickets
            .iter()
            .rev()
            .filter(|ticket| ticket.registration == registration);
        let open = issued.clone().find(|ticket| ticket.is_open());
        Ok(open.or_else(|| issued.next()).cloned())
    }

    async fn find_all_by_registration(&self, registration: &str) -> RepositoryResult<Vec<Ticket>> {
        let tickets = self.tickets.lock().await;
        Ok(tickets
            .iter()
            .filter(|ticket| ticket.registration == registration)
            .cloned()
            .collect())
    }

    async fn save(&self, ticket: NewTicket) -> RepositoryResult<Ticket> {
        let mut tickets = self.tickets.lock().await;
        let id = TicketId(tickets.len() as u64 + 1);
        let ticket = Ticket::from_new(id, ticket);
        tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn update_on_close(&self, ticket: &Ticket) -> RepositoryResult<bool> {
        let mut tickets = self.tickets.lock().await;
        match tickets.iter_mut().find(|stored| stored.id == ticket.id) {
            Some(stored) if stored.is_open() && ticket.out_time.is_some() => {
                stored.out_time = ticket.out_time;
                stored.price = ticket.price;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use shared::model::ParkedSpot;

    fn new_ticket(registration: &str, spot: u32) -> NewTicket {
        NewTicket {
            spot: ParkedSpot {
                id: SpotId(spot),
                category: VehicleCategory::Car,
            },
            registration: registration.to_string(),
            in_time: DateTime::from_timestamp(1_000, 0).unwrap(),
            recurring: false,
        }
    }

    #[tokio::test]
    async fn test_layout_and_next_available() {
        let repo = InMemorySpotRepository::with_capacity(3, 2);

        assert_eq!(repo.next_available(VehicleCategory::Car).await, Ok(Some(SpotId(1))));
        assert_eq!(repo.next_available(VehicleCategory::Bike).await, Ok(Some(SpotId(4))));
        assert_eq!(repo.next_available(VehicleCategory::Truck).await, Ok(None));
        assert_eq!(
            repo.find(SpotId(5)).await,
            Ok(Some(Spot {
                id: SpotId(5),
                category: VehicleCategory::Bike,
                available: true,
            }))
        );
        assert_eq!(repo.find(SpotId(6)).await, Ok(None));
    }

    #[tokio::test]
    async fn test_update_availability_is_conditional() {
        let repo = InMemorySpotRepository::with_capacity(1, 0);

        assert_eq!(repo.update_availability(SpotId(1), false).await, Ok(true));
        // A second claim on the same spot loses.
        assert_eq!(repo.update_availability(SpotId(1), false).await, Ok(false));
        assert_eq!(repo.next_available(VehicleCategory::Car).await, Ok(None));

        assert_eq!(repo.update_availability(SpotId(1), true).await, Ok(true));
        assert_eq!(repo.next_available(VehicleCategory::Car).await, Ok(Some(SpotId(1))));
        assert_eq!(repo.update_availability(SpotId(9), false).await, Ok(false));
    }

    #[tokio::test]
    async fn test_find_prefers_open_ticket() {
        let repo = InMemoryTicketRepository::new();

        let first = repo.save(new_ticket("ABCDEF", 1)).await.unwrap();
        assert_eq!(first.id, TicketId(1));
        let closed = first.closed(DateTime::from_timestamp(5_000, 0).unwrap(), dec!(1.50));
        assert_eq!(repo.update_on_close(&closed).await, Ok(true));

        assert_eq!(repo.find_by_registration("ABCDEF").await, Ok(Some(closed.clone())));

        let second = repo.save(new_ticket("ABCDEF", 2)).await.unwrap();
        repo.save(new_ticket("GHIJKL", 3)).await.unwrap();

        assert_eq!(repo.find_by_registration("ABCDEF").await, Ok(Some(second.clone())));
        assert_eq!(repo.find_by_registration("abcdef").await, Ok(None));
        assert_eq!(
            repo.find_all_by_registration("ABCDEF").await,
            Ok(vec![closed, second])
        );
    }

    #[tokio::test]
    async fn test_update_on_close_only_once() {
        let repo = InMemoryTicketRepository::new();

        let ticket = repo.save(new_ticket("ABCDEF", 1)).await.unwrap();
        let closed = ticket.closed(DateTime::from_timestamp(5_000, 0).unwrap(), dec!(1.50));

        assert_eq!(repo.update_on_close(&ticket).await, Ok(false));
        assert_eq!(repo.update_on_close(&closed).await, Ok(true));
        assert_eq!(repo.update_on_close(&closed).await, Ok(false));
    }
}
