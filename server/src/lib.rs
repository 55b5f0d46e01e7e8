use futures::sink::SinkExt;
use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

pub mod clock;
pub mod config;
pub mod error;
pub mod fare;
pub mod manager;
pub mod repository;

use shared::messages::{MAX_STRING_LEN, MessageDecoder, MessageEncoder, MessageType};
use shared::model::ErrorKind;

use crate::clock::SystemClock;
use crate::config::ServerConfig;
use crate::error::ParkingError;
use crate::fare::FareCalculator;
use crate::manager::ParkingManager;
use crate::repository::{InMemorySpotRepository, InMemoryTicketRepository};

pub fn build_manager(config: &ServerConfig) -> ParkingManager {
    ParkingManager::new(
        Arc::new(InMemorySpotRepository::with_capacity(
            config.car_spots,
            config.bike_spots,
        )),
        Arc::new(InMemoryTicketRepository::new()),
        FareCalculator::new(config.fare_schedule()),
        Arc::new(SystemClock),
    )
    .with_timeout(config.repository_timeout())
    .with_recurring_policy(config.recurring_policy())
}

pub async fn run(config: ServerConfig) -> io::Result<()> {
    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!(
        "Listening on {} with {} car and {} bike spots",
        listener.local_addr()?,
        config.car_spots,
        config.bike_spots
    );

    serve(listener, Arc::new(build_manager(&config))).await
}

/// Accepts connections forever, one task per client, all sharing `manager`.
pub async fn serve(listener: TcpListener, manager: Arc<ParkingManager>) -> io::Result<()> {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!("Starting connection from {}", peer);
                let manager = manager.clone();
                tokio::spawn(async move {
                    handle_client(socket, manager).await;
                });
            }
            Err(e) => error!("Error accepting connection {}", e),
        }
    }
}

fn error_reply(kind: ErrorKind, message: String) -> MessageType {
    let mut message = message;
    if message.len() > MAX_STRING_LEN {
        let mut end = MAX_STRING_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    MessageType::Error(kind, message)
}

fn failure(e: ParkingError) -> MessageType {
    error_reply(e.kind(), e.to_string())
}

async fn dispatch(manager: &ParkingManager, msg: MessageType) -> MessageType {
    match msg {
        MessageType::Enter(selection, registration) => {
            debug!("Entry request: selection {} registration {:?}", selection, registration);
            match manager.process_incoming_vehicle(selection, &registration).await {
                Ok(receipt) => MessageType::Entered(receipt),
                Err(e) => failure(e),
            }
        }
        MessageType::Exit(registration) => {
            debug!("Exit request: registration {:?}", registration);
            match manager.process_exiting_vehicle(&registration).await {
                Ok(receipt) => MessageType::Exited(receipt),
                Err(e) => failure(e),
            }
        }
        other => {
            warn!("Client sent a server message: {:?}", other);
            error_reply(
                ErrorKind::IllegalMessage,
                String::from("Only entry and exit requests are accepted"),
            )
        }
    }
}

async fn handle_client(mut stream: TcpStream, manager: Arc<ParkingManager>) {
    let (read, write) = stream.split();

    let encoder = MessageEncoder {};
    let mut writer = FramedWrite::new(write, encoder);
    let decoder = MessageDecoder {};
    let mut reader = FramedRead::new(read, decoder);

    while let Some(result) = reader.next().await {
        let reply = match result {
            Ok(msg) => dispatch(&manager, msg).await,
            Err(e) => {
                error!("Error reading message {}", e);
                let _ = writer
                    .send(error_reply(ErrorKind::IllegalMessage, e.to_string()))
                    .await;
                break;
            }
        };
        if let Err(e) = writer.send(reply).await {
            error!("Error sending reply {}", e);
            break;
        }
    }
    debug!("Connection closed");
}
