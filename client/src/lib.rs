use futures::sink::SinkExt;
use log::{debug, error, info};
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use shared::messages::{MAX_STRING_LEN, MessageDecoder, MessageEncoder, MessageType};

pub async fn run(connect: String) -> io::Result<()> {
    let mut client = TcpStream::connect(connect.clone()).await?;
    info!("Connected to {}", connect);

    let (read, write) = client.split();
    let encoder = MessageEncoder {};
    let mut writer = FramedWrite::new(write, encoder);
    let decoder = MessageDecoder {};
    let mut reader = FramedRead::new(read, decoder);

    let mut shell = Shell::new(BufReader::new(tokio::io::stdin()), io::stdout());

    loop {
        let msg = match shell.next_action().await? {
            Action::Request(msg) => msg,
            Action::Quit => {
                debug!("Exiting client");
                return Ok(());
            }
        };

        debug!("Send message {:?} to server", msg);
        writer.send(msg).await?;

        match reader.next().await {
            Some(Ok(reply)) => {
                debug!("Received from server: {:?}", reply);
                shell.show(&reply)?;
            }
            Some(Err(e)) => {
                error!("Error reading message {}", e);
                return Err(e);
            }
            None => {
                info!("Server closed the connection");
                return Ok(());
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Request(MessageType),
    Quit,
}

/// Interactive menu for the parking attendant.
pub struct Shell<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(input: R, out: W) -> Self {
        Shell {
            lines: input.lines(),
            out,
        }
    }

    /// Prompts until the user picks something to send, or quits. End of
    /// input counts as quitting.
    pub async fn next_action(&mut self) -> io::Result<Action> {
        loop {
            writeln!(
                self.out,
                "Please select an option. Simply enter the number to choose an action"
            )?;
            writeln!(self.out, "1 New Vehicle Entering - allocate Parking Space")?;
            writeln!(self.out, "2 Vehicle Exiting - generate Ticket Price")?;
            writeln!(self.out, "3 Shutdown System")?;
            self.out.flush()?;

            let Some(line) = self.lines.next_line().await? else {
                return Ok(Action::Quit);
            };
            let request = match line.trim() {
                "1" => self.incoming().await?,
                "2" => self.exiting().await?,
                "3" => {
                    writeln!(self.out, "Exiting from the system!")?;
                    return Ok(Action::Quit);
                }
                other => {
                    writeln!(
                        self.out,
                        "Unsupported option {:?}. Please enter a number corresponding to the provided menu",
                        other
                    )?;
                    None
                }
            };
            if let Some(msg) = request {
                return Ok(Action::Request(msg));
            }
        }
    }

    async fn incoming(&mut self) -> io::Result<Option<MessageType>> {
        writeln!(self.out, "Please select vehicle type from menu")?;
        writeln!(self.out, "1 CAR")?;
        writeln!(self.out, "2 BIKE")?;
        self.out.flush()?;

        let Some(line) = self.lines.next_line().await? else {
            return Ok(None);
        };
        // Out of range selections are refused by the server.
        let selection: u8 = match line.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                writeln!(
                    self.out,
                    "Error reading input. Please enter valid number for proceeding further"
                )?;
                return Ok(None);
            }
        };

        Ok(self
            .registration()
            .await?
            .map(|registration| MessageType::Enter(selection, registration)))
    }

    async fn exiting(&mut self) -> io::Result<Option<MessageType>> {
        Ok(self.registration().await?.map(MessageType::Exit))
    }

    async fn registration(&mut self) -> io::Result<Option<String>> {
        writeln!(
            self.out,
            "Please type the vehicle registration number and press enter key"
        )?;
        self.out.flush()?;

        let Some(line) = self.lines.next_line().await? else {
            return Ok(None);
        };
        let registration = line.trim();
        if registration.is_empty() {
            writeln!(
                self.out,
                "Error reading input. Please enter a valid string for vehicle registration number"
            )?;
            return Ok(None);
        }
        if registration.len() > MAX_STRING_LEN {
            writeln!(
                self.out,
                "Vehicle registration number is too long: at most {} bytes are accepted",
                MAX_STRING_LEN
            )?;
            return Ok(None);
        }
        Ok(Some(registration.to_string()))
    }

    pub fn show(&mut self, reply: &MessageType) -> io::Result<()> {
        match reply {
            MessageType::Entered(receipt) => {
                if receipt.recurring {
                    writeln!(
                        self.out,
                        "Welcome back! As a recurring user of our parking lot, you'll benefit from a discount"
                    )?;
                }
                writeln!(self.out, "Please park your vehicle in spot number: {}", receipt.spot_id)?;
                writeln!(
                    self.out,
                    "Recorded in-time for vehicle number: {} is: {}",
                    receipt.registration, receipt.in_time
                )?;
            }
            MessageType::Exited(receipt) => {
                writeln!(self.out, "Please pay the parking fare: {:.2}", receipt.price)?;
                writeln!(
                    self.out,
                    "Recorded out-time for vehicle number: {} is: {}",
                    receipt.registration, receipt.out_time
                )?;
            }
            MessageType::Error(kind, message) => {
                debug!("Server refused the request: {:?}", kind);
                writeln!(self.out, "Unable to process the request: {}", message)?;
            }
            other => writeln!(self.out, "Unexpected message from server: {:?}", other)?,
        }
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use shared::model::{EntryReceipt, ErrorKind, ExitReceipt, SpotId};

    fn shell(input: &str) -> Shell<&[u8], Vec<u8>> {
        Shell::new(input.as_bytes(), Vec::new())
    }

    fn output(shell: &Shell<&[u8], Vec<u8>>) -> String {
        String::from_utf8(shell.out.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_incoming_vehicle() {
        let mut shell = shell("1\n2\nAB-123-CD\n");

        let action = shell.next_action().await.unwrap();

        assert_eq!(
            action,
            Action::Request(MessageType::Enter(2, String::from("AB-123-CD")))
        );
    }

    #[tokio::test]
    async fn test_exiting_vehicle() {
        let mut shell = shell("2\n  ABCDEF \n");

        let action = shell.next_action().await.unwrap();

        assert_eq!(action, Action::Request(MessageType::Exit(String::from("ABCDEF"))));
    }

    #[tokio::test]
    async fn test_unknown_selection_is_sent_to_server() {
        let mut shell = shell("1\n7\nABCDEF\n");

        let action = shell.next_action().await.unwrap();

        assert_eq!(action, Action::Request(MessageType::Enter(7, String::from("ABCDEF"))));
    }

    #[tokio::test]
    async fn test_bad_input_reprompts() {
        let mut shell = shell("9\n1\ncar\n2\n\n2\nXYZ\n");

        let action = shell.next_action().await.unwrap();

        assert_eq!(action, Action::Request(MessageType::Exit(String::from("XYZ"))));
        let out = output(&shell);
        assert!(out.contains("Unsupported option \"9\""));
        assert!(out.contains("Please enter valid number"));
        assert!(out.contains("valid string for vehicle registration number"));
    }

    #[tokio::test]
    async fn test_long_registration_reprompts() {
        let input = format!("2\n{}\n2\nXYZ\n", "X".repeat(300));
        let mut shell = shell(&input);

        let action = shell.next_action().await.unwrap();

        assert_eq!(action, Action::Request(MessageType::Exit(String::from("XYZ"))));
        assert!(output(&shell).contains("Vehicle registration number is too long"));
    }

    #[tokio::test]
    async fn test_registration_at_frame_limit_is_sent() {
        let input = format!("2\n{}\n", "X".repeat(255));
        let mut shell = shell(&input);

        let action = shell.next_action().await.unwrap();

        assert_eq!(action, Action::Request(MessageType::Exit("X".repeat(255))));
    }

    #[tokio::test]
    async fn test_quit_and_end_of_input() {
        let mut shell = shell("3\n");
        assert_eq!(shell.next_action().await.unwrap(), Action::Quit);

        let mut shell = self::shell("");
        assert_eq!(shell.next_action().await.unwrap(), Action::Quit);
    }

    #[test]
    fn test_show_replies() {
        let mut shell = shell("");
        let in_time = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        shell
            .show(&MessageType::Entered(EntryReceipt {
                spot_id: SpotId(4),
                registration: String::from("ABCDEF"),
                in_time,
                recurring: true,
            }))
            .unwrap();
        shell
            .show(&MessageType::Exited(ExitReceipt {
                registration: String::from("ABCDEF"),
                in_time,
                out_time: in_time,
                price: dec!(1.5),
            }))
            .unwrap();
        shell
            .show(&MessageType::Error(
                ErrorKind::NoAvailableSpot,
                String::from("no parking spot available for BIKE"),
            ))
            .unwrap();

        let out = output(&shell);
        assert!(out.contains("Welcome back!"));
        assert!(out.contains("Please park your vehicle in spot number: 4"));
        assert!(out.contains("Please pay the parking fare: 1.50"));
        assert!(out.contains("Unable to process the request: no parking spot available for BIKE"));
    }
}
