use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::io::{Error, ErrorKind as IoErrorKind};
use std::str;
use tokio_util::codec::{Decoder, Encoder};

use crate::model::{EntryReceipt, ErrorKind, ExitReceipt, SpotId};

const ERROR: u8 = 0x10;
const ENTER: u8 = 0x20;
const ENTERED: u8 = 0x21;
const EXIT: u8 = 0x30;
const EXITED: u8 = 0x31;

/// Longest string a frame can carry behind its one byte length prefix.
pub const MAX_STRING_LEN: usize = u8::MAX as usize;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum MessageType {
    Error(ErrorKind, String),
    Enter(u8, String), // Menu selection for the vehicle type and registration
    Entered(EntryReceipt),
    Exit(String), // Registration
    Exited(ExitReceipt),
}

fn invalid_data<E>(e: E) -> Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Error::new(IoErrorKind::InvalidData, e)
}

// The get_* helpers read from a cursor over the buffered bytes. They return
// Ok(None) when the frame is incomplete; the cursor is only committed to the
// BytesMut once the whole frame has been parsed.
fn get_u8(src: &mut &[u8]) -> Option<u8> {
    if src.is_empty() {
        return None;
    }
    Some(src.get_u8())
}

fn get_u32(src: &mut &[u8]) -> Option<u32> {
    if src.len() < 4 {
        return None;
    }
    Some(src.get_u32())
}

fn get_i64(src: &mut &[u8]) -> Option<i64> {
    if src.len() < 8 {
        return None;
    }
    Some(src.get_i64())
}

fn get_string(src: &mut &[u8]) -> Result<Option<String>, Error> {
    let Some(&len) = src.first() else {
        return Ok(None);
    };
    let str_end = len as usize + 1;
    if src.len() < str_end {
        return Ok(None);
    }
    let s = str::from_utf8(&src[1..str_end]).map_err(invalid_data)?;
    let result = s.to_string();
    src.advance(str_end);

    Ok(Some(result))
}

fn get_time(src: &mut &[u8]) -> Result<Option<DateTime<Utc>>, Error> {
    let Some(millis) = get_i64(src) else {
        return Ok(None);
    };
    DateTime::from_timestamp_millis(millis)
        .map(Some)
        .ok_or_else(|| invalid_data(format!("timestamp out of range: {}", millis)))
}

fn string_len(s: &str) -> Result<u8, Error> {
    u8::try_from(s.len()).map_err(|_| {
        Error::new(
            IoErrorKind::InvalidInput,
            format!("string too long for frame: {} bytes", s.len()),
        )
    })
}

fn put_string(dst: &mut BytesMut, len: u8, s: &str) {
    dst.put_u8(len);
    dst.extend_from_slice(s.as_bytes());
}

fn price_to_cents(price: Decimal) -> Result<i64, Error> {
    (price * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| {
            Error::new(
                IoErrorKind::InvalidInput,
                format!("price out of range: {}", price),
            )
        })
}

// Shorthand for the decode arms: bail out with Ok(None) on a partial frame.
macro_rules! field {
    ($e:expr) => {
        match $e {
            Some(v) => v,
            None => return Ok(None),
        }
    };
}

fn decode_frame(src: &mut &[u8]) -> Result<Option<MessageType>, Error> {
    let msg_type = field!(get_u8(src));
    match msg_type {
        ERROR => {
            let code = field!(get_u8(src));
            let message = field!(get_string(src)?);
            let kind = ErrorKind::from_code(code)
                .ok_or_else(|| invalid_data(format!("unknown error kind: {}", code)))?;
            Ok(Some(MessageType::Error(kind, message)))
        }
        ENTER => {
            let selection = field!(get_u8(src));
            let registration = field!(get_string(src)?);
            Ok(Some(MessageType::Enter(selection, registration)))
        }
        ENTERED => {
            let spot_id = field!(get_u32(src));
            let registration = field!(get_string(src)?);
            let in_time = field!(get_time(src)?);
            let recurring = field!(get_u8(src)) != 0;
            Ok(Some(MessageType::Entered(EntryReceipt {
                spot_id: SpotId(spot_id),
                registration,
                in_time,
                recurring,
            })))
        }
        EXIT => {
            let registration = field!(get_string(src)?);
            Ok(Some(MessageType::Exit(registration)))
        }
        EXITED => {
            let registration = field!(get_string(src)?);
            let in_time = field!(get_time(src)?);
            let out_time = field!(get_time(src)?);
            let cents = field!(get_i64(src));
            Ok(Some(MessageType::Exited(ExitReceipt {
                registration,
                in_time,
                out_time,
                price: Decimal::new(cents, 2),
            })))
        }
        m => Err(invalid_data(format!("message type not implemented: {:#04x}", m))),
    }
}

pub struct MessageDecoder {}

impl Decoder for MessageDecoder {
    type Item = MessageType;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        debug!("msg: {:?}", src);
        let mut cursor: &[u8] = &src[..];
        let Some(msg) = decode_frame(&mut cursor)? else {
            return Ok(None);
        };
        let consumed = src.len() - cursor.len();
        src.advance(consumed);
        Ok(Some(msg))
    }
}

pub struct MessageEncoder {}

impl Encoder<MessageType> for MessageEncoder {
    type Error = Error;

    fn encode(&mut self, item: MessageType, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            MessageType::Error(kind, s) => {
                let len = string_len(&s)?;
                dst.reserve(3 + s.len());

                dst.put_u8(ERROR);
                dst.put_u8(kind.code());
                put_string(dst, len, &s);
            }
            MessageType::Enter(selection, registration) => {
                let len = string_len(&registration)?;
                dst.reserve(3 + registration.len());

                dst.put_u8(ENTER);
                dst.put_u8(selection);
                put_string(dst, len, &registration);
            }
            MessageType::Entered(receipt) => {
                let len = string_len(&receipt.registration)?;
                // type, spot id, string length, timestamp and recurring flag
                dst.reserve(15 + receipt.registration.len());

                dst.put_u8(ENTERED);
                dst.put_u32(receipt.spot_id.0);
                put_string(dst, len, &receipt.registration);
                dst.put_i64(receipt.in_time.timestamp_millis());
                dst.put_u8(u8::from(receipt.recurring));
            }
            MessageType::Exit(registration) => {
                let len = string_len(&registration)?;
                dst.reserve(2 + registration.len());

                dst.put_u8(EXIT);
                put_string(dst, len, &registration);
            }
            MessageType::Exited(receipt) => {
                let len = string_len(&receipt.registration)?;
                let cents = price_to_cents(receipt.price)?;
                dst.reserve(26 + receipt.registration.len());

                dst.put_u8(EXITED);
                put_string(dst, len, &receipt.registration);
                dst.put_i64(receipt.in_time.timestamp_millis());
                dst.put_i64(receipt.out_time.timestamp_millis());
                dst.put_i64(cents);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::sink::SinkExt;
    use rust_decimal_macros::dec;
    use tokio_stream::StreamExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[tokio::test]
    async fn test_decode_error() {
        let decoder = MessageDecoder {};
        let msg: [u8; 6] = [0x10, 0x03, 0x03, 0x62, 0x61, 0x64];

        let mut reader = FramedRead::new(&msg[..], decoder);

        let frame = reader.next().await.unwrap().unwrap();
        assert_eq!(
            frame,
            MessageType::Error(ErrorKind::TicketNotFound, String::from("bad"))
        );
    }

    #[tokio::test]
    async fn test_decode_enter() {
        let decoder = MessageDecoder {};
        let msg: [u8; 9] = [0x20, 0x02, 0x06, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46];

        let mut reader = FramedRead::new(&msg[..], decoder);

        let frame = reader.next().await.unwrap().unwrap();

        assert_eq!(frame, MessageType::Enter(2, String::from("ABCDEF")));
    }

    #[tokio::test]
    async fn test_decode_exited() {
        let decoder = MessageDecoder {};
        let msg: [u8; 30] = [
            0x31, 0x04, 0x55, 0x4e, 0x31, 0x58, // registration
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xe8, // in 1000ms
            0x00, 0x00, 0x00, 0x00, 0x00, 0x36, 0xf0, 0x08, // out 3_600_392ms
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x96, // 150 cents
        ];

        let mut reader = FramedRead::new(&msg[..], decoder);

        let frame = reader.next().await.unwrap().unwrap();

        assert_eq!(
            frame,
            MessageType::Exited(ExitReceipt {
                registration: String::from("UN1X"),
                in_time: DateTime::from_timestamp_millis(1000).unwrap(),
                out_time: DateTime::from_timestamp_millis(3_600_392).unwrap(),
                price: dec!(1.50),
            })
        );
    }

    #[test]
    fn test_partial_frame_is_not_consumed() {
        let mut decoder = MessageDecoder {};
        let mut buf = BytesMut::from(&[0x30, 0x04, 0x55, 0x4e][..]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 4);

        buf.extend_from_slice(&[0x31, 0x58, 0x30]);
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(MessageType::Exit(String::from("UN1X")))
        );
        // The start of the next frame stays buffered.
        assert_eq!(&buf[..], &[0x30]);
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut decoder = MessageDecoder {};
        let mut buf = BytesMut::from(&[0x99, 0x00][..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), IoErrorKind::InvalidData);
    }

    #[test]
    fn test_decode_unknown_error_kind() {
        let mut decoder = MessageDecoder {};
        let mut buf = BytesMut::from(&[0x10, 0x2a, 0x00][..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), IoErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_encode_exit() {
        let buffer = Vec::new();
        let encoder = MessageEncoder {};

        let mut writer = FramedWrite::new(buffer, encoder);

        writer
            .send(MessageType::Exit(String::from("UN1X")))
            .await
            .unwrap();

        let buffer = writer.get_ref();

        assert_eq!(buffer.as_slice(), [0x30, 0x04, 0x55, 0x4e, 0x31, 0x58]);
    }

    #[tokio::test]
    async fn test_encode_entered() {
        let buffer = Vec::new();
        let encoder = MessageEncoder {};
        let receipt = EntryReceipt {
            spot_id: SpotId(4),
            registration: String::from("UN1X"),
            in_time: DateTime::from_timestamp_millis(1000).unwrap(),
            recurring: true,
        };

        let mut writer = FramedWrite::new(buffer, encoder);

        writer.send(MessageType::Entered(receipt)).await.unwrap();

        let buffer = writer.get_ref();

        assert_eq!(
            buffer.as_slice(),
            [
                0x21, 0x00, 0x00, 0x00, 0x04, 0x04, 0x55, 0x4e, 0x31, 0x58, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x03, 0xe8, 0x01
            ]
        );
    }

    #[tokio::test]
    async fn test_encode_exited_rounds_to_cents() {
        let buffer = Vec::new();
        let encoder = MessageEncoder {};
        let receipt = ExitReceipt {
            registration: String::from("A"),
            in_time: DateTime::from_timestamp_millis(0).unwrap(),
            out_time: DateTime::from_timestamp_millis(0).unwrap(),
            price: dec!(1.07),
        };

        let mut writer = FramedWrite::new(buffer, encoder);

        writer.send(MessageType::Exited(receipt)).await.unwrap();

        let buffer = writer.get_ref();

        assert_eq!(&buffer[buffer.len() - 8..], &[0, 0, 0, 0, 0, 0, 0, 0x6b]);
    }

    #[tokio::test]
    async fn test_encode_rejects_long_registration() {
        let buffer = Vec::new();
        let encoder = MessageEncoder {};

        let mut writer = FramedWrite::new(buffer, encoder);

        let err = writer
            .send(MessageType::Exit("X".repeat(256)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), IoErrorKind::InvalidInput);
    }

    #[test]
    fn test_oversized_enter_leaves_buffer_untouched() {
        let mut encoder = MessageEncoder {};
        let mut dst = BytesMut::new();

        let err = encoder
            .encode(MessageType::Enter(1, "X".repeat(300)), &mut dst)
            .unwrap_err();

        assert_eq!(err.kind(), IoErrorKind::InvalidInput);
        assert!(dst.is_empty());

        encoder
            .encode(MessageType::Exit(String::from("AB")), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &[0x30, 0x02, 0x41, 0x42]);
    }
}
