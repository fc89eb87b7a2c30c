//! Binary device protocol.
//!
//! Every WebSocket binary frame carries exactly one family envelope
//! ([`MatrxMessage`] or [`LanternMessage`]) whose oneof holds the actual case.
//! A frame whose case this gateway does not know decodes with `message: None`.

pub mod common;
pub mod lantern;
pub mod matrx;

pub use common::*;
pub use lantern::{LanternMessage, lantern_message};
pub use matrx::{MatrxMessage, matrx_message};

use anyhow::Context;
use uuid::Uuid;

/// Device facing ids are raw 16 byte UUIDs.
pub fn uuid_from_bytes(bytes: &[u8]) -> anyhow::Result<Uuid> {
    Uuid::from_slice(bytes).with_context(|| format!("expected 16 uuid bytes, got {}", bytes.len()))
}

pub fn uuid_to_bytes(id: &Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn uuid_bytes_round_trip() {
        let id = Uuid::parse_str("5f2a0b7e-6c1d-4a8e-9b3f-1d2c3b4a5e6f").unwrap();
        let bytes = uuid_to_bytes(&id);
        assert_eq!(bytes.len(), 16);
        assert_eq!(uuid_from_bytes(&bytes).unwrap(), id);
        assert!(uuid_from_bytes(&bytes[..15]).is_err());
        assert!(uuid_from_bytes(&[]).is_err());
    }

    #[test]
    fn unknown_case_decodes_to_empty_envelope() {
        // field 99, length delimited, zero length
        let frame = [0x9A, 0x06, 0x00];
        let matrx = MatrxMessage::decode(&frame[..]).unwrap();
        assert!(matrx.message.is_none());
        let lantern = LanternMessage::decode(&frame[..]).unwrap();
        assert!(lantern.message.is_none());
    }

    #[test]
    fn lantern_rejects_matrx_only_cases() {
        let schedule = MatrxMessage::from(matrx_message::Message::ScheduleRequest(
            matrx::ScheduleRequest {},
        ));
        let lantern = LanternMessage::decode(schedule.encode_to_vec().as_slice()).unwrap();
        assert!(lantern.message.is_none());
    }

    #[test]
    fn join_response_flags_need_for_claim() {
        let join = JoinResponse::new(true, false);
        assert!(join.needs_claimed);
        let envelope = MatrxMessage::from(matrx_message::Message::from(
            CommonReply::JoinResponse(join.clone()),
        ));
        let decoded = MatrxMessage::decode(envelope.encode_to_vec().as_slice()).unwrap();
        assert_eq!(
            decoded.message,
            Some(matrx_message::Message::JoinResponse(join))
        );
    }
}
