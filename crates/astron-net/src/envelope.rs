//! Internal-message envelope.
//!
//! ```text
//! [recipient_count: u8][recipient: u64]*count [sender: u64] [message_type: u16] [payload...]
//! ```
//!
//! Messages addressed to the control channel omit the sender. Client-protocol
//! datagrams have no envelope, only `[message_type: u16][payload...]`.

use crate::datagram::{Datagram, DatagramError, DatagramIterator, IntWidth};
use crate::protocol::{CONTROL_CHANNEL, Channel, MessageType};

/// Decoded envelope header of an internal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub recipients: Vec<Channel>,
    pub sender: Option<Channel>,
    pub msg_type: MessageType,
}

impl Envelope {
    pub fn is_control(&self) -> bool {
        is_control(&self.recipients)
    }
}

fn is_control(recipients: &[Channel]) -> bool {
    recipients == [CONTROL_CHANNEL]
}

/// Start an internal message; append the payload to the returned datagram.
///
/// `sender` is ignored for control messages.
pub fn build_envelope(
    recipients: &[Channel],
    sender: Option<Channel>,
    msg_type: MessageType,
) -> Result<Datagram, DatagramError> {
    let mut dg = Datagram::with_capacity(1 + 8 * recipients.len() + 8 + 2);
    dg.add_int(IntWidth::W8, recipients.len() as i128)?;
    for &recipient in recipients {
        dg.add_channel(recipient);
    }
    if !is_control(recipients) {
        dg.add_channel(sender.unwrap_or_default());
    }
    dg.add_u16(msg_type);
    Ok(dg)
}

/// Control message to the message director.
pub fn build_control(msg_type: MessageType) -> Datagram {
    let mut dg = Datagram::with_capacity(11);
    dg.add_u8(1);
    dg.add_channel(CONTROL_CHANNEL);
    dg.add_u16(msg_type);
    dg
}

/// Client-protocol message header.
pub fn build_client_message(msg_type: MessageType) -> Datagram {
    let mut dg = Datagram::with_capacity(2);
    dg.add_u16(msg_type);
    dg
}

/// Read an internal envelope, leaving `iter` at the start of the payload.
pub fn read_envelope(iter: &mut DatagramIterator<'_>) -> Result<Envelope, DatagramError> {
    let count = iter.read_u8()?;
    let recipients = (0..count)
        .map(|_| iter.read_channel())
        .collect::<Result<Vec<_>, _>>()?;
    let sender = if is_control(&recipients) {
        None
    } else {
        Some(iter.read_channel()?)
    };
    let msg_type = iter.read_u16()?;
    Ok(Envelope {
        recipients,
        sender,
        msg_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CONTROL_ADD_CHANNEL, STATESERVER_OBJECT_SET_AI};

    #[test]
    fn test_envelope_byte_layout() {
        let dg = build_envelope(&[7, 9], Some(3), 2050).unwrap();
        let mut expected = vec![2u8];
        expected.extend_from_slice(&7u64.to_le_bytes());
        expected.extend_from_slice(&9u64.to_le_bytes());
        expected.extend_from_slice(&3u64.to_le_bytes());
        expected.extend_from_slice(&[0x02, 0x08]);
        assert_eq!(dg.as_bytes(), expected.as_slice());
        assert_eq!(dg.len(), 1 + 8 + 8 + 8 + 2);
    }

    #[test]
    fn test_envelope_reads_back_with_payload() {
        let mut dg = build_envelope(&[400_000], Some(5_000), STATESERVER_OBJECT_SET_AI).unwrap();
        dg.add_u64(77);

        let mut it = dg.iter();
        let envelope = read_envelope(&mut it).unwrap();
        assert_eq!(
            envelope,
            Envelope {
                recipients: vec![400_000],
                sender: Some(5_000),
                msg_type: STATESERVER_OBJECT_SET_AI,
            }
        );
        assert_eq!(it.read_u64().unwrap(), 77);
    }

    #[test]
    fn test_control_messages_have_no_sender() {
        let mut dg = build_control(CONTROL_ADD_CHANNEL);
        assert_eq!(dg, build_envelope(&[CONTROL_CHANNEL], Some(99), CONTROL_ADD_CHANNEL).unwrap());
        dg.add_channel(1234);

        let mut it = dg.iter();
        let envelope = read_envelope(&mut it).unwrap();
        assert!(envelope.is_control());
        assert_eq!(envelope.sender, None);
        assert_eq!(envelope.msg_type, CONTROL_ADD_CHANNEL);
        assert_eq!(it.read_channel().unwrap(), 1234);
    }

    #[test]
    fn test_too_many_recipients() {
        let recipients: Vec<Channel> = (0..256).collect();
        assert!(matches!(
            build_envelope(&recipients, Some(1), 2020),
            Err(DatagramError::IntOutOfRange { value: 256, bits: 8 })
        ));
    }

    #[test]
    fn test_truncated_envelope() {
        let dg = Datagram::from_bytes(vec![2, 1, 0, 0]);
        assert!(matches!(
            read_envelope(&mut dg.iter()),
            Err(DatagramError::ReadOutOfRange { .. })
        ));
    }

    #[test]
    fn test_client_message_header() {
        let dg = build_client_message(5);
        assert_eq!(dg.as_bytes(), &[5, 0]);
    }
}
