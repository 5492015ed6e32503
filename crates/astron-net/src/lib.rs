//! Astron wire layer: datagram codec, TCP framing, connections, protocol
//! constants and the internal-message envelope.

pub mod connection;
pub mod datagram;
pub mod envelope;
pub mod framing;
pub mod protocol;

pub use connection::{Connection, ConnectionError, DatagramSender};
pub use datagram::{Datagram, DatagramError, DatagramIterator, IntWidth};
pub use envelope::{Envelope, build_client_message, build_control, build_envelope, read_envelope};
pub use framing::{FrameBuffer, FrameConfig, FrameError, encode_frame, read_frame, write_frame};
pub use protocol::{Channel, DoId, MessageType, Zone, message_name};
