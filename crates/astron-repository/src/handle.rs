//! Cloneable handle given to every view.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use astron_dc::ClassId;
use astron_net::protocol::{CLIENT_OBJECT_SET_FIELD, STATESERVER_OBJECT_SET_FIELD};
use astron_net::{Channel, Datagram, DatagramSender, DoId, build_client_message, build_envelope};

use crate::config::Protocol;
use crate::error::RepositoryError;
use crate::registry::ClassRegistry;
use crate::values::{Value, pack_field};

/// What a view may do with its repository: look up the schema, send field
/// updates over the right protocol, and ask for the connection to close.
#[derive(Clone)]
pub struct RepositoryHandle {
    registry: Arc<ClassRegistry>,
    sender: DatagramSender,
    protocol: Protocol,
    channel: Channel,
    disconnect: Arc<AtomicBool>,
}

impl RepositoryHandle {
    pub(crate) fn new(
        registry: Arc<ClassRegistry>,
        sender: DatagramSender,
        protocol: Protocol,
        channel: Channel,
    ) -> Self {
        Self {
            registry,
            sender,
            protocol,
            channel,
            disconnect: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Our own channel; zero on a client connection.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn send_datagram(&self, dg: &Datagram) -> Result<(), RepositoryError> {
        Ok(self.sender.send(dg)?)
    }

    /// Send a field update for `do_id`.
    ///
    /// Internal repositories address the object's channel with
    /// `STATESERVER_OBJECT_SET_FIELD`; clients send `CLIENT_OBJECT_SET_FIELD`.
    pub fn send_update(
        &self,
        do_id: DoId,
        class_id: ClassId,
        field_name: &str,
        args: &[Value],
    ) -> Result<(), RepositoryError> {
        let dg = self.field_update(do_id, class_id, field_name, args)?;
        self.send_datagram(&dg)
    }

    pub(crate) fn field_update(
        &self,
        do_id: DoId,
        class_id: ClassId,
        field_name: &str,
        args: &[Value],
    ) -> Result<Datagram, RepositoryError> {
        let field = self.registry.field_by_name(class_id, field_name)?;
        let mut dg = match self.protocol {
            Protocol::Internal => build_envelope(
                &[Channel::from(do_id)],
                Some(self.channel),
                STATESERVER_OBJECT_SET_FIELD,
            )?,
            Protocol::Client => build_client_message(CLIENT_OBJECT_SET_FIELD),
        };
        dg.add_u32(do_id);
        dg.add_u16(field.id());
        pack_field(&mut dg, self.registry.schema(), field, args)?;
        Ok(dg)
    }

    /// Ask the owning repository to disconnect at its next poll.
    pub fn request_disconnect(&self) {
        self.disconnect.store(true, Ordering::Release);
    }

    pub fn disconnect_requested(&self) -> bool {
        self.disconnect.load(Ordering::Acquire)
    }
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("protocol", &self.protocol)
            .field("channel", &self.channel)
            .field("disconnect_requested", &self.disconnect_requested())
            .finish()
    }
}
