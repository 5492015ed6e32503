//! Client (client agent) protocol: hello handshake, interests and the
//! inbound messages a game client receives.

use astron_net::protocol::*;
use astron_net::{Datagram, DatagramIterator, DoId, Envelope, MessageType, Zone, build_client_message};
use tracing::{debug, info, warn};

use crate::error::RepositoryError;
use crate::repository::{Handler, ObjectRepository, Table, handler, update_fields};
use crate::view::ViewRole;

impl ObjectRepository {
    pub(crate) fn client_handlers() -> Vec<(MessageType, Handler)> {
        vec![
            (CLIENT_HELLO_RESP, handler(Self::handle_hello_resp)),
            (CLIENT_EJECT, handler(Self::handle_eject)),
            (
                CLIENT_ENTER_OBJECT_REQUIRED,
                handler(|repo, _, it| repo.handle_enter_object(it, false, false)),
            ),
            (
                CLIENT_ENTER_OBJECT_REQUIRED_OTHER,
                handler(|repo, _, it| repo.handle_enter_object(it, true, false)),
            ),
            (
                CLIENT_ENTER_OBJECT_REQUIRED_OWNER,
                handler(|repo, _, it| repo.handle_enter_object(it, false, true)),
            ),
            (
                CLIENT_ENTER_OBJECT_REQUIRED_OTHER_OWNER,
                handler(|repo, _, it| repo.handle_enter_object(it, true, true)),
            ),
            (CLIENT_OBJECT_SET_FIELD, handler(Self::handle_object_set_field)),
            (CLIENT_OBJECT_SET_FIELDS, handler(Self::handle_object_set_fields)),
            (
                CLIENT_OBJECT_LEAVING,
                handler(|repo, _, it| repo.handle_leaving(it, Table::Visible)),
            ),
            (
                CLIENT_OBJECT_LEAVING_OWNER,
                handler(|repo, _, it| repo.handle_leaving(it, Table::Owned)),
            ),
            (CLIENT_OBJECT_LOCATION, handler(Self::handle_object_location)),
            (CLIENT_DONE_INTEREST_RESP, handler(Self::handle_done_interest)),
        ]
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn handle_hello_resp(
        &mut self,
        _header: &Envelope,
        _iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        info!("client agent accepted hello");
        self.hello_acknowledged = true;
        Ok(())
    }

    /// `[reason: u16][message: string]`; the connection is closed afterwards.
    fn handle_eject(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let reason = iter.read_u16()?;
        let message = iter.read_string()?;
        warn!(reason, %message, "ejected by client agent");
        self.handle().request_disconnect();
        Ok(())
    }

    fn handle_enter_object(
        &mut self,
        iter: &mut DatagramIterator<'_>,
        other: bool,
        owner: bool,
    ) -> Result<(), RepositoryError> {
        let role = if owner {
            ViewRole::Owner
        } else {
            self.config().view_role
        };
        self.enter_object(None, iter, role, other)
    }

    fn handle_object_set_field(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        let field_id = iter.read_u16()?;
        self.update_field(do_id, None, field_id, iter)
    }

    fn handle_object_set_fields(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        update_fields(self, do_id, None, iter)
    }

    fn handle_leaving(
        &mut self,
        iter: &mut DatagramIterator<'_>,
        table: Table,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        self.remove_object(do_id, table)
    }

    fn handle_object_location(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        let parent_id = iter.read_u32()?;
        let zone_id = iter.read_u32()?;
        self.relocate(do_id, parent_id, zone_id)
    }

    /// `[context: u32][interest_id: u16]`
    fn handle_done_interest(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let context = iter.read_u32()?;
        let interest_id = iter.read_u16()?;
        debug!(context, interest_id, "interest done");
        self.completed_interests.push((context, interest_id));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    fn send_client(
        &self,
        operation: &'static str,
        msg_type: MessageType,
        payload: impl FnOnce(&mut Datagram) -> Result<(), RepositoryError>,
    ) -> Result<(), RepositoryError> {
        self.require_client(operation)?;
        let mut dg = build_client_message(msg_type);
        payload(&mut dg)?;
        self.send_datagram(&dg)
    }

    /// `[dc_hash: u32][version: string]`. The hash is the configured override,
    /// or else the legacy hash of our schema.
    pub fn send_hello(&self) -> Result<(), RepositoryError> {
        let dc_hash = self.config().dc_hash.unwrap_or_else(|| self.registry().dc_hash());
        let version = self.config().client_version.clone();
        debug!(dc_hash, %version, "sending hello");
        self.send_client("CLIENT_HELLO", CLIENT_HELLO, |dg| {
            dg.add_u32(dc_hash);
            dg.add_string(&version)?;
            Ok(())
        })
    }

    pub fn send_heartbeat(&self) -> Result<(), RepositoryError> {
        self.send_client("CLIENT_HEARTBEAT", CLIENT_HEARTBEAT, |_| Ok(()))
    }

    /// Tell the client agent we are leaving; it closes the connection.
    pub fn send_disconnect(&self) -> Result<(), RepositoryError> {
        self.send_client("CLIENT_DISCONNECT", CLIENT_DISCONNECT, |_| Ok(()))
    }

    /// Open interest `interest_id` in `(parent, zone)`. The returned context
    /// comes back in `CLIENT_DONE_INTEREST_RESP`.
    pub fn add_interest(&self, interest_id: u16, parent_id: DoId, zone_id: Zone) -> Result<u32, RepositoryError> {
        let context = self.next_context();
        self.send_client("CLIENT_ADD_INTEREST", CLIENT_ADD_INTEREST, |dg| {
            dg.add_u32(context);
            dg.add_u16(interest_id);
            dg.add_u32(parent_id);
            dg.add_u32(zone_id);
            Ok(())
        })?;
        Ok(context)
    }

    pub fn remove_interest(&self, interest_id: u16) -> Result<u32, RepositoryError> {
        let context = self.next_context();
        self.send_client("CLIENT_REMOVE_INTEREST", CLIENT_REMOVE_INTEREST, |dg| {
            dg.add_u32(context);
            dg.add_u16(interest_id);
            Ok(())
        })?;
        Ok(context)
    }
}
