//! Internal (message director) protocol: outbound operations and inbound
//! handlers for AI and UberDOG processes.
//!
//! Every outbound operation here refuses to run on a client repository.

use astron_dc::ClassId;
use astron_net::protocol::*;
use astron_net::{Channel, Datagram, DatagramIterator, DoId, Envelope, MessageType, Zone, build_control};
use tracing::{debug, info};

use crate::error::RepositoryError;
use crate::ids::IDS;
use crate::repository::{Handler, ObjectRepository, Table, class_of, handler, update_fields};
use crate::values::{Value, default_values, pack_field};
use crate::view::{ObjectInfo, ViewRole};

impl ObjectRepository {
    pub(crate) fn internal_handlers() -> Vec<(MessageType, Handler)> {
        vec![
            (STATESERVER_OBJECT_SET_FIELD, handler(Self::handle_set_field)),
            (STATESERVER_OBJECT_SET_FIELDS, handler(Self::handle_set_fields)),
            (
                STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED,
                handler(|repo, h, it| repo.handle_enter(h, it, false, false)),
            ),
            (
                STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED_OTHER,
                handler(|repo, h, it| repo.handle_enter(h, it, true, false)),
            ),
            (
                STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED,
                handler(|repo, h, it| repo.handle_enter(h, it, false, false)),
            ),
            (
                STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED_OTHER,
                handler(|repo, h, it| repo.handle_enter(h, it, true, false)),
            ),
            (
                STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED,
                handler(|repo, h, it| repo.handle_enter(h, it, false, true)),
            ),
            (
                STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED_OTHER,
                handler(|repo, h, it| repo.handle_enter(h, it, true, true)),
            ),
            (STATESERVER_OBJECT_CHANGING_LOCATION, handler(Self::handle_changing_location)),
            (STATESERVER_OBJECT_CHANGING_AI, handler(Self::handle_changing_ai)),
            (STATESERVER_OBJECT_DELETE_RAM, handler(Self::handle_delete_ram)),
        ]
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn handle_set_field(
        &mut self,
        header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        let field_id = iter.read_u16()?;
        self.update_field(do_id, header.sender, field_id, iter)
    }

    fn handle_set_fields(
        &mut self,
        header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        update_fields(self, do_id, header.sender, iter)
    }

    fn handle_enter(
        &mut self,
        header: &Envelope,
        iter: &mut DatagramIterator<'_>,
        other: bool,
        owner: bool,
    ) -> Result<(), RepositoryError> {
        let role = if owner {
            ViewRole::Owner
        } else {
            self.config().view_role
        };
        self.enter_object(header.sender, iter, role, other)
    }

    /// `[do_id][new_parent][new_zone][old_parent][old_zone]`
    fn handle_changing_location(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        let parent_id = iter.read_u32()?;
        let zone_id = iter.read_u32()?;
        let old_parent = iter.read_u32()?;
        let old_zone = iter.read_u32()?;
        debug!(do_id, old_parent, old_zone, parent_id, zone_id, "object changing location");
        self.relocate(do_id, parent_id, zone_id)
    }

    /// `[do_id][new_ai: u64][old_ai: u64]`; an object handed to another AI
    /// leaves this repository.
    fn handle_changing_ai(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        let new_ai = iter.read_channel()?;
        let old_ai = iter.read_channel()?;
        debug!(do_id, new_ai, old_ai, "object changing AI");
        if new_ai != self.channel() {
            self.remove_object(do_id, Table::Visible)?;
        }
        Ok(())
    }

    fn handle_delete_ram(
        &mut self,
        _header: &Envelope,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        self.remove_everywhere(do_id)
    }

    // -----------------------------------------------------------------------
    // Message director control
    // -----------------------------------------------------------------------

    fn send_control(
        &self,
        operation: &'static str,
        msg_type: MessageType,
        payload: impl FnOnce(&mut Datagram) -> Result<(), RepositoryError>,
    ) -> Result<(), RepositoryError> {
        self.require_internal(operation)?;
        let mut dg = build_control(msg_type);
        payload(&mut dg)?;
        self.send_datagram(&dg)
    }

    /// Subscribe this connection to `channel`.
    pub fn add_channel(&self, channel: Channel) -> Result<(), RepositoryError> {
        self.send_control("CONTROL_ADD_CHANNEL", CONTROL_ADD_CHANNEL, |dg| {
            dg.add_channel(channel);
            Ok(())
        })
    }

    pub fn remove_channel(&self, channel: Channel) -> Result<(), RepositoryError> {
        self.send_control("CONTROL_REMOVE_CHANNEL", CONTROL_REMOVE_CHANNEL, |dg| {
            dg.add_channel(channel);
            Ok(())
        })
    }

    /// Subscribe to every channel in `[low, high]`.
    pub fn add_channel_range(&self, low: Channel, high: Channel) -> Result<(), RepositoryError> {
        self.send_control("CONTROL_ADD_RANGE", CONTROL_ADD_RANGE, |dg| {
            dg.add_channel(low);
            dg.add_channel(high);
            Ok(())
        })
    }

    pub fn remove_channel_range(&self, low: Channel, high: Channel) -> Result<(), RepositoryError> {
        self.send_control("CONTROL_REMOVE_RANGE", CONTROL_REMOVE_RANGE, |dg| {
            dg.add_channel(low);
            dg.add_channel(high);
            Ok(())
        })
    }

    /// Have the message director route `message` if this connection drops.
    pub fn add_post_remove(&self, message: &Datagram) -> Result<(), RepositoryError> {
        let sender = self.channel();
        self.send_control("CONTROL_ADD_POST_REMOVE", CONTROL_ADD_POST_REMOVE, |dg| {
            dg.add_channel(sender);
            dg.add_blob(message.as_bytes())?;
            Ok(())
        })
    }

    pub fn clear_post_removes(&self) -> Result<(), RepositoryError> {
        let sender = self.channel();
        self.send_control("CONTROL_CLEAR_POST_REMOVES", CONTROL_CLEAR_POST_REMOVES, |dg| {
            dg.add_channel(sender);
            Ok(())
        })
    }

    pub fn set_connection_name(&self, name: &str) -> Result<(), RepositoryError> {
        self.send_control("CONTROL_SET_CON_NAME", CONTROL_SET_CON_NAME, |dg| {
            dg.add_string(name)?;
            Ok(())
        })
    }

    pub fn set_connection_url(&self, url: &str) -> Result<(), RepositoryError> {
        self.send_control("CONTROL_SET_CON_URL", CONTROL_SET_CON_URL, |dg| {
            dg.add_string(url)?;
            Ok(())
        })
    }

    /// Write an entry to the cluster's event log. `event` is sent as an
    /// opaque blob.
    pub fn log_event(&self, event: &[u8]) -> Result<(), RepositoryError> {
        self.send_control("CONTROL_LOG_MESSAGE", CONTROL_LOG_MESSAGE, |dg| {
            dg.add_blob(event)?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Client agent
    // -----------------------------------------------------------------------

    fn send_internal(
        &self,
        operation: &'static str,
        recipient: Channel,
        msg_type: MessageType,
        payload: impl FnOnce(&mut Datagram) -> Result<(), RepositoryError>,
    ) -> Result<(), RepositoryError> {
        self.require_internal(operation)?;
        let mut dg = self.envelope(&[recipient], msg_type)?;
        payload(&mut dg)?;
        self.send_datagram(&dg)
    }

    pub fn set_client_state(&self, client: Channel, state: ClientState) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_SET_STATE", client, CLIENTAGENT_SET_STATE, |dg| {
            dg.add_u16(state as u16);
            Ok(())
        })
    }

    /// Rename the client's channel, e.g. to an account id after login.
    pub fn set_client_id(&self, client: Channel, new_channel: Channel) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_SET_CLIENT_ID", client, CLIENTAGENT_SET_CLIENT_ID, |dg| {
            dg.add_channel(new_channel);
            Ok(())
        })
    }

    pub fn eject_client(&self, client: Channel, reason: u16, message: &str) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_EJECT", client, CLIENTAGENT_EJECT, |dg| {
            dg.add_u16(reason);
            dg.add_string(message)?;
            Ok(())
        })
    }

    /// Close the client's connection without telling it why.
    pub fn drop_client(&self, client: Channel) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_DROP", client, CLIENTAGENT_DROP, |_| Ok(()))
    }

    pub fn open_client_channel(&self, client: Channel, channel: Channel) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_OPEN_CHANNEL", client, CLIENTAGENT_OPEN_CHANNEL, |dg| {
            dg.add_channel(channel);
            Ok(())
        })
    }

    pub fn close_client_channel(&self, client: Channel, channel: Channel) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_CLOSE_CHANNEL", client, CLIENTAGENT_CLOSE_CHANNEL, |dg| {
            dg.add_channel(channel);
            Ok(())
        })
    }

    /// Let the client talk to an object it has no interest in.
    pub fn declare_object(&self, client: Channel, do_id: DoId, class_name: &str) -> Result<(), RepositoryError> {
        let class_id = class_of(self, class_name)?;
        self.send_internal("CLIENTAGENT_DECLARE_OBJECT", client, CLIENTAGENT_DECLARE_OBJECT, |dg| {
            dg.add_u32(do_id);
            dg.add_u16(class_id);
            Ok(())
        })
    }

    pub fn undeclare_object(&self, client: Channel, do_id: DoId) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_UNDECLARE_OBJECT", client, CLIENTAGENT_UNDECLARE_OBJECT, |dg| {
            dg.add_u32(do_id);
            Ok(())
        })
    }

    /// Tie an object to the client's session; the client is dropped if it goes away.
    pub fn add_session_object(&self, client: Channel, do_id: DoId) -> Result<(), RepositoryError> {
        self.send_internal(
            "CLIENTAGENT_ADD_SESSION_OBJECT",
            client,
            CLIENTAGENT_ADD_SESSION_OBJECT,
            |dg| {
                dg.add_u32(do_id);
                Ok(())
            },
        )
    }

    pub fn remove_session_object(&self, client: Channel, do_id: DoId) -> Result<(), RepositoryError> {
        self.send_internal(
            "CLIENTAGENT_REMOVE_SESSION_OBJECT",
            client,
            CLIENTAGENT_REMOVE_SESSION_OBJECT,
            |dg| {
                dg.add_u32(do_id);
                Ok(())
            },
        )
    }

    /// Open an interest on the client's behalf.
    pub fn client_add_interest(
        &self,
        client: Channel,
        interest_id: u16,
        parent_id: DoId,
        zone_id: Zone,
    ) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_ADD_INTEREST", client, CLIENTAGENT_ADD_INTEREST, |dg| {
            dg.add_u16(interest_id);
            dg.add_u32(parent_id);
            dg.add_u32(zone_id);
            Ok(())
        })
    }

    pub fn client_remove_interest(&self, client: Channel, interest_id: u16) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_REMOVE_INTEREST", client, CLIENTAGENT_REMOVE_INTEREST, |dg| {
            dg.add_u16(interest_id);
            Ok(())
        })
    }

    /// Forward a raw client-protocol datagram to the client.
    pub fn send_client_datagram(&self, client: Channel, message: &Datagram) -> Result<(), RepositoryError> {
        self.send_internal("CLIENTAGENT_SEND_DATAGRAM", client, CLIENTAGENT_SEND_DATAGRAM, |dg| {
            dg.add_blob(message.as_bytes())?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // State server
    // -----------------------------------------------------------------------

    /// Create an object with default values for its required fields.
    pub fn create_object(
        &mut self,
        class_name: &str,
        parent_id: DoId,
        zone_id: Zone,
    ) -> Result<DoId, RepositoryError> {
        self.create_object_with_required(class_name, parent_id, zone_id, &[])
    }

    /// Create an object on the state server and return its freshly allocated id.
    ///
    /// Required fields take their value from `values` or else their default.
    /// Any other field in `values` is sent with the `_OTHER` variant. When a
    /// view is registered for our role it is generated locally right away.
    pub fn create_object_with_required(
        &mut self,
        class_name: &str,
        parent_id: DoId,
        zone_id: Zone,
        values: &[(&str, Vec<Value>)],
    ) -> Result<DoId, RepositoryError> {
        self.require_internal("STATESERVER_CREATE_OBJECT_WITH_REQUIRED")?;
        let class_id = class_of(self, class_name)?;
        let registry = self.registry();
        let class = registry.class(class_id)?;
        let schema = registry.schema();

        for (name, _) in values {
            if class.field(name).is_none() {
                return Err(RepositoryError::FieldNotFound {
                    class: class.name.clone(),
                    field: (*name).to_string(),
                });
            }
        }

        let mut required = Datagram::new();
        for field in class.required_fields() {
            match values.iter().find(|(name, _)| *name == field.name()) {
                Some((_, args)) => pack_field(&mut required, schema, field, args)?,
                None => pack_field(&mut required, schema, field, &default_values(schema, field)?)?,
            }
        }

        let mut other = Datagram::new();
        let mut other_count: u16 = 0;
        for (name, args) in values {
            let Some(field) = class.field(name) else {
                continue;
            };
            if class.required_fields().any(|r| r.id() == field.id()) {
                continue;
            }
            other.add_u16(field.id());
            pack_field(&mut other, schema, field, args)?;
            other_count += 1;
        }

        let do_id = IDS.allocate_do_id();
        let msg_type = if other_count > 0 {
            STATESERVER_CREATE_OBJECT_WITH_REQUIRED_OTHER
        } else {
            STATESERVER_CREATE_OBJECT_WITH_REQUIRED
        };
        let mut dg = self.envelope(&[self.config().state_server], msg_type)?;
        dg.add_u32(do_id);
        dg.add_u32(parent_id);
        dg.add_u32(zone_id);
        dg.add_u16(class_id);
        dg.add_datagram(&required);
        if other_count > 0 {
            dg.add_u16(other_count);
            dg.add_datagram(&other);
        }
        self.send_datagram(&dg)?;
        info!(do_id, class = class_name, parent_id, zone_id, "created object");

        let info = ObjectInfo {
            do_id,
            class_id,
            parent_id,
            zone_id,
        };
        self.generate_local(info, required.as_bytes())?;
        Ok(do_id)
    }

    /// Make this repository the object's AI.
    pub fn set_object_ai(&self, do_id: DoId) -> Result<(), RepositoryError> {
        self.set_object_ai_channel(do_id, self.channel())
    }

    pub fn set_object_ai_channel(&self, do_id: DoId, ai_channel: Channel) -> Result<(), RepositoryError> {
        self.send_internal(
            "STATESERVER_OBJECT_SET_AI",
            Channel::from(do_id),
            STATESERVER_OBJECT_SET_AI,
            |dg| {
                dg.add_channel(ai_channel);
                Ok(())
            },
        )
    }

    pub fn set_object_owner(&self, do_id: DoId, owner: Channel) -> Result<(), RepositoryError> {
        self.send_internal(
            "STATESERVER_OBJECT_SET_OWNER",
            Channel::from(do_id),
            STATESERVER_OBJECT_SET_OWNER,
            |dg| {
                dg.add_channel(owner);
                Ok(())
            },
        )
    }

    /// Remove the object from the state server's memory.
    pub fn delete_object_ram(&self, do_id: DoId) -> Result<(), RepositoryError> {
        self.send_internal(
            "STATESERVER_OBJECT_DELETE_RAM",
            Channel::from(do_id),
            STATESERVER_OBJECT_DELETE_RAM,
            |dg| {
                dg.add_u32(do_id);
                Ok(())
            },
        )
    }

    /// Delete every object whose AI is this repository.
    pub fn delete_ai_objects(&self) -> Result<(), RepositoryError> {
        let ai = self.channel();
        self.send_internal(
            "STATESERVER_DELETE_AI_OBJECTS",
            self.config().state_server,
            STATESERVER_DELETE_AI_OBJECTS,
            |dg| {
                dg.add_channel(ai);
                Ok(())
            },
        )
    }

    /// Ask for the object's location; the answer carries the returned context.
    pub fn get_object_location(&self, do_id: DoId) -> Result<u32, RepositoryError> {
        let context = self.next_context();
        self.send_internal(
            "STATESERVER_OBJECT_GET_LOCATION",
            Channel::from(do_id),
            STATESERVER_OBJECT_GET_LOCATION,
            |dg| {
                dg.add_u32(context);
                Ok(())
            },
        )?;
        Ok(context)
    }

    pub fn get_zone_objects(&self, parent_id: DoId, zone_id: Zone) -> Result<u32, RepositoryError> {
        let context = self.next_context();
        self.send_internal(
            "STATESERVER_OBJECT_GET_ZONE_OBJECTS",
            Channel::from(parent_id),
            STATESERVER_OBJECT_GET_ZONE_OBJECTS,
            |dg| {
                dg.add_u32(context);
                dg.add_u32(parent_id);
                dg.add_u32(zone_id);
                Ok(())
            },
        )?;
        Ok(context)
    }

    pub fn get_object_all(&self, do_id: DoId) -> Result<u32, RepositoryError> {
        let context = self.next_context();
        self.send_internal(
            "STATESERVER_OBJECT_GET_ALL",
            Channel::from(do_id),
            STATESERVER_OBJECT_GET_ALL,
            |dg| {
                dg.add_u32(context);
                dg.add_u32(do_id);
                Ok(())
            },
        )?;
        Ok(context)
    }

    // -----------------------------------------------------------------------
    // Database
    // -----------------------------------------------------------------------

    /// Load a stored object into the DBSS with its database values.
    pub fn activate_dbss_object(&self, do_id: DoId, parent_id: DoId, zone_id: Zone) -> Result<(), RepositoryError> {
        self.send_internal(
            "DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS",
            Channel::from(do_id),
            DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS,
            |dg| {
                dg.add_u32(do_id);
                dg.add_u32(parent_id);
                dg.add_u32(zone_id);
                Ok(())
            },
        )
    }

    /// Store a new object in the database server at `db_channel`.
    pub fn create_db_object(
        &self,
        db_channel: Channel,
        class_name: &str,
        fields: &[(&str, Vec<Value>)],
    ) -> Result<u32, RepositoryError> {
        let class_id: ClassId = class_of(self, class_name)?;
        let registry = self.registry();
        let class = registry.class(class_id)?;
        let count = u16::try_from(fields.len()).map_err(|_| RepositoryError::ValueMismatch {
            expected: "at most 65535 fields".to_string(),
            found: format!("{} fields", fields.len()),
        })?;
        let context = self.next_context();
        self.send_internal("DBSERVER_CREATE_OBJECT", db_channel, DBSERVER_CREATE_OBJECT, |dg| {
            dg.add_u32(context);
            dg.add_u16(class_id);
            dg.add_u16(count);
            for (name, args) in fields {
                let field = registry.field_by_name(class_id, name)?;
                dg.add_u16(field.id());
                pack_field(dg, registry.schema(), field, args)?;
            }
            debug!(context, class = %class.name, "database create");
            Ok(())
        })?;
        Ok(context)
    }

    pub fn get_db_object_all(&self, db_channel: Channel, do_id: DoId) -> Result<u32, RepositoryError> {
        let context = self.next_context();
        self.send_internal("DBSERVER_OBJECT_GET_ALL", db_channel, DBSERVER_OBJECT_GET_ALL, |dg| {
            dg.add_u32(context);
            dg.add_u32(do_id);
            Ok(())
        })?;
        Ok(context)
    }

    pub fn delete_db_object(&self, db_channel: Channel, do_id: DoId) -> Result<(), RepositoryError> {
        self.send_internal("DBSERVER_OBJECT_DELETE", db_channel, DBSERVER_OBJECT_DELETE, |dg| {
            dg.add_u32(do_id);
            Ok(())
        })
    }
}
