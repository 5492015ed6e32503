//! The object repository: connection, class registry and live objects.
//!
//! A repository speaks one [`Protocol`]. Inbound datagrams are decoded into an
//! [`Envelope`] (client datagrams get one with no recipients or sender) and
//! handed to the first handler registered for their message type. Handlers
//! run on the caller's task inside [`ObjectRepository::poll_once`]; nothing
//! here is shared across threads except the read-only [`ClassRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use astron_dc::{Class, ClassId, FieldId};
use astron_net::protocol::{CLIENT_OBJECT_LOCATION, STATESERVER_OBJECT_SET_LOCATION};
use astron_net::{
    Channel, Connection, Datagram, DatagramIterator, DoId, Envelope, MessageType, Zone,
    build_client_message, build_envelope, message_name, read_envelope,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Protocol, RepositoryConfig, poll_interval};
use crate::error::RepositoryError;
use crate::handle::RepositoryHandle;
use crate::ids::{ContextGenerator, IDS};
use crate::registry::ClassRegistry;
use crate::values::{Value, field_bytes};
use crate::view::{DistributedObjectView, ObjectInfo, ViewFactories, ViewRole};

// ---------------------------------------------------------------------------
// Handlers and tasks
// ---------------------------------------------------------------------------

/// Processes the payload of one inbound message type.
pub type Handler = Arc<
    dyn Fn(&mut ObjectRepository, &Envelope, &mut DatagramIterator<'_>) -> Result<(), RepositoryError>
        + Send
        + Sync,
>;

/// Runs once per poll, after inbound datagrams have been drained.
pub type Task = Box<dyn FnMut(&mut ObjectRepository) -> Result<(), RepositoryError> + Send>;

pub(crate) fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut ObjectRepository, &Envelope, &mut DatagramIterator<'_>) -> Result<(), RepositoryError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

// ---------------------------------------------------------------------------
// Live objects
// ---------------------------------------------------------------------------

struct LiveObject {
    info: ObjectInfo,
    role: ViewRole,
    view: Box<dyn DistributedObjectView>,
}

/// Which of the two live-object tables an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Table {
    Visible,
    Owned,
}

impl Table {
    fn for_role(role: ViewRole) -> Self {
        if role == ViewRole::Owner {
            Table::Owned
        } else {
            Table::Visible
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

pub struct ObjectRepository {
    config: RepositoryConfig,
    registry: Arc<ClassRegistry>,
    connection: Connection,
    handle: RepositoryHandle,
    objects: BTreeMap<DoId, LiveObject>,
    owned: BTreeMap<DoId, LiveObject>,
    handlers: Vec<(MessageType, Handler)>,
    tasks: Vec<Task>,
    contexts: ContextGenerator,
    poll_interval: Duration,
    running: bool,
    pub(crate) hello_acknowledged: bool,
    pub(crate) completed_interests: Vec<(u32, u16)>,
}

impl ObjectRepository {
    /// Parse the DC file, bind views and connect.
    ///
    /// A refused connection comes back as
    /// `RepositoryError::Connection(ConnectionError::Refused { .. })`.
    pub async fn connect(
        config: RepositoryConfig,
        factories: &ViewFactories,
    ) -> Result<Self, RepositoryError> {
        let schema = astron_dc::parse_file(&config.dc_file)?;
        let registry = ClassRegistry::build(schema, factories)?;
        info!(
            dc_file = %config.dc_file.display(),
            classes = registry.schema().class_count(),
            "schema loaded"
        );
        let connection = Connection::connect(config.address(), config.frame.clone()).await?;
        Self::with_connection(config, registry, connection)
    }

    /// Build a repository over an open connection and announce it.
    ///
    /// Internal repositories subscribe to their AI channel (allocating one if
    /// none is configured) and name the connection; client repositories send
    /// `CLIENT_HELLO`.
    pub fn with_connection(
        config: RepositoryConfig,
        registry: ClassRegistry,
        connection: Connection,
    ) -> Result<Self, RepositoryError> {
        let poll_interval = config.poll_interval()?;
        let registry = Arc::new(registry);
        let channel = match config.protocol {
            Protocol::Internal => config.ai_channel.unwrap_or_else(|| IDS.allocate_channel()),
            Protocol::Client => 0,
        };
        let handle = RepositoryHandle::new(
            Arc::clone(&registry),
            connection.sender(),
            config.protocol,
            channel,
        );
        let handlers = match config.protocol {
            Protocol::Internal => Self::internal_handlers(),
            Protocol::Client => Self::client_handlers(),
        };

        let mut repo = Self {
            config,
            registry,
            connection,
            handle,
            objects: BTreeMap::new(),
            owned: BTreeMap::new(),
            handlers,
            tasks: Vec::new(),
            contexts: ContextGenerator::new(),
            poll_interval,
            running: true,
            hello_acknowledged: false,
            completed_interests: Vec::new(),
        };

        match repo.config.protocol {
            Protocol::Internal => {
                repo.add_channel(channel)?;
                if let Some(name) = repo.config.connection_name.clone() {
                    repo.set_connection_name(&name)?;
                }
                info!(peer = %repo.connection.peer(), channel, "internal repository ready");
            }
            Protocol::Client => {
                repo.send_hello()?;
                info!(peer = %repo.connection.peer(), "client repository ready");
            }
        }
        Ok(repo)
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Our AI channel; zero for client repositories.
    pub fn channel(&self) -> Channel {
        self.handle.channel()
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn handle(&self) -> RepositoryHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Running and the transport has not seen the stream end, even if no poll
    /// has noticed yet.
    pub fn is_connected(&self) -> bool {
        self.running && self.connection.is_open()
    }

    /// Whether the client agent answered our hello.
    pub fn hello_acknowledged(&self) -> bool {
        self.hello_acknowledged
    }

    /// `(context, interest_id)` of every interest the client agent reported done.
    pub fn completed_interests(&self) -> &[(u32, u16)] {
        &self.completed_interests
    }

    pub fn object(&self, do_id: DoId) -> Option<&ObjectInfo> {
        self.objects.get(&do_id).map(|o| &o.info)
    }

    pub fn owned_object(&self, do_id: DoId) -> Option<&ObjectInfo> {
        self.owned.get(&do_id).map(|o| &o.info)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.values().map(|o| &o.info)
    }

    pub fn owned_objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.owned.values().map(|o| &o.info)
    }

    pub fn object_role(&self, do_id: DoId) -> Option<ViewRole> {
        self.objects.get(&do_id).map(|o| o.role)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len() + self.owned.len()
    }

    /// Append a handler; it only runs for message types no earlier handler claims.
    pub fn add_handler<F>(&mut self, msg_type: MessageType, f: F)
    where
        F: Fn(&mut ObjectRepository, &Envelope, &mut DatagramIterator<'_>) -> Result<(), RepositoryError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.push((msg_type, handler(f)));
    }

    pub fn add_task<F>(&mut self, task: F)
    where
        F: FnMut(&mut ObjectRepository) -> Result<(), RepositoryError> + Send + 'static,
    {
        self.tasks.push(Box::new(task));
    }

    pub fn set_poll_rate(&mut self, hz: f64) -> Result<(), RepositoryError> {
        self.poll_interval = poll_interval(hz)?;
        self.config.poll_rate_hz = hz;
        Ok(())
    }

    pub fn poll_rate(&self) -> f64 {
        self.config.poll_rate_hz
    }

    pub fn send_datagram(&self, dg: &Datagram) -> Result<(), RepositoryError> {
        self.handle.send_datagram(dg)
    }

    // -----------------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------------

    /// Dispatch every datagram received so far, then run tasks.
    ///
    /// Returns `Ok(false)` once the connection has ended or a disconnect was
    /// requested; fatal dispatch errors are returned as `Err`.
    pub fn poll_once(&mut self) -> Result<bool, RepositoryError> {
        if !self.running {
            return Ok(false);
        }
        loop {
            if self.handle.disconnect_requested() {
                break;
            }
            match self.connection.poll_datagram() {
                Ok(Some(dg)) => {
                    if let Err(e) = self.dispatch(&dg) {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!(error = %e, "dropping datagram");
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_terminal() => {
                    info!(peer = %self.connection.peer(), reason = %e, "connection ended");
                    self.shutdown();
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if self.handle.disconnect_requested() {
            self.disconnect();
            return Ok(false);
        }
        self.run_tasks()?;
        Ok(true)
    }

    /// Poll at the configured rate until the connection ends.
    ///
    /// Client repositories also send a heartbeat every heartbeat interval.
    pub async fn poll_forever(&mut self) -> Result<(), RepositoryError> {
        let mut last_heartbeat = Instant::now();
        while self.poll_once()? {
            if self.config.protocol == Protocol::Client
                && last_heartbeat.elapsed() >= self.config.heartbeat_interval
            {
                self.send_heartbeat()?;
                last_heartbeat = Instant::now();
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    /// Close the connection and delete every live view.
    pub fn disconnect(&mut self) {
        if self.running {
            self.connection.disconnect();
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running = false;
        let objects = std::mem::take(&mut self.objects);
        let owned = std::mem::take(&mut self.owned);
        for mut object in objects.into_values().chain(owned.into_values()) {
            object.view.on_delete();
        }
    }

    fn run_tasks(&mut self) -> Result<(), RepositoryError> {
        let mut tasks = std::mem::take(&mut self.tasks);
        let result = tasks.iter_mut().try_for_each(|task| task(self));
        tasks.append(&mut self.tasks);
        self.tasks = tasks;
        result
    }

    fn dispatch(&mut self, dg: &Datagram) -> Result<(), RepositoryError> {
        let mut iter = dg.iter();
        let header = match self.config.protocol {
            Protocol::Internal => read_envelope(&mut iter)?,
            Protocol::Client => Envelope {
                recipients: Vec::new(),
                sender: None,
                msg_type: iter.read_u16()?,
            },
        };
        let found = self
            .handlers
            .iter()
            .find(|(msg_type, _)| *msg_type == header.msg_type)
            .map(|(_, h)| Arc::clone(h));
        match found {
            Some(h) => h(self, &header, &mut iter),
            None => {
                debug!(
                    msg_type = header.msg_type,
                    name = message_name(header.msg_type).unwrap_or("unknown"),
                    "no handler, dropping"
                );
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared outbound helpers
    // -----------------------------------------------------------------------

    pub(crate) fn require_internal(&self, operation: &'static str) -> Result<(), RepositoryError> {
        match self.config.protocol {
            Protocol::Internal => Ok(()),
            Protocol::Client => Err(RepositoryError::SuspiciousClientBehavior { operation }),
        }
    }

    pub(crate) fn require_client(&self, operation: &'static str) -> Result<(), RepositoryError> {
        match self.config.protocol {
            Protocol::Client => Ok(()),
            Protocol::Internal => Err(RepositoryError::ProtocolMismatch {
                operation,
                protocol: Protocol::Internal,
            }),
        }
    }

    /// Internal message from our channel to `recipients`.
    pub(crate) fn envelope(
        &self,
        recipients: &[Channel],
        msg_type: MessageType,
    ) -> Result<Datagram, RepositoryError> {
        Ok(build_envelope(recipients, Some(self.channel()), msg_type)?)
    }

    pub(crate) fn next_context(&self) -> u32 {
        self.contexts.next_context()
    }

    /// Send a field update to a live object, over whichever protocol we speak.
    pub fn set_object_field(
        &mut self,
        do_id: DoId,
        field_name: &str,
        args: &[Value],
    ) -> Result<(), RepositoryError> {
        let class_id = self
            .objects
            .get(&do_id)
            .or_else(|| self.owned.get(&do_id))
            .map(|o| o.info.class_id)
            .ok_or(RepositoryError::ObjectNotFound(do_id))?;
        self.handle.send_update(do_id, class_id, field_name, args)
    }

    /// Move an object: `STATESERVER_OBJECT_SET_LOCATION` internally,
    /// `CLIENT_OBJECT_LOCATION` from a client.
    pub fn set_object_location(
        &mut self,
        do_id: DoId,
        parent_id: DoId,
        zone_id: Zone,
    ) -> Result<(), RepositoryError> {
        let dg = match self.config.protocol {
            Protocol::Internal => {
                let mut dg = self.envelope(&[Channel::from(do_id)], STATESERVER_OBJECT_SET_LOCATION)?;
                dg.add_u32(parent_id);
                dg.add_u32(zone_id);
                dg
            }
            Protocol::Client => {
                let mut dg = build_client_message(CLIENT_OBJECT_LOCATION);
                dg.add_u32(do_id);
                dg.add_u32(parent_id);
                dg.add_u32(zone_id);
                dg
            }
        };
        self.send_datagram(&dg)
    }

    // -----------------------------------------------------------------------
    // Object lifecycle
    // -----------------------------------------------------------------------

    fn table_mut(&mut self, table: Table) -> &mut BTreeMap<DoId, LiveObject> {
        match table {
            Table::Visible => &mut self.objects,
            Table::Owned => &mut self.owned,
        }
    }

    /// Handle an "enter object" payload:
    /// `[do_id: u32][parent: u32][zone: u32][class: u16][required...]`, then
    /// with `other` set, `[count: u16]([field_id: u16][value])*count`.
    ///
    /// An object that is already live only has its location updated.
    pub(crate) fn enter_object(
        &mut self,
        sender: Option<Channel>,
        iter: &mut DatagramIterator<'_>,
        role: ViewRole,
        other: bool,
    ) -> Result<(), RepositoryError> {
        let do_id = iter.read_u32()?;
        let parent_id = iter.read_u32()?;
        let zone_id = iter.read_u32()?;
        let class_id = iter.read_u16()?;
        let info = ObjectInfo {
            do_id,
            class_id,
            parent_id,
            zone_id,
        };
        let table = Table::for_role(role);

        if let Some(existing) = self.table_mut(table).get_mut(&do_id) {
            debug!(do_id, parent_id, zone_id, "object already live, relocating");
            existing.info.parent_id = parent_id;
            existing.info.zone_id = zone_id;
            existing.view.on_location_change(parent_id, zone_id);
            return Ok(());
        }

        let registry = Arc::clone(&self.registry);
        let class = registry.class(class_id)?;
        let factory = registry.require_factory(class_id, role)?;
        let mut view = factory(self.handle.clone(), info);

        for field in class.required_fields() {
            let bytes = field_bytes(iter, registry.schema(), field)?;
            view.on_field_update(sender, field.id(), &mut DatagramIterator::new(bytes))?;
        }
        if other {
            let count = iter.read_u16()?;
            for _ in 0..count {
                let field_id = iter.read_u16()?;
                deliver_field(&registry, class, sender, field_id, iter, view.as_mut())?;
            }
        }

        view.on_generate(&info);
        debug!(do_id, class = %class.name, ?role, "object generated");
        self.table_mut(table)
            .insert(do_id, LiveObject { info, role, view });
        Ok(())
    }

    /// Register a locally created object; `required` holds the encoded
    /// required fields in flattened order.
    pub(crate) fn generate_local(
        &mut self,
        info: ObjectInfo,
        required: &[u8],
    ) -> Result<(), RepositoryError> {
        let role = self.config.view_role;
        let registry = Arc::clone(&self.registry);
        let Some(factory) = registry.factory(info.class_id, role) else {
            debug!(do_id = info.do_id, ?role, "no local view for created object");
            return Ok(());
        };
        let class = registry.class(info.class_id)?;
        let mut view = factory(self.handle.clone(), info);
        let mut iter = DatagramIterator::new(required);
        for field in class.required_fields() {
            let bytes = field_bytes(&mut iter, registry.schema(), field)?;
            view.on_field_update(None, field.id(), &mut DatagramIterator::new(bytes))?;
        }
        view.on_generate(&info);
        self.objects.insert(info.do_id, LiveObject { info, role, view });
        Ok(())
    }

    /// Deliver one `[field_id][value]` update to every live view of `do_id`.
    pub(crate) fn update_field(
        &mut self,
        do_id: DoId,
        sender: Option<Channel>,
        field_id: FieldId,
        iter: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let registry = Arc::clone(&self.registry);
        let mut delivered = false;
        let mut span = None;
        for table in [&mut self.objects, &mut self.owned] {
            let Some(object) = table.get_mut(&do_id) else {
                continue;
            };
            let class = registry.class(object.info.class_id)?;
            let bytes = match span {
                Some(bytes) => bytes,
                None => {
                    let field = class.field_by_id(field_id).ok_or_else(|| {
                        RepositoryError::FieldNotFound {
                            class: class.name.clone(),
                            field: field_id.to_string(),
                        }
                    })?;
                    *span.insert(field_bytes(iter, registry.schema(), field)?)
                }
            };
            object
                .view
                .on_field_update(sender, field_id, &mut DatagramIterator::new(bytes))?;
            delivered = true;
        }
        if delivered {
            Ok(())
        } else {
            Err(RepositoryError::ObjectNotFound(do_id))
        }
    }

    pub(crate) fn relocate(
        &mut self,
        do_id: DoId,
        parent_id: DoId,
        zone_id: Zone,
    ) -> Result<(), RepositoryError> {
        let mut found = false;
        for table in [&mut self.objects, &mut self.owned] {
            if let Some(object) = table.get_mut(&do_id) {
                object.info.parent_id = parent_id;
                object.info.zone_id = zone_id;
                object.view.on_location_change(parent_id, zone_id);
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(RepositoryError::ObjectNotFound(do_id))
        }
    }

    /// Drop the view of `do_id` from one table, calling `on_delete`.
    pub(crate) fn remove_object(&mut self, do_id: DoId, table: Table) -> Result<(), RepositoryError> {
        let mut object = self
            .table_mut(table)
            .remove(&do_id)
            .ok_or(RepositoryError::ObjectNotFound(do_id))?;
        object.view.on_delete();
        debug!(do_id, ?table, "object removed");
        Ok(())
    }

    /// Drop every view of `do_id`.
    pub(crate) fn remove_everywhere(&mut self, do_id: DoId) -> Result<(), RepositoryError> {
        let visible = self.remove_object(do_id, Table::Visible);
        let owned = self.remove_object(do_id, Table::Owned);
        visible.or(owned)
    }
}

fn deliver_field(
    registry: &ClassRegistry,
    class: &Class,
    sender: Option<Channel>,
    field_id: FieldId,
    iter: &mut DatagramIterator<'_>,
    view: &mut dyn DistributedObjectView,
) -> Result<(), RepositoryError> {
    let field = class
        .field_by_id(field_id)
        .ok_or_else(|| RepositoryError::FieldNotFound {
            class: class.name.clone(),
            field: field_id.to_string(),
        })?;
    let bytes = field_bytes(iter, registry.schema(), field)?;
    view.on_field_update(sender, field_id, &mut DatagramIterator::new(bytes))
}

/// Read `[count: u16]([field_id: u16][value])*count` for a live object.
pub(crate) fn update_fields(
    repo: &mut ObjectRepository,
    do_id: DoId,
    sender: Option<Channel>,
    iter: &mut DatagramIterator<'_>,
) -> Result<(), RepositoryError> {
    let count = iter.read_u16()?;
    for _ in 0..count {
        let field_id = iter.read_u16()?;
        repo.update_field(do_id, sender, field_id, iter)?;
    }
    Ok(())
}

pub(crate) fn class_of(repo: &ObjectRepository, class_name: &str) -> Result<ClassId, RepositoryError> {
    repo.registry.class_id(class_name)
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
