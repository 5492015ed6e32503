//! Views for the classes `example.dc` imports.

use astron_dc::FieldId;
use astron_net::{Channel, DatagramIterator, DoId, Zone};
use astron_repository::values::unpack_field;
use astron_repository::{
    DistributedObjectView, ObjectInfo, RepositoryError, RepositoryHandle, Value, ViewFactories,
};
use tracing::{debug, info};

/// Every view this process can instantiate, keyed by view name.
pub fn factories() -> ViewFactories {
    let mut factories = ViewFactories::new();
    for name in [
        "Root",
        "RootAI",
        "AnonymousContact",
        "AnonymousContactUD",
        "LoginManager",
        "LoginManagerAI",
        "DistributedWorld",
        "DistributedWorldAI",
        "DistributedAvatar",
        "DistributedAvatarOV",
    ] {
        factories.register(name, |handle, info| Box::new(LoggingView::new(handle, info)));
    }
    factories.register("DistributedAvatarAI", |handle, info| {
        Box::new(AvatarAI::new(handle, info))
    });
    factories
}

// ---------------------------------------------------------------------------
// Logging view
// ---------------------------------------------------------------------------

/// Decodes every update against the schema and logs it.
pub struct LoggingView {
    handle: RepositoryHandle,
    info: ObjectInfo,
}

impl LoggingView {
    pub fn new(handle: RepositoryHandle, info: ObjectInfo) -> Self {
        Self { handle, info }
    }

    fn decode(
        &self,
        field_id: FieldId,
        args: &mut DatagramIterator<'_>,
    ) -> Result<(String, Vec<Value>), RepositoryError> {
        let registry = self.handle.registry();
        let field = registry.field(self.info.class_id, field_id)?;
        let values = unpack_field(args, registry.schema(), field)?;
        Ok((field.name().to_string(), values))
    }
}

impl DistributedObjectView for LoggingView {
    fn on_generate(&mut self, info: &ObjectInfo) {
        let class = self.handle.registry().class_name(info.class_id).unwrap_or("?");
        info!(do_id = info.do_id, class, parent = info.parent_id, zone = info.zone_id, "generated");
    }

    fn on_field_update(
        &mut self,
        sender: Option<Channel>,
        field_id: FieldId,
        args: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let (field, values) = self.decode(field_id, args)?;
        debug!(do_id = self.info.do_id, ?sender, field, ?values, "field update");
        Ok(())
    }

    fn on_location_change(&mut self, parent_id: DoId, zone_id: Zone) {
        self.info.parent_id = parent_id;
        self.info.zone_id = zone_id;
        info!(do_id = self.info.do_id, parent_id, zone_id, "moved");
    }

    fn on_delete(&mut self) {
        info!(do_id = self.info.do_id, "deleted");
    }
}

// ---------------------------------------------------------------------------
// Avatar AI
// ---------------------------------------------------------------------------

/// AI side of an avatar: tracks its state and answers `/heal` in chat.
pub struct AvatarAI {
    inner: LoggingView,
    name: String,
    hp: i128,
}

impl AvatarAI {
    pub const MAX_HP: u16 = 100;

    pub fn new(handle: RepositoryHandle, info: ObjectInfo) -> Self {
        Self {
            inner: LoggingView::new(handle, info),
            name: String::new(),
            hp: 0,
        }
    }

    fn heal(&mut self) -> Result<(), RepositoryError> {
        let info = self.inner.info;
        self.inner
            .handle
            .send_update(info.do_id, info.class_id, "hp", &[Self::MAX_HP.into()])?;
        self.hp = i128::from(Self::MAX_HP);
        info!(do_id = info.do_id, name = %self.name, "healed");
        Ok(())
    }
}

impl DistributedObjectView for AvatarAI {
    fn on_generate(&mut self, info: &ObjectInfo) {
        self.inner.on_generate(info);
    }

    fn on_field_update(
        &mut self,
        sender: Option<Channel>,
        field_id: FieldId,
        args: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError> {
        let (field, values) = self.inner.decode(field_id, args)?;
        match (field.as_str(), values.as_slice()) {
            ("name", [Value::String(name)]) => self.name.clone_from(name),
            ("hp", [hp]) => self.hp = hp.as_int().unwrap_or_default(),
            ("setChat", [message]) => {
                info!(do_id = self.inner.info.do_id, ?sender, name = %self.name, message = %message, "chat");
                if message.as_str() == Some("/heal") && self.hp < i128::from(Self::MAX_HP) {
                    self.heal()?;
                }
            }
            _ => debug!(do_id = self.inner.info.do_id, field, ?values, "field update"),
        }
        Ok(())
    }

    fn on_location_change(&mut self, parent_id: DoId, zone_id: Zone) {
        self.inner.on_location_change(parent_id, zone_id);
    }

    fn on_delete(&mut self) {
        self.inner.on_delete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astron_repository::{ClassRegistry, ViewRole};

    const EXAMPLE_DC: &str = include_str!("../example.dc");

    #[test]
    fn test_example_schema_binds_every_view() {
        let schema = astron_dc::parse_str(EXAMPLE_DC).unwrap();
        let registry = ClassRegistry::build(schema, &factories()).unwrap();

        let avatar = registry.class_id("DistributedAvatar").unwrap();
        for role in [ViewRole::Client, ViewRole::Ai, ViewRole::Owner] {
            assert!(registry.has_view(avatar, role), "{role:?}");
        }
        assert!(!registry.has_view(avatar, ViewRole::AiEditor));

        let contact = registry.class_id("AnonymousContact").unwrap();
        assert!(registry.has_view(contact, ViewRole::UberDog));
        assert!(!registry.has_view(contact, ViewRole::Ai));
    }

    #[test]
    fn test_example_schema_needs_every_imported_view() {
        let schema = astron_dc::parse_str(EXAMPLE_DC).unwrap();
        let mut partial = ViewFactories::new();
        partial.register("Root", |handle, info| Box::new(LoggingView::new(handle, info)));
        assert!(matches!(
            ClassRegistry::build(schema, &partial),
            Err(RepositoryError::ViewNotFound { view, .. }) if view == "RootAI"
        ));
    }

    #[test]
    fn test_example_avatar_required_fields() {
        let schema = astron_dc::parse_str(EXAMPLE_DC).unwrap();
        let avatar = schema.class("DistributedAvatar").unwrap();
        let names: Vec<&str> = avatar.required_fields().map(|f| f.name()).collect();
        assert_eq!(names, ["name", "hp", "position"]);
    }
}
