//! Application-side object views and the factories that build them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use astron_dc::{ClassId, FieldId};
use astron_net::{Channel, DatagramIterator, DoId, Zone};

use crate::error::RepositoryError;
use crate::handle::RepositoryHandle;

/// Role a view plays for its class, encoded as a suffix on the class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewRole {
    /// The bare class name.
    Client,
    Ai,
    Owner,
    UberDog,
    AiEditor,
}

impl ViewRole {
    pub const ALL: [ViewRole; 5] = [
        ViewRole::Client,
        ViewRole::Ai,
        ViewRole::Owner,
        ViewRole::UberDog,
        ViewRole::AiEditor,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            ViewRole::Client => "",
            ViewRole::Ai => "AI",
            ViewRole::Owner => "OV",
            ViewRole::UberDog => "UD",
            ViewRole::AiEditor => "AE",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.suffix() == suffix)
    }

    /// Full view name for `class_name`, e.g. `DistributedAvatarAI`.
    pub fn view_name(self, class_name: &str) -> String {
        format!("{class_name}{}", self.suffix())
    }
}

/// Identity and location of a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub do_id: DoId,
    pub class_id: ClassId,
    pub parent_id: DoId,
    pub zone_id: Zone,
}

/// Per-object application behavior.
///
/// The repository owns every view and calls these hooks in arrival order.
/// `on_field_update` gets an iterator over exactly the bytes of that one
/// field, so a view that does not care about a field can ignore it.
pub trait DistributedObjectView: Send {
    /// Called once all required fields of a new object have been delivered.
    fn on_generate(&mut self, _info: &ObjectInfo) {}

    fn on_field_update(
        &mut self,
        sender: Option<Channel>,
        field_id: FieldId,
        args: &mut DatagramIterator<'_>,
    ) -> Result<(), RepositoryError>;

    fn on_location_change(&mut self, _parent_id: DoId, _zone_id: Zone) {}

    /// Called before the repository drops the view.
    fn on_delete(&mut self) {}
}

/// Builds a view for a newly entered or created object.
pub type ViewFactory =
    Arc<dyn Fn(RepositoryHandle, ObjectInfo) -> Box<dyn DistributedObjectView> + Send + Sync>;

/// View factories keyed by full view name, supplied by the application.
#[derive(Clone, Default)]
pub struct ViewFactories {
    factories: HashMap<String, ViewFactory>,
}

impl ViewFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, view_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(RepositoryHandle, ObjectInfo) -> Box<dyn DistributedObjectView> + Send + Sync + 'static,
    {
        self.factories.insert(view_name.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, view_name: &str) -> Option<&ViewFactory> {
        self.factories.get(view_name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ViewFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ViewFactories").field("views", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert;

    impl DistributedObjectView for Inert {
        fn on_field_update(
            &mut self,
            _sender: Option<Channel>,
            _field_id: FieldId,
            _args: &mut DatagramIterator<'_>,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[test]
    fn test_role_suffixes() {
        assert_eq!(ViewRole::from_suffix("AI"), Some(ViewRole::Ai));
        assert_eq!(ViewRole::from_suffix("OV"), Some(ViewRole::Owner));
        assert_eq!(ViewRole::from_suffix(""), Some(ViewRole::Client));
        assert_eq!(ViewRole::from_suffix("XY"), None);
        assert_eq!(ViewRole::UberDog.view_name("Login"), "LoginUD");
    }

    #[test]
    fn test_factories_by_name() {
        let mut factories = ViewFactories::new();
        factories
            .register("AvatarAI", |_, _| Box::new(Inert))
            .register("Avatar", |_, _| Box::new(Inert));
        assert_eq!(factories.len(), 2);
        assert!(factories.get("AvatarAI").is_some());
        assert!(factories.get("AvatarOV").is_none());
        assert_eq!(format!("{factories:?}"), "ViewFactories { views: [\"Avatar\", \"AvatarAI\"] }");
    }
}
