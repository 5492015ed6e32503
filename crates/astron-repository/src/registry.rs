//! Class ids, fields and bound views, fixed at repository construction.

use std::collections::HashMap;
use std::fmt;

use astron_dc::{Class, ClassId, Field, FieldId, Schema};
use tracing::debug;

use crate::error::RepositoryError;
use crate::view::{ViewFactories, ViewFactory, ViewRole};

/// Read-only lookup tables derived from a parsed schema.
///
/// Views are bound through the schema's `from ... import` declarations: each
/// imported view name is split into class name and role suffix, and must have a
/// factory registered under that name.
pub struct ClassRegistry {
    schema: Schema,
    dc_hash: u32,
    views: HashMap<(ClassId, ViewRole), ViewFactory>,
}

impl ClassRegistry {
    pub fn build(schema: Schema, factories: &ViewFactories) -> Result<Self, RepositoryError> {
        let mut imported = Vec::new();
        for import in schema.imports() {
            let class = schema
                .class(&import.class_name)
                .ok_or_else(|| RepositoryError::ClassNotFound(import.class_name.clone()))?;
            for view_name in &import.views {
                let role = view_name
                    .strip_prefix(class.name.as_str())
                    .and_then(ViewRole::from_suffix)
                    .ok_or_else(|| RepositoryError::InvalidViewRole(view_name.clone()))?;
                imported.push((class, role, view_name, &import.module));
            }
        }

        let mut views = HashMap::new();
        for (class, role, view_name, module) in imported {
            let factory = factories
                .get(view_name)
                .ok_or_else(|| RepositoryError::ViewNotFound {
                    class: class.name.clone(),
                    view: view_name.clone(),
                })?;
            debug!(view = %view_name, class_id = class.id, %module, "bound view");
            views.insert((class.id, role), factory.clone());
        }
        let dc_hash = schema.legacy_hash();
        Ok(Self {
            schema,
            dc_hash,
            views,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Legacy hash of the schema, sent in `CLIENT_HELLO`.
    pub fn dc_hash(&self) -> u32 {
        self.dc_hash
    }

    pub fn class_id(&self, name: &str) -> Result<ClassId, RepositoryError> {
        self.schema
            .class_id(name)
            .ok_or_else(|| RepositoryError::ClassNotFound(name.to_string()))
    }

    pub fn class(&self, id: ClassId) -> Result<&Class, RepositoryError> {
        self.schema
            .class_by_id(id)
            .ok_or(RepositoryError::ClassIdNotFound(id))
    }

    pub fn class_name(&self, id: ClassId) -> Result<&str, RepositoryError> {
        self.class(id).map(|c| c.name.as_str())
    }

    pub fn class_by_name(&self, name: &str) -> Result<&Class, RepositoryError> {
        self.schema
            .class(name)
            .ok_or_else(|| RepositoryError::ClassNotFound(name.to_string()))
    }

    pub fn field(&self, class_id: ClassId, field_id: FieldId) -> Result<&Field, RepositoryError> {
        let class = self.class(class_id)?;
        class
            .field_by_id(field_id)
            .ok_or_else(|| RepositoryError::FieldNotFound {
                class: class.name.clone(),
                field: field_id.to_string(),
            })
    }

    pub fn field_by_name(&self, class_id: ClassId, name: &str) -> Result<&Field, RepositoryError> {
        let class = self.class(class_id)?;
        class.field(name).ok_or_else(|| RepositoryError::FieldNotFound {
            class: class.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn factory(&self, class_id: ClassId, role: ViewRole) -> Option<&ViewFactory> {
        self.views.get(&(class_id, role))
    }

    pub fn has_view(&self, class_id: ClassId, role: ViewRole) -> bool {
        self.views.contains_key(&(class_id, role))
    }

    /// Factory for `class_id` in `role`, or [`RepositoryError::ViewNotFound`].
    pub(crate) fn require_factory(
        &self,
        class_id: ClassId,
        role: ViewRole,
    ) -> Result<&ViewFactory, RepositoryError> {
        if let Some(factory) = self.factory(class_id, role) {
            return Ok(factory);
        }
        let class = self.class_name(class_id)?;
        Err(RepositoryError::ViewNotFound {
            class: class.to_string(),
            view: role.view_name(class),
        })
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.schema.class_count())
            .field("views", &self.views.len())
            .field("dc_hash", &self.dc_hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::DistributedObjectView;
    use astron_dc::parse_str;
    use astron_net::{Channel, DatagramIterator};

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

    const DC: &str = "\
from views import Avatar/AI/OV
from views import Shop

dclass Shop {
    uint32 gold required;
};

dclass Avatar {
    string name required;
    setHP(uint8) broadcast;
};
";

    const ALL_VIEWS: [&str; 4] = ["Avatar", "AvatarAI", "AvatarOV", "Shop"];

    fn factories(names: &[&str]) -> ViewFactories {
        let mut factories = ViewFactories::new();
        for name in names {
            factories.register(*name, |_, _| Box::new(Inert));
        }
        factories
    }

    #[test]
    fn test_ids_follow_declaration_order() {
        let registry = ClassRegistry::build(parse_str(DC).unwrap(), &factories(&ALL_VIEWS)).unwrap();
        assert_eq!(registry.class_id("Shop").unwrap(), 0);
        assert_eq!(registry.class_id("Avatar").unwrap(), 1);
        assert_eq!(registry.class_name(1).unwrap(), "Avatar");
        assert!(matches!(registry.class(9), Err(RepositoryError::ClassIdNotFound(9))));
        assert!(matches!(
            registry.class_id("Ghost"),
            Err(RepositoryError::ClassNotFound(_))
        ));
    }

    #[test]
    fn test_views_bound_by_role() {
        let registry = ClassRegistry::build(parse_str(DC).unwrap(), &factories(&ALL_VIEWS)).unwrap();
        assert!(registry.has_view(1, ViewRole::Ai));
        assert!(registry.has_view(1, ViewRole::Owner));
        assert!(registry.has_view(1, ViewRole::Client));
        assert!(registry.has_view(0, ViewRole::Client));
        assert!(!registry.has_view(1, ViewRole::UberDog));
        assert!(matches!(
            registry.require_factory(1, ViewRole::UberDog),
            Err(RepositoryError::ViewNotFound { view, .. }) if view == "AvatarUD"
        ));
    }

    #[test]
    fn test_imported_view_without_factory() {
        let err = ClassRegistry::build(
            parse_str(DC).unwrap(),
            &factories(&["Avatar", "AvatarAI", "Shop", "Unrelated"]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::ViewNotFound { class, view } if class == "Avatar" && view == "AvatarOV"
        ));
    }

    #[test]
    fn test_unused_factories_are_ignored() {
        let mut names = ALL_VIEWS.to_vec();
        names.push("Unrelated");
        let registry = ClassRegistry::build(parse_str(DC).unwrap(), &factories(&names)).unwrap();
        assert_eq!(registry.views.len(), 4);
    }

    #[test]
    fn test_import_of_unknown_class() {
        let dc = "from views import Ghost/AI\n";
        assert!(matches!(
            ClassRegistry::build(parse_str(dc).unwrap(), &ViewFactories::new()),
            Err(RepositoryError::ClassNotFound(name)) if name == "Ghost"
        ));
    }

    #[test]
    fn test_unknown_role_suffix() {
        let dc = "from views import Avatar/XY\n\ndclass Avatar {\n    uint8 hp;\n};\n";
        assert!(matches!(
            ClassRegistry::build(parse_str(dc).unwrap(), &ViewFactories::new()),
            Err(RepositoryError::InvalidViewRole(name)) if name == "AvatarXY"
        ));
    }

    #[test]
    fn test_field_lookups() {
        let registry = ClassRegistry::build(parse_str(DC).unwrap(), &factories(&ALL_VIEWS)).unwrap();
        let set_hp = registry.field_by_name(1, "setHP").unwrap();
        assert_eq!(registry.field(1, set_hp.id()).unwrap().name(), "setHP");
        assert!(matches!(
            registry.field(1, 0),
            Err(RepositoryError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_dc_hash_matches_schema() {
        let schema = parse_str(DC).unwrap();
        let expected = schema.legacy_hash();
        let registry = ClassRegistry::build(schema, &factories(&ALL_VIEWS)).unwrap();
        assert_eq!(registry.dc_hash(), expected);
    }
}
