//! Typed representation of a parsed DC file.

use std::collections::BTreeSet;
use std::fmt;

use crate::syntax::{Keyword, Primitive};

/// Wire identifier of a field, unique across the whole file.
pub type FieldId = u16;

/// Wire identifier of a distributed class.
pub type ClassId = u16;

pub type KeywordSet = BTreeSet<Keyword>;

/// Length of an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLength {
    /// Length-prefixed on the wire (`type[]` or `type[lo-hi]`).
    Variable,
    /// Exactly `n` elements, no prefix (`type[n]`).
    Fixed(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Primitive(Primitive),
    /// A previously declared struct, referenced by name.
    Struct(String),
    Array {
        element: Box<DataType>,
        length: ArrayLength,
    },
}

impl DataType {
    pub fn array(element: DataType, length: ArrayLength) -> Self {
        DataType::Array {
            element: Box::new(element),
            length,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{p}"),
            DataType::Struct(name) => f.write_str(name),
            DataType::Array {
                element,
                length: ArrayLength::Variable,
            } => write!(f, "{element}[]"),
            DataType::Array {
                element,
                length: ArrayLength::Fixed(n),
            } => write!(f, "{element}[{n}]"),
        }
    }
}

/// One typed slot of a method or molecular field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub data_type: DataType,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicField {
    pub id: FieldId,
    pub name: String,
    pub data_type: DataType,
    /// Literal after `=`, kept as written.
    pub default: Option<String>,
    pub keywords: KeywordSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MolecularField {
    pub id: FieldId,
    pub name: String,
    pub components: Vec<String>,
    pub component_ids: Vec<FieldId>,
    /// Union of the components' keywords.
    pub keywords: KeywordSet,
    /// Components' parameters, concatenated in component order.
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodField {
    pub id: FieldId,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub keywords: KeywordSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Atomic(AtomicField),
    Molecular(MolecularField),
    Method(MethodField),
}

impl Field {
    pub fn id(&self) -> FieldId {
        match self {
            Field::Atomic(f) => f.id,
            Field::Molecular(f) => f.id,
            Field::Method(f) => f.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Field::Atomic(f) => &f.name,
            Field::Molecular(f) => &f.name,
            Field::Method(f) => &f.name,
        }
    }

    pub fn keywords(&self) -> &KeywordSet {
        match self {
            Field::Atomic(f) => &f.keywords,
            Field::Molecular(f) => &f.keywords,
            Field::Method(f) => &f.keywords,
        }
    }

    pub fn has_keyword(&self, keyword: &Keyword) -> bool {
        self.keywords().contains(keyword)
    }

    pub fn is_molecular(&self) -> bool {
        matches!(self, Field::Molecular(_))
    }

    /// Types this field puts on the wire, in order.
    pub fn parameter_types(&self) -> Vec<&DataType> {
        match self {
            Field::Atomic(f) => vec![&f.data_type],
            Field::Molecular(f) => f.parameters.iter().map(|p| &p.data_type).collect(),
            Field::Method(f) => f.parameters.iter().map(|p| &p.data_type).collect(),
        }
    }

    /// Parameters as a list, with an atomic field seen as one named parameter.
    pub fn parameters(&self) -> Vec<Parameter> {
        match self {
            Field::Atomic(f) => vec![Parameter {
                data_type: f.data_type.clone(),
                name: Some(f.name.clone()),
            }],
            Field::Molecular(f) => f.parameters.clone(),
            Field::Method(f) => f.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typedef {
    pub alias: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Struct {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Struct {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

/// A distributed class with its inheritance already flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    /// Resolved parents in declaration order; unresolved ones are dropped.
    pub parents: Vec<String>,
    /// Inherited fields first (parent order), then the class's own fields.
    pub fields: Vec<Field>,
    /// How many entries at the front of `fields` were inherited.
    pub inherited: usize,
}

impl Class {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn field_by_id(&self, id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| f.id() == id)
    }

    pub fn own_fields(&self) -> &[Field] {
        &self.fields[self.inherited..]
    }

    pub fn inherited_fields(&self) -> &[Field] {
        &self.fields[..self.inherited]
    }

    /// Non-molecular `required` fields, in flattened order.
    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| !f.is_molecular() && f.has_keyword(&Keyword::Required))
    }
}

/// Binding of a class name to its externally supplied views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub class_name: String,
    /// `class_name` followed by `class_name + suffix` for each suffix.
    pub views: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Typedef(Typedef),
    Struct(Struct),
    Class(Class),
    Import(Import),
}

/// An ordered DC document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub declarations: Vec<Declaration>,
    /// Custom keywords declared with `keyword`, in order.
    pub keywords: Vec<String>,
}

impl Schema {
    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Class(c) => Some(c),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &Struct> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn typedefs(&self) -> impl Iterator<Item = &Typedef> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Typedef(t) => Some(t),
            _ => None,
        })
    }

    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Import(i) => Some(i),
            _ => None,
        })
    }

    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes().find(|c| c.name == name)
    }

    pub fn class_by_id(&self, id: ClassId) -> Option<&Class> {
        self.classes().find(|c| c.id == id)
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.class(name).map(|c| c.id)
    }

    pub fn struct_def(&self, name: &str) -> Option<&Struct> {
        self.structs().find(|s| s.name == name)
    }

    pub fn class_count(&self) -> usize {
        self.classes().count()
    }
}
