//! Distributed-Class (DC) schema support for Astron.
//!
//! Parses the DC interface-definition language into a typed [`Schema`]:
//! typedefs, structs, distributed classes with flattened inheritance, and
//! view imports. Each field receives the numeric id the cluster uses on the
//! wire, and each `dclass` a class id in declaration order.
//!
//! ```
//! let schema = astron_dc::parse_str(
//!     "dclass Avatar {\n    setHP(uint8) broadcast ownrecv;\n};\n",
//! )
//! .unwrap();
//! let avatar = schema.class("Avatar").unwrap();
//! assert_eq!(avatar.fields[0].name(), "setHP");
//! ```

mod error;
mod hash;
mod parser;
mod schema;
pub mod syntax;

pub use error::ParseError;
pub use hash::HashGenerator;
pub use parser::{Parser, parse_file, parse_str};
pub use schema::{
    ArrayLength, AtomicField, Class, ClassId, DataType, Declaration, Field, FieldId, Import,
    KeywordSet, MethodField, MolecularField, Parameter, Schema, Struct, Typedef,
};
pub use syntax::{Keyword, Primitive};
