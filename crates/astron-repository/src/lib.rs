//! Object repositories for the Astron cluster.
//!
//! An [`ObjectRepository`] connects to a message director (as an AI or
//! UberDOG, [`Protocol::Internal`]) or to a client agent (as a game client,
//! [`Protocol::Client`]). It parses the DC file into a [`ClassRegistry`],
//! binds the application's [`DistributedObjectView`] factories to the classes
//! the DC file imports, keeps one view per live object and routes field
//! updates to it.

mod client;
mod config;
mod error;
mod handle;
mod ids;
mod internal;
mod registry;
mod repository;
pub mod values;
mod view;

pub use config::{Protocol, RepositoryConfig};
pub use error::RepositoryError;
pub use handle::RepositoryHandle;
pub use ids::{ContextGenerator, UniqueIdAllocator};
pub use registry::ClassRegistry;
pub use repository::{Handler, ObjectRepository, Task};
pub use values::Value;
pub use view::{DistributedObjectView, ObjectInfo, ViewFactories, ViewFactory, ViewRole};
