//! Entity contracts and per-type descriptors.

mod entity_type;

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Serialize, de::DeserializeOwned};

pub use entity_type::{EntityType, KeyGenerator, VersionAttribute, VersionReader};

/// A persistable type.
///
/// Entities travel through sessions in their serde form, so the trait only
/// asks for serde support and access to the primary key.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Key: Serialize + DeserializeOwned + Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Primary key, or `None` while the entity has not been assigned one.
    fn key(&self) -> Option<Self::Key>;
}
