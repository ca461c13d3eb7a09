use std::fmt;

use crate::core::{DataType, PersistenceError, Result, Value};

use super::Entity;

/// Reads the version stamp of an entity. `None` means the stamp is unset.
pub type VersionReader<E> = fn(&E) -> Option<Value>;

/// Assigns a generated identifier to a new entity from a per-type sequence.
pub type KeyGenerator<E> = fn(&mut E, i64);

/// Version attribute declared for an entity type.
pub struct VersionAttribute<E> {
    name: &'static str,
    data_type: DataType,
    read: VersionReader<E>,
}

impl<E> VersionAttribute<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn read(&self, entity: &E) -> Option<Value> {
        (self.read)(entity)
    }
}

impl<E> Clone for VersionAttribute<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            data_type: self.data_type,
            read: self.read,
        }
    }
}

impl<E> fmt::Debug for VersionAttribute<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionAttribute")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .finish()
    }
}

/// Explicit descriptor of a managed entity type.
///
/// Carries everything the facade and the sessions need to know about `E`
/// beyond its serde form: the name used in query text, the optional version
/// attribute used for optimistic locking, and the optional key generator
/// applied on insert.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use surijpa::{DataType, Entity, EntityType, Value};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Invoice {
///     id: Option<i64>,
///     version: i32,
/// }
///
/// impl Entity for Invoice {
///     type Key = i64;
///     fn key(&self) -> Option<i64> {
///         self.id
///     }
/// }
///
/// let invoice_type = EntityType::<Invoice>::new("Invoice")
///     .with_version("version", DataType::Integer, |i| Some(Value::from(i.version)))
///     .with_key_generator(|i, seq| i.id = Some(seq));
///
/// assert_eq!(invoice_type.name(), "Invoice");
/// assert!(invoice_type.version(DataType::Integer).is_ok());
/// ```
pub struct EntityType<E> {
    name: &'static str,
    version: Option<VersionAttribute<E>>,
    key_generator: Option<KeyGenerator<E>>,
}

impl<E: Entity> EntityType<E> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            version: None,
            key_generator: None,
        }
    }

    pub fn with_version(
        mut self,
        attribute: &'static str,
        data_type: DataType,
        read: VersionReader<E>,
    ) -> Self {
        self.version = Some(VersionAttribute {
            name: attribute,
            data_type,
            read,
        });
        self
    }

    pub fn with_key_generator(mut self, generator: KeyGenerator<E>) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// Entity name as it appears in query text.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key_of(&self, entity: &E) -> Option<E::Key> {
        entity.key()
    }

    pub fn key_generator(&self) -> Option<KeyGenerator<E>> {
        self.key_generator
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Resolves the version attribute, requiring it to be declared with `data_type`.
    pub fn version(&self, data_type: DataType) -> Result<&VersionAttribute<E>> {
        let attribute = self.version.as_ref().ok_or_else(|| {
            PersistenceError::Metadata(format!(
                "entity '{}' declares no version attribute",
                self.name
            ))
        })?;

        if attribute.data_type != data_type {
            return Err(PersistenceError::Metadata(format!(
                "version attribute '{}.{}' is {}, not {}",
                self.name, attribute.name, attribute.data_type, data_type
            )));
        }

        Ok(attribute)
    }
}

impl<E> Clone for EntityType<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            version: self.version.clone(),
            key_generator: self.key_generator,
        }
    }
}

impl<E> fmt::Debug for EntityType<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("version", &self.version.as_ref().map(|v| v.name))
            .field("generated_key", &self.key_generator.is_some())
            .finish()
    }
}
