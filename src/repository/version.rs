use tracing::{Level, event};

use crate::core::{DataType, PersistenceError, Result, Value};
use crate::metamodel::{Entity, EntityType};

/// Compares the version stamp of `entity` with `expected`.
///
/// A missing entity passes. A version attribute that is not declared, is
/// declared with another type, or is unset or null on the instance is a
/// metadata error and never a conflict.
pub fn check_version<E: Entity>(
    ty: &EntityType<E>,
    entity: Option<&E>,
    expected: Value,
    data_type: DataType,
) -> Result<()> {
    let Some(entity) = entity else {
        return Ok(());
    };

    let attribute = ty.version(data_type)?;
    let actual = attribute.read(entity).ok_or_else(|| {
        PersistenceError::Metadata(format!(
            "version attribute '{}.{}' is unset",
            ty.name(),
            attribute.name()
        ))
    })?;
    if actual.is_null() {
        return Err(PersistenceError::Metadata(format!(
            "version attribute '{}.{}' is null",
            ty.name(),
            attribute.name()
        )));
    }
    if !data_type.is_compatible(&actual) {
        return Err(PersistenceError::Metadata(format!(
            "version attribute '{}.{}' read a {} value, declared {}",
            ty.name(),
            attribute.name(),
            actual.type_name(),
            data_type
        )));
    }

    if actual == expected {
        return Ok(());
    }

    event!(
        Level::WARN,
        entity = ty.name(),
        key = ?ty.key_of(entity),
        expected = %expected,
        actual = %actual,
        "optimistic lock conflict"
    );
    Err(PersistenceError::OptimisticLock {
        entity_name: ty.name().to_string(),
        entity: serde_json::to_value(entity)?,
        expected,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Order {
        id: Option<i64>,
        version: Option<i32>,
        updated: chrono::DateTime<Utc>,
    }

    impl Entity for Order {
        type Key = i64;

        fn key(&self) -> Option<i64> {
            self.id
        }
    }

    fn order_type() -> EntityType<Order> {
        EntityType::<Order>::new("Order").with_version("version", DataType::Integer, |o| {
            o.version.map(Value::from)
        })
    }

    fn order(version: Option<i32>) -> Order {
        Order {
            id: Some(1),
            version,
            updated: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_matching_version_passes() {
        let ty = order_type();
        check_version(&ty, Some(&order(Some(3))), Value::from(3), DataType::Integer).unwrap();
    }

    #[test]
    fn test_missing_entity_is_not_checked() {
        let ty = EntityType::<Order>::new("Order");
        check_version(&ty, None, Value::from(3), DataType::Integer).unwrap();
    }

    #[test]
    fn test_mismatch_carries_entity() {
        let ty = order_type();
        let err = check_version(&ty, Some(&order(Some(4))), Value::from(3), DataType::Integer)
            .unwrap_err();
        match err {
            PersistenceError::OptimisticLock {
                entity_name,
                entity,
                expected,
                actual,
            } => {
                assert_eq!(entity_name, "Order");
                assert_eq!(entity["id"], serde_json::json!(1));
                assert_eq!(expected, Value::Integer(3));
                assert_eq!(actual, Value::Integer(4));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unset_or_mistyped_version_is_metadata_error() {
        let ty = order_type();
        assert!(matches!(
            check_version(&ty, Some(&order(None)), Value::from(1), DataType::Integer),
            Err(PersistenceError::Metadata(_))
        ));
        assert!(matches!(
            check_version(
                &ty,
                Some(&order(Some(1))),
                Value::from(Utc::now()),
                DataType::Timestamp
            ),
            Err(PersistenceError::Metadata(_))
        ));
    }

    #[test]
    fn test_null_version_is_metadata_error() {
        let ty = EntityType::<Order>::new("Order").with_version("version", DataType::Integer, |o| {
            Some(Value::from(o.version))
        });
        let err = check_version(&ty, Some(&order(None)), Value::from(3), DataType::Integer)
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Metadata(_)));
        assert!(!err.is_optimistic_lock());
    }

    #[test]
    fn test_reader_must_honour_declared_type() {
        let ty = EntityType::<Order>::new("Order").with_version("version", DataType::Integer, |o| {
            Some(Value::from(o.updated))
        });
        assert!(matches!(
            check_version(&ty, Some(&order(Some(1))), Value::from(1), DataType::Integer),
            Err(PersistenceError::Metadata(_))
        ));
    }

    #[test]
    fn test_timestamp_versions() {
        let stamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ty = EntityType::<Order>::new("Order").with_version(
            "updated",
            DataType::Timestamp,
            |o| Some(Value::from(o.updated)),
        );
        check_version(&ty, Some(&order(None)), Value::from(stamp), DataType::Timestamp).unwrap();
    }
}
