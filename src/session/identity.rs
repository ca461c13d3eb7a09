use crate::metamodel::{Entity, EntityType};

/// Decides whether an entity instance is new (to be inserted) or existing
/// (to be merged).
pub trait IdentityProbe: Send + Sync {
    fn is_new<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> bool;
}

/// Treats an entity as new exactly when its primary key is unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyPresence;

impl IdentityProbe for KeyPresence {
    fn is_new<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> bool {
        ty.key_of(entity).is_none()
    }
}
