//! Repository facades over a [`PersistenceSession`](crate::session::PersistenceSession).

mod entity;
mod generic;
mod version;

pub use entity::EntityRepository;
pub use generic::GenericEntityRepository;
pub use version::check_version;
