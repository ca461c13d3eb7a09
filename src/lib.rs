// ============================================================================
// SuriJPA Library
// ============================================================================

//! Fluent JPQL assembly and repository facades over a persistence session.
//!
//! - [`Jpql`] accumulates clause fragments and named parameters, renders them
//!   into one query string and executes it through the session.
//! - [`EntityRepository`] and [`GenericEntityRepository`] forward save,
//!   remove, refresh, detach and lookups to the session and add an optimistic
//!   version check.
//! - [`InMemorySession`] is a self-contained persistence context for
//!   applications and tests that run without an external store.
//!
//! # Examples
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use surijpa::{
//!     DataType, Entity, EntityRepository, EntityType, InMemorySession, SessionConfig, Value,
//! };
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Book {
//!     id: Option<i64>,
//!     title: String,
//!     version: i32,
//! }
//!
//! impl Entity for Book {
//!     type Key = i64;
//!     fn key(&self) -> Option<i64> {
//!         self.id
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> surijpa::Result<()> {
//! let book_type = EntityType::<Book>::new("Book")
//!     .with_version("version", DataType::Integer, |b| Some(Value::from(b.version)))
//!     .with_key_generator(|b, seq| b.id = Some(seq));
//!
//! let session = InMemorySession::new(SessionConfig::new("books"))?;
//! session.register_entity(&book_type).await;
//!
//! let books = EntityRepository::new(session, book_type);
//! let saved = books
//!     .save(Book { id: None, title: "Dune".into(), version: 0 })
//!     .await?;
//!
//! let titles: Vec<String> = books
//!     .select(["b.title"])
//!     .from(["Book b"])
//!     .where_(["b.version = :version"])
//!     .with_param("version", 0)
//!     .get_result_list_as()
//!     .await?;
//! assert_eq!(titles, vec!["Dune".to_string()]);
//!
//! let key = saved.id.unwrap_or_default();
//! assert!(books.find_by_and_check_version(&key, 0).await?.is_some());
//! assert!(books.find_by_and_check_version(&key, 1).await.is_err());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod criteria;
pub mod memory;
pub mod metamodel;
pub mod repository;
pub mod session;

// Re-export main types for convenience
pub use core::{DataType, Params, PersistenceError, Result, ResultRow, Value};
pub use criteria::{JoinKind, Jpql, QuerySpec};
pub use memory::InMemorySession;
pub use metamodel::{Entity, EntityType};
pub use repository::{EntityRepository, GenericEntityRepository};
pub use session::{FlushMode, IdentityProbe, KeyPresence, PersistenceSession, SessionConfig};

pub mod prelude {
    pub use crate::{
        DataType, Entity, EntityRepository, EntityType, FlushMode, GenericEntityRepository,
        InMemorySession, Jpql, Params, PersistenceError, PersistenceSession, Result,
        SessionConfig, Value,
    };
}
