pub mod error;
pub mod types;
pub mod value;

pub use error::{PersistenceError, Result};
pub use types::{DataType, Params, ResultRow};
pub use value::Value;
