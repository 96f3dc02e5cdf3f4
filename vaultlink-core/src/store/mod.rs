pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::{SqliteStore, StoreTx};
pub use traits::{GraphRead, GraphWrite};
