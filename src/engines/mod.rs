pub mod sqlite;

pub use sqlite::{SqliteCollection, SqliteVectorStore};
