pub mod sqlite;
pub mod vector;

pub use sqlite::{Database, DbPool};
pub use vector::{DistanceMetric, SearchResult, VectorStore};
