//! Storage contracts the engine depends on, plus in-memory implementations.

pub mod cache;
pub mod data;

pub use cache::{CacheStore, MemoryCache};
pub use data::{DataStore, MemoryDataStore};
