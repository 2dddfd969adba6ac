//! Online side of the recommender: dataset loading, cache refresh and
//! request-time resolution.

pub mod loader;
pub mod recommender;
pub mod refresher;

pub use recommender::{Fallback, Recommender};
pub use refresher::CacheRefresher;
