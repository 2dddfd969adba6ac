pub mod base;
pub mod click;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod models;
pub mod ranking;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{CacheRefresher, Recommender};
