pub mod analytics;
pub mod api;
pub mod clock;
pub mod config;
pub mod storage;
pub mod tracker;

pub use tracker::AccessTracker;
