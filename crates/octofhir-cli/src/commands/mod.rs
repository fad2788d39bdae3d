pub mod cache;
pub mod limit;
pub mod lock;
pub mod ping;
