//! Process-wide locations: the cache root and the layout beneath it.

pub mod cache;
pub mod utils;
