pub mod collect;
pub mod concat;
pub mod filter;
pub mod flat_map;
pub mod handle;
pub mod into_stream;
pub mod log;
pub mod map;
pub mod merge;
pub mod publish_on;
pub mod repeat;
mod resubscribe;
pub mod retry;
pub mod subscribe_on;
pub mod tap;
