//! Queue module: retry policy and the in-memory delay queue.

mod memory;
mod retry;

pub use memory::InMemoryDelayQueue;
pub use retry::RetryPolicy;
