//! Worker threads and work splitting used by the indexer.

mod parallel_for;
mod thread_pool;

pub use parallel_for::{parallel_for_each, parallel_for_each_by_cost, try_parallel_for_each_by_cost};
pub(crate) use thread_pool::panic_message;
pub use thread_pool::{TaskHandle, ThreadPool};
