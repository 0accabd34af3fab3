//! Browser resource management
//!
//! Persistent processes, ephemeral isolated sessions, and the pool that
//! multiplexes one over the other under a global concurrency bound.

mod fingerprint;
mod pool;
mod process;

pub use fingerprint::Fingerprint;
pub use pool::{BrowserPool, PoolStats, Session};
pub use process::{BrowserProcess, ProcessStats};
