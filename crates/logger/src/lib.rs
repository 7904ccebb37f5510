//! Shared tracing bootstrap for Uppe binaries.

mod subscriber;

pub use subscriber::{init, init_with_level};
