//! Error types, shared with the other thermguard crates

pub use tg_error::{Result, ThermError};
