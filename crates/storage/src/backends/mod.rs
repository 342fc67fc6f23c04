//! Storage network backends.

pub mod filesystem;
pub mod memory;
