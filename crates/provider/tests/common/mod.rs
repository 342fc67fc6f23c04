//! Common test utilities and fixtures.

pub mod faulty;
pub mod fixtures;

#[allow(unused_imports)]
pub use faulty::*;
#[allow(unused_imports)]
pub use fixtures::*;
