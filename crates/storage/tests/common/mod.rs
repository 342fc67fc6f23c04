pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{ROOT_SECRET, TestNetwork, all_networks, get, put, root_grant, seeded_bytes};
