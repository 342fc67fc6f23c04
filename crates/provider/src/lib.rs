//! Resource reconciliation for Stratum.
//!
//! This crate turns declared resources into calls against the credential
//! engine, the storage network and the auth service:
//! - `storj_bucket` and `storj_object` resources and data sources
//! - the `storj_objects` listing data source
//! - `storj_access_grant` derivation and `storj_edge_credentials` registration
//!
//! Failures are reported as [`Diagnostics`]; successful operations return a
//! [`ResourceState`] whose sensitive attributes are flagged by the schema.

pub mod context;
pub mod diagnostics;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod state;

pub use context::{OperationContext, ProjectGuard};
pub use diagnostics::{Diagnostic, Diagnostics, ErrorKind, Severity};
pub use provider::Provider;
pub use resources::access_grant::{AccessGrantConfig, BucketScope};
pub use resources::bucket::BucketConfig;
pub use resources::edge_credentials::EdgeCredentialsConfig;
pub use resources::object::{ContentSource, ObjectConfig, ObjectsQuery};
pub use resources::{DataSource, OperationResult, Resource};
pub use schema::{AttributeMode, AttributeSchema, Schema};
pub use state::{Attribute, ResourceState, SENSITIVE_PLACEHOLDER};
