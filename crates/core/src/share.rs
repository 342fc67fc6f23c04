//! Deriving narrower grants.

use crate::access::{AccessGrant, Caveat};
use crate::error::{Error, Result};
use crate::permission::{Permission, SharePrefix};

impl AccessGrant {
    /// Derive a grant restricted to `permission` and confined to `prefixes`.
    ///
    /// With no prefixes the derived grant is narrowed by capability only and
    /// keeps whatever path restrictions the parent already carries. With one
    /// or more prefixes the derived grant may touch any of them (they are
    /// OR'd), on top of every restriction already present (caveats are AND'd).
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if a prefix names an empty bucket
    /// - [`Error::Restriction`] if the permission is empty, asks for a flag
    ///   the parent does not hold, or a prefix lies outside the parent's
    ///   shared paths. Requests are rejected, never clamped.
    pub fn share(&self, permission: &Permission, prefixes: &[SharePrefix]) -> Result<AccessGrant> {
        if let Some(index) = prefixes.iter().position(|p| p.bucket.is_empty()) {
            return Err(Error::Validation(format!(
                "share prefix #{index} has an empty bucket name"
            )));
        }

        if permission.is_empty() {
            return Err(Error::Restriction("permission is empty".to_string()));
        }

        let held = self.effective_permission();
        if !permission.is_subset_of(&held) {
            return Err(Error::Restriction(format!(
                "requested permission ({permission}) exceeds the grant's permission ({held})"
            )));
        }

        for prefix in prefixes {
            for restriction in self.scope_restrictions() {
                if !restriction.iter().any(|allowed| allowed.covers(prefix)) {
                    return Err(Error::Restriction(format!(
                        "{prefix} is outside the grant's shared prefixes"
                    )));
                }
            }
        }

        let api_key = self.api_key.restrict(Caveat {
            permission: *permission,
            allowed_paths: prefixes.to_vec(),
        })?;

        Ok(AccessGrant {
            satellite_address: self.satellite_address.clone(),
            api_key,
            encryption_key: self.encryption_key.clone(),
        })
    }
}
