//! Capability sets and share prefixes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single operation a grant may authorize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read object content.
    Download,
    /// Write object content and create buckets.
    Upload,
    /// Enumerate objects and stat buckets.
    List,
    /// Remove objects and buckets.
    Delete,
}

impl Action {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
            Self::List => "list",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four independent permission bits a grant can carry.
///
/// Every flag defaults to `false`: nothing is granted unless asked for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    #[serde(default)]
    pub allow_download: bool,
    #[serde(default)]
    pub allow_upload: bool,
    #[serde(default)]
    pub allow_list: bool,
    #[serde(default)]
    pub allow_delete: bool,
}

impl Permission {
    /// Every capability.
    pub fn full() -> Self {
        Self {
            allow_download: true,
            allow_upload: true,
            allow_list: true,
            allow_delete: true,
        }
    }

    /// Download and list.
    pub fn read_only() -> Self {
        Self {
            allow_download: true,
            allow_list: true,
            ..Self::default()
        }
    }

    /// Upload only.
    pub fn write_only() -> Self {
        Self {
            allow_upload: true,
            ..Self::default()
        }
    }

    /// True when no flag is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check whether this permission authorizes an action.
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Download => self.allow_download,
            Action::Upload => self.allow_upload,
            Action::List => self.allow_list,
            Action::Delete => self.allow_delete,
        }
    }

    /// True when every flag set here is also set in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.actions().all(|action| other.allows(action))
    }

    /// Flags set in both.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            allow_download: self.allow_download && other.allow_download,
            allow_upload: self.allow_upload && other.allow_upload,
            allow_list: self.allow_list && other.allow_list,
            allow_delete: self.allow_delete && other.allow_delete,
        }
    }

    /// Iterate the actions this permission authorizes.
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        [Action::Download, Action::Upload, Action::List, Action::Delete]
            .into_iter()
            .filter(|action| self.allows(*action))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.actions().map(|a| a.as_str()).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}

/// A (bucket, prefix) pair a derived grant is confined to.
///
/// An empty prefix shares the whole bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharePrefix {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

impl SharePrefix {
    /// Create a share prefix. The bucket name must not be empty.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> crate::Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(crate::Error::Validation(
                "share prefix requires a non-empty bucket name".to_string(),
            ));
        }
        Ok(Self {
            bucket,
            prefix: prefix.into(),
        })
    }

    /// Share an entire bucket.
    pub fn full_bucket(bucket: impl Into<String>) -> crate::Result<Self> {
        Self::new(bucket, "")
    }

    /// Check whether an object key in a bucket falls inside this prefix.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.bucket == bucket && key.starts_with(&self.prefix)
    }

    /// Check whether `other` is entirely inside this prefix.
    pub fn covers(&self, other: &SharePrefix) -> bool {
        self.bucket == other.bucket && other.prefix.starts_with(&self.prefix)
    }
}

impl fmt::Display for SharePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sj://{}/{}", self.bucket, self.prefix)
    }
}
