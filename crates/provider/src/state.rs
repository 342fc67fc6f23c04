//! Resource state returned to the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder shown instead of a sensitive value.
pub const SENSITIVE_PLACEHOLDER: &str = "<sensitive>";

/// One attribute value and whether the host may display it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub value: Value,
    #[serde(default)]
    pub sensitive: bool,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            f.write_str(SENSITIVE_PLACEHOLDER)
        } else {
            write!(f, "{:?}", self.value)
        }
    }
}

/// The identity and attributes of a reconciled resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).map(|a| &a.value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// A copy with sensitive values replaced by a placeholder.
    pub fn redacted(&self) -> Self {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, attr)| {
                let value = if attr.sensitive {
                    Value::String(SENSITIVE_PLACEHOLDER.to_string())
                } else {
                    attr.value.clone()
                };
                (
                    name.clone(),
                    Attribute {
                        value,
                        sensitive: attr.sensitive,
                    },
                )
            })
            .collect();
        Self {
            id: self.id.clone(),
            attributes,
        }
    }
}
