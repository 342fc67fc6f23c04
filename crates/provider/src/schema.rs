//! Attribute declarations for resource kinds.
//!
//! The host validates field presence and types; here the schema is the single
//! source of which attributes are sensitive.

use crate::state::{Attribute, ResourceState};
use serde::Serialize;
use serde_json::Value;

/// How an attribute is supplied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeMode {
    Required,
    Optional,
    Computed,
}

/// One attribute of a resource kind.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub mode: AttributeMode,
    pub sensitive: bool,
    /// Changing the value replaces the resource instead of updating it.
    pub force_new: bool,
    pub description: &'static str,
}

impl AttributeSchema {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            mode: AttributeMode::Required,
            sensitive: false,
            force_new: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            mode: AttributeMode::Optional,
            sensitive: false,
            force_new: true,
            description,
        }
    }

    pub const fn computed(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            mode: AttributeMode::Computed,
            sensitive: false,
            force_new: false,
            description,
        }
    }

    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub const fn updatable(mut self) -> Self {
        self.force_new = false;
        self
    }
}

/// The declared attributes of a resource or data source.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Schema {
    pub type_name: &'static str,
    pub description: &'static str,
    pub attributes: &'static [AttributeSchema],
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Names of attributes that must never be displayed or logged.
    pub fn sensitive_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes
            .iter()
            .filter(|a| a.sensitive)
            .map(|a| a.name)
    }

    /// Whether some configurable attribute can change without replacement.
    pub fn supports_update(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| a.mode != AttributeMode::Computed && !a.force_new)
    }

    /// Configurable attributes whose change replaces the resource.
    pub fn replacement_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes
            .iter()
            .filter(|a| a.mode != AttributeMode::Computed && a.force_new)
            .map(|a| a.name)
    }

    /// Start building a state for this kind.
    pub fn state(&'static self, id: impl Into<String>) -> StateBuilder {
        StateBuilder {
            schema: self,
            state: ResourceState::new(id),
        }
    }
}

/// Builds a [`ResourceState`] whose sensitivity flags come from a schema.
pub struct StateBuilder {
    schema: &'static Schema,
    state: ResourceState,
}

impl StateBuilder {
    /// Set an attribute. Null values are skipped.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            return self;
        }
        let sensitive = match self.schema.attribute(name) {
            Some(attr) => attr.sensitive,
            None => {
                // Undeclared attributes are hidden rather than leaked.
                tracing::warn!(
                    attribute = name,
                    resource = self.schema.type_name,
                    "undeclared attribute treated as sensitive"
                );
                true
            }
        };
        self.state
            .attributes
            .insert(name.to_string(), Attribute { value, sensitive });
        self
    }

    pub fn build(self) -> ResourceState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_SCHEMA: Schema = Schema {
        type_name: "test_kind",
        description: "test",
        attributes: &[
            AttributeSchema::required("name", "plain"),
            AttributeSchema::computed("secret", "hidden").sensitive(),
        ],
    };

    #[test]
    fn test_builder_uses_schema_sensitivity() {
        let state = TEST_SCHEMA
            .state("id-1")
            .set("name", "photos")
            .set("secret", "s3cr3t")
            .set("name2", Value::Null)
            .build();

        assert_eq!(state.id, "id-1");
        assert!(!state.attributes["name"].sensitive);
        assert!(state.attributes["secret"].sensitive);
        assert!(!state.attributes.contains_key("name2"));
        assert_eq!(TEST_SCHEMA.sensitive_attributes().collect::<Vec<_>>(), vec!["secret"]);
    }

    #[test]
    fn test_undeclared_attribute_is_hidden() {
        let state = TEST_SCHEMA.state("id-1").set("token", "leak-me").build();
        assert!(state.attributes["token"].sensitive);
        assert_eq!(state.redacted().get_str("token"), Some(crate::SENSITIVE_PLACEHOLDER));
        assert!(!format!("{state:?}").contains("leak-me"));
    }

    #[test]
    fn test_update_support_follows_force_new() {
        static MUTABLE: Schema = Schema {
            type_name: "mutable_kind",
            description: "test",
            attributes: &[
                AttributeSchema::required("name", "fixed"),
                AttributeSchema::optional("body", "editable").updatable(),
                AttributeSchema::computed("size", "derived"),
            ],
        };

        assert!(!TEST_SCHEMA.supports_update());
        assert_eq!(TEST_SCHEMA.replacement_attributes().collect::<Vec<_>>(), vec!["name"]);
        assert!(MUTABLE.supports_update());
        assert_eq!(MUTABLE.replacement_attributes().collect::<Vec<_>>(), vec!["name"]);
    }
}
