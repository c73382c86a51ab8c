//! Registry of plugin-style extension fields on the profile field resource.
//!
//! An extension field is a named attribute layered onto a field's JSON
//! representation. Each one carries a get accessor (called when a field is
//! rendered) and an update accessor (called when a create or update request
//! carries the attribute). Accessors are resolved at request time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;

use crate::community::Community;
use crate::error::CommunityError;
use crate::profile::ProfileField;

/// Reads an extension attribute of a field.
pub type ExtensionGetter =
    Arc<dyn Fn(&Community, &ProfileField, &str) -> Result<Value, CommunityError> + Send + Sync>;

/// Writes an extension attribute of a field.
pub type ExtensionUpdater = Arc<
    dyn Fn(&Community, &ProfileField, &str, Value) -> Result<(), CommunityError> + Send + Sync,
>;

/// Schema advertised for an extension attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionSchema {
    pub description: String,
    #[serde(rename = "type")]
    pub value_type: String,
    /// Request contexts in which the attribute is emitted
    pub context: Vec<String>,
}

impl ExtensionSchema {
    /// A string attribute visible in both `view` and `edit`.
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            value_type: "string".to_string(),
            context: vec!["view".to_string(), "edit".to_string()],
        }
    }
}

/// Accessor pair and schema of one extension attribute.
#[derive(Clone)]
pub struct ExtensionField {
    pub get: Option<ExtensionGetter>,
    pub update: Option<ExtensionUpdater>,
    pub schema: ExtensionSchema,
}

impl ExtensionField {
    /// An attribute with no accessors yet.
    pub fn new(schema: ExtensionSchema) -> Self {
        Self {
            get: None,
            update: None,
            schema,
        }
    }

    pub fn with_getter<F>(mut self, get: F) -> Self
    where
        F: Fn(&Community, &ProfileField, &str) -> Result<Value, CommunityError>
            + Send
            + Sync
            + 'static,
    {
        self.get = Some(Arc::new(get));
        self
    }

    pub fn with_updater<F>(mut self, update: F) -> Self
    where
        F: Fn(&Community, &ProfileField, &str, Value) -> Result<(), CommunityError>
            + Send
            + Sync
            + 'static,
    {
        self.update = Some(Arc::new(update));
        self
    }

    /// An attribute persisted in field meta under `_<name>`.
    ///
    /// Missing meta reads back as an empty string.
    pub fn meta_backed(schema: ExtensionSchema) -> Self {
        Self::new(schema)
            .with_getter(|community, field, name| {
                Ok(community
                    .field_meta(field.id, &format!("_{}", name))?
                    .unwrap_or_else(|| Value::String(String::new())))
            })
            .with_updater(|community, field, name, value| {
                community.update_field_meta(field.id, &format!("_{}", name), value)
            })
    }

    /// Whether the attribute is emitted for the given request context.
    pub fn in_context(&self, context: &str) -> bool {
        self.schema.context.iter().any(|c| c == context)
    }
}

impl fmt::Debug for ExtensionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionField")
            .field("get", &self.get.is_some())
            .field("update", &self.update.is_some())
            .field("schema", &self.schema)
            .finish()
    }
}

/// Extension attributes keyed by name.
///
/// Thread-safe; plugins may register at any time.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    fields: RwLock<BTreeMap<String, ExtensionField>>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attribute.
    ///
    /// # Returns
    /// `Err(ExtensionAlreadyRegistered)` when the name is taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        field: ExtensionField,
    ) -> Result<(), CommunityError> {
        let name = name.into();
        let mut fields = self.fields.write().map_err(|_| CommunityError::LockPoisoned)?;
        if fields.contains_key(&name) {
            return Err(CommunityError::ExtensionAlreadyRegistered { name });
        }
        tracing::debug!("Registered extension field '{}'", name);
        fields.insert(name, field);
        Ok(())
    }

    /// Removes an attribute. Returns `true` if it was registered.
    pub fn unregister(&self, name: &str) -> Result<bool, CommunityError> {
        let mut fields = self.fields.write().map_err(|_| CommunityError::LockPoisoned)?;
        Ok(fields.remove(name).is_some())
    }

    /// Looks up an attribute.
    pub fn get(&self, name: &str) -> Result<Option<ExtensionField>, CommunityError> {
        let fields = self.fields.read().map_err(|_| CommunityError::LockPoisoned)?;
        Ok(fields.get(name).cloned())
    }

    /// Snapshot of every registered attribute, in name order.
    pub fn entries(&self) -> Result<Vec<(String, ExtensionField)>, CommunityError> {
        let fields = self.fields.read().map_err(|_| CommunityError::LockPoisoned)?;
        Ok(fields
            .iter()
            .map(|(name, field)| (name.clone(), field.clone()))
            .collect())
    }

    /// Reads every attribute emitted in `context` for a field.
    pub fn values_for(
        &self,
        community: &Community,
        field: &ProfileField,
        context: &str,
    ) -> Result<BTreeMap<String, Value>, CommunityError> {
        let mut values = BTreeMap::new();
        for (name, extension) in self.entries()? {
            if !extension.in_context(context) {
                continue;
            }
            if let Some(get) = &extension.get {
                values.insert(name.clone(), get(community, field, &name)?);
            }
        }
        Ok(values)
    }

    /// Writes every registered attribute present in `params`.
    ///
    /// Attributes without an update accessor are ignored.
    pub fn apply_updates(
        &self,
        community: &Community,
        field: &ProfileField,
        params: &serde_json::Map<String, Value>,
    ) -> Result<(), CommunityError> {
        for (name, extension) in self.entries()? {
            let (Some(value), Some(update)) = (params.get(&name), &extension.update) else {
                continue;
            };
            update(community, field, &name, value.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{FieldType, NewField, NewFieldGroup};
    use serde_json::json;

    fn field_in(community: &Community) -> ProfileField {
        let group = community.create_group(NewFieldGroup::named("G")).unwrap();
        community
            .create_field(NewField::new(group.id, FieldType::Textbox, "F"))
            .unwrap()
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ExtensionRegistry::new();
        registry
            .register("foo", ExtensionField::new(ExtensionSchema::string("foo")))
            .unwrap();
        assert_eq!(
            registry
                .register("foo", ExtensionField::new(ExtensionSchema::string("again")))
                .unwrap_err(),
            CommunityError::ExtensionAlreadyRegistered {
                name: "foo".to_string()
            }
        );
        assert!(registry.unregister("foo").unwrap());
        assert!(!registry.unregister("foo").unwrap());
        assert!(registry.get("foo").unwrap().is_none());
    }

    #[test]
    fn test_meta_backed_round_trip() {
        let community = Community::new();
        let field = field_in(&community);
        let registry = ExtensionRegistry::new();
        registry
            .register(
                "foo_field_key",
                ExtensionField::meta_backed(ExtensionSchema::string("meta")),
            )
            .unwrap();

        let mut params = serde_json::Map::new();
        params.insert("foo_field_key".to_string(), json!("bar_field_value"));
        params.insert("unrelated".to_string(), json!(1));
        registry.apply_updates(&community, &field, &params).unwrap();

        assert_eq!(
            community.field_meta(field.id, "_foo_field_key").unwrap(),
            Some(json!("bar_field_value"))
        );
        let values = registry.values_for(&community, &field, "view").unwrap();
        assert_eq!(values.get("foo_field_key"), Some(&json!("bar_field_value")));
        assert!(!values.contains_key("unrelated"));
    }

    #[test]
    fn test_context_filtering() {
        let community = Community::new();
        let field = field_in(&community);
        let registry = ExtensionRegistry::new();
        let mut schema = ExtensionSchema::string("edit only");
        schema.context = vec!["edit".to_string()];
        registry
            .register(
                "secret",
                ExtensionField::new(schema).with_getter(|_, _, _| Ok(json!("s"))),
            )
            .unwrap();

        assert!(registry
            .values_for(&community, &field, "view")
            .unwrap()
            .is_empty());
        assert_eq!(
            registry
                .values_for(&community, &field, "edit")
                .unwrap()
                .get("secret"),
            Some(&json!("s"))
        );
    }

    #[test]
    fn test_poisoned_registry_reports_error() {
        let registry = Arc::new(ExtensionRegistry::new());
        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.fields.write().unwrap();
            panic!("poison the registry");
        })
        .join();

        assert_eq!(registry.entries().unwrap_err(), CommunityError::LockPoisoned);
        assert_eq!(registry.get("foo").unwrap_err(), CommunityError::LockPoisoned);
        assert_eq!(
            registry.unregister("foo").unwrap_err(),
            CommunityError::LockPoisoned
        );
        let community = Community::new();
        let field = field_in(&community);
        assert_eq!(
            registry.values_for(&community, &field, "view").unwrap_err(),
            CommunityError::LockPoisoned
        );
    }
}
