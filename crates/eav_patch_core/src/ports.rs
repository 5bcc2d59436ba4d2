//! Port traits for the EAV schema engine.
//! The provisioner depends only on these; `memory::InMemoryEav` is the
//! reference implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::attribute_def::{AttributeSettings, StoreLabels};
use crate::error::Result;
use crate::maintenance::MaintenanceWindow;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(EntityTypeId);
id_newtype!(AttributeSetId);
id_newtype!(AttributeGroupId);
id_newtype!(AttributeId);
id_newtype!(OptionId);

/// What `apply` hands back: the generated id plus the stable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeHandle {
    pub attribute_id: AttributeId,
    pub code: String,
}

/// Store-scoped frontend label attached to an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendLabel {
    pub store_id: u32,
    pub label: String,
}

/// Attribute as seen through the read/write model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub attribute_id: AttributeId,
    pub entity_type_id: EntityTypeId,
    pub code: String,
    /// Input widget name as stored by the engine (`select`, `text`, ...).
    pub frontend_input: String,
    pub source_model: Option<String>,
    pub frontend_labels: Vec<FrontendLabel>,
    pub settings: AttributeSettings,
}

impl AttributeRecord {
    pub fn handle(&self) -> AttributeHandle {
        AttributeHandle {
            attribute_id: self.attribute_id,
            code: self.code.clone(),
        }
    }
}

/// One selectable value to be added to an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    /// Canonical (admin) label; downstream consumers index options by it.
    pub label: String,
    pub store_labels: StoreLabels,
    pub sort_order: u32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOption {
    pub option_id: OptionId,
    pub option: OptionRecord,
}

// ── Ports ──────────────────────────────────────────────────────

#[async_trait]
pub trait EntityTypeRegistry: Send + Sync {
    /// Resolve an entity code such as `catalog_product`.
    async fn entity_type_id(&self, entity_code: &str) -> Result<EntityTypeId>;
}

#[async_trait]
pub trait SchemaEngine: Send + Sync {
    /// Create the attribute, or update its settings if `code` already exists.
    async fn ensure_attribute(
        &self,
        entity_type: EntityTypeId,
        code: &str,
        settings: &AttributeSettings,
    ) -> Result<()>;

    /// Create a display group. Reports `AlreadyExists` for a duplicate name.
    async fn add_group(
        &self,
        entity_type: EntityTypeId,
        set_id: AttributeSetId,
        group_name: &str,
        sort_order: i32,
    ) -> Result<()>;

    /// Place the attribute in the group identified by `group_code`.
    async fn add_to_group(
        &self,
        entity_type: EntityTypeId,
        set_id: AttributeSetId,
        group_code: &str,
        attribute_id: AttributeId,
        sort_order: i32,
    ) -> Result<()>;

    /// Drop the attribute together with its labels, options and memberships.
    async fn remove_attribute(&self, entity_type: EntityTypeId, code: &str) -> Result<()>;
}

#[async_trait]
pub trait AttributeRepository: Send + Sync {
    /// Fails with `NotFound` when no attribute has this code.
    async fn get_by_code(&self, entity_type: EntityTypeId, code: &str) -> Result<AttributeRecord>;

    /// Persist the record, including its frontend label list.
    async fn save(&self, attribute: &AttributeRecord) -> Result<()>;
}

#[async_trait]
pub trait AttributeSetRegistry: Send + Sync {
    async fn default_set_id(&self, entity_type: EntityTypeId) -> Result<AttributeSetId>;

    async fn set_id_by_name(
        &self,
        entity_type: EntityTypeId,
        set_name: &str,
    ) -> Result<Option<AttributeSetId>>;

    async fn group_id(
        &self,
        set_id: AttributeSetId,
        group_name: &str,
    ) -> Result<Option<AttributeGroupId>>;
}

#[async_trait]
pub trait OptionRegistry: Send + Sync {
    /// Append an option. Never replaces existing ones.
    async fn add(
        &self,
        entity_type: EntityTypeId,
        attribute_id: AttributeId,
        option: &OptionRecord,
    ) -> Result<()>;

    async fn list(
        &self,
        entity_type: EntityTypeId,
        attribute_id: AttributeId,
    ) -> Result<Vec<StoredOption>>;
}

/// Every collaborator the provisioner talks to, as shared handles.
#[derive(Clone)]
pub struct EavPorts {
    pub entity_types: Arc<dyn EntityTypeRegistry>,
    pub schema: Arc<dyn SchemaEngine>,
    pub attributes: Arc<dyn AttributeRepository>,
    pub attribute_sets: Arc<dyn AttributeSetRegistry>,
    pub options: Arc<dyn OptionRegistry>,
    pub maintenance: Arc<dyn MaintenanceWindow>,
}

impl EavPorts {
    /// Wire every port to one engine that implements them all.
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: EntityTypeRegistry
            + SchemaEngine
            + AttributeRepository
            + AttributeSetRegistry
            + OptionRegistry
            + MaintenanceWindow
            + 'static,
    {
        Self {
            entity_types: engine.clone(),
            schema: engine.clone(),
            attributes: engine.clone(),
            attribute_sets: engine.clone(),
            options: engine.clone(),
            maintenance: engine,
        }
    }
}

impl fmt::Debug for EavPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EavPorts").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_value(AttributeId(42)).unwrap();
        assert_eq!(json, serde_json::json!(42));
        assert_eq!(AttributeSetId(4).to_string(), "4");
    }

    #[test]
    fn record_handle_carries_id_and_code() {
        let record = AttributeRecord {
            attribute_id: AttributeId(7),
            entity_type_id: EntityTypeId(4),
            code: "my_attribute".into(),
            frontend_input: "text".into(),
            source_model: None,
            frontend_labels: vec![],
            settings: AttributeSettings::default(),
        };
        assert_eq!(
            record.handle(),
            AttributeHandle {
                attribute_id: AttributeId(7),
                code: "my_attribute".into(),
            }
        );
    }
}
