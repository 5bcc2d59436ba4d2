//! In-memory EAV engine implementing every port.
//!
//! Backs the integration tests and the CLI planner. Mirrors the behaviours
//! the provisioner relies on: upserting `ensure_attribute`, unique group names
//! per set, unique group membership per set and attribute, cascading attribute
//! removal, and `NotFound` for unknown codes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::attribute_def::{convert_to_group_code, AttributeSettings, PRODUCT_ENTITY};
use crate::error::{ProvisionError, Result};
use crate::maintenance::MaintenanceWindow;
use crate::ports::{
    AttributeGroupId, AttributeId, AttributeRecord, AttributeRepository, AttributeSetId,
    AttributeSetRegistry, EntityTypeId, EntityTypeRegistry, OptionId, OptionRecord,
    OptionRegistry, SchemaEngine, StoredOption,
};

/// Engine operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EngineOp {
    BeginMaintenance,
    EnsureAttribute,
    AddGroup,
    AddToGroup,
    SaveAttribute,
    AddOption,
    RemoveAttribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSetRow {
    pub set_id: AttributeSetId,
    pub entity_type_id: EntityTypeId,
    pub name: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeGroupRow {
    pub group_id: AttributeGroupId,
    pub set_id: AttributeSetId,
    pub name: String,
    pub code: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMembership {
    pub set_id: AttributeSetId,
    pub group_id: AttributeGroupId,
    pub attribute_id: AttributeId,
    pub sort_order: i32,
}

/// Serializable view of the whole engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EavSnapshot {
    pub entity_types: BTreeMap<String, EntityTypeId>,
    pub attribute_sets: Vec<AttributeSetRow>,
    pub groups: Vec<AttributeGroupRow>,
    pub attributes: Vec<AttributeRecord>,
    pub memberships: Vec<GroupMembership>,
    pub options: BTreeMap<AttributeId, Vec<StoredOption>>,
}

#[derive(Debug, Default)]
struct EavState {
    tables: EavSnapshot,
    next_id: u32,
}

impl EavState {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_entity(&self, entity_type: EntityTypeId) -> Result<()> {
        if self.tables.entity_types.values().any(|id| *id == entity_type) {
            Ok(())
        } else {
            Err(ProvisionError::NotFound(format!("entity type {entity_type}")))
        }
    }

    fn check_set(&self, entity_type: EntityTypeId, set_id: AttributeSetId) -> Result<()> {
        self.check_entity(entity_type)?;
        if self
            .tables
            .attribute_sets
            .iter()
            .any(|s| s.set_id == set_id && s.entity_type_id == entity_type)
        {
            Ok(())
        } else {
            Err(ProvisionError::NotFound(format!("attribute set {set_id}")))
        }
    }

    fn find_group(&self, set_id: AttributeSetId, group_name: &str) -> Option<&AttributeGroupRow> {
        self.tables
            .groups
            .iter()
            .find(|g| g.set_id == set_id && g.name.eq_ignore_ascii_case(group_name))
    }

    fn insert_group(
        &mut self,
        set_id: AttributeSetId,
        name: &str,
        sort_order: i32,
    ) -> AttributeGroupId {
        let group_id = AttributeGroupId(self.allocate());
        self.tables.groups.push(AttributeGroupRow {
            group_id,
            set_id,
            name: name.to_string(),
            code: convert_to_group_code(name),
            sort_order,
        });
        group_id
    }
}

pub struct InMemoryEav {
    state: RwLock<EavState>,
    failing: Mutex<BTreeSet<EngineOp>>,
    mutations: AtomicUsize,
    maintenance_depth: AtomicUsize,
    maintenance_sessions: AtomicUsize,
}

impl Default for InMemoryEav {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEav {
    /// An engine without any entity type.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EavState::default()),
            failing: Mutex::new(BTreeSet::new()),
            mutations: AtomicUsize::new(0),
            maintenance_depth: AtomicUsize::new(0),
            maintenance_sessions: AtomicUsize::new(0),
        }
    }

    /// `catalog_product` with a default "Default" set holding a "General" group.
    pub fn with_catalog_product() -> Self {
        Self::new().with_entity_type(PRODUCT_ENTITY, "Default", &["General"])
    }

    /// Register an entity type, its default attribute set and initial groups.
    pub fn with_entity_type(
        mut self,
        entity_code: &str,
        default_set: &str,
        groups: &[&str],
    ) -> Self {
        let state = self.state.get_mut();
        let entity_type = EntityTypeId(state.allocate());
        state
            .tables
            .entity_types
            .insert(entity_code.to_string(), entity_type);

        let set_id = AttributeSetId(state.allocate());
        state.tables.attribute_sets.push(AttributeSetRow {
            set_id,
            entity_type_id: entity_type,
            name: default_set.to_string(),
            is_default: true,
        });

        for (position, name) in groups.iter().enumerate() {
            state.insert_group(set_id, name, position as i32 + 1);
        }
        self
    }

    /// Add a non-default attribute set to an already registered entity type.
    pub fn with_attribute_set(mut self, entity_code: &str, set_name: &str) -> Self {
        let state = self.state.get_mut();
        if let Some(entity_type) = state.tables.entity_types.get(entity_code).copied() {
            let set_id = AttributeSetId(state.allocate());
            state.tables.attribute_sets.push(AttributeSetRow {
                set_id,
                entity_type_id: entity_type,
                name: set_name.to_string(),
                is_default: false,
            });
        }
        self
    }

    /// Make every later call of `op` fail with a schema engine error.
    pub fn fail_on(&self, op: EngineOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    /// Successful state-changing calls so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Currently open maintenance windows.
    pub fn maintenance_depth(&self) -> usize {
        self.maintenance_depth.load(Ordering::SeqCst)
    }

    /// Maintenance windows opened over the engine's lifetime.
    pub fn maintenance_sessions(&self) -> usize {
        self.maintenance_sessions.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> EavSnapshot {
        self.state.read().await.tables.clone()
    }

    pub async fn attribute(&self, entity_code: &str, code: &str) -> Option<AttributeRecord> {
        let state = self.state.read().await;
        let entity_type = state.tables.entity_types.get(entity_code)?;
        state
            .tables
            .attributes
            .iter()
            .find(|a| a.entity_type_id == *entity_type && a.code == code)
            .cloned()
    }

    pub async fn options_of(&self, attribute_id: AttributeId) -> Vec<StoredOption> {
        let state = self.state.read().await;
        state
            .tables
            .options
            .get(&attribute_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn memberships_of(&self, attribute_id: AttributeId) -> Vec<GroupMembership> {
        let state = self.state.read().await;
        state
            .tables
            .memberships
            .iter()
            .filter(|m| m.attribute_id == attribute_id)
            .cloned()
            .collect()
    }

    pub async fn groups_of(&self, set_id: AttributeSetId) -> Vec<AttributeGroupRow> {
        let state = self.state.read().await;
        state
            .tables
            .groups
            .iter()
            .filter(|g| g.set_id == set_id)
            .cloned()
            .collect()
    }

    fn check_failure(&self, op: EngineOp) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .map(|failing| failing.contains(&op))
            .unwrap_or(false);
        if failing {
            return Err(ProvisionError::SchemaEngine(anyhow::anyhow!(
                "injected failure in {op:?}"
            )));
        }
        Ok(())
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl MaintenanceWindow for InMemoryEav {
    fn begin_maintenance(&self) -> Result<()> {
        self.check_failure(EngineOp::BeginMaintenance)?;
        self.maintenance_depth.fetch_add(1, Ordering::SeqCst);
        self.maintenance_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn end_maintenance(&self) {
        let _ = self
            .maintenance_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }
}

#[async_trait]
impl EntityTypeRegistry for InMemoryEav {
    async fn entity_type_id(&self, entity_code: &str) -> Result<EntityTypeId> {
        let state = self.state.read().await;
        state
            .tables
            .entity_types
            .get(entity_code)
            .copied()
            .ok_or_else(|| ProvisionError::NotFound(format!("entity type {entity_code}")))
    }
}

#[async_trait]
impl SchemaEngine for InMemoryEav {
    async fn ensure_attribute(
        &self,
        entity_type: EntityTypeId,
        code: &str,
        settings: &AttributeSettings,
    ) -> Result<()> {
        self.check_failure(EngineOp::EnsureAttribute)?;
        let mut state = self.state.write().await;
        state.check_entity(entity_type)?;

        let frontend_input = settings.get_str("input").unwrap_or("text").to_string();
        let source_model = settings.get_str("source").map(String::from);

        let existing = state
            .tables
            .attributes
            .iter_mut()
            .find(|a| a.entity_type_id == entity_type && a.code == code);

        match existing {
            Some(attribute) => {
                attribute.frontend_input = frontend_input;
                attribute.source_model = source_model;
                attribute.settings = settings.clone();
            }
            None => {
                let attribute_id = AttributeId(state.allocate());
                state.tables.attributes.push(AttributeRecord {
                    attribute_id,
                    entity_type_id: entity_type,
                    code: code.to_string(),
                    frontend_input,
                    source_model,
                    frontend_labels: Vec::new(),
                    settings: settings.clone(),
                });
            }
        }
        self.mutated();
        Ok(())
    }

    async fn add_group(
        &self,
        entity_type: EntityTypeId,
        set_id: AttributeSetId,
        group_name: &str,
        sort_order: i32,
    ) -> Result<()> {
        self.check_failure(EngineOp::AddGroup)?;
        let mut state = self.state.write().await;
        state.check_set(entity_type, set_id)?;

        let code = convert_to_group_code(group_name);
        let duplicate = state.tables.groups.iter().any(|g| {
            g.set_id == set_id && (g.name.eq_ignore_ascii_case(group_name) || g.code == code)
        });
        if duplicate {
            return Err(ProvisionError::AlreadyExists(format!(
                "group {group_name} in attribute set {set_id}"
            )));
        }

        state.insert_group(set_id, group_name, sort_order);
        self.mutated();
        Ok(())
    }

    async fn add_to_group(
        &self,
        entity_type: EntityTypeId,
        set_id: AttributeSetId,
        group_code: &str,
        attribute_id: AttributeId,
        sort_order: i32,
    ) -> Result<()> {
        self.check_failure(EngineOp::AddToGroup)?;
        let mut state = self.state.write().await;
        state.check_set(entity_type, set_id)?;

        let code = convert_to_group_code(group_code);
        let group_id = state
            .tables
            .groups
            .iter()
            .find(|g| g.set_id == set_id && g.code == code)
            .map(|g| g.group_id)
            .ok_or_else(|| {
                ProvisionError::NotFound(format!("group {group_code} in attribute set {set_id}"))
            })?;

        if !state
            .tables
            .attributes
            .iter()
            .any(|a| a.attribute_id == attribute_id && a.entity_type_id == entity_type)
        {
            return Err(ProvisionError::NotFound(format!("attribute {attribute_id}")));
        }

        let existing = state
            .tables
            .memberships
            .iter_mut()
            .find(|m| m.set_id == set_id && m.attribute_id == attribute_id);
        match existing {
            Some(membership) => {
                membership.group_id = group_id;
                membership.sort_order = sort_order;
            }
            None => state.tables.memberships.push(GroupMembership {
                set_id,
                group_id,
                attribute_id,
                sort_order,
            }),
        }
        self.mutated();
        Ok(())
    }

    async fn remove_attribute(&self, entity_type: EntityTypeId, code: &str) -> Result<()> {
        self.check_failure(EngineOp::RemoveAttribute)?;
        let mut state = self.state.write().await;
        state.check_entity(entity_type)?;

        let position = state
            .tables
            .attributes
            .iter()
            .position(|a| a.entity_type_id == entity_type && a.code == code)
            .ok_or_else(|| ProvisionError::NotFound(format!("attribute {code}")))?;

        let removed = state.tables.attributes.remove(position);
        state.tables.options.remove(&removed.attribute_id);
        state
            .tables
            .memberships
            .retain(|m| m.attribute_id != removed.attribute_id);
        self.mutated();
        Ok(())
    }
}

#[async_trait]
impl AttributeRepository for InMemoryEav {
    async fn get_by_code(&self, entity_type: EntityTypeId, code: &str) -> Result<AttributeRecord> {
        let state = self.state.read().await;
        state
            .tables
            .attributes
            .iter()
            .find(|a| a.entity_type_id == entity_type && a.code == code)
            .cloned()
            .ok_or_else(|| ProvisionError::NotFound(format!("attribute {code}")))
    }

    async fn save(&self, attribute: &AttributeRecord) -> Result<()> {
        self.check_failure(EngineOp::SaveAttribute)?;
        let mut state = self.state.write().await;
        let stored = state
            .tables
            .attributes
            .iter_mut()
            .find(|a| a.attribute_id == attribute.attribute_id)
            .ok_or_else(|| ProvisionError::NotFound(format!("attribute {}", attribute.code)))?;

        stored.frontend_labels = attribute.frontend_labels.clone();
        stored.frontend_input = attribute.frontend_input.clone();
        stored.source_model = attribute.source_model.clone();
        stored.settings = attribute.settings.clone();
        self.mutated();
        Ok(())
    }
}

#[async_trait]
impl AttributeSetRegistry for InMemoryEav {
    async fn default_set_id(&self, entity_type: EntityTypeId) -> Result<AttributeSetId> {
        let state = self.state.read().await;
        state
            .tables
            .attribute_sets
            .iter()
            .find(|s| s.entity_type_id == entity_type && s.is_default)
            .map(|s| s.set_id)
            .ok_or_else(|| {
                ProvisionError::NotFound(format!(
                    "default attribute set of entity type {entity_type}"
                ))
            })
    }

    async fn set_id_by_name(
        &self,
        entity_type: EntityTypeId,
        set_name: &str,
    ) -> Result<Option<AttributeSetId>> {
        let state = self.state.read().await;
        Ok(state
            .tables
            .attribute_sets
            .iter()
            .find(|s| s.entity_type_id == entity_type && s.name == set_name)
            .map(|s| s.set_id))
    }

    async fn group_id(
        &self,
        set_id: AttributeSetId,
        group_name: &str,
    ) -> Result<Option<AttributeGroupId>> {
        let state = self.state.read().await;
        Ok(state.find_group(set_id, group_name).map(|g| g.group_id))
    }
}

#[async_trait]
impl OptionRegistry for InMemoryEav {
    async fn add(
        &self,
        entity_type: EntityTypeId,
        attribute_id: AttributeId,
        option: &OptionRecord,
    ) -> Result<()> {
        self.check_failure(EngineOp::AddOption)?;
        let mut state = self.state.write().await;
        state.check_entity(entity_type)?;
        if !state
            .tables
            .attributes
            .iter()
            .any(|a| a.attribute_id == attribute_id && a.entity_type_id == entity_type)
        {
            return Err(ProvisionError::NotFound(format!("attribute {attribute_id}")));
        }

        let option_id = OptionId(state.allocate());
        state
            .tables
            .options
            .entry(attribute_id)
            .or_default()
            .push(StoredOption {
                option_id,
                option: option.clone(),
            });
        self.mutated();
        Ok(())
    }

    async fn list(
        &self,
        entity_type: EntityTypeId,
        attribute_id: AttributeId,
    ) -> Result<Vec<StoredOption>> {
        let state = self.state.read().await;
        state.check_entity(entity_type)?;
        Ok(state
            .tables
            .options
            .get(&attribute_id)
            .cloned()
            .unwrap_or_default())
    }
}
