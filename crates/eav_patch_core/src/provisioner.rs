//! Provisioner: apply and revert one attribute definition against the
//! schema engine ports.
//!
//! Apply runs: validate → ensure attribute → read back → group placement →
//! store labels → options. Steps are not rolled back on failure; the error is
//! returned as-is and the schema keeps whatever earlier steps wrote.

use serde::{Deserialize, Serialize};

use crate::attribute_def::AttributeDefinition;
use crate::error::{ProvisionError, Result};
use crate::labels::{attach_store_labels, LabelMode};
use crate::maintenance::MaintenanceGuard;
use crate::options::{attach_options, OptionMode};
use crate::ports::{AttributeHandle, AttributeId, AttributeSetId, EavPorts, EntityTypeId};
use crate::validate::validate;

/// What revert does when the attribute is already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingOnRevert {
    #[default]
    Ignore,
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionSettings {
    pub label_mode: LabelMode,
    pub option_mode: OptionMode,
    pub missing_on_revert: MissingOnRevert,
}

pub struct Provisioner {
    ports: EavPorts,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(ports: EavPorts) -> Self {
        Self {
            ports,
            settings: ProvisionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProvisionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Ensure the attribute exists and is configured as `def` declares.
    pub async fn apply(&self, def: &AttributeDefinition) -> Result<AttributeHandle> {
        let _window = MaintenanceGuard::acquire(self.ports.maintenance.as_ref())?;

        validate(def)?;

        let fingerprint = def
            .fingerprint()
            .unwrap_or_else(|_| "unavailable".to_string());
        tracing::info!(
            target: "eav_patch.provision",
            code = %def.code,
            entity = %def.entity_type,
            %fingerprint,
            "applying attribute definition"
        );

        let entity_type = self.ports.entity_types.entity_type_id(&def.entity_type).await?;

        self.ports
            .schema
            .ensure_attribute(entity_type, &def.code, &def.to_settings())
            .await?;

        let mut attribute = self
            .ports
            .attributes
            .get_by_code(entity_type, &def.code)
            .await?;

        self.assign_group(entity_type, attribute.attribute_id, def)
            .await?;

        let labels_saved = attach_store_labels(
            self.ports.attributes.as_ref(),
            &mut attribute,
            &def.locale_labels,
            self.settings.label_mode,
        )
        .await?;

        let options_written = if def.has_options() {
            attach_options(
                self.ports.options.as_ref(),
                &attribute,
                &def.option_entries(),
                self.settings.option_mode,
            )
            .await?
        } else {
            0
        };

        tracing::info!(
            target: "eav_patch.provision",
            code = %def.code,
            attribute_id = %attribute.attribute_id,
            labels_saved,
            options_written,
            "attribute applied"
        );

        Ok(attribute.handle())
    }

    /// Remove the attribute identified by `code`. Labels and options go with it.
    pub async fn revert(&self, entity_code: &str, code: &str) -> Result<()> {
        let _window = MaintenanceGuard::acquire(self.ports.maintenance.as_ref())?;

        let entity_type = self.ports.entity_types.entity_type_id(entity_code).await?;

        match self.ports.schema.remove_attribute(entity_type, code).await {
            Ok(()) => {
                tracing::info!(
                    target: "eav_patch.revert",
                    %code,
                    entity = %entity_code,
                    "attribute removed"
                );
                Ok(())
            }
            Err(err)
                if err.is_not_found()
                    && self.settings.missing_on_revert == MissingOnRevert::Ignore =>
            {
                tracing::info!(
                    target: "eav_patch.revert",
                    %code,
                    entity = %entity_code,
                    "attribute absent, nothing to revert"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_set(
        &self,
        entity_type: EntityTypeId,
        def: &AttributeDefinition,
    ) -> Result<AttributeSetId> {
        match &def.attribute_set_name {
            Some(name) => self
                .ports
                .attribute_sets
                .set_id_by_name(entity_type, name)
                .await?
                .ok_or_else(|| ProvisionError::NotFound(format!("attribute set {name}"))),
            None => self.ports.attribute_sets.default_set_id(entity_type).await,
        }
    }

    /// Place the attribute in its display group, creating the group first
    /// when the set does not have it yet.
    async fn assign_group(
        &self,
        entity_type: EntityTypeId,
        attribute_id: AttributeId,
        def: &AttributeDefinition,
    ) -> Result<()> {
        let set_id = self.resolve_set(entity_type, def).await?;

        let existing = self
            .ports
            .attribute_sets
            .group_id(set_id, &def.group_name)
            .await?;

        if existing.is_none() {
            match self
                .ports
                .schema
                .add_group(entity_type, set_id, &def.group_name, def.sort_order_of_group)
                .await
            {
                Ok(()) => tracing::info!(
                    target: "eav_patch.provision",
                    group = %def.group_name,
                    %set_id,
                    "attribute group created"
                ),
                Err(err) if err.is_already_exists() => tracing::debug!(
                    target: "eav_patch.provision",
                    group = %def.group_name,
                    %set_id,
                    "attribute group already exists"
                ),
                Err(err) => return Err(err),
            }
        }

        self.ports
            .schema
            .add_to_group(
                entity_type,
                set_id,
                &def.group_code(),
                attribute_id,
                def.sort_order_in_group,
            )
            .await
    }
}
