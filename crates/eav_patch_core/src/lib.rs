//! eav_patch_core: declarative provisioning of a single EAV attribute.
//!
//! An [`AttributeDefinition`] describes the desired attribute; the
//! [`Provisioner`] applies it through the port traits in [`ports`] (entity
//! registry, schema engine, attribute repository, attribute sets, options,
//! maintenance window) and reverts it by code. [`memory::InMemoryEav`] is a
//! complete in-process engine for tests and dry runs.

pub mod attribute_def;
pub mod error;
pub mod labels;
pub mod maintenance;
pub mod memory;
pub mod options;
pub mod patch;
pub mod ports;
pub mod provisioner;
pub mod validate;

pub use attribute_def::{
    product_types, AttributeDefinition, AttributeFlags, AttributeScope, AttributeSettings,
    InputType, ModelClasses, StorageType, StoreLabel, StoreLabels, DEFAULT_STORE_ID,
    PRODUCT_ENTITY,
};
pub use error::{ProvisionError, Result, ValidationError};
pub use labels::LabelMode;
pub use maintenance::{MaintenanceGuard, MaintenanceWindow};
pub use options::OptionMode;
pub use patch::{AttributePatch, DataPatch, PatchInfo, PatchManifest, RevertablePatch};
pub use ports::{AttributeHandle, EavPorts};
pub use provisioner::{MissingOnRevert, ProvisionSettings, Provisioner};
pub use validate::validate;
