//! Data patch surface consumed by an external patch runner, plus the YAML
//! manifest that declares one attribute patch.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::attribute_def::AttributeDefinition;
use crate::error::{ProvisionError, Result};
use crate::ports::{AttributeHandle, EavPorts};
use crate::provisioner::{ProvisionSettings, Provisioner};

/// A one-time schema/data change, ordered by the runner via `dependencies`.
#[async_trait]
pub trait DataPatch: Send + Sync {
    fn name(&self) -> &str;

    /// Names this patch was previously registered under.
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }

    /// Patches that must be applied before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn apply(&self) -> Result<()>;
}

#[async_trait]
pub trait RevertablePatch: DataPatch {
    async fn revert(&self) -> Result<()>;
}

/// Patch identity block of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInfo {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One attribute patch as declared on disk.
///
/// ```yaml
/// patch:
///   name: AddMyProductAttribute
/// provisioning:
///   label_mode: replace_store
/// attribute:
///   code: my_attribute
///   default_label: My Attribute
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchManifest {
    pub patch: PatchInfo,
    #[serde(default)]
    pub provisioning: ProvisionSettings,
    pub attribute: AttributeDefinition,
}

impl PatchManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::InvalidManifest(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ProvisionError::InvalidManifest(e.to_string()))?;
        if manifest.patch.name.trim().is_empty() {
            return Err(ProvisionError::InvalidManifest(
                "patch name must not be empty".into(),
            ));
        }
        Ok(manifest)
    }

    /// Bind the manifest to a set of ports.
    pub fn into_patch(self, ports: EavPorts) -> AttributePatch {
        AttributePatch::new(self.patch, self.attribute, ports).with_settings(self.provisioning)
    }
}

/// Patch that provisions one attribute on apply and removes it on revert.
pub struct AttributePatch {
    info: PatchInfo,
    definition: AttributeDefinition,
    provisioner: Provisioner,
}

impl AttributePatch {
    pub fn new(info: PatchInfo, definition: AttributeDefinition, ports: EavPorts) -> Self {
        Self {
            info,
            definition,
            provisioner: Provisioner::new(ports),
        }
    }

    pub fn with_settings(mut self, settings: ProvisionSettings) -> Self {
        self.provisioner = self.provisioner.with_settings(settings);
        self
    }

    pub fn definition(&self) -> &AttributeDefinition {
        &self.definition
    }

    /// Apply and hand back the attribute handle.
    pub async fn apply_attribute(&self) -> Result<AttributeHandle> {
        self.provisioner.apply(&self.definition).await
    }
}

#[async_trait]
impl DataPatch for AttributePatch {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn aliases(&self) -> Vec<String> {
        self.info.aliases.clone()
    }

    fn dependencies(&self) -> Vec<String> {
        self.info.dependencies.clone()
    }

    async fn apply(&self) -> Result<()> {
        self.apply_attribute().await.map(|_| ())
    }
}

#[async_trait]
impl RevertablePatch for AttributePatch {
    async fn revert(&self) -> Result<()> {
        self.provisioner
            .revert(&self.definition.entity_type, &self.definition.code)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::labels::LabelMode;
    use crate::memory::InMemoryEav;

    const MANIFEST: &str = r#"
patch:
  name: AddMyProductAttribute
  aliases:
    - LegacyAddMyAttribute
provisioning:
  label_mode: append
attribute:
  code: my_attribute
  default_label: My Attribute
  locale_labels:
    1: My label for Store View 1
    2: My label for Store View 2
"#;

    #[test]
    fn parse_manifest() {
        let manifest = PatchManifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.patch.name, "AddMyProductAttribute");
        assert_eq!(manifest.patch.aliases, vec!["LegacyAddMyAttribute"]);
        assert!(manifest.patch.dependencies.is_empty());
        assert_eq!(manifest.provisioning.label_mode, LabelMode::Append);
        assert_eq!(manifest.attribute.locale_labels.len(), 2);
    }

    #[test]
    fn empty_name_rejected() {
        let yaml = "patch:\n  name: ' '\nattribute:\n  code: x\n  default_label: X\n";
        assert!(matches!(
            PatchManifest::from_yaml(yaml),
            Err(ProvisionError::InvalidManifest(_))
        ));
    }

    #[test]
    fn malformed_yaml_rejected() {
        assert!(matches!(
            PatchManifest::from_yaml("patch: [unterminated"),
            Err(ProvisionError::InvalidManifest(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        let manifest = PatchManifest::load(file.path()).unwrap();
        assert_eq!(manifest.attribute.code, "my_attribute");

        let missing = PatchManifest::load("/nonexistent/patch.yaml").unwrap_err();
        assert!(missing.to_string().contains("cannot read"));
    }

    #[test]
    fn metadata_defaults_to_none() {
        let eav = Arc::new(InMemoryEav::with_catalog_product());
        let patch = AttributePatch::new(
            PatchInfo {
                name: "AddColor".into(),
                aliases: vec![],
                dependencies: vec![],
            },
            AttributeDefinition::new("color", "Color"),
            EavPorts::from_engine(eav),
        );
        assert_eq!(patch.name(), "AddColor");
        assert!(patch.aliases().is_empty());
        assert!(patch.dependencies().is_empty());
    }

    #[tokio::test]
    async fn apply_then_revert_through_patch() {
        let eav = Arc::new(InMemoryEav::with_catalog_product());
        let patch = PatchManifest::from_yaml(MANIFEST)
            .unwrap()
            .into_patch(EavPorts::from_engine(eav.clone()));
        assert_eq!(patch.aliases(), vec!["LegacyAddMyAttribute".to_string()]);

        patch.apply().await.unwrap();
        assert!(eav.attribute("catalog_product", "my_attribute").await.is_some());

        patch.revert().await.unwrap();
        assert!(eav.attribute("catalog_product", "my_attribute").await.is_none());
    }
}
