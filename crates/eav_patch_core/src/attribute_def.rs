//! Attribute definition: the immutable description of one EAV attribute,
//! as read from a patch manifest. No engine dependency.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// Store id of the admin ("default") locale.
pub const DEFAULT_STORE_ID: u32 = 0;

/// Entity code of catalog products.
pub const PRODUCT_ENTITY: &str = "catalog_product";

/// Product type codes usable in `applicable_entity_subtypes`.
pub mod product_types {
    pub const SIMPLE: &str = "simple";
    pub const BUNDLE: &str = "bundle";
    pub const VIRTUAL: &str = "virtual";
    pub const GROUPED: &str = "grouped";
    pub const CONFIGURABLE: &str = "configurable";

    pub const ALL: [&str; 5] = [SIMPLE, BUNDLE, VIRTUAL, GROUPED, CONFIGURABLE];
}

/// Physical value table backing the attribute.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StorageType {
    /// Stored in the entity main table instead of a typed value table.
    Static,
    #[default]
    Varchar,
    #[serde(rename = "int", alias = "integer")]
    #[strum(to_string = "int", serialize = "integer")]
    Integer,
    Decimal,
    Datetime,
}

/// Admin input widget.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    #[serde(rename = "int", alias = "integer")]
    #[strum(to_string = "int", serialize = "integer")]
    Integer,
    Select,
    Multiselect,
    Date,
    Boolean,
    Multiline,
    Hidden,
    Textarea,
}

impl InputType {
    /// Only select-like inputs can carry enumerated options.
    pub fn accepts_options(self) -> bool {
        matches!(self, Self::Select | Self::Multiselect)
    }
}

/// Granularity at which attribute values may differ.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttributeScope {
    #[default]
    Store,
    Global,
    Website,
}

impl AttributeScope {
    /// Integer the schema engine stores in its `global` column.
    pub fn engine_value(self) -> i64 {
        match self {
            Self::Store => 0,
            Self::Global => 1,
            Self::Website => 2,
        }
    }
}

/// Independent behaviour switches. All default to `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeFlags {
    pub required: bool,
    /// Consider the value in search.
    pub searchable: bool,
    /// Layered navigation on category pages.
    pub filterable: bool,
    /// Layered navigation on search result pages.
    pub filterable_in_search: bool,
    pub visible_in_advanced_search: bool,
    pub comparable: bool,
    /// Shown in the "additional information" section of the product page.
    pub visible_on_storefront: bool,
    pub html_allowed: bool,
    pub unique: bool,
    pub used_in_listing: bool,
    pub used_in_grid: bool,
    pub visible_in_grid: bool,
    pub filterable_in_grid: bool,
    pub used_for_sort_by: bool,
    pub used_in_promo_rules: bool,
    /// Admins may edit the attribute's properties.
    pub user_editable: bool,
}

/// Optional engine model class references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelClasses {
    pub input_renderer: Option<String>,
    pub attribute_model: Option<String>,
    /// External option source. Mutually exclusive with declared options.
    pub source_model: Option<String>,
    pub frontend_model: Option<String>,
    pub backend_model: Option<String>,
}

// ── Store-scoped labels ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLabel {
    pub store_id: u32,
    pub label: String,
}

/// Store id → label pairs in declaration order.
///
/// Serialised as a map. Order matters: when no default-store label exists the
/// first declared label becomes an option's canonical label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreLabels(Vec<StoreLabel>);

impl StoreLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label for `store_id`, keeping the original position if the
    /// store is already present.
    pub fn insert(&mut self, store_id: u32, label: impl Into<String>) {
        let label = label.into();
        match self.0.iter_mut().find(|l| l.store_id == store_id) {
            Some(existing) => existing.label = label,
            None => self.0.push(StoreLabel { store_id, label }),
        }
    }

    pub fn get(&self, store_id: u32) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.store_id == store_id)
            .map(|l| l.label.as_str())
    }

    pub fn first(&self) -> Option<&StoreLabel> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StoreLabel> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<StoreLabel> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<(u32, S)> for StoreLabels {
    fn from_iter<I: IntoIterator<Item = (u32, S)>>(iter: I) -> Self {
        let mut labels = Self::new();
        for (store_id, label) in iter {
            labels.insert(store_id, label);
        }
        labels
    }
}

impl<'a> IntoIterator for &'a StoreLabels {
    type Item = &'a StoreLabel;
    type IntoIter = std::slice::Iter<'a, StoreLabel>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for StoreLabels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for l in &self.0 {
            map.serialize_entry(&l.store_id, &l.label)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StoreLabels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LabelsVisitor;

        impl<'de> Visitor<'de> for LabelsVisitor {
            type Value = StoreLabels;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of store id to label")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut labels = StoreLabels::new();
                while let Some((key, label)) = map.next_entry::<StoreKey, String>()? {
                    labels.insert(key.0, label);
                }
                Ok(labels)
            }
        }

        deserializer.deserialize_map(LabelsVisitor)
    }
}

/// Map key accepting both integer keys (YAML) and numeric strings (JSON).
struct StoreKey(u32);

impl<'de> Deserialize<'de> for StoreKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = StoreKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative store id")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                u32::try_from(v)
                    .map(StoreKey)
                    .map_err(|_| E::custom(format!("store id {v} out of range")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u32::try_from(v)
                    .map(StoreKey)
                    .map_err(|_| E::custom(format!("store id {v} out of range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.trim()
                    .parse::<u32>()
                    .map(StoreKey)
                    .map_err(|_| E::custom(format!("store id \"{v}\" is not a number")))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

// ── Settings map ──────────────────────────────────────────────

/// Property map handed to the schema engine when ensuring an attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSettings(BTreeMap<String, Value>);

impl AttributeSettings {
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`; `None` when absent or null.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── AttributeDefinition ───────────────────────────────────────

fn default_entity_type() -> String {
    PRODUCT_ENTITY.to_string()
}

fn default_group_name() -> String {
    "General".to_string()
}

fn default_sort_order_in_group() -> i32 {
    10
}

fn default_sort_order_of_group() -> i32 {
    5
}

fn default_position() -> i32 {
    30
}

fn default_true() -> bool {
    true
}

/// Desired state of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Stable key, unique within the entity type.
    pub code: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub storage_type: StorageType,
    #[serde(default)]
    pub input_type: InputType,
    pub default_label: String,
    #[serde(default, skip_serializing_if = "StoreLabels::is_empty")]
    pub locale_labels: StoreLabels,
    #[serde(default)]
    pub flags: AttributeFlags,
    #[serde(default)]
    pub scope: AttributeScope,
    /// Empty means every subtype.
    #[serde(default)]
    pub applicable_entity_subtypes: Vec<String>,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    /// Derived from `group_name` when absent.
    #[serde(default)]
    pub group_code: Option<String>,
    /// Entity default set when absent.
    #[serde(default)]
    pub attribute_set_name: Option<String>,
    #[serde(default = "default_sort_order_in_group")]
    pub sort_order_in_group: i32,
    #[serde(default = "default_sort_order_of_group")]
    pub sort_order_of_group: i32,
    /// Position among the entity's other attributes.
    #[serde(default = "default_position")]
    pub position: i32,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub wysiwyg_enabled: bool,
    #[serde(default)]
    pub models: ModelClasses,
    #[serde(default)]
    pub backend_table: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub simple_option_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub localized_options: Vec<StoreLabels>,
}

impl AttributeDefinition {
    /// A varchar/text product attribute in the "General" group with every
    /// other setting at its default.
    pub fn new(code: impl Into<String>, default_label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            entity_type: default_entity_type(),
            storage_type: StorageType::default(),
            input_type: InputType::default(),
            default_label: default_label.into(),
            locale_labels: StoreLabels::new(),
            flags: AttributeFlags::default(),
            scope: AttributeScope::default(),
            applicable_entity_subtypes: Vec::new(),
            group_name: default_group_name(),
            group_code: None,
            attribute_set_name: None,
            sort_order_in_group: default_sort_order_in_group(),
            sort_order_of_group: default_sort_order_of_group(),
            position: default_position(),
            default_value: None,
            note: None,
            visible: true,
            wysiwyg_enabled: false,
            models: ModelClasses::default(),
            backend_table: None,
            simple_option_values: Vec::new(),
            localized_options: Vec::new(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn has_options(&self) -> bool {
        !self.simple_option_values.is_empty() || !self.localized_options.is_empty()
    }

    /// Simple values (as default-store labels) followed by localized options.
    pub fn option_entries(&self) -> Vec<StoreLabels> {
        self.simple_option_values
            .iter()
            .map(|value| {
                std::iter::once((DEFAULT_STORE_ID, value.clone())).collect::<StoreLabels>()
            })
            .chain(self.localized_options.iter().cloned())
            .collect()
    }

    pub fn group_code(&self) -> String {
        match &self.group_code {
            Some(code) if !code.trim().is_empty() => code.clone(),
            _ => convert_to_group_code(&self.group_name),
        }
    }

    /// Comma-joined subtype list, duplicates dropped.
    pub fn apply_to(&self) -> String {
        let mut seen: Vec<&str> = Vec::new();
        for subtype in &self.applicable_entity_subtypes {
            let subtype = subtype.trim();
            if !subtype.is_empty() && !seen.contains(&subtype) {
                seen.push(subtype);
            }
        }
        seen.join(",")
    }

    /// Property map for `SchemaEngine::ensure_attribute`.
    pub fn to_settings(&self) -> AttributeSettings {
        let f = &self.flags;
        let m = &self.models;
        let mut s = AttributeSettings::default();

        s.insert("label", self.default_label.as_str());
        s.insert("type", self.storage_type.to_string());
        s.insert("input", self.input_type.to_string());
        s.insert("input_renderer", m.input_renderer.clone());
        s.insert("wysiwyg_enabled", self.wysiwyg_enabled);
        s.insert("required", f.required);
        s.insert("attribute_model", m.attribute_model.clone());
        s.insert("source", m.source_model.clone());
        s.insert("frontend", m.frontend_model.clone());
        s.insert("backend", m.backend_model.clone());
        s.insert("sort_order", self.position);
        s.insert("global", self.scope.engine_value());
        s.insert("default", self.default_value.clone());
        s.insert("visible", self.visible);
        s.insert("user_defined", f.user_editable);
        s.insert("searchable", f.searchable);
        s.insert("filterable", f.filterable);
        s.insert("filterable_in_search", f.filterable_in_search);
        s.insert("visible_in_advanced_search", f.visible_in_advanced_search);
        s.insert("comparable", f.comparable);
        s.insert("visible_on_front", f.visible_on_storefront);
        s.insert("is_html_allowed_on_front", f.html_allowed);
        s.insert("unique", f.unique);
        s.insert("apply_to", self.apply_to());
        s.insert("attribute_set", self.attribute_set_name.clone());
        s.insert("used_in_product_listing", f.used_in_listing);
        s.insert("is_used_in_grid", f.used_in_grid);
        s.insert("is_visible_in_grid", f.visible_in_grid);
        s.insert("is_filterable_in_grid", f.filterable_in_grid);
        s.insert("used_for_sort_by", f.used_for_sort_by);
        s.insert("is_used_for_promo_rules", f.used_in_promo_rules);
        s.insert("table", self.backend_table.clone());
        s.insert("note", self.note.clone());
        s
    }

    /// Version-prefixed SHA-256 of the canonical JSON form.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        let hash = Sha256::digest(json.as_bytes());
        Ok(format!("v1:{}", hex::encode(hash)))
    }
}

/// Group code for a display group name: lowercase, runs of anything outside
/// `[a-z0-9]` collapsed to `-`, no leading or trailing `-`.
pub fn convert_to_group_code(group_name: &str) -> String {
    let mut code = String::with_capacity(group_name.len());
    let mut pending_dash = false;
    for ch in group_name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !code.is_empty() {
                code.push('-');
            }
            pending_dash = false;
            code.push(ch);
        } else {
            pending_dash = true;
        }
    }
    code
}
