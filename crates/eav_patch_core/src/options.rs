//! Enumerated option attachment for select/multiselect attributes.

use serde::{Deserialize, Serialize};

use crate::attribute_def::{StoreLabels, DEFAULT_STORE_ID};
use crate::error::{Result, ValidationError};
use crate::ports::{AttributeRecord, OptionRecord, OptionRegistry};
use crate::validate::check_option_target;

/// How declared options meet options already on the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionMode {
    /// Always add; re-applying duplicates options.
    #[default]
    Append,
    /// Skip declared options whose canonical label already exists.
    Reconcile,
}

/// The default-store label if present, otherwise the first declared one.
pub fn canonical_label(labels: &StoreLabels) -> Option<&str> {
    labels
        .get(DEFAULT_STORE_ID)
        .or_else(|| labels.first().map(|l| l.label.as_str()))
}

/// Option records in input order with sort orders `0..n`.
pub fn build_option_records(
    entries: &[StoreLabels],
) -> std::result::Result<Vec<OptionRecord>, ValidationError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, labels)| {
            let label = canonical_label(labels).ok_or(ValidationError::EmptyOption { index })?;
            Ok(OptionRecord {
                label: label.to_string(),
                store_labels: labels.clone(),
                sort_order: index as u32,
                is_default: false,
            })
        })
        .collect()
}

/// Attach `entries` to `attribute`, one registry call per option.
///
/// Every check runs before the first write, so a rejected batch leaves the
/// attribute's options untouched. Returns the number of options written.
pub async fn attach_options(
    registry: &dyn OptionRegistry,
    attribute: &AttributeRecord,
    entries: &[StoreLabels],
    mode: OptionMode,
) -> Result<usize> {
    check_option_target(attribute)?;
    let records = build_option_records(entries)?;

    let mut existing: Vec<String> = match mode {
        OptionMode::Append => Vec::new(),
        OptionMode::Reconcile => registry
            .list(attribute.entity_type_id, attribute.attribute_id)
            .await?
            .into_iter()
            .map(|stored| stored.option.label)
            .collect(),
    };

    let mut written = 0;
    for record in &records {
        if existing.contains(&record.label) {
            tracing::debug!(
                target: "eav_patch.options",
                code = %attribute.code,
                label = %record.label,
                "option already present, skipped"
            );
            continue;
        }
        registry
            .add(attribute.entity_type_id, attribute.attribute_id, record)
            .await?;
        written += 1;
        if mode == OptionMode::Reconcile {
            existing.push(record.label.clone());
        }
    }

    tracing::info!(
        target: "eav_patch.options",
        code = %attribute.code,
        declared = records.len(),
        written,
        ?mode,
        "options attached"
    );

    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::attribute_def::AttributeSettings;
    use crate::error::ProvisionError;
    use crate::ports::{AttributeId, EntityTypeId, OptionId, StoredOption};

    #[derive(Default)]
    struct RecordingRegistry {
        added: Mutex<Vec<OptionRecord>>,
    }

    #[async_trait]
    impl OptionRegistry for RecordingRegistry {
        async fn add(&self, _: EntityTypeId, _: AttributeId, option: &OptionRecord) -> Result<()> {
            self.added.lock().unwrap().push(option.clone());
            Ok(())
        }

        async fn list(&self, _: EntityTypeId, _: AttributeId) -> Result<Vec<StoredOption>> {
            Ok(self
                .added
                .lock()
                .unwrap()
                .iter()
                .enumerate()
                .map(|(i, option)| StoredOption {
                    option_id: OptionId(i as u32 + 1),
                    option: option.clone(),
                })
                .collect())
        }
    }

    fn select_attribute() -> AttributeRecord {
        AttributeRecord {
            attribute_id: AttributeId(12),
            entity_type_id: EntityTypeId(4),
            code: "color".into(),
            frontend_input: "select".into(),
            source_model: None,
            frontend_labels: vec![],
            settings: AttributeSettings::default(),
        }
    }

    fn entry(pairs: &[(u32, &str)]) -> StoreLabels {
        pairs.iter().map(|(id, label)| (*id, *label)).collect()
    }

    #[test]
    fn canonical_label_prefers_default_store() {
        assert_eq!(canonical_label(&entry(&[(0, "Def"), (1, "A")])), Some("Def"));
        assert_eq!(canonical_label(&entry(&[(1, "A"), (0, "Def")])), Some("Def"));
    }

    #[test]
    fn canonical_label_falls_back_to_first_declared() {
        assert_eq!(canonical_label(&entry(&[(1, "A"), (2, "B")])), Some("A"));
        assert_eq!(canonical_label(&entry(&[(2, "B"), (1, "A")])), Some("B"));
        assert_eq!(canonical_label(&StoreLabels::new()), None);
    }

    #[test]
    fn records_are_numbered_in_input_order() {
        let entries = vec![entry(&[(0, "X")]), entry(&[(0, "Y")]), entry(&[(3, "Z")])];
        let records = build_option_records(&entries).unwrap();
        let orders: Vec<u32> = records.iter().map(|r| r.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(records.iter().all(|r| !r.is_default));
        assert_eq!(records[2].label, "Z");
        assert_eq!(records[2].store_labels, entry(&[(3, "Z")]));
    }

    #[test]
    fn empty_entry_rejected_with_index() {
        let entries = vec![entry(&[(0, "X")]), StoreLabels::new()];
        assert_eq!(
            build_option_records(&entries),
            Err(ValidationError::EmptyOption { index: 1 })
        );
    }

    #[tokio::test]
    async fn text_input_writes_nothing() {
        let registry = RecordingRegistry::default();
        let mut attr = select_attribute();
        attr.frontend_input = "text".into();
        let err = attach_options(&registry, &attr, &[entry(&[(0, "X")])], OptionMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Validation(ValidationError::IncompatibleInputType { .. })
        ));
        assert!(registry.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn source_model_blocks_options() {
        let registry = RecordingRegistry::default();
        let mut attr = select_attribute();
        attr.source_model = Some("Vendor\\Model\\Source\\Color".into());
        let err = attach_options(&registry, &attr, &[entry(&[(0, "X")])], OptionMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::SourceModelConflict { .. })
        ));
        assert!(registry.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_entry_aborts_before_first_write() {
        let registry = RecordingRegistry::default();
        let entries = vec![entry(&[(0, "X")]), StoreLabels::new()];
        let err = attach_options(&registry, &select_attribute(), &entries, OptionMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::EmptyOption { index: 1 })
        ));
        assert!(registry.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_twice_duplicates() {
        let registry = RecordingRegistry::default();
        let entries = vec![entry(&[(0, "Value A")]), entry(&[(0, "Value B")])];
        for _ in 0..2 {
            attach_options(&registry, &select_attribute(), &entries, OptionMode::Append)
                .await
                .unwrap();
        }
        assert_eq!(registry.added.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn reconcile_skips_existing_labels() {
        let registry = RecordingRegistry::default();
        let first = vec![entry(&[(0, "Value A")])];
        attach_options(&registry, &select_attribute(), &first, OptionMode::Reconcile)
            .await
            .unwrap();

        let second = vec![entry(&[(0, "Value A")]), entry(&[(0, "Value B")])];
        let written = attach_options(&registry, &select_attribute(), &second, OptionMode::Reconcile)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let added = registry.added.lock().unwrap();
        let labels: Vec<&str> = added.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Value A", "Value B"]);
        assert_eq!(added[1].sort_order, 1);
    }

    #[tokio::test]
    async fn reconcile_collapses_repeats_within_one_batch() {
        let registry = RecordingRegistry::default();
        let entries = vec![
            entry(&[(0, "Red")]),
            entry(&[(0, "Red")]),
            entry(&[(0, "Blue")]),
        ];
        let written =
            attach_options(&registry, &select_attribute(), &entries, OptionMode::Reconcile)
                .await
                .unwrap();
        assert_eq!(written, 2);

        let added = registry.added.lock().unwrap();
        let labels: Vec<&str> = added.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Red", "Blue"]);
        assert_eq!(added[1].sort_order, 2);
    }
}
