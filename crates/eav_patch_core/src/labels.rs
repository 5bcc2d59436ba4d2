//! Store-scoped attribute labels.

use serde::{Deserialize, Serialize};

use crate::attribute_def::StoreLabels;
use crate::error::Result;
use crate::ports::{AttributeRecord, AttributeRepository, FrontendLabel};

/// How declared store labels meet labels already on the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// Always append; re-applying duplicates entries.
    Append,
    /// One label per store: an existing entry for the store is replaced.
    #[default]
    ReplaceStore,
}

/// Attach each label and persist the attribute once per label.
/// Returns how many saves were issued.
pub async fn attach_store_labels(
    repo: &dyn AttributeRepository,
    attribute: &mut AttributeRecord,
    labels: &StoreLabels,
    mode: LabelMode,
) -> Result<usize> {
    let mut saved = 0;

    for entry in labels {
        let changed = match mode {
            LabelMode::Append => {
                attribute.frontend_labels.push(FrontendLabel {
                    store_id: entry.store_id,
                    label: entry.label.clone(),
                });
                true
            }
            LabelMode::ReplaceStore => replace_store_label(attribute, entry.store_id, &entry.label),
        };

        if !changed {
            tracing::debug!(
                target: "eav_patch.labels",
                code = %attribute.code,
                store_id = entry.store_id,
                "store label already current"
            );
            continue;
        }

        repo.save(attribute).await?;
        saved += 1;
        tracing::debug!(
            target: "eav_patch.labels",
            code = %attribute.code,
            store_id = entry.store_id,
            "store label saved"
        );
    }

    Ok(saved)
}

/// Leaves exactly one entry for `store_id`. Returns false if nothing changed.
fn replace_store_label(attribute: &mut AttributeRecord, store_id: u32, label: &str) -> bool {
    let before = attribute.frontend_labels.len();
    let mut kept = false;
    let mut changed = false;

    attribute.frontend_labels.retain_mut(|existing| {
        if existing.store_id != store_id {
            return true;
        }
        if kept {
            return false;
        }
        kept = true;
        if existing.label != label {
            existing.label = label.to_string();
            changed = true;
        }
        true
    });

    if !kept {
        attribute.frontend_labels.push(FrontendLabel {
            store_id,
            label: label.to_string(),
        });
        changed = true;
    }

    changed || attribute.frontend_labels.len() != before
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::attribute_def::AttributeSettings;
    use crate::error::ProvisionError;
    use crate::ports::{AttributeId, EntityTypeId};

    #[derive(Default)]
    struct RecordingRepo {
        saves: Mutex<Vec<Vec<FrontendLabel>>>,
    }

    #[async_trait]
    impl AttributeRepository for RecordingRepo {
        async fn get_by_code(&self, _: EntityTypeId, code: &str) -> Result<AttributeRecord> {
            Err(ProvisionError::NotFound(code.to_string()))
        }

        async fn save(&self, attribute: &AttributeRecord) -> Result<()> {
            self.saves
                .lock()
                .unwrap()
                .push(attribute.frontend_labels.clone());
            Ok(())
        }
    }

    fn attribute() -> AttributeRecord {
        AttributeRecord {
            attribute_id: AttributeId(9),
            entity_type_id: EntityTypeId(4),
            code: "my_attribute".into(),
            frontend_input: "text".into(),
            source_model: None,
            frontend_labels: vec![],
            settings: AttributeSettings::default(),
        }
    }

    fn labels() -> StoreLabels {
        [(1, "Store 1"), (2, "Store 2")].into_iter().collect()
    }

    #[tokio::test]
    async fn append_saves_once_per_label() {
        let repo = RecordingRepo::default();
        let mut attr = attribute();
        let saved = attach_store_labels(&repo, &mut attr, &labels(), LabelMode::Append)
            .await
            .unwrap();
        assert_eq!(saved, 2);
        let saves = repo.saves.lock().unwrap();
        assert_eq!(saves.len(), 2);
        // each save carries the accumulated list
        assert_eq!(saves[0].len(), 1);
        assert_eq!(saves[1].len(), 2);
    }

    #[tokio::test]
    async fn append_twice_duplicates() {
        let repo = RecordingRepo::default();
        let mut attr = attribute();
        for _ in 0..2 {
            attach_store_labels(&repo, &mut attr, &labels(), LabelMode::Append)
                .await
                .unwrap();
        }
        assert_eq!(attr.frontend_labels.len(), 4);
    }

    #[tokio::test]
    async fn replace_store_is_idempotent() {
        let repo = RecordingRepo::default();
        let mut attr = attribute();
        attach_store_labels(&repo, &mut attr, &labels(), LabelMode::ReplaceStore)
            .await
            .unwrap();
        let saved = attach_store_labels(&repo, &mut attr, &labels(), LabelMode::ReplaceStore)
            .await
            .unwrap();
        assert_eq!(saved, 0);
        assert_eq!(attr.frontend_labels.len(), 2);
    }

    #[tokio::test]
    async fn replace_store_updates_and_collapses_duplicates() {
        let repo = RecordingRepo::default();
        let mut attr = attribute();
        attr.frontend_labels = vec![
            FrontendLabel {
                store_id: 1,
                label: "old".into(),
            },
            FrontendLabel {
                store_id: 3,
                label: "keep".into(),
            },
            FrontendLabel {
                store_id: 1,
                label: "old again".into(),
            },
        ];
        let update: StoreLabels = [(1, "new")].into_iter().collect();
        let saved = attach_store_labels(&repo, &mut attr, &update, LabelMode::ReplaceStore)
            .await
            .unwrap();
        assert_eq!(saved, 1);
        assert_eq!(
            attr.frontend_labels,
            vec![
                FrontendLabel {
                    store_id: 1,
                    label: "new".into(),
                },
                FrontendLabel {
                    store_id: 3,
                    label: "keep".into(),
                },
            ]
        );
    }
}
