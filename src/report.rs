//! Plan report: what an attribute patch leaves behind in a fresh engine.

use std::fmt::Write as _;

use eav_patch_core::memory::{EavSnapshot, GroupMembership};
use eav_patch_core::ports::{AttributeRecord, StoredOption};
use eav_patch_core::AttributeHandle;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub patch: String,
    pub aliases: Vec<String>,
    pub dependencies: Vec<String>,
    pub fingerprint: String,
    pub handle: AttributeHandle,
    pub reverted: bool,
    /// `None` once reverted.
    pub attribute: Option<AttributeRecord>,
    pub group: Option<String>,
    pub memberships: Vec<GroupMembership>,
    pub options: Vec<StoredOption>,
}

impl PlanReport {
    /// Collect the attribute's rows out of an engine snapshot.
    pub fn from_snapshot(
        patch: String,
        aliases: Vec<String>,
        dependencies: Vec<String>,
        fingerprint: String,
        handle: AttributeHandle,
        reverted: bool,
        snapshot: &EavSnapshot,
    ) -> Self {
        let attribute = snapshot
            .attributes
            .iter()
            .find(|a| a.attribute_id == handle.attribute_id)
            .cloned();
        let memberships: Vec<GroupMembership> = snapshot
            .memberships
            .iter()
            .filter(|m| m.attribute_id == handle.attribute_id)
            .cloned()
            .collect();
        let group = memberships.first().and_then(|m| {
            snapshot
                .groups
                .iter()
                .find(|g| g.group_id == m.group_id)
                .map(|g| g.name.clone())
        });
        let options = snapshot
            .options
            .get(&handle.attribute_id)
            .cloned()
            .unwrap_or_default();

        Self {
            patch,
            aliases,
            dependencies,
            fingerprint,
            handle,
            reverted,
            attribute,
            group,
            memberships,
            options,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Attribute Patch Plan ===");
        let _ = writeln!(out);
        let _ = writeln!(out, "Patch:        {}", self.patch);
        if !self.aliases.is_empty() {
            let _ = writeln!(out, "Aliases:      {}", self.aliases.join(", "));
        }
        if !self.dependencies.is_empty() {
            let _ = writeln!(out, "Depends on:   {}", self.dependencies.join(", "));
        }
        let _ = writeln!(out, "Fingerprint:  {}", self.fingerprint);
        let _ = writeln!(
            out,
            "Attribute:    {} (id {})",
            self.handle.code, self.handle.attribute_id
        );
        let _ = writeln!(out);

        if self.reverted {
            let _ = writeln!(out, "Reverted:     attribute removed, no rows left behind");
            return out;
        }

        if let Some(attribute) = &self.attribute {
            let _ = writeln!(out, "Input:        {}", attribute.frontend_input);
            if let Some(label) = attribute.settings.get_str("label") {
                let _ = writeln!(out, "Label:        {label}");
            }
            for l in &attribute.frontend_labels {
                let _ = writeln!(out, "  store {:>3}:  {}", l.store_id, l.label);
            }
        }

        match (&self.group, self.memberships.first()) {
            (Some(group), Some(m)) => {
                let _ = writeln!(out, "Group:        {group} (position {})", m.sort_order);
            }
            _ => {
                let _ = writeln!(out, "Group:        none");
            }
        }

        if !self.options.is_empty() {
            let _ = writeln!(out, "Options:");
            for stored in &self.options {
                let _ = writeln!(
                    out,
                    "  [{}] {} ({} store label(s))",
                    stored.option.sort_order,
                    stored.option.label,
                    stored.option.store_labels.len()
                );
            }
        }
        out
    }
}
