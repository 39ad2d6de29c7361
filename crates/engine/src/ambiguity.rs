//! "Did you mean…" state: one active ambiguity per module, plus the
//! per-module notification flag the UI uses to alert the user.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::definitions::FeatureParameters;

/// One interpretation the module offered for an ambiguous command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguityOption {
    pub description: String,
    /// Partial parameter payload merged over the original on selection.
    #[ts(type = "Record<string, unknown>")]
    pub value: FeatureParameters,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub secondary_info: Option<String>,
}

/// The ambiguous invocation currently presented for one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguityRecord {
    pub id_module: i64,
    pub feature_identifier: String,
    pub sent_at: i64,
    pub options: Vec<AmbiguityOption>,
    #[ts(type = "Record<string, unknown> | null")]
    pub original_parameters: Option<FeatureParameters>,
}

/// Tracks the single presentation slot per module. A new ambiguity for the
/// same module replaces an unacknowledged one: last write wins, no queue.
#[derive(Debug, Default)]
pub struct AmbiguityResolver {
    slots: HashMap<i64, AmbiguityRecord>,
    notifications: HashSet<i64>,
}

impl AmbiguityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the module's slot and raises its notification, unless the
    /// result already arrived acknowledged.
    pub fn notify(&mut self, record: AmbiguityRecord, already_acknowledged: bool) {
        let id_module = record.id_module;
        self.slots.insert(id_module, record);
        if already_acknowledged {
            self.notifications.remove(&id_module);
        } else {
            self.notifications.insert(id_module);
        }
    }

    /// Lowers the notification flag without touching the slot (the user has
    /// seen the options but not picked one yet).
    pub fn acknowledge(&mut self, id_module: i64) -> bool {
        self.notifications.remove(&id_module)
    }

    /// Drops the module's slot and notification. Returns whether a slot was
    /// actually present.
    pub fn clear(&mut self, id_module: i64) -> bool {
        self.notifications.remove(&id_module);
        self.slots.remove(&id_module).is_some()
    }

    pub fn slot(&self, id_module: i64) -> Option<&AmbiguityRecord> {
        self.slots.get(&id_module)
    }

    pub fn has_notification(&self, id_module: i64) -> bool {
        self.notifications.contains(&id_module)
    }
}
