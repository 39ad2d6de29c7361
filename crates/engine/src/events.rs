//! Wire payloads for the real-time channel and the per-session event stream.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ambiguity::{AmbiguityOption, AmbiguityRecord};
use crate::definitions::{FeatureParameters, LanguageCode};
use crate::dispatcher::ExecutedCommand;

/// `COMMAND` — session → module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    pub id_module: i64,
    pub feature_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "Record<string, unknown> | null")]
    pub parameters: Option<FeatureParameters>,
    pub sent_at: i64,
}

/// Structured half of a `COMMAND_RESULT`: the module recognized the command
/// but found several equally valid interpretations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguousResult {
    pub options: Vec<AmbiguityOption>,
    #[serde(default)]
    #[ts(type = "Record<string, unknown> | null")]
    pub parameters: Option<FeatureParameters>,
    #[serde(default)]
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
pub enum CommandResultValue {
    Completed(bool),
    Ambiguous(AmbiguousResult),
}

/// `COMMAND_RESULT` — module → session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultPayload {
    pub id_module: i64,
    pub feature_identifier: String,
    pub sent_at: i64,
    pub result: CommandResultValue,
}

/// `MODULE_CONNECTION` — server → user clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConnectionPayload {
    pub id_module: i64,
    pub is_connected: bool,
}

/// Everything a connected user client can observe from its session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    CommandHistory { commands: Vec<ExecutedCommand> },
    #[serde(rename_all = "camelCase")]
    LanguageChanged { language: LanguageCode },
    #[serde(rename_all = "camelCase")]
    AmbiguityUpdated {
        id_module: i64,
        record: Option<AmbiguityRecord>,
    },
    #[serde(rename_all = "camelCase")]
    AmbiguityNotification { id_module: i64, pending: bool },
    ModuleConnection(ModuleConnectionPayload),
    #[serde(rename_all = "camelCase")]
    RegistryRebuilt {
        module_commands: usize,
        language_commands: usize,
    },
}
