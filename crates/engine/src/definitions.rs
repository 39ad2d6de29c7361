//! User-configured command and feature definitions consumed by the registry.
//!
//! These are the engine's read-only inputs: which modules a user has
//! installed, the command phrases registered per module and language, the
//! feature contracts each module declares, and the language-switch phrases.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Flat parameter object sent to a module feature. Absence of a key means
/// "not supplied"; modules fall back to their own defaults.
pub type FeatureParameters = serde_json::Map<String, serde_json::Value>;

/// Languages the speech recognition can listen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
pub enum LanguageCode {
    #[serde(rename = "de-DE")]
    DeDe,
    #[serde(rename = "en-GB")]
    EnGb,
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "es-ES")]
    EsEs,
    #[serde(rename = "fr-FR")]
    FrFr,
    #[serde(rename = "it-IT")]
    ItIt,
    #[serde(rename = "pt-BR")]
    PtBr,
    #[serde(rename = "pt-PT")]
    PtPt,
}

impl LanguageCode {
    pub fn code(&self) -> &'static str {
        match self {
            LanguageCode::DeDe => "de-DE",
            LanguageCode::EnGb => "en-GB",
            LanguageCode::EnUs => "en-US",
            LanguageCode::EsEs => "es-ES",
            LanguageCode::FrFr => "fr-FR",
            LanguageCode::ItIt => "it-IT",
            LanguageCode::PtBr => "pt-BR",
            LanguageCode::PtPt => "pt-PT",
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for LanguageCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "de-DE" => Ok(LanguageCode::DeDe),
            "en-GB" => Ok(LanguageCode::EnGb),
            "en-US" => Ok(LanguageCode::EnUs),
            "es-ES" => Ok(LanguageCode::EsEs),
            "fr-FR" => Ok(LanguageCode::FrFr),
            "it-IT" => Ok(LanguageCode::ItIt),
            "pt-BR" => Ok(LanguageCode::PtBr),
            "pt-PT" => Ok(LanguageCode::PtPt),
            _ => Err(format!("unknown language code: {s}")),
        }
    }
}

/// How a command parameter gets its value at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterBindingKind {
    /// Intentionally omitted from dispatch.
    Undefined,
    /// Fixed value configured on the command.
    Constant,
    /// Taken from a free grammar variable.
    Variable,
    /// Taken from a restricted-choice grammar variable, resolved by index.
    RestrictedVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ParameterBinding {
    pub identifier: String,
    pub kind: ParameterBindingKind,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub variable_name: Option<String>,
    /// Ordered concrete values a restricted-choice variable resolves to.
    #[serde(default)]
    pub variable_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CommandDefinition {
    pub pattern: String,
    pub feature_identifier: String,
    #[serde(default)]
    pub parameters: Vec<ParameterBinding>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A module's declared contract for one feature parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub identifier: String,
    /// Empty means the parameter is a free value.
    #[serde(default)]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDefinition {
    pub identifier: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

/// The commands registered for one module in one language, with the optional
/// per-language activation prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCommandSet {
    pub language: LanguageCode,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub is_prefix_mandated: bool,
    #[serde(default)]
    pub commands: Vec<CommandDefinition>,
}

/// One module as installed by a user, with its command sets and features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UserModuleDefinition {
    pub id_module: i64,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub command_sets: Vec<ModuleCommandSet>,
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct LanguageSwitchCommand {
    pub target_language: LanguageCode,
    pub pattern: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Language-switch phrases, keyed by the language they are spoken in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct LanguageCommandSet {
    #[serde(default)]
    pub languages_to_listen: Vec<LanguageCode>,
    #[serde(default)]
    pub commands: HashMap<LanguageCode, Vec<LanguageSwitchCommand>>,
}

fn default_true() -> bool {
    true
}
