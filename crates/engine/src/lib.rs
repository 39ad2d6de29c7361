//! Command matching & dispatch engine.
//!
//! Free-text utterances are matched against per-user, per-module command
//! grammars; a match is bound into feature-typed parameters and dispatched to
//! the target module over the real-time channel, then correlated back to the
//! originating utterance when the module answers (or times out). Ambiguous
//! results re-surface as options the user picks from.
//!
//! All state for one user lives inside a single session actor
//! ([`session::spawn_session`]); the registry snapshot it matches against is
//! replaced atomically on rebuild and never mutated in place.

pub mod ambiguity;
pub mod binder;
pub mod definitions;
pub mod dispatcher;
pub mod events;
pub mod matcher;
pub mod registry;
pub mod session;

pub use ambiguity::{AmbiguityOption, AmbiguityRecord, AmbiguityResolver};
pub use definitions::{
    CommandDefinition, FeatureDefinition, FeatureParameters, LanguageCode, LanguageCommandSet,
    LanguageSwitchCommand, ModuleCommandSet, ParameterBinding, ParameterBindingKind,
    ParameterSpec, UserModuleDefinition,
};
pub use dispatcher::{
    Dispatcher, ExecutedCommand, InvocationKey, InvocationStatus, ResultDisposition,
};
pub use events::{
    AmbiguousResult, CommandPayload, CommandResultPayload, CommandResultValue,
    ModuleConnectionPayload, SessionEvent,
};
pub use matcher::{UtteranceMatch, match_utterance};
pub use registry::RegistrySnapshot;
pub use session::{SessionConfig, SessionHandle, SessionMessage, spawn_session};
