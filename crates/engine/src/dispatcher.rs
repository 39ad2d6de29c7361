//! Invocation state machine: pending table, result correlation, timeouts and
//! the capped execution history.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ambiguity::AmbiguityOption;
use crate::definitions::FeatureParameters;
use crate::events::{CommandResultPayload, CommandResultValue};

/// How long a dispatched invocation may stay pending before it is declared
/// dead. Guards against modules that silently drop a command or disconnect
/// mid-flight.
pub const DISPATCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Upper bound on the retained execution history.
pub const MAX_HISTORY_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationStatus {
    Pending,
    Successful,
    Ambiguous,
    Error,
    NotRecognized,
}

/// Correlation identity of one dispatched invocation. The utterance text is
/// deliberately not part of it: two identical dispatches to the same feature
/// within the same millisecond are indistinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct InvocationKey {
    pub id_module: i64,
    pub feature_identifier: String,
    pub sent_at: i64,
}

/// One entry of the user-visible execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedCommand {
    #[serde(default)]
    pub id_module: Option<i64>,
    #[serde(default)]
    pub feature_identifier: Option<String>,
    pub sent_at: i64,
    pub status: InvocationStatus,
    /// The utterance as typed or spoken.
    pub value: String,
    pub description: String,
}

/// What a correlated result turned out to be, for the caller to act on.
#[derive(Debug)]
pub enum ResultDisposition {
    Successful,
    Failed,
    Ambiguous {
        options: Vec<AmbiguityOption>,
        original_parameters: Option<FeatureParameters>,
        already_acknowledged: bool,
    },
    /// No pending invocation under that key: already timed out, already
    /// resolved, or never dispatched. Discarded, never surfaced.
    Stale,
}

/// Single-writer invocation tracker owned by the session actor.
///
/// Every record transitions out of [`InvocationStatus::Pending`] exactly
/// once, by the first of its timeout or its correlated result, and is
/// immutable history afterwards.
#[derive(Debug, Default)]
pub struct Dispatcher {
    /// Newest first, like the history the user sees.
    history: VecDeque<ExecutedCommand>,
    /// Pending correlation keys, with the dispatch parameters retained for a
    /// possible ambiguity merge.
    pending: HashMap<InvocationKey, Option<FeatureParameters>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly dispatched invocation as pending.
    pub fn record_dispatch(
        &mut self,
        key: InvocationKey,
        value: String,
        parameters: Option<FeatureParameters>,
    ) {
        self.history.push_front(ExecutedCommand {
            id_module: Some(key.id_module),
            feature_identifier: Some(key.feature_identifier.clone()),
            sent_at: key.sent_at,
            status: InvocationStatus::Pending,
            value,
            description: "Executing...".to_string(),
        });
        self.pending.insert(key, parameters);
        self.trim_history();
    }

    pub fn record_not_recognized(&mut self, value: String, sent_at: i64) {
        self.history.push_front(ExecutedCommand {
            id_module: None,
            feature_identifier: None,
            sent_at,
            status: InvocationStatus::NotRecognized,
            value,
            description: "Command not recognized".to_string(),
        });
        self.trim_history();
    }

    pub fn record_language_switch(&mut self, value: String, sent_at: i64) {
        self.history.push_front(ExecutedCommand {
            id_module: None,
            feature_identifier: None,
            sent_at,
            status: InvocationStatus::Successful,
            value,
            description: "Command executed successfully".to_string(),
        });
        self.trim_history();
    }

    /// Fires the timeout for one invocation. Returns whether the record was
    /// still pending and actually transitioned; a result that already
    /// resolved it makes this a no-op.
    pub fn handle_timeout(&mut self, key: &InvocationKey) -> bool {
        if self.pending.remove(key).is_none() {
            return false;
        }
        if let Some(entry) = self.find_pending_entry(key) {
            entry.status = InvocationStatus::Error;
            entry.description = "Timed out".to_string();
        }
        true
    }

    /// Correlates an incoming result with its pending invocation. A result
    /// for an unknown key — already timed out, or never dispatched — is
    /// reported as [`ResultDisposition::Stale`] and must not resurrect any
    /// terminal record.
    pub fn handle_result(&mut self, payload: &CommandResultPayload) -> ResultDisposition {
        let key = InvocationKey {
            id_module: payload.id_module,
            feature_identifier: payload.feature_identifier.clone(),
            sent_at: payload.sent_at,
        };
        let Some(original_parameters) = self.pending.remove(&key) else {
            return ResultDisposition::Stale;
        };

        match &payload.result {
            CommandResultValue::Completed(true) => {
                if let Some(entry) = self.find_pending_entry(&key) {
                    entry.status = InvocationStatus::Successful;
                    entry.description = "Command executed successfully".to_string();
                }
                ResultDisposition::Successful
            }
            CommandResultValue::Completed(false) => {
                if let Some(entry) = self.find_pending_entry(&key) {
                    entry.status = InvocationStatus::Error;
                    entry.description = "The module reported a failure".to_string();
                }
                ResultDisposition::Failed
            }
            CommandResultValue::Ambiguous(result) => {
                if let Some(entry) = self.find_pending_entry(&key) {
                    entry.status = InvocationStatus::Ambiguous;
                    entry.description = "Waiting for a selection".to_string();
                }
                ResultDisposition::Ambiguous {
                    options: result.options.clone(),
                    // The module may echo the parameters back; fall back to
                    // the ones retained at dispatch time.
                    original_parameters: result
                        .parameters
                        .clone()
                        .or(original_parameters),
                    already_acknowledged: result.notified,
                }
            }
        }
    }

    pub fn history(&self) -> Vec<ExecutedCommand> {
        self.history.iter().cloned().collect()
    }

    fn find_pending_entry(&mut self, key: &InvocationKey) -> Option<&mut ExecutedCommand> {
        self.history.iter_mut().find(|entry| {
            entry.status == InvocationStatus::Pending
                && entry.id_module == Some(key.id_module)
                && entry.feature_identifier.as_deref() == Some(key.feature_identifier.as_str())
                && entry.sent_at == key.sent_at
        })
    }

    /// Evicts oldest entries beyond the cap, never a still-pending one.
    fn trim_history(&mut self) {
        while self.history.len() > MAX_HISTORY_LENGTH {
            let Some(index) = self
                .history
                .iter()
                .rposition(|entry| entry.status != InvocationStatus::Pending)
            else {
                break;
            };
            self.history.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sent_at: i64) -> InvocationKey {
        InvocationKey {
            id_module: 1,
            feature_identifier: "play-song".to_string(),
            sent_at,
        }
    }

    fn result_payload(sent_at: i64, result: CommandResultValue) -> CommandResultPayload {
        CommandResultPayload {
            id_module: 1,
            feature_identifier: "play-song".to_string(),
            sent_at,
            result,
        }
    }

    #[test]
    fn test_successful_result_resolves_pending_entry() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.record_dispatch(key(10), "play porta aberta".to_string(), None);

        let disposition =
            dispatcher.handle_result(&result_payload(10, CommandResultValue::Completed(true)));
        assert!(matches!(disposition, ResultDisposition::Successful));

        let history = dispatcher.history();
        assert_eq!(history[0].status, InvocationStatus::Successful);
    }

    #[test]
    fn test_explicit_failure_marks_error() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.record_dispatch(key(10), "play porta aberta".to_string(), None);

        let disposition =
            dispatcher.handle_result(&result_payload(10, CommandResultValue::Completed(false)));
        assert!(matches!(disposition, ResultDisposition::Failed));
        assert_eq!(dispatcher.history()[0].status, InvocationStatus::Error);
    }

    #[test]
    fn test_timeout_transitions_exactly_once() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.record_dispatch(key(10), "play porta aberta".to_string(), None);

        assert!(dispatcher.handle_timeout(&key(10)));
        assert_eq!(dispatcher.history()[0].status, InvocationStatus::Error);
        assert_eq!(dispatcher.history()[0].description, "Timed out");

        // Firing again is a no-op.
        assert!(!dispatcher.handle_timeout(&key(10)));
    }

    #[test]
    fn test_result_after_timeout_is_stale_and_does_not_resurrect() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.record_dispatch(key(10), "play porta aberta".to_string(), None);
        assert!(dispatcher.handle_timeout(&key(10)));

        let disposition =
            dispatcher.handle_result(&result_payload(10, CommandResultValue::Completed(true)));
        assert!(matches!(disposition, ResultDisposition::Stale));
        assert_eq!(dispatcher.history()[0].status, InvocationStatus::Error);
    }

    #[test]
    fn test_timeout_after_result_is_a_no_op() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.record_dispatch(key(10), "play porta aberta".to_string(), None);
        dispatcher.handle_result(&result_payload(10, CommandResultValue::Completed(true)));

        assert!(!dispatcher.handle_timeout(&key(10)));
        assert_eq!(dispatcher.history()[0].status, InvocationStatus::Successful);
    }

    #[test]
    fn test_result_for_unknown_key_is_stale() {
        let mut dispatcher = Dispatcher::new();
        let disposition =
            dispatcher.handle_result(&result_payload(99, CommandResultValue::Completed(true)));
        assert!(matches!(disposition, ResultDisposition::Stale));
        assert!(dispatcher.history().is_empty());
    }

    #[test]
    fn test_ambiguous_result_keeps_original_parameters() {
        let mut dispatcher = Dispatcher::new();
        let mut parameters = FeatureParameters::new();
        parameters.insert(
            "song".to_string(),
            serde_json::Value::String("porta aberta".to_string()),
        );
        dispatcher.record_dispatch(key(10), "play porta aberta".to_string(), Some(parameters));

        let ambiguous = CommandResultValue::Ambiguous(crate::events::AmbiguousResult {
            options: vec![AmbiguityOption {
                description: "Song A".to_string(),
                value: FeatureParameters::new(),
                image: None,
                secondary_info: None,
            }],
            parameters: None,
            notified: false,
        });
        match dispatcher.handle_result(&result_payload(10, ambiguous)) {
            ResultDisposition::Ambiguous {
                options,
                original_parameters,
                already_acknowledged,
            } => {
                assert_eq!(options.len(), 1);
                assert!(!already_acknowledged);
                let original = original_parameters.unwrap();
                assert_eq!(
                    original.get("song"),
                    Some(&serde_json::Value::String("porta aberta".to_string()))
                );
            }
            other => panic!("expected ambiguous disposition, got {other:?}"),
        }
        assert_eq!(dispatcher.history()[0].status, InvocationStatus::Ambiguous);
    }

    #[test]
    fn test_history_cap_evicts_oldest_resolved_entries() {
        let mut dispatcher = Dispatcher::new();
        for i in 0..(MAX_HISTORY_LENGTH as i64 + 10) {
            dispatcher.record_not_recognized(format!("utterance {i}"), i);
        }

        let history = dispatcher.history();
        assert_eq!(history.len(), MAX_HISTORY_LENGTH);
        // Newest entries survive; the oldest were evicted.
        assert_eq!(history[0].value, "utterance 73");
        assert_eq!(history.last().unwrap().value, "utterance 10");
    }

    #[test]
    fn test_eviction_never_removes_pending_entries() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.record_dispatch(key(0), "still running".to_string(), None);
        for i in 1..=(MAX_HISTORY_LENGTH as i64 + 5) {
            dispatcher.record_not_recognized(format!("utterance {i}"), i);
        }

        let history = dispatcher.history();
        assert_eq!(history.len(), MAX_HISTORY_LENGTH);
        assert!(
            history
                .iter()
                .any(|entry| entry.status == InvocationStatus::Pending)
        );
    }
}
