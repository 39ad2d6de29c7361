//! Per-user session actor.
//!
//! All registry rebuilds, matches, binds, dispatches and correlations for one
//! user run on one cooperative timeline: a single tokio task draining an mpsc
//! mailbox. Timers (dispatch timeouts, the rebuild debounce) are detached
//! sleeps that post back into the mailbox, so every mutation still happens
//! inside the actor and runs to completion before the next message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use grammar::GrammarEngine;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use utils::time::MonotonicMillis;

use crate::ambiguity::{AmbiguityRecord, AmbiguityResolver};
use crate::binder::{build_parameters, merge_ambiguity_parameters};
use crate::definitions::{FeatureParameters, LanguageCommandSet, UserModuleDefinition};
use crate::dispatcher::{
    DISPATCH_TIMEOUT, Dispatcher, ExecutedCommand, InvocationKey, ResultDisposition,
};
use crate::events::{CommandPayload, CommandResultPayload, ModuleConnectionPayload, SessionEvent};
use crate::matcher::{UtteranceMatch, match_utterance};
use crate::registry::RegistrySnapshot;

/// Debounce applied between definition-change notifications and the registry
/// recompile, so a burst of edits costs one rebuild.
pub const REBUILD_DEBOUNCE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub dispatch_timeout: Duration,
    pub rebuild_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: DISPATCH_TIMEOUT,
            rebuild_debounce: REBUILD_DEBOUNCE,
        }
    }
}

/// Mailbox of the session actor.
pub enum SessionMessage {
    /// Free-text input from speech recognition or the command box.
    Utterance { text: String },
    /// `COMMAND_RESULT` received from a module.
    ModuleResult(CommandResultPayload),
    /// A module channel attached; commands for it go through `sender`.
    ModuleConnected {
        id_module: i64,
        sender: mpsc::UnboundedSender<CommandPayload>,
    },
    ModuleDisconnected { id_module: i64 },
    /// The user's definitions changed; rebuild after the debounce window.
    DefinitionsChanged {
        modules: Vec<UserModuleDefinition>,
        language_commands: Option<LanguageCommandSet>,
    },
    /// Internal: debounce window elapsed for the given generation.
    RebuildNow { generation: u64 },
    /// Internal: dispatch timeout elapsed for the given invocation.
    InvocationTimeout { key: InvocationKey },
    /// The user picked one option of the module's presented ambiguity.
    SelectAmbiguityOption { id_module: i64, option_index: usize },
    /// The user dismissed the ambiguity without selecting.
    DismissAmbiguity { id_module: i64 },
    /// The user viewed the options; lower the notification, keep the slot.
    AcknowledgeAmbiguity { id_module: i64 },
    GetHistory {
        reply: oneshot::Sender<Vec<ExecutedCommand>>,
    },
    GetAmbiguity {
        id_module: i64,
        reply: oneshot::Sender<Option<AmbiguityRecord>>,
    },
}

/// Cheap handle for talking to a session actor.
#[derive(Clone)]
pub struct SessionHandle {
    id_user: i64,
    tx: mpsc::UnboundedSender<SessionMessage>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn id_user(&self) -> i64 {
        self.id_user
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn send(&self, message: SessionMessage) {
        if self.tx.send(message).is_err() {
            warn!(id_user = self.id_user, "session actor is gone; message dropped");
        }
    }

    pub async fn history(&self) -> Vec<ExecutedCommand> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::GetHistory { reply });
        rx.await.unwrap_or_default()
    }

    pub async fn ambiguity(&self, id_module: i64) -> Option<AmbiguityRecord> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionMessage::GetAmbiguity { id_module, reply });
        rx.await.ok().flatten()
    }
}

/// Spawns the actor for one user and returns its handle. The initial registry
/// is built synchronously from the given definitions; later changes go
/// through [`SessionMessage::DefinitionsChanged`] and are debounced.
pub fn spawn_session(
    id_user: i64,
    engine: Arc<dyn GrammarEngine>,
    modules: Vec<UserModuleDefinition>,
    language_commands: Option<LanguageCommandSet>,
    config: SessionConfig,
) -> SessionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(256);

    let snapshot = Arc::new(RegistrySnapshot::build(
        engine.as_ref(),
        &modules,
        language_commands.as_ref(),
    ));
    info!(
        id_user,
        module_commands = snapshot.module_entries().len(),
        language_commands = snapshot.language_entries().len(),
        "session started"
    );

    let actor = SessionActor {
        id_user,
        engine,
        config,
        modules,
        language_commands,
        snapshot,
        dispatcher: Dispatcher::new(),
        ambiguity: AmbiguityResolver::new(),
        clock: MonotonicMillis::new(),
        module_senders: HashMap::new(),
        rebuild_generation: 0,
        events: events.clone(),
        self_tx: tx.clone(),
    };
    tokio::spawn(actor.run(rx));

    SessionHandle { id_user, tx, events }
}

struct SessionActor {
    id_user: i64,
    engine: Arc<dyn GrammarEngine>,
    config: SessionConfig,
    modules: Vec<UserModuleDefinition>,
    language_commands: Option<LanguageCommandSet>,
    snapshot: Arc<RegistrySnapshot>,
    dispatcher: Dispatcher,
    ambiguity: AmbiguityResolver,
    clock: MonotonicMillis,
    module_senders: HashMap<i64, mpsc::UnboundedSender<CommandPayload>>,
    rebuild_generation: u64,
    events: broadcast::Sender<SessionEvent>,
    self_tx: mpsc::UnboundedSender<SessionMessage>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMessage>) {
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        debug!(id_user = self.id_user, "session mailbox closed");
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Utterance { text } => self.handle_utterance(text),
            SessionMessage::ModuleResult(payload) => self.handle_module_result(payload),
            SessionMessage::ModuleConnected { id_module, sender } => {
                self.module_senders.insert(id_module, sender);
                self.emit(SessionEvent::ModuleConnection(ModuleConnectionPayload {
                    id_module,
                    is_connected: true,
                }));
            }
            SessionMessage::ModuleDisconnected { id_module } => {
                self.module_senders.remove(&id_module);
                self.emit(SessionEvent::ModuleConnection(ModuleConnectionPayload {
                    id_module,
                    is_connected: false,
                }));
            }
            SessionMessage::DefinitionsChanged {
                modules,
                language_commands,
            } => {
                self.modules = modules;
                self.language_commands = language_commands;
                self.rebuild_generation += 1;
                let generation = self.rebuild_generation;
                let debounce = self.config.rebuild_debounce;
                let tx = self.self_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(debounce).await;
                    let _ = tx.send(SessionMessage::RebuildNow { generation });
                });
            }
            SessionMessage::RebuildNow { generation } => {
                // A newer edit superseded this debounce window.
                if generation != self.rebuild_generation {
                    return;
                }
                self.snapshot = Arc::new(RegistrySnapshot::build(
                    self.engine.as_ref(),
                    &self.modules,
                    self.language_commands.as_ref(),
                ));
                info!(
                    id_user = self.id_user,
                    module_commands = self.snapshot.module_entries().len(),
                    language_commands = self.snapshot.language_entries().len(),
                    "command registry rebuilt"
                );
                self.emit(SessionEvent::RegistryRebuilt {
                    module_commands: self.snapshot.module_entries().len(),
                    language_commands: self.snapshot.language_entries().len(),
                });
            }
            SessionMessage::InvocationTimeout { key } => {
                if self.dispatcher.handle_timeout(&key) {
                    debug!(
                        id_user = self.id_user,
                        id_module = key.id_module,
                        feature = %key.feature_identifier,
                        "invocation timed out"
                    );
                    self.emit_history();
                }
            }
            SessionMessage::SelectAmbiguityOption {
                id_module,
                option_index,
            } => self.handle_ambiguity_selection(id_module, option_index),
            SessionMessage::DismissAmbiguity { id_module } => {
                if self.ambiguity.clear(id_module) {
                    self.emit_ambiguity_cleared(id_module);
                }
            }
            SessionMessage::AcknowledgeAmbiguity { id_module } => {
                if self.ambiguity.acknowledge(id_module) {
                    self.emit(SessionEvent::AmbiguityNotification {
                        id_module,
                        pending: false,
                    });
                }
            }
            SessionMessage::GetHistory { reply } => {
                let _ = reply.send(self.dispatcher.history());
            }
            SessionMessage::GetAmbiguity { id_module, reply } => {
                let _ = reply.send(self.ambiguity.slot(id_module).cloned());
            }
        }
    }

    fn handle_utterance(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        let snapshot = Arc::clone(&self.snapshot);
        match match_utterance(&snapshot, &text) {
            UtteranceMatch::Module {
                id_module,
                command,
                result,
            } => {
                let features = self
                    .modules
                    .iter()
                    .find(|module| module.id_module == id_module)
                    .map(|module| module.features.as_slice())
                    .unwrap_or_default();
                let parameters = build_parameters(&result, command, features);
                let feature_identifier = command.feature_identifier.clone();
                self.dispatch(id_module, feature_identifier, text, parameters);
            }
            UtteranceMatch::LanguageSwitch { target_language } => {
                let sent_at = self.clock.now_ms();
                self.dispatcher.record_language_switch(text, sent_at);
                self.emit(SessionEvent::LanguageChanged {
                    language: target_language,
                });
                self.emit_history();
            }
            UtteranceMatch::NotRecognized => {
                let sent_at = self.clock.now_ms();
                self.dispatcher.record_not_recognized(text, sent_at);
                self.emit_history();
            }
        }
    }

    /// Sends one invocation to its module, records it as pending and arms its
    /// timeout.
    fn dispatch(
        &mut self,
        id_module: i64,
        feature_identifier: String,
        value: String,
        parameters: Option<FeatureParameters>,
    ) {
        let sent_at = self.clock.now_ms();
        let key = InvocationKey {
            id_module,
            feature_identifier: feature_identifier.clone(),
            sent_at,
        };
        let payload = CommandPayload {
            id_module,
            feature_identifier,
            parameters: parameters.clone(),
            sent_at,
        };

        self.dispatcher.record_dispatch(key.clone(), value, parameters);
        self.send_to_module(payload);
        self.arm_timeout(key);
        self.emit_history();
    }

    fn handle_module_result(&mut self, payload: CommandResultPayload) {
        let id_module = payload.id_module;
        match self.dispatcher.handle_result(&payload) {
            ResultDisposition::Stale => {
                debug!(
                    id_user = self.id_user,
                    id_module,
                    feature = %payload.feature_identifier,
                    sent_at = payload.sent_at,
                    "discarding stale command result"
                );
            }
            ResultDisposition::Successful | ResultDisposition::Failed => {
                if self.ambiguity.clear(id_module) {
                    self.emit_ambiguity_cleared(id_module);
                }
                self.emit_history();
            }
            ResultDisposition::Ambiguous {
                options,
                original_parameters,
                already_acknowledged,
            } => {
                let record = AmbiguityRecord {
                    id_module,
                    feature_identifier: payload.feature_identifier.clone(),
                    sent_at: payload.sent_at,
                    options,
                    original_parameters,
                };
                self.ambiguity.notify(record.clone(), already_acknowledged);
                self.emit(SessionEvent::AmbiguityUpdated {
                    id_module,
                    record: Some(record),
                });
                self.emit(SessionEvent::AmbiguityNotification {
                    id_module,
                    pending: !already_acknowledged,
                });
                self.emit_history();
            }
        }
    }

    fn handle_ambiguity_selection(&mut self, id_module: i64, option_index: usize) {
        let Some(record) = self.ambiguity.slot(id_module).cloned() else {
            warn!(id_user = self.id_user, id_module, "no ambiguity to resolve");
            return;
        };
        let Some(option) = record.options.get(option_index).cloned() else {
            warn!(
                id_user = self.id_user,
                id_module, option_index, "ambiguity option index out of range"
            );
            return;
        };

        // Selecting any option counts as handled: clear before the follow-up
        // dispatch resolves, whatever its outcome.
        self.ambiguity.clear(id_module);
        self.emit_ambiguity_cleared(id_module);

        let merged =
            merge_ambiguity_parameters(&option.value, record.original_parameters.as_ref());
        self.dispatch(
            id_module,
            record.feature_identifier.clone(),
            option.description.clone(),
            Some(merged),
        );
    }

    fn send_to_module(&mut self, payload: CommandPayload) {
        let id_module = payload.id_module;
        match self.module_senders.get(&id_module) {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    self.module_senders.remove(&id_module);
                    debug!(id_user = self.id_user, id_module, "module channel closed");
                }
            }
            None => {
                // The pending record times out on its own; nothing to cancel.
                debug!(id_user = self.id_user, id_module, "module not connected");
            }
        }
    }

    fn arm_timeout(&self, key: InvocationKey) {
        let tx = self.self_tx.clone();
        let timeout = self.config.dispatch_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(SessionMessage::InvocationTimeout { key });
        });
    }

    fn emit_ambiguity_cleared(&self, id_module: i64) {
        self.emit(SessionEvent::AmbiguityUpdated {
            id_module,
            record: None,
        });
        self.emit(SessionEvent::AmbiguityNotification {
            id_module,
            pending: false,
        });
    }

    fn emit_history(&self) {
        self.emit(SessionEvent::CommandHistory {
            commands: self.dispatcher.history(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; the history is queryable on (re)connect.
        let _ = self.events.send(event);
    }
}
