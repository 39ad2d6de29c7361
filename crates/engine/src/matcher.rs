//! First-match lookup across a registry snapshot.

use grammar::GrammarMatch;

use crate::definitions::{CommandDefinition, LanguageCode};
use crate::registry::RegistrySnapshot;

/// What an utterance resolved to against a snapshot.
#[derive(Debug)]
pub enum UtteranceMatch<'a> {
    Module {
        id_module: i64,
        command: &'a CommandDefinition,
        result: GrammarMatch,
    },
    LanguageSwitch {
        target_language: LanguageCode,
    },
    NotRecognized,
}

/// Tries every module command grammar in registration order, then every
/// language-switch grammar, and takes the first match. Module commands
/// deliberately shadow language switching when both could match, and the
/// first-match policy is the contract: later grammars never outrank earlier
/// ones, however specific they are.
///
/// Pure with respect to the snapshot; safe to call repeatedly and
/// concurrently against the same snapshot.
pub fn match_utterance<'a>(snapshot: &'a RegistrySnapshot, text: &str) -> UtteranceMatch<'a> {
    for entry in snapshot.module_entries() {
        let result = entry.grammar.match_text(text);
        if result.matched {
            return UtteranceMatch::Module {
                id_module: entry.id_module,
                command: &entry.command,
                result,
            };
        }
    }

    for entry in snapshot.language_entries() {
        if entry.grammar.match_text(text).matched {
            return UtteranceMatch::LanguageSwitch {
                target_language: entry.target_language,
            };
        }
    }

    UtteranceMatch::NotRecognized
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use grammar::PhraseEngine;

    use super::*;
    use crate::definitions::{
        LanguageCommandSet, LanguageSwitchCommand, ModuleCommandSet, UserModuleDefinition,
    };

    fn command(pattern: &str, feature: &str) -> CommandDefinition {
        CommandDefinition {
            pattern: pattern.to_string(),
            feature_identifier: feature.to_string(),
            parameters: Vec::new(),
            is_active: true,
        }
    }

    fn module(id_module: i64, commands: Vec<CommandDefinition>) -> UserModuleDefinition {
        UserModuleDefinition {
            id_module,
            name: format!("module {id_module}"),
            is_active: true,
            command_sets: vec![ModuleCommandSet {
                language: LanguageCode::EnUs,
                prefix: None,
                is_prefix_mandated: false,
                commands,
            }],
            features: Vec::new(),
        }
    }

    fn switch_to_portuguese(pattern: &str) -> LanguageCommandSet {
        LanguageCommandSet {
            languages_to_listen: vec![LanguageCode::EnUs, LanguageCode::PtBr],
            commands: HashMap::from([(
                LanguageCode::EnUs,
                vec![LanguageSwitchCommand {
                    target_language: LanguageCode::PtBr,
                    pattern: pattern.to_string(),
                    is_active: true,
                }],
            )]),
        }
    }

    #[test]
    fn test_module_command_takes_precedence_over_language_switch() {
        let engine = PhraseEngine::new();
        let modules = vec![module(7, vec![command("listen {TARGET}", "listen")])];
        let language_commands = switch_to_portuguese("listen portuguese");
        let snapshot = RegistrySnapshot::build(&engine, &modules, Some(&language_commands));

        match match_utterance(&snapshot, "listen portuguese") {
            UtteranceMatch::Module { id_module, .. } => assert_eq!(id_module, 7),
            other => panic!("expected module match, got {other:?}"),
        }
    }

    #[test]
    fn test_first_matching_grammar_wins() {
        let engine = PhraseEngine::new();
        let modules = vec![
            module(1, vec![command("play {SONG}", "play-first")]),
            module(2, vec![command("play {SONG}", "play-second")]),
        ];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        match match_utterance(&snapshot, "play porta aberta") {
            UtteranceMatch::Module {
                id_module, command, ..
            } => {
                assert_eq!(id_module, 1);
                assert_eq!(command.feature_identifier, "play-first");
            }
            other => panic!("expected module match, got {other:?}"),
        }
    }

    #[test]
    fn test_language_switch_match() {
        let engine = PhraseEngine::new();
        let snapshot =
            RegistrySnapshot::build(&engine, &[], Some(&switch_to_portuguese("ouvir portugues")));

        match match_utterance(&snapshot, "ouvir portugues") {
            UtteranceMatch::LanguageSwitch { target_language } => {
                assert_eq!(target_language, LanguageCode::PtBr);
            }
            other => panic!("expected language switch, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_text_is_not_recognized() {
        let engine = PhraseEngine::new();
        let modules = vec![module(1, vec![command("pause", "pause")])];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        assert!(matches!(
            match_utterance(&snapshot, "microphone test"),
            UtteranceMatch::NotRecognized
        ));
    }

    #[test]
    fn test_matching_is_deterministic_for_a_snapshot() {
        let engine = PhraseEngine::new();
        let modules = vec![module(1, vec![command("play {SONG}", "play-song")])];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        for _ in 0..3 {
            match match_utterance(&snapshot, "play Porta Aberta") {
                UtteranceMatch::Module { result, .. } => {
                    assert_eq!(
                        result.variables.get("SONG").map(String::as_str),
                        Some("Porta Aberta")
                    );
                }
                other => panic!("expected module match, got {other:?}"),
            }
        }
    }
}
