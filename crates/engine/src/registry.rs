//! Compiled-grammar index for one user session.
//!
//! A snapshot is built from the user's definitions, shared behind an `Arc`,
//! and replaced wholesale on rebuild. Matchers in flight keep whatever
//! snapshot they started with; nothing is ever mutated in place.

use grammar::{CompiledGrammar, GrammarEngine};
use tracing::warn;

use crate::definitions::{
    CommandDefinition, LanguageCode, LanguageCommandSet, ModuleCommandSet, UserModuleDefinition,
};

pub struct ModuleGrammarEntry {
    pub id_module: i64,
    pub command: CommandDefinition,
    pub grammar: Box<dyn CompiledGrammar>,
}

pub struct LanguageGrammarEntry {
    pub target_language: LanguageCode,
    pub grammar: Box<dyn CompiledGrammar>,
}

/// Immutable index of every grammar currently eligible for matching,
/// in match priority order.
#[derive(Default)]
pub struct RegistrySnapshot {
    module_entries: Vec<ModuleGrammarEntry>,
    language_entries: Vec<LanguageGrammarEntry>,
}

impl RegistrySnapshot {
    /// Compiles every active command of every active module, in registration
    /// order, followed by the active language-switch commands. Patterns that
    /// fail to compile are logged and skipped; a rebuild never aborts.
    pub fn build(
        engine: &dyn GrammarEngine,
        modules: &[UserModuleDefinition],
        language_commands: Option<&LanguageCommandSet>,
    ) -> Self {
        let mut module_entries = Vec::new();
        for module in modules {
            if !module.is_active {
                continue;
            }
            for command_set in &module.command_sets {
                for command in &command_set.commands {
                    if !command.is_active {
                        continue;
                    }
                    let composed = compose_pattern(command_set, command);
                    match engine.compile(&composed) {
                        Ok(grammar) => module_entries.push(ModuleGrammarEntry {
                            id_module: module.id_module,
                            command: command.clone(),
                            grammar,
                        }),
                        Err(error) => {
                            warn!(pattern = %composed, %error, "skipping command that failed to compile");
                        }
                    }
                }
            }
        }

        let mut language_entries = Vec::new();
        if let Some(language_commands) = language_commands {
            for spoken_language in &language_commands.languages_to_listen {
                let commands = language_commands
                    .commands
                    .get(spoken_language)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for switch in commands {
                    // A target the user no longer listens to is excluded even
                    // while the command entry itself stays active.
                    if !switch.is_active
                        || !language_commands
                            .languages_to_listen
                            .contains(&switch.target_language)
                    {
                        continue;
                    }
                    match engine.compile(switch.pattern.trim()) {
                        Ok(grammar) => language_entries.push(LanguageGrammarEntry {
                            target_language: switch.target_language,
                            grammar,
                        }),
                        Err(error) => {
                            warn!(pattern = %switch.pattern, %error, "skipping language-switch command that failed to compile");
                        }
                    }
                }
            }
        }

        Self {
            module_entries,
            language_entries,
        }
    }

    pub fn module_entries(&self) -> &[ModuleGrammarEntry] {
        &self.module_entries
    }

    pub fn language_entries(&self) -> &[LanguageGrammarEntry] {
        &self.language_entries
    }
}

/// Composes the text actually compiled for a command: the set's prefix,
/// wrapped as an optional group unless mandated, followed by the pattern.
fn compose_pattern(command_set: &ModuleCommandSet, command: &CommandDefinition) -> String {
    let prefix = command_set
        .prefix
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    let prefix = if prefix.is_empty() {
        String::new()
    } else if command_set.is_prefix_mandated {
        prefix.to_string()
    } else {
        format!("[{prefix}]")
    };

    format!("{prefix} {}", command.pattern).trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use grammar::PhraseEngine;

    use super::*;
    use crate::definitions::LanguageSwitchCommand;

    fn command(pattern: &str, feature: &str, is_active: bool) -> CommandDefinition {
        CommandDefinition {
            pattern: pattern.to_string(),
            feature_identifier: feature.to_string(),
            parameters: Vec::new(),
            is_active,
        }
    }

    fn module(
        id_module: i64,
        is_active: bool,
        prefix: Option<&str>,
        is_prefix_mandated: bool,
        commands: Vec<CommandDefinition>,
    ) -> UserModuleDefinition {
        UserModuleDefinition {
            id_module,
            name: format!("module {id_module}"),
            is_active,
            command_sets: vec![ModuleCommandSet {
                language: LanguageCode::EnUs,
                prefix: prefix.map(str::to_string),
                is_prefix_mandated,
                commands,
            }],
            features: Vec::new(),
        }
    }

    #[test]
    fn test_inactive_modules_and_commands_are_excluded() {
        let engine = PhraseEngine::new();
        let modules = vec![
            module(1, true, None, false, vec![
                command("pause", "pause", true),
                command("resume", "resume", false),
            ]),
            module(2, false, None, false, vec![command("stop", "stop", true)]),
        ];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        assert_eq!(snapshot.module_entries().len(), 1);
        assert_eq!(snapshot.module_entries()[0].command.pattern, "pause");
    }

    #[test]
    fn test_optional_prefix_accepts_both_forms() {
        let engine = PhraseEngine::new();
        let modules = vec![module(
            1,
            true,
            Some("hey assistant"),
            false,
            vec![command("play {SONG}", "play-song", true)],
        )];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        let grammar = &snapshot.module_entries()[0].grammar;
        assert!(grammar.match_text("play bohemian rhapsody").matched);
        assert!(grammar.match_text("hey assistant play bohemian rhapsody").matched);
    }

    #[test]
    fn test_mandated_prefix_rejects_bare_form() {
        let engine = PhraseEngine::new();
        let modules = vec![module(
            1,
            true,
            Some("hey assistant"),
            true,
            vec![command("play {SONG}", "play-song", true)],
        )];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        let grammar = &snapshot.module_entries()[0].grammar;
        assert!(!grammar.match_text("play bohemian rhapsody").matched);
        assert!(grammar.match_text("hey assistant play bohemian rhapsody").matched);
    }

    #[test]
    fn test_invalid_pattern_is_skipped_not_fatal() {
        let engine = PhraseEngine::new();
        let modules = vec![module(1, true, None, false, vec![
            command("[broken", "broken", true),
            command("pause", "pause", true),
        ])];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        assert_eq!(snapshot.module_entries().len(), 1);
        assert_eq!(snapshot.module_entries()[0].command.pattern, "pause");
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let engine = PhraseEngine::new();
        let modules = vec![
            module(2, true, None, false, vec![command("pause", "pause-2", true)]),
            module(1, true, None, false, vec![command("pause", "pause-1", true)]),
        ];
        let snapshot = RegistrySnapshot::build(&engine, &modules, None);

        assert_eq!(snapshot.module_entries()[0].id_module, 2);
        assert_eq!(snapshot.module_entries()[1].id_module, 1);
    }

    #[test]
    fn test_language_switch_requires_listened_target() {
        let engine = PhraseEngine::new();
        let language_commands = LanguageCommandSet {
            languages_to_listen: vec![LanguageCode::EnUs, LanguageCode::PtBr],
            commands: HashMap::from([(
                LanguageCode::EnUs,
                vec![
                    LanguageSwitchCommand {
                        target_language: LanguageCode::PtBr,
                        pattern: "listen [in] brazilian portuguese".to_string(),
                        is_active: true,
                    },
                    // Active entry, but the target is no longer listened to.
                    LanguageSwitchCommand {
                        target_language: LanguageCode::FrFr,
                        pattern: "listen [in] french".to_string(),
                        is_active: true,
                    },
                    LanguageSwitchCommand {
                        target_language: LanguageCode::EnUs,
                        pattern: "listen [in] english".to_string(),
                        is_active: false,
                    },
                ],
            )]),
        };
        let snapshot = RegistrySnapshot::build(&engine, &[], Some(&language_commands));

        assert_eq!(snapshot.language_entries().len(), 1);
        assert_eq!(
            snapshot.language_entries()[0].target_language,
            LanguageCode::PtBr
        );
    }
}
