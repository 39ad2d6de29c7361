//! Phrase-grammar capability consumed by the command engine.
//!
//! The engine treats grammar compilation and matching as an opaque
//! collaborator behind the [`GrammarEngine`] trait: compile a phrase pattern
//! once, then run many match attempts against the compiled form. The
//! [`phrase`] module ships a deliberately simple recursive matcher that
//! implements the trait; a heavier automaton-based engine can be swapped in
//! without touching the engine crate.

use std::collections::HashMap;

use thiserror::Error;

pub mod phrase;

pub use phrase::PhraseEngine;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unbalanced '{delimiter}' in pattern \"{pattern}\"")]
    Unbalanced { delimiter: char, pattern: String },
    #[error("empty group in pattern \"{pattern}\"")]
    EmptyGroup { pattern: String },
    #[error("variable with no name in pattern \"{pattern}\"")]
    EmptyVariableName { pattern: String },
    #[error("restricted variable \"{name}\" has no values in pattern \"{pattern}\"")]
    EmptyVariableValues { name: String, pattern: String },
    #[error("unexpected '{token}' in pattern \"{pattern}\"")]
    UnexpectedToken { token: char, pattern: String },
    #[error("pattern is empty")]
    EmptyPattern,
}

/// Outcome of one match attempt. Produced fresh per attempt, never retained.
#[derive(Debug, Clone, Default)]
pub struct GrammarMatch {
    pub matched: bool,
    /// Free variables bound to the words they captured, as spoken.
    pub variables: HashMap<String, String>,
    /// Restricted variables bound to the index of the alternative they
    /// resolved to, in pattern declaration order.
    pub restricted_variable_indexes: HashMap<String, usize>,
}

impl GrammarMatch {
    pub fn no_match() -> Self {
        Self::default()
    }
}

/// A compiled, immutable phrase grammar, reusable across match attempts.
pub trait CompiledGrammar: Send + Sync {
    fn match_text(&self, text: &str) -> GrammarMatch;

    /// Every concrete phrasing the grammar accepts, with free variables
    /// rendered as `{NAME}` placeholders. Editor tooling only.
    fn all_possibilities(&self) -> Vec<String>;
}

/// Compiles phrase patterns into reusable grammars.
pub trait GrammarEngine: Send + Sync {
    fn compile(&self, pattern: &str) -> Result<Box<dyn CompiledGrammar>, CompileError>;
}
