//! Simple recursive phrase matcher.
//!
//! Supported pattern syntax, a subset of the full command reference language:
//!
//! - plain words match case-insensitively: `next track`
//! - `[ ... ]` optional group: `[hey assistant] pause`
//! - `( a, b )` choice group, alternatives separated by commas: `(pause, stop)`
//! - groups nest: `(listen [(to, in)], switch [language] [to]) german`
//! - `{NAME}` free variable capturing one or more words as spoken
//! - `{NAME(a, b, c)}` restricted variable resolving to the index of the
//!   matched alternative
//!
//! Matching is anchored to the whole input and backtracks across optional
//! groups, choices and variable lengths.

use crate::{CompileError, CompiledGrammar, GrammarEngine, GrammarMatch};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Word(String),
    Variable {
        name: String,
    },
    Restricted {
        name: String,
        values: Vec<String>,
    },
    Optional(Vec<Segment>),
    Choice(Vec<Vec<Segment>>),
}

/// Phrase-pattern engine. Stateless; compiled grammars own their segment tree.
#[derive(Debug, Default, Clone)]
pub struct PhraseEngine;

impl PhraseEngine {
    pub fn new() -> Self {
        Self
    }
}

impl GrammarEngine for PhraseEngine {
    fn compile(&self, pattern: &str) -> Result<Box<dyn CompiledGrammar>, CompileError> {
        let grammar = PhraseGrammar::compile(pattern)?;
        Ok(Box::new(grammar))
    }
}

struct PhraseGrammar {
    segments: Vec<Segment>,
}

impl PhraseGrammar {
    fn compile(pattern: &str) -> Result<Self, CompileError> {
        if pattern.trim().is_empty() {
            return Err(CompileError::EmptyPattern);
        }

        let mut parser = Parser {
            chars: pattern.chars().collect(),
            position: 0,
            pattern,
        };
        let segments = parser.parse_sequence(&[])?;
        if segments.is_empty() {
            return Err(CompileError::EmptyPattern);
        }

        Ok(Self { segments })
    }
}

impl CompiledGrammar for PhraseGrammar {
    fn match_text(&self, text: &str) -> GrammarMatch {
        let original: Vec<&str> = text.split_whitespace().collect();
        let lowered: Vec<String> = original.iter().map(|w| w.to_lowercase()).collect();

        let stack: Vec<&Segment> = self.segments.iter().collect();
        let mut state = MatchState::default();

        if try_match(&stack, 0, &original, &lowered, &mut state) {
            GrammarMatch {
                matched: true,
                variables: state.variables.into_iter().collect(),
                restricted_variable_indexes: state.restricted.into_iter().collect(),
            }
        } else {
            GrammarMatch::no_match()
        }
    }

    fn all_possibilities(&self) -> Vec<String> {
        expand_sequence(&self.segments)
    }
}

#[derive(Default)]
struct MatchState {
    variables: Vec<(String, String)>,
    restricted: Vec<(String, usize)>,
}

fn try_match(
    stack: &[&Segment],
    position: usize,
    original: &[&str],
    lowered: &[String],
    state: &mut MatchState,
) -> bool {
    let Some((segment, rest)) = stack.split_first() else {
        return position == lowered.len();
    };

    match segment {
        Segment::Word(word) => {
            position < lowered.len()
                && lowered[position] == *word
                && try_match(rest, position + 1, original, lowered, state)
        }
        Segment::Optional(inner) => {
            let mut expanded: Vec<&Segment> = inner.iter().collect();
            expanded.extend_from_slice(rest);
            try_match(&expanded, position, original, lowered, state)
                || try_match(rest, position, original, lowered, state)
        }
        Segment::Choice(alternatives) => alternatives.iter().any(|alternative| {
            let mut expanded: Vec<&Segment> = alternative.iter().collect();
            expanded.extend_from_slice(rest);
            try_match(&expanded, position, original, lowered, state)
        }),
        Segment::Variable { name } => {
            // Greedy: prefer the longest capture that still lets the rest of
            // the pattern match.
            for length in (1..=lowered.len().saturating_sub(position)).rev() {
                let captured = original[position..position + length].join(" ");
                state.variables.push((name.clone(), captured));
                if try_match(rest, position + length, original, lowered, state) {
                    return true;
                }
                state.variables.pop();
            }
            false
        }
        Segment::Restricted { name, values } => {
            for (index, value) in values.iter().enumerate() {
                let value_words: Vec<&str> = value.split_whitespace().collect();
                if value_words.is_empty() || position + value_words.len() > lowered.len() {
                    continue;
                }
                let matches_value = value_words
                    .iter()
                    .enumerate()
                    .all(|(offset, word)| lowered[position + offset] == *word);
                if !matches_value {
                    continue;
                }

                state.restricted.push((name.clone(), index));
                if try_match(rest, position + value_words.len(), original, lowered, state) {
                    return true;
                }
                state.restricted.pop();
            }
            false
        }
    }
}

fn expand_sequence(segments: &[Segment]) -> Vec<String> {
    let mut phrases = vec![String::new()];
    for segment in segments {
        let parts = expand_segment(segment);
        let mut next = Vec::with_capacity(phrases.len() * parts.len());
        for phrase in &phrases {
            for part in &parts {
                if part.is_empty() {
                    next.push(phrase.clone());
                } else if phrase.is_empty() {
                    next.push(part.clone());
                } else {
                    next.push(format!("{phrase} {part}"));
                }
            }
        }
        phrases = next;
    }
    phrases
}

fn expand_segment(segment: &Segment) -> Vec<String> {
    match segment {
        Segment::Word(word) => vec![word.clone()],
        Segment::Variable { name } => vec![format!("{{{name}}}")],
        Segment::Restricted { values, .. } => values.clone(),
        Segment::Optional(inner) => {
            let mut expansions = expand_sequence(inner);
            expansions.push(String::new());
            expansions
        }
        Segment::Choice(alternatives) => alternatives
            .iter()
            .flat_map(|alternative| expand_sequence(alternative))
            .collect(),
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    position: usize,
    pattern: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn unbalanced(&self, delimiter: char) -> CompileError {
        CompileError::Unbalanced {
            delimiter,
            pattern: self.pattern.to_string(),
        }
    }

    fn parse_sequence(&mut self, terminators: &[char]) -> Result<Vec<Segment>, CompileError> {
        let mut segments = Vec::new();

        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else {
                break;
            };
            if terminators.contains(&c) {
                break;
            }

            match c {
                '[' => {
                    self.bump();
                    let inner = self.parse_sequence(&[']'])?;
                    if self.bump() != Some(']') {
                        return Err(self.unbalanced(']'));
                    }
                    if inner.is_empty() {
                        return Err(CompileError::EmptyGroup {
                            pattern: self.pattern.to_string(),
                        });
                    }
                    segments.push(Segment::Optional(inner));
                }
                '(' => {
                    self.bump();
                    let alternatives = self.parse_alternatives()?;
                    segments.push(Segment::Choice(alternatives));
                }
                '{' => {
                    self.bump();
                    segments.push(self.parse_variable()?);
                }
                ']' | ')' | '}' => return Err(self.unbalanced(c)),
                ',' => {
                    // Commas are only separators inside choice groups.
                    return Err(CompileError::UnexpectedToken {
                        token: c,
                        pattern: self.pattern.to_string(),
                    });
                }
                _ => segments.push(Segment::Word(self.parse_word())),
            }
        }

        Ok(segments)
    }

    fn parse_alternatives(&mut self) -> Result<Vec<Vec<Segment>>, CompileError> {
        let mut alternatives = Vec::new();

        loop {
            let alternative = self.parse_sequence(&[',', ')'])?;
            if alternative.is_empty() {
                return Err(CompileError::EmptyGroup {
                    pattern: self.pattern.to_string(),
                });
            }
            alternatives.push(alternative);

            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                _ => return Err(self.unbalanced(')')),
            }
        }

        Ok(alternatives)
    }

    fn parse_variable(&mut self) -> Result<Segment, CompileError> {
        let mut name = String::new();
        loop {
            match self.peek() {
                Some('}') | Some('(') => break,
                Some(c) => {
                    name.push(c);
                    self.bump();
                }
                None => return Err(self.unbalanced('}')),
            }
        }

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(CompileError::EmptyVariableName {
                pattern: self.pattern.to_string(),
            });
        }

        if self.peek() == Some('(') {
            self.bump();
            let mut raw = String::new();
            loop {
                match self.bump() {
                    Some(')') => break,
                    Some(c) => raw.push(c),
                    None => return Err(self.unbalanced(')')),
                }
            }
            let values: Vec<String> = raw
                .split(',')
                .map(|value| value.trim().to_lowercase())
                .collect();
            if values.iter().any(String::is_empty) {
                return Err(CompileError::EmptyVariableValues {
                    name,
                    pattern: self.pattern.to_string(),
                });
            }
            if self.bump() != Some('}') {
                return Err(self.unbalanced('}'));
            }
            return Ok(Segment::Restricted { name, values });
        }

        if self.bump() != Some('}') {
            return Err(self.unbalanced('}'));
        }
        Ok(Segment::Variable { name })
    }

    fn parse_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | ',') {
                break;
            }
            word.push(c);
            self.bump();
        }
        word.to_lowercase()
    }
}
