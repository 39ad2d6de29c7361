//! Binds matched grammar variables into feature-typed parameter values.

use grammar::GrammarMatch;
use serde_json::Value;

use crate::definitions::{
    CommandDefinition, FeatureDefinition, FeatureParameters, ParameterBindingKind,
};

/// Builds the parameter object a module feature expects from a match result.
///
/// The feature's declared parameters drive the loop, so command bindings that
/// reference an identifier the feature no longer declares are silently
/// ignored. Returns `None` when the feature is unknown or declares no
/// parameters at all.
pub fn build_parameters(
    result: &GrammarMatch,
    command: &CommandDefinition,
    features: &[FeatureDefinition],
) -> Option<FeatureParameters> {
    let feature = features
        .iter()
        .find(|feature| feature.identifier == command.feature_identifier)?;
    if feature.parameters.is_empty() {
        return None;
    }

    let mut parameters = FeatureParameters::new();
    for spec in &feature.parameters {
        let Some(binding) = command
            .parameters
            .iter()
            .find(|binding| binding.identifier == spec.identifier)
        else {
            continue;
        };

        match binding.kind {
            ParameterBindingKind::Undefined => continue,
            ParameterBindingKind::Constant => {
                if let Some(value) = &binding.value {
                    parameters.insert(spec.identifier.clone(), Value::String(value.clone()));
                }
            }
            ParameterBindingKind::Variable => {
                let Some(name) = &binding.variable_name else {
                    continue;
                };
                // A stale binding after a pattern edit may name a variable
                // the grammar no longer binds; the parameter is omitted.
                if let Some(value) = result.variables.get(name) {
                    parameters.insert(spec.identifier.clone(), Value::String(value.clone()));
                }
            }
            ParameterBindingKind::RestrictedVariable => {
                let (Some(name), Some(values)) =
                    (&binding.variable_name, &binding.variable_values)
                else {
                    continue;
                };
                let Some(index) = result.restricted_variable_indexes.get(name) else {
                    continue;
                };
                if let Some(value) = values.get(*index) {
                    parameters.insert(spec.identifier.clone(), Value::String(value.clone()));
                }
            }
        }
    }

    Some(parameters)
}

/// Overlays a selected ambiguity option's values onto the original dispatch
/// parameters; selected values win on key collision. Both inputs are left
/// untouched.
pub fn merge_ambiguity_parameters(
    selected: &FeatureParameters,
    original: Option<&FeatureParameters>,
) -> FeatureParameters {
    let mut merged = original.cloned().unwrap_or_default();
    for (key, value) in selected {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::definitions::{ParameterBinding, ParameterSpec};

    fn feature(identifier: &str, parameter_identifiers: &[&str]) -> FeatureDefinition {
        FeatureDefinition {
            identifier: identifier.to_string(),
            parameters: parameter_identifiers
                .iter()
                .map(|id| ParameterSpec {
                    identifier: id.to_string(),
                    allowed_values: Vec::new(),
                    optional: false,
                })
                .collect(),
        }
    }

    fn command(feature_identifier: &str, parameters: Vec<ParameterBinding>) -> CommandDefinition {
        CommandDefinition {
            pattern: "irrelevant".to_string(),
            feature_identifier: feature_identifier.to_string(),
            parameters,
            is_active: true,
        }
    }

    fn constant(identifier: &str, value: &str) -> ParameterBinding {
        ParameterBinding {
            identifier: identifier.to_string(),
            kind: ParameterBindingKind::Constant,
            value: Some(value.to_string()),
            variable_name: None,
            variable_values: None,
        }
    }

    fn variable(identifier: &str, variable_name: &str) -> ParameterBinding {
        ParameterBinding {
            identifier: identifier.to_string(),
            kind: ParameterBindingKind::Variable,
            value: None,
            variable_name: Some(variable_name.to_string()),
            variable_values: None,
        }
    }

    fn match_with_variables(variables: &[(&str, &str)]) -> GrammarMatch {
        GrammarMatch {
            matched: true,
            variables: variables
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            restricted_variable_indexes: HashMap::new(),
        }
    }

    fn params(entries: &[(&str, &str)]) -> FeatureParameters {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect()
    }

    #[test]
    fn test_constant_binding_ignores_match_variables() {
        let result = match_with_variables(&[("X", "whatever")]);
        let parameters = build_parameters(
            &result,
            &command("set-volume", vec![constant("level", "5")]),
            &[feature("set-volume", &["level"])],
        )
        .unwrap();
        assert_eq!(parameters, params(&[("level", "5")]));
    }

    #[test]
    fn test_variable_binding_uses_match_value() {
        let result = match_with_variables(&[("SONG", "bohemian rhapsody")]);
        let parameters = build_parameters(
            &result,
            &command("play-song", vec![variable("song", "SONG")]),
            &[feature("play-song", &["song"])],
        )
        .unwrap();
        assert_eq!(parameters, params(&[("song", "bohemian rhapsody")]));
    }

    #[test]
    fn test_stale_variable_binding_omits_parameter() {
        let result = match_with_variables(&[]);
        let parameters = build_parameters(
            &result,
            &command("play-song", vec![variable("song", "GONE")]),
            &[feature("play-song", &["song"])],
        )
        .unwrap();
        assert!(parameters.is_empty());
    }

    #[test]
    fn test_restricted_variable_resolves_by_index() {
        let result = GrammarMatch {
            matched: true,
            variables: HashMap::new(),
            restricted_variable_indexes: HashMap::from([("v".to_string(), 1)]),
        };
        let binding = ParameterBinding {
            identifier: "state".to_string(),
            kind: ParameterBindingKind::RestrictedVariable,
            value: None,
            variable_name: Some("v".to_string()),
            variable_values: Some(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
        };
        let parameters = build_parameters(
            &result,
            &command("toggle", vec![binding]),
            &[feature("toggle", &["state"])],
        )
        .unwrap();
        assert_eq!(parameters, params(&[("state", "b")]));
    }

    #[test]
    fn test_out_of_range_restricted_index_omits_parameter() {
        let result = GrammarMatch {
            matched: true,
            variables: HashMap::new(),
            restricted_variable_indexes: HashMap::from([("v".to_string(), 9)]),
        };
        let binding = ParameterBinding {
            identifier: "state".to_string(),
            kind: ParameterBindingKind::RestrictedVariable,
            value: None,
            variable_name: Some("v".to_string()),
            variable_values: Some(vec!["a".to_string()]),
        };
        let parameters = build_parameters(
            &result,
            &command("toggle", vec![binding]),
            &[feature("toggle", &["state"])],
        )
        .unwrap();
        assert!(parameters.is_empty());
    }

    #[test]
    fn test_binding_for_undeclared_parameter_is_ignored() {
        let result = match_with_variables(&[("X", "1")]);
        let parameters = build_parameters(
            &result,
            &command(
                "play-song",
                vec![variable("song", "X"), constant("gone", "1")],
            ),
            &[feature("play-song", &["song"])],
        )
        .unwrap();
        assert_eq!(parameters, params(&[("song", "1")]));
    }

    #[test]
    fn test_undefined_binding_is_skipped() {
        let binding = ParameterBinding {
            identifier: "song".to_string(),
            kind: ParameterBindingKind::Undefined,
            value: Some("ignored".to_string()),
            variable_name: None,
            variable_values: None,
        };
        let parameters = build_parameters(
            &match_with_variables(&[]),
            &command("play-song", vec![binding]),
            &[feature("play-song", &["song"])],
        )
        .unwrap();
        assert!(parameters.is_empty());
    }

    #[test]
    fn test_unknown_feature_yields_none() {
        let parameters = build_parameters(
            &match_with_variables(&[]),
            &command("missing", vec![]),
            &[feature("play-song", &["song"])],
        );
        assert!(parameters.is_none());
    }

    #[test]
    fn test_merge_selected_values_win() {
        let merged = merge_ambiguity_parameters(
            &params(&[("x", "2")]),
            Some(&params(&[("x", "1"), ("y", "9")])),
        );
        assert_eq!(merged, params(&[("x", "2"), ("y", "9")]));
    }

    #[test]
    fn test_merge_without_original() {
        let merged = merge_ambiguity_parameters(&params(&[("id", "2")]), None);
        assert_eq!(merged, params(&[("id", "2")]));
    }
}
