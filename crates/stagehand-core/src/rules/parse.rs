//! Rule definitions arrive as JSON mappings:
//!
//! ```json
//! {
//!   "when": [{ "extension": "pdf", "minSize": 1024 }],
//!   "actions": [{ "type": "move", "destination": "~/Documents/PDFs" }],
//!   "ask": "File PDFs into Documents?"
//! }
//! ```
//!
//! Everything that can be wrong with a rule is reported here, so matching and
//! suggestion building never see a malformed rule.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::model::{normalize_extension, ActionKind, Rule, RuleAction, RuleCondition};
use super::template;
use crate::error::{Error, IoContext, Result};
use crate::fsops;

pub fn parse_rule(name: &str, raw: &Value) -> Result<Rule> {
    let definition = raw
        .as_object()
        .ok_or_else(|| Error::configuration(name, "definition must be a mapping"))?;

    let conditions_data = non_empty_list(definition, "when")
        .ok_or_else(|| Error::configuration(name, "must define a non-empty 'when' list"))?;
    let actions_data = non_empty_list(definition, "actions")
        .ok_or_else(|| Error::configuration(name, "must define a non-empty 'actions' list"))?;

    let conditions = conditions_data
        .iter()
        .enumerate()
        .map(|(index, value)| parse_condition(name, index, value))
        .collect::<Result<Vec<_>>>()?;

    let actions = actions_data
        .iter()
        .enumerate()
        .map(|(index, value)| parse_action(name, index, value))
        .collect::<Result<Vec<_>>>()?;

    let ask = optional_str(name, "ask", definition.get("ask"))?;

    Ok(Rule {
        name: name.to_string(),
        conditions,
        actions,
        ask,
    })
}

fn non_empty_list<'a>(definition: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    definition
        .get(key)
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
}

fn parse_condition(rule: &str, index: usize, raw: &Value) -> Result<RuleCondition> {
    let condition = raw.as_object().ok_or_else(|| {
        Error::configuration(rule, format!("condition {} must be a mapping", index))
    })?;

    let path_pattern = optional_str(rule, "path", condition.get("path"))?
        .map(|pattern| {
            Regex::new(&pattern).map_err(|e| {
                Error::InvalidArgument(format!(
                    "rule '{}' condition {}: invalid path pattern {:?}: {}",
                    rule, index, pattern, e
                ))
            })
        })
        .transpose()?;

    let min_size = optional_size(rule, index, "minSize", condition.get("minSize"))?;
    let max_size = optional_size(rule, index, "maxSize", condition.get("maxSize"))?;
    if let (Some(min), Some(max)) = (min_size, max_size) {
        if min > max {
            return Err(Error::InvalidArgument(format!(
                "rule '{}' condition {}: minSize {} exceeds maxSize {}",
                rule, index, min, max
            )));
        }
    }

    Ok(RuleCondition {
        kind: optional_str(rule, "kind", condition.get("kind"))?,
        extension: optional_str(rule, "extension", condition.get("extension"))?
            .map(|ext| normalize_extension(&ext))
            .filter(|ext| !ext.is_empty()),
        source_app: optional_str(rule, "sourceApp", condition.get("sourceApp"))?,
        domain: optional_str(rule, "domain", condition.get("domain"))?,
        path_pattern,
        min_size,
        max_size,
        tags: normalize_tags(rule, index, condition.get("tags"))?,
    })
}

fn parse_action(rule: &str, index: usize, raw: &Value) -> Result<RuleAction> {
    let action = raw.as_object().ok_or_else(|| {
        Error::configuration(rule, format!("action {} must be a mapping", index))
    })?;

    let kind = optional_str(rule, "type", action.get("type"))?
        .and_then(|t| t.parse::<ActionKind>().ok())
        .ok_or_else(|| {
            Error::configuration(
                rule,
                format!(
                    "action {} has unsupported type {}",
                    index,
                    action.get("type").unwrap_or(&Value::Null)
                ),
            )
        })?;

    let destination = optional_str(rule, "destination", action.get("destination"))?
        .map(|d| fsops::expand_tilde(Path::new(&d)));

    let rename = optional_str(rule, "rename", action.get("rename"))?;
    if let Some(pattern) = &rename {
        template::validate(pattern).map_err(|e| {
            Error::InvalidArgument(format!("rule '{}' action {}: {}", rule, index, e))
        })?;
    }

    let tag = optional_str(rule, "tag", action.get("tag"))?;

    Ok(match kind {
        ActionKind::Move => RuleAction::Move {
            destination,
            rename,
        },
        ActionKind::Rename => RuleAction::Rename {
            destination,
            rename,
        },
        ActionKind::Tag => RuleAction::Tag { tag },
        ActionKind::Trash => RuleAction::Trash,
    })
}

/// Scalars become trimmed strings; blank strings and null are unset.
fn optional_str(rule: &str, field: &str, value: Option<&Value>) -> Result<Option<String>> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => {
            return Err(Error::configuration(
                rule,
                format!("'{}' must be a scalar, got {}", field, other),
            ))
        }
    };
    Ok(if text.is_empty() { None } else { Some(text) })
}

fn optional_size(rule: &str, index: usize, field: &str, value: Option<&Value>) -> Result<Option<u64>> {
    let invalid = |shown: &dyn std::fmt::Display| {
        Error::InvalidArgument(format!(
            "rule '{}' condition {}: '{}' must be a non-negative integer, got {}",
            rule, index, field, shown
        ))
    };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| invalid(n)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(&format!("{:?}", s))),
        Some(other) => Err(invalid(other)),
    }
}

fn normalize_tags(rule: &str, index: usize, value: Option<&Value>) -> Result<BTreeSet<String>> {
    let items: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::String(_)) => vec![single],
        Some(other) => {
            return Err(Error::configuration(
                rule,
                format!("condition {}: 'tags' must be a list, got {}", index, other),
            ))
        }
    };

    let mut tags = BTreeSet::new();
    for item in items {
        let tag = item.as_str().ok_or_else(|| {
            Error::configuration(
                rule,
                format!("condition {}: tags must be strings, got {}", index, item),
            )
        })?;
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() {
            tags.insert(tag);
        }
    }
    Ok(tags)
}

/// Split a rule collection into `(name, definition)` pairs.
///
/// Accepts a mapping of name to definition (document order is kept) or a
/// list of `{ "name": ..., "definition": ... }` records (`rule` is accepted
/// in place of `definition`).
pub fn rule_definitions(raw: &Value) -> Result<Vec<(String, Value)>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => map
            .iter()
            .map(|(name, definition)| {
                if definition.is_object() {
                    Ok((name.clone(), definition.clone()))
                } else {
                    Err(Error::configuration(name, "definition must be a mapping"))
                }
            })
            .collect(),
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                let record = entry.as_object().ok_or_else(|| {
                    Error::InvalidArgument("rule list entries must be mappings".to_string())
                })?;
                let name = record
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidArgument("rule entries require a non-empty 'name'".to_string())
                    })?;
                let definition = record
                    .get("definition")
                    .or_else(|| record.get("rule"))
                    .filter(|d| d.is_object())
                    .ok_or_else(|| {
                        Error::configuration(name, "rule entries require a 'definition' mapping")
                    })?;
                Ok((name.to_string(), definition.clone()))
            })
            .collect(),
        _ => Err(Error::InvalidArgument(
            "rules must be provided as a list or mapping".to_string(),
        )),
    }
}

/// Parse every rule in a collection. One bad rule fails the whole load.
pub fn load_rules(raw: &Value) -> Result<Vec<Rule>> {
    let parsed = rule_definitions(raw)?
        .iter()
        .map(|(name, definition)| parse_rule(name, definition))
        .collect::<Result<Vec<_>>>()?;
    Ok(merge_rules(Vec::new(), parsed))
}

pub fn load_rules_from_file(path: &Path) -> Result<Vec<Rule>> {
    let text = fs::read_to_string(path).op_context("read rules file", path)?;
    let raw: Value = serde_json::from_str(&text)?;
    load_rules(&raw)
}

/// Combine two ordered rule lists. A rule in `overrides` replaces the
/// same-named rule in `base` at its original position; new names append.
pub fn merge_rules(base: Vec<Rule>, overrides: Vec<Rule>) -> Vec<Rule> {
    let mut merged = base;
    for rule in overrides {
        match merged.iter().position(|existing| existing.name == rule.name) {
            Some(index) => merged[index] = rule,
            None => merged.push(rule),
        }
    }
    merged
}

/// Destination directories named by move/rename actions, for display.
pub fn rule_destinations(rule: &Rule) -> Vec<PathBuf> {
    rule.actions
        .iter()
        .filter_map(|action| match action {
            RuleAction::Move { destination, .. } | RuleAction::Rename { destination, .. } => {
                destination.clone()
            }
            _ => None,
        })
        .collect()
}
