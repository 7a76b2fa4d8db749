//! Declarative rules and the suggestion builder.
//!
//! Rules are evaluated in caller order and the first rule whose conditions all
//! hold claims the file. That linear scan with early exit is the only conflict
//! resolution between overlapping rules, and it gives every file at most one
//! set of destinations.

pub mod matcher;
pub mod model;
pub mod parse;
pub mod suggest;
pub mod template;

pub use matcher::matches;
pub use model::{ActionKind, FileMetadata, Rule, RuleAction, RuleCondition, SuggestedChange};
pub use parse::{load_rules, load_rules_from_file, merge_rules, parse_rule, rule_definitions};
pub use suggest::build_suggestions;
