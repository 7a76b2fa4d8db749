use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::template;
use crate::error::{Error, Result};

/// Snapshot of one file as seen by the scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: PathBuf,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default, alias = "sourceApp")]
    pub source_app: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FileMetadata {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Lower-cased extension without the leading dot.
    pub fn normalized_extension(&self) -> Option<String> {
        self.extension
            .as_deref()
            .map(normalize_extension)
            .filter(|ext| !ext.is_empty())
    }

    pub fn normalized_tags(&self) -> BTreeSet<String> {
        self.tags.iter().map(|t| t.trim().to_lowercase()).collect()
    }

    /// Substitute `{name, ext, kind, source_app, domain, size}` into `pattern`.
    pub fn format_template(&self, pattern: &str) -> Result<String> {
        template::render(pattern, |field| {
            let value = match field {
                "name" => self
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                "ext" => self.normalized_extension().unwrap_or_default(),
                "kind" => self.kind.clone().unwrap_or_default(),
                "source_app" => self.source_app.clone().unwrap_or_default(),
                "domain" => self.domain.clone().unwrap_or_default(),
                "size" => self.size.unwrap_or(0).to_string(),
                _ => return None,
            };
            Some(value)
        })
    }
}

pub(crate) fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// One conjunct of a rule. Unset fields impose no constraint.
#[derive(Debug, Clone, Default)]
pub struct RuleCondition {
    pub kind: Option<String>,
    /// Already normalized: lower-case, no leading dot.
    pub extension: Option<String>,
    pub source_app: Option<String>,
    pub domain: Option<String>,
    pub path_pattern: Option<Regex>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Lower-cased.
    pub tags: BTreeSet<String>,
}

impl RuleCondition {
    pub fn is_unconstrained(&self) -> bool {
        self.kind.is_none()
            && self.extension.is_none()
            && self.source_app.is_none()
            && self.domain.is_none()
            && self.path_pattern.is_none()
            && self.min_size.is_none()
            && self.max_size.is_none()
            && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Move,
    Rename,
    Tag,
    Trash,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Rename => "rename",
            ActionKind::Tag => "tag",
            ActionKind::Trash => "trash",
        }
    }

    /// Only move and rename relocate bytes; tag and trash are informational.
    pub fn mutates_filesystem(self) -> bool {
        matches!(self, ActionKind::Move | ActionKind::Rename)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "move" => Ok(ActionKind::Move),
            "rename" => Ok(ActionKind::Rename),
            "tag" => Ok(ActionKind::Tag),
            "trash" => Ok(ActionKind::Trash),
            other => Err(Error::InvalidArgument(format!(
                "unsupported action type {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Move {
        destination: Option<PathBuf>,
        rename: Option<String>,
    },
    Rename {
        destination: Option<PathBuf>,
        rename: Option<String>,
    },
    Tag {
        tag: Option<String>,
    },
    Trash,
}

impl RuleAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            RuleAction::Move { .. } => ActionKind::Move,
            RuleAction::Rename { .. } => ActionKind::Rename,
            RuleAction::Tag { .. } => ActionKind::Tag,
            RuleAction::Trash => ActionKind::Trash,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    /// All must hold.
    pub conditions: Vec<RuleCondition>,
    /// All fire, in order, when the rule matches.
    pub actions: Vec<RuleAction>,
    /// Question to put to the user before acting on this rule.
    pub ask: Option<String>,
}

/// A proposal produced by the suggestion builder. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedChange {
    #[serde(alias = "ruleName")]
    pub rule_name: String,
    pub source: PathBuf,
    /// Equal to `source` for tag and trash.
    pub destination: PathBuf,
    #[serde(rename = "action_type", alias = "actionType")]
    pub action: ActionKind,
}

impl SuggestedChange {
    pub fn new(rule_name: &str, source: &Path, destination: &Path, action: ActionKind) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_extension() {
        let mut meta = FileMetadata::new("/tmp/a.PDF");
        assert_eq!(meta.normalized_extension(), None);
        meta.extension = Some(".PDF".to_string());
        assert_eq!(meta.normalized_extension().as_deref(), Some("pdf"));
        meta.extension = Some(".".to_string());
        assert_eq!(meta.normalized_extension(), None);
    }

    #[test]
    fn test_format_template_fills_missing_with_defaults() {
        let meta = FileMetadata {
            path: PathBuf::from("/downloads/photo.jpg"),
            extension: Some("JPG".to_string()),
            kind: Some("image".to_string()),
            ..FileMetadata::default()
        };
        assert_eq!(
            meta.format_template("{name}.{ext}|{kind}|{source_app}|{domain}|{size}")
                .unwrap(),
            "photo.jpg|image|||0"
        );
    }

    #[test]
    fn test_action_kind_round_trip_names() {
        for kind in [
            ActionKind::Move,
            ActionKind::Rename,
            ActionKind::Tag,
            ActionKind::Trash,
        ] {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!("copy".parse::<ActionKind>().is_err());
        assert!(ActionKind::Rename.mutates_filesystem());
        assert!(!ActionKind::Trash.mutates_filesystem());
    }

    #[test]
    fn test_suggested_change_wire_format() {
        let change = SuggestedChange::new(
            "Move PDFs",
            Path::new("/in/report.pdf"),
            Path::new("/archive/report.pdf"),
            ActionKind::Move,
        );
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["action_type"], "move");
        assert_eq!(json["source"], "/in/report.pdf");

        let camel: SuggestedChange = serde_json::from_str(
            r#"{"ruleName":"r","source":"/a","destination":"/b","actionType":"trash"}"#,
        )
        .unwrap();
        assert_eq!(camel.action, ActionKind::Trash);
        assert_eq!(camel.rule_name, "r");
    }
}
