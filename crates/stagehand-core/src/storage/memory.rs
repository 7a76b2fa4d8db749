use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fsops;
use crate::rules::{load_rules, merge_rules, parse_rule, Rule};

/// A stored rule definition, kept in its raw JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub name: String,
    pub definition: Value,
}

/// Contents of `organizer.memory.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPayload {
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
    #[serde(default)]
    pub preferences: Map<String, Value>,
}

/// Flat JSON store for learned rules and user preferences.
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An absent file is an empty memory.
    pub fn load(&self) -> Result<MemoryPayload> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no memory file yet");
                return Ok(MemoryPayload::default());
            }
            Err(e) => return Err(Error::file_op("read memory", &self.path, e)),
        };

        let raw: Value = serde_json::from_str(&text).map_err(|e| self.corrupt(e))?;
        if !raw.is_object() {
            return Err(self.corrupt("top level must be a JSON object"));
        }
        serde_json::from_value(raw).map_err(|e| self.corrupt(e))
    }

    pub fn save(&self, payload: &MemoryPayload) -> Result<()> {
        fsops::write_json_atomic(&self.path, payload)
    }

    /// Validate `definition` and store it under `name`, replacing any rule of
    /// the same name in place.
    pub fn upsert_rule(&self, name: &str, definition: Value) -> Result<Rule> {
        let rule = parse_rule(name, &definition)?;
        let mut payload = self.load()?;
        let record = RuleRecord {
            name: rule.name.clone(),
            definition,
        };
        match payload.rules.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => payload.rules.push(record),
        }
        self.save(&payload)?;
        debug!(rule = %rule.name, "stored rule in memory");
        Ok(rule)
    }

    /// Returns false when no rule had that name.
    pub fn remove_rule(&self, name: &str) -> Result<bool> {
        let mut payload = self.load()?;
        let before = payload.rules.len();
        payload.rules.retain(|r| r.name != name);
        if payload.rules.len() == before {
            return Ok(false);
        }
        self.save(&payload)?;
        Ok(true)
    }

    fn corrupt(&self, message: impl ToString) -> Error {
        Error::Memory {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

/// Memory rules first, then caller rules. A caller rule with a stored rule's
/// name replaces it at the stored rule's position.
pub fn gather_rules(memory: &MemoryPayload, caller: &Value) -> Result<Vec<Rule>> {
    let stored = memory
        .rules
        .iter()
        .map(|record| parse_rule(&record.name, &record.definition))
        .collect::<Result<Vec<_>>>()?;
    let supplied = load_rules(caller)?;
    Ok(merge_rules(merge_rules(Vec::new(), stored), supplied))
}
