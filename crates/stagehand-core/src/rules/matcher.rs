use super::model::{FileMetadata, Rule, RuleCondition};

/// `true` when every condition of `rule` holds for `metadata`.
///
/// Stops at the first failing condition. A rule whose conditions are all
/// unconstrained matches every file.
pub fn matches(rule: &Rule, metadata: &FileMetadata) -> bool {
    rule.conditions
        .iter()
        .all(|condition| condition_matches(condition, metadata))
}

pub fn condition_matches(condition: &RuleCondition, metadata: &FileMetadata) -> bool {
    if let Some(kind) = &condition.kind {
        if !eq_ignore_case(kind, metadata.kind.as_deref()) {
            return false;
        }
    }

    if let Some(extension) = &condition.extension {
        match metadata.normalized_extension() {
            Some(ext) if ext == *extension => {}
            _ => return false,
        }
    }

    if let Some(source_app) = &condition.source_app {
        if !eq_ignore_case(source_app, metadata.source_app.as_deref()) {
            return false;
        }
    }

    if let Some(domain) = &condition.domain {
        let haystack = metadata.domain.as_deref().unwrap_or("").to_lowercase();
        if !haystack.contains(&domain.to_lowercase()) {
            return false;
        }
    }

    if let Some(pattern) = &condition.path_pattern {
        if !pattern.is_match(&metadata.path.to_string_lossy()) {
            return false;
        }
    }

    let size = metadata.size.unwrap_or(0);
    if condition.min_size.is_some_and(|min| size < min) {
        return false;
    }
    if condition.max_size.is_some_and(|max| size > max) {
        return false;
    }

    if !condition.tags.is_empty() && !condition.tags.is_subset(&metadata.normalized_tags()) {
        return false;
    }

    true
}

fn eq_ignore_case(expected: &str, actual: Option<&str>) -> bool {
    expected.to_lowercase() == actual.unwrap_or("").to_lowercase()
}
