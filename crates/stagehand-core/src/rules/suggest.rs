use std::path::{Component, Path};
use tracing::{debug, info};

use super::matcher::matches;
use super::model::{FileMetadata, Rule, RuleAction, SuggestedChange};
use crate::error::{Error, Result};

/// Turn files and an ordered rule list into concrete change proposals.
///
/// Rule order is priority: for each file the first rule whose conditions all
/// hold wins, every action of that rule is materialized, and later rules are
/// never evaluated for that file. Output follows file order, then action
/// order within the winning rule. Nothing is reordered or deduplicated.
///
/// A move or rename with neither an action destination nor a
/// `default_destination` is dropped without error.
pub fn build_suggestions(
    files: &[FileMetadata],
    rules: &[Rule],
    default_destination: Option<&Path>,
) -> Result<Vec<SuggestedChange>> {
    let mut suggestions = Vec::new();
    let mut matched_files = 0usize;

    for metadata in files {
        let Some(rule) = rules.iter().find(|rule| matches(rule, metadata)) else {
            continue;
        };
        matched_files += 1;
        debug!(path = %metadata.path.display(), rule = %rule.name, "rule matched");

        for action in &rule.actions {
            if let Some(change) = materialize(metadata, rule, action, default_destination)? {
                suggestions.push(change);
            }
        }
    }

    info!(
        "{} of {} files matched a rule, {} suggestions",
        matched_files,
        files.len(),
        suggestions.len()
    );
    Ok(suggestions)
}

fn materialize(
    metadata: &FileMetadata,
    rule: &Rule,
    action: &RuleAction,
    default_destination: Option<&Path>,
) -> Result<Option<SuggestedChange>> {
    match action {
        RuleAction::Move {
            destination,
            rename,
        }
        | RuleAction::Rename {
            destination,
            rename,
        } => {
            let Some(directory) = destination.as_deref().or(default_destination) else {
                debug!(
                    rule = %rule.name,
                    action = %action.kind(),
                    "no destination available, dropping action"
                );
                return Ok(None);
            };

            let file_name = match rename {
                Some(pattern) => {
                    let name = metadata.format_template(pattern)?;
                    if name.trim().is_empty() {
                        return Err(Error::InvalidArgument(format!(
                            "rule '{}' rename template {:?} produced an empty name for {}",
                            rule.name,
                            pattern,
                            metadata.path.display()
                        )));
                    }
                    if !is_plain_file_name(&name) {
                        return Err(Error::InvalidArgument(format!(
                            "rule '{}' rename template {:?} produced {:?} for {}, which is not a plain file name",
                            rule.name,
                            pattern,
                            name,
                            metadata.path.display()
                        )));
                    }
                    name
                }
                None => match metadata.path.file_name() {
                    Some(name) => name.to_string_lossy().into_owned(),
                    None => {
                        debug!(path = %metadata.path.display(), "path has no file name, dropping action");
                        return Ok(None);
                    }
                },
            };

            Ok(Some(SuggestedChange::new(
                &rule.name,
                &metadata.path,
                &directory.join(file_name),
                action.kind(),
            )))
        }
        RuleAction::Tag { .. } | RuleAction::Trash => Ok(Some(SuggestedChange::new(
            &rule.name,
            &metadata.path,
            &metadata.path,
            action.kind(),
        ))),
    }
}

/// Exactly one normal component, so joining it stays inside the directory.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::model::{ActionKind, RuleCondition};
    use std::path::PathBuf;

    fn ext_rule(name: &str, ext: &str, actions: Vec<RuleAction>) -> Rule {
        Rule {
            name: name.to_string(),
            conditions: vec![RuleCondition {
                extension: Some(ext.to_string()),
                ..RuleCondition::default()
            }],
            actions,
            ask: None,
        }
    }

    fn file(path: &str, ext: &str) -> FileMetadata {
        FileMetadata {
            path: PathBuf::from(path),
            extension: Some(ext.to_string()),
            ..FileMetadata::default()
        }
    }

    fn move_to(dir: &str) -> RuleAction {
        RuleAction::Move {
            destination: Some(PathBuf::from(dir)),
            rename: None,
        }
    }

    #[test]
    fn test_move_reuses_base_name() {
        let rules = vec![ext_rule("pdfs", "pdf", vec![move_to("/archive")])];
        let files = vec![
            file("/downloads/report.pdf", "pdf"),
            file("/downloads/image.png", "png"),
        ];

        let out = build_suggestions(&files, &rules, None).unwrap();
        assert_eq!(
            out,
            vec![SuggestedChange::new(
                "pdfs",
                Path::new("/downloads/report.pdf"),
                Path::new("/archive/report.pdf"),
                ActionKind::Move,
            )]
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = vec![
            ext_rule("first", "pdf", vec![move_to("/one")]),
            ext_rule("second", "pdf", vec![move_to("/two")]),
        ];
        let out = build_suggestions(&[file("/in/a.pdf", "pdf")], &rules, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_name, "first");
        assert_eq!(out[0].destination, PathBuf::from("/one/a.pdf"));
    }

    #[test]
    fn test_all_actions_of_winning_rule_fire_in_order() {
        let rules = vec![ext_rule(
            "multi",
            "txt",
            vec![
                RuleAction::Tag {
                    tag: Some("notes".to_string()),
                },
                move_to("/notes"),
                RuleAction::Trash,
            ],
        )];
        let out = build_suggestions(&[file("/in/n.txt", "txt")], &rules, None).unwrap();
        let kinds: Vec<_> = out.iter().map(|c| c.action).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::Tag, ActionKind::Move, ActionKind::Trash]
        );
        assert_eq!(out[0].destination, out[0].source);
        assert_eq!(out[2].destination, out[2].source);
    }

    #[test]
    fn test_missing_destination_drops_action_only() {
        let rules = vec![ext_rule(
            "nodest",
            "txt",
            vec![
                RuleAction::Move {
                    destination: None,
                    rename: None,
                },
                RuleAction::Trash,
            ],
        )];
        let files = [file("/in/n.txt", "txt")];

        let out = build_suggestions(&files, &rules, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, ActionKind::Trash);

        let out = build_suggestions(&files, &rules, Some(Path::new("/fallback"))).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].destination, PathBuf::from("/fallback/n.txt"));
    }

    #[test]
    fn test_action_destination_beats_default() {
        let rules = vec![ext_rule("pdfs", "pdf", vec![move_to("/explicit")])];
        let out = build_suggestions(
            &[file("/in/a.pdf", "pdf")],
            &rules,
            Some(Path::new("/fallback")),
        )
        .unwrap();
        assert_eq!(out[0].destination, PathBuf::from("/explicit/a.pdf"));
    }

    #[test]
    fn test_rename_formats_template() {
        let rules = vec![ext_rule(
            "photos",
            "jpg",
            vec![RuleAction::Rename {
                destination: Some(PathBuf::from("/pictures")),
                rename: Some("img_{kind}.jpg".to_string()),
            }],
        )];
        let mut photo = file("/downloads/photo.jpg", "jpg");
        photo.kind = Some("image".to_string());

        let out = build_suggestions(&[photo], &rules, None).unwrap();
        assert_eq!(out[0].destination, PathBuf::from("/pictures/img_image.jpg"));
        assert_eq!(out[0].action, ActionKind::Rename);
    }

    #[test]
    fn test_rename_cannot_escape_destination() {
        for pattern in ["/etc/{name}", "../{name}.jpg", "sub/{name}.jpg", "{domain}.jpg", ".."] {
            let rules = vec![ext_rule(
                "photos",
                "jpg",
                vec![RuleAction::Rename {
                    destination: Some(PathBuf::from("/pictures")),
                    rename: Some(pattern.to_string()),
                }],
            )];
            let mut photo = file("/downloads/photo.jpg", "jpg");
            photo.domain = Some("../../outside".to_string());

            let err = build_suggestions(&[photo], &rules, None).unwrap_err();
            assert!(
                matches!(err, Error::InvalidArgument(_)),
                "{:?} was accepted",
                pattern
            );
        }
    }

    #[test]
    fn test_deterministic_output() {
        let rules = vec![
            ext_rule("pdfs", "pdf", vec![move_to("/docs")]),
            ext_rule("txts", "txt", vec![move_to("/notes"), RuleAction::Trash]),
        ];
        let files = vec![
            file("/in/b.txt", "txt"),
            file("/in/a.pdf", "pdf"),
            file("/in/c.bin", "bin"),
            file("/in/a.txt", "txt"),
        ];
        let first = build_suggestions(&files, &rules, None).unwrap();
        for _ in 0..5 {
            assert_eq!(build_suggestions(&files, &rules, None).unwrap(), first);
        }
        let sources: Vec<_> = first.iter().map(|c| c.source.clone()).collect();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("/in/b.txt"),
                PathBuf::from("/in/b.txt"),
                PathBuf::from("/in/a.pdf"),
                PathBuf::from("/in/a.txt"),
                PathBuf::from("/in/a.txt"),
            ]
        );
    }
}
