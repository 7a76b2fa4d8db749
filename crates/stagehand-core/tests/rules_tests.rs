use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

use stagehand_core::rules::{self, ActionKind, FileMetadata};
use stagehand_core::storage::MemoryStore;
use stagehand_core::{AppConfig, Error, Organizer};

fn pdf(path: &str) -> FileMetadata {
    FileMetadata {
        extension: Some("pdf".to_string()),
        ..FileMetadata::new(path)
    }
}

#[test]
fn test_pdf_rule_moves_into_archive() {
    let rules = rules::load_rules(&json!({
        "Archive PDFs": {
            "when": [{"extension": "pdf"}],
            "actions": [{"type": "move", "destination": "/archive"}],
        }
    }))
    .unwrap();

    let changes = rules::build_suggestions(&[pdf("/inbox/report.pdf")], &rules, None).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].action, ActionKind::Move);
    assert_eq!(changes[0].source, PathBuf::from("/inbox/report.pdf"));
    assert_eq!(changes[0].destination, PathBuf::from("/archive/report.pdf"));
    assert_eq!(changes[0].rule_name, "Archive PDFs");
}

#[test]
fn test_rename_template_substitutes_kind() {
    let rules = rules::load_rules(&json!([{
        "name": "Images",
        "definition": {
            "when": [{"kind": "image"}],
            "actions": [{"type": "rename", "destination": "/pictures", "rename": "img_{kind}.jpg"}],
        }
    }]))
    .unwrap();
    let photo = FileMetadata {
        kind: Some("image".to_string()),
        extension: Some("jpg".to_string()),
        ..FileMetadata::new("/inbox/photo.jpg")
    };

    let changes = rules::build_suggestions(&[photo], &rules, None).unwrap();
    assert_eq!(changes[0].destination, PathBuf::from("/pictures/img_image.jpg"));
}

#[test]
fn test_first_matching_rule_wins() {
    let rules = rules::load_rules(&json!({
        "Specific": {
            "when": [{"extension": "pdf", "path": "invoices"}],
            "actions": [{"type": "move", "destination": "/invoices"}],
        },
        "General": {
            "when": [{"extension": "pdf"}],
            "actions": [
                {"type": "move", "destination": "/docs"},
                {"type": "tag", "tag": "document"},
            ],
        },
    }))
    .unwrap();

    let changes = rules::build_suggestions(
        &[pdf("/inbox/invoices/march.pdf"), pdf("/inbox/paper.pdf")],
        &rules,
        None,
    )
    .unwrap();

    let summary: Vec<_> = changes
        .iter()
        .map(|c| (c.rule_name.as_str(), c.action, c.destination.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Specific", ActionKind::Move, PathBuf::from("/invoices/march.pdf")),
            ("General", ActionKind::Move, PathBuf::from("/docs/paper.pdf")),
            ("General", ActionKind::Tag, PathBuf::from("/inbox/paper.pdf")),
        ]
    );
}

#[test]
fn test_rules_file_and_memory_merge() {
    let tmp = tempdir().unwrap();
    let rules_file = tmp.path().join("rules.json");
    fs::write(
        &rules_file,
        json!({
            "Docs": {
                "when": [{"extension": "pdf"}],
                "actions": [{"type": "move", "destination": "/from-file"}],
            }
        })
        .to_string(),
    )
    .unwrap();
    let from_file = rules::load_rules_from_file(&rules_file).unwrap();
    assert_eq!(from_file.len(), 1);

    let org = Organizer::new(AppConfig::default()).with_work_dir(tmp.path().join("work"));
    org.memory()
        .upsert_rule(
            "Docs",
            json!({
                "when": [{"extension": "pdf"}],
                "actions": [{"type": "move", "destination": "/from-memory"}],
            }),
        )
        .unwrap();
    org.memory()
        .upsert_rule(
            "Junk",
            json!({"when": [{"extension": "tmp"}], "actions": [{"type": "trash"}]}),
        )
        .unwrap();

    let caller = json!({
        "Docs": {
            "when": [{"extension": "pdf"}],
            "actions": [{"type": "move", "destination": "/from-caller"}],
        }
    });
    let merged = org.rules(&caller, true).unwrap();
    let names: Vec<_> = merged.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Docs", "Junk"]);

    let changes = org.suggest(&[pdf("/inbox/a.pdf")], &merged, None).unwrap();
    assert_eq!(changes[0].destination, PathBuf::from("/from-caller/a.pdf"));

    let without_memory = org.rules(&caller, false).unwrap();
    assert_eq!(without_memory.len(), 1);
}

#[test]
fn test_configured_default_destination_is_used() {
    let tmp = tempdir().unwrap();
    let config = AppConfig {
        default_destination: Some("/sorted".to_string()),
        ..AppConfig::default()
    };
    let org = Organizer::new(config).with_work_dir(tmp.path().join("work"));
    let rules = rules::load_rules(&json!({
        "Anywhere": {"when": [{"extension": "pdf"}], "actions": [{"type": "move"}]}
    }))
    .unwrap();

    let changes = org.suggest(&[pdf("/inbox/a.pdf")], &rules, None).unwrap();
    assert_eq!(changes[0].destination, PathBuf::from("/sorted/a.pdf"));

    let override_dir = PathBuf::from("/elsewhere");
    let changes = org
        .suggest(&[pdf("/inbox/a.pdf")], &rules, Some(&override_dir))
        .unwrap();
    assert_eq!(changes[0].destination, PathBuf::from("/elsewhere/a.pdf"));
}

#[test]
fn test_corrupt_memory_surfaces_as_error() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("organizer.memory.json");
    fs::write(&path, "\"just a string\"").unwrap();
    let err = MemoryStore::new(&path).load().unwrap_err();
    assert!(matches!(err, Error::Memory { .. }));
}
