use super::manifest::StageManifest;
use crate::rules::ActionKind;

/// Human-readable summary of a manifest. Pure; reads nothing from disk.
///
/// A header line is followed by one line per entry: `TAG <path>`,
/// `TRASH <path>`, or `<ACTION> <source> -> <destination>`.
pub fn preview_diff(manifest: &StageManifest) -> String {
    let mut lines = Vec::with_capacity(manifest.entries.len() + 1);
    lines.push(format!(
        "Manifest {} contains {} change(s):",
        manifest.identifier,
        manifest.entries.len()
    ));

    for entry in &manifest.entries {
        let line = match entry.action {
            ActionKind::Tag => format!("TAG {}", entry.source_path.display()),
            ActionKind::Trash => format!("TRASH {}", entry.source_path.display()),
            ActionKind::Move | ActionKind::Rename => format!(
                "{} {} -> {}",
                entry.action.as_str().to_uppercase(),
                entry.source_path.display(),
                entry.destination_path.display()
            ),
        };
        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::manifest::StageEntry;
    use chrono::Utc;
    use std::path::PathBuf;

    fn entry(action: ActionKind, source: &str, destination: &str) -> StageEntry {
        StageEntry {
            source_path: PathBuf::from(source),
            destination_path: PathBuf::from(destination),
            action,
            staged_relpath: "0000_x".to_string(),
            checksum: String::new(),
        }
    }

    #[test]
    fn test_preview_lines() {
        let manifest = StageManifest {
            identifier: "m1".to_string(),
            path: PathBuf::from("/nonexistent/staging/m1/manifest.json"),
            created_at: Utc::now(),
            entries: vec![
                entry(ActionKind::Move, "/in/a.pdf", "/docs/a.pdf"),
                entry(ActionKind::Rename, "/in/b.jpg", "/pics/img_image.jpg"),
                entry(ActionKind::Tag, "/in/c.txt", "/in/c.txt"),
                entry(ActionKind::Trash, "/in/d.tmp", "/in/d.tmp"),
            ],
        };

        let text = preview_diff(&manifest);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Manifest m1 contains 4 change(s):",
                "MOVE /in/a.pdf -> /docs/a.pdf",
                "RENAME /in/b.jpg -> /pics/img_image.jpg",
                "TAG /in/c.txt",
                "TRASH /in/d.tmp",
            ]
        );
        assert_eq!(preview_diff(&manifest), text);
    }
}
