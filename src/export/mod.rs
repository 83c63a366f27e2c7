use anyhow::{Context, Result};
use fs_err as fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::model::{ChapterList, ReportProject};
use crate::placeholder::Placeholders;

/// Drafted chapters in report order, variables rendered. Stops at the first
/// chapter without a draft, so the result is always the accepted prefix.
pub fn assemble(
    chapters: &ChapterList,
    project: &ReportProject,
    placeholders: &Placeholders,
) -> Vec<(String, String)> {
    chapters
        .iter()
        .map_while(|title| {
            project
                .draft(title)
                .map(|text| (title.to_string(), placeholders.render(text, &project.variables)))
        })
        .collect()
}

pub fn to_markdown(heading: &str, sections: &[(String, String)]) -> String {
    let mut out = format!("# {}\n", heading.trim());
    for (title, body) in sections {
        out.push_str(&format!("\n## {}\n\n{}\n", title, body.trim_end()));
    }
    out
}

/// Write `contents` next to `path` and rename into place, so readers never
/// see a half-written report.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ReportProject {
        let mut p = ReportProject::default();
        p.sections.insert("Executive Summary".into(), "Loan of VAR{amount}.".into());
        p.sections.insert("Annexures".into(), "Should not appear.".into());
        p.variables.insert("amount".into(), "₹50,000".into());
        p
    }

    #[test]
    fn assembles_accepted_prefix_in_order() {
        let chapters = ChapterList::new(["Executive Summary", "Market Analysis", "Annexures"]).unwrap();
        let doc = assemble(&chapters, &project(), &Placeholders::default());
        assert_eq!(doc, vec![("Executive Summary".to_string(), "Loan of ₹50,000.".to_string())]);
    }

    #[test]
    fn markdown_has_heading_per_chapter() {
        let md = to_markdown(
            "Paper Plate Unit",
            &[("A".into(), "one\n".into()), ("B".into(), "two".into())],
        );
        assert_eq!(md, "# Paper Plate Unit\n\n## A\n\none\n\n## B\n\ntwo\n");
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.md");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
