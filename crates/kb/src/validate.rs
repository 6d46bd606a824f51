//! Corpus completeness checks run before indexing.

use std::{collections::HashSet, path::Path, sync::LazyLock};

use {regex::Regex, serde::Serialize};

use crate::{glossary::load_glossary, manifest::load_manifest, resolve::resolve_document_path};

#[allow(clippy::unwrap_used)]
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// Sections every knowledge-base article is expected to have.
const REQUIRED_SECTIONS: &[&str] = &["## Key ideas", "## Simple example", "## Source"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueLevel {
    Error,
    Warn,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub message: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub infos: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn push(&mut self, level: IssueLevel, message: String, location: impl Into<Option<String>>) {
        let issue = ValidationIssue {
            level,
            message,
            location: location.into(),
        };
        match level {
            IssueLevel::Error => self.errors.push(issue),
            IssueLevel::Warn => self.warnings.push(issue),
            IssueLevel::Info => self.infos.push(issue),
        }
    }

    fn finalize(mut self) -> Self {
        self.ok = self.errors.is_empty();
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    pub min_docs: usize,
    pub min_terms: usize,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            min_docs: 50,
            min_terms: 50,
        }
    }
}

/// Check manifest, documents and glossary for completeness.
///
/// Never fails: every problem becomes an issue in the returned report.
pub fn validate_kb(
    manifest_path: &Path,
    docs_dir: &Path,
    glossary_path: &Path,
    opts: ValidateOptions,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let manifest_loc = manifest_path.display().to_string();

    let rows = match load_manifest(manifest_path) {
        Ok(rows) => rows,
        Err(e) => {
            report.push(IssueLevel::Error, e.to_string(), manifest_loc);
            return report.finalize();
        },
    };

    if rows.len() < opts.min_docs {
        report.push(
            IssueLevel::Warn,
            format!(
                "Manifest has {} rows; expected at least {}.",
                rows.len(),
                opts.min_docs
            ),
            manifest_loc.clone(),
        );
    }

    if !docs_dir.is_dir() {
        report.push(
            IssueLevel::Error,
            "Docs directory not found.".into(),
            docs_dir.display().to_string(),
        );
        return report.finalize();
    }

    let mut seen = HashSet::new();
    for row in &rows {
        if !seen.insert(row.doc_id.as_str()) {
            report.push(
                IssueLevel::Error,
                format!("Duplicate doc_id in manifest: {}", row.doc_id),
                manifest_loc.clone(),
            );
        }

        let Some(path) = resolve_document_path(&row.local_path, docs_dir) else {
            report.push(
                IssueLevel::Error,
                format!("Missing doc file for doc_id={}: {}", row.doc_id, row.local_path),
                row.local_path.clone(),
            );
            continue;
        };
        let location = path.display().to_string();

        let text = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                report.push(
                    IssueLevel::Error,
                    format!("Unreadable doc file for doc_id={}: {e}", row.doc_id),
                    location,
                );
                continue;
            },
        };

        for section in REQUIRED_SECTIONS {
            if !text.contains(section) {
                report.push(
                    IssueLevel::Warn,
                    format!("Doc missing section '{section}' ({})", row.doc_id),
                    location.clone(),
                );
            }
        }
        if !URL_RE.is_match(&text) {
            report.push(
                IssueLevel::Warn,
                format!("Doc has no URL in Source section ({})", row.doc_id),
                location,
            );
        }
    }

    let glossary_loc = glossary_path.display().to_string();
    match load_glossary(glossary_path) {
        Ok(terms) if terms.len() < opts.min_terms => report.push(
            IssueLevel::Warn,
            format!(
                "Glossary has {} terms; expected at least {}.",
                terms.len(),
                opts.min_terms
            ),
            glossary_loc,
        ),
        Ok(terms) => report.push(
            IssueLevel::Info,
            format!("Glossary has {} terms.", terms.len()),
            glossary_loc,
        ),
        Err(e) => report.push(
            IssueLevel::Warn,
            format!("Glossary check skipped/failed: {e}"),
            glossary_loc,
        ),
    }

    report.finalize()
}
