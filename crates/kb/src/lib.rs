//! Knowledge-base inputs: manifest and glossary loading, document path
//! resolution, and corpus validation.

pub mod error;
pub mod glossary;
pub mod manifest;
pub mod resolve;
pub mod validate;

pub use {
    error::KbError,
    glossary::{GlossaryTerm, load_glossary},
    manifest::{Document, REQUIRED_MANIFEST_COLUMNS, load_manifest},
    resolve::resolve_document_path,
    validate::{IssueLevel, ValidateOptions, ValidationIssue, ValidationReport, validate_kb},
};
