use std::path::{Path, PathBuf};

use {
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    tracing::debug,
};

use crate::error::KbError;

/// Columns every manifest must carry.
pub const REQUIRED_MANIFEST_COLUMNS: &[&str] = &[
    "doc_id",
    "title",
    "category",
    "sub_category",
    "source_url",
    "local_path",
];

/// One knowledge-base article as described by a manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_sub_category")]
    pub sub_category: String,
    #[serde(default)]
    pub source_url: String,
    pub local_path: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub license_or_usage_notes: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: String,
}

fn default_category() -> String {
    "general".into()
}

fn default_sub_category() -> String {
    "basics".into()
}

/// Load and validate the manifest CSV at `path`.
///
/// Fails fast when the file is absent or a required column is missing.
pub fn load_manifest(path: &Path) -> Result<Vec<Document>, KbError> {
    if !path.is_file() {
        return Err(KbError::ManifestNotFound(path.to_path_buf()));
    }
    let rows: Vec<Document> = read_csv(path, "KB manifest", REQUIRED_MANIFEST_COLUMNS)?;
    debug!(path = %path.display(), rows = rows.len(), "loaded manifest");
    Ok(rows)
}

/// Read a headed CSV file into `T`, checking `required` headers first.
pub(crate) fn read_csv<T: DeserializeOwned>(
    path: &Path,
    kind: &'static str,
    required: &[&str],
) -> Result<Vec<T>, KbError> {
    let csv_err = |source| KbError::Csv {
        path: PathBuf::from(path),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let found: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|col| !found.iter().any(|f| f == *col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(KbError::MissingColumns {
            kind,
            missing,
            found,
        });
    }

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "doc_id,title,category,sub_category,source_name,source_url,language,license_or_usage_notes,created_at,updated_at,local_path,summary,tags";

    #[test]
    fn loads_full_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        std::fs::write(
            &path,
            format!(
                "{HEADER}\nkb-0001,What are stocks?,stocks,basics,test,https://example.com/stocks,en,,2025-01-01,2025-01-01,docs/kb-0001.md,,equity\n"
            ),
        )
        .unwrap();

        let rows = load_manifest(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_id, "kb-0001");
        assert_eq!(rows[0].category, "stocks");
        assert_eq!(rows[0].source_url, "https://example.com/stocks");
        assert_eq!(rows[0].local_path, "docs/kb-0001.md");
        assert_eq!(rows[0].tags, "equity");
    }

    #[test]
    fn optional_columns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        std::fs::write(
            &path,
            "doc_id,title,category,sub_category,source_url,local_path\nkb-1,Bonds,bonds,basics,https://x.test,b.md\n",
        )
        .unwrap();

        let rows = load_manifest(&path).unwrap();
        assert_eq!(rows[0].summary, "");
        assert_eq!(rows[0].language, "");
    }

    #[test]
    fn missing_columns_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        std::fs::write(&path, "doc_id,title\nkb-1,Bonds\n").unwrap();

        match load_manifest(&path) {
            Err(KbError::MissingColumns { missing, found, .. }) => {
                assert!(missing.contains(&"local_path".to_string()));
                assert!(missing.contains(&"source_url".to_string()));
                assert_eq!(found, vec!["doc_id", "title"]);
            },
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, KbError::ManifestNotFound(_)));
        assert!(err.to_string().contains("absent.csv"));
    }
}
