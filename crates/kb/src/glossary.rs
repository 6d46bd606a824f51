use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{error::KbError, manifest::read_csv};

const REQUIRED_GLOSSARY_COLUMNS: &[&str] = &["term", "definition", "category", "examples"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub examples: String,
}

pub fn load_glossary(path: &Path) -> Result<Vec<GlossaryTerm>, KbError> {
    if !path.is_file() {
        return Err(KbError::GlossaryNotFound(path.to_path_buf()));
    }
    read_csv(path, "glossary", REQUIRED_GLOSSARY_COLUMNS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_terms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glossary.csv");
        std::fs::write(
            &path,
            "term,definition,category,examples\nETF,\"A fund traded on an exchange, like a stock\",funds,SPY\n",
        )
        .unwrap();

        let terms = load_glossary(&path).unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].definition, "A fund traded on an exchange, like a stock");
    }

    #[test]
    fn rejects_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glossary.csv");
        std::fs::write(&path, "term,definition\nETF,fund\n").unwrap();
        assert!(matches!(
            load_glossary(&path),
            Err(KbError::MissingColumns { kind: "glossary", .. })
        ));
    }
}
