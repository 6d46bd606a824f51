//! On-disk index layout.
//!
//! An index directory holds four files:
//! - `embeddings.f32`: row-major little-endian f32 matrix, one unit row per chunk
//! - `embeddings.q8`: optional int8 copy (see [`crate::quantize`])
//! - `meta.jsonl`: one [`ChunkRecord`] per line, same order as the matrix rows
//! - `index_meta.json`: [`IndexMeta`]
//!
//! Writes go to a sibling staging directory that is renamed into place, so a
//! reader never observes a half-written index.

use std::{
    fs,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    error::{Result, RetrievalError},
    quantize::QuantizedMatrix,
};

pub const EMBEDDINGS_FILE: &str = "embeddings.f32";
pub const QUANTIZED_FILE: &str = "embeddings.q8";
pub const CHUNKS_FILE: &str = "meta.jsonl";
pub const INDEX_META_FILE: &str = "index_meta.json";

/// Index-level metadata written next to the matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub embedder_name: String,
    pub dim: usize,
    /// ISO-8601 UTC build time.
    pub created_at: String,
    pub chunk_size_chars: usize,
    pub overlap_chars: usize,
    pub total_chunks: usize,
}

/// Citation metadata for one matrix row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub chunk_id: String,
    pub title: String,
    pub category: String,
    pub sub_category: String,
    pub url: String,
    pub local_path: String,
    pub text: String,
}

/// Dense row-major matrix of equal-length vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(RetrievalError::Corrupt(format!(
                "{} values do not form rows of dimension {dim}",
                data.len()
            )));
        }
        Ok(Self { dim, data })
    }

    pub fn from_rows(dim: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(RetrievalError::Corrupt(format!(
                    "row {i} has dimension {}, expected {dim}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Self::new(dim, data)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dim
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|x| x.to_le_bytes()).collect()
    }

    fn from_le_bytes(dim: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(RetrievalError::Corrupt(format!(
                "{EMBEDDINGS_FILE} length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Self::new(dim, data)
    }
}

/// Everything read back from an index directory.
#[derive(Debug)]
pub struct StoredIndex {
    pub meta: IndexMeta,
    pub records: Vec<ChunkRecord>,
    pub matrix: EmbeddingMatrix,
    pub quantized: Option<QuantizedMatrix>,
}

/// True when the matrix and both metadata files are present.
pub fn index_exists(dir: &Path) -> bool {
    [EMBEDDINGS_FILE, CHUNKS_FILE, INDEX_META_FILE]
        .iter()
        .all(|f| dir.join(f).is_file())
}

pub fn read_index_meta(dir: &Path) -> Result<IndexMeta> {
    let path = dir.join(INDEX_META_FILE);
    if !path.is_file() {
        return Err(RetrievalError::IndexNotFound {
            dir: dir.to_path_buf(),
        });
    }
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

pub fn read_index(dir: &Path) -> Result<StoredIndex> {
    if !index_exists(dir) {
        return Err(RetrievalError::IndexNotFound {
            dir: dir.to_path_buf(),
        });
    }

    let meta = read_index_meta(dir)?;
    let records = read_records(&dir.join(CHUNKS_FILE))?;
    let matrix = EmbeddingMatrix::from_le_bytes(meta.dim, &fs::read(dir.join(EMBEDDINGS_FILE))?)?;

    if matrix.rows() != records.len() {
        return Err(RetrievalError::Corrupt(format!(
            "matrix has {} rows but {CHUNKS_FILE} has {} records",
            matrix.rows(),
            records.len()
        )));
    }
    if records.len() != meta.total_chunks {
        return Err(RetrievalError::Corrupt(format!(
            "{INDEX_META_FILE} declares {} chunks but {} were found",
            meta.total_chunks,
            records.len()
        )));
    }

    let quantized = read_quantized(dir, matrix.rows(), meta.dim);
    debug!(
        dir = %dir.display(),
        chunks = records.len(),
        dim = meta.dim,
        quantized = quantized.is_some(),
        "read index"
    );
    Ok(StoredIndex {
        meta,
        records,
        matrix,
        quantized,
    })
}

/// The int8 copy is an accelerator only; a bad or missing one falls back to
/// the exact scan.
fn read_quantized(dir: &Path, rows: usize, dim: usize) -> Option<QuantizedMatrix> {
    let path = dir.join(QUANTIZED_FILE);
    if !path.is_file() {
        return None;
    }
    match fs::read(&path)
        .map_err(RetrievalError::from)
        .and_then(|bytes| QuantizedMatrix::from_bytes(&bytes, rows, dim))
    {
        Ok(q) => Some(q),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable quantized matrix");
            None
        },
    }
}

fn read_records(path: &Path) -> Result<Vec<ChunkRecord>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

/// Check that `dir` may be (re)written as an index: it is absent, an empty
/// directory, or a directory that already holds an index.
pub fn check_index_target(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let replaceable = dir.is_dir()
        && (dir.join(INDEX_META_FILE).is_file() || fs::read_dir(dir)?.next().is_none());
    if replaceable {
        Ok(())
    } else {
        Err(RetrievalError::NotAnIndexDir {
            dir: dir.to_path_buf(),
        })
    }
}

/// Write a complete index to `dir`, replacing any existing one.
///
/// Fails with [`RetrievalError::NotAnIndexDir`] rather than replace a
/// directory with other content.
pub fn write_index(
    dir: &Path,
    meta: &IndexMeta,
    records: &[ChunkRecord],
    matrix: &EmbeddingMatrix,
    quantized: Option<&QuantizedMatrix>,
) -> Result<()> {
    if records.len() != matrix.rows() || meta.total_chunks != records.len() {
        return Err(RetrievalError::Corrupt(format!(
            "refusing to write {} records against {} matrix rows",
            records.len(),
            matrix.rows()
        )));
    }

    check_index_target(dir)?;

    let (parent, name) = split_dir(dir);
    fs::create_dir_all(&parent)?;
    let staging = parent.join(format!(".{name}.tmp-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&staging)?;

    if let Err(e) = write_files(&staging, meta, records, matrix, quantized) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    if let Err(e) = swap_into_place(&staging, dir, &parent, &name) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }
    debug!(dir = %dir.display(), chunks = records.len(), "wrote index");
    Ok(())
}

fn write_files(
    dir: &Path,
    meta: &IndexMeta,
    records: &[ChunkRecord],
    matrix: &EmbeddingMatrix,
    quantized: Option<&QuantizedMatrix>,
) -> Result<()> {
    fs::write(dir.join(EMBEDDINGS_FILE), matrix.to_le_bytes())?;
    if let Some(q) = quantized {
        fs::write(dir.join(QUANTIZED_FILE), q.to_bytes())?;
    }

    let mut out = BufWriter::new(fs::File::create(dir.join(CHUNKS_FILE))?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    fs::write(dir.join(INDEX_META_FILE), serde_json::to_vec_pretty(meta)?)?;
    Ok(())
}

fn swap_into_place(staging: &Path, dir: &Path, parent: &Path, name: &str) -> Result<()> {
    if !dir.exists() {
        fs::rename(staging, dir)?;
        return Ok(());
    }

    let old = parent.join(format!(".{name}.old-{}", uuid::Uuid::new_v4()));
    fs::rename(dir, &old)?;
    if let Err(e) = fs::rename(staging, dir) {
        let _ = fs::rename(&old, dir);
        return Err(e.into());
    }
    if let Err(e) = fs::remove_dir_all(&old) {
        warn!(path = %old.display(), error = %e, "failed to remove previous index");
    }
    Ok(())
}

fn split_dir(dir: &Path) -> (PathBuf, String) {
    let parent = dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".into());
    (parent, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: usize) -> ChunkRecord {
        ChunkRecord {
            doc_id: format!("kb-{i}"),
            chunk_id: format!("kb-{i}::c000"),
            title: format!("Doc {i}"),
            category: "stocks".into(),
            sub_category: "basics".into(),
            url: "https://example.com".into(),
            local_path: format!("docs/kb-{i}.md"),
            text: format!("text {i}"),
        }
    }

    fn sample() -> (IndexMeta, Vec<ChunkRecord>, EmbeddingMatrix) {
        let matrix = EmbeddingMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let meta = IndexMeta {
            embedder_name: "hash".into(),
            dim: 2,
            created_at: "2025-01-01T00:00:00Z".into(),
            chunk_size_chars: 1400,
            overlap_chars: 200,
            total_chunks: 2,
        };
        (meta, vec![record(0), record(1)], matrix)
    }

    #[test]
    fn writes_and_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");
        let (meta, records, matrix) = sample();
        let q = QuantizedMatrix::quantize(&matrix);

        write_index(&dir, &meta, &records, &matrix, Some(&q)).unwrap();
        assert!(index_exists(&dir));

        let stored = read_index(&dir).unwrap();
        assert_eq!(stored.meta, meta);
        assert_eq!(stored.records, records);
        assert_eq!(stored.matrix, matrix);
        assert_eq!(stored.quantized, Some(q));
    }

    #[test]
    fn rewrite_replaces_and_leaves_no_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");
        let (mut meta, records, matrix) = sample();
        write_index(&dir, &meta, &records, &matrix, None).unwrap();

        meta.created_at = "2026-01-01T00:00:00Z".into();
        write_index(&dir, &meta, &records, &matrix, None).unwrap();

        assert_eq!(read_index_meta(&dir).unwrap().created_at, "2026-01-01T00:00:00Z");
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(!dir.join(QUANTIZED_FILE).exists());
    }

    #[test]
    fn refuses_to_replace_foreign_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("kb");
        fs::create_dir_all(dir.join("docs")).unwrap();
        fs::write(dir.join("notes.txt"), "keep me").unwrap();
        fs::write(dir.join("docs/a.md"), "# A").unwrap();
        let (meta, records, matrix) = sample();

        let err = write_index(&dir, &meta, &records, &matrix, None).unwrap_err();
        assert!(matches!(err, RetrievalError::NotAnIndexDir { .. }));
        assert_eq!(fs::read_to_string(dir.join("notes.txt")).unwrap(), "keep me");
        assert!(dir.join("docs/a.md").is_file());
        // Nothing staged is left behind either.
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);

        let file = tmp.path().join("index.bin");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            check_index_target(&file),
            Err(RetrievalError::NotAnIndexDir { .. })
        ));
    }

    #[test]
    fn empty_directory_can_become_an_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");
        fs::create_dir_all(&dir).unwrap();
        let (meta, records, matrix) = sample();

        write_index(&dir, &meta, &records, &matrix, None).unwrap();
        assert!(index_exists(&dir));
    }

    #[test]
    fn missing_files_are_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_index(tmp.path()).unwrap_err();
        assert!(err.is_not_ready());
    }

    #[test]
    fn row_count_mismatch_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");
        let (meta, records, matrix) = sample();
        write_index(&dir, &meta, &records, &matrix, None).unwrap();

        let mut lines = fs::read_to_string(dir.join(CHUNKS_FILE)).unwrap();
        lines.push_str(&serde_json::to_string(&record(2)).unwrap());
        fs::write(dir.join(CHUNKS_FILE), lines).unwrap();

        assert!(matches!(read_index(&dir), Err(RetrievalError::Corrupt(_))));
    }

    #[test]
    fn bad_quantized_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");
        let (meta, records, matrix) = sample();
        write_index(&dir, &meta, &records, &matrix, None).unwrap();
        fs::write(dir.join(QUANTIZED_FILE), b"junk").unwrap();

        assert!(read_index(&dir).unwrap().quantized.is_none());
    }

    #[test]
    fn mismatched_rows_are_rejected() {
        assert!(EmbeddingMatrix::from_rows(3, vec![vec![1.0, 0.0]]).is_err());
        let (meta, records, matrix) = sample();
        let tmp = tempfile::tempdir().unwrap();
        assert!(write_index(tmp.path(), &meta, &records[..1], &matrix, None).is_err());
    }
}
