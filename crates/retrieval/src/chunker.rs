//! Paragraph-aware splitting of document text into bounded passages.
//!
//! Paragraphs (blank-line separated) are packed greedily into chunks of at
//! most `chunk_size` characters. A paragraph that alone exceeds the limit is
//! cut into fixed windows that overlap by `overlap` characters.

use std::sync::LazyLock;

use {
    regex::Regex,
    serde::{Deserialize, Serialize},
};

#[allow(clippy::unwrap_used)]
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[allow(clippy::unwrap_used)]
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

const PARAGRAPH_JOIN: &str = "\n\n";

/// A bounded slice of one document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{doc_id}::c{ordinal:03}`
    pub chunk_id: String,
    pub doc_id: String,
    pub ordinal: usize,
    pub text: String,
}

pub fn chunk_id(doc_id: &str, ordinal: usize) -> String {
    format!("{doc_id}::c{ordinal:03}")
}

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// `chunk_size` is raised to at least 1 and `overlap` kept below it.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` and label each piece with `doc_id`.
    pub fn chunk_document(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk {
                chunk_id: chunk_id(doc_id, ordinal),
                doc_id: doc_id.to_string(),
                ordinal,
                text,
            })
            .collect()
    }

    /// Split `text` into ordered passages. Blank input yields nothing.
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = normalize(text);
        if text.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut buf = String::new();
        let mut buf_len = 0usize;

        for para in PARAGRAPH_BREAK.split(&text) {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }
            let para_len = para.chars().count();

            if para_len > self.chunk_size {
                flush(&mut out, &mut buf, &mut buf_len);
                out.extend(self.hard_slice(para));
                continue;
            }

            let joined_len = if buf.is_empty() {
                para_len
            } else {
                buf_len + PARAGRAPH_JOIN.len() + para_len
            };
            if joined_len > self.chunk_size {
                flush(&mut out, &mut buf, &mut buf_len);
                buf.push_str(para);
                buf_len = para_len;
            } else {
                if !buf.is_empty() {
                    buf.push_str(PARAGRAPH_JOIN);
                }
                buf.push_str(para);
                buf_len = joined_len;
            }
        }
        flush(&mut out, &mut buf, &mut buf_len);
        out
    }

    fn hard_slice(&self, para: &str) -> Vec<String> {
        let chars: Vec<char> = para.chars().collect();
        let step = (self.chunk_size - self.overlap).max(1);
        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(chars.len());
            windows.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        windows
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(1400, 200)
    }
}

fn flush(out: &mut Vec<String>, buf: &mut String, buf_len: &mut usize) {
    if !buf.is_empty() {
        out.push(std::mem::take(buf));
    }
    *buf_len = 0;
}

/// Unify line endings, drop code-fence lines (keeping the code), collapse
/// runs of blank lines and trim.
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let kept: Vec<&str> = text
        .split('\n')
        .filter(|line| {
            let line = line.trim_start();
            !(line.starts_with("```") || line.starts_with("~~~"))
        })
        .collect();
    let joined = kept.join("\n");
    EXCESS_NEWLINES
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}
