use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    schema::{EmbedderProvider, FinragConfig},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "finrag.toml",
    "finrag.yaml",
    "finrag.yml",
    "finrag.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<FinragConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Resolve the effective configuration.
///
/// An explicit path must load successfully. Otherwise the first
/// `finrag.{toml,yaml,yml,json}` in the working directory is used, falling
/// back to defaults when it is absent or unreadable. Environment overrides
/// are applied last.
pub fn discover_and_load(explicit: Option<&Path>) -> anyhow::Result<FinragConfig> {
    let mut config = match explicit {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => match find_config_file(Path::new(".")) {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                load_config(&path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                    FinragConfig::default()
                })
            },
            None => {
                debug!("no config file found, using defaults");
                FinragConfig::default()
            },
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Find the first config file in `dir`.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Apply environment overrides using `lookup`. Empty values count as unset.
pub fn apply_env_overrides(config: &mut FinragConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("LOG_LEVEL") {
        config.app.log_level = v;
    }
    if let Some(v) = get("KB_MANIFEST") {
        config.paths.kb_manifest = PathBuf::from(v);
    }
    if let Some(v) = get("KB_DOCS_DIR") {
        config.paths.kb_docs_dir = PathBuf::from(v);
    }
    if let Some(v) = get("KB_GLOSSARY") {
        config.paths.kb_glossary = PathBuf::from(v);
    }
    if let Some(v) = get("KB_INDEX_DIR") {
        config.paths.kb_index_dir = PathBuf::from(v);
    }
    if let Some(v) = get("RAG_TOP_K") {
        override_parsed("RAG_TOP_K", &v, &mut config.rag.top_k);
    }
    if let Some(v) = get("RAG_USE_MMR") {
        config.rag.use_mmr = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some(v) = get("RAG_MIN_SCORE") {
        override_parsed("RAG_MIN_SCORE", &v, &mut config.rag.min_score);
    }
    if let Some(v) = get("RAG_EMBEDDER") {
        match EmbedderProvider::parse(&v) {
            Some(provider) => config.embedder.provider = provider,
            None => warn!(value = %v, "unknown RAG_EMBEDDER, keeping configured embedder"),
        }
    }
    if config.embedder.api_key.is_none()
        && let Some(v) = get("OPENAI_API_KEY")
    {
        config.embedder.api_key = Some(Secret::new(v));
    }
}

fn override_parsed<T: FromStr>(key: &str, raw: &str, slot: &mut T) {
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value = raw, "ignoring unparseable override"),
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<FinragConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
