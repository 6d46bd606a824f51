use std::{path::PathBuf, process::ExitCode};

use {
    anyhow::Result,
    clap::Subcommand,
    finrag_config::FinragConfig,
    finrag_kb::{ValidateOptions, ValidationIssue, ValidationReport, validate_kb},
    finrag_retrieval::{
        BuildOptions, IndexBuilder, RetrievalResult, RetrieveOptions, Retriever,
        provider_from_config,
    },
};

#[derive(Subcommand)]
pub enum KbAction {
    /// Build the vector index from the knowledge-base manifest.
    Build {
        /// Rebuild even if a complete index exists.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(long)]
        docs_dir: Option<PathBuf>,
        #[arg(long)]
        index_dir: Option<PathBuf>,
        #[arg(long)]
        chunk_size_chars: Option<usize>,
        #[arg(long)]
        overlap_chars: Option<usize>,
        /// Skip writing the int8 copy of the matrix.
        #[arg(long)]
        no_quantize: bool,
    },
    /// Query the index and print ranked chunks.
    Query {
        /// Question text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        #[arg(long)]
        top_k: Option<usize>,
        /// Disable MMR diversity re-ranking.
        #[arg(long)]
        no_mmr: bool,
        #[arg(long)]
        mmr_lambda: Option<f32>,
        #[arg(long)]
        min_score: Option<f32>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        index_dir: Option<PathBuf>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check the knowledge base for completeness.
    Validate {
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(long)]
        docs_dir: Option<PathBuf>,
        #[arg(long)]
        glossary: Option<PathBuf>,
        #[arg(long, default_value_t = 50)]
        min_docs: usize,
        #[arg(long, default_value_t = 50)]
        min_terms: usize,
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_kb(action: KbAction, config: &FinragConfig) -> Result<ExitCode> {
    match action {
        KbAction::Build {
            force,
            manifest,
            docs_dir,
            index_dir,
            chunk_size_chars,
            overlap_chars,
            no_quantize,
        } => {
            let mut options = BuildOptions::from_config(&config.rag);
            options.force = force;
            options.quantize &= !no_quantize;
            if let Some(size) = chunk_size_chars {
                options.chunk_size_chars = size;
            }
            if let Some(overlap) = overlap_chars {
                options.overlap_chars = overlap;
            }
            let paths = &config.paths;
            build(
                options,
                config,
                manifest.unwrap_or_else(|| paths.kb_manifest.clone()),
                docs_dir.unwrap_or_else(|| paths.kb_docs_dir.clone()),
                index_dir.unwrap_or_else(|| paths.kb_index_dir.clone()),
            )
            .await
        },
        KbAction::Query {
            query,
            top_k,
            no_mmr,
            mmr_lambda,
            min_score,
            category,
            index_dir,
            json,
        } => {
            let mut opts = RetrieveOptions::from_config(&config.rag);
            opts.use_mmr &= !no_mmr;
            if let Some(k) = top_k {
                opts.top_k = k;
            }
            if let Some(lambda) = mmr_lambda {
                opts.mmr_lambda = lambda;
            }
            if let Some(score) = min_score {
                opts.min_score = score;
            }
            opts.category = category;
            let index_dir = index_dir.unwrap_or_else(|| config.paths.kb_index_dir.clone());
            run_query(&query.join(" "), &opts, config, index_dir, json).await
        },
        KbAction::Validate {
            manifest,
            docs_dir,
            glossary,
            min_docs,
            min_terms,
            json,
        } => {
            let paths = &config.paths;
            let report = validate_kb(
                manifest.as_deref().unwrap_or(&paths.kb_manifest),
                docs_dir.as_deref().unwrap_or(&paths.kb_docs_dir),
                glossary.as_deref().unwrap_or(&paths.kb_glossary),
                ValidateOptions {
                    min_docs,
                    min_terms,
                },
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_report(&report));
            }
            Ok(if report.ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        },
    }
}

async fn build(
    options: BuildOptions,
    config: &FinragConfig,
    manifest: PathBuf,
    docs_dir: PathBuf,
    index_dir: PathBuf,
) -> Result<ExitCode> {
    let embedder = provider_from_config(&config.embedder)?;
    let report = IndexBuilder::new(embedder, options)
        .build(&manifest, &docs_dir, &index_dir)
        .await?;

    if report.skipped {
        println!(
            "Index already exists at {} ({} chunks). Use --force to rebuild.",
            report.index_dir.display(),
            report.total_chunks
        );
    } else {
        println!(
            "Indexed {} chunks from {} documents into {}",
            report.total_chunks,
            report.documents_indexed,
            report.index_dir.display()
        );
        if !report.missing_documents.is_empty() {
            println!("Missing documents: {}", report.missing_documents.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_query(
    query: &str,
    opts: &RetrieveOptions,
    config: &FinragConfig,
    index_dir: PathBuf,
    json: bool,
) -> Result<ExitCode> {
    let embedder = provider_from_config(&config.embedder)?;
    let retriever = Retriever::new(index_dir, embedder);

    let result = match retriever.retrieve(query, opts).await {
        Ok(result) => result,
        Err(e) if e.is_not_ready() => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        },
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_result(&result));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_result(result: &RetrievalResult) -> String {
    let mut out = format!("Query: {}\n", result.query);
    if result.chunks.is_empty() {
        out.push_str("No matching chunks.\n");
    }
    for c in &result.chunks {
        out.push_str(&format!(
            "- [{:.3}] {} ({}) -> {}\n  {}\n",
            c.score, c.title, c.doc_id, c.url, c.snippet
        ));
    }
    out
}

fn render_report(report: &ValidationReport) -> String {
    let line = |tag: &str, issue: &ValidationIssue| {
        format!(
            "{tag}: {} ({})\n",
            issue.message,
            issue.location.as_deref().unwrap_or("")
        )
    };

    let mut out = String::new();
    if report.errors.is_empty() {
        out.push_str("KB validation OK (no errors)\n");
    } else {
        out.push_str("KB validation FAILED\n");
        out.extend(report.errors.iter().map(|e| line("ERROR", e)));
    }
    out.extend(report.warnings.iter().map(|w| line("WARN", w)));
    out.extend(report.infos.iter().map(|i| line("INFO", i)));
    out
}
