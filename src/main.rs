//! Command-line entry point for federated literature search.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use litfuse::config::{get_config, load_config};
use litfuse::evidence::StudyType;
use litfuse::models::{SearchRequest, SortBy, SourceId};
use litfuse::pipeline::SearchPipeline;
use litfuse::sources::SourceRegistry;

#[derive(Parser)]
#[command(name = "litfuse", version, about = "Federated biomedical literature search")]
struct Cli {
    /// Path to a TOML config file; env vars are used when omitted
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search all sources and print the fused result list
    Search {
        /// The research question
        query: String,

        /// Sources to query (pubmed, semantic_scholar, openalex, clinical_trials)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Zero-based page index
        #[arg(long, default_value_t = 0)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        per_page: usize,

        /// Earliest publication year
        #[arg(long)]
        year_start: Option<i32>,

        /// Latest publication year
        #[arg(long)]
        year_end: Option<i32>,

        /// Canonical study types to keep (e.g. rct, meta_analysis)
        #[arg(long, value_delimiter = ',')]
        study_types: Vec<String>,

        /// Only records with open access
        #[arg(long)]
        open_access: bool,

        /// Sort order: relevance, citations, year, evidence_level
        #[arg(long, default_value = "relevance")]
        sort: String,

        /// Emit the full response as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => get_config(),
    };

    match cli.command {
        Command::Search {
            query,
            sources,
            page,
            per_page,
            year_start,
            year_end,
            study_types,
            open_access,
            sort,
            json,
        } => {
            let sources = sources
                .iter()
                .map(|s| SourceId::parse(s).with_context(|| format!("unknown source '{}'", s)))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let study_types = study_types
                .iter()
                .map(|s| {
                    StudyType::parse(s).with_context(|| format!("unknown study type '{}'", s))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let sort = match sort.as_str() {
                "relevance" => SortBy::Relevance,
                "citations" => SortBy::Citations,
                "year" => SortBy::Year,
                "evidence_level" | "evidence" => SortBy::EvidenceLevel,
                other => anyhow::bail!("unknown sort order '{}'", other),
            };

            let request = SearchRequest::new(query)
                .sources(sources)
                .page(page)
                .per_page(per_page)
                .years(year_start, year_end)
                .study_types(study_types)
                .open_access_only(open_access)
                .sort(sort);

            let registry = SourceRegistry::from_config(&config);
            let pipeline = SearchPipeline::new(registry, &config);
            let results = pipeline.run(&request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_summary(&results);
            }
        }
    }

    Ok(())
}

fn print_summary(results: &litfuse::models::SearchResults) {
    println!(
        "{} results (total ~{}, page {})",
        results.results.len(),
        results.total,
        results.page
    );
    for (source, count) in &results.source_counts {
        println!("  {}: {}", source.id(), count);
    }
    println!();

    for (i, record) in results.results.iter().enumerate() {
        let rank = results.page * results.per_page + i + 1;
        println!("{:>3}. {} ({})", rank, record.title, record.year);
        println!(
            "     {} | {} | {} citations | sources: {}",
            record.evidence_level.label(),
            record.study_type.as_str(),
            record.citation_count,
            record
                .sources
                .iter()
                .map(|s| s.id())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Some(doi) = &record.doi {
            println!("     doi:{}", doi);
        } else if let Some(nct) = &record.nct_id {
            println!("     {}", nct);
        }
    }
}
