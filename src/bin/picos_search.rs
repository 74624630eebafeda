//! picos-search CLI. Each subcommand runs one pipeline stage and persists
//! the run to a session file, so stages can be driven one invocation at a time.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use picos_search::{BibliographicRecord, MatchMode, PicosConfig, PipelineState, QueryPipeline};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// PICOS literature search: topic -> MeSH-normalized boolean query -> PubMed records
#[derive(Parser, Debug)]
#[command(name = "picos-search", version, about, long_about = None)]
struct Cli {
    /// Session file holding the pipeline state between invocations
    #[arg(short, long, global = true, default_value = "picos-session.json")]
    session: PathBuf,

    /// Configuration file path (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a new run: extract PICOS elements from a research topic
    Extract {
        topic: String,
    },
    /// Resolve extracted phrases to MeSH terms (with synonym fallback)
    Resolve,
    /// Build the boolean search expression
    Synthesize,
    /// Run the expression against PubMed
    Search {
        #[arg(short, long)]
        max_results: Option<usize>,
    },
    /// All stages for one topic
    Run {
        topic: String,
    },
    /// Continue the saved session through its remaining stages
    Resume,
    /// Print the current session
    Status,
    /// Look up MeSH descriptors for a single phrase
    Mesh {
        phrase: String,
        /// exact, contains or startswith
        #[arg(short, long)]
        match_mode: Option<MatchMode>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let crate_level = if verbose { "picos_search=debug" } else { "picos_search=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("warn".parse()?)
                .add_directive(crate_level.parse()?),
        )
        .init();
    Ok(())
}

fn load_session(path: &Path) -> anyhow::Result<PipelineState> {
    PipelineState::load(path).with_context(|| {
        format!(
            "No usable session at {}; start one with `picos-search extract <topic>`",
            path.display()
        )
    })
}

fn print_records(records: &[BibliographicRecord]) {
    if records.is_empty() {
        println!("No records matched the expression.");
        return;
    }
    for (idx, record) in records.iter().enumerate() {
        println!("{}. {}", idx + 1, record.title);
        println!("   {} ({})", record.author_line(), record.year);
        println!("   {} | PMID {}", record.journal, record.pmid);
    }
}

/// Saves the session whether or not every stage succeeded.
async fn run_and_save(
    pipeline: &QueryPipeline,
    state: &mut PipelineState,
    session: &Path,
) -> anyhow::Result<()> {
    let outcome = pipeline.run(state).await;
    state.save(session)?;
    outcome.with_context(|| {
        format!(
            "Run stopped at stage {}; progress saved to {}, continue with `picos-search resume`",
            state.stage(),
            session.display()
        )
    })?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    if let Commands::Status = cli.command {
        let state = load_session(&cli.session)?;
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let config = PicosConfig::load(cli.config.as_deref())?;
    let pipeline = QueryPipeline::from_config(&config)?;

    match cli.command {
        Commands::Extract { topic } => {
            let mut state = PipelineState::new(topic);
            pipeline.extract(&mut state).await?;
            state.save(&cli.session)?;
            if let Some(phrases) = state.phrases() {
                for (category, list) in phrases.iter() {
                    println!("{} ({}): {}", category.label(), category.tag(), list.join("; "));
                }
            }
        }
        Commands::Resolve => {
            let mut state = load_session(&cli.session)?;
            pipeline.resolve(&mut state).await?;
            state.save(&cli.session)?;
            println!("{}", serde_json::to_string_pretty(&state.terms())?);
        }
        Commands::Synthesize => {
            let mut state = load_session(&cli.session)?;
            let expression = pipeline.synthesize(&mut state).await?;
            state.save(&cli.session)?;
            println!("{expression}");
        }
        Commands::Search { max_results } => {
            let mut state = load_session(&cli.session)?;
            pipeline.search(&mut state, max_results).await?;
            state.save(&cli.session)?;
            print_records(state.records().unwrap_or_default());
        }
        Commands::Run { topic } => {
            let mut state = PipelineState::new(topic);
            run_and_save(&pipeline, &mut state, &cli.session).await?;
            println!("{}\n", state.expression().unwrap_or_default());
            print_records(state.records().unwrap_or_default());
        }
        Commands::Resume => {
            let mut state = load_session(&cli.session)?;
            run_and_save(&pipeline, &mut state, &cli.session).await?;
            println!("{}\n", state.expression().unwrap_or_default());
            print_records(state.records().unwrap_or_default());
        }
        Commands::Mesh {
            phrase,
            match_mode,
            limit,
        } => {
            let labels = pipeline
                .resolver()
                .resolve(
                    &phrase,
                    match_mode.unwrap_or(config.mesh_match_mode),
                    limit.unwrap_or(config.mesh_limit),
                )
                .await?;
            if labels.is_empty() {
                println!("No MeSH descriptors matched '{phrase}'.");
            }
            for label in labels {
                println!("{label}");
            }
        }
        Commands::Status => {}
    }

    Ok(())
}
