use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use deepresearch_core::{
    Capabilities, Config, ConfigLoader, ResearchEvent, ResearchWorkflow, SearchProviderKind,
    TelemetryOptions, WorkflowSettings, init_telemetry, metrics::init_metrics_from_env,
    stream_research,
};
use tokio::runtime::Runtime;
use tokio_stream::StreamExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "deepresearch-cli",
    version,
    about = "Iterative plan/search/distill/write/review research from the terminal"
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research task and print the final report.
    Run(RunArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Research task (10 to 2000 characters).
    #[arg(long)]
    task: String,

    /// Override the planner's iteration ceiling.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Override the reviewer's revision ceiling.
    #[arg(long)]
    max_critique_loops: Option<u32>,

    /// Serve searches from the offline mock provider.
    #[arg(long)]
    mock_search: bool,

    /// Print the transition trace after the report.
    #[arg(long, value_enum)]
    explain: Option<ExplainFormat>,

    /// Print the full outcome as JSON instead of the Markdown report.
    #[arg(long)]
    json: bool,

    /// Suppress per-event progress lines on stderr.
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExplainFormat {
    Markdown,
    Mermaid,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.clone())?;

    init_telemetry(TelemetryOptions::from_logging(&config.logging))?;
    init_metrics_from_env("deepresearch-cli")?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(config, args).await,
            Command::Config => print_config(&config),
        }
    })
}

async fn run_command(mut config: Config, args: RunArgs) -> Result<()> {
    if let Some(limit) = args.max_iterations {
        config.workflow.max_iterations = limit.max(1);
    }
    if let Some(limit) = args.max_critique_loops {
        config.workflow.max_critique_loops = limit.max(1);
    }
    if args.mock_search {
        config.search.provider = SearchProviderKind::Mock;
    }

    let capabilities = Capabilities::from_config(&config)?;
    let workflow = Arc::new(ResearchWorkflow::new(
        capabilities,
        WorkflowSettings::from(&config),
    ));

    info!(task = %args.task, "starting research run");
    let mut stream = stream_research(workflow, args.task);
    while let Some(event) = stream.events.next().await {
        if !args.quiet {
            eprintln!("{}", progress_line(&event));
        }
    }

    let outcome = stream
        .handle
        .await
        .context("research task panicked")??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.report);
        println!(
            "\n---\nfacts: {}  sources: {}  iterations: {}  reviews: {}  ({})",
            outcome.facts_count,
            outcome.sources_count,
            outcome.iterations,
            outcome.critique_count,
            outcome.done_reason.as_str()
        );
    }

    if let Some(format) = args.explain {
        let summary = outcome.trace_summary();
        let rendered = match format {
            ExplainFormat::Markdown => summary.render_markdown(),
            ExplainFormat::Mermaid => summary.render_mermaid(),
        };
        println!("\n{rendered}");
    }

    Ok(())
}

fn progress_line(event: &ResearchEvent) -> String {
    let stage = event.stage.map(|stage| stage.as_str()).unwrap_or("run");
    match &event.message {
        Some(message) => format!("[{stage}] {}: {message}", event.kind.as_str()),
        None => format!("[{stage}] {}", event.kind.as_str()),
    }
}

fn print_config(config: &Config) -> Result<()> {
    println!("reasoning model:      {}", config.llm.reasoning_model);
    println!("fast model:           {}", config.llm.fast_model);
    println!("llm endpoint:         {}", config.llm.base_url);
    println!(
        "llm key ({}):  {}",
        config.llm.api_key_env,
        if config.llm_api_key().is_some() { "set" } else { "missing" }
    );
    println!("search mock mode:     {}", config.search_mock_mode());
    println!("max iterations:       {}", config.workflow.max_iterations);
    println!("max critique loops:   {}", config.workflow.max_critique_loops);
    println!("queries per plan:     {}", config.workflow.max_queries_per_plan);
    println!("min relevance score:  {}", config.search.min_relevance_score);
    println!("results per query:    {}", config.search.max_results);
    println!("listen address:       {}", config.server.listen_addr);
    Ok(())
}
