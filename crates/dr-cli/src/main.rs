use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dr_core::{ProviderGenerator, StructuredGenerator};
use dr_providers::OpenAIProvider;
use dr_research::{
    combine_feedback, FeedbackGenerator, ResearchConfig, ResearchEngine, ResearchRequest, Reporter,
};
use dr_sources::{
    ContentSource, FirecrawlConfig, FirecrawlProvider, HybridSource, RetrieverConfig,
    SubprocessRetriever,
};

mod interactive;
mod output;

/// Clarifying questions asked before a report run.
const FEEDBACK_QUESTIONS: usize = 3;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every request and subprocess detail
    Trace,
    /// Verbose: prompt sizes, fetched hits, retriever stderr
    Debug,
    /// Standard: queries planned, recursion steps, learnings created
    Info,
    /// Quiet: only warnings (failed sources and branches) and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What to write once research is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Long-form markdown report with a sources section
    Report,
    /// Short direct answer
    Answer,
}

#[derive(Parser)]
#[command(name = "deep-research")]
#[command(author, version, about = "Recursive web and local-document research", long_about = None)]
pub struct Cli {
    /// Research topic; asked for on stdin when omitted
    #[arg(short, long)]
    pub query: Option<String>,

    /// Queries planned at the top level
    #[arg(short, long, default_value_t = 4)]
    pub breadth: usize,

    /// Levels of follow-up research
    #[arg(short, long, default_value_t = 2)]
    pub depth: usize,

    #[arg(short, long, value_enum, default_value = "report")]
    pub mode: Mode,

    /// Directory the report or answer is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Skip clarifying questions
    #[arg(long)]
    pub no_feedback: bool,

    /// Config file (default: ~/.config/deep-research/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Shorthand for --log-level debug
    #[arg(long)]
    pub debug: bool,

    /// Write logs as JSON lines to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = ResearchConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    run(&cli, &config).await
}

fn init_logging(cli: &Cli) -> Result<()> {
    // --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };
    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn build_generator(config: &ResearchConfig) -> Arc<dyn StructuredGenerator> {
    let provider = OpenAIProvider::new(config.openai_key.as_str())
        .with_base_url(config.openai_base_url.as_str())
        .with_default_model(config.model.as_str());
    Arc::new(ProviderGenerator::new(Arc::new(provider)).with_model(config.model.as_str()))
}

fn build_source(config: &ResearchConfig) -> Arc<dyn ContentSource> {
    let web = FirecrawlProvider::new(
        FirecrawlConfig::new(config.firecrawl_key.as_str())
            .with_base_url(config.firecrawl_base_url.as_str())
            .with_timeout(config.firecrawl_timeout()),
    );
    let internal = SubprocessRetriever::new(RetrieverConfig::new(
        config.retriever_python.as_str(),
        config.retriever_script_path(),
    ));
    Arc::new(HybridSource::new(Arc::new(web), Arc::new(internal)))
}

async fn run(cli: &Cli, config: &ResearchConfig) -> Result<()> {
    let query = match &cli.query {
        Some(query) => query.clone(),
        None => interactive::ask("What would you like to research?")?,
    };
    if query.trim().is_empty() {
        bail!("No research query given");
    }

    let generator = build_generator(config);

    // Clarifying questions only make sense for reports and a live terminal
    let topic = if cli.mode == Mode::Report && !cli.no_feedback && atty::is(atty::Stream::Stdin) {
        let questions = FeedbackGenerator::new(generator.clone(), config.language)
            .generate_feedback(&query, FEEDBACK_QUESTIONS)
            .await
            .context("Failed to generate follow-up questions")?;
        if !questions.is_empty() {
            println!("\nTo better understand your research needs, please answer these follow-up questions:");
        }
        let answered = interactive::answer_all(&questions)?;
        combine_feedback(&query, &answered)
    } else {
        query
    };

    info!(breadth = cli.breadth, depth = cli.depth, "Starting research");
    eprintln!("\nStarting research...\n");

    let engine = ResearchEngine::new(generator.clone(), build_source(config), config);
    let result = engine
        .research(
            ResearchRequest::new(topic.as_str(), cli.breadth, cli.depth),
            Some(output::progress_printer()),
        )
        .await
        .context("Research failed")?;

    eprintln!("\n\nLearnings:\n\n{}", result.learnings.join("\n"));
    eprintln!(
        "\nVisited URLs ({}):\n\n{}",
        result.visited_urls.len(),
        result.visited_urls.join("\n")
    );

    let reporter = Reporter::new(generator, config.language);
    let (file_name, content) = match cli.mode {
        Mode::Report => {
            eprintln!("\nWriting final report...");
            let report = reporter
                .write_final_report(&topic, &result.learnings, &result.visited_urls)
                .await
                .context("Failed to write final report")?;
            ("report.md", report)
        }
        Mode::Answer => {
            let answer = reporter
                .write_final_answer(&topic, &result.learnings)
                .await
                .context("Failed to write final answer")?;
            ("answer.md", answer)
        }
    };

    let path = output::write_output(&cli.output, file_name, &content)?;
    match cli.mode {
        Mode::Report => println!("\n\nFinal Report:\n\n{}", content),
        Mode::Answer => println!("\n\nFinal Answer:\n\n{}", content),
    }
    println!("\nSaved to {}", path.display());
    Ok(())
}
