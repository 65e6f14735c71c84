//! Reflection Agent CLI
//!
//! Runs a single reflection from the terminal or serves the HTTP API.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use reflect_orchestrator::config::ENV_API_KEY;
use reflect_orchestrator::{
    create_router, AppState, Config, OpenAiClient, ReflectionOrchestrator, ReflectionRun,
    StopReason,
};
use reflect_report::{
    json::JsonGenerator, ConsoleSummary, IterationEntry, MarkdownGenerator, ReportStatus,
    RunReport,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Reflection Agent - motivational phrases through self-critique
///
/// Generates a phrase for a theme, critiques it, scores the critique and
/// refines the phrase until the score reaches the quality threshold or the
/// iteration budget runs out.
#[derive(Parser, Debug)]
#[command(name = "reflect-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: reflect.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model used for every step
    #[arg(long, global = true)]
    model: Option<String>,

    /// Maximum number of iterations per run
    #[arg(long, value_name = "N", global = true)]
    max_iterations: Option<u32>,

    /// Early-stop quality threshold in [0, 1]
    #[arg(long, value_name = "SCORE", global = true)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API and web UI
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of static files served at /
        #[arg(long, value_name = "DIR")]
        static_dir: Option<String>,
    },

    /// Run one reflection and print the result
    Run {
        /// Theme for the motivational phrase
        #[arg(value_name = "THEME")]
        theme: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write the output to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config
        .apply_env_overrides()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    apply_cli_overrides(&mut config, &args);

    match args.command {
        Command::Serve {
            host,
            port,
            static_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(static_dir) = static_dir {
                config.server.static_dir = static_dir;
            }
            config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
            serve(config).await
        }
        Command::Run {
            theme,
            format,
            output,
        } => {
            config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
            run_once(&config, &theme, format, output.as_deref()).await
        }
    }
}

/// Loads configuration from an explicit path or from `reflect.json` in the
/// current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Applies the global flags, which take precedence over file and environment.
fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(ref model) = args.model {
        config.model.clone_from(model);
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(threshold) = args.threshold {
        config.quality_threshold = threshold;
    }
}

fn build_orchestrator(config: &Config) -> anyhow::Result<ReflectionOrchestrator> {
    let client = OpenAiClient::from_config(config).map_err(|e| anyhow::anyhow!("{e}"))?;
    ReflectionOrchestrator::from_config(Arc::new(client), config)
        .map_err(|e| anyhow::anyhow!("{e}"))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    if config.api_key.is_none() {
        tracing::warn!("{ENV_API_KEY} is not set; reflect requests will fail until it is set");
    }

    print_config(&config);

    let orchestrator = build_orchestrator(&config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = create_router(AppState::new(orchestrator, config));

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind {addr}: {e}\n\nSuggestion: Choose another port with --port or stop the process using it"
        )
    })?;

    println!();
    println!("Reflection Agent running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, shutting down");
    }
}

async fn run_once(
    config: &Config,
    theme: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if config.api_key.is_none() {
        anyhow::bail!("{ENV_API_KEY} is not set\n\nSuggestion: Export {ENV_API_KEY} with a valid API key and retry");
    }

    if format == OutputFormat::Text && output.is_none() {
        print_config(config);
        println!();
        println!("Input: {theme}");
        println!();
    }

    let orchestrator = build_orchestrator(config)?;
    let run = orchestrator
        .reflect(theme)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let report = build_report(theme, config, &run)?;
    let rendered = match format {
        OutputFormat::Text => ConsoleSummary::new(&report).render(),
        OutputFormat::Json => JsonGenerator::new(&report).generate_pretty()?,
        OutputFormat::Markdown => MarkdownGenerator::new(&report).generate(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

/// Converts a finished run into a report.
fn build_report(theme: &str, config: &Config, run: &ReflectionRun) -> anyhow::Result<RunReport> {
    let entries = run
        .iterations
        .iter()
        .map(|i| IterationEntry::new(i.iteration, &i.response, &i.feedback, i.quality_score))
        .collect();

    let report = RunReport::builder()
        .theme(theme)
        .model(&config.model)
        .settings(config.max_iterations, config.quality_threshold)
        .iterations(entries)
        .status(report_status(run.stop_reason()))
        .build()?;
    Ok(report)
}

const fn report_status(reason: StopReason) -> ReportStatus {
    match reason {
        StopReason::ThresholdMet => ReportStatus::ThresholdMet,
        StopReason::MaxIterations => ReportStatus::MaxIterations,
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Model: {}", config.model);
    println!("  Max iterations: {}", config.max_iterations);
    println!("  Quality threshold: {}", config.quality_threshold);
}
