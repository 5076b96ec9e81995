// Ops Reasoner - command line entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ops_reasoner::models::settings::AppConfig;
use ops_reasoner::services::reasoning::{extract_answer, session_summary, Orchestrator};
use ops_reasoner::services::{
    BackendClient, DatadogCollector, DatadogCollectorFactory, LogTracer, SessionRequest,
    SessionRunner,
};
use ops_reasoner::storage::config::ConfigService;
use ops_reasoner::AppError;
use ops_reasoner_core::ReasoningTracer;
use ops_reasoner_llm::{LlmProvider, OpenAIProvider};
use ops_reasoner_rules::RuleEngine;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ops-reasoner",
    version,
    about = "Answer questions about monitored services with an LLM reasoning pipeline"
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// TOML file with threshold overrides
    #[arg(long, global = true)]
    thresholds: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question using the configured Datadog keys
    Ask {
        prompt: String,
        /// Print the session summary as JSON
        #[arg(long)]
        json: bool,
        /// Log step payloads and full issue lists
        #[arg(long)]
        trace: bool,
    },
    /// Answer one turn of a stored conversation for a registered service
    Query {
        #[arg(long)]
        service: String,
        #[arg(long)]
        session: String,
        prompt: String,
        /// Bearer token for the history backend
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        trace: bool,
    },
    /// Check the LLM provider and Datadog keys
    Check,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets masked
    Show,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut service = match &cli.config {
        Some(path) => ConfigService::open(path.clone()),
        None => ConfigService::new(),
    }
    .context("failed to load configuration")?;
    if let Some(path) = cli.thresholds.clone() {
        service.set_thresholds_path(path);
    }
    let config = service.get_config_clone();

    match cli.command {
        Command::Ask {
            prompt,
            json,
            trace,
        } => ask(&config, &prompt, json, trace).await,
        Command::Query {
            service: service_id,
            session,
            prompt,
            token,
            json,
            trace,
        } => {
            let request = SessionRequest {
                service_id,
                session_id: session,
                prompt,
            };
            query(&config, request, token, json, trace).await
        }
        Command::Check => check(&config).await,
        Command::Config { action } => {
            match action {
                ConfigAction::Show => {
                    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
                }
                ConfigAction::Path => println!("{}", service.config_path().display()),
            }
            Ok(())
        }
    }
}

fn rule_engine(config: &AppConfig) -> Result<RuleEngine> {
    match &config.thresholds_path {
        Some(path) => RuleEngine::from_file(path)
            .with_context(|| format!("failed to load thresholds from {}", path.display())),
        None => Ok(RuleEngine::new()),
    }
}

fn llm_provider(config: &AppConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider =
        OpenAIProvider::new(config.llm.clone()).context("failed to create LLM provider")?;
    Ok(Arc::new(provider))
}

fn tracer(verbose: bool) -> Arc<LogTracer> {
    Arc::new(if verbose {
        LogTracer::verbose()
    } else {
        LogTracer::new()
    })
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

async fn ask(config: &AppConfig, prompt: &str, json: bool, verbose: bool) -> Result<()> {
    let collector = DatadogCollector::new(&config.datadog, config.proxy.as_ref())
        .context("Datadog is not configured (set DD_API_KEY and DD_APP_KEY)")?;
    let tracer = tracer(verbose);
    let orchestrator = Orchestrator::new(
        llm_provider(config)?,
        Arc::new(collector),
        rule_engine(config)?,
        tracer.clone(),
        config.pipeline.clone(),
    );

    let result = orchestrator
        .process_with_cancel(prompt, &shutdown_token())
        .await;
    tracer.flush();
    let state = match result {
        Ok(state) => state,
        Err(AppError::Cancelled) => bail!("cancelled"),
        Err(e) => return Err(e.into()),
    };

    if json {
        let output = serde_json::json!({
            "answer": extract_answer(&state),
            "summary": session_summary(&state),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", extract_answer(&state));
        for error in state.error_messages() {
            eprintln!("warning: {}", error);
        }
    }
    Ok(())
}

async fn query(
    config: &AppConfig,
    request: SessionRequest,
    token: Option<String>,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let backend = BackendClient::new(&config.backend, config.proxy.as_ref(), token)
        .context("failed to create backend client")?;
    let tracer = tracer(verbose);
    let runner = SessionRunner::new(
        Arc::new(backend),
        Arc::new(DatadogCollectorFactory::new(
            config.datadog.clone(),
            config.proxy.clone(),
        )),
        llm_provider(config)?,
        tracer.clone(),
        rule_engine(config)?,
        config.pipeline.clone(),
    );

    let result = runner.run_with_cancel(request, &shutdown_token()).await;
    tracer.flush();
    let outcome = result.context("session failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.answer);
        for error in &outcome.errors {
            eprintln!("warning: {}", error);
        }
    }
    Ok(())
}

async fn check(config: &AppConfig) -> Result<()> {
    let mut failed = false;

    match llm_provider(config) {
        Ok(provider) => match provider.health_check().await {
            Ok(()) => println!("llm      ok ({} / {})", provider.name(), provider.model()),
            Err(e) => {
                failed = true;
                println!("llm      FAILED: {}", e);
            }
        },
        Err(e) => {
            failed = true;
            println!("llm      FAILED: {:#}", e);
        }
    }

    match DatadogCollector::new(&config.datadog, config.proxy.as_ref()) {
        Ok(collector) => match collector.validate().await {
            Ok(true) => println!("datadog  ok"),
            Ok(false) => {
                failed = true;
                println!("datadog  FAILED: API key rejected");
            }
            Err(e) => {
                failed = true;
                println!("datadog  FAILED: {}", e);
            }
        },
        Err(e) => {
            failed = true;
            println!("datadog  FAILED: {}", e);
        }
    }

    match rule_engine(config) {
        Ok(engine) => println!(
            "rules    ok ({} performance thresholds)",
            engine.thresholds().performance.len()
        ),
        Err(e) => {
            failed = true;
            println!("rules    FAILED: {:#}", e);
        }
    }

    if failed {
        bail!("one or more checks failed");
    }
    Ok(())
}
