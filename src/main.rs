//! neo4j-chat - ask questions about a Neo4j graph in natural language

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neo4j_chat::{api, AppState, Config, PipelineError};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "neo4j-chat")]
#[command(about = "Natural-language questions over a Neo4j graph")]
struct Cli {
    /// Path to a YAML config file (defaults to ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question
    Ask {
        question: String,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the validated Cypher for a question without running it
    Cypher { question: String },

    /// Print the graph schema as the translator sees it
    Schema {
        /// Bypass the cache
        #[arg(long)]
        refresh: bool,
    },

    /// Verify database credentials and schema access
    Check,

    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr so answers on stdout stay pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,neo4j_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask { question, json } => run_ask(config, &question, json).await,
        Commands::Cypher { question } => run_cypher(config, &question).await,
        Commands::Schema { refresh } => run_schema(config, refresh).await,
        Commands::Check => run_check(config).await,
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            run_server(config).await
        }
    }
}

/// Pipeline failures are printed as `{kind, message}` and end the process
/// with a non-zero status.
fn report(err: PipelineError) -> anyhow::Error {
    match serde_json::to_string_pretty(&err.to_response()) {
        Ok(body) => eprintln!("{body}"),
        Err(_) => eprintln!("{}: {}", err.kind(), err),
    }
    anyhow::Error::new(err)
}

async fn run_ask(config: Config, question: &str, json: bool) -> Result<()> {
    let state = AppState::new(config).await?;
    let response = state.pipeline.ask(question).await.map_err(report)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.summary);
    println!();
    println!("Cypher: {}", response.cypher);
    println!(
        "Rows: {}{}",
        response.rows.len(),
        if response.truncated { " (truncated)" } else { "" }
    );
    if response.degraded {
        println!("Note: summary generated without the language model");
    }
    if response.schema_stale {
        println!("Note: schema could not be refreshed, a cached copy was used");
    }
    Ok(())
}

async fn run_cypher(config: Config, question: &str) -> Result<()> {
    let state = AppState::new(config).await?;
    let response = state.pipeline.translate_only(question).await.map_err(report)?;
    println!("{}", response.cypher);
    tracing::debug!(intent = %response.intent, attempts = response.attempts, "Translated");
    Ok(())
}

async fn run_schema(config: Config, refresh: bool) -> Result<()> {
    let state = AppState::new(config).await?;
    let snapshot = state
        .pipeline
        .introspector()
        .get_schema(refresh)
        .await
        .map_err(report)?;
    println!("{}", snapshot.schema.to_prompt_text());
    Ok(())
}

async fn run_check(config: Config) -> Result<()> {
    let uri = config.neo4j.uri.clone();
    let state = AppState::new(config)
        .await
        .with_context(|| format!("Could not connect to {uri}"))?;

    anyhow::ensure!(
        state.driver.health_check().await.unwrap_or(false),
        "Connected to {uri} but the health check failed"
    );

    let snapshot = state
        .pipeline
        .introspector()
        .get_schema(true)
        .await
        .map_err(report)?;
    println!(
        "OK: {} labels, {} relationship types, {} patterns",
        snapshot.schema.node_labels.len(),
        snapshot.schema.relationship_types.len(),
        snapshot.schema.relationships.len()
    );
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let port = config.server_port;
    let state = AppState::new(config).await?;

    // Warm the schema cache; a failure here is not fatal
    if let Err(e) = state.pipeline.introspector().get_schema(false).await {
        tracing::warn!("Schema not loaded at startup: {}", e);
    }

    let app = api::create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
