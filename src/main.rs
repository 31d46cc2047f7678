use clap::{Parser, Subcommand};
use restbridge::app::App;
use restbridge::config::{ConfigOverrides, ServerConfig};
use restbridge::mcp::server::McpServer;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "restbridge", version, about = "Expose a REST service as MCP tools")]
struct Cli {
    /// Base URL of the downstream service
    #[arg(long, global = true)]
    url: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,

    /// Mapping file to try before the config directory
    #[arg(long, global = true)]
    mappings: Option<PathBuf>,

    /// Directory searched for tool_mappings.{yaml,yml,json,properties}
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Serve MCP over stdio (default)
    Serve,
    /// Print the active tool list as JSON
    Tools,
    /// Report which mapping source is active
    Check,
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing(level: Option<&str>) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = ServerConfig::from_env()?;
    config.apply(ConfigOverrides {
        service_url: cli.url,
        timeout_secs: cli.timeout,
        mappings_file: cli.mappings,
        config_dir: cli.config_dir,
        log_level: cli.log_level,
    })?;
    init_tracing(config.log_level.as_deref());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let app = App::initialize(config)?;
            let server = Arc::new(McpServer::from_app(&app));
            server.run_stdio().await?;
        }
        Command::Tools => {
            let app = App::initialize(config)?;
            let tools = app.dispatcher.list_tools();
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        Command::Check => {
            config.validate()?;
            let loaded = App::load_mappings(&config);
            println!("source: {}", loaded.source);
            println!("tools: {}", loaded.set.tool_count());
            println!("parsers: {}", loaded.set.parser_count());
            for (tool, parser) in loaded.set.dangling_parsers() {
                println!("warning: tool '{}' names undefined parser '{}'", tool, parser);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(error = %err, "restbridge failed");
        eprintln!("restbridge: {}", err);
        std::process::exit(1);
    }
}
