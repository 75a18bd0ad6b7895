mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "webtools")]
#[command(about = "Headless browser tools (search, navigate, extract, summarize) served over MCP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server
    Serve {
        /// Port to listen on (overrides config server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config server.host)
        #[arg(long)]
        host: Option<String>,

        /// Speak newline-delimited JSON-RPC on stdin/stdout instead of HTTP
        #[arg(long)]
        stdio: bool,
    },

    /// Inspect the available tools
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },

    /// Call one tool directly and print its JSON result
    Run {
        /// Tool name, e.g. web_search
        tool: String,

        /// Tool parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Run environment diagnostics
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ToolsCommands {
    /// List all tools
    List,
    /// Show parameters of one tool
    Info {
        /// Tool name
        name: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing. Logs go to stderr so stdout stays free for tool output
    // and the stdio transport.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(cli.json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { port, host, stdio } => {
            commands::serve::run(host, port, stdio).await?;
        }
        Commands::Tools { command } => match command {
            ToolsCommands::List => commands::tools_cmd::list().await?,
            ToolsCommands::Info { name } => commands::tools_cmd::info(&name).await?,
        },
        Commands::Run { tool, params } => {
            commands::run_cmd::tool(&tool, &params).await?;
        }
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_cmd::show().await?,
            ConfigCommands::Init { force } => commands::config_cmd::init(force).await?,
        },
    }

    Ok(())
}
