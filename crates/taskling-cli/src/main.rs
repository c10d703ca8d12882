mod bootstrap;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use taskling_config::ConfigLoader;
use taskling_gateway::GatewayServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskling", about = "A conversational to-do assistant", version)]
struct Cli {
    /// Path to the config file (default: ~/.taskling/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the assistant interactively.
    Chat {
        /// Resume a named session instead of starting a fresh one.
        #[arg(long)]
        session: Option<String>,
    },
    /// Run the webhook server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.as_deref())?;

    match cli.command {
        Command::Chat { session } => chat(&config, session).await,
        Command::Serve => serve(&config).await,
    }
}

async fn chat(
    config: &taskling_config::AppConfig,
    session: Option<String>,
) -> anyhow::Result<()> {
    let runtime = bootstrap::build_runtime(config)?;
    let session_id = session.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()));

    println!("Taskling ready. Type a message, or Ctrl-D to quit.");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let reply = runtime.handle_user_message(&session_id, "local", text).await;
        println!("{reply}");
    }

    println!("Bye!");
    Ok(())
}

async fn serve(config: &taskling_config::AppConfig) -> anyhow::Result<()> {
    let runtime = bootstrap::build_runtime(config)?;
    let server = GatewayServer::new(&config.gateway.bind, runtime);
    server.serve().await?;
    Ok(())
}
