use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use legal_assistant_core::Config;
use legal_assistant_runtime::{Relay, repl, web};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Legal research assistant backed by a hosted assistant and web search", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the chat page.
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8501, help = "Port for the web server.")]
        port: u16,
    },
    /// Ask a single question and print the answer.
    Ask {
        query: String,
        #[arg(long, help = "Print the whole thread instead of the final reply.")]
        transcript: bool,
    },
    /// Chat in the terminal.
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,legal_assistant_core=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Legal assistant starting with command: {:?}", cli.command);

    let config = Config::from_env().context("Failed to read configuration")?;
    let relay = Relay::from_config(&config).context("Failed to set up the assistant relay")?;

    match cli.command {
        Commands::Serve { port } => {
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    signal.cancel();
                }
            });
            web::start_web_server(Arc::new(relay), port, shutdown).await?;
        }
        Commands::Ask { query, transcript } => {
            let mut session = relay.new_session();
            let cancel = CancellationToken::new();
            let reply = relay.ask(&mut session, &query, &cancel).await?;
            if transcript {
                let text = relay
                    .conversation()
                    .collect_transcript(&reply.thread_id)
                    .await?;
                println!("{text}");
            } else {
                println!("{}", reply.text);
            }
        }
        Commands::Chat => {
            let stdin = BufReader::new(tokio::io::stdin());
            repl::run_chat(&relay, stdin, &mut std::io::stdout()).await?;
        }
    }

    Ok(())
}
