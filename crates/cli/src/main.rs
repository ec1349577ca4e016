use clap::{Parser, Subcommand};
use lib::assistants::OpenAiAssistants;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pdfchat")]
#[command(about = "Chat with a hosted assistant about your PDFs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Serve the chat page (HTTP + WebSocket). Requires OPENAI_API_KEY (env, .env, or config).
    Serve {
        /// Config file path (default: PDFCHAT_CONFIG_PATH or ~/.pdfchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP and WebSocket port (default from config or 8501)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind address (default from config or 127.0.0.1)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    lib::config::load_env();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("pdfchat {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port, bind }) => {
            if let Err(e) = run_serve(config, port, bind).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Some(b) = bind {
        config.server.bind = b;
    }

    let api_key = match lib::config::resolve_api_key(&config) {
        Some(key) => key,
        None => anyhow::bail!("OPENAI_API_KEY is not set (environment, .env, or openai.apiKey in config)"),
    };
    let base_url = lib::config::resolve_base_url(&config);
    let client = OpenAiAssistants::new(api_key, base_url)
        .with_naming_model(config.assistant.naming_model.clone());

    log::info!("starting pdfchat on {}:{}", config.server.bind, config.server.port);
    lib::web::run_server(config, Arc::new(client)).await
}
