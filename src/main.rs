use anyhow::{Context as _, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures_util::StreamExt as _;
use gravlink_config::{Config, LogFormat};
use gravlink_provider::{
    FetchOptions, Gateway, ReqwestTransport, build_http_client, resolve_model,
};
use gravlink_store::SqliteCredentialStore;
use gravlink_types::{
    AuthRecord, CredentialStore, FetchRequest, GravlinkError, HeaderStyle, ResponseBody,
};
use std::{io::Write as _, path::PathBuf, sync::Arc};

const GENERATIVE_LANGUAGE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Parser, Debug)]
#[command(name = "gravlink", about = "gravlink — Antigravity auth and request adapter")]
struct Cli {
    /// Path to the YAML configuration file (default: ~/.gravlink/config.yaml).
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// SQLite credential store (default: ~/.gravlink/credentials.db).
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a prompt through the adapter and print the response.
    Generate {
        /// Model id, e.g. gemini-3-pro-high.
        #[arg(short, long)]
        model: String,
        /// Use streamGenerateContent and print chunks as they arrive.
        #[arg(long)]
        stream: bool,
        /// Backend header style (primary / cli); defaults to the configured one.
        #[arg(long)]
        style: Option<HeaderStyle>,
        /// Strip prior thinking from the request.
        #[arg(long)]
        thinking_recovery: bool,
        prompt: String,
    },
    /// Print the backend model id a requested id resolves to.
    ResolveModel {
        model: String,
        #[arg(long, default_value = "primary")]
        style: HeaderStyle,
    },
    /// Show whether a credential is stored and whether its access token is valid.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Generate {
            model,
            stream,
            style,
            thinking_recovery,
            prompt,
        } => {
            let options = FetchOptions {
                header_style: style,
                force_thinking_recovery: thinking_recovery,
            };
            cmd_generate(&config, cli.store, &model, stream, options, &prompt).await
        }
        Commands::ResolveModel { model, style } => {
            let resolved = resolve_model(&model, style);
            println!("{}", resolved.effective);
            if let Some(tier) = resolved.stripped_tier {
                println!("thinkingLevel: {tier}");
            }
            Ok(())
        }
        Commands::Status => cmd_status(&config, cli.store).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let default_path = gravlink_dir().join("config.yaml");
    let path = path
        .cloned()
        .or_else(|| default_path.exists().then_some(default_path));
    let config = Config::load(path.as_deref()).map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn cmd_generate(
    config: &Config,
    store: Option<PathBuf>,
    model: &str,
    stream: bool,
    options: FetchOptions,
    prompt: &str,
) -> Result<()> {
    let store = open_store(store).await?;
    let provider = config.provider();
    if store.load(&provider).await?.is_none() {
        return Err(GravlinkError::TokenNotFound(provider).into());
    }
    let store: Arc<dyn CredentialStore> = Arc::new(store);
    let transport = Arc::new(ReqwestTransport::new(build_http_client(
        config.proxy_url.as_deref(),
    )));
    let gateway = Gateway::new(config, transport, store);

    let action = if stream {
        "streamGenerateContent?alt=sse"
    } else {
        "generateContent"
    };
    let body = serde_json::json!({
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
    });
    let request = FetchRequest::post_json(format!("{GENERATIVE_LANGUAGE_BASE}/{model}:{action}"), &body);

    let response = gateway.fetch_with(request, options).await?;
    if let Some(meta) = &response.metadata {
        tracing::info!(
            endpoint = %meta.endpoint,
            project = %meta.project_id,
            model = %meta.effective_model,
            "call completed"
        );
    }
    let status = response.status;

    let mut out = std::io::stdout().lock();
    match response.body {
        ResponseBody::Buffered(bytes) => write_body(&mut out, &bytes)?,
        ResponseBody::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                write_body(&mut out, &chunk?)?;
                out.flush()?;
            }
        }
    }
    writeln!(out)?;

    if !status.is_success() {
        anyhow::bail!("backend returned {status}");
    }
    Ok(())
}

fn write_body(out: &mut impl std::io::Write, bytes: &Bytes) -> Result<()> {
    out.write_all(bytes)?;
    Ok(())
}

async fn cmd_status(config: &Config, store: Option<PathBuf>) -> Result<()> {
    let store = open_store(store).await?;
    let provider = config.provider();
    match store.load(&provider).await? {
        None => println!("{provider}: no credential stored"),
        Some(AuthRecord::ApiKey { .. }) => println!("{provider}: api key"),
        Some(AuthRecord::OAuth(credential)) => {
            let token = if credential.access_token_expired() {
                "expired (will refresh on next call)"
            } else {
                "valid"
            };
            let project = credential.refresh.embedded_project().unwrap_or("not resolved yet");
            println!("{provider}: oauth, access token {token}, project {project}");
        }
    }
    Ok(())
}

async fn open_store(path: Option<PathBuf>) -> Result<SqliteCredentialStore> {
    let path = path.unwrap_or_else(|| gravlink_dir().join("credentials.db"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite://{}", path.display());
    SqliteCredentialStore::new(&url)
        .await
        .with_context(|| format!("database error: {}", path.display()))
}

fn gravlink_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".gravlink")
}
