//! Portal gateway command-line client.
//!
//! ```text
//! portal-cli [--config FILE] [--strict] [--email E --password P] <command>
//!
//!   call     --method GET --path /auth/me [--body JSON] [--timeout-ms N] [--retries N]
//!   me
//!   profile
//!   chat     --message TEXT
//!   stream   [--path /chat/events] [--max-lines N]
//! ```
//!
//! Configuration comes from `--config` or the `PORTAL_*` environment
//! variables. Logs go to stderr, responses to stdout.

use clap::{Parser, Subcommand};
use reqwest::Method;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use portal_client::config::{load_config, ClientConfig};
use portal_client::gateway::{ChatMessage, Credentials, CHAT_EVENTS_PATH};
use portal_client::observability::init_logging;
use portal_client::{ApiClient, ApiError, GatewayClient, Payload};

#[derive(Parser)]
#[command(name = "portal-cli")]
#[command(about = "Command-line client for the patient portal gateway", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fail instead of falling back to http://localhost:8080 when
    /// PORTAL_API_BASE is unset.
    #[arg(long)]
    strict: bool,

    /// Sign in before running the command.
    #[arg(long, requires = "password")]
    email: Option<String>,

    #[arg(long, requires = "email")]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform an arbitrary API call
    Call {
        #[arg(short, long, default_value = "GET")]
        method: String,
        #[arg(short, long)]
        path: String,
        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
        /// Per-attempt deadline in milliseconds (0 disables it)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Retries after the first failed attempt
        #[arg(long)]
        retries: Option<u32>,
    },
    /// Show the signed-in account
    Me,
    /// Show the linked patient profile
    Profile,
    /// Send a chat message
    Chat {
        #[arg(short, long)]
        message: String,
    },
    /// Follow a push stream until Ctrl-C
    Stream {
        #[arg(short, long, default_value = CHAT_EVENTS_PATH)]
        path: String,
        /// Stop after this many lines
        #[arg(long)]
        max_lines: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None if cli.strict => ClientConfig::from_env_strict()?,
        None => ClientConfig::from_env()?,
    };
    init_logging(&config.observability);

    tracing::info!(
        base_url = %config.base_url(),
        request_timeout_ms = config.timeouts.request_ms,
        retry_budget = config.retries.default_budget,
        "Configuration loaded"
    );

    let gateway = GatewayClient::new(config)?;

    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        if let Err(e) = gateway.login(&Credentials::new(email, password)).await {
            exit_with(&e);
        }
    }

    let result = match cli.command {
        Commands::Call {
            method,
            path,
            body,
            timeout_ms,
            retries,
        } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let body = body.map(|b| serde_json::from_str(&b)).transpose()?;
            call(gateway.api(), method, path, body, timeout_ms, retries).await
        }
        Commands::Me => gateway.me().await.map(|user| print_json(&user)),
        Commands::Profile => gateway.patient_profile().await.map(|profile| match profile {
            Some(profile) => print_json(&profile),
            None => println!("No patient profile is linked to this account"),
        }),
        Commands::Chat { message } => gateway
            .send_chat(&ChatMessage::text(message))
            .await
            .map(|reply| print_json(&reply)),
        Commands::Stream { path, max_lines } => {
            follow(&gateway, &path, max_lines).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        exit_with(&e);
    }
    Ok(())
}

async fn call(
    api: &ApiClient,
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
) -> Result<(), ApiError> {
    let cancel = CancellationToken::new();
    let mut descriptor = api.request(method, path).with_cancel_token(cancel.clone());
    if let Some(body) = body {
        descriptor = descriptor.with_body(body);
    }
    if let Some(ms) = timeout_ms {
        descriptor = descriptor.with_timeout(Duration::from_millis(ms));
    }
    if let Some(retries) = retries {
        descriptor = descriptor.with_retry_budget(retries);
    }

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let result = api.call_raw(&descriptor).await;
    interrupt.abort();

    match result? {
        Payload::Json(value) => print_json(&value),
        Payload::Text(text) => println!("{}", text),
    }
    Ok(())
}

async fn follow(gateway: &GatewayClient, path: &str, max_lines: Option<usize>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut connection = if path == CHAT_EVENTS_PATH {
        gateway.chat_events(move |line| {
            let _ = tx.send(line);
        })
    } else {
        portal_client::StreamConsumer::from_client(gateway.api()).open(path, move |line| {
            let _ = tx.send(line);
        })
    };

    let mut seen = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            line = rx.recv() => match line {
                Some(line) => {
                    println!("{}", line);
                    seen += 1;
                    if max_lines.is_some_and(|max| seen >= max) {
                        break;
                    }
                }
                None => break,
            },
            state = connection.wait_for(portal_client::StreamState::Closed) => {
                tracing::warn!(state = %state, "Stream ended");
                break;
            }
        }
    }

    connection.close();
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: could not render response: {}", e),
    }
}

fn exit_with(error: &ApiError) -> ! {
    eprintln!("Error: {}", error);
    if let Some(status) = error.status() {
        eprintln!("  status: {}", status);
    }
    if let Some(payload) = error.payload() {
        match payload {
            Payload::Json(value) => eprintln!("  body: {}", value),
            Payload::Text(text) => eprintln!("  body: {}", text),
        }
    }
    if let Some(hint) = error.hint() {
        eprintln!("  hint: {}", hint);
    }
    std::process::exit(1);
}
