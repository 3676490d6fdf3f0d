//! # Email Sentinel CLI
//!
//! Command-line interface for the Email Sentinel library
//! (`email_sentinel_core`). This binary parses arguments, sets up
//! configuration, and either serves the SSE verification endpoint or runs
//! a one-shot verification for a single address, printing each progress
//! event as it arrives.

use email_sentinel_core::{
    initialize_pipeline, serve, Config, ConfigBuilder, EventSink, FinalVerdict, ProgressEvent,
};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Verifies email address liveness without sending a message.",
    long_about = "Email Sentinel combines format validation, MX resolution, a relay-based \
                  SMTP probe (with a non-committing DATA test) and an asynchronous \
                  third-party verification job. Run it as an SSE server (--serve) or as a \
                  one-shot check (--email)."
)]
struct AppArgs {
    /// Run the SSE verification server.
    #[arg(long, default_value = "false", env = "EMAIL_SENTINEL_SERVE")]
    serve: bool,

    /// Bind address for the server (host:port).
    #[arg(long, env = "EMAIL_SENTINEL_LISTEN")]
    listen: Option<String>,

    /// Email address to verify (enables one-shot CLI mode).
    #[arg(short, long, env = "EMAIL_SENTINEL_EMAIL")]
    email: Option<String>,

    /// Path to a configuration file (TOML format). CLI args override file settings.
    #[arg(long, env = "EMAIL_SENTINEL_CONFIG")]
    config_file: Option<String>,

    /// SMTP relay host used for probing.
    #[arg(long, env = "EMAIL_SENTINEL_SMTP_HOST")]
    smtp_host: Option<String>,

    /// SMTP relay port.
    #[arg(long, env = "EMAIL_SENTINEL_SMTP_PORT")]
    smtp_port: Option<u16>,

    /// Relay AUTH LOGIN username.
    #[arg(long, env = "EMAIL_SENTINEL_SMTP_USER")]
    smtp_user: Option<String>,

    /// Relay AUTH LOGIN password.
    #[arg(long, env = "EMAIL_SENTINEL_SMTP_PASSWORD")]
    smtp_password: Option<String>,

    /// Domain announced in EHLO.
    #[arg(long, env = "EMAIL_SENTINEL_HELO_DOMAIN")]
    helo_domain: Option<String>,

    /// Domain of the probe sender identity (verification@<domain>).
    #[arg(long, env = "EMAIL_SENTINEL_FROM_DOMAIN")]
    from_domain: Option<String>,

    /// Verification API key.
    #[arg(long, env = "MAILJET_API_KEY")]
    api_key: Option<String>,

    /// Verification API secret key.
    #[arg(long, env = "MAILJET_SECRET_KEY")]
    secret_key: Option<String>,

    /// Comma-separated list of DNS servers to use for MX lookups.
    #[arg(long, value_delimiter = ',', env = "EMAIL_SENTINEL_DNS_SERVERS")]
    dns_servers: Option<Vec<String>>,

    /// SMTP command timeout in seconds.
    #[arg(long, env = "EMAIL_SENTINEL_SMTP_TIMEOUT")]
    smtp_timeout: Option<u64>,

    /// Disable the STARTTLS upgrade even when the relay advertises it.
    #[arg(long, action = clap::ArgAction::SetTrue, env = "EMAIL_SENTINEL_NO_STARTTLS")]
    no_starttls: bool,

    /// Path of the verdict cache file.
    #[arg(long, env = "EMAIL_SENTINEL_CACHE_PATH")]
    cache_path: Option<String>,

    /// Verdict cache TTL in seconds.
    #[arg(long, env = "EMAIL_SENTINEL_CACHE_TTL")]
    cache_ttl: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Setting up tracing subscriber failed")?;

    tracing::info!("Email Sentinel v{} starting...", env!("CARGO_PKG_VERSION"));

    let args = AppArgs::parse();
    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let config = build_config(&args)?;
    tracing::debug!("Effective configuration loaded: {:?}", config);

    if args.serve {
        serve(config)
            .await
            .context("Verification server terminated")?;
        return Ok(());
    }

    if let Some(ref email) = args.email {
        let verdict = run_cli_verification(config, email).await?;
        if !verdict.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    Err(anyhow::anyhow!(
        "Nothing to do: pass --serve to run the server or --email <address> for a one-shot check"
    ))
}

fn build_config(args: &AppArgs) -> Result<Config> {
    let mut builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        builder = builder.config_file(path);
    }
    if let Some(ref listen) = args.listen {
        builder = builder.listen_addr(listen.clone());
    }
    if let Some(ref host) = args.smtp_host {
        builder = builder.smtp_relay_host(host.clone());
    }
    if let Some(port) = args.smtp_port {
        builder = builder.smtp_relay_port(port);
    }
    if let Some(ref user) = args.smtp_user {
        builder = builder.smtp_auth_user(user.clone());
    }
    if let Some(ref pass) = args.smtp_password {
        builder = builder.smtp_auth_password(pass.clone());
    }
    if let Some(ref helo) = args.helo_domain {
        builder = builder.smtp_helo_domain(helo.clone());
    }
    if let Some(ref from) = args.from_domain {
        builder = builder.smtp_from_domain(from.clone());
    }
    if let Some(ref key) = args.api_key {
        builder = builder.mailjet_api_key(key.clone());
    }
    if let Some(ref secret) = args.secret_key {
        builder = builder.mailjet_secret_key(secret.clone());
    }
    if let Some(ref servers) = args.dns_servers {
        if !servers.is_empty() {
            builder = builder.dns_servers(servers.clone());
        }
    }
    if let Some(secs) = args.smtp_timeout {
        builder = builder.smtp_timeout(Duration::from_secs(secs));
    }
    if args.no_starttls {
        builder = builder.smtp_enable_starttls(false);
    }
    if let Some(ref path) = args.cache_path {
        builder = builder.cache_path(path.clone());
    }
    if let Some(secs) = args.cache_ttl {
        builder = builder.cache_ttl(Duration::from_secs(secs));
    }

    builder.build().context("Failed to build configuration")
}

/// Runs one verification, printing progress events as they arrive.
async fn run_cli_verification(config: Config, email: &str) -> Result<FinalVerdict> {
    let pipeline = initialize_pipeline(&config)
        .await
        .context("Failed to initialize the verification pipeline")?;

    let (sink, mut rx) = EventSink::channel();

    let printer = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("spinner template"),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));

        while let Some(event) = rx.recv().await {
            print_event(&spinner, &event);
        }
        spinner.finish_and_clear();
    });

    let verdict = pipeline.verify(email, &sink).await;

    drop(sink);
    printer.await.ok();

    print_summary(email, &verdict);
    Ok(verdict)
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

fn print_event(spinner: &ProgressBar, event: &ProgressEvent) {
    match event {
        ProgressEvent::Step {
            message,
            success: None,
            ..
        } => {
            spinner.set_message(message.clone());
        }
        ProgressEvent::Step {
            message,
            success: Some(ok),
            ..
        } => {
            let mark = if *ok {
                format!("{GREEN}ok{RESET}")
            } else {
                format!("{RED}failed{RESET}")
            };
            spinner.println(format!("  [{}] {}", mark, message));
        }
        ProgressEvent::SmtpResult {
            message,
            code,
            response,
            ..
        } => {
            spinner.println(format!("        SMTP {}: {} ({})", code, message, response));
        }
        ProgressEvent::JobStatus {
            attempt, status, ..
        } => {
            spinner.set_message(format!(
                "Advanced verification: {} (attempt {})",
                status, attempt
            ));
        }
        ProgressEvent::Heartbeat { .. } => {}
        ProgressEvent::Error {
            message,
            error_message,
        } => {
            let detail = error_message
                .as_deref()
                .map(|d| format!(": {}", d))
                .unwrap_or_default();
            spinner.println(format!("  [{RED}error{RESET}] {}{}", message, detail));
        }
        ProgressEvent::Result(_) => {}
    }
}

fn print_summary(email: &str, verdict: &FinalVerdict) {
    println!("\n{BLUE}===== Email Sentinel Result ====={RESET}");
    println!("Address: {}", email);

    if verdict.success {
        println!("Status:  {GREEN}DELIVERABLE{RESET}");
    } else {
        println!("Status:  {YELLOW}NOT DELIVERABLE{RESET}");
    }
    println!("Detail:  {}", verdict.message);

    if let Some(ref details) = verdict.details {
        if let Some(ref result) = details.result {
            println!("Result:  {}", result);
        }
        if let Some(ref risk) = details.risk {
            println!("Risk:    {}", risk);
        }
        if let Some(ref code) = details.code {
            println!("Code:    {}", code);
        }
    }
    println!("{BLUE}================================{RESET}\n");
}
