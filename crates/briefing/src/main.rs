//! Briefing CLI - run the trigger server or individual briefing jobs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use briefing::config::{ConfigError, ConfigPatch, ScheduleFrequency, ScheduleTime};
use briefing::generator::{
    PromptOptions, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, DEFAULT_HEADLINE_COUNT,
    DEFAULT_INDUSTRY, DEFAULT_LANGUAGE,
};
use briefing::job::{BatchResults, JobOutcome, DEFAULT_MAX_CONCURRENCY};
use briefing::notifier::{EmailSettings, DEFAULT_SENDER_NAME, DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};
use briefing::server::{run_server, ServerState};
use briefing::settings::{
    ServiceSettings, DEFAULT_LISTEN_ADDR, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STORE_PATH,
};
use briefing::store::{ConfigStore, SecretCipher};

/// Briefing CLI - search-grounded news briefings delivered by email.
#[derive(Parser)]
#[command(name = "briefing")]
#[command(about = "Personal news briefing service")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "BRIEFING_LOG_JSON")]
    json_logs: bool,

    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand.
#[derive(Args)]
struct ServiceArgs {
    /// JSON document holding user configs
    #[arg(long, global = true, env = "BRIEFING_STORE_PATH", default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,

    /// Hex-encoded AES-256 key for credentials at rest
    #[arg(long, global = true, env = "BRIEFING_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Gemini API base URL
    #[arg(long, global = true, env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    gemini_base_url: String,

    /// Gemini model (must support Google Search grounding)
    #[arg(long, global = true, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    /// Generation request timeout in seconds
    #[arg(long, global = true, env = "BRIEFING_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    /// Language the briefing is written in
    #[arg(long, global = true, env = "BRIEFING_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    language: String,

    /// Industry addressed by the implications section
    #[arg(long, global = true, env = "BRIEFING_INDUSTRY", default_value = DEFAULT_INDUSTRY)]
    industry: String,

    /// Number of top headlines
    #[arg(long, global = true, env = "BRIEFING_HEADLINES", default_value_t = DEFAULT_HEADLINE_COUNT)]
    headlines: usize,

    /// SMTP server host
    #[arg(long, global = true, env = "SMTP_HOST", default_value = DEFAULT_SMTP_HOST)]
    smtp_host: String,

    /// SMTP server port (STARTTLS)
    #[arg(long, global = true, env = "SMTP_PORT", default_value_t = DEFAULT_SMTP_PORT)]
    smtp_port: u16,

    /// Display name on outgoing mail
    #[arg(long, global = true, env = "BRIEFING_SENDER_NAME", default_value = DEFAULT_SENDER_NAME)]
    sender_name: String,

    /// Jobs run at once by batch commands
    #[arg(long, global = true, env = "BRIEFING_MAX_CONCURRENCY", default_value_t = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,
}

impl From<ServiceArgs> for ServiceSettings {
    fn from(args: ServiceArgs) -> Self {
        Self {
            store_path: args.store,
            encryption_key: args.encryption_key.map(Into::into),
            gemini_base_url: args.gemini_base_url,
            gemini_model: args.gemini_model,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            prompt: PromptOptions {
                language: args.language,
                industry: args.industry,
                headline_count: args.headlines,
            },
            email: EmailSettings {
                smtp_host: args.smtp_host,
                smtp_port: args.smtp_port,
                sender_name: args.sender_name,
            },
            max_concurrency: args.max_concurrency,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP trigger server
    Serve {
        /// Address to listen on
        #[arg(long, env = "BRIEFING_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
        listen: String,
    },

    /// Generate and send one user's briefing now
    Run {
        /// User id
        #[arg(long)]
        user: String,
    },

    /// Generate and send briefings for every configured user
    RunAll,

    /// List users due at a given time, optionally running them (for CronJob use)
    Due {
        /// Instant to evaluate (RFC 3339, default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Run the due users' jobs instead of only listing them
        #[arg(long)]
        run: bool,
    },

    /// Manage user configs
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Print a fresh encryption key for BRIEFING_ENCRYPTION_KEY
    Keygen,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Merge settings into a user's config (creates it if absent)
    Set {
        /// User id
        #[arg(long)]
        user: String,

        /// Gemini API key
        #[arg(long, env = "BRIEFING_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Sender Gmail address
        #[arg(long)]
        sender_email: Option<String>,

        /// Sender Gmail app password
        #[arg(long, env = "BRIEFING_SENDER_APP_PASSWORD", hide_env_values = true)]
        sender_app_password: Option<String>,

        /// Delivery address
        #[arg(long)]
        receiver_email: Option<String>,

        /// Keyword (repeatable, replaces the stored list)
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Source name or URL (repeatable, replaces the stored list)
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Delivery time, HH:MM in KST
        #[arg(long)]
        time: Option<String>,

        /// daily, weekly, or none
        #[arg(long)]
        frequency: Option<String>,
    },

    /// Show a user's config with credentials redacted
    Show {
        /// User id
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("briefing=debug,info")
        } else {
            EnvFilter::new("briefing=info,warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    let settings = ServiceSettings::from(cli.service);

    match cli.command {
        Commands::Serve { listen } => {
            tracing::info!(
                listen,
                store = %settings.store_path.display(),
                model = %settings.gemini_model,
                "Starting briefing server"
            );
            let job = settings.build_job().context("Failed to configure service")?;
            run_server(Arc::new(ServerState::new(job)), &listen).await
        }
        Commands::Run { user } => run_one(&settings, &user).await,
        Commands::RunAll => run_all(&settings).await,
        Commands::Due { at, run } => run_due(&settings, at.unwrap_or_else(Utc::now), run).await,
        Commands::Config { action } => run_config(&settings, action).await,
        Commands::Keygen => {
            println!("{}", SecretCipher::generate_key_hex());
            Ok(())
        }
    }
}

async fn run_one(settings: &ServiceSettings, user: &str) -> Result<()> {
    let job = settings.build_job().context("Failed to configure service")?;
    let report = job.run(user).await?;

    println!(
        "✅ Briefing sent for {} ({} bytes in {:.1}s)",
        report.user_id,
        report.briefing_bytes,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}

async fn run_all(settings: &ServiceSettings) -> Result<()> {
    let job = settings.build_job().context("Failed to configure service")?;
    let results = job.run_all().await.context("Failed to list users")?;
    print_batch(&results)
}

async fn run_due(settings: &ServiceSettings, at: DateTime<Utc>, run: bool) -> Result<()> {
    let job = settings.build_job().context("Failed to configure service")?;

    if !run {
        let scan = job.due_users(at).await.context("Failed to list users")?;
        println!("🕘 Users due at {}: {}", at.to_rfc3339(), scan.due.len());
        for user in &scan.due {
            println!("   {user}");
        }
        for (user, error) in &scan.unreadable {
            eprintln!("⚠️  {user}: config unreadable: {error}");
        }
        return Ok(());
    }

    let results = job.run_due(at).await.context("Failed to list users")?;
    print_batch(&results)
}

async fn run_config(settings: &ServiceSettings, action: ConfigCommand) -> Result<()> {
    let store = settings.open_store().context("Failed to open config store")?;

    match action {
        ConfigCommand::Set {
            user,
            api_key,
            sender_email,
            sender_app_password,
            receiver_email,
            keywords,
            sources,
            time,
            frequency,
        } => {
            let schedule_time = time
                .map(|t| t.parse::<ScheduleTime>())
                .transpose()?;
            let schedule_frequency = frequency
                .map(|f| ScheduleFrequency::parse(&f).ok_or(ConfigError::InvalidFrequency(f)))
                .transpose()?;

            let patch = ConfigPatch {
                api_key: api_key.map(Into::into),
                sender_email,
                sender_app_password: sender_app_password.map(Into::into),
                receiver_email,
                keywords: (!keywords.is_empty()).then_some(keywords),
                sources: (!sources.is_empty()).then_some(sources),
                schedule_time,
                schedule_frequency,
            };
            if patch.is_empty() {
                anyhow::bail!("Nothing to update - pass at least one setting");
            }

            let config = store.set(&user, patch).await?;
            println!("💾 Saved config for {user}");
            println!("{}", serde_json::to_string_pretty(&config.redacted(Utc::now()))?);
            if let Err(e) = config.validate() {
                println!("⚠️  Not ready to run yet: {e}");
            }
        }
        ConfigCommand::Show { user } => match store.get(&user).await? {
            Some(config) => {
                println!("{}", serde_json::to_string_pretty(&config.redacted(Utc::now()))?);
            }
            None => anyhow::bail!("No config saved for user {user}"),
        },
    }

    Ok(())
}

fn print_batch(results: &BatchResults) -> Result<()> {
    let failed = results
        .values()
        .filter(|s| s.outcome != JobOutcome::Success)
        .count();

    println!("\n📊 Briefing Summary");
    println!("   Users: {}", results.len());
    println!("   Sent: {}", results.len() - failed);
    println!("   Failed: {failed}");
    for (user, summary) in results {
        if let Some(error) = &summary.error {
            eprintln!("     - {user}: {error}");
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} briefings failed", results.len());
    }
    Ok(())
}
