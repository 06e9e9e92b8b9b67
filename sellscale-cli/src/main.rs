use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tracing::Level;

use sellscale_core::{
    validate_email_transition, validate_linkedin_transition, valid_next_email_statuses,
    valid_next_linkedin_statuses, ProspectEmailOutreachStatus, ProspectId, ProspectStatus,
    TransitionRequest,
};
use sellscale_server::config::{
    parse_database_url, slack_webhooks_from_env, store_settings_from_env, DatabaseLocation,
};
use sellscale_server::slack::SlackNotifier;
use sellscale_server::state_machine::outbox::dispatch_due;
use sellscale_server::state_machine::repository::{OutboxStatus, ProspectRepository};
use sellscale_server::state_machine::{AppliedTransition, SqliteRepository};
use sellscale_server::status::{PipelineSummary, StatusTables, StatusTableEntry};
use sellscale_server::{ProspectStore, StoreSettings};

/// SellScale: prospect outreach status administration
#[derive(Parser, Debug)]
#[command(name = "sellscale")]
#[command(about = "Inspect and administer prospect outreach statuses", long_about = None)]
struct Cli {
    /// Database to operate on (sqlite://<path>, sqlite::memory: or a file path)
    #[arg(long, global = true, env = "DATABASE_URL", default_value = "sqlite://sellscale.db")]
    database_url: String,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every status of a channel with its legal next statuses
    Statuses(ChannelArgs),
    /// List the legal next statuses of one status
    Next(NextArgs),
    /// Check whether a transition is allowed
    Check(CheckArgs),
    /// Print a prospect's status audit logs
    History(ProspectArgs),
    /// Move a prospect to a new status, bypassing ownership checks
    SetStatus(SetStatusArgs),
    /// Print prospect counts per status for an SDR
    Summary(SummaryArgs),
    /// List effect outbox rows
    Outbox(OutboxArgs),
    /// Dispatch every due outbox row once
    RetryOutbox,
    /// Delete a prospect and everything that references it
    DeleteProspect(ProspectArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Channel {
    Linkedin,
    Email,
}

#[derive(Parser, Debug)]
struct ChannelArgs {
    #[arg(long, value_enum, default_value = "linkedin")]
    channel: Channel,
}

#[derive(Parser, Debug)]
struct NextArgs {
    /// Status name, e.g. SENT_OUTREACH
    status: String,

    #[arg(long, value_enum, default_value = "linkedin")]
    channel: Channel,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    from: String,
    to: String,

    #[arg(long, value_enum, default_value = "linkedin")]
    channel: Channel,

    /// Accept any transition
    #[arg(long = "override")]
    override_status: bool,
}

#[derive(Parser, Debug)]
struct ProspectArgs {
    prospect_id: i64,
}

#[derive(Parser, Debug)]
struct SetStatusArgs {
    prospect_id: i64,
    status: String,

    #[arg(long, value_enum, default_value = "linkedin")]
    channel: Channel,

    /// Skip transition table validation
    #[arg(long = "override")]
    override_status: bool,

    /// Suppress notifications and message blocking
    #[arg(long)]
    quietly: bool,
}

#[derive(Parser, Debug)]
struct SummaryArgs {
    client_sdr_id: i64,
}

#[derive(Parser, Debug)]
struct OutboxArgs {
    /// Only rows in this state (pending, delivered, failed, dead)
    #[arg(long)]
    status: Option<String>,
}

fn parse_linkedin_status(value: &str) -> Result<ProspectStatus> {
    ProspectStatus::parse(&value.to_ascii_uppercase())
        .ok_or_else(|| anyhow!("Unknown LinkedIn status: {}", value))
}

fn parse_email_status(value: &str) -> Result<ProspectEmailOutreachStatus> {
    ProspectEmailOutreachStatus::parse(&value.to_ascii_uppercase())
        .ok_or_else(|| anyhow!("Unknown email status: {}", value))
}

fn open_repository(database_url: &str) -> Result<SqliteRepository> {
    let location = parse_database_url(database_url)
        .with_context(|| format!("Unsupported database URL: {}", database_url))?;
    let repository = match location {
        DatabaseLocation::Memory => SqliteRepository::new_in_memory(),
        DatabaseLocation::Path(path) => SqliteRepository::new(path),
    }
    .context("Failed to open database")?;
    Ok(repository)
}

/// Open a store with the same planner and outbox settings as the server.
fn open_store(database_url: &str) -> Result<ProspectStore> {
    let settings = store_settings_from_env().context("Failed to load store settings")?;
    open_store_with(database_url, settings)
}

fn open_store_with(database_url: &str, settings: StoreSettings) -> Result<ProspectStore> {
    let repository = open_repository(database_url)?;
    let app_base_url = std::env::var("APP_BASE_URL")
        .unwrap_or_else(|_| "https://app.sellscale.com".to_string());
    Ok(ProspectStore::new(
        Arc::new(repository),
        Arc::new(SlackNotifier::new(slack_webhooks_from_env())),
        app_base_url,
        settings,
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn print_table(entries: &[StatusTableEntry]) {
    for entry in entries {
        let next = if entry.next.is_empty() {
            "(terminal)".to_string()
        } else {
            entry.next.join(", ")
        };
        println!(
            "{:<28} {:<14} -> {}",
            entry.status,
            entry.descriptor.overall.as_str(),
            next
        );
    }
}

fn run_statuses(args: ChannelArgs, json: bool) -> Result<()> {
    let tables = StatusTables::build();
    let entries = match args.channel {
        Channel::Linkedin => &tables.linkedin,
        Channel::Email => &tables.email,
    };
    if json {
        return print_json(entries);
    }
    print_table(entries);
    Ok(())
}

fn run_next(args: NextArgs, json: bool) -> Result<()> {
    let next: Vec<&'static str> = match args.channel {
        Channel::Linkedin => valid_next_linkedin_statuses(parse_linkedin_status(&args.status)?)
            .iter()
            .map(|s| s.as_str())
            .collect(),
        Channel::Email => valid_next_email_statuses(parse_email_status(&args.status)?)
            .iter()
            .map(|s| s.as_str())
            .collect(),
    };
    if json {
        return print_json(&next);
    }
    if next.is_empty() {
        println!("{} is terminal", args.status.to_ascii_uppercase());
    }
    for status in next {
        println!("{}", status);
    }
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<()> {
    let result = match args.channel {
        Channel::Linkedin => validate_linkedin_transition(
            parse_linkedin_status(&args.from)?,
            parse_linkedin_status(&args.to)?,
            args.override_status,
        ),
        Channel::Email => validate_email_transition(
            Some(parse_email_status(&args.from)?),
            parse_email_status(&args.to)?,
            args.override_status,
        ),
    };
    match result {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

async fn run_history(database_url: &str, args: ProspectArgs, json: bool) -> Result<()> {
    let repository = open_repository(database_url)?;
    let id = ProspectId(args.prospect_id);
    if repository.get_prospect(id).await?.is_none() {
        bail!("Prospect {} not found", id);
    }
    let history = repository.status_history(id).await?;
    if json {
        return print_json(&history);
    }

    println!("LinkedIn:");
    for record in &history.linkedin {
        println!(
            "  {}  {} -> {}{}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.from_status,
            record.to_status,
            if record.automated { " (automated)" } else { "" }
        );
    }
    println!("Email:");
    for record in &history.email {
        println!(
            "  {}  {} -> {}{}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record
                .from_status
                .map(|s| s.as_str())
                .unwrap_or("(none)"),
            record.to_status,
            if record.automated { " (automated)" } else { "" }
        );
    }
    Ok(())
}

async fn run_set_status(database_url: &str, args: SetStatusArgs, json: bool) -> Result<()> {
    let store = open_store(database_url)?;
    let id = ProspectId(args.prospect_id);
    let prospect = store
        .repository()
        .get_prospect(id)
        .await?
        .with_context(|| format!("Prospect {} not found", id))?;

    let applied: AppliedTransition = match args.channel {
        Channel::Linkedin => {
            let mut request = TransitionRequest::to(parse_linkedin_status(&args.status)?);
            request.override_status = args.override_status;
            request.quietly = args.quietly;
            store
                .update_linkedin_status(prospect.client_sdr_id, id, &request)
                .await?
        }
        Channel::Email => {
            let mut request = TransitionRequest::to(parse_email_status(&args.status)?);
            request.override_status = args.override_status;
            request.quietly = args.quietly;
            store
                .update_email_status(prospect.client_sdr_id, id, &request)
                .await?
        }
    };

    if json {
        return print_json(&applied);
    }
    println!(
        "Prospect {}: {} -> {} (overall {})",
        id,
        applied.from_status.unwrap_or("(none)"),
        applied.to_status,
        applied.prospect.overall_status
    );
    if applied.dispatch.total() > 0 {
        println!(
            "Effects: {} delivered, {} retrying, {} dead",
            applied.dispatch.delivered, applied.dispatch.retrying, applied.dispatch.dead
        );
    }
    Ok(())
}

async fn run_summary(database_url: &str, args: SummaryArgs, json: bool) -> Result<()> {
    let repository = open_repository(database_url)?;
    let prospects = repository
        .list_prospects(args.client_sdr_id.into())
        .await?;
    let summary = PipelineSummary::from_prospects(&prospects, Utc::now());
    if json {
        return print_json(&summary);
    }
    println!("Total prospects: {}", summary.total_prospects);
    println!("In purgatory:    {}", summary.in_purgatory);
    for (status, count) in &summary.overall {
        println!("  {:<14} {}", status, count);
    }
    Ok(())
}

async fn run_outbox(database_url: &str, args: OutboxArgs, json: bool) -> Result<()> {
    let repository = open_repository(database_url)?;
    let status = match args.status.as_deref() {
        Some(s) => Some(
            OutboxStatus::parse(&s.to_ascii_lowercase())
                .ok_or_else(|| anyhow!("Unknown outbox status: {}", s))?,
        ),
        None => None,
    };
    let entries = repository.list_outbox(status).await?;
    if json {
        return print_json(&entries);
    }
    for entry in entries {
        println!(
            "#{:<6} prospect {:<6} {:<22} {:<9} attempts {} next {}{}",
            entry.id,
            entry.prospect_id,
            entry.effect.kind(),
            entry.status.as_str(),
            entry.attempts,
            entry.next_attempt_at.format("%Y-%m-%d %H:%M:%S"),
            entry
                .last_error
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn run_retry_outbox(database_url: &str, json: bool) -> Result<()> {
    let store = open_store(database_url)?;
    let report = dispatch_due(
        store.interpreter(),
        &store.settings().outbox,
        Utc::now(),
    )
    .await?;
    if json {
        return print_json(&report);
    }
    println!(
        "{} delivered, {} retrying, {} dead",
        report.delivered, report.retrying, report.dead
    );
    Ok(())
}

async fn run_delete_prospect(database_url: &str, args: ProspectArgs) -> Result<()> {
    let store = open_store(database_url)?;
    store.delete_prospect(ProspectId(args.prospect_id)).await?;
    println!("Deleted prospect {}", args.prospect_id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = cli.database_url.as_str();

    match cli.command {
        Commands::Statuses(args) => run_statuses(args, cli.json),
        Commands::Next(args) => run_next(args, cli.json),
        Commands::Check(args) => run_check(args),
        Commands::History(args) => run_history(database_url, args, cli.json).await,
        Commands::SetStatus(args) => run_set_status(database_url, args, cli.json).await,
        Commands::Summary(args) => run_summary(database_url, args, cli.json).await,
        Commands::Outbox(args) => run_outbox(database_url, args, cli.json).await,
        Commands::RetryOutbox => run_retry_outbox(database_url, cli.json).await,
        Commands::DeleteProspect(args) => run_delete_prospect(database_url, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names_are_case_insensitive() {
        assert_eq!(
            parse_linkedin_status("sent_outreach").unwrap(),
            ProspectStatus::SentOutreach
        );
        assert_eq!(
            parse_email_status("BOUNCED").unwrap(),
            ProspectEmailOutreachStatus::Bounced
        );
        assert!(parse_linkedin_status("BOUNCED").is_err());
    }

    #[test]
    fn test_store_uses_configured_settings() {
        let mut settings = StoreSettings::default();
        settings.planner.bump_purgatory_days = 9;
        settings.outbox.max_attempts = 5;
        let store = open_store_with("sqlite::memory:", settings).unwrap();
        assert_eq!(*store.settings(), settings);

        let store = open_store("sqlite::memory:").unwrap();
        assert_eq!(*store.settings(), store_settings_from_env().unwrap());
    }

    #[test]
    fn test_cli_parses_set_status() {
        let cli = Cli::try_parse_from([
            "sellscale",
            "--database-url",
            "sqlite::memory:",
            "set-status",
            "12",
            "DEMO_WON",
            "--override",
        ])
        .unwrap();
        match cli.command {
            Commands::SetStatus(args) => {
                assert_eq!(args.prospect_id, 12);
                assert!(args.override_status);
                assert_eq!(args.channel, Channel::Linkedin);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_rejects_illegal_move() {
        let result = run_check(CheckArgs {
            from: "SENT_OUTREACH".to_string(),
            to: "DEMO_WON".to_string(),
            channel: Channel::Linkedin,
            override_status: false,
        });
        assert!(result.is_err());

        let result = run_check(CheckArgs {
            from: "SENT_OUTREACH".to_string(),
            to: "DEMO_WON".to_string(),
            channel: Channel::Linkedin,
            override_status: true,
        });
        assert!(result.is_ok());
    }
}
