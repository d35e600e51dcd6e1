use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod classifier;
mod completion;
mod config;
mod dispatch;
mod jobs;
mod models;
mod newsletter;
mod scheduler;
mod store;
mod summarizer;
#[cfg(test)]
mod testing;
mod window;

use completion::{ChatCompletionsClient, Completion};
use config::Settings;
use dispatch::{ChatSink, MailSink, SmtpMailer, WebhookSink};
use jobs::{Jobs, Pipeline};
use models::NewEntry;
use store::csv_dir::CsvDirStore;
use store::pg::PgRowStore;
use store::RowStore;

#[derive(Parser)]
#[command(name = "worklog-digest")]
#[command(about = "Daily and weekly digests of team work logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres row store schema
    InitDb,
    /// Append rows from a CSV export of a member's tab
    Import {
        #[arg(long)]
        member: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Log one update for a team member and report its project label
    Log {
        #[arg(long)]
        member: String,
        #[arg(long)]
        task: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "")]
        docs: String,
        /// DD-Mon-YYYY, defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Defaults to the weekday of today
        #[arg(long)]
        day: Option<String>,
    },
    /// Post today's digest to the chat webhook
    Daily {
        #[arg(long)]
        dry_run: bool,
    },
    /// Email the weekly newsletter and post the weekly digest
    Weekly {
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the daily and weekly jobs on their cron schedules
    Serve,
}

async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    let database_url = settings
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn open_store(settings: &Settings) -> anyhow::Result<Box<dyn RowStore>> {
    if let Some(dir) = &settings.store_dir {
        return Ok(Box::new(CsvDirStore::new(dir, &settings.store_name)));
    }
    let pool = connect(settings)
        .await
        .context("set ROW_STORE_DIR or DATABASE_URL for the row store")?;
    Ok(Box::new(PgRowStore::new(pool, settings.store_name.clone())))
}

fn completion_client(settings: &Settings) -> anyhow::Result<Box<dyn Completion>> {
    let api_key = settings
        .completion_api_key
        .as_deref()
        .context("GROQ_API_KEY must be set")?;
    let client = ChatCompletionsClient::with_config(
        api_key,
        settings.completion_base_url.clone(),
        settings.completion_model.clone(),
        settings.completion_timeout,
    )?;
    Ok(Box::new(client))
}

fn chat_sink(settings: &Settings) -> anyhow::Result<Option<Box<dyn ChatSink>>> {
    match &settings.webhook_url {
        Some(url) => Ok(Some(Box::new(WebhookSink::new(url.clone())?))),
        None => Ok(None),
    }
}

fn mail_sink(settings: &Settings) -> anyhow::Result<Option<Box<dyn MailSink>>> {
    let smtp = &settings.smtp;
    let (Some(sender), Some(password)) = (&smtp.sender, &smtp.password) else {
        return Ok(None);
    };
    if smtp.recipients.is_empty() {
        return Ok(None);
    }
    let mailer = SmtpMailer::new(smtp.host.clone(), smtp.port, sender, password, &smtp.recipients)
        .context("invalid email settings")?;
    Ok(Some(Box::new(mailer)))
}

async fn build_jobs(settings: Settings) -> anyhow::Result<Jobs> {
    Ok(Jobs {
        store: open_store(&settings).await?,
        completion: completion_client(&settings)?,
        chat: chat_sink(&settings)?,
        mail: mail_sink(&settings)?,
        settings,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Log { .. } | Commands::InitDb | Commands::Import { .. } => tracing::Level::WARN,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let settings = Settings::from_env()?;
    if matches!(
        cli.command,
        Commands::Log { .. } | Commands::Daily { .. } | Commands::Weekly { .. } | Commands::Serve
    ) {
        settings.require_roster()?;
    }
    let today = window::today_in(settings.timezone);

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&settings).await?;
            store::pg::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { member, csv } => {
            let store = open_store(&settings).await?;
            let inserted = store::import_csv(store.as_ref(), &member, &csv).await?;
            println!("Imported {inserted} rows for {member} from {}.", csv.display());
        }
        Commands::Log {
            member,
            task,
            notes,
            docs,
            date,
            day,
        } => {
            let store = open_store(&settings).await?;
            let completion = completion_client(&settings)?;
            let entry = NewEntry {
                day: day.unwrap_or_else(|| today.format("%A").to_string()),
                date: date.unwrap_or_else(|| window::format_log_date(today)),
                task,
                notes,
                docs,
            };

            match jobs::log_entry(
                store.as_ref(),
                completion.as_ref(),
                &settings,
                &member,
                &entry,
                today,
            )
            .await
            {
                Ok(logged) => {
                    if logged.outcome == store::AppendOutcome::CreatedTab {
                        println!("Created a new tab for {}.", member.trim());
                    }
                    println!(
                        "Update logged for {}! (Auto-tagged as: {})",
                        member.trim(),
                        logged.label
                    );
                }
                Err(err) => {
                    println!("Error: {err:#}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Daily { dry_run: true } => {
            let store = open_store(&settings).await?;
            let completion = completion_client(&settings)?;
            let pipeline = Pipeline::new(store.as_ref(), completion.as_ref(), &settings);
            match pipeline.build_daily(today).await? {
                Some(dispatch) => println!("{}", serde_json::to_string_pretty(&dispatch.chat)?),
                None => println!("No updates found today."),
            }
        }
        Commands::Daily { dry_run: false } => {
            let jobs = build_jobs(settings).await?;
            if jobs.run_daily(today).await?.is_none() {
                println!("No updates found today.");
            }
        }
        Commands::Weekly { dry_run: true } => {
            let store = open_store(&settings).await?;
            let completion = completion_client(&settings)?;
            let pipeline = Pipeline::new(store.as_ref(), completion.as_ref(), &settings);
            match pipeline.build_weekly(today).await? {
                Some(dispatch) => {
                    println!("Subject: {}", dispatch.newsletter.subject);
                    println!("Range: {}", dispatch.newsletter.date_range);
                    println!();
                    println!("{}", dispatch.newsletter.html);
                    println!("{}", serde_json::to_string_pretty(&dispatch.chat)?);
                }
                None => println!(
                    "No data found for the last {} days.",
                    settings.weekly_window_days
                ),
            }
        }
        Commands::Weekly { dry_run: false } => {
            let days = settings.weekly_window_days;
            let jobs = build_jobs(settings).await?;
            if jobs.run_weekly(today).await?.is_none() {
                println!("No data found for the last {days} days.");
            }
        }
        Commands::Serve => {
            let scheduler = scheduler::Scheduler::new(
                settings.timezone,
                &settings.daily_cron,
                &settings.weekly_cron,
            )?;
            let jobs = build_jobs(settings).await?;
            scheduler.run(&jobs).await;
        }
    }

    Ok(())
}
