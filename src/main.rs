/// Veriflog command line client
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veriflog::{
    config::ClientConfig,
    event_log::export::{self, ExportFormat},
    jobs::SyncCoordinator,
    mock_authority::MockAuthority,
    revocation::RevocationStatus,
    server, AppContext,
};

#[derive(Debug, Parser)]
#[command(name = "veriflog", version, about = "Offline-first verification log client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify a scanned payload (JSON, JWT or base64url) and record the result
    Verify {
        /// Payload text; read from --file when omitted
        payload: Option<String>,
        #[arg(long, conflicts_with = "payload")]
        file: Option<PathBuf>,
    },
    /// Append an already-produced verification result to the log
    Record {
        payload: String,
    },
    /// List recorded verifications, newest first
    Logs {
        /// Case-insensitive substring filter
        #[arg(long)]
        filter: Option<String>,
        /// Only records not yet synced
        #[arg(long, default_value_t = false)]
        pending: bool,
    },
    /// Deliver pending records to the remote authority once
    Sync,
    /// Replace the local revocation snapshot with the remote list
    RefreshRevocations,
    /// Look a credential id up in the local revocation snapshot
    Revoked {
        id: String,
    },
    /// Export the log
    Export {
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        /// Output file; stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete every recorded verification
    Clear {
        /// Confirm the irreversible deletion
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Show the remote verifier's capability descriptor
    Capabilities,
    /// Keep syncing in the background until interrupted
    Run,
    /// Serve an in-memory remote authority
    MockAuthority {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Csv => ExportFormat::Csv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::MockAuthority { port } => {
            let addr = SocketAddr::from(([127, 0, 0, 1], port.unwrap_or(config.status.mock_port)));
            MockAuthority::new().serve(addr).await?;
        }
        command => {
            let ctx = AppContext::new(config)
                .await
                .context("failed to open local stores")?;
            execute(ctx, command).await?;
        }
    }

    Ok(())
}

async fn execute(ctx: AppContext, command: Command) -> Result<()> {
    match command {
        Command::Verify { payload, file } => {
            let input = match (payload, file) {
                (Some(payload), _) => payload,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => bail!("pass a payload or --file"),
            };

            let recorded = ctx.verifier.verify_and_record(&input).await?;
            print_json(&recorded.outcome)?;
            eprintln!(
                "Recorded as log {}{}",
                recorded.log_id,
                if recorded.from_cache { " (resolved from cache)" } else { "" }
            );
            ctx.sync_engine.sync_all().await?;
        }
        Command::Record { payload } => {
            let id = ctx.event_store.append_raw(&payload).await?;
            println!("{}", id);
            ctx.sync_engine.sync_all().await?;
        }
        Command::Logs { filter, pending } => {
            let mut records = match filter.as_deref() {
                Some(filter) => ctx.event_store.search(filter).await?,
                None => ctx.event_store.list_all().await?,
            };
            if pending {
                records.retain(|r| !r.synced);
            }
            records.reverse();

            for record in &records {
                println!(
                    "{:>6}  {}  {:<7}  {}",
                    record.id,
                    format_timestamp(record.timestamp),
                    if record.synced { "synced" } else { "pending" },
                    record.payload
                );
            }
            let stats = ctx.event_store.stats().await?;
            eprintln!(
                "{} total, {} synced, {} pending",
                stats.total, stats.synced, stats.pending
            );
        }
        Command::Sync => {
            let report = ctx.sync_engine.sync_all().await?;
            print_json(&report)?;
        }
        Command::RefreshRevocations => {
            let count = ctx.revocations.refresh_from(ctx.remote.as_ref()).await?;
            println!("Revocation list refreshed: {} entries", count);
        }
        Command::Revoked { id } => {
            let status = ctx.revocations.status(&id).await?;
            match status {
                RevocationStatus::Revoked { reason } => println!(
                    "{}: revoked{}",
                    id,
                    reason.map(|r| format!(" ({})", r)).unwrap_or_default()
                ),
                RevocationStatus::NotKnownRevoked => {
                    println!("{}: not known to be revoked", id)
                }
            }
        }
        Command::Export { format, output } => {
            let records = ctx.event_store.list_all().await?;
            let rendered = export::export(&records, format.into())?;
            match output {
                Some(path) => {
                    let path = if path.extension().is_none() {
                        path.with_extension(ExportFormat::from(format).extension())
                    } else {
                        path
                    };
                    tokio::fs::write(&path, rendered)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Exported {} records to {}", records.len(), path.display());
                }
                None => println!("{}", rendered),
            }
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to delete every record without --yes");
            }
            let removed = ctx.event_store.clear_all().await?;
            println!("Deleted {} records", removed);
        }
        Command::Capabilities => {
            let capabilities = ctx.verifier.capabilities().await?;
            print_json(&capabilities)?;
        }
        Command::Run => run(ctx).await?,
        Command::MockAuthority { .. } => bail!("mock-authority does not use the local stores"),
    }

    Ok(())
}

/// Sync in the background, optionally serving the status endpoint
async fn run(ctx: AppContext) -> Result<()> {
    let ctx = Arc::new(ctx);
    let coordinator = Arc::new(SyncCoordinator::new(Arc::clone(&ctx)));
    let jobs = coordinator.start();

    let status_port = ctx.config.status.port;
    let status = status_port.map(|port| {
        let ctx = (*ctx).clone();
        tokio::spawn(async move { server::serve(ctx, port).await })
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    for job in jobs {
        job.abort();
    }
    if let Some(status) = status {
        status.abort();
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
