use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::unbounded_channel;

mod aggregate;
mod app;
mod client;
mod config;
mod dashboard;
mod decode;
mod error;
mod logging;
mod models;
mod report;
mod store;
mod ui;

use client::{QueryClient, QuerySink};
use config::{StoreArgs, StoreConfig};
use error::DashboardError;
use logging::LogTarget;
use store::FirebaseStore;

#[derive(Parser)]
#[command(name = "attendance-dashboard")]
#[command(about = "Look up a student's attendance and see it broken down by course", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[command(flatten)]
    store: StoreArgs,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    verbose: bool,
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive dashboard
    Dashboard {
        /// Search for this student as soon as the dashboard opens
        #[arg(long)]
        student_id: Option<String>,
    },
    /// Print one student's course breakdown and exit
    Lookup {
        student_id: String,
        #[arg(long, default_value_t = 15)]
        wait_secs: u64,
        /// Also write the markdown report here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Export the course breakdown as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Dashboard { .. } => {
            let path = cli.log_file.clone().unwrap_or_else(logging::default_log_file);
            logging::init(LogTarget::File(&path), cli.verbose)?;
        }
        Commands::Lookup { .. } => match &cli.log_file {
            Some(path) => logging::init(LogTarget::File(path), cli.verbose)?,
            None => logging::init(LogTarget::Stderr, cli.verbose)?,
        },
    }

    let config = StoreConfig::from_args(&cli.store)?;
    let store = Arc::new(
        FirebaseStore::new(config).context("failed to build the Realtime Database client")?,
    );
    let (tx, mut rx) = unbounded_channel();
    let mut client = QueryClient::new(store, tx);

    match cli.command {
        Commands::Dashboard { student_id } => {
            tokio::task::block_in_place(|| app::run(client, rx, student_id))?;
        }
        Commands::Lookup {
            student_id,
            wait_secs,
            out,
            csv,
        } => {
            client.subscribe(&student_id)?;
            let delivery =
                client::first_delivery(&client, &mut rx, Duration::from_secs(wait_secs)).await?;
            client.cancel();

            let records = delivery.outcome?;
            if records.is_empty() {
                println!("{}", DashboardError::EmptyResult);
                return Ok(());
            }

            let report = report::build_report(student_id.trim(), &records);
            print!("{report}");
            if let Some(out) = out {
                std::fs::write(&out, &report)?;
                println!("Report written to {}.", out.display());
            }
            if let Some(csv) = csv {
                report::write_csv(&csv, &aggregate::aggregate(&records))?;
                println!("Course breakdown written to {}.", csv.display());
            }
        }
    }

    Ok(())
}
