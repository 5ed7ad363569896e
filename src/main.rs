mod commands;
mod config;
mod dom;
mod error;
mod extract;
mod harvester;
mod models;
mod observer;
mod pagination;
mod surface;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use crate::commands::{CommandRouter, ProgressPush};
use crate::config::AppConfig;
use crate::harvester::Harvester;
use crate::models::AcquisitionOptions;
use crate::observer::ChangeObserver;
use crate::surface::{SnapshotSurface, WebDriverSurface};

#[derive(Parser)]
#[command(name = "eta-harvester", about = "ETA portal invoice extraction", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scan one listing page from a saved file or a fetched address
    Scan {
        /// Saved HTML of the listing
        #[arg(short, long, required_unless_present = "url")]
        file: Option<PathBuf>,

        /// Address to fetch, or the address the saved file was taken from
        #[arg(short, long)]
        url: Option<Url>,
    },

    /// Collect every page of a live listing through WebDriver
    Collect {
        /// Listing address to open
        #[arg(short, long)]
        page: Url,

        /// Log progress per page
        #[arg(long)]
        progress: bool,
    },

    /// Answer host commands as JSON lines on stdin/stdout
    Serve {
        /// Listing address to open
        #[arg(short, long)]
        page: Url,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "eta_invoice_harvester=info,warn",
        1 => "eta_invoice_harvester=debug,info",
        _ => "trace",
    };

    // stdout carries data only
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scan { file, url } => {
            let surface = match file {
                Some(path) => SnapshotSurface::from_file(&path, url)
                    .await
                    .with_context(|| format!("reading {:?}", path))?,
                None => {
                    let url = url.context("either --file or --url is required")?;
                    SnapshotSurface::fetch(url, &config.fetch)
                        .await
                        .context("fetching listing")?
                }
            };
            let harvester = Harvester::new(Arc::new(surface), config.harvester);
            let data = harvester.rescan().await;
            info!(
                "Page {} of {}: {} invoices of {}",
                data.current_page,
                data.total_pages,
                data.invoices.len(),
                utils::fmt_number(data.total_count as i64)
            );
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Command::Collect { page, progress } => {
            let _t = utils::Timer::start("All-pages collection");
            let surface = Arc::new(open_session(&config, &page).await?);
            let harvester = Harvester::new(surface.clone(), config.harvester.clone());
            harvester.wait_for_page_load().await;

            let (tx, mut rx) = mpsc::unbounded_channel::<models::ProgressSnapshot>();
            let reporter = tokio::spawn(async move {
                while let Some(p) = rx.recv().await {
                    info!("{} ({:.0}%)", p.message, p.percentage);
                }
            });
            let result = harvester
                .collect_all_pages(&AcquisitionOptions { progress }, Some(&tx))
                .await;
            drop(tx);
            let _ = reporter.await;

            info!(
                "Collected {} of {} invoices",
                utils::fmt_number(result.total_processed as i64),
                utils::fmt_number(result.expected_total as i64)
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let Err(e) = surface.close().await {
                warn!("Closing session: {}", e);
            }
        }

        Command::Serve { page } => serve(config, page).await?,
    }

    Ok(())
}

async fn open_session(config: &AppConfig, page: &Url) -> Result<WebDriverSurface> {
    let surface = WebDriverSurface::connect(&config.webdriver)
        .await
        .context("connecting to WebDriver")?;
    surface
        .open(page.as_str())
        .await
        .with_context(|| format!("opening {}", page))?;
    Ok(surface)
}

async fn serve(config: AppConfig, page: Url) -> Result<()> {
    let surface = Arc::new(open_session(&config, &page).await?);
    let harvester = Arc::new(Harvester::new(surface.clone(), config.harvester.clone()));
    harvester.wait_for_page_load().await;
    harvester.rescan().await;

    let (mutations, drain) =
        surface.watch_mutations(Duration::from_millis(config.webdriver.mutation_poll_ms));
    let mut observer =
        ChangeObserver::attach(harvester.clone(), mutations, config.harvester.rescan_debounce());

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
            {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<ProgressPush>();
    let push_out = out_tx.clone();
    let pusher = tokio::spawn(async move {
        while let Some(push) = push_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&push) {
                let _ = push_out.send(line);
            }
        }
    });

    let router = Arc::new(CommandRouter::new(harvester, Some(push_tx)));
    let mut requests = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Serving commands for {}", page);

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let router = router.clone();
        let out = out_tx.clone();
        requests.spawn(async move {
            let response = router.handle_line(&line).await;
            match serde_json::to_string(&response) {
                Ok(json) => {
                    let _ = out.send(json);
                }
                Err(e) => warn!("Could not encode response: {}", e),
            }
        });
    }

    while requests.join_next().await.is_some() {}
    observer.detach();
    drain.abort();

    drop(router);
    drop(out_tx);
    let _ = pusher.await;
    let _ = writer.await;

    if let Err(e) = surface.close().await {
        warn!("Closing session: {}", e);
    }
    info!("Input closed, session ended");
    Ok(())
}
