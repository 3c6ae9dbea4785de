use anyhow::Context as AnyhowContext;
use botanical_lister::ai::OpenAiClient;
use botanical_lister::config::{key_preview, load_env_file, Config};
use botanical_lister::drive::{DriveSource, GoogleDriveClient};
use botanical_lister::etsy::{EtsyClient, ListingPublisher};
use botanical_lister::processor::{ProcessOptions, Processor};
use botanical_lister::state::FileSystemStateRepository;
use botanical_lister::{loader, processor};
use botanical_types::folder::FolderRecord;
use botanical_types::state::StateRepository;
use botanical_types::FolderStatus;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use typesafe_repository::async_ops::{Get, List, Save};

#[derive(Parser, Debug)]
#[command(name = "botanical-lister")]
#[command(about = "Drafts Etsy listings from Google Drive product folders")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mark inbox folders without a state record as pending
    Discover,
    /// Process pending folders and export the results
    Process {
        /// Create Etsy draft listings (also enabled by ETSY_UPLOAD)
        #[arg(long)]
        upload: bool,
        /// Skip the CSV/XLSX export
        #[arg(long)]
        no_export: bool,
    },
    /// Discover, then process
    Run {
        #[arg(long)]
        upload: bool,
    },
    /// Show unfinished folders
    Status {
        /// Include successful folders
        #[arg(long)]
        all: bool,
    },
    /// Put a folder back to pending so the next run retries it
    Reset { folder_id: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(env::VarError::NotPresent) = env::var("RUST_LOG") {
        env::set_var("RUST_LOG", "INFO");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();
    load_env_file()?;

    let args = Args::parse();
    let config = Config::from_env()?;
    log::debug!("{config:?}");
    config.ensure_dirs()?;
    let state = Arc::new(FileSystemStateRepository::open(&config.state_file));

    match args.command {
        Command::Discover => {
            let drive = drive_client(&config)?;
            loader::discover(drive.as_ref(), state.as_ref(), &inbox(&config)?).await?;
        }
        Command::Process { upload, no_export } => {
            process(&config, state, upload, !no_export).await?;
        }
        Command::Run { upload } => {
            let drive = drive_client(&config)?;
            loader::discover(drive.as_ref(), state.as_ref(), &inbox(&config)?).await?;
            process(&config, state, upload, true).await?;
        }
        Command::Status { all } => {
            let records = if all {
                state.list().await?
            } else {
                state.unfinished(&FolderStatus::UNFINISHED).await?
            };
            if records.is_empty() {
                println!("No folders");
            }
            for r in records {
                println!(
                    "{:<8} {} {} [{}]",
                    r.status.to_string(),
                    r.id,
                    r.name,
                    r.platforms.keys().join(", ")
                );
            }
        }
        Command::Reset { folder_id } => {
            let record = state
                .get_one(&folder_id)
                .await?
                .with_context(|| format!("Folder {folder_id} has no state record"))?;
            log::info!("Resetting folder {} ({}) from {} to pending", record.name, record.id, record.status);
            state
                .save(FolderRecord {
                    status: FolderStatus::Pending,
                    ..record
                })
                .await?;
        }
    }
    Ok(())
}

fn http_client(config: &Config) -> Result<reqwest::Client, anyhow::Error> {
    Ok(reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .timeout(config.http_timeout)
        .use_rustls_tls()
        .build()?)
}

fn inbox(config: &Config) -> Result<String, anyhow::Error> {
    match config.inbox_folder_id.as_str() {
        "" => Err(anyhow::anyhow!("INBOX_FOLDER_ID is not set")),
        id => Ok(id.to_string()),
    }
}

fn drive_client(config: &Config) -> Result<Arc<dyn DriveSource>, anyhow::Error> {
    let token = config
        .google_access_token
        .clone()
        .context("GOOGLE_ACCESS_TOKEN is not set")?;
    Ok(Arc::new(GoogleDriveClient::new(http_client(config)?, token)))
}

async fn process(
    config: &Config,
    state: Arc<FileSystemStateRepository>,
    upload: bool,
    export: bool,
) -> Result<processor::ProcessReport, anyhow::Error> {
    let client = http_client(config)?;
    let api_key = config.openai.api_key.clone().context(
        "OPENAI_API_KEY is not set, export it or write it to config/credentials/openai_key.txt",
    )?;
    log::info!("Using OpenAI key {} with model {}", key_preview(&api_key), config.openai.model);
    let ai = OpenAiClient::new(
        client.clone(),
        api_key,
        config.openai.model.clone(),
        config.openai.base_url.clone(),
    );
    let publisher: Option<Arc<dyn ListingPublisher>> = match (upload || config.upload_to_etsy, &config.etsy) {
        (false, _) => None,
        (true, Some(etsy)) => Some(Arc::new(EtsyClient::new(client, etsy.clone()))),
        (true, None) => {
            return Err(anyhow::anyhow!(
                "Etsy upload requested but ETSY_CLIENT_ID, ETSY_REFRESH_TOKEN or ETSY_SHOP_ID is missing"
            ))
        }
    };
    let processor = Processor::new(
        drive_client(config)?,
        Arc::new(ai),
        state,
        publisher,
        ProcessOptions {
            temp_dir: config.temp_dir.clone(),
            ai_results_dir: config.ai_results_dir(),
            export_dir: config.export_dir(),
            naming_convention: config.naming_convention,
            default_taxonomy_id: config.default_taxonomy_id(),
            export,
        },
    );
    let report = processor.process_pending().await?;
    if let Some((csv, xlsx)) = &report.exported {
        log::info!("Export written to {csv:?} and {xlsx:?}");
    }
    Ok(report)
}
