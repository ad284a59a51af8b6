use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use depot_manifest::catalog::HttpCatalog;
use depot_manifest::downloader::dlc_manifest_status;
use depot_manifest::http::ReqwestClient;
use depot_manifest::manifest::{
    ManifestEnvelope, envelope::decrypt_and_reserialize, parse_depot_key, view,
};
use depot_manifest::workshop::PublishedFileDetails;
use depot_manifest::{
    Config, DepotKeyPair, DownloadOptions, GameDescription, ManifestDownloader, ManifestSource,
    ResolveMode, Result,
};
use tokio::task::spawn_blocking;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "depot-manifest", version, about = "Fetch and decrypt Steam depot manifests")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve, download and store the manifests of a game's depots
    Download {
        #[arg(short, long)]
        app_id: u32,

        /// DEPOT:KEY with a hex key; an entry without a key is ignored
        #[arg(short, long = "depot", required = true)]
        depots: Vec<DepotKeyPair>,

        /// Decrypt filenames before writing
        #[arg(long)]
        decrypt: bool,

        #[arg(long, value_enum, default_value_t = ResolveMode::Auto)]
        mode: ResolveMode,

        #[command(flatten)]
        config: Config,
    },
    /// Download and store the manifest of a workshop item
    Workshop {
        /// Published file id of the item
        #[arg(short, long)]
        item: u64,

        /// App whose depot serves the item; looked up when omitted
        #[arg(short, long)]
        app_id: Option<u32>,

        #[arg(long, value_enum, default_value_t = ResolveMode::Auto)]
        mode: ResolveMode,

        #[command(flatten)]
        config: Config,
    },
    /// Decrypt the filenames of a manifest on disk
    Decrypt {
        input: PathBuf,

        #[arg(short, long)]
        key: String,

        /// Defaults to INPUT with a `.decrypted` suffix
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the contents of a manifest on disk
    View { input: PathBuf },
    /// Show the manifest of every DLC of an app and whether it is cached
    Status {
        #[arg(short, long)]
        app_id: u32,

        #[command(flatten)]
        config: Config,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Download {
            app_id,
            depots,
            decrypt,
            mode,
            config,
        } => {
            let game = GameDescription { app_id, depots };
            download(&config, &game, DownloadOptions { decrypt, mode }).await
        }
        Command::Workshop {
            item,
            app_id,
            mode,
            config,
        } => workshop(&config, item, app_id, mode).await,
        Command::Decrypt { input, key, output } => {
            let output = output.unwrap_or_else(|| suffixed(&input, ".decrypted"));
            decrypt_file(input, key, output).await
        }
        Command::View { input } => {
            let bytes = tokio::fs::read(&input).await?;
            let envelope = ManifestEnvelope::parse(&bytes)?;
            print!("{}", view(&envelope));
            Ok(())
        }
        Command::Status { app_id, config } => status(&config, app_id).await,
    }
}

async fn download(config: &Config, game: &GameDescription, options: DownloadOptions) -> Result<()> {
    let downloader = ManifestDownloader::from_config(config)?;

    let acquired = downloader.download_manifests(game, options).await?;
    let downloaded = acquired
        .iter()
        .filter(|m| m.source == ManifestSource::Downloaded)
        .count();
    println!(
        "\n{} manifest(s) in {} ({} downloaded, {} already present)",
        acquired.len(),
        config.depotcache().display(),
        downloaded,
        acquired.len() - downloaded
    );
    game.check_acquired(&acquired)
}

async fn workshop(
    config: &Config,
    workshop_id: u64,
    app_id: Option<u32>,
    mode: ResolveMode,
) -> Result<()> {
    let downloader = ManifestDownloader::from_config(config)?;
    let details = PublishedFileDetails::new(ReqwestClient::new()?);

    downloader
        .download_workshop_item(&details, workshop_id, app_id, mode)
        .await?;
    Ok(())
}

async fn decrypt_file(input: PathBuf, key: String, output: PathBuf) -> Result<()> {
    let key = parse_depot_key(&key)?;
    let raw = tokio::fs::read(&input).await?;
    let envelope = ManifestEnvelope::parse(&raw)?;
    println!("Decrypting {} file mappings...", envelope.mapping_count());

    let decrypted = spawn_blocking(move || decrypt_and_reserialize(envelope, &key))
        .await
        .map_err(std::io::Error::other)??;
    tokio::fs::write(&output, decrypted).await?;
    println!("Decrypted manifest written to {}", output.display());
    Ok(())
}

async fn status(config: &Config, app_id: u32) -> Result<()> {
    config.validate()?;
    let catalog = HttpCatalog::new(ReqwestClient::new()?, config.catalog_url.clone());
    let cache = config.file_cache();

    let statuses = dlc_manifest_status(&catalog, &cache, app_id).await?;
    if statuses.is_empty() {
        println!("App {} has no DLC", app_id);
    }
    for dlc in statuses {
        match dlc.manifest_id {
            Some(manifest_id) => println!(
                "DLC {}: manifest {} {}",
                dlc.dlc_id,
                manifest_id,
                if dlc.cached { "(cached)" } else { "(missing)" }
            ),
            None => println!("DLC {}: no depot", dlc.dlc_id),
        }
    }
    Ok(())
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
