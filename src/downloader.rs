//! Per-game manifest acquisition.
//!
//! Depots are handled one after another:
//!
//! ```text
//! Pending -> ResolvingId -> AwaitingRequestCode -> Downloading -> (Decrypting) -> Written
//! ```
//!
//! A failure abandons only the depot it happened on.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio::task::spawn_blocking;

use crate::broker::{
    EnterKeyCancel, HttpRequestCodeSource, ManualCancel, RequestCodeBroker, RequestCodeSource,
};
use crate::cache::FileCache;
use crate::catalog::{CatalogProvider, HttpCatalog, dlc_ids, public_manifest_gid};
use crate::cdn::{ContentServerClient, ContentServers, ServerDiscovery};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{HttpClient, ReqwestClient};
use crate::manifest::{envelope::decrypt_manifest, extract_inner, parse_depot_key};
use crate::prompt::{Prompt, TerminalPrompt};
use crate::resolver::{DepotManifestMap, ManifestContext, ManifestIdResolver, ResolveMode};

/// A depot and its decryption key. An empty key marks an id that is not a
/// real depot (typically the base app id riding along).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotKeyPair {
    pub depot_id: String,
    pub decryption_key: String,
}

impl DepotKeyPair {
    pub fn new(depot_id: impl Into<String>, decryption_key: impl Into<String>) -> Self {
        DepotKeyPair {
            depot_id: depot_id.into(),
            decryption_key: decryption_key.into(),
        }
    }

    pub fn is_depot(&self) -> bool {
        !self.decryption_key.is_empty()
    }
}

/// `DEPOT:KEY`, or a bare `DEPOT` for an entry without a key.
impl FromStr for DepotKeyPair {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (depot_id, key) = s.split_once(':').unwrap_or((s, ""));
        let depot_id = depot_id.trim();
        if depot_id.is_empty() || !depot_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid depot id in {:?}", s));
        }
        Ok(DepotKeyPair::new(depot_id, key.trim()))
    }
}

/// A base app and the depots to fetch manifests for.
#[derive(Debug, Clone)]
pub struct GameDescription {
    pub app_id: u32,
    pub depots: Vec<DepotKeyPair>,
}

impl GameDescription {
    /// Entries that carry a key.
    pub fn depot_count(&self) -> usize {
        self.depots.iter().filter(|pair| pair.is_depot()).count()
    }

    /// Fails when real depots were requested but none ended up in the cache.
    pub fn check_acquired(&self, acquired: &[AcquiredManifest]) -> Result<()> {
        if acquired.is_empty() && self.depot_count() > 0 {
            return Err(Error::NothingAcquired {
                app_id: self.app_id,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Decrypt filenames before writing; otherwise the manifest is stored
    /// as served.
    pub decrypt: bool,
    pub mode: ResolveMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepotState {
    Pending,
    ResolvingId,
    AwaitingRequestCode,
    Downloading,
    Decrypting,
    Written,
}

impl fmt::Display for DepotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DepotState::Pending => "pending",
            DepotState::ResolvingId => "resolving id",
            DepotState::AwaitingRequestCode => "awaiting request code",
            DepotState::Downloading => "downloading",
            DepotState::Decrypting => "decrypting",
            DepotState::Written => "written",
        };
        f.write_str(name)
    }
}

fn enter(depot_id: &str, state: DepotState) {
    tracing::debug!(depot = depot_id, "{}", state);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    Downloaded,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredManifest {
    pub depot_id: String,
    pub manifest_id: String,
    pub path: PathBuf,
    pub source: ManifestSource,
}

/// The services a [`ManifestDownloader`] talks to.
pub trait Backend {
    type Catalog: CatalogProvider;
    type Codes: RequestCodeSource;
    type Cancel: ManualCancel;
    type Servers: ServerDiscovery;
    type Http: HttpClient;
    type Prompt: Prompt;
}

/// Steam Web API, the configured request code endpoint and the terminal.
pub struct Live;

impl Backend for Live {
    type Catalog = HttpCatalog<ReqwestClient>;
    type Codes = HttpRequestCodeSource<ReqwestClient>;
    type Cancel = EnterKeyCancel;
    type Servers = ContentServers<ReqwestClient>;
    type Http = ReqwestClient;
    type Prompt = TerminalPrompt;
}

pub struct ManifestDownloader<B: Backend = Live> {
    catalog: B::Catalog,
    broker: RequestCodeBroker<B::Codes, B::Cancel>,
    content: ContentServerClient<B::Servers, B::Http>,
    prompt: B::Prompt,
    cache: FileCache,
}

impl ManifestDownloader<Live> {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let http = ReqwestClient::new()?;

        let source = HttpRequestCodeSource::new(http.clone(), config.require_request_code_url()?);
        let broker = RequestCodeBroker::new(source, EnterKeyCancel)
            .with_retry_interval(config.retry_interval())
            .with_max_attempts(config.max_code_attempts);
        let servers = ContentServers::new(config.content_servers(), http.clone());

        Ok(ManifestDownloader::new(
            HttpCatalog::new(http.clone(), config.catalog_url.clone()),
            broker,
            ContentServerClient::new(servers, http),
            TerminalPrompt,
            config.file_cache(),
        ))
    }
}

impl<B: Backend> ManifestDownloader<B> {
    pub fn new(
        catalog: B::Catalog,
        broker: RequestCodeBroker<B::Codes, B::Cancel>,
        content: ContentServerClient<B::Servers, B::Http>,
        prompt: B::Prompt,
        cache: FileCache,
    ) -> Self {
        ManifestDownloader {
            catalog,
            broker,
            content,
            prompt,
            cache,
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub(crate) fn prompt(&self) -> &B::Prompt {
        &self.prompt
    }

    /// Resolves a manifest id for every real depot of the game. Depots that
    /// cannot be resolved, or that the operator skips, are left out.
    pub async fn resolve_manifest_ids(
        &self,
        game: &GameDescription,
        mode: ResolveMode,
    ) -> Result<DepotManifestMap> {
        let app_data = if mode.uses_catalog() {
            match self.catalog.single_app_info(game.app_id).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("catalog lookup for app {} failed: {}", game.app_id, e);
                    json!({})
                }
            }
        } else {
            json!({})
        };

        let mut ctx = ManifestContext::new(game.app_id, app_data);
        let resolver = ManifestIdResolver::for_mode(mode);
        let mut manifest_ids = DepotManifestMap::new();

        for pair in &game.depots {
            if !pair.is_depot() {
                tracing::debug!("Skipping {} because it has no decryption key", pair.depot_id);
                continue;
            }
            enter(&pair.depot_id, DepotState::Pending);
            enter(&pair.depot_id, DepotState::ResolvingId);

            match resolver
                .resolve(&mut ctx, &pair.depot_id, &self.catalog, &self.prompt)
                .await
            {
                Ok(resolved) if resolved.manifest_id.is_empty() => {
                    println!("Skipping depot {}", pair.depot_id);
                }
                Ok(resolved) => {
                    println!(
                        "Depot {} has manifest {} ({})",
                        pair.depot_id,
                        resolved.manifest_id,
                        resolved.strategy.name()
                    );
                    manifest_ids.insert(pair.depot_id.clone(), resolved.manifest_id);
                }
                Err(e) => {
                    tracing::error!("depot {}: {}", pair.depot_id, e);
                    eprintln!("Depot {} skipped: {}", pair.depot_id, e);
                }
            }
        }
        Ok(manifest_ids)
    }

    /// Resolves, downloads and stores the manifest of every depot, returning
    /// the manifests now present in the cache.
    pub async fn download_manifests(
        &self,
        game: &GameDescription,
        options: DownloadOptions,
    ) -> Result<Vec<AcquiredManifest>> {
        let manifest_ids = self.resolve_manifest_ids(game, options.mode).await?;

        let mut acquired = Vec::new();
        for pair in &game.depots {
            if !pair.is_depot() {
                tracing::debug!("Skipping {} because it's not a depot", pair.depot_id);
                continue;
            }
            let Some(manifest_id) = manifest_ids.get(&pair.depot_id) else {
                continue;
            };
            println!("\nDepot {} - Manifest {}", pair.depot_id, manifest_id);

            match self.acquire(pair, manifest_id, options.decrypt).await {
                Ok(manifest) => acquired.push(manifest),
                Err(e) => {
                    tracing::error!("depot {}: {}", pair.depot_id, e);
                    eprintln!("Depot {} failed: {}", pair.depot_id, e);
                }
            }
        }
        Ok(acquired)
    }

    async fn acquire(
        &self,
        pair: &DepotKeyPair,
        manifest_id: &str,
        decrypt: bool,
    ) -> Result<AcquiredManifest> {
        // Reject a bad key before spending a request code on it.
        let key = if decrypt {
            Some(parse_depot_key(&pair.decryption_key)?)
        } else {
            None
        };
        self.fetch_and_store(&pair.depot_id, manifest_id, key).await
    }

    /// Cache lookup, request code, download and write. With a key the
    /// filenames are decrypted first; otherwise the manifest is stored as
    /// served, unwrapped from its ZIP.
    pub(crate) async fn fetch_and_store(
        &self,
        depot_id: &str,
        manifest_id: &str,
        key: Option<Vec<u8>>,
    ) -> Result<AcquiredManifest> {
        let acquired = |path: PathBuf, source: ManifestSource| AcquiredManifest {
            depot_id: depot_id.to_owned(),
            manifest_id: manifest_id.to_owned(),
            path,
            source,
        };

        if let Some(path) = self.cache.lookup(depot_id, manifest_id).await? {
            println!("Manifest already saved. Skipping download...");
            return Ok(acquired(path, ManifestSource::Cached));
        }

        enter(depot_id, DepotState::AwaitingRequestCode);
        let request_code = self.broker.get(manifest_id, &self.prompt).await?;

        enter(depot_id, DepotState::Downloading);
        let raw = self.fetch_with_retry(depot_id, manifest_id, &request_code).await?;

        let bytes = match key {
            Some(key) => {
                enter(depot_id, DepotState::Decrypting);
                println!("Decrypting manifest {}...", manifest_id);
                spawn_blocking(move || decrypt_manifest(&raw, &key))
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))??
            }
            None => extract_inner(&raw).into_owned(),
        };

        let path = self.cache.write(depot_id, manifest_id, &bytes).await?;
        enter(depot_id, DepotState::Written);
        println!("Manifest created at: {}", path.display());
        Ok(acquired(path, ManifestSource::Downloaded))
    }

    /// Network failures are offered to the operator for another try.
    async fn fetch_with_retry(
        &self,
        depot_id: &str,
        manifest_id: &str,
        request_code: &str,
    ) -> Result<Vec<u8>> {
        loop {
            let spinner = spinner(format!("Downloading manifest {}", manifest_id));
            let result = self
                .content
                .fetch_raw(depot_id, manifest_id, request_code)
                .await
                .and_then(|raw| {
                    if raw.is_empty() {
                        Err(Error::Network("empty manifest response".into()))
                    } else {
                        Ok(raw)
                    }
                });
            spinner.finish_and_clear();

            match result {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_network() => {
                    println!("Network error: {}", e);
                    if self.prompt.ask_confirm("Try again?")? {
                        continue;
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlcStatus {
    pub dlc_id: u32,
    /// `None` when the DLC has no depot of its own.
    pub manifest_id: Option<String>,
    pub cached: bool,
}

/// For every DLC of an app, its public manifest and whether that manifest is
/// already in the cache.
pub async fn dlc_manifest_status<C: CatalogProvider>(
    catalog: &C,
    cache: &FileCache,
    app_id: u32,
) -> Result<Vec<DlcStatus>> {
    let app = catalog.single_app_info(app_id).await?;
    let ids = dlc_ids(&app);
    let records = if ids.is_empty() {
        BTreeMap::new()
    } else {
        catalog.app_info(&ids).await?
    };

    let mut statuses = Vec::with_capacity(ids.len());
    for dlc_id in ids {
        let depot_id = dlc_id.to_string();
        let manifest_id = records
            .get(&dlc_id)
            .and_then(|record| public_manifest_gid(record, &depot_id));
        let cached = match &manifest_id {
            Some(manifest_id) => cache.exists(&depot_id, manifest_id).await,
            None => false,
        };
        statuses.push(DlcStatus {
            dlc_id,
            manifest_id,
            cached,
        });
    }
    Ok(statuses)
}
