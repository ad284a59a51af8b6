//! Workshop item manifests.
//!
//! A workshop item's content lives in a UGC manifest served from the
//! depot of its consumer app, keyed by the item's `hcontent_file` id. The
//! manifest is stored as served; UGC filenames are not encrypted with a
//! depot key.

use std::future::Future;

use serde_json::Value;

use crate::catalog::id_string;
use crate::downloader::{AcquiredManifest, Backend, ManifestDownloader};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};
use crate::prompt::Prompt;
use crate::resolver::ResolveMode;

pub const PUBLISHED_FILE_DETAILS_URL: &str =
    "https://api.steampowered.com/ISteamRemoteStorage/GetPublishedFileDetails/v1/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkshopItem {
    pub workshop_id: u64,
    pub app_id: Option<u32>,
    /// `hcontent_file`, the manifest id of the item's content.
    pub ugc_id: Option<String>,
    pub title: Option<String>,
}

pub trait WorkshopDetails: Send + Sync {
    /// `None` when the item does not exist or is not visible.
    fn item_details(
        &self,
        workshop_id: u64,
    ) -> impl Future<Output = Result<Option<WorkshopItem>>> + Send;
}

/// `ISteamRemoteStorage/GetPublishedFileDetails`, which needs no API key.
pub struct PublishedFileDetails<H: HttpClient> {
    http: H,
    url: String,
}

impl<H: HttpClient> PublishedFileDetails<H> {
    pub fn new(http: H) -> Self {
        Self::with_url(http, PUBLISHED_FILE_DETAILS_URL)
    }

    pub fn with_url(http: H, url: impl Into<String>) -> Self {
        PublishedFileDetails {
            http,
            url: url.into(),
        }
    }
}

impl<H: HttpClient> WorkshopDetails for PublishedFileDetails<H> {
    async fn item_details(&self, workshop_id: u64) -> Result<Option<WorkshopItem>> {
        let form = vec![
            ("itemcount".to_owned(), "1".to_owned()),
            ("publishedfileids[0]".to_owned(), workshop_id.to_string()),
        ];
        let body = self
            .http
            .send(HttpRequest::post_form(self.url.clone(), form))
            .await?;
        let json: Value = serde_json::from_slice(&body)
            .map_err(|e| Error::Catalog(format!("workshop item {}: {}", workshop_id, e)))?;
        Ok(parse_item_details(&json, workshop_id))
    }
}

/// Reads `response.publishedfiledetails[0]`. A `result` other than 1 means
/// the item is missing; an `hcontent_file` of 0 means it has no content.
pub fn parse_item_details(json: &Value, workshop_id: u64) -> Option<WorkshopItem> {
    let details = json.pointer("/response/publishedfiledetails/0")?;
    if details.get("result").and_then(Value::as_u64) != Some(1) {
        return None;
    }
    Some(WorkshopItem {
        workshop_id,
        app_id: details
            .get("consumer_app_id")
            .and_then(id_string)
            .and_then(|id| id.parse().ok()),
        ugc_id: details
            .get("hcontent_file")
            .and_then(id_string)
            .filter(|id| id != "0"),
        title: details
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UgcStrategy {
    Standard,
    Manual,
}

impl UgcStrategy {
    pub fn name(self) -> &'static str {
        match self {
            UgcStrategy::Standard => "Standard",
            UgcStrategy::Manual => "Manual",
        }
    }
}

pub struct UgcIdResolver {
    strategies: Vec<UgcStrategy>,
}

impl UgcIdResolver {
    pub fn for_mode(mode: ResolveMode) -> Self {
        let strategies = match mode {
            ResolveMode::Auto => vec![UgcStrategy::Standard, UgcStrategy::Manual],
            ResolveMode::AutoOnly => vec![UgcStrategy::Standard],
            ResolveMode::Manual => vec![UgcStrategy::Manual],
        };
        UgcIdResolver { strategies }
    }

    pub fn strategies(&self) -> &[UgcStrategy] {
        &self.strategies
    }

    /// Looks the item up at most once. An empty id means the operator
    /// skipped the item.
    pub async fn resolve<W: WorkshopDetails, P: Prompt>(
        &self,
        workshop_id: u64,
        details: &W,
        prompt: &P,
    ) -> Result<(Option<WorkshopItem>, String)> {
        let mut item = None;
        for &strategy in &self.strategies {
            let found = match strategy {
                UgcStrategy::Standard => {
                    match details.item_details(workshop_id).await {
                        Ok(found) => item = found,
                        Err(e) => {
                            tracing::warn!("workshop item {} lookup failed: {}", workshop_id, e)
                        }
                    }
                    item.as_ref().and_then(|item| item.ugc_id.clone())
                }
                UgcStrategy::Manual => {
                    let answer = prompt.ask_text(&format!(
                        "UGC ID for workshop item {} (blank to skip):",
                        workshop_id
                    ))?;
                    if !answer.chars().all(|c| c.is_ascii_digit()) {
                        return Err(Error::Config(format!("UGC id must be numeric: {}", answer)));
                    }
                    Some(answer)
                }
            };
            if let Some(ugc_id) = found {
                tracing::debug!("workshop item {} resolved by {}", workshop_id, strategy.name());
                return Ok((item, ugc_id));
            }
        }
        Err(Error::ManifestUnresolved {
            depot_id: format!("workshop item {}", workshop_id),
        })
    }
}

impl<B: Backend> ManifestDownloader<B> {
    /// Resolves the item's UGC id and stores its manifest as
    /// `{app_id}_{ugc_id}.manifest`. `app_id` overrides the item's consumer
    /// app. Returns `None` when the operator skipped the item.
    pub async fn download_workshop_item<W: WorkshopDetails>(
        &self,
        details: &W,
        workshop_id: u64,
        app_id: Option<u32>,
        mode: ResolveMode,
    ) -> Result<Option<AcquiredManifest>> {
        let resolver = UgcIdResolver::for_mode(mode);
        let (item, ugc_id) = resolver.resolve(workshop_id, details, self.prompt()).await?;
        if ugc_id.is_empty() {
            println!("Skipping workshop item {}", workshop_id);
            return Ok(None);
        }

        let app_id = app_id
            .or_else(|| item.as_ref().and_then(|item| item.app_id))
            .ok_or_else(|| {
                Error::Config(format!(
                    "app of workshop item {} is unknown; pass --app-id",
                    workshop_id
                ))
            })?;
        if let Some(title) = item.as_ref().and_then(|item| item.title.as_deref()) {
            println!("Workshop item {}: {}", workshop_id, title);
        }
        println!("\nApp {} - UGC {}", app_id, ugc_id);

        self.fetch_and_store(&app_id.to_string(), &ugc_id, None)
            .await
            .map(Some)
    }
}
