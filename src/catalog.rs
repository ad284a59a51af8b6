//! Steam app catalog (PICS product info) access.
//!
//! Records are kept as opaque JSON trees; only the handful of paths the
//! manifest resolver needs are interpreted here.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};

pub type AppRecord = Value;

pub const DEFAULT_CATALOG_URL: &str = "https://api.steamcmd.net/v1/info/{app_id}";

pub trait CatalogProvider: Send + Sync {
    /// Records for every app that could be loaded. Apps that fail are
    /// logged and left out of the map.
    fn app_info(
        &self,
        app_ids: &[u32],
    ) -> impl Future<Output = Result<BTreeMap<u32, AppRecord>>> + Send;

    fn single_app_info(&self, app_id: u32) -> impl Future<Output = Result<AppRecord>> + Send;
}

/// Walks nested objects by key, returning `None` as soon as a key is missing.
pub fn enter_path<'a>(record: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(record, |node, key| node.get(*key))
}

/// Catalog ids show up both as strings and as numbers.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `depots.<depot>.manifests.public.gid`
pub fn public_manifest_gid(record: &Value, depot_id: &str) -> Option<String> {
    enter_path(record, &["depots", depot_id, "manifests", "public", "gid"]).and_then(id_string)
}

/// App ids listed in `extended.listofdlc`. Unparseable entries are skipped.
pub fn dlc_ids(record: &Value) -> Vec<u32> {
    enter_path(record, &["extended", "listofdlc"])
        .and_then(Value::as_str)
        .map(|list| {
            list.split(',')
                .filter_map(|id| id.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Catalog backed by a JSON endpoint returning
/// `{"status": "success", "data": {"<app_id>": {...}}}`.
pub struct HttpCatalog<H: HttpClient> {
    http: H,
    url_template: String,
    cache: Mutex<HashMap<u32, AppRecord>>,
}

impl<H: HttpClient> HttpCatalog<H> {
    pub fn new(http: H, url_template: impl Into<String>) -> Self {
        HttpCatalog {
            http,
            url_template: url_template.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    fn cached(&self, app_id: u32) -> Option<AppRecord> {
        self.cache.lock().ok()?.get(&app_id).cloned()
    }

    async fn fetch(&self, app_id: u32) -> Result<AppRecord> {
        let url = self.url_template.replace("{app_id}", &app_id.to_string());
        let body = self.http.send(HttpRequest::get(url)).await?;
        let json: Value = serde_json::from_slice(&body)
            .map_err(|e| Error::Catalog(format!("app {}: {}", app_id, e)))?;

        if let Some(status) = json["status"].as_str() {
            if status != "success" {
                return Err(Error::Catalog(format!("app {}: status {}", app_id, status)));
            }
        }
        let record = json["data"][app_id.to_string()].clone();
        if record.is_null() {
            return Err(Error::Catalog(format!("app {} not found", app_id)));
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(app_id, record.clone());
        }
        Ok(record)
    }
}

impl<H: HttpClient> CatalogProvider for HttpCatalog<H> {
    async fn app_info(&self, app_ids: &[u32]) -> Result<BTreeMap<u32, AppRecord>> {
        let mut records = BTreeMap::new();
        for &app_id in app_ids {
            match self.single_app_info(app_id).await {
                Ok(record) => {
                    records.insert(app_id, record);
                }
                Err(e) => tracing::warn!("skipping app {}: {}", app_id, e),
            }
        }
        Ok(records)
    }

    async fn single_app_info(&self, app_id: u32) -> Result<AppRecord> {
        if let Some(record) = self.cached(app_id) {
            return Ok(record);
        }
        tracing::debug!("fetching catalog record for app {}", app_id);
        self.fetch(app_id).await
    }
}
