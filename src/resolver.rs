//! Manifest id resolution.
//!
//! A depot's current manifest id normally sits right in its app's catalog
//! record, but shared redistributables and DLC-owned depots keep theirs in
//! another app's record. The resolver walks a fixed list of strategies in
//! increasing order of cost and takes the first hit:
//!
//! 1. [`Strategy::Direct`]: one dictionary read.
//! 2. [`Strategy::SharedInstall`]: follows `depotfromapp`, one extra fetch.
//! 3. [`Strategy::InnerDepot`]: scans every DLC record (fetched once per app).
//! 4. [`Strategy::Manual`]: asks the operator, always answers.

use std::collections::BTreeMap;

use crate::catalog::{
    AppRecord, CatalogProvider, dlc_ids, enter_path, id_string, public_manifest_gid,
};
use crate::error::{Error, Result};
use crate::prompt::Prompt;

/// Depot id to manifest id, filled in one depot at a time.
pub type DepotManifestMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ResolveMode {
    /// Catalog strategies, then ask.
    #[default]
    Auto,
    /// Catalog strategies only; unresolved depots are skipped.
    AutoOnly,
    /// Ask for every depot.
    Manual,
}

impl ResolveMode {
    pub fn uses_catalog(self) -> bool {
        !matches!(self, ResolveMode::Manual)
    }
}

#[derive(Debug)]
enum DlcData {
    NotFetched,
    Fetched(BTreeMap<u32, AppRecord>),
}

/// Everything the strategies know about the base app.
#[derive(Debug)]
pub struct ManifestContext {
    pub app_id: u32,
    pub app_data: AppRecord,
    dlc_data: DlcData,
}

impl ManifestContext {
    pub fn new(app_id: u32, app_data: AppRecord) -> Self {
        ManifestContext {
            app_id,
            app_data,
            dlc_data: DlcData::NotFetched,
        }
    }

    /// Catalog records of every DLC listed by the base app, fetched on first
    /// use. An app without a DLC list yields an empty map without a fetch.
    /// DLCs whose record failed to load are absent; the fetch is not retried.
    pub async fn dlc_data<C: CatalogProvider>(
        &mut self,
        catalog: &C,
    ) -> Result<&BTreeMap<u32, AppRecord>> {
        if let DlcData::NotFetched = self.dlc_data {
            let ids = dlc_ids(&self.app_data);
            let records = if ids.is_empty() {
                BTreeMap::new()
            } else {
                tracing::debug!("fetching {} DLC records for app {}", ids.len(), self.app_id);
                match catalog.app_info(&ids).await {
                    Ok(records) => records,
                    Err(e) => {
                        tracing::warn!("DLC records for app {} unavailable: {}", self.app_id, e);
                        BTreeMap::new()
                    }
                }
            };
            self.dlc_data = DlcData::Fetched(records);
        }
        match &self.dlc_data {
            DlcData::Fetched(records) => Ok(records),
            DlcData::NotFetched => Err(Error::Catalog("DLC records unavailable".into())),
        }
    }

    pub fn dlc_fetched(&self) -> bool {
        matches!(self.dlc_data, DlcData::Fetched(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    SharedInstall,
    InnerDepot,
    Manual,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Direct => "Direct",
            Strategy::SharedInstall => "Shared Install",
            Strategy::InnerDepot => "Inner Depot",
            Strategy::Manual => "Manual",
        }
    }

    pub async fn try_resolve<C: CatalogProvider, P: Prompt>(
        self,
        ctx: &mut ManifestContext,
        depot_id: &str,
        catalog: &C,
        prompt: &P,
    ) -> Result<Option<String>> {
        match self {
            Strategy::Direct => Ok(public_manifest_gid(&ctx.app_data, depot_id)),
            Strategy::SharedInstall => {
                let Some(owner) = enter_path(&ctx.app_data, &["depots", depot_id, "depotfromapp"])
                    .and_then(id_string)
                    .and_then(|id| id.parse::<u32>().ok())
                else {
                    return Ok(None);
                };
                match catalog.single_app_info(owner).await {
                    Ok(record) => Ok(public_manifest_gid(&record, depot_id)),
                    Err(e) => {
                        tracing::warn!("depot {}: owner app {} lookup failed: {}", depot_id, owner, e);
                        Ok(None)
                    }
                }
            }
            Strategy::InnerDepot => {
                let dlcs = match ctx.dlc_data(catalog).await {
                    Ok(dlcs) => dlcs,
                    Err(e) => {
                        tracing::warn!("depot {}: DLC lookup failed: {}", depot_id, e);
                        return Ok(None);
                    }
                };
                Ok(dlcs
                    .values()
                    .find(|dlc| enter_path(dlc, &["depots", depot_id]).is_some())
                    .and_then(|dlc| public_manifest_gid(dlc, depot_id)))
            }
            Strategy::Manual => {
                let answer = prompt.ask_text(&format!(
                    "Manifest ID for depot {} (blank to skip):",
                    depot_id
                ))?;
                Ok(Some(answer))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Empty when the operator chose to skip the depot.
    pub manifest_id: String,
    pub strategy: Strategy,
}

pub struct ManifestIdResolver {
    strategies: Vec<Strategy>,
}

impl ManifestIdResolver {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        ManifestIdResolver { strategies }
    }

    pub fn for_mode(mode: ResolveMode) -> Self {
        let strategies = match mode {
            ResolveMode::Auto => vec![
                Strategy::Direct,
                Strategy::SharedInstall,
                Strategy::InnerDepot,
                Strategy::Manual,
            ],
            ResolveMode::AutoOnly => vec![
                Strategy::Direct,
                Strategy::SharedInstall,
                Strategy::InnerDepot,
            ],
            ResolveMode::Manual => vec![Strategy::Manual],
        };
        Self::new(strategies)
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// First strategy to produce an id wins.
    pub async fn resolve<C: CatalogProvider, P: Prompt>(
        &self,
        ctx: &mut ManifestContext,
        depot_id: &str,
        catalog: &C,
        prompt: &P,
    ) -> Result<Resolved> {
        for &strategy in &self.strategies {
            if let Some(manifest_id) = strategy.try_resolve(ctx, depot_id, catalog, prompt).await? {
                tracing::debug!("depot {} resolved by {}", depot_id, strategy.name());
                return Ok(Resolved {
                    manifest_id,
                    strategy,
                });
            }
        }
        Err(Error::ManifestUnresolved {
            depot_id: depot_id.to_owned(),
        })
    }
}
