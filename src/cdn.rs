//! Content server selection and raw manifest download.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};

const STEAMPIPE_DIRECTORY_URL: &str =
    "https://api.steampowered.com/icontentserverdirectoryservice/getserversforsteampipe/v1";
const MAX_WEIGHTED_LOAD: f64 = 130.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentServer {
    pub host: String,
    pub uses_tls: bool,
}

impl ContentServer {
    /// Accepts `host`, `http://host` or `https://host`. A bare host is plain HTTP.
    pub fn parse(entry: &str) -> Self {
        let entry = entry.trim().trim_end_matches('/');
        if let Some(host) = entry.strip_prefix("https://") {
            ContentServer {
                host: host.to_owned(),
                uses_tls: true,
            }
        } else {
            ContentServer {
                host: entry.strip_prefix("http://").unwrap_or(entry).to_owned(),
                uses_tls: false,
            }
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.uses_tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.host)
    }
}

pub trait ServerDiscovery: Send + Sync {
    fn pick_server(&self) -> impl Future<Output = Result<ContentServer>> + Send;
}

fn round_robin(servers: &[ContentServer], next: &AtomicUsize) -> Result<ContentServer> {
    if servers.is_empty() {
        return Err(Error::Config("no content servers available".into()));
    }
    let index = next.fetch_add(1, Ordering::Relaxed) % servers.len();
    Ok(servers[index].clone())
}

/// Fixed list of servers, used in turn.
pub struct StaticServers {
    servers: Vec<ContentServer>,
    next: AtomicUsize,
}

impl StaticServers {
    pub fn new(servers: Vec<ContentServer>) -> Self {
        StaticServers {
            servers,
            next: AtomicUsize::new(0),
        }
    }
}

impl ServerDiscovery for StaticServers {
    async fn pick_server(&self) -> Result<ContentServer> {
        round_robin(&self.servers, &self.next)
    }
}

/// Servers advertised by the Steam Web API, fetched once on first use.
pub struct SteamPipeDirectory<H: HttpClient> {
    http: H,
    servers: OnceCell<Vec<ContentServer>>,
    next: AtomicUsize,
}

impl<H: HttpClient> SteamPipeDirectory<H> {
    pub fn new(http: H) -> Self {
        SteamPipeDirectory {
            http,
            servers: OnceCell::new(),
            next: AtomicUsize::new(0),
        }
    }

    async fn load(&self) -> Result<Vec<ContentServer>> {
        let body = self.http.send(HttpRequest::get(STEAMPIPE_DIRECTORY_URL)).await?;
        let json: Value = serde_json::from_slice(&body)
            .map_err(|e| Error::Network(format!("bad server directory response: {}", e)))?;
        let servers = parse_servers(&json)?;
        tracing::debug!("{} content servers available", servers.len());
        Ok(servers)
    }
}

impl<H: HttpClient> ServerDiscovery for SteamPipeDirectory<H> {
    async fn pick_server(&self) -> Result<ContentServer> {
        let servers = self.servers.get_or_try_init(|| self.load()).await?;
        round_robin(servers, &self.next)
    }
}

/// Explicit servers when any were given, otherwise SteamPipe discovery.
pub enum ContentServers<H: HttpClient> {
    Fixed(StaticServers),
    SteamPipe(SteamPipeDirectory<H>),
}

impl<H: HttpClient> ContentServers<H> {
    pub fn new(servers: Vec<ContentServer>, http: H) -> Self {
        if servers.is_empty() {
            ContentServers::SteamPipe(SteamPipeDirectory::new(http))
        } else {
            ContentServers::Fixed(StaticServers::new(servers))
        }
    }
}

impl<H: HttpClient> ServerDiscovery for ContentServers<H> {
    async fn pick_server(&self) -> Result<ContentServer> {
        match self {
            ContentServers::Fixed(servers) => servers.pick_server().await,
            ContentServers::SteamPipe(directory) => directory.pick_server().await,
        }
    }
}

/// Keeps lightly loaded `steamcontent.com` servers from a
/// `GetServersForSteamPipe` response.
pub fn parse_servers(json: &Value) -> Result<Vec<ContentServer>> {
    let servers = json["response"]["servers"]
        .as_array()
        .ok_or_else(|| Error::Network("servers not found".into()))?;

    let mut list = Vec::new();
    for server in servers {
        let lightly_loaded = server["weighted_load"]
            .as_f64()
            .is_none_or(|load| load <= MAX_WEIGHTED_LOAD);
        if !lightly_loaded {
            continue;
        }
        if let Some(host) = server["host"].as_str() {
            if host.contains("steamcontent.com") {
                let uses_tls = matches!(
                    server["https_support"].as_str(),
                    Some("mandatory") | Some("optional")
                );
                list.push(ContentServer {
                    host: host.to_owned(),
                    uses_tls,
                });
            }
        }
    }
    Ok(list)
}

pub fn manifest_url(
    server: &ContentServer,
    depot_id: &str,
    manifest_id: &str,
    request_code: &str,
) -> String {
    format!(
        "{}/depot/{}/manifest/{}/5/{}",
        server.base_url(),
        depot_id,
        manifest_id,
        request_code
    )
}

pub struct ContentServerClient<D, H> {
    discovery: D,
    http: H,
}

impl<D: ServerDiscovery, H: HttpClient> ContentServerClient<D, H> {
    pub fn new(discovery: D, http: H) -> Self {
        ContentServerClient { discovery, http }
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Downloads the manifest exactly as served (usually a ZIP). No timeout.
    pub async fn fetch_raw(
        &self,
        depot_id: &str,
        manifest_id: &str,
        request_code: &str,
    ) -> Result<Vec<u8>> {
        let server = self.discovery.pick_server().await?;
        let url = manifest_url(&server, depot_id, manifest_id, request_code);
        tracing::debug!("download manifest from {}", url);
        self.http.send(HttpRequest::get(url)).await
    }
}
