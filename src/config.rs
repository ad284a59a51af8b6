//! Runtime configuration shared by the networked subcommands.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::cache::FileCache;
use crate::catalog::DEFAULT_CATALOG_URL;
use crate::cdn::ContentServer;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Steam installation; manifests go to its `depotcache` folder
    #[arg(long, env = "STEAM_PATH", default_value = ".")]
    pub steam_path: PathBuf,

    /// Folder of previously saved manifests to adopt before downloading
    #[arg(long, default_value = "manifests")]
    pub saved_dir: PathBuf,

    /// Request code endpoint; `{manifest_id}` is substituted
    #[arg(long, env = "MANIFEST_REQUEST_CODE_URL")]
    pub request_code_url: Option<String>,

    /// App catalog endpoint; `{app_id}` is substituted
    #[arg(long, env = "STEAM_CATALOG_URL", default_value = DEFAULT_CATALOG_URL)]
    pub catalog_url: String,

    /// Content server to use instead of discovery (`host` or `https://host`)
    #[arg(long = "cdn")]
    pub cdn: Vec<String>,

    /// Pause between request code attempts
    #[arg(long, default_value_t = 1000)]
    pub retry_interval_ms: u64,

    /// Give up on the request code endpoint after this many attempts and ask
    #[arg(long)]
    pub max_code_attempts: Option<u32>,
}

impl Config {
    pub fn depotcache(&self) -> PathBuf {
        self.steam_path.join("depotcache")
    }

    pub fn file_cache(&self) -> FileCache {
        FileCache::new(self.depotcache()).with_seed_dir(self.saved_dir.clone())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn content_servers(&self) -> Vec<ContentServer> {
        self.cdn.iter().map(|entry| ContentServer::parse(entry)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        check_template("catalog URL", &self.catalog_url, "{app_id}")?;
        if let Some(url) = &self.request_code_url {
            check_template("request code URL", url, "{manifest_id}")?;
        }
        if self.max_code_attempts == Some(0) {
            return Err(Error::Config("--max-code-attempts must be at least 1".into()));
        }
        if self.cdn.iter().any(|entry| entry.trim().is_empty()) {
            return Err(Error::Config("empty --cdn entry".into()));
        }
        Ok(())
    }

    /// The broker template, required for downloading.
    pub fn require_request_code_url(&self) -> Result<&str> {
        self.request_code_url.as_deref().ok_or_else(|| {
            Error::Config(
                "no request code endpoint; pass --request-code-url or set MANIFEST_REQUEST_CODE_URL"
                    .into(),
            )
        })
    }
}

fn check_template(what: &str, url: &str, placeholder: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!("{} must be http(s): {}", what, url)));
    }
    if !url.contains(placeholder) {
        return Err(Error::Config(format!("{} is missing {}: {}", what, placeholder, url)));
    }
    Ok(())
}
