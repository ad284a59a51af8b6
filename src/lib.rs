//! Depot manifest acquisition for Steam games.
//!
//! Given a game's depots and their decryption keys this crate resolves each
//! depot's current manifest id, obtains a request code, downloads the
//! manifest from a content server and stores it in Steam's `depotcache`,
//! optionally with its filenames decrypted. Workshop item manifests are
//! acquired the same way, keyed by the item's UGC id.

pub mod broker;
pub mod cache;
pub mod catalog;
pub mod cdn;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod manifest;
pub mod prompt;
pub mod resolver;
pub mod workshop;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use downloader::{
    AcquiredManifest, DepotKeyPair, DownloadOptions, GameDescription, ManifestDownloader,
    ManifestSource,
};
pub use error::{Error, Result};
pub use resolver::ResolveMode;
