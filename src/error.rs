//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A mandatory envelope section carried the wrong magic number.
    #[error("bad {section} magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        section: &'static str,
        expected: u32,
        found: u32,
    },

    /// The stream ended inside a section header or body.
    #[error("manifest truncated while reading {section}")]
    Truncated { section: &'static str },

    #[error("protobuf error: {0}")]
    Protobuf(#[from] protobuf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("unable to resolve manifest for depot {depot_id}")]
    ManifestUnresolved { depot_id: String },

    /// Every requested depot failed or was skipped.
    #[error("no manifests acquired for app {app_id}")]
    NothingAcquired { app_id: u32 },

    #[error("invalid depot key: {0}")]
    InvalidKey(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<dialoguer::Error> for Error {
    fn from(e: dialoguer::Error) -> Self {
        Error::Prompt(e.to_string())
    }
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::HttpStatus { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_magic_display() {
        let err = Error::BadMagic {
            section: "payload",
            expected: 0x71F617D0,
            found: 0xDEADBEEF,
        };
        let text = err.to_string();
        assert!(text.contains("payload"));
        assert!(text.contains("0x71f617d0"));
        assert!(text.contains("0xdeadbeef"));
    }

    #[test]
    fn test_network_classification() {
        assert!(Error::Network("refused".into()).is_network());
        assert!(
            Error::HttpStatus {
                status: 404,
                url: "http://x".into()
            }
            .is_network()
        );
        assert!(!Error::Truncated { section: "payload" }.is_network());
    }
}
