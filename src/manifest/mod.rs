//! Depot manifest container handling.
//!
//! A manifest as served by a content server (or stored in Steam's
//! `depotcache`) is a sequence of magic-framed sections wrapping protobuf
//! messages:
//!
//! ```text
//! [u32 0x71F617D0][u32 len][ContentManifestPayload]
//! [u32 0x1F4812BE][u32 len][ContentManifestMetadata]
//! [u32 0x1B81B817][u32 len][ContentManifestSignature]
//! [u32 0x32C415AB]
//! ```
//!
//! Content servers usually deliver it wrapped in a single-entry ZIP.

pub mod cipher;
pub mod envelope;
pub mod report;

pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));

    pub use content_manifest::content_manifest_payload::FileMapping;
    pub use content_manifest::content_manifest_payload::file_mapping::ChunkData;
    pub use content_manifest::{
        ContentManifestMetadata, ContentManifestPayload, ContentManifestSignature,
    };
}

pub use cipher::{decrypt_filename, parse_depot_key};
pub use envelope::{ManifestEnvelope, crc_clear, decrypt_and_reserialize, extract_inner};
pub use report::view;
