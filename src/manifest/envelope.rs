use std::{
    borrow::Cow,
    io::{Cursor, Read},
};

use protobuf::Message;
use zip::ZipArchive;

use super::cipher::decrypt_filename;
use super::proto::{ContentManifestMetadata, ContentManifestPayload, ContentManifestSignature};
use crate::error::{Error, Result};

pub const PAYLOAD_MAGIC: u32 = 0x71F617D0;
pub const METADATA_MAGIC: u32 = 0x1F4812BE;
pub const SIGNATURE_MAGIC: u32 = 0x1B81B817;
pub const END_MAGIC: u32 = 0x32C415AB;

/// A parsed manifest. Lives only as long as one depot is being processed.
#[derive(Debug, Clone)]
pub struct ManifestEnvelope {
    pub payload: ContentManifestPayload,
    pub metadata: ContentManifestMetadata,
    /// `None` when the section is absent or unreadable.
    pub signature: Option<ContentManifestSignature>,
}

impl ManifestEnvelope {
    /// Parses a manifest, unwrapping a single-entry ZIP first if needed.
    ///
    /// The payload and metadata sections are mandatory and a wrong magic on
    /// either is fatal. Anything after them is read leniently.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let data = extract_inner(bytes);
        let mut cursor = Cursor::new(data.as_ref());

        let payload = read_section(&mut cursor, "payload", PAYLOAD_MAGIC)?;
        let metadata = read_section(&mut cursor, "metadata", METADATA_MAGIC)?;
        let payload = ContentManifestPayload::parse_from_bytes(payload)?;
        let metadata = ContentManifestMetadata::parse_from_bytes(metadata)?;

        let signature = match read_section(&mut cursor, "signature", SIGNATURE_MAGIC) {
            Ok(bytes) => ContentManifestSignature::parse_from_bytes(bytes).ok(),
            Err(e) => {
                tracing::debug!("signature section skipped: {}", e);
                None
            }
        };

        Ok(ManifestEnvelope {
            payload,
            metadata,
            signature,
        })
    }

    pub fn mapping_count(&self) -> usize {
        self.payload.mappings.len()
    }

    /// Decrypts every filename and link target in place.
    ///
    /// Chunk lists are left untouched. Entries that fail to decrypt keep
    /// their stored value.
    pub fn decrypt_filenames(&mut self, key: &[u8]) {
        for mapping in self.payload.mappings.iter_mut() {
            let filename = decrypt_filename(mapping.filename(), key);
            mapping.set_filename(filename);
            if !mapping.linktarget().is_empty() {
                let target = decrypt_filename(mapping.linktarget(), key);
                mapping.set_linktarget(target);
            }
        }
        self.metadata.set_filenames_encrypted(false);
    }
}

/// Returns the sole inner file of a ZIP container, or the input itself when
/// it is not one.
pub fn extract_inner(bytes: &[u8]) -> Cow<'_, [u8]> {
    match read_first_zip_entry(bytes) {
        Ok(inner) => Cow::Owned(inner),
        Err(e) => {
            tracing::debug!("not a zip container ({}), using raw bytes", e);
            Cow::Borrowed(bytes)
        }
    }
}

fn read_first_zip_entry(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entry = archive.by_index(0)?;
    let mut inner = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut inner)?;
    Ok(inner)
}

/// CRC-32 over the little-endian payload length followed by the payload.
pub fn crc_clear(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&(payload.len() as u32).to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Decrypts filenames and emits the four-section manifest Steam accepts:
/// payload, metadata (with `crc_clear` recomputed and `filenames_encrypted`
/// cleared), an empty signature and the end marker.
pub fn decrypt_and_reserialize(mut envelope: ManifestEnvelope, key: &[u8]) -> Result<Vec<u8>> {
    envelope.decrypt_filenames(key);

    let payload = envelope.payload.write_to_bytes()?;
    let crc = crc_clear(&payload);
    tracing::debug!("recalculated crc_clear {:08x}", crc);

    envelope.metadata.set_crc_clear(crc);
    let metadata = envelope.metadata.write_to_bytes()?;

    Ok(encode_sections(&payload, &metadata))
}

/// Parses raw downloaded bytes and returns the decrypted manifest file.
pub fn decrypt_manifest(raw: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let envelope = ManifestEnvelope::parse(raw)?;
    tracing::info!("decrypting {} file mappings", envelope.mapping_count());
    decrypt_and_reserialize(envelope, key)
}

fn encode_sections(payload: &[u8], metadata: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + metadata.len() + 28);
    out.extend_from_slice(&PAYLOAD_MAGIC.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&METADATA_MAGIC.to_le_bytes());
    out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    out.extend_from_slice(metadata);
    out.extend_from_slice(&SIGNATURE_MAGIC.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&END_MAGIC.to_le_bytes());
    out
}

fn read_u32(cursor: &mut Cursor<&[u8]>, section: &'static str) -> Result<u32> {
    let mut buf = [0u8; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| Error::Truncated { section })?;
    Ok(u32::from_le_bytes(buf))
}

fn read_section<'a>(
    cursor: &mut Cursor<&'a [u8]>,
    section: &'static str,
    expected: u32,
) -> Result<&'a [u8]> {
    let found = read_u32(cursor, section)?;
    if found != expected {
        return Err(Error::BadMagic {
            section,
            expected,
            found,
        });
    }
    let len = read_u32(cursor, section)? as usize;

    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start.checked_add(len).ok_or(Error::Truncated { section })?;
    if end > data.len() {
        return Err(Error::Truncated { section });
    }
    cursor.set_position(end as u64);
    Ok(&data[start..end])
}
