//! Fixtures shared by unit tests.

use aes::{
    Aes256,
    cipher::{BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, block_padding::Pkcs7, generic_array::GenericArray},
};
use data_encoding::BASE64;
use protobuf::Message;

use crate::manifest::envelope::{END_MAGIC, METADATA_MAGIC, PAYLOAD_MAGIC, SIGNATURE_MAGIC};
use crate::manifest::proto::{
    ChunkData, ContentManifestMetadata, ContentManifestPayload, ContentManifestSignature, FileMapping,
};

pub const TEST_KEY: [u8; 32] = [
    0x3b, 0x1f, 0x9a, 0x52, 0xc4, 0x07, 0x6e, 0xd8, 0x21, 0x90, 0x4c, 0xaf, 0x13, 0x77, 0xe2, 0x5d,
    0x88, 0x0b, 0x36, 0xf1, 0x6a, 0xc9, 0x2e, 0x45, 0xb7, 0x10, 0xdd, 0x83, 0x5c, 0x94, 0x0f, 0x61,
];

pub const TEST_KEY_HEX: &str = "3b1f9a52c4076ed821904caf1377e25d880b36f16ac92e45b710dd835c940f61";

/// Encrypts a filename the way depot manifests store it.
pub fn encrypt_filename(plain: &str, key: &[u8; 32]) -> String {
    let iv = [0x5au8; 16];

    let mut encrypted_iv = GenericArray::clone_from_slice(&iv);
    Aes256::new(GenericArray::from_slice(key)).encrypt_block(&mut encrypted_iv);

    let msg = plain.as_bytes();
    let mut buf = vec![0u8; (msg.len() / 16 + 1) * 16];
    buf[..msg.len()].copy_from_slice(msg);
    let body = cbc::Encryptor::<Aes256>::new_from_slices(key, &iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buf, msg.len())
        .unwrap()
        .to_vec();

    let mut out = encrypted_iv.to_vec();
    out.extend_from_slice(&body);
    BASE64.encode(&out)
}

pub fn chunk(seed: u8) -> ChunkData {
    let mut chunk = ChunkData::new();
    chunk.set_sha(vec![seed; 20]);
    chunk.set_crc(0x1000_0000 + seed as u32);
    chunk.set_offset(seed as u64 * 1_048_576);
    chunk.set_cb_original(1_048_576);
    chunk.set_cb_compressed(524_288 + seed as u32);
    chunk
}

pub fn mapping(filename: &str, chunks: usize) -> FileMapping {
    let mut mapping = FileMapping::new();
    mapping.set_filename(filename.to_owned());
    mapping.set_size(chunks as u64 * 1_048_576);
    mapping.set_flags(0);
    mapping.set_sha_filename(vec![0xab; 20]);
    mapping.set_sha_content(vec![0xcd; 20]);
    mapping.chunks = (0..chunks).map(|i| chunk(i as u8)).collect();
    mapping
}

pub fn metadata(encrypted: bool, crc_encrypted: u32) -> ContentManifestMetadata {
    let mut metadata = ContentManifestMetadata::new();
    metadata.set_depot_id(228_988);
    metadata.set_gid_manifest(4_740_032_384_826_825_263);
    metadata.set_creation_time(1_700_000_000);
    metadata.set_filenames_encrypted(encrypted);
    metadata.set_cb_disk_original(3 * 1_048_576);
    metadata.set_cb_disk_compressed(3 * 524_288);
    metadata.set_unique_chunks(3);
    metadata.set_crc_encrypted(crc_encrypted);
    metadata.set_crc_clear(0);
    metadata
}

/// Frames a payload and metadata; the signature and end marker are optional
/// so truncated shapes can be built too. `signature` is the signature value,
/// stored as a serialized `ContentManifestSignature`.
pub fn frame(
    payload: &ContentManifestPayload,
    metadata: &ContentManifestMetadata,
    signature: Option<&[u8]>,
    end_marker: bool,
) -> Vec<u8> {
    let payload = payload.write_to_bytes().unwrap();
    let metadata = metadata.write_to_bytes().unwrap();
    let mut out = Vec::new();
    out.extend_from_slice(&PAYLOAD_MAGIC.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&METADATA_MAGIC.to_le_bytes());
    out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    out.extend_from_slice(&metadata);
    if let Some(signature) = signature {
        let mut message = ContentManifestSignature::new();
        message.set_signature(signature.to_vec());
        let signature = message.write_to_bytes().unwrap();
        out.extend_from_slice(&SIGNATURE_MAGIC.to_le_bytes());
        out.extend_from_slice(&(signature.len() as u32).to_le_bytes());
        out.extend_from_slice(&signature);
    }
    if end_marker {
        out.extend_from_slice(&END_MAGIC.to_le_bytes());
    }
    out
}

/// An encrypted manifest with three files, one of them a symlink.
pub fn encrypted_manifest() -> Vec<u8> {
    let mut payload = ContentManifestPayload::new();
    payload
        .mappings
        .push(mapping(&encrypt_filename("save/data.bin", &TEST_KEY), 2));
    payload
        .mappings
        .push(mapping(&encrypt_filename("bin/game.exe", &TEST_KEY), 1));
    let mut link = mapping(&encrypt_filename("bin/latest", &TEST_KEY), 0);
    link.set_linktarget(encrypt_filename("bin/game.exe", &TEST_KEY));
    payload.mappings.push(link);

    let crc_encrypted = crate::manifest::crc_clear(&payload.write_to_bytes().unwrap());
    frame(&payload, &metadata(true, crc_encrypted), Some(&[0x11; 128]), true)
}

/// Wraps bytes in a single-entry ZIP archive.
pub fn zipped(name: &str, bytes: &[u8]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    use zip::{ZipWriter, write::SimpleFileOptions};

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(name, SimpleFileOptions::default()).unwrap();
    writer.write_all(bytes).unwrap();
    writer.finish().unwrap().into_inner()
}
