use aes::{
    Aes256,
    cipher::{BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, block_padding::Pkcs7, generic_array::GenericArray},
};
use assert_cmd::prelude::*;
use data_encoding::{BASE64, HEXLOWER};
use depot_manifest::manifest::envelope::{END_MAGIC, METADATA_MAGIC, PAYLOAD_MAGIC, SIGNATURE_MAGIC};
use depot_manifest::manifest::proto::{
    ContentManifestMetadata, ContentManifestPayload, ContentManifestSignature, FileMapping,
};
use predicates::prelude::*;
use protobuf::Message;
use std::{fs, io::Write, path::Path, process::Command};

const KEY: [u8; 32] = [0x42; 32];

fn encrypt_name(plain: &str) -> String {
    let iv = [0x07u8; 16];
    let mut encrypted_iv = GenericArray::clone_from_slice(&iv);
    Aes256::new(GenericArray::from_slice(&KEY)).encrypt_block(&mut encrypted_iv);

    let msg = plain.as_bytes();
    let mut buf = vec![0u8; (msg.len() / 16 + 1) * 16];
    buf[..msg.len()].copy_from_slice(msg);
    let body = cbc::Encryptor::<Aes256>::new_from_slices(&KEY, &iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buf, msg.len())
        .unwrap()
        .to_vec();

    let mut out = encrypted_iv.to_vec();
    out.extend_from_slice(&body);
    BASE64.encode(&out)
}

fn section(out: &mut Vec<u8>, magic: u32, body: &[u8]) {
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}

/// A served manifest: one encrypted file, signed, inside a ZIP.
fn served_manifest() -> Vec<u8> {
    let mut mapping = FileMapping::new();
    mapping.set_filename(encrypt_name("save/data.bin"));
    mapping.set_size(4096);
    let mut payload = ContentManifestPayload::new();
    payload.mappings.push(mapping);

    let mut metadata = ContentManifestMetadata::new();
    metadata.set_depot_id(228_988);
    metadata.set_gid_manifest(4_740_032_384_826_825_263);
    metadata.set_filenames_encrypted(true);
    metadata.set_crc_encrypted(0xdead_beef);

    let mut envelope = Vec::new();
    section(&mut envelope, PAYLOAD_MAGIC, &payload.write_to_bytes().unwrap());
    section(&mut envelope, METADATA_MAGIC, &metadata.write_to_bytes().unwrap());
    let mut signature = ContentManifestSignature::new();
    signature.set_signature(vec![0x11; 32]);
    section(&mut envelope, SIGNATURE_MAGIC, &signature.write_to_bytes().unwrap());
    envelope.extend_from_slice(&END_MAGIC.to_le_bytes());

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("z", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(&envelope).unwrap();
    writer.finish().unwrap().into_inner()
}

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("depot-manifest").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("MANIFEST_REQUEST_CODE_URL")
        .env_remove("STEAM_CATALOG_URL")
        .env_remove("STEAM_PATH");
    cmd
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn view_served_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("228988_4740032384826825263.manifest");
    fs::write(&input, served_manifest()).unwrap();

    bin()
        .args(["view", path_str(&input)])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 file mappings found."))
        .stdout(predicate::str::contains("Depot ID: 228988"))
        .stdout(predicate::str::contains("Encrypted: true"))
        .stdout(predicate::str::contains(format!("Signature: {}", "11".repeat(32))));
}

#[test]
fn decrypt_then_view() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in.manifest");
    let output = tmp.path().join("out.manifest");
    fs::write(&input, served_manifest()).unwrap();

    bin()
        .args([
            "decrypt",
            path_str(&input),
            "--key",
            &HEXLOWER.encode(&KEY),
            "-o",
            path_str(&output),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Decrypting 1 file mappings..."))
        .stdout(predicate::str::contains("Decrypted manifest written to"));

    bin()
        .args(["view", path_str(&output)])
        .assert()
        .success()
        .stdout(predicate::str::contains("Name: save/data.bin"))
        .stdout(predicate::str::contains("Encrypted: false"))
        .stdout(predicate::str::contains("Signature: Missing"));
}

#[test]
fn decrypt_default_output_name() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in.manifest");
    fs::write(&input, served_manifest()).unwrap();

    bin()
        .args(["decrypt", path_str(&input), "-k", &HEXLOWER.encode(&KEY)])
        .assert()
        .success();
    assert!(tmp.path().join("in.manifest.decrypted").exists());
}

#[test]
fn decrypt_rejects_bad_key() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in.manifest");
    fs::write(&input, served_manifest()).unwrap();

    bin()
        .args(["decrypt", path_str(&input), "--key", "zz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid depot key"));
}

#[test]
fn view_rejects_garbage() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("junk.manifest");
    fs::write(&input, b"not a manifest!!").unwrap();

    bin()
        .args(["view", path_str(&input)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad payload magic"));
}

#[test]
fn download_requires_request_code_endpoint() {
    let tmp = tempfile::tempdir().unwrap();

    bin()
        .args([
            "download",
            "--app-id",
            "228980",
            "--depot",
            "228988:00",
            "--steam-path",
            path_str(tmp.path()),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no request code endpoint"));
}

#[test]
fn download_rejects_malformed_depot() {
    bin()
        .args(["download", "--app-id", "228980", "--depot", "abc:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid depot id"));
}

#[test]
fn workshop_requires_request_code_endpoint() {
    let tmp = tempfile::tempdir().unwrap();

    bin()
        .args([
            "workshop",
            "--item",
            "2862101234",
            "--steam-path",
            path_str(tmp.path()),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no request code endpoint"));
}
