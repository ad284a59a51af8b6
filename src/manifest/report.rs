//! Human-readable dump of a manifest, for inspection only.

use std::fmt::Write;

use data_encoding::HEXLOWER;

use super::envelope::ManifestEnvelope;

pub fn view(envelope: &ManifestEnvelope) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, envelope);
    out
}

fn write_report(out: &mut String, envelope: &ManifestEnvelope) -> std::fmt::Result {
    writeln!(out, "{} file mappings found.", envelope.mapping_count())?;
    writeln!(out, "PAYLOAD")?;
    for mapping in &envelope.payload.mappings {
        writeln!(out, "\n---")?;
        writeln!(out, "Name: {}", mapping.filename())?;
        if !mapping.linktarget().is_empty() {
            writeln!(out, "Link target: {}", mapping.linktarget())?;
        }
        writeln!(out, "Size: {}", mapping.size())?;
        writeln!(out, "Flags: {}", mapping.flags())?;
        writeln!(out, "SHA filename: {}", HEXLOWER.encode(mapping.sha_filename()))?;
        writeln!(out, "SHA content: {}", HEXLOWER.encode(mapping.sha_content()))?;
        writeln!(out, "Chunk count: {}", mapping.chunks.len())?;
        writeln!(out, "---")?;
        for (nth, chunk) in mapping.chunks.iter().enumerate() {
            writeln!(out, "Chunk #{}", nth + 1)?;
            writeln!(out, "SHA: {}", HEXLOWER.encode(chunk.sha()))?;
            writeln!(out, "CRC: {:x}", chunk.crc())?;
            writeln!(out, "Offset: {}", chunk.offset())?;
            writeln!(out, "CB Original: {}", chunk.cb_original())?;
            writeln!(out, "CB Compressed: {}", chunk.cb_compressed())?;
        }
    }

    let metadata = &envelope.metadata;
    writeln!(out, "METADATA")?;
    writeln!(out, "\n---")?;
    writeln!(out, "Depot ID: {}", metadata.depot_id())?;
    writeln!(out, "Manifest ID: {}", metadata.gid_manifest())?;
    writeln!(out, "Creation Time: {}", metadata.creation_time())?;
    writeln!(out, "Encrypted: {}", metadata.filenames_encrypted())?;
    writeln!(out, "CB Disk Original: {}", metadata.cb_disk_original())?;
    writeln!(out, "CB Disk Compressed: {}", metadata.cb_disk_compressed())?;
    writeln!(out, "Unique Chunks: {}", metadata.unique_chunks())?;
    writeln!(out, "CRC (Encrypted): {:x}", metadata.crc_encrypted())?;
    writeln!(out, "CRC (Clear): {:x}", metadata.crc_clear())?;
    writeln!(out, "---")?;

    let signature = envelope
        .signature
        .as_ref()
        .map(|s| s.signature())
        .filter(|s| !s.is_empty());
    match signature {
        Some(bytes) => writeln!(out, "Signature: {}", HEXLOWER.encode(bytes)),
        None => writeln!(out, "Signature: Missing"),
    }
}
