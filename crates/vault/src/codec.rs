// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Streaming gzip for VaultDB payloads
//!
//! Both directions move 4 MiB at a time and report two digest pairs: one
//! over the compressed bytes (what the store sees) and one over the content.
//! Decompression accepts multi-member gzip streams of any length.

use crate::Result;
use crate::digest::Digests;
use crate::io::{HashingReader, HashingWriter, read_chunk};
use diagnostics::*;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const CODEC_CHUNK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecReport {
    /// Digests of the uncompressed bytes
    pub content: Digests,
    /// Digests of the gzip stream
    pub compressed: Digests,
}

/// Gzip everything from `input` into `output`
pub fn compress<R: Read, W: Write>(input: R, output: W) -> Result<CodecReport> {
    let mut input = HashingReader::new(input);
    let mut encoder = GzEncoder::new(HashingWriter::new(output), Compression::default());
    let mut buf = vec![0u8; CODEC_CHUNK_SIZE];
    loop {
        let n = read_chunk(&mut input, &mut buf)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
    }

    let mut output = encoder.finish()?;
    output.flush()?;
    let (_, compressed) = output.into_parts();
    let (_, content) = input.into_parts();
    Ok(CodecReport {
        content: content.finish(),
        compressed: compressed.finish(),
    })
}

/// Gunzip everything from `input` into `output`
pub fn decompress<R: Read, W: Write>(input: R, output: W) -> Result<CodecReport> {
    let mut decoder = MultiGzDecoder::new(HashingReader::new(input));
    let mut output = HashingWriter::new(output);
    let mut buf = vec![0u8; CODEC_CHUNK_SIZE];
    loop {
        let n = read_chunk(&mut decoder, &mut buf)?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n])?;
    }
    output.flush()?;

    let (_, content) = output.into_parts();
    let (_, compressed) = decoder.into_inner().into_parts();
    Ok(CodecReport {
        content: content.finish(),
        compressed: compressed.finish(),
    })
}

pub fn compress_file(src: &Path, dest: &Path) -> Result<CodecReport> {
    let mut out = File::create(dest)?;
    let report = compress(File::open(src)?, &mut out)?;
    out.sync_all()?;
    log_report("Compressed", src, &report);
    Ok(report)
}

pub fn decompress_file(src: &Path, dest: &Path) -> Result<CodecReport> {
    let mut out = File::create(dest)?;
    let report = decompress(File::open(src)?, &mut out)?;
    out.sync_all()?;
    log_report("Decompressed", src, &report);
    Ok(report)
}

fn log_report(action: &str, path: &Path, report: &CodecReport) {
    let path = path.display().to_string();
    let content_bytes = report.content.bytes;
    let compressed_bytes = report.compressed.bytes;
    debug!("{action} {path}: {content_bytes} content bytes, {compressed_bytes} compressed bytes",
        action: action, path: path, content_bytes: content_bytes, compressed_bytes: compressed_bytes);
}
