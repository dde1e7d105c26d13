//! Archive member resolution
//!
//! Uploaded archives must carry the fixed-name CSV member somewhere inside.
//! Zip containers are dispatched by suffix; everything else in the archive
//! set is treated as a tar with the compression sniffed from magic bytes,
//! mirroring what a `tar -xf`-style auto mode would do.

use std::borrow::Cow;
use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use faultdesk_common::FaultdeskError;

/// Fixed base name the system looks for inside supported containers.
pub const TARGET_ARCHIVE_MEMBER: &str = "alarm_local.csv";

const ARCHIVE_SUFFIXES: [&str; 8] = [
    ".zip", ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz",
];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: [u8; 3] = [b'B', b'Z', b'h'];
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// The bytes the table parser should consume, plus where they came from.
#[derive(Debug)]
pub struct AnalysisSource<'a> {
    /// Filename used for format dispatch downstream.
    pub filename: String,
    pub content: Cow<'a, [u8]>,
    /// Full member path inside the archive, when the upload was one.
    pub archive_member: Option<String>,
}

/// Suffix match against the fixed archive set, case-insensitive.
pub fn is_archive_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Resolve what to parse: the upload itself, or the target member extracted
/// from inside it.
pub fn resolve_analysis_source<'a>(
    filename: &str,
    content: &'a [u8],
) -> Result<AnalysisSource<'a>, FaultdeskError> {
    if !is_archive_filename(filename) {
        return Ok(AnalysisSource {
            filename: filename.to_string(),
            content: Cow::Borrowed(content),
            archive_member: None,
        });
    }

    let (member_path, member_bytes) = if filename.to_lowercase().ends_with(".zip") {
        find_target_in_zip(content)?
    } else {
        find_target_in_tar(content)?
    };

    Ok(AnalysisSource {
        filename: TARGET_ARCHIVE_MEMBER.to_string(),
        content: Cow::Owned(member_bytes),
        archive_member: Some(member_path),
    })
}

fn is_target_member(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().eq_ignore_ascii_case(TARGET_ARCHIVE_MEMBER))
        .unwrap_or(false)
}

fn path_depth(path: &str) -> usize {
    path.matches('/').count()
}

fn find_target_in_zip(content: &[u8]) -> Result<(String, Vec<u8>), FaultdeskError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content))
        .map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?;

    let mut candidates: Vec<(usize, String, u64)> = Vec::new();
    for index in 0..archive.len() {
        let member = archive
            .by_index(index)
            .map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_string();
        if is_target_member(&name) {
            candidates.push((index, name, member.size()));
        }
    }
    if candidates.is_empty() {
        return Err(FaultdeskError::MissingMember);
    }

    // Shallowest path first, then smallest size; the scan index keeps the
    // ordering stable for identical shapes.
    candidates.sort_by_key(|(index, name, size)| (path_depth(name), *size, *index));
    let (index, name, _) = candidates.remove(0);

    let mut member = archive
        .by_index(index)
        .map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?;
    let mut extracted = Vec::new();
    member
        .read_to_end(&mut extracted)
        .map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?;
    if extracted.is_empty() {
        return Err(FaultdeskError::EmptyMember(name));
    }
    Ok((name, extracted))
}

/// Pick the decompressor for a tar-family payload from its magic bytes.
fn tar_reader(content: &[u8]) -> Box<dyn Read + '_> {
    if content.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(content))
    } else if content.starts_with(&BZIP2_MAGIC) {
        Box::new(bzip2::read::BzDecoder::new(content))
    } else if content.starts_with(&XZ_MAGIC) {
        Box::new(XzDecoder::new(content))
    } else {
        Box::new(content)
    }
}

fn find_target_in_tar(content: &[u8]) -> Result<(String, Vec<u8>), FaultdeskError> {
    let mut archive = tar::Archive::new(tar_reader(content));

    // Tar has no central directory, so matching members are buffered while
    // streaming and the tie-break runs afterwards.
    let mut candidates: Vec<(String, Vec<u8>)> = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        if !is_target_member(&name) {
            continue;
        }
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| FaultdeskError::InvalidArchive(e.to_string()))?;
        candidates.push((name, data));
    }
    if candidates.is_empty() {
        return Err(FaultdeskError::MissingMember);
    }

    candidates.sort_by(|(name_a, data_a), (name_b, data_b)| {
        (path_depth(name_a), data_a.len())
            .cmp(&(path_depth(name_b), data_b.len()))
            .then_with(|| name_a.cmp(name_b))
    });
    let (name, extracted) = candidates.remove(0);
    if extracted.is_empty() {
        return Err(FaultdeskError::EmptyMember(name));
    }
    Ok((name, extracted))
}
