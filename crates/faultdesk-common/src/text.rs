//! Text cleaning helpers shared by the parsing and aggregation layers.

use crate::model::Row;

/// Values that spreadsheets and serializers commonly emit for missing cells.
const ABSENT_MARKERS: [&str; 3] = ["nan", "none", "null"];

/// Trim a value and substitute the fallback when it is blank or one of the
/// conventional absent markers (case-insensitive).
pub fn clean_text(value: &str, fallback: &str) -> String {
    let text = value.trim();
    if text.is_empty()
        || ABSENT_MARKERS
            .iter()
            .any(|marker| text.eq_ignore_ascii_case(marker))
    {
        return fallback.to_string();
    }
    text.to_string()
}

/// Probe a row for the first alias that holds a non-blank value.
///
/// The alias list is ordered; the first present, non-absent value wins.
pub fn pick_value(row: &Row, keys: &[&str], fallback: &str) -> String {
    for key in keys {
        if let Some(value) = row.get(*key) {
            let cleaned = clean_text(value, "");
            if !cleaned.is_empty() {
                return cleaned;
            }
        }
    }
    fallback.to_string()
}

/// Best-effort repair of multipart filenames whose UTF-8 bytes were
/// reinterpreted as Latin-1 by the transport. Keeps the original string when
/// the re-decode fails, and defaults when no name was supplied at all.
pub fn normalize_upload_filename(name: Option<&str>) -> String {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return "uploaded.xlsx".to_string();
    };

    if name.chars().all(|c| (c as u32) < 256) {
        let bytes: Vec<u8> = name.chars().map(|c| c as u8).collect();
        if let Ok(decoded) = String::from_utf8(bytes) {
            return decoded;
        }
    }
    name.to_string()
}
