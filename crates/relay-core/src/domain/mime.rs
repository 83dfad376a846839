//! MIME type table for downloaded outputs.

use super::naming::{file_name_of, split_extension};

pub const DEFAULT_MIME: &str = "application/octet-stream";

/// MIME type offered for an output, from the extension of its key.
///
/// Extensions are compared ASCII case-insensitively.
pub fn mime_for_key(key: &str) -> &'static str {
    let Some(ext) = split_extension(file_name_of(key)).1 else {
        return DEFAULT_MIME;
    };
    match ext.to_ascii_lowercase().as_str() {
        "json" => "application/json",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "txt" => "text/plain",
        _ => DEFAULT_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("input1/report_converted.json", "application/json")]
    #[case("input1/report.csv", "text/csv")]
    #[case("input1/feed.xml", "application/xml")]
    #[case("input1/notes.TXT", "text/plain")]
    #[case("input1/song.mp3", "application/octet-stream")]
    #[case("input1/README", "application/octet-stream")]
    #[case("input1.d/README", "application/octet-stream")]
    fn mime_table(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(mime_for_key(key), expected);
    }
}
