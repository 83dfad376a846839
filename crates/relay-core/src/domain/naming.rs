//! Naming convention - 入力キーと出力キーの対応付け
//!
//! ワーカーとは直接の通信路がないため、どの出力がどのジョブのものかは
//! キー文字列の規約だけで決まります。
//!
//! - **Legacy**: `input1/<fileName>` に置き、`baseName` を含む別キーを出力とみなす。
//!   既存ワーカーとの互換のための既定値。部分一致なので他ジョブのキーと衝突しうる。
//! - **Reserved**: `input1/<baseName>.<nonce>[.<ext>]` に置き、
//!   `input1/<baseName>.<nonce>.out[.<ext>]` に完全一致するキーだけを出力とみなす。

use serde::{Deserialize, Serialize};

use super::ids::JobId;

/// Namespace shared by inputs and outputs.
pub const INPUT_PREFIX: &str = "input1/";

/// Marker segment a worker inserts before the output extension under the reserved convention.
pub const RESERVED_OUTPUT_MARKER: &str = "out";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    #[default]
    Legacy,
    Reserved,
}

/// Split `name` at its final `.`.
///
/// A leading dot does not start an extension (`.env` has none), and an empty
/// trailing extension is dropped (`report.` -> `report`, `None`).
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        None | Some(0) => (name, None),
        Some(idx) => {
            let ext = &name[idx + 1..];
            (&name[..idx], (!ext.is_empty()).then_some(ext))
        }
    }
}

/// File name minus its final extension component.
pub fn base_name(file_name: &str) -> &str {
    split_extension(file_name).0
}

/// Last path segment of a storage key.
pub fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

impl NamingConvention {
    /// Storage key the input for `file_name` is written to.
    pub fn input_key(&self, file_name: &str, id: &JobId) -> String {
        match self {
            NamingConvention::Legacy => format!("{INPUT_PREFIX}{file_name}"),
            NamingConvention::Reserved => {
                let (base, ext) = split_extension(file_name);
                match ext {
                    Some(ext) => format!("{INPUT_PREFIX}{base}.{}.{ext}", id.nonce()),
                    None => format!("{INPUT_PREFIX}{base}.{}", id.nonce()),
                }
            }
        }
    }
}

/// Prefix every reserved output key for this base name and nonce starts with.
pub fn reserved_output_prefix(base_name: &str, nonce: &str) -> String {
    format!("{INPUT_PREFIX}{base_name}.{nonce}.{RESERVED_OUTPUT_MARKER}")
}

/// Exact reserved-pattern check: the prefix, then nothing or `.<ext>` without `/`.
pub fn matches_reserved_output(key: &str, prefix: &str) -> bool {
    let Some(rest) = key.strip_prefix(prefix) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    match rest.strip_prefix('.') {
        Some(ext) => !ext.is_empty() && !ext.contains('/'),
        None => false,
    }
}

/// Pieces recovered from a reserved input key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedInput {
    pub file_name: String,
    pub id: JobId,
}

/// Recover the original file name and job id from `input1/<base>.<nonce>[.<ext>]`.
pub fn parse_reserved_input(input_key: &str) -> Option<ReservedInput> {
    let name = input_key.strip_prefix(INPUT_PREFIX)?;
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() < 2 {
        return None;
    }

    let last = segments.len() - 1;
    // 末尾が nonce なら拡張子なし、そうでなければ末尾の 1 つ手前が nonce
    let (nonce_idx, ext) = if JobId::from_nonce(segments[last]).is_some() {
        (last, None)
    } else if segments.len() >= 3 && JobId::from_nonce(segments[last - 1]).is_some() {
        (last - 1, Some(segments[last]))
    } else {
        return None;
    };

    let base = segments[..nonce_idx].join(".");
    if base.is_empty() {
        return None;
    }
    let id = JobId::from_nonce(segments[nonce_idx])?;
    let file_name = match ext {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    };
    Some(ReservedInput { file_name, id })
}
