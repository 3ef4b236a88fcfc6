//! Collision-resistant remote file names.

use chrono::Utc;
use uuid::Uuid;

/// Extension used when the original name has none.
pub const DEFAULT_EXTENSION: &str = "png";

const SUFFIX_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Name for a freshly uploaded file: `{unix_millis}_{6 base36 chars}.{ext}`.
pub fn unique_file_name(original: &str) -> String {
    format!(
        "{}_{}.{}",
        Utc::now().timestamp_millis(),
        random_suffix(),
        extension(original)
    )
}

/// Extension of `original`, or [`DEFAULT_EXTENSION`].
pub fn extension(original: &str) -> &str {
    match original.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => DEFAULT_EXTENSION,
    }
}

fn random_suffix() -> String {
    let mut n = Uuid::new_v4().as_u128();
    let mut out = String::with_capacity(SUFFIX_LEN);
    for _ in 0..SUFFIX_LEN {
        out.push(BASE36[(n % 36) as usize] as char);
        n /= 36;
    }
    out
}

/// Join a configured folder and a file name, ignoring stray slashes.
pub(crate) fn join_path(folder: &str, file_name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", folder, file_name)
    }
}
