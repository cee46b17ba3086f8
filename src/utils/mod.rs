pub mod channel_alias;

/// Fold a channel name into a lookup key: lowercase, with whitespace and
/// common separator punctuation removed, so that "CCTV-1", "cctv 1" and
/// "CCTV_1" all collide.
pub fn normalize_lookup_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '_' | '.' | '/' | '·'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}
