/// Cache key for an address: trimmed, internal whitespace collapsed, case-folded.
pub fn normalize_address(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
