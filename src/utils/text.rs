/// Longest prefix of `value` that fits in `max_bytes` without splitting a character.
pub fn truncate_utf8_prefix(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&i| value.is_char_boundary(i))
        .unwrap_or(0);
    value[..end].to_string()
}

/// Lossy UTF-8 rendering of a response body, cut at `max_bytes` with a trailing `...`.
pub fn body_preview(bytes: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max_bytes {
        return text.into_owned();
    }
    format!("{}...", truncate_utf8_prefix(&text, max_bytes))
}
