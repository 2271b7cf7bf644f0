//! Text extraction and truncation helpers.

/// Character budget for text sent to language detection.
pub const DETECTION_CHAR_LIMIT: usize = 1000;

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate to at most `max_bytes` bytes without splitting a character.
pub fn truncate_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Join non-empty parts with a blank line, as used for multi-field items.
pub fn join_fields<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Detection text: the joined fields cut to [`DETECTION_CHAR_LIMIT`].
pub fn detection_text<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let joined = join_fields(parts);
    truncate_chars(&joined, DETECTION_CHAR_LIMIT).to_string()
}
