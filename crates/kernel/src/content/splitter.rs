//! Chunking of long text for providers with request size limits.
//!
//! Separators stay attached to the chunk they end, so concatenating the
//! chunks in order always reproduces the input exactly.

/// Sentence-ending punctuation; CJK forms need no trailing space.
const SENTENCE_ENDS: &[char] = &['.', '!', '?'];
const CJK_SENTENCE_ENDS: &[char] = &['。', '！', '？'];

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Prefers paragraph breaks, then line breaks, then sentence ends, then
/// whitespace, and only hard-cuts (on a character boundary) as a last resort.
pub fn split(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while let Some((limit, _)) = rest.char_indices().nth(max_chars) {
        let window = &rest[..limit];
        let cut = find_cut(window);
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Ordered concatenation of translated chunks.
pub fn join<S: AsRef<str>>(chunks: &[S]) -> String {
    chunks.iter().map(AsRef::as_ref).collect()
}

/// Byte offset (always > 0) at which to end the next chunk.
fn find_cut(window: &str) -> usize {
    if let Some(idx) = window.rfind("\n\n")
        && idx > 0
    {
        return idx + 2;
    }
    if let Some(idx) = window.rfind('\n')
        && idx > 0
    {
        return idx + 1;
    }
    if let Some(cut) = sentence_cut(window) {
        return cut;
    }
    if let Some((idx, ch)) = window
        .char_indices()
        .rev()
        .find(|(idx, ch)| *idx > 0 && ch.is_whitespace())
    {
        return idx + ch.len_utf8();
    }
    window.len()
}

fn sentence_cut(window: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = window.char_indices().collect();
    for pos in (0..chars.len()).rev() {
        let (idx, ch) = chars[pos];
        if CJK_SENTENCE_ENDS.contains(&ch) {
            return Some(idx + ch.len_utf8());
        }
        if SENTENCE_ENDS.contains(&ch)
            && let Some(&(next_idx, next)) = chars.get(pos + 1)
            && next.is_whitespace()
        {
            return Some(next_idx + next.len_utf8());
        }
    }
    None
}
