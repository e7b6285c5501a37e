//! Utility module, a grab-bag of functionality

/// Cut `s` to at most `limit` bytes without splitting a character.
pub fn truncate(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
