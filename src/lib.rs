//! twintrack library
//!
//! Streaming local-model chat where every answer exists on two tracks,
//! normal and deep thinking, that can be generated lazily and compared.

pub mod app;
pub mod conversation;
pub mod dataset;
pub mod inference;
pub mod prompt;
pub mod session;
pub mod storage;
pub mod types;
pub mod ui;

/// Safely truncate a string at a char boundary, never panics.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_respects_char_boundaries() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 3), "hel");
        assert_eq!(truncate_str("héllo", 2), "h");
    }
}
