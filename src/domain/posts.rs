//! Display helpers for posts and comments.

use std::fmt;

use crate::domain::entities::{CommentRecord, PostRecord};

/// Number of characters a post or comment shows when rendered as a short label.
pub const LETTERS_PER_STR: usize = 15;

/// Truncate `text` to at most `limit` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

impl fmt::Display for PostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(truncate_chars(&self.text, LETTERS_PER_STR))
    }
}

impl fmt::Display for CommentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(truncate_chars(&self.text, LETTERS_PER_STR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn truncate_chars_handles_multibyte_text() {
        assert_eq!(truncate_chars("Привет, мир и все остальные", 6), "Привет");
        assert_eq!(truncate_chars("short", 15), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn post_displays_as_truncated_text() {
        let post = PostRecord {
            id: 1,
            text: "a post that is clearly longer than fifteen characters".to_string(),
            pub_date: OffsetDateTime::UNIX_EPOCH,
            author_id: 1,
            group_id: None,
            image: None,
        };
        assert_eq!(post.to_string(), "a post that is ");
        assert_eq!(post.to_string().chars().count(), LETTERS_PER_STR);
    }
}
