//! Group slug derivation and validation.
//!
//! Slugs are ASCII (`slug` crate transliteration), limited to letters, digits,
//! hyphens and underscores, and at most [`GROUP_SLUG_MAX_CHARS`] long. A
//! caller-supplied predicate decides uniqueness so the logic stays pure.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

use crate::domain::entities::GROUP_SLUG_MAX_CHARS;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("slug `{slug}` may only contain letters, digits, hyphens and underscores")]
    InvalidCharacters { slug: String },
    #[error("slug exceeds {GROUP_SLUG_MAX_CHARS} characters")]
    TooLong,
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from human-readable text, truncated to the column limit.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    if candidate.len() > GROUP_SLUG_MAX_CHARS {
        candidate.truncate(GROUP_SLUG_MAX_CHARS);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    Ok(candidate)
}

/// Check an explicitly supplied slug.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::EmptyInput);
    }
    if slug.chars().count() > GROUP_SLUG_MAX_CHARS {
        return Err(SlugError::TooLong);
    }
    if !slug
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(SlugError::InvalidCharacters {
            slug: slug.to_string(),
        });
    }
    Ok(())
}

/// Derive a slug and retry with `-2`, `-3`, … suffixes until `is_unique` accepts one.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(base.clone())
        .await
        .map_err(SlugAsyncError::Predicate)?
    {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let suffix = format!("-{attempt}");
        let mut stem = base.clone();
        stem.truncate(GROUP_SLUG_MAX_CHARS - suffix.len());
        let candidate = format!("{stem}{suffix}");
        if is_unique(candidate.clone())
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[test]
    fn derive_slug_transliterates_cyrillic() {
        let slug = derive_slug("Привет мир").expect("slug");
        assert_eq!(slug, "privet-mir");
    }

    #[test]
    fn derive_slug_respects_column_limit() {
        let slug = derive_slug(&"word ".repeat(60)).expect("slug");
        assert!(slug.len() <= GROUP_SLUG_MAX_CHARS);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn validate_slug_rejects_spaces_and_overlong_input() {
        assert!(validate_slug("cats_and-dogs2").is_ok());
        assert!(matches!(
            validate_slug("two words"),
            Err(SlugError::InvalidCharacters { .. })
        ));
        assert_eq!(validate_slug(&"a".repeat(101)), Err(SlugError::TooLong));
        assert_eq!(validate_slug(""), Err(SlugError::EmptyInput));
    }

    #[tokio::test]
    async fn unique_slug_appends_counter() {
        let taken = ["book-club".to_string(), "book-club-2".to_string()];
        let slug = generate_unique_slug_async("Book Club", |candidate| {
            let free = !taken.contains(&candidate);
            async move { Ok::<_, Infallible>(free) }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug, "book-club-3");
    }
}
