use crate::errors::ServiceError;
use deunicode::deunicode;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, SqlErr};

/// Width of the `slug` columns on vendors and products.
pub const MAX_SLUG_LEN: usize = 255;

/// Transliterates `name` to ASCII, lowercases it and joins its alphanumeric
/// runs with single dashes.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode(name);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Cuts an ASCII slug to at most `max` bytes without leaving a trailing dash.
fn truncate_slug(slug: &str, max: usize) -> &str {
    if slug.len() <= max {
        return slug;
    }
    slug[..max].trim_end_matches('-')
}

/// Returns the first of `base`, `base-1`, `base-2`, ... not present in `column`.
/// The base is shortened as needed so every candidate fits [`MAX_SLUG_LEN`].
pub async fn unique_slug<E, C>(db: &C, column: E::Column, name: &str) -> Result<String, ServiceError>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let slug = slugify(name);
    let base = truncate_slug(&slug, MAX_SLUG_LEN);
    if base.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "Cannot derive a slug from name {:?}",
            name
        )));
    }

    let mut candidate = base.to_string();
    let mut counter = 1u64;
    while E::find()
        .filter(column.eq(candidate.as_str()))
        .one(db)
        .await?
        .is_some()
    {
        candidate = suffixed(base, counter);
        counter += 1;
    }

    Ok(candidate)
}

fn suffixed(base: &str, counter: u64) -> String {
    let suffix = format!("-{}", counter);
    let stem = truncate_slug(base, MAX_SLUG_LEN - suffix.len());
    format!("{}{}", stem, suffix)
}

/// Maps a unique-constraint violation on insert to `Conflict`.
pub fn conflict_on_duplicate(err: DbErr, what: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(format!("{} already exists", what))
        }
        _ => ServiceError::db_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Blue  Widget"), "blue-widget");
        assert_eq!(slugify("A/B/C 2000"), "a-b-c-2000");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn slugify_transliterates_non_ascii() {
        assert_eq!(slugify("  --Café & Bar!! "), "cafe-bar");
        assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
        assert_eq!(slugify("Ørsted Ålesund"), "orsted-alesund");
        assert!(!slugify("Москва").is_empty());
    }

    #[test]
    fn suffixed_slug_fits_column() {
        let base = "a".repeat(MAX_SLUG_LEN);
        let first = suffixed(&base, 1);
        assert_eq!(first.len(), MAX_SLUG_LEN);
        assert!(first.ends_with("-1"));

        let tenth = suffixed(&base, 10);
        assert_eq!(tenth.len(), MAX_SLUG_LEN);
        assert!(tenth.ends_with("a-10"));

        // no double dash when the cut lands on a separator
        let dashed = format!("{}-b", "a".repeat(MAX_SLUG_LEN - 3));
        assert_eq!(suffixed(&dashed, 1), format!("{}-1", "a".repeat(MAX_SLUG_LEN - 3)));

        assert_eq!(suffixed("widget", 2), "widget-2");
    }
}
