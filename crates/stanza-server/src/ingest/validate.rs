//! Row validation
//!
//! Applies the fixed post schema to one row. Only the FIRST violation is
//! reported; the batch report is keyed one-row-to-one-message, so this is
//! deliberate policy rather than an accumulation shortcut.

use url::Url;

use super::rows::RowRecord;

/// Maximum slug length accepted by the post schema.
pub const MAX_SLUG_LEN: usize = 96;

/// Validate one row against the post schema
///
/// Checks run in a fixed order (body, meta, title, author, language,
/// category, slug, image URL) and stop at the first violation. Messages
/// name the offending column the way the export's operators see it.
pub fn validate_row(row: &RowRecord) -> Result<(), String> {
    require(&row.body, "Body")?;
    require(&row.meta, "Meta")?;
    require(&row.title, "Title")?;
    require(&row.author, "Author")?;
    require(&row.language, "Language")?;
    require(&row.category, "Category")?;

    require(&row.slug, "URL Slug")?;
    if row.slug.trim().chars().count() > MAX_SLUG_LEN {
        return Err(format!(
            "\"URL Slug\" length must be less than or equal to {MAX_SLUG_LEN} characters long"
        ));
    }

    require(&row.image_url, "Image - Assets")?;
    if Url::parse(row.image_url.trim()).is_err() {
        return Err("\"Image - Assets\" must be a valid uri".to_string());
    }

    Ok(())
}

fn require(value: &str, column: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("\"{column}\" is not allowed to be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_row() -> RowRecord {
        RowRecord {
            body: "<p>Hello</p>".to_string(),
            meta: "A post".to_string(),
            title: "Hello".to_string(),
            author: "Jane Doe".to_string(),
            language: "English".to_string(),
            category: "News".to_string(),
            slug: "hello".to_string(),
            image_url: "https://images.example.com/cover.jpg".to_string(),
            ..RowRecord::default()
        }
    }

    #[test]
    fn test_valid_row_passes() {
        assert!(validate_row(&valid_row()).is_ok());
    }

    #[test]
    fn test_missing_field_names_the_column() {
        let row = RowRecord {
            author: "  ".to_string(),
            ..valid_row()
        };
        assert_eq!(
            validate_row(&row).unwrap_err(),
            "\"Author\" is not allowed to be empty"
        );
    }

    #[test]
    fn test_first_error_only() {
        // Both body and title are missing; only the body violation (first
        // in check order) is reported.
        let row = RowRecord {
            body: String::new(),
            title: String::new(),
            ..valid_row()
        };
        assert_eq!(
            validate_row(&row).unwrap_err(),
            "\"Body\" is not allowed to be empty"
        );
    }

    #[test]
    fn test_slug_length_limit() {
        let row = RowRecord {
            slug: "s".repeat(MAX_SLUG_LEN + 1),
            ..valid_row()
        };
        let message = validate_row(&row).unwrap_err();
        assert!(message.contains("URL Slug"), "got: {message}");

        let row = RowRecord {
            slug: "s".repeat(MAX_SLUG_LEN),
            ..valid_row()
        };
        assert!(validate_row(&row).is_ok());
    }

    #[test]
    fn test_slug_length_counts_characters_not_bytes() {
        // "é" is two bytes in UTF-8; 96 of them is still within the limit.
        let row = RowRecord {
            slug: "é".repeat(MAX_SLUG_LEN),
            ..valid_row()
        };
        assert!(validate_row(&row).is_ok());

        let row = RowRecord {
            slug: "é".repeat(MAX_SLUG_LEN + 1),
            ..valid_row()
        };
        assert!(validate_row(&row).is_err());
    }

    #[test]
    fn test_image_url_must_be_absolute() {
        let row = RowRecord {
            image_url: "not a url".to_string(),
            ..valid_row()
        };
        assert_eq!(
            validate_row(&row).unwrap_err(),
            "\"Image - Assets\" must be a valid uri"
        );
    }
}
