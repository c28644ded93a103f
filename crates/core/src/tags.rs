//! Job tag validation.
//!
//! Tags are the name/value parameters substituted into a job's execution
//! template, so tag names share the placeholder identifier syntax used by
//! [`crate::template`].

use std::collections::HashSet;

use crate::error::CoreError;
use crate::template::is_parameter_name;

/// Maximum length of a tag name.
pub const MAX_TAG_NAME_LEN: usize = 64;

/// Maximum length of a tag value.
pub const MAX_TAG_VALUE_LEN: usize = 512;

/// Validate a full tag set submitted for one job.
///
/// - every name is a valid parameter identifier of at most 64 chars
/// - every value is at most 512 chars
/// - no name appears twice (`Conflict`)
pub fn validate_tag_set<'a, I>(tags: I) -> Result<(), CoreError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut seen = HashSet::new();
    for (name, value) in tags {
        if name.len() > MAX_TAG_NAME_LEN || !is_parameter_name(name) {
            return Err(CoreError::Validation(format!(
                "Invalid tag name '{name}': use letters, digits, '_', '.' or '-' \
                 (max {MAX_TAG_NAME_LEN} chars, not starting with a digit)"
            )));
        }
        if value.len() > MAX_TAG_VALUE_LEN {
            return Err(CoreError::Validation(format!(
                "Value of tag '{name}' exceeds {MAX_TAG_VALUE_LEN} characters"
            )));
        }
        if !seen.insert(name) {
            return Err(CoreError::Conflict(format!(
                "Duplicate tag name '{name}' in request"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn accepts_distinct_tags() {
        let tags = [("image", "etl:1.4"), ("region", "eu-west-1"), ("batch.size", "500")];
        assert!(validate_tag_set(tags).is_ok());
    }

    #[test]
    fn empty_set_is_valid() {
        assert!(validate_tag_set(std::iter::empty::<(&str, &str)>()).is_ok());
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let tags = [("image", "a"), ("image", "b")];
        assert_matches!(validate_tag_set(tags), Err(CoreError::Conflict(msg)) if msg.contains("image"));
    }

    #[test]
    fn rejects_bad_names() {
        assert_matches!(validate_tag_set([("", "x")]), Err(CoreError::Validation(_)));
        assert_matches!(validate_tag_set([("9lives", "x")]), Err(CoreError::Validation(_)));
        assert_matches!(validate_tag_set([("has space", "x")]), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_oversized_value() {
        let big = "v".repeat(MAX_TAG_VALUE_LEN + 1);
        assert_matches!(
            validate_tag_set([("payload", big.as_str())]),
            Err(CoreError::Validation(_))
        );
    }
}
