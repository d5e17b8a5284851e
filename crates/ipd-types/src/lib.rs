/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input exceeded the maximum permitted length
    #[error("Text exceeds maximum length of {max} characters")]
    TooLong { max: usize },
    /// The input contained characters outside the permitted set
    #[error("Text contains invalid characters: {0}")]
    InvalidCharacters(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TextError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Prefix of a human-readable reference number, such as `ADM` in `ADM202601150001`.
///
/// A prefix is 1 to 8 ASCII uppercase letters or digits. It is embedded verbatim in reference
/// numbers and in the row predicate used to count them, so nothing that could act as a
/// pattern wildcard is allowed through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequencePrefix(String);

impl SequencePrefix {
    /// Maximum prefix length in characters.
    pub const MAX_LEN: usize = 8;

    /// Creates a validated prefix. Surrounding whitespace is trimmed.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TextError::TooLong { max: Self::MAX_LEN });
        }
        if !trimmed
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(TextError::InvalidCharacters(
                "only A-Z and 0-9 are allowed".into(),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SequencePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for SequencePrefix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SequencePrefix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SequencePrefix::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Ward A  ").expect("should accept padded text");
        assert_eq!(text.as_str(), "Ward A");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        let err = NonEmptyText::new("   ").expect_err("whitespace should be rejected");
        assert!(matches!(err, TextError::Empty));
    }

    #[test]
    fn test_non_empty_text_deserialize_rejects_empty() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_sequence_prefix_accepts_uppercase_and_digits() {
        let prefix = SequencePrefix::new("ADM2").expect("prefix should be valid");
        assert_eq!(prefix.to_string(), "ADM2");
    }

    #[test]
    fn test_sequence_prefix_rejects_lowercase_and_wildcards() {
        assert!(matches!(
            SequencePrefix::new("adm"),
            Err(TextError::InvalidCharacters(_))
        ));
        assert!(matches!(
            SequencePrefix::new("AD%"),
            Err(TextError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn test_sequence_prefix_rejects_long_input() {
        assert!(matches!(
            SequencePrefix::new("ABCDEFGHI"),
            Err(TextError::TooLong { max: 8 })
        ));
    }
}
