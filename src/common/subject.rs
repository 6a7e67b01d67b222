use crate::error::{Error, Result};

/// Validates a subject the way the wire protocol requires: non-empty, no
/// whitespace (subjects are dot-delimited tokens written on a single
/// protocol line), no embedded CR/LF. Wildcard interpretation (`*`, `>`) is
/// the broker's job, not the client's — see GLOSSARY.
pub fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() {
        return Err(Error::bad_subject(subject));
    }
    if subject.bytes().any(|b| b.is_ascii_whitespace()) {
        return Err(Error::bad_subject(subject));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(validate_subject("").is_err());
        assert!(validate_subject("foo bar").is_err());
        assert!(validate_subject("foo\r\n").is_err());
    }

    #[test]
    fn accepts_dotted_subjects() {
        assert!(validate_subject("foo.bar.baz").is_ok());
        assert!(validate_subject("foo.*.baz").is_ok());
        assert!(validate_subject("foo.>").is_ok());
    }
}
