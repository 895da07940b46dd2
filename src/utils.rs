use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("identity regex"));

/// Normalizes a phone-like customer identity: strips spaces, dashes and
/// dots, then validates the `+`-and-digits shape.
pub fn normalize_identity(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    if IDENTITY_RE.is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(Error::validation(format!("invalid customer identity '{}'", raw.trim())))
    }
}

/// Escapes HTML metacharacters in staff-entered free text before it is
/// stored alongside client records.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identity() {
        assert_eq!(normalize_identity("+54 911 2345-678").unwrap(), "+549112345678");
        assert_eq!(normalize_identity("5491123456789").unwrap(), "5491123456789");
        assert!(normalize_identity("not-a-phone").is_err());
        assert!(normalize_identity("+12").is_err());
        assert!(normalize_identity("").is_err());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_html("<script>\"x\"</script>"), "&lt;script&gt;&quot;x&quot;&lt;/script&gt;");
        assert_eq!(escape_html("plain note"), "plain note");
    }
}
