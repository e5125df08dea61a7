use regex::Regex;
use std::sync::OnceLock;

/// Make a string safe to use as a single path component: runs of characters other than
/// ASCII letters, digits, `.` and `-` become `_`. NUL bytes are dropped, and nothing
/// left at all becomes `_`.
pub(crate) fn sanitize<S: AsRef<str>>(s: S) -> String {
    let s_nonull = s.as_ref().replace('\0', "");
    let sanitized = VALID_CHARS_RE
        .get_or_init(|| Regex::new(r#"[^A-Za-z0-9\.\-]+"#).unwrap())
        .replace_all(s_nonull.trim(), "_");
    if sanitized.is_empty() {
        "_".to_string()
    } else if sanitized.chars().all(|c| c == '.') {
        // "." and ".." are not file names
        sanitized.replace('.', "_")
    } else {
        sanitized.to_string()
    }
}

static VALID_CHARS_RE: OnceLock<Regex> = OnceLock::new();

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("1.2.840.10008.5.1.4.1.1.2", "1.2.840.10008.5.1.4.1.1.2")]
    #[case("STORESCU  ", "STORESCU")]
    #[case("1.2.3\0", "1.2.3")]
    #[case("../../etc/passwd", ".._.._etc_passwd")]
    #[case("..", "__")]
    #[case("", "_")]
    #[case("   \0", "_")]
    #[case("MY AE/TITLE", "MY_AE_TITLE")]
    fn test_sanitize(#[case] given: &str, #[case] expected: &str) {
        assert_eq!(sanitize(given), expected)
    }
}
