use aliri_braid::braid;
use std::str::FromStr;

/// Our AE title.
#[braid(serde)]
pub struct OurAETitle;

/// The AE title of a peer application entity talking to us.
#[braid(serde)]
pub struct ClientAETitle;

/// Which AE titles an association request may carry.
///
/// Parsed from a string: `*` accepts any title, anything else must match exactly
/// (ignoring the space padding of the AE title field).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum AeTitlePolicy {
    #[default]
    Any,
    Exact(String),
}

impl AeTitlePolicy {
    pub fn accepts(&self, ae_title: &str) -> bool {
        match self {
            AeTitlePolicy::Any => true,
            AeTitlePolicy::Exact(expected) => expected.as_str() == trim_ae_title(ae_title),
        }
    }
}

impl FromStr for AeTitlePolicy {
    type Err = InvalidAeTitle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            Ok(AeTitlePolicy::Any)
        } else if s.is_empty() || s.len() > 16 {
            Err(InvalidAeTitle(s.to_string()))
        } else {
            Ok(AeTitlePolicy::Exact(s.to_string()))
        }
    }
}

impl TryFrom<String> for AeTitlePolicy {
    type Error = InvalidAeTitle;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("\"{0}\" is not a valid AE title (must be 1 to 16 characters, or \"*\")")]
pub struct InvalidAeTitle(pub String);

/// AE titles are space-padded to 16 bytes on the wire.
pub(crate) fn trim_ae_title(ae_title: &str) -> &str {
    ae_title.trim_matches(|c: char| c == ' ' || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("*", AeTitlePolicy::Any)]
    #[case(" * ", AeTitlePolicy::Any)]
    #[case("EchoSCP", AeTitlePolicy::Exact("EchoSCP".to_string()))]
    fn test_parse_policy(#[case] given: &str, #[case] expected: AeTitlePolicy) {
        assert_eq!(given.parse::<AeTitlePolicy>().unwrap(), expected)
    }

    #[rstest]
    #[case("")]
    #[case("THIS-TITLE-IS-TOO-LONG")]
    fn test_parse_invalid_policy(#[case] given: &str) {
        assert!(given.parse::<AeTitlePolicy>().is_err())
    }

    #[rstest]
    #[case(AeTitlePolicy::Any, "WHATEVER", true)]
    #[case(AeTitlePolicy::Exact("EchoSCP".to_string()), "EchoSCP", true)]
    #[case(AeTitlePolicy::Exact("EchoSCP".to_string()), "EchoSCP         ", true)]
    #[case(AeTitlePolicy::Exact("EchoSCP".to_string()), "ECHOSCP", false)]
    #[case(AeTitlePolicy::Exact("EchoSCP".to_string()), "StoreSCP", false)]
    fn test_accepts(#[case] policy: AeTitlePolicy, #[case] ae_title: &str, #[case] expected: bool) {
        assert_eq!(policy.accepts(ae_title), expected)
    }
}
