use crate::transfer_syntax::trim_uid;

/// Choose the transfer syntax of a presentation context.
///
/// Returns the first entry of `policy` which the peer also proposed, so our order of
/// preference decides between several acceptable proposals. Returns `None` if none of
/// the proposed transfer syntaxes are acceptable.
pub fn resolve_transfer_syntax<'a, P, S>(proposed: &[P], policy: &'a [S]) -> Option<&'a str>
where
    P: AsRef<str>,
    S: AsRef<str>,
{
    policy.iter().map(AsRef::as_ref).find(|candidate| {
        proposed
            .iter()
            .any(|ts| trim_uid(ts.as_ref()) == trim_uid(candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_syntax::*;
    use rstest::*;

    #[rstest]
    #[case(&["A", "B"], &["B", "A"], Some("B"))]
    #[case(&["B", "A"], &["B", "A"], Some("B"))]
    #[case(&["A"], &["B", "A"], Some("A"))]
    #[case(&["C", "D"], &["B", "A"], None)]
    #[case(&[], &["B", "A"], None)]
    #[case(&["A"], &[], None)]
    fn test_policy_order_wins(
        #[case] proposed: &[&str],
        #[case] policy: &[&str],
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(resolve_transfer_syntax(proposed, policy), expected)
    }

    #[test]
    fn test_deterministic() {
        let proposed = [IMPLICIT_VR_LITTLE_ENDIAN, JPEG_BASELINE, EXPLICIT_VR_LITTLE_ENDIAN];
        let policy = DEFAULT_STORAGE_TRANSFER_SYNTAXES;
        for _ in 0..100 {
            assert_eq!(
                resolve_transfer_syntax(&proposed, policy),
                Some(JPEG_BASELINE)
            );
        }
    }

    #[test]
    fn test_ignores_uid_padding() {
        let proposed = ["1.2.840.10008.1.2\0"];
        assert_eq!(
            resolve_transfer_syntax(&proposed, DEFAULT_VERIFICATION_TRANSFER_SYNTAXES),
            Some(IMPLICIT_VR_LITTLE_ENDIAN)
        );
    }
}
