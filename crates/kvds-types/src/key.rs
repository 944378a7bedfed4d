//! Key namespace codec.
//!
//! Every object lives under a fixed two-segment root. [`key()`] joins that
//! root with caller-supplied segments and appends a trailing separator;
//! [`parse_key()`] strips the root back off keys read from backend listings.
//! Construction never fails, parsing can.

use crate::error::TypeError;

/// Separator between key segments.
pub const SEPARATOR: char = '/';

/// Root segments shared by every key.
pub const ROOT_CHAIN: [&str; 2] = ["kvds", "datastore"];

/// Build a backend key from segments.
///
/// ```
/// use kvds_types::key;
///
/// assert_eq!(key(&["network", "n1"]), "kvds/datastore/network/n1/");
/// assert_eq!(key::<&str>(&[]), "kvds/datastore/");
/// ```
pub fn key<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = ROOT_CHAIN.join("/");
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment.as_ref());
    }
    out.push(SEPARATOR);
    out
}

/// Split a backend key back into the segments passed to [`key()`].
///
/// The key must contain the whole root chain plus at least one further
/// segment, and the root must match segment by segment.
pub fn parse_key(key: &str) -> Result<Vec<String>, TypeError> {
    let chain: Vec<&str> = key.trim_matches(SEPARATOR).split(SEPARATOR).collect();

    if chain.len() <= ROOT_CHAIN.len() || chain[..ROOT_CHAIN.len()] != ROOT_CHAIN[..] {
        return Err(TypeError::InvalidKey {
            key: key.to_string(),
        });
    }

    Ok(chain[ROOT_CHAIN.len()..]
        .iter()
        .map(|s| s.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn key_joins_root_and_segments() {
        assert_eq!(key(&["network", "n1"]), "kvds/datastore/network/n1/");
        assert_eq!(key(&["endpoint"]), "kvds/datastore/endpoint/");
    }

    #[test]
    fn key_with_no_segments_is_the_root() {
        assert_eq!(key::<String>(&[]), "kvds/datastore/");
    }

    #[test]
    fn parse_strips_root() {
        let segments = parse_key("kvds/datastore/network/n1/").unwrap();
        assert_eq!(segments, vec!["network", "n1"]);
    }

    #[test]
    fn parse_accepts_missing_separators() {
        let segments = parse_key("/kvds/datastore/network").unwrap();
        assert_eq!(segments, vec!["network"]);
    }

    #[test]
    fn parse_rejects_bare_root() {
        assert!(matches!(
            parse_key("kvds/datastore/"),
            Err(TypeError::InvalidKey { .. })
        ));
    }

    #[test]
    fn parse_rejects_short_keys() {
        assert!(parse_key("").is_err());
        assert!(parse_key("kvds").is_err());
    }

    #[test]
    fn parse_compares_segments_not_string_prefix() {
        assert!(parse_key("kvds/datastores/network/").is_err());
        assert!(parse_key("kvd/datastore/network/").is_err());
        assert!(parse_key("kvdsx/datastore/network/").is_err());
    }

    #[test]
    fn parse_rejects_foreign_root() {
        let err = parse_key("other/network/n1/").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidKey {
                key: "other/network/n1/".into()
            }
        );
    }

    proptest! {
        #[test]
        fn parse_inverts_key(segments in prop::collection::vec("[a-zA-Z0-9_.-]{1,12}", 1..6)) {
            prop_assert_eq!(parse_key(&key(&segments)).unwrap(), segments);
        }
    }
}
