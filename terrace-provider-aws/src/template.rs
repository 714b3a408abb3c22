//! Template body digests
//!
//! Template bodies can be large, so state keeps only their SHA-1 digest.

use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 digest of a template body
pub fn template_hash(body: &str) -> String {
    hex::encode(Sha1::digest(body.as_bytes()))
}

/// Template body as returned by Cloud Control, reduced to its digest
///
/// Cloud Control may return the body as a JSON document instead of the
/// submitted string; that document is hashed in its compact form.
pub fn template_hash_from_json(body: &serde_json::Value) -> String {
    match body {
        serde_json::Value::String(s) => template_hash(s),
        other => template_hash(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_hash() {
        assert_eq!(template_hash(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            template_hash("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_template_hash_from_json() {
        assert_eq!(
            template_hash_from_json(&serde_json::json!("abc")),
            template_hash("abc")
        );

        let doc = serde_json::json!({"Resources": {}});
        assert_eq!(
            template_hash_from_json(&doc),
            template_hash(r#"{"Resources":{}}"#)
        );
    }
}
