//! Canonical JSON encoding for signed payloads.
//!
//! Spec §3/§4.3(a): the bytes submitted for signing are JSON with keys
//! sorted lexicographically and separators exactly `", "` and `": "` —
//! i.e. Python's `json.dumps(payload, sort_keys=True)` default rendering.
//! `serde_json::Value`'s object representation is backed by a `BTreeMap`
//! (the `preserve_order` feature is not enabled anywhere in this
//! workspace), so converting through [`serde_json::Value`] before encoding
//! gives us the sort for free, recursively, regardless of the declaration
//! order of the originating Rust struct's fields. Only the separators need
//! a custom [`serde_json::ser::Formatter`].

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use std::io;

use crate::error::{CryptoError, CryptoResult};

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b", ")?;
        }
        Ok(())
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b", ")?;
        }
        Ok(())
    }
}

/// Encode `value` as canonical JSON bytes: sorted keys, `", "`/`": "`
/// separators, no trailing newline.
///
/// # Errors
///
/// Returns [`CryptoError::CanonicalEncoding`] if `value` cannot be
/// represented as JSON (e.g. non-string map keys, `NaN` floats).
pub fn to_canonical_json<T: Serialize>(value: &T) -> CryptoResult<Vec<u8>> {
    // Round-trip through `Value` so nested object keys are sorted too,
    // independent of the originating struct's field declaration order.
    let value =
        serde_json::to_value(value).map_err(|e| CryptoError::CanonicalEncoding(e.to_string()))?;
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, CanonicalFormatter);
    value
        .serialize(&mut ser)
        .map_err(|e| CryptoError::CanonicalEncoding(e.to_string()))?;
    Ok(buf)
}

/// Convenience wrapper returning a `String`.
///
/// # Errors
///
/// Same as [`to_canonical_json`].
pub fn to_canonical_string<T: Serialize>(value: &T) -> CryptoResult<String> {
    let bytes = to_canonical_json(value)?;
    // `to_canonical_json` only ever emits valid UTF-8 (it is JSON).
    Ok(String::from_utf8(bytes).expect("canonical JSON is always valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Payload {
        zeta: &'static str,
        alpha: u32,
        nested: HashMap<&'static str, &'static str>,
    }

    #[test]
    fn keys_are_sorted_lexicographically() {
        let mut nested = HashMap::new();
        nested.insert("z_inner", "1");
        nested.insert("a_inner", "2");
        let payload = Payload {
            zeta: "z",
            alpha: 1,
            nested,
        };
        let encoded = to_canonical_string(&payload).unwrap();
        assert_eq!(
            encoded,
            r#"{"alpha": 1, "nested": {"a_inner": "2", "z_inner": "1"}, "zeta": "z"}"#
        );
    }

    #[test]
    fn separators_match_python_json_dumps_default() {
        let payload = serde_json::json!({"b": 2, "a": 1});
        let encoded = to_canonical_string(&payload).unwrap();
        assert_eq!(encoded, r#"{"a": 1, "b": 2}"#);
    }

    #[test]
    fn encoding_is_deterministic_across_calls() {
        let payload = serde_json::json!({"c": 3, "a": 1, "b": {"y": 2, "x": 1}});
        let first = to_canonical_json(&payload).unwrap();
        let second = to_canonical_json(&payload).unwrap();
        assert_eq!(first, second);
    }
}
