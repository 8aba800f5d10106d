use crate::{expect_one, Error, Result, FIELD_PREFIX, KEY_BEGIN, KEY_BEGIN_MIN, KEY_END};
use proto_gazette::broker::{Label, LabelSet};
use serde_json::Value;
use std::fmt::Write;

/// Encode a single partition value (§4.1 `encode_value`).
///
/// * Null encodes as `%_null`.
/// * Booleans encode as `%_true` / `%_false`.
/// * Integers encode with a `%_` prefix, e.g. `%_-1234`.
/// * Strings are percent-encoded, with space becoming `%20` (never `+`) and
///   every byte outside `[A-Za-z0-9._-]` escaped.
///
/// The `%_` prefix on non-strings can never be produced by a percent-encoded
/// string, so decoding is unambiguous: a string that happens to read `null`
/// decodes back to the string `"null"`, not the JSON null.
pub fn encode_value(value: &Value) -> Result<String> {
    encode_field_value(String::new(), value)
}

/// Inverse of [`encode_value`].
pub fn decode_value(value: &str) -> Result<Value> {
    decode_field_value(value)
}

pub(crate) fn encode_field_value(mut b: String, value: &Value) -> Result<String> {
    match value {
        Value::Null => b.push_str("%_null"),
        Value::Bool(true) => b.push_str("%_true"),
        Value::Bool(false) => b.push_str("%_false"),
        Value::Number(n) if n.is_u64() => write!(b, "%_{}", n.as_u64().unwrap()).unwrap(),
        Value::Number(n) if n.is_i64() => write!(b, "%_{}", n.as_i64().unwrap()).unwrap(),
        Value::String(s) => write!(b, "{}", crate::percent_encoding(s)).unwrap(),
        _ => return Err(Error::InvalidValueType),
    };
    Ok(b)
}

pub(crate) fn decode_field_value(value: &str) -> Result<Value> {
    Ok(if value == "%_null" {
        Value::Null
    } else if value == "%_true" {
        Value::Bool(true)
    } else if value == "%_false" {
        Value::Bool(false)
    } else if let Some(rest) = value.strip_prefix("%_") {
        if rest.starts_with('-') {
            Value::Number(rest.parse::<i64>()?.into())
        } else {
            Value::Number(rest.parse::<u64>()?.into())
        }
    } else {
        Value::String(
            percent_encoding::percent_decode_str(value)
                .decode_utf8()?
                .to_string(),
        )
    })
}

/// Encode a set of logical partition field values and their key range into a
/// LabelSet (§4.1 `encode_partition_labels`). `fields` must already be
/// strictly sorted and the same length as `values`.
pub fn encode_partition_labels(
    fields: &[impl AsRef<str>],
    values: &[Value],
    key_begin: u32,
    key_end: u32,
    mut set: LabelSet,
) -> Result<LabelSet> {
    if fields.len() != values.len() {
        return Err(Error::FieldsValuesLengthMismatch);
    }
    for i in 0..fields.len() {
        let field = fields[i].as_ref();
        if i > 0 && field <= fields[i - 1].as_ref() {
            return Err(Error::FieldsNotSorted);
        }
        let encoded = encode_field_value(String::new(), &values[i])?;
        set = crate::add_value(set, &format!("{FIELD_PREFIX}{field}"), &encoded);
    }
    Ok(encode_key_range(set, key_begin, key_end))
}

/// Decode logical partition field values and their key range (§4.1
/// `decode_partition_labels`, via `decode_field_range`). Values are returned
/// in the label set's lexicographic field order, which callers must zip
/// against the same sorted field list they used to encode.
pub fn decode_partition_labels(set: &LabelSet) -> Result<((u32, u32), Vec<Value>)> {
    let key_range = decode_key_range(set)?;
    let mut values = Vec::new();

    for Label { name, value, .. } in &set.labels {
        if name.starts_with(FIELD_PREFIX) {
            values.push(decode_field_value(value)?);
        }
    }
    Ok((key_range, values))
}

/// Encode a begin/end key range into a LabelSet.
pub fn encode_key_range(set: LabelSet, key_begin: u32, key_end: u32) -> LabelSet {
    let set = crate::encode_hex_u32(set, KEY_BEGIN, key_begin);
    crate::encode_hex_u32(set, KEY_END, key_end)
}

/// Decode a begin/end key range from a LabelSet.
pub fn decode_key_range(set: &LabelSet) -> Result<(u32, u32)> {
    Ok((
        crate::parse_hex_u32(set, KEY_BEGIN)?,
        crate::parse_hex_u32(set, KEY_END)?,
    ))
}

/// Build the journal name suffix implied by a LabelSet's partition fields and
/// key range (§4.1 `partition_suffix`): `field=val/…/pivot=XX`. Relies on
/// labels already being in lexicographic order within `set`.
pub fn partition_suffix(set: &LabelSet) -> Result<String> {
    let mut s = String::new();

    for label in &set.labels {
        if !label.name.starts_with(FIELD_PREFIX) {
            continue;
        }
        s.push_str(&label.name[FIELD_PREFIX.len()..]);
        s.push('=');
        s.push_str(&label.value);
        s.push('/');
    }
    s.push_str("pivot=");

    let key_begin = expect_one(set, KEY_BEGIN)?;
    if key_begin == KEY_BEGIN_MIN {
        s.push_str("00");
    } else {
        s.push_str(key_begin);
    }
    Ok(s)
}

/// Extract a journal's templated name prefix by stripping the trailing
/// partition-field and pivot components that `partition_suffix` appends.
pub fn name_prefix<'n>(name: &'n str, set: &LabelSet) -> Option<&'n str> {
    let count = set
        .labels
        .iter()
        .filter(|Label { name, .. }| name.starts_with(FIELD_PREFIX))
        .count();

    name.rsplitn(count + 2, '/').nth(count + 1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::build_set;
    use serde_json::json;

    #[test]
    fn test_partition_value_encoding_round_trip() {
        let cases = [
            (Value::Null, "%_null"),
            (Value::Bool(true), "%_true"),
            (Value::Bool(false), "%_false"),
            (Value::Number(123u64.into()), "%_123"),
            (Value::Number((-123i64).into()), "%_-123"),
            (Value::Number(u64::MAX.into()), "%_18446744073709551615"),
            (Value::Number(i64::MIN.into()), "%_-9223372036854775808"),
            (json!("null"), "null"),
            (json!("%_null"), "%25_null"),
            (json!("true"), "true"),
            (json!("hello, world!"), "hello%2C%20world%21"),
            (
                json!("http://example/path?q1=v1&q2=v2;ex%20tra"),
                "http%3A%2F%2Fexample%2Fpath%3Fq1%3Dv1%26q2%3Dv2%3Bex%2520tra",
            ),
        ];

        for (fixture, expect) in cases {
            let actual = encode_value(&fixture).unwrap();
            assert_eq!(actual, expect);

            let recovered = decode_value(&actual).unwrap();
            assert_eq!(recovered, fixture);
        }
    }

    #[test]
    fn test_encode_decode_partition_labels_round_trip() {
        let fields = ["bar", "foo", "z"];
        let values = vec![json!(-123), json!(true), json!("bye! 👋")];

        let set =
            encode_partition_labels(&fields, &values, 0x1234, 0x5678, LabelSet::default()).unwrap();
        let (range, decoded) = decode_partition_labels(&set).unwrap();

        assert_eq!(range, (0x1234, 0x5678));
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_encode_partition_labels_rejects_unsorted_fields() {
        let fields = ["z", "bar"];
        let values = vec![json!(1), json!(2)];
        assert!(matches!(
            encode_partition_labels(&fields, &values, 0, 0, LabelSet::default()),
            Err(Error::FieldsNotSorted)
        ));
    }

    #[test]
    fn test_encode_partition_labels_rejects_length_mismatch() {
        let fields = ["bar"];
        let values = vec![json!(1), json!(2)];
        assert!(matches!(
            encode_partition_labels(&fields, &values, 0, 0, LabelSet::default()),
            Err(Error::FieldsValuesLengthMismatch)
        ));
    }

    #[test]
    fn test_partition_suffix() {
        let set = encode_partition_labels(
            &["Loo", "bar"],
            &[json!("hi there"), json!(true)],
            0x12341234,
            0x56785678,
            build_set([("pass", "through")]),
        )
        .unwrap();

        let suffix = partition_suffix(&set).unwrap();
        assert_eq!(suffix, "Loo=hi%20there/bar=%_true/pivot=12341234");

        let name = format!("base/journal/name/{suffix}");
        assert_eq!(name_prefix(&name, &set), Some("base/journal/name"));
    }

    #[test]
    fn test_partition_suffix_min_pivot() {
        let set = encode_key_range(LabelSet::default(), crate::KEY_BEGIN_MIN.parse().unwrap_or(0), 0xffffffff);
        assert_eq!(partition_suffix(&set).unwrap(), "pivot=00");
    }
}
