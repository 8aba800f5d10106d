//! A minimal, order-preserving tuple encoding for collection keys, in the
//! style of the FoundationDB tuple layer this crate is extracted from.
//!
//! Collection keys (§3 "composite key") are lists of document locations
//! whose extracted JSON scalars must be packed into a single byte string
//! that: (a) round-trips losslessly, and (b) orders identically to the
//! tuple of source values compared element-wise. The Ingester uses the
//! packed form as the input to key hashing (§4.3 mapper step "hashing the
//! packed key to a 32-bit content address").

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tuple elements may only be null, bool, integer, or string")]
    UnsupportedType,
    #[error("truncated tuple encoding")]
    Truncated,
    #[error("invalid tuple encoding tag {0:#x}")]
    InvalidTag(u8),
}

pub type Result<T> = std::result::Result<T, Error>;

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_STRING: u8 = 0x04;

/// Pack a slice of JSON scalars into an order-preserving byte string.
pub fn pack(values: &[Value]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for v in values {
        pack_one(v, &mut out)?;
    }
    Ok(out)
}

fn pack_one(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            out.push(TAG_INT);
            // Bias by 2^63 so two's-complement ordering becomes unsigned
            // big-endian byte ordering, then encode big-endian.
            let signed = n.as_i64().unwrap_or_else(|| n.as_u64().unwrap() as i64);
            let biased = (signed as i128 + (1i128 << 63)) as u64;
            out.extend_from_slice(&biased.to_be_bytes());
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            // Escape embedded NUL bytes as 0x00 0xFF so the terminator
            // remains unambiguous and relative ordering of the escaped
            // bytes is preserved (0x00 0xFF < 0x00 0x00 terminator is
            // impossible since 0xFF != the implicit successor byte).
            for &b in s.as_bytes() {
                if b == 0x00 {
                    out.push(0x00);
                    out.push(0xff);
                } else {
                    out.push(b);
                }
            }
            out.push(0x00); // terminator
        }
        _ => return Err(Error::UnsupportedType),
    }
    Ok(())
}

/// Unpack a previously packed tuple back into its JSON scalars.
pub fn unpack(mut buf: &[u8]) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        let (value, rest) = unpack_one(buf)?;
        out.push(value);
        buf = rest;
    }
    Ok(out)
}

fn unpack_one(buf: &[u8]) -> Result<(Value, &[u8])> {
    let (&tag, rest) = buf.split_first().ok_or(Error::Truncated)?;
    match tag {
        TAG_NULL => Ok((Value::Null, rest)),
        TAG_FALSE => Ok((Value::Bool(false), rest)),
        TAG_TRUE => Ok((Value::Bool(true), rest)),
        TAG_INT => {
            if rest.len() < 8 {
                return Err(Error::Truncated);
            }
            let (int_bytes, rest) = rest.split_at(8);
            let biased = u64::from_be_bytes(int_bytes.try_into().unwrap());
            let signed = (biased as i128 - (1i128 << 63)) as i64;
            Ok((Value::Number(signed.into()), rest))
        }
        TAG_STRING => {
            let mut bytes = Vec::new();
            let mut i = 0;
            loop {
                if i >= rest.len() {
                    return Err(Error::Truncated);
                }
                match rest[i] {
                    0x00 if rest.get(i + 1) == Some(&0xff) => {
                        bytes.push(0x00);
                        i += 2;
                    }
                    0x00 => {
                        i += 1;
                        break;
                    }
                    b => {
                        bytes.push(b);
                        i += 1;
                    }
                }
            }
            let s = String::from_utf8(bytes).map_err(|_| Error::Truncated)?;
            Ok((Value::String(s), &rest[i..]))
        }
        other => Err(Error::InvalidTag(other)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck_macros::quickcheck;
    use serde_json::json;

    #[test]
    fn test_round_trip() {
        let values = vec![json!(42), json!(-7), json!("hello"), json!(null), json!(true)];
        let packed = pack(&values).unwrap();
        assert_eq!(unpack(&packed).unwrap(), values);
    }

    #[test]
    fn test_ordering_matches_value_ordering_for_integers() {
        let a = pack(&[json!(-5)]).unwrap();
        let b = pack(&[json!(5)]).unwrap();
        let c = pack(&[json!(i64::MAX)]).unwrap();
        let d = pack(&[json!(i64::MIN)]).unwrap();
        assert!(d < a && a < b && b < c);
    }

    #[test]
    fn test_ordering_matches_value_ordering_for_strings() {
        let a = pack(&[json!("aaa")]).unwrap();
        let b = pack(&[json!("aab")]).unwrap();
        let c = pack(&[json!("b")]).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_rejects_unsupported_types() {
        assert!(matches!(pack(&[json!([1, 2])]), Err(Error::UnsupportedType)));
        assert!(matches!(pack(&[json!({"a": 1})]), Err(Error::UnsupportedType)));
    }

    #[quickcheck]
    fn prop_round_trip(ints: Vec<i64>, strs: Vec<String>) -> bool {
        let mut values: Vec<Value> = ints.into_iter().map(|i| json!(i)).collect();
        values.extend(strs.into_iter().map(|s| json!(s)));
        let packed = pack(&values).unwrap();
        unpack(&packed).unwrap() == values
    }
}
