//! Minimal Erlang External Term Format decoder for `/sync_buckets`
//! responses: spec.md §4.1.
//!
//! Only the handful of tags peers actually emit for this endpoint are
//! supported: small/large integers, lists, and tuples. Anything else
//! clears `sync_buckets` for that peer rather than panicking (§4.1
//! "Failures clear `sync_buckets` without removing the peer").

use std::collections::HashSet;

const ETF_VERSION: u8 = 131;
const SMALL_INTEGER_EXT: u8 = 97;
const INTEGER_EXT: u8 = 98;
const SMALL_BIG_EXT: u8 = 110;
const LARGE_BIG_EXT: u8 = 111;
const LIST_EXT: u8 = 108;
const NIL_EXT: u8 = 106;
const SMALL_TUPLE_EXT: u8 = 104;
const LARGE_TUPLE_EXT: u8 = 105;

#[derive(Debug, PartialEq, Eq)]
pub struct SyncBuckets {
    pub bucket_size: u64,
    pub buckets: HashSet<u64>,
}

#[derive(Debug)]
pub struct EtfDecodeError(pub String);

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], EtfDecodeError> {
        if self.pos + n > self.buf.len() {
            return Err(EtfDecodeError("unexpected end of ETF buffer".into()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u8(&mut self) -> Result<u8, EtfDecodeError> {
        Ok(self.take(1)?[0])
    }
}

#[derive(Debug)]
enum Term {
    Integer(u64),
    List(Vec<Term>),
    Tuple(Vec<Term>),
}

fn decode_term(c: &mut Cursor) -> Result<Term, EtfDecodeError> {
    let tag = c.take_u8()?;
    match tag {
        SMALL_INTEGER_EXT => Ok(Term::Integer(c.take_u8()? as u64)),
        INTEGER_EXT => {
            let bytes = c.take(4)?;
            Ok(Term::Integer(i32::from_be_bytes(bytes.try_into().unwrap()) as u64))
        }
        SMALL_BIG_EXT => {
            let n = c.take_u8()? as usize;
            let sign = c.take_u8()?;
            let digits = c.take(n)?;
            let mut value: u64 = 0;
            for (i, d) in digits.iter().enumerate() {
                value += (*d as u64) << (8 * i as u64);
            }
            if sign != 0 {
                return Err(EtfDecodeError("negative bucket index".into()));
            }
            Ok(Term::Integer(value))
        }
        LARGE_BIG_EXT => {
            let n_bytes = c.take(4)?;
            let n = u32::from_be_bytes(n_bytes.try_into().unwrap()) as usize;
            let sign = c.take_u8()?;
            let digits = c.take(n)?;
            let mut value: u64 = 0;
            for (i, d) in digits.iter().enumerate().take(8) {
                value += (*d as u64) << (8 * i as u64);
            }
            if sign != 0 {
                return Err(EtfDecodeError("negative bucket index".into()));
            }
            Ok(Term::Integer(value))
        }
        NIL_EXT => Ok(Term::List(Vec::new())),
        LIST_EXT => {
            let len_bytes = c.take(4)?;
            let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_term(c)?);
            }
            // Proper lists are NIL-terminated.
            let _tail = decode_term(c)?;
            Ok(Term::List(items))
        }
        SMALL_TUPLE_EXT => {
            let len = c.take_u8()? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_term(c)?);
            }
            Ok(Term::Tuple(items))
        }
        LARGE_TUPLE_EXT => {
            let len_bytes = c.take(4)?;
            let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_term(c)?);
            }
            Ok(Term::Tuple(items))
        }
        other => Err(EtfDecodeError(format!("unsupported ETF tag {other}"))),
    }
}

/// Parses a `/sync_buckets` ETF body of the shape
/// `{BucketSize, [BucketIndex, ...]}`.
pub fn parse_sync_buckets(bytes: &[u8]) -> Result<SyncBuckets, EtfDecodeError> {
    if bytes.is_empty() || bytes[0] != ETF_VERSION {
        return Err(EtfDecodeError("missing ETF version byte".into()));
    }
    let mut cursor = Cursor { buf: bytes, pos: 1 };
    let term = decode_term(&mut cursor)?;

    let Term::Tuple(mut fields) = term else {
        return Err(EtfDecodeError("expected top-level tuple".into()));
    };
    if fields.len() != 2 {
        return Err(EtfDecodeError("expected a 2-tuple".into()));
    }
    let buckets_term = fields.remove(1);
    let size_term = fields.remove(0);

    let Term::Integer(bucket_size) = size_term else {
        return Err(EtfDecodeError("bucket size is not an integer".into()));
    };
    let Term::List(items) = buckets_term else {
        return Err(EtfDecodeError("buckets is not a list".into()));
    };

    let mut buckets = HashSet::with_capacity(items.len());
    for item in items {
        let Term::Integer(idx) = item else {
            return Err(EtfDecodeError("bucket index is not an integer".into()));
        };
        buckets.insert(idx);
    }

    Ok(SyncBuckets {
        bucket_size,
        buckets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_small_int(v: u8) -> Vec<u8> {
        vec![SMALL_INTEGER_EXT, v]
    }

    fn encode_list(items: Vec<Vec<u8>>) -> Vec<u8> {
        let mut out = vec![LIST_EXT];
        out.extend_from_slice(&(items.len() as u32).to_be_bytes());
        for item in items {
            out.extend(item);
        }
        out.push(NIL_EXT);
        out
    }

    fn encode_tuple(items: Vec<Vec<u8>>) -> Vec<u8> {
        let mut out = vec![SMALL_TUPLE_EXT, items.len() as u8];
        for item in items {
            out.extend(item);
        }
        out
    }

    #[test]
    fn parses_simple_bucket_tuple() {
        let body = encode_tuple(vec![
            encode_small_int(10),
            encode_list(vec![encode_small_int(1), encode_small_int(2)]),
        ]);
        let mut framed = vec![ETF_VERSION];
        framed.extend(body);

        let parsed = parse_sync_buckets(&framed).unwrap();
        assert_eq!(parsed.bucket_size, 10);
        assert_eq!(parsed.buckets, HashSet::from([1, 2]));
    }

    #[test]
    fn rejects_missing_version_byte() {
        assert!(parse_sync_buckets(&[]).is_err());
        assert!(parse_sync_buckets(&[0]).is_err());
    }

    #[test]
    fn rejects_non_tuple_top_level() {
        let mut framed = vec![ETF_VERSION];
        framed.extend(encode_small_int(5));
        assert!(parse_sync_buckets(&framed).is_err());
    }
}
