//! Minimal RLP coding
//!
//! Just enough recursive-length-prefix support for the transaction
//! envelopes the firewall decodes and the legacy transaction the
//! facilitator signs. Integers are big-endian with no leading zeros; the
//! empty byte string encodes zero.

use alloy_primitives::U256;

use crate::error::{ChainError, ChainResult};

/// A decoded RLP item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Bytes(Vec<u8>),
    List(Vec<Item>),
}

impl Item {
    /// The payload of a byte-string item.
    pub fn as_bytes(&self) -> ChainResult<&[u8]> {
        match self {
            Item::Bytes(b) => Ok(b),
            Item::List(_) => Err(ChainError::Envelope(
                "expected RLP bytes, found list".into(),
            )),
        }
    }

    /// Decode a byte-string item as an integer, rejecting leading zeros.
    pub fn as_u64(&self) -> ChainResult<u64> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 8 {
            return Err(ChainError::Envelope("integer wider than u64".into()));
        }
        if bytes.first() == Some(&0) {
            return Err(ChainError::Envelope("integer has leading zero".into()));
        }
        let mut out = 0u64;
        for b in bytes {
            out = (out << 8) | u64::from(*b);
        }
        Ok(out)
    }

    /// Decode a byte-string item as a uint256.
    pub fn as_u256(&self) -> ChainResult<U256> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 32 {
            return Err(ChainError::Envelope("integer wider than u256".into()));
        }
        if bytes.first() == Some(&0) {
            return Err(ChainError::Envelope("integer has leading zero".into()));
        }
        Ok(U256::from_be_slice(bytes))
    }
}

/// Encode a byte string.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return data.to_vec();
    }
    let mut out = length_prefix(data.len(), 0x80);
    out.extend_from_slice(data);
    out
}

/// Wrap already-encoded items into a list.
pub fn encode_list(encoded_items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = encoded_items.iter().map(Vec::len).sum();
    let mut out = length_prefix(payload_len, 0xc0);
    for item in encoded_items {
        out.extend_from_slice(item);
    }
    out
}

/// Re-encode a decoded item, byte-identical to its source encoding.
pub fn encode_item(item: &Item) -> Vec<u8> {
    match item {
        Item::Bytes(b) => encode_bytes(b),
        Item::List(items) => {
            let encoded: Vec<Vec<u8>> = items.iter().map(encode_item).collect();
            encode_list(&encoded)
        }
    }
}

/// Minimal big-endian bytes of a u64 (empty for zero).
pub fn u64_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

/// Minimal big-endian bytes of a uint256 (empty for zero).
pub fn u256_bytes(value: U256) -> Vec<u8> {
    let bytes: [u8; 32] = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

fn length_prefix(len: usize, offset: u8) -> Vec<u8> {
    if len <= 55 {
        vec![offset + len as u8]
    } else {
        let len_bytes = u64_bytes(len as u64);
        let mut out = vec![offset + 55 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out
    }
}

/// Decode one item, returning the remainder of the buffer.
pub fn decode_item(buf: &[u8]) -> ChainResult<(Item, &[u8])> {
    let first = *buf
        .first()
        .ok_or_else(|| ChainError::Envelope("empty RLP input".into()))?;

    match first {
        0x00..=0x7f => Ok((Item::Bytes(vec![first]), &buf[1..])),
        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            let payload = take(&buf[1..], len)?;
            Ok((Item::Bytes(payload.to_vec()), &buf[1 + len..]))
        }
        0xb8..=0xbf => {
            let len_len = (first - 0xb7) as usize;
            let len = decode_length(take(&buf[1..], len_len)?)?;
            let payload = take(&buf[1 + len_len..], len)?;
            Ok((Item::Bytes(payload.to_vec()), &buf[1 + len_len + len..]))
        }
        0xc0..=0xf7 => {
            let len = (first - 0xc0) as usize;
            let payload = take(&buf[1..], len)?;
            Ok((Item::List(decode_all(payload)?), &buf[1 + len..]))
        }
        0xf8..=0xff => {
            let len_len = (first - 0xf7) as usize;
            let len = decode_length(take(&buf[1..], len_len)?)?;
            let payload = take(&buf[1 + len_len..], len)?;
            Ok((Item::List(decode_all(payload)?), &buf[1 + len_len + len..]))
        }
    }
}

/// Decode a buffer that must contain exactly one list.
pub fn decode_list(buf: &[u8]) -> ChainResult<Vec<Item>> {
    let (item, rest) = decode_item(buf)?;
    if !rest.is_empty() {
        return Err(ChainError::Envelope("trailing bytes after RLP list".into()));
    }
    match item {
        Item::List(items) => Ok(items),
        Item::Bytes(_) => Err(ChainError::Envelope("expected RLP list".into())),
    }
}

fn decode_all(mut buf: &[u8]) -> ChainResult<Vec<Item>> {
    let mut items = Vec::new();
    while !buf.is_empty() {
        let (item, rest) = decode_item(buf)?;
        items.push(item);
        buf = rest;
    }
    Ok(items)
}

fn decode_length(bytes: &[u8]) -> ChainResult<usize> {
    if bytes.first() == Some(&0) {
        return Err(ChainError::Envelope("length has leading zero".into()));
    }
    let mut len = 0usize;
    for b in bytes {
        len = len
            .checked_mul(256)
            .and_then(|l| l.checked_add(*b as usize))
            .ok_or_else(|| ChainError::Envelope("length overflow".into()))?;
    }
    Ok(len)
}

fn take(buf: &[u8], len: usize) -> ChainResult<&[u8]> {
    buf.get(..len)
        .ok_or_else(|| ChainError::Envelope("truncated RLP input".into()))
}
