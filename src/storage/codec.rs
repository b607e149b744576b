//! Payload encodings for backends that only accept bytes.
//!
//! The remote-kv backend stores plain JSON text. The column-store backend
//! stores a tagged frame: either a sparse numeric array, suited to feature
//! vectors, or a JSON record.
//!
//! Numeric frame layout (big-endian):
//!
//! ```text
//! tag=0x01 | rank: u8 | dtype: u8 | dim: u32 | nnz: u32 | nnz * (index: u32, value: 8 bytes)
//! ```
//!
//! `rank` is 0 for a scalar and 1 for a vector. `dtype` is 0 for `f64` and 1
//! for `i64`. Zero entries are not written. `dim` is at most [`MAX_DIM`].

use super::{StorageError, StoredValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Number;

pub const TAG_NUMERIC: u8 = 0x01;
pub const TAG_RECORD: u8 = 0x02;

const RANK_SCALAR: u8 = 0;
const RANK_VECTOR: u8 = 1;
const DTYPE_F64: u8 = 0;
const DTYPE_I64: u8 = 1;

/// Largest vector length a numeric frame may declare.
pub const MAX_DIM: usize = 1 << 24;

const HEADER_LEN: usize = 1 + 1 + 1 + 4 + 4;
const ENTRY_LEN: usize = 4 + 8;

/// Encode a value as JSON text.
pub fn encode_json(val: &StoredValue) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(val)?)
}

/// Decode JSON text produced by [`encode_json`].
pub fn decode_json(bytes: &[u8]) -> Result<StoredValue, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode an arbitrary value as a JSON record frame.
pub fn encode_record(val: &StoredValue) -> Result<Bytes, StorageError> {
    let json = encode_json(val)?;
    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_u8(TAG_RECORD);
    buf.put_slice(&json);
    Ok(buf.freeze())
}

/// Encode a number or an array of numbers as a sparse numeric frame.
pub fn encode_numeric(val: &StoredValue) -> Result<Bytes, StorageError> {
    let (rank, items): (u8, Vec<&Number>) = match val {
        StoredValue::Number(n) => (RANK_SCALAR, vec![n]),
        StoredValue::Array(items) => {
            let numbers = items
                .iter()
                .map(|item| match item {
                    StoredValue::Number(n) => Ok(n),
                    other => Err(StorageError::Serialization(format!(
                        "numeric array contains a non-numeric element: {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            (RANK_VECTOR, numbers)
        }
        other => {
            return Err(StorageError::Serialization(format!(
                "expected a number or an array of numbers, got {}",
                type_name(other)
            )))
        }
    };

    if items.len() > MAX_DIM {
        return Err(too_long(items.len()));
    }
    let dim = items.len() as u32;
    let integral = items.iter().all(|n| n.as_i64().is_some());
    let dtype = if integral { DTYPE_I64 } else { DTYPE_F64 };

    let mut entries = BytesMut::new();
    let mut nnz: u32 = 0;
    for (index, n) in (0u32..).zip(items.iter()) {
        if integral {
            let v = n.as_i64().unwrap_or_default();
            if v == 0 {
                continue;
            }
            entries.put_u32(index);
            entries.put_i64(v);
        } else {
            let v = n.as_f64().ok_or_else(|| {
                StorageError::Serialization(format!("number {} is not representable as f64", n))
            })?;
            if v == 0.0 {
                continue;
            }
            entries.put_u32(index);
            entries.put_f64(v);
        }
        nnz += 1;
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + entries.len());
    buf.put_u8(TAG_NUMERIC);
    buf.put_u8(rank);
    buf.put_u8(dtype);
    buf.put_u32(dim);
    buf.put_u32(nnz);
    buf.put_slice(&entries);
    Ok(buf.freeze())
}

/// Decode either frame kind back into a value.
pub fn decode_frame(bytes: &[u8]) -> Result<StoredValue, StorageError> {
    match bytes.first() {
        Some(&TAG_NUMERIC) => decode_numeric(bytes),
        Some(&TAG_RECORD) => decode_json(&bytes[1..]),
        Some(tag) => Err(StorageError::Serialization(format!(
            "unknown frame tag 0x{:02x}",
            tag
        ))),
        None => Err(StorageError::Serialization("empty frame".to_string())),
    }
}

fn decode_numeric(bytes: &[u8]) -> Result<StoredValue, StorageError> {
    if bytes.len() < HEADER_LEN {
        return Err(truncated());
    }
    let mut buf = bytes;
    buf.advance(1);
    let rank = buf.get_u8();
    let dtype = buf.get_u8();
    let dim = buf.get_u32() as usize;
    let nnz = buf.get_u32() as usize;

    if rank > RANK_VECTOR {
        return Err(StorageError::Serialization(format!("unsupported rank {}", rank)));
    }
    if dtype > DTYPE_I64 {
        return Err(StorageError::Serialization(format!("unsupported dtype {}", dtype)));
    }
    if rank == RANK_SCALAR && dim != 1 {
        return Err(StorageError::Serialization(format!(
            "scalar frame must have dim 1, got {}",
            dim
        )));
    }
    if dim > MAX_DIM {
        return Err(too_long(dim));
    }
    if nnz > dim || buf.remaining() != nnz * ENTRY_LEN {
        return Err(truncated());
    }

    let zero = if dtype == DTYPE_I64 {
        StoredValue::from(0i64)
    } else {
        StoredValue::from(0.0f64)
    };
    let mut dense = vec![zero; dim];
    let mut last: Option<usize> = None;
    for _ in 0..nnz {
        let index = buf.get_u32() as usize;
        if index >= dim || last.is_some_and(|prev| index <= prev) {
            return Err(StorageError::Serialization(format!(
                "sparse index {} out of order or out of range",
                index
            )));
        }
        last = Some(index);
        dense[index] = if dtype == DTYPE_I64 {
            StoredValue::from(buf.get_i64())
        } else {
            let v = buf.get_f64();
            Number::from_f64(v).map(StoredValue::Number).ok_or_else(|| {
                StorageError::Serialization(format!("non-finite value {} in frame", v))
            })?
        };
    }

    if rank == RANK_SCALAR {
        Ok(dense.swap_remove(0))
    } else {
        Ok(StoredValue::Array(dense))
    }
}

fn too_long(dim: usize) -> StorageError {
    StorageError::Serialization(format!(
        "numeric array of length {} exceeds the maximum of {}",
        dim, MAX_DIM
    ))
}

fn truncated() -> StorageError {
    StorageError::Serialization("truncated numeric frame".to_string())
}

fn type_name(val: &StoredValue) -> &'static str {
    match val {
        StoredValue::Null => "null",
        StoredValue::Bool(_) => "bool",
        StoredValue::Number(_) => "number",
        StoredValue::String(_) => "string",
        StoredValue::Array(_) => "array",
        StoredValue::Object(_) => "object",
    }
}
