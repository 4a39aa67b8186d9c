// array.rs — uniform primitive array codec
//
// Items share one primitive type. A non-zero item length makes every
// item that exact width (integers padded, buffers exact); zero means
// each item carries its own length prefix.

use crate::container::{remaining_hint, value_matches, EntryData};
use crate::error::{CodecError, CodecResult};
use crate::iter::{rb_get, DecPhase, DecodeIterator, EncState, EncodeIterator, NO_POS};
use crate::primitive::{encode_primitive, encode_primitive_fixed};
use crate::types::DataType;

#[derive(Debug, Clone, Copy, Default)]
pub struct Array {
    pub primitive_type: DataType,
    /// 0 means variable-length items.
    pub item_length: u16,
}

impl Array {
    pub fn new(primitive_type: DataType, item_length: u16) -> Array {
        Array { primitive_type, item_length }
    }
}

// ============================================================
// Encode
// ============================================================

pub fn encode_array_init(iter: &mut EncodeIterator, array: &Array) -> CodecResult<()> {
    iter.alive()?;
    if !array.primitive_type.is_primitive() {
        return Err(CodecError::UnsupportedDataType(array.primitive_type as u8));
    }
    iter.push_level(DataType::Array as u8)?;
    iter.put_u8(array.primitive_type as u8)?;
    iter.put_rb(u32::from(array.item_length))?;
    let pos = iter.cur;
    iter.put_u16(0)?;
    let lvl = iter.level_mut()?;
    lvl.count_pos = pos;
    lvl.fixed_item_len = array.item_length;
    lvl.child_type = array.primitive_type as u8;
    lvl.state = EncState::Entries;
    Ok(())
}

pub fn encode_array_entry(iter: &mut EncodeIterator, data: &EntryData) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::Array as u8)?;
    let start = iter.cur;
    let r = encode_array_entry_inner(iter, data);
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
    }
    r
}

fn encode_array_entry_inner(iter: &mut EncodeIterator, data: &EntryData) -> CodecResult<()> {
    let lvl = iter.level()?;
    if lvl.state != EncState::Entries {
        return Err(CodecError::InvalidArgument("array is not accepting entries"));
    }
    let item_len = lvl.fixed_item_len;
    let declared = DataType::from_u8(lvl.child_type)?;
    match data {
        EntryData::Value(v) => {
            if !value_matches(declared, v) {
                return Err(CodecError::UnsupportedDataType(v.data_type() as u8));
            }
            if item_len > 0 {
                encode_primitive_fixed(iter, v, item_len)?;
            } else {
                let res = iter.reserve(remaining_hint(iter))?;
                encode_primitive(iter, v)?;
                iter.patch(res)?;
            }
        }
        EntryData::PreEncoded(b) => {
            if item_len > 0 {
                if b.len() != item_len as usize {
                    return Err(CodecError::InvalidArgument("pre-encoded item length mismatch"));
                }
                iter.put_slice(b)?;
            } else {
                iter.put_rb_slice(b)?;
            }
        }
        EntryData::Blank => {
            if item_len > 0 {
                return Err(CodecError::InvalidArgument("fixed-width array item cannot be blank"));
            }
            iter.put_rb(0)?;
        }
    }
    iter.level_mut()?.count += 1;
    Ok(())
}

pub fn encode_array_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::Array as u8)?;
    if !success {
        iter.pop_level(false)?;
        return Ok(());
    }
    iter.alive()?;
    let lvl = iter.level()?;
    let (count_pos, count) = (lvl.count_pos, lvl.count);
    if count_pos != NO_POS {
        iter.buf[count_pos..count_pos + 2].copy_from_slice(&count.to_be_bytes());
    }
    iter.pop_level(true)?;
    Ok(())
}

// ============================================================
// Decode
// ============================================================

pub fn decode_array(iter: &mut DecodeIterator) -> CodecResult<Array> {
    let end = iter.value_end();
    let primitive_type = DataType::from_u8(iter.get_u8()?)?;
    let item_length = iter.get_rb()? as u16;
    let count = iter.get_u16()?;
    let next = iter.cur;
    if next > end {
        return Err(CodecError::IncompleteData);
    }
    let lvl = iter.push_level(DataType::Array as u8, end)?;
    lvl.count = count;
    lvl.fixed_item_len = item_length;
    lvl.child_type = primitive_type as u8;
    lvl.next_entry = next;
    lvl.phase = DecPhase::StdItems;
    Ok(Array { primitive_type, item_length })
}

/// Next item's raw bytes; the iterator is positioned so a primitive
/// decode call consumes exactly this item.
pub fn decode_array_entry<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Option<&'a [u8]>> {
    let lvl = *iter.level()?;
    if lvl.container != DataType::Array as u8 {
        return Err(CodecError::InvalidArgument("no array open"));
    }
    if lvl.read >= lvl.count {
        iter.pop_container();
        return Ok(None);
    }
    let (start, end) = if lvl.fixed_item_len > 0 {
        let start = lvl.next_entry;
        (start, start + lvl.fixed_item_len as usize)
    } else {
        let (len, n) = rb_get(iter.buf, lvl.next_entry)?;
        let start = lvl.next_entry + n;
        (start, start + len as usize)
    };
    if end > lvl.list_end {
        return Err(CodecError::IncompleteData);
    }
    let m = iter.level_mut()?;
    m.read += 1;
    m.next_entry = end;
    m.entry_end = end;
    iter.cur = start;
    let buf = iter.buf;
    Ok(Some(&buf[start..end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{decode_buffer, decode_uint};
    use crate::types::PrimitiveValue;

    #[test]
    fn test_variable_ascii_array() {
        let mut buf = vec![0u8; 128];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_array_init(&mut enc, &Array::new(DataType::AsciiString, 0)).unwrap();
        for sym in [&b"TRI"[..], b"IBM", b"MSFT"] {
            encode_array_entry(&mut enc, &EntryData::Value(PrimitiveValue::Buffer(sym))).unwrap();
        }
        encode_array_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        let arr = decode_array(&mut dec).unwrap();
        assert_eq!(arr.primitive_type, DataType::AsciiString);
        assert_eq!(arr.item_length, 0);
        let mut got = Vec::new();
        while let Some(item) = decode_array_entry(&mut dec).unwrap() {
            assert_eq!(item, decode_buffer(&mut dec).unwrap().unwrap());
            got.push(item.to_vec());
        }
        assert_eq!(got, vec![b"TRI".to_vec(), b"IBM".to_vec(), b"MSFT".to_vec()]);
    }

    #[test]
    fn test_fixed_width_uint_array() {
        let mut buf = vec![0u8; 64];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_array_init(&mut enc, &Array::new(DataType::UInt, 4)).unwrap();
        for v in [1u64, 0x0102_0304, 0] {
            encode_array_entry(&mut enc, &EntryData::Value(PrimitiveValue::UInt(v))).unwrap();
        }
        encode_array_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();
        // type + item_length + count + 3 * 4 bytes
        assert_eq!(wire.len(), 1 + 1 + 2 + 12);

        let mut dec = DecodeIterator::new(&wire);
        decode_array(&mut dec).unwrap();
        let mut got = Vec::new();
        while decode_array_entry(&mut dec).unwrap().is_some() {
            got.push(decode_uint(&mut dec).unwrap().unwrap());
        }
        assert_eq!(got, vec![1, 0x0102_0304, 0]);
    }

    #[test]
    fn test_oversized_fixed_item_rejected() {
        let mut buf = vec![0u8; 64];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_array_init(&mut enc, &Array::new(DataType::UInt, 1)).unwrap();
        assert!(encode_array_entry(&mut enc, &EntryData::Value(PrimitiveValue::UInt(300))).is_err());
        // the failed item left no bytes behind
        encode_array_entry(&mut enc, &EntryData::Value(PrimitiveValue::UInt(9))).unwrap();
        encode_array_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&wire);
        decode_array(&mut dec).unwrap();
        assert!(decode_array_entry(&mut dec).unwrap().is_some());
        assert_eq!(decode_uint(&mut dec).unwrap(), Some(9));
        assert!(decode_array_entry(&mut dec).unwrap().is_none());
    }
}
