// map.rs — map container codec
//
// Entries carry an add/update/delete action and a primitive key of the
// map's declared key type. Set definitions and summary data precede the
// entries; both may be supplied pre-encoded or encoded in place.

use bitflags::bitflags;

use crate::container::{
    begin_sections, close_entry, dec_blob, finish_container, open_entry, put_entry_data,
    set_defs_complete, summary_data_complete, value_matches, EntryData,
};
use crate::error::{CodecError, CodecResult};
use crate::iter::{DecPhase, DecodeIterator, EncState, EncodeIterator, NO_POS};
use crate::primitive::decode_primitive;
use crate::types::{DataType, PrimitiveValue};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MapFlags: u8 {
        const HAS_SET_DEFS            = 0x01;
        const HAS_SUMMARY_DATA        = 0x02;
        const HAS_PER_ENTRY_PERM_DATA = 0x04;
        const HAS_TOTAL_COUNT_HINT    = 0x08;
        const HAS_KEY_FIELD_ID        = 0x10;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Map<'a> {
    pub flags: MapFlags,
    pub key_primitive_type: DataType,
    pub container_type: DataType,
    pub key_field_id: i16,
    pub total_count_hint: u32,
    pub enc_set_defs: Option<&'a [u8]>,
    pub enc_summary: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MapEntryAction {
    Update = 1,
    Add = 2,
    Delete = 3,
}

impl MapEntryAction {
    fn from_u8(v: u8) -> CodecResult<MapEntryAction> {
        Ok(match v {
            1 => MapEntryAction::Update,
            2 => MapEntryAction::Add,
            3 => MapEntryAction::Delete,
            _ => return Err(CodecError::InvalidData("bad map entry action")),
        })
    }
}

const ENTRY_HAS_PERM: u8 = 0x10;

#[derive(Debug, Clone, Copy)]
pub struct MapEntry<'a> {
    pub action: MapEntryAction,
    pub perm_data: Option<&'a [u8]>,
    pub enc_key: &'a [u8],
    pub enc_data: &'a [u8],
}

/// Decode a map entry's key with its declared primitive type.
pub fn decode_map_entry_key<'a>(
    entry: &MapEntry<'a>,
    key_type: DataType,
) -> CodecResult<Option<PrimitiveValue<'a>>> {
    let mut kit = DecodeIterator::new(entry.enc_key);
    decode_primitive(&mut kit, key_type)
}

// ============================================================
// Encode
// ============================================================

pub fn encode_map_init<'a>(iter: &mut EncodeIterator<'a>, map: &Map<'a>) -> CodecResult<()> {
    iter.alive()?;
    if !map.key_primitive_type.is_primitive() {
        return Err(CodecError::UnsupportedDataType(map.key_primitive_type as u8));
    }
    iter.push_level(DataType::Map as u8)?;
    {
        let lvl = iter.level_mut()?;
        lvl.flags = u16::from(map.flags.bits());
        lvl.child_type = map.container_type as u8;
        lvl.key_type = map.key_primitive_type as u8;
        lvl.count_hint = if map.flags.contains(MapFlags::HAS_TOTAL_COUNT_HINT) {
            map.total_count_hint
        } else {
            u32::MAX
        };
    }
    iter.put_u8(map.flags.bits())?;
    iter.put_u8(map.key_primitive_type as u8)?;
    iter.put_u8(map.container_type as u8)?;
    if map.flags.contains(MapFlags::HAS_KEY_FIELD_ID) {
        iter.put_i16(map.key_field_id)?;
    }
    begin_sections(
        iter,
        map.flags.contains(MapFlags::HAS_SET_DEFS),
        map.enc_set_defs,
        map.flags.contains(MapFlags::HAS_SUMMARY_DATA),
        map.enc_summary,
    )
}

pub fn encode_map_set_defs_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    set_defs_complete(iter, DataType::Map as u8, success)
}

pub fn encode_map_summary_data_complete(
    iter: &mut EncodeIterator,
    success: bool,
) -> CodecResult<()> {
    summary_data_complete(iter, DataType::Map as u8, success)
}

fn put_entry_header(
    iter: &mut EncodeIterator,
    action: MapEntryAction,
    perm_data: Option<&[u8]>,
    key: &EntryData,
) -> CodecResult<()> {
    let lvl = iter.level()?;
    if lvl.state != EncState::Entries {
        return Err(CodecError::InvalidArgument("map is not accepting entries"));
    }
    if perm_data.is_some() && lvl.flags & u16::from(MapFlags::HAS_PER_ENTRY_PERM_DATA.bits()) == 0 {
        return Err(CodecError::InvalidArgument("perm data not declared on map"));
    }
    let key_type = DataType::from_u8(lvl.key_type)?;
    let mut b0 = action as u8;
    if perm_data.is_some() {
        b0 |= ENTRY_HAS_PERM;
    }
    iter.put_u8(b0)?;
    if let Some(p) = perm_data {
        iter.put_rb_slice(p)?;
    }
    match key {
        EntryData::Value(v) => {
            if !value_matches(key_type, v) {
                return Err(CodecError::UnsupportedDataType(v.data_type() as u8));
            }
            let res = iter.reserve(crate::container::remaining_hint(iter))?;
            crate::primitive::encode_primitive(iter, v)?;
            iter.patch(res)
        }
        EntryData::PreEncoded(b) => iter.put_rb_slice(b),
        EntryData::Blank => Err(CodecError::InvalidArgument("map key cannot be blank")),
    }
}

/// One-shot entry encode with a pre-encoded (or absent) payload.
pub fn encode_map_entry(
    iter: &mut EncodeIterator,
    action: MapEntryAction,
    perm_data: Option<&[u8]>,
    key: &EntryData,
    payload: Option<&[u8]>,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::Map as u8)?;
    let start = iter.cur;
    let r = (|| {
        let no_payload = action == MapEntryAction::Delete
            || iter.level()?.child_type == DataType::NoData as u8;
        if no_payload && payload.is_some() {
            return Err(CodecError::InvalidArgument("entry carries no payload"));
        }
        put_entry_header(iter, action, perm_data, key)?;
        if !no_payload {
            put_entry_data(
                iter,
                &payload.map_or(EntryData::Blank, EntryData::PreEncoded),
            )?;
        }
        iter.level_mut()?.count += 1;
        Ok(())
    })();
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
    }
    r
}

/// Begin an entry whose payload container is encoded in place.
pub fn encode_map_entry_init(
    iter: &mut EncodeIterator,
    action: MapEntryAction,
    perm_data: Option<&[u8]>,
    key: &EntryData,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::Map as u8)?;
    if action == MapEntryAction::Delete {
        return Err(CodecError::InvalidArgument("delete entries have no payload"));
    }
    let start = iter.cur;
    let r = put_entry_header(iter, action, perm_data, key);
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
        return r;
    }
    open_entry(iter, start)
}

pub fn encode_map_entry_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::Map as u8)?;
    if close_entry(iter, success)? {
        iter.level_mut()?.count += 1;
    }
    Ok(())
}

pub fn encode_map_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    finish_container(iter, DataType::Map as u8, success)
}

// ============================================================
// Decode
// ============================================================

pub fn decode_map<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Map<'a>> {
    let end = iter.value_end();
    let mut map = Map {
        flags: MapFlags::from_bits_truncate(iter.get_u8()?),
        key_primitive_type: DataType::from_u8(iter.get_u8()?)?,
        container_type: DataType::from_u8(iter.get_u8()?)?,
        ..Map::default()
    };
    if map.flags.contains(MapFlags::HAS_KEY_FIELD_ID) {
        map.key_field_id = iter.get_i16()?;
    }
    let mut set_defs = (NO_POS, NO_POS);
    if map.flags.contains(MapFlags::HAS_SET_DEFS) {
        set_defs = dec_blob(iter)?;
        let buf = iter.buf;
        map.enc_set_defs = Some(&buf[set_defs.0..set_defs.1]);
    }
    let mut summary = (0usize, 0usize);
    if map.flags.contains(MapFlags::HAS_SUMMARY_DATA) {
        summary = dec_blob(iter)?;
        let buf = iter.buf;
        map.enc_summary = Some(&buf[summary.0..summary.1]);
    }
    if map.flags.contains(MapFlags::HAS_TOTAL_COUNT_HINT) {
        map.total_count_hint = iter.get_rb()?;
    }
    let count = iter.get_u16()?;
    let next = iter.cur;
    if next > end {
        return Err(CodecError::IncompleteData);
    }
    let lvl = iter.push_level(DataType::Map as u8, end)?;
    lvl.flags = u16::from(map.flags.bits());
    lvl.child_type = map.container_type as u8;
    lvl.key_type = map.key_primitive_type as u8;
    lvl.count = count;
    lvl.next_entry = next;
    lvl.phase = DecPhase::StdItems;
    lvl.set_defs_pos = set_defs.0;
    lvl.set_defs_end = set_defs.1;
    if map.enc_summary.is_some() {
        // position for an in-place summary decode
        lvl.entry_end = summary.1;
        iter.cur = summary.0;
    }
    Ok(map)
}

pub fn decode_map_entry<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Option<MapEntry<'a>>> {
    let lvl = *iter.level()?;
    if lvl.container != DataType::Map as u8 {
        return Err(CodecError::InvalidArgument("no map open"));
    }
    if lvl.read >= lvl.count {
        iter.pop_container();
        return Ok(None);
    }
    iter.cur = lvl.next_entry;
    let b0 = iter.get_u8()?;
    let action = MapEntryAction::from_u8(b0 & 0x0F)?;
    let perm_data = if b0 & ENTRY_HAS_PERM != 0 {
        Some(iter.get_rb_slice()?)
    } else {
        None
    };
    let enc_key = iter.get_rb_slice()?;
    let enc_data = if action == MapEntryAction::Delete || lvl.child_type == DataType::NoData as u8 {
        &iter.buf[iter.cur..iter.cur]
    } else {
        iter.get_rb_slice()?
    };
    let data_end = iter.cur;
    if data_end > lvl.list_end {
        return Err(CodecError::IncompleteData);
    }
    let m = iter.level_mut()?;
    m.read += 1;
    m.next_entry = data_end;
    m.entry_end = data_end;
    iter.cur = data_end - enc_data.len();
    Ok(Some(MapEntry { action, perm_data, enc_key, enc_data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_list::{
        decode_field_entry, decode_field_list, encode_field_entry, encode_field_list_complete,
        encode_field_list_init, FieldList, FieldListFlags,
    };
    use crate::primitive::decode_int;

    fn entry_payload() -> Vec<u8> {
        let mut buf = vec![0u8; 64];
        let mut enc = EncodeIterator::new(&mut buf);
        let list = FieldList { flags: FieldListFlags::HAS_STANDARD_DATA, ..FieldList::default() };
        encode_field_list_init(&mut enc, &list, None).unwrap();
        encode_field_entry(&mut enc, 6, &EntryData::Value(PrimitiveValue::Int(55))).unwrap();
        encode_field_list_complete(&mut enc, true).unwrap();
        let n = enc.encoded_len();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_map_with_preencoded_entries() {
        let payload = entry_payload();
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        let map = Map {
            flags: MapFlags::HAS_TOTAL_COUNT_HINT,
            key_primitive_type: DataType::AsciiString,
            container_type: DataType::FieldList,
            total_count_hint: 2,
            ..Map::default()
        };
        encode_map_init(&mut enc, &map).unwrap();
        encode_map_entry(
            &mut enc,
            MapEntryAction::Add,
            None,
            &EntryData::Value(PrimitiveValue::Buffer(b"TRI.N")),
            Some(&payload),
        )
        .unwrap();
        encode_map_entry(
            &mut enc,
            MapEntryAction::Delete,
            None,
            &EntryData::Value(PrimitiveValue::Buffer(b"IBM.N")),
            None,
        )
        .unwrap();
        encode_map_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        let got = decode_map(&mut dec).unwrap();
        assert_eq!(got.key_primitive_type, DataType::AsciiString);
        assert_eq!(got.container_type, DataType::FieldList);
        assert_eq!(got.total_count_hint, 2);

        let e = decode_map_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.action, MapEntryAction::Add);
        assert_eq!(
            decode_map_entry_key(&e, DataType::AsciiString).unwrap(),
            Some(PrimitiveValue::Buffer(b"TRI.N"))
        );
        assert_eq!(e.enc_data, &payload[..]);
        // nested decode of the entry payload
        decode_field_list(&mut dec, None).unwrap();
        let f = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(f.field_id, 6);
        assert_eq!(decode_int(&mut dec).unwrap(), Some(55));
        assert!(decode_field_entry(&mut dec).unwrap().is_none());

        let e = decode_map_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.action, MapEntryAction::Delete);
        assert!(e.enc_data.is_empty());
        assert!(decode_map_entry(&mut dec).unwrap().is_none());
    }

    #[test]
    fn test_map_entry_init_nested_encode() {
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        let map = Map {
            flags: MapFlags::empty(),
            key_primitive_type: DataType::UInt,
            container_type: DataType::FieldList,
            ..Map::default()
        };
        encode_map_init(&mut enc, &map).unwrap();
        encode_map_entry_init(
            &mut enc,
            MapEntryAction::Add,
            None,
            &EntryData::Value(PrimitiveValue::UInt(17)),
        )
        .unwrap();
        let list = FieldList { flags: FieldListFlags::HAS_STANDARD_DATA, ..FieldList::default() };
        encode_field_list_init(&mut enc, &list, None).unwrap();
        encode_field_entry(&mut enc, 11, &EntryData::Value(PrimitiveValue::Int(1))).unwrap();
        encode_field_list_complete(&mut enc, true).unwrap();
        encode_map_entry_complete(&mut enc, true).unwrap();
        encode_map_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        decode_map(&mut dec).unwrap();
        let e = decode_map_entry(&mut dec).unwrap().unwrap();
        assert_eq!(
            decode_map_entry_key(&e, DataType::UInt).unwrap(),
            Some(PrimitiveValue::UInt(17))
        );
        decode_field_list(&mut dec, None).unwrap();
        let f = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(f.field_id, 11);
        assert_eq!(decode_int(&mut dec).unwrap(), Some(1));
        assert!(decode_field_entry(&mut dec).unwrap().is_none());
        assert!(decode_map_entry(&mut dec).unwrap().is_none());
    }

    #[test]
    fn test_preencoded_entry_length_arithmetic() {
        // header_overhead + sum of entry lengths, with only pre-encoded
        // entries
        let payload = entry_payload();
        let mut buf = vec![0u8; 512];
        let mut enc = EncodeIterator::new(&mut buf);
        let map = Map {
            flags: MapFlags::empty(),
            key_primitive_type: DataType::UInt,
            container_type: DataType::FieldList,
            ..Map::default()
        };
        encode_map_init(&mut enc, &map).unwrap();
        let header_len = enc.encoded_len();
        let mut expected = header_len;
        for key in [1u64, 2, 3] {
            let before = enc.encoded_len();
            encode_map_entry(
                &mut enc,
                MapEntryAction::Add,
                None,
                &EntryData::Value(PrimitiveValue::UInt(key)),
                Some(&payload),
            )
            .unwrap();
            expected += enc.encoded_len() - before;
        }
        encode_map_complete(&mut enc, true).unwrap();
        assert_eq!(enc.encoded_len(), expected);
    }
}
