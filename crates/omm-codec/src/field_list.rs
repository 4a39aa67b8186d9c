// field_list.rs — field list container codec
//
// Entries are keyed by a 16-bit field id; standard entries carry no
// type byte, so decoders report UNKNOWN and the caller resolves the
// type through its field dictionary. Set-defined entries come first on
// the wire and are produced through the same entry iteration API.

use bitflags::bitflags;

use crate::container::{
    close_entry, dec_blob, finish_container, open_entry, open_std_count, put_entry_data,
    remaining_hint, value_matches, EntryData,
};
use crate::error::{CodecError, CodecResult};
use crate::iter::{rb_get, DecPhase, DecodeIterator, EncState, EncodeIterator, Reserved, SetSource, NO_POS};
use crate::set_def::{FieldSetDefEntry, LocalFieldSetDefDb};
use crate::types::DataType;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FieldListFlags: u8 {
        const HAS_FIELD_LIST_INFO = 0x01;
        const HAS_SET_DATA        = 0x02;
        const HAS_SET_ID          = 0x04;
        const HAS_STANDARD_DATA   = 0x08;
    }
}

/// Field list header. On decode, `enc_set_data` is the raw set-data
/// section when one is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldList<'a> {
    pub flags: FieldListFlags,
    pub dictionary_id: u16,
    pub field_list_num: i16,
    pub set_id: u16,
    pub enc_set_data: Option<&'a [u8]>,
}

/// One decoded entry. `data_type` is Unknown for standard entries and
/// comes from the set definition for set-defined entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEntry<'a> {
    pub field_id: i16,
    pub data_type: DataType,
    pub enc_data: &'a [u8],
}

// ============================================================
// Encode
// ============================================================

pub fn encode_field_list_init<'a>(
    iter: &mut EncodeIterator<'a>,
    list: &FieldList<'a>,
    set_db: Option<&'a LocalFieldSetDefDb>,
) -> CodecResult<()> {
    iter.alive()?;
    let flags = list.flags;
    if !flags.intersects(FieldListFlags::HAS_SET_DATA | FieldListFlags::HAS_STANDARD_DATA) {
        return Err(CodecError::InvalidArgument("field list carries no data"));
    }
    iter.push_level(DataType::FieldList as u8)?;
    iter.level_mut()?.flags = u16::from(flags.bits());
    iter.put_u8(flags.bits())?;
    if flags.contains(FieldListFlags::HAS_FIELD_LIST_INFO) {
        iter.put_rb(u32::from(list.dictionary_id))?;
        iter.put_i16(list.field_list_num)?;
    }
    if flags.contains(FieldListFlags::HAS_SET_DATA) {
        if flags.contains(FieldListFlags::HAS_SET_ID) {
            iter.put_rb(u32::from(list.set_id))?;
        }
        match list.enc_set_data {
            Some(pre) => {
                if flags.contains(FieldListFlags::HAS_STANDARD_DATA) {
                    iter.put_rb_slice(pre)?;
                    open_std_count(iter)?;
                } else {
                    iter.put_slice(pre)?;
                    iter.level_mut()?.state = EncState::Entries;
                }
            }
            None => {
                let db = set_db
                    .ok_or(CodecError::InvalidArgument("set data requires a set-def db"))?;
                let (index, def) = db
                    .defs
                    .iter()
                    .enumerate()
                    .find(|(_, d)| d.set_id == list.set_id)
                    .ok_or(CodecError::InvalidArgument("set definition not found"))?;
                let set_count = def.entries.len() as u16;
                let res = if flags.contains(FieldListFlags::HAS_STANDARD_DATA) {
                    iter.reserve(remaining_hint(iter))?
                } else {
                    Reserved::NONE
                };
                let lvl = iter.level_mut()?;
                lvl.set_db_field = Some(db);
                lvl.set_index = index;
                lvl.set_count = set_count;
                lvl.set_data_res = res;
                lvl.state = EncState::SetEntries;
            }
        }
    } else {
        open_std_count(iter)?;
    }
    Ok(())
}

/// Patch the set-data prefix and move to the standard section once the
/// last set-defined entry has been written.
fn finish_set_section(iter: &mut EncodeIterator) -> CodecResult<()> {
    let res = iter.level()?.set_data_res;
    if !res.is_none() {
        iter.patch(res)?;
        iter.level_mut()?.set_data_res = Reserved::NONE;
    }
    let has_std = iter.level()?.flags & u16::from(FieldListFlags::HAS_STANDARD_DATA.bits()) != 0;
    if has_std {
        open_std_count(iter)?;
    } else {
        iter.level_mut()?.state = EncState::Entries;
    }
    Ok(())
}

fn set_entry_at(iter: &EncodeIterator, ordinal: u16) -> CodecResult<FieldSetDefEntry> {
    let lvl = iter.level()?;
    let db = lvl
        .set_db_field
        .ok_or(CodecError::InvalidArgument("no set definition bound"))?;
    Ok(db.defs[lvl.set_index].entries[ordinal as usize])
}

/// One-shot entry encode. A failure rewinds to the entry start so the
/// enclosing list still completes cleanly.
pub fn encode_field_entry(
    iter: &mut EncodeIterator,
    field_id: i16,
    data: &EntryData,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::FieldList as u8)?;
    let start = iter.cur;
    let r = encode_field_entry_inner(iter, field_id, data);
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
    }
    r
}

fn encode_field_entry_inner(
    iter: &mut EncodeIterator,
    field_id: i16,
    data: &EntryData,
) -> CodecResult<()> {
    match iter.level()?.state {
        EncState::SetEntries => {
            let ordinal = iter.level()?.set_next;
            let def = set_entry_at(iter, ordinal)?;
            if def.field_id != field_id {
                return Err(CodecError::InvalidArgument("field id out of set order"));
            }
            if let EntryData::Value(v) = data {
                if !value_matches(def.data_type, v) {
                    return Err(CodecError::UnsupportedDataType(v.data_type() as u8));
                }
            }
            put_entry_data(iter, data)?;
            let lvl = iter.level_mut()?;
            lvl.set_next += 1;
            if lvl.set_next == lvl.set_count {
                finish_set_section(iter)?;
            }
            Ok(())
        }
        EncState::Entries => {
            if iter.level()?.count_pos == NO_POS {
                return Err(CodecError::InvalidArgument("list has no standard section"));
            }
            iter.put_i16(field_id)?;
            put_entry_data(iter, data)?;
            iter.level_mut()?.count += 1;
            Ok(())
        }
        _ => Err(CodecError::InvalidArgument("list is not accepting entries")),
    }
}

/// Begin an entry whose payload is encoded with nested init/complete
/// calls (containers inside a field).
pub fn encode_field_entry_init(iter: &mut EncodeIterator, field_id: i16) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::FieldList as u8)?;
    let start = iter.cur;
    match iter.level()?.state {
        EncState::SetEntries => {
            let ordinal = iter.level()?.set_next;
            let def = set_entry_at(iter, ordinal)?;
            if def.field_id != field_id {
                return Err(CodecError::InvalidArgument("field id out of set order"));
            }
            open_entry(iter, start)
        }
        EncState::Entries => {
            if iter.level()?.count_pos == NO_POS {
                return Err(CodecError::InvalidArgument("list has no standard section"));
            }
            iter.put_i16(field_id)?;
            open_entry(iter, start)
        }
        _ => Err(CodecError::InvalidArgument("list is not accepting entries")),
    }
}

pub fn encode_field_entry_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::FieldList as u8)?;
    let counted = close_entry(iter, success)?;
    if counted {
        if iter.level()?.entry_prev == EncState::SetEntries {
            let lvl = iter.level_mut()?;
            lvl.set_next += 1;
            if lvl.set_next == lvl.set_count {
                finish_set_section(iter)?;
            }
        } else {
            iter.level_mut()?.count += 1;
        }
    }
    Ok(())
}

pub fn encode_field_list_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    finish_container(iter, DataType::FieldList as u8, success)
}

// ============================================================
// Decode
// ============================================================

pub fn decode_field_list<'a>(
    iter: &mut DecodeIterator<'a>,
    set_db: Option<&'a LocalFieldSetDefDb>,
) -> CodecResult<FieldList<'a>> {
    let end = iter.value_end();
    let mut list = FieldList {
        flags: FieldListFlags::from_bits_truncate(iter.get_u8()?),
        ..FieldList::default()
    };
    if list.flags.contains(FieldListFlags::HAS_FIELD_LIST_INFO) {
        list.dictionary_id = iter.get_rb()? as u16;
        list.field_list_num = iter.get_i16()?;
    }

    let has_set = list.flags.contains(FieldListFlags::HAS_SET_DATA);
    let has_std = list.flags.contains(FieldListFlags::HAS_STANDARD_DATA);
    let mut set_range = (0usize, 0usize);
    let mut source = SetSource::None;
    let mut set_index = 0usize;
    let mut set_count = 0u16;

    if has_set {
        if list.flags.contains(FieldListFlags::HAS_SET_ID) {
            list.set_id = iter.get_rb()? as u16;
        }
        if has_std {
            set_range = dec_blob(iter)?;
        } else {
            set_range = (iter.cur, end);
        }
        list.enc_set_data = Some(&iter.buf[set_range.0..set_range.1]);
        if let Some(db) = set_db {
            if let Some((i, d)) = db.defs.iter().enumerate().find(|(_, d)| d.set_id == list.set_id)
            {
                source = SetSource::Field(db);
                set_index = i;
                set_count = d.entries.len() as u16;
            }
        }
        if matches!(source, SetSource::None) {
            if let Some(i) = iter
                .scratch_field
                .defs
                .iter()
                .position(|d| d.set_id == list.set_id)
            {
                source = SetSource::Scratch;
                set_index = i;
                set_count = iter.scratch_field.defs[i].entries.len() as u16;
            } else if let Some(db) = iter.global_field {
                if let Some((i, d)) = db.find(list.set_id) {
                    source = SetSource::GlobalField(db);
                    set_index = i;
                    set_count = d.entries.len() as u16;
                }
            }
        }
    }

    let after_header = iter.cur;
    if after_header > end {
        return Err(CodecError::IncompleteData);
    }
    if has_set && matches!(source, SetSource::None) {
        // no definitions available: skip set entries entirely
        set_count = 0;
    }

    let lvl = iter.push_level(DataType::FieldList as u8, end)?;
    lvl.flags = u16::from(list.flags.bits());
    lvl.set_source = source;
    lvl.set_index = set_index;
    lvl.set_count = set_count;
    if has_set {
        lvl.set_end = set_range.1;
        lvl.next_entry = set_range.0;
        lvl.phase = if set_count > 0 {
            DecPhase::SetItems
        } else if has_std {
            DecPhase::StdHeader
        } else {
            DecPhase::Done
        };
    } else {
        lvl.phase = DecPhase::StdHeader;
        lvl.set_end = after_header;
    }
    Ok(list)
}

fn dec_set_entry_at(iter: &DecodeIterator, ordinal: u16) -> CodecResult<FieldSetDefEntry> {
    let lvl = iter.level()?;
    let def = match lvl.set_source {
        SetSource::Field(db) => &db.defs[lvl.set_index],
        SetSource::Scratch => &iter.scratch_field.defs[lvl.set_index],
        SetSource::GlobalField(db) => db.def_at(lvl.set_index),
        _ => return Err(CodecError::InvalidArgument("no set definition bound")),
    };
    Ok(def.entries[ordinal as usize])
}

/// Next entry, or None at end of container (which restores the parent
/// decode position).
pub fn decode_field_entry<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Option<FieldEntry<'a>>> {
    loop {
        let lvl = *iter.level()?;
        if lvl.container != DataType::FieldList as u8 {
            return Err(CodecError::InvalidArgument("no field list open"));
        }
        match lvl.phase {
            DecPhase::SetItems => {
                if lvl.set_next >= lvl.set_count {
                    let has_std =
                        lvl.flags & u16::from(FieldListFlags::HAS_STANDARD_DATA.bits()) != 0;
                    iter.level_mut()?.phase =
                        if has_std { DecPhase::StdHeader } else { DecPhase::Done };
                    continue;
                }
                let def = dec_set_entry_at(iter, lvl.set_next)?;
                let (len, n) = rb_get(iter.buf, lvl.next_entry)?;
                let start = lvl.next_entry + n;
                let data_end = start + len as usize;
                if data_end > lvl.set_end {
                    return Err(CodecError::IncompleteData);
                }
                let m = iter.level_mut()?;
                m.set_next += 1;
                m.next_entry = data_end;
                m.entry_end = data_end;
                iter.cur = start;
                return Ok(Some(FieldEntry {
                    field_id: def.field_id,
                    data_type: def.data_type,
                    enc_data: &iter.buf[start..data_end],
                }));
            }
            DecPhase::StdHeader => {
                iter.cur = lvl.set_end;
                let count = iter.get_u16()?;
                let next_entry = iter.cur;
                let m = iter.level_mut()?;
                m.count = count;
                m.read = 0;
                m.next_entry = next_entry;
                m.phase = DecPhase::StdItems;
                continue;
            }
            DecPhase::StdItems => {
                if lvl.read >= lvl.count {
                    iter.level_mut()?.phase = DecPhase::Done;
                    continue;
                }
                iter.cur = lvl.next_entry;
                let field_id = iter.get_i16()?;
                let data = iter.get_rb_slice()?;
                let data_end = iter.cur;
                if data_end > lvl.list_end {
                    return Err(CodecError::IncompleteData);
                }
                let m = iter.level_mut()?;
                m.read += 1;
                m.next_entry = data_end;
                m.entry_end = data_end;
                iter.cur = data_end - data.len();
                return Ok(Some(FieldEntry {
                    field_id,
                    data_type: DataType::Unknown,
                    enc_data: data,
                }));
            }
            DecPhase::Done => {
                iter.pop_container();
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{decode_int, decode_real};
    use crate::set_def::FieldSetDef;
    use crate::types::{PrimitiveValue, Real, RealHint};

    #[test]
    fn test_standard_entries_round_trip() {
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        let list = FieldList {
            flags: FieldListFlags::HAS_STANDARD_DATA | FieldListFlags::HAS_FIELD_LIST_INFO,
            dictionary_id: 1,
            field_list_num: 99,
            ..FieldList::default()
        };
        encode_field_list_init(&mut enc, &list, None).unwrap();
        encode_field_entry(
            &mut enc,
            22,
            &EntryData::Value(PrimitiveValue::Real(Real::new(RealHint::ExponentNeg2, 1999))),
        )
        .unwrap();
        encode_field_entry(&mut enc, 25, &EntryData::Value(PrimitiveValue::Int(-7))).unwrap();
        encode_field_entry(&mut enc, 1080, &EntryData::Blank).unwrap();
        encode_field_list_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        let got = decode_field_list(&mut dec, None).unwrap();
        assert_eq!(got.dictionary_id, 1);
        assert_eq!(got.field_list_num, 99);

        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.field_id, 22);
        assert_eq!(e.data_type, DataType::Unknown);
        assert_eq!(
            decode_real(&mut dec).unwrap(),
            Some(Real::new(RealHint::ExponentNeg2, 1999))
        );

        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.field_id, 25);
        assert_eq!(decode_int(&mut dec).unwrap(), Some(-7));

        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.field_id, 1080);
        assert!(e.enc_data.is_empty());

        assert!(decode_field_entry(&mut dec).unwrap().is_none());
    }

    fn bid_ask_db() -> LocalFieldSetDefDb {
        let mut db = LocalFieldSetDefDb::new();
        db.add(FieldSetDef {
            set_id: 0,
            entries: vec![
                FieldSetDefEntry { field_id: 22, data_type: DataType::Real },
                FieldSetDefEntry { field_id: 25, data_type: DataType::Real },
            ],
        })
        .unwrap();
        db
    }

    #[test]
    fn test_set_data_followed_by_standard() {
        let db = bid_ask_db();
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        let list = FieldList {
            flags: FieldListFlags::HAS_SET_DATA | FieldListFlags::HAS_STANDARD_DATA,
            ..FieldList::default()
        };
        encode_field_list_init(&mut enc, &list, Some(&db)).unwrap();
        encode_field_entry(
            &mut enc,
            22,
            &EntryData::Value(PrimitiveValue::Real(Real::new(RealHint::Exponent0, 101))),
        )
        .unwrap();
        encode_field_entry(
            &mut enc,
            25,
            &EntryData::Value(PrimitiveValue::Real(Real::new(RealHint::Exponent0, 102))),
        )
        .unwrap();
        encode_field_entry(&mut enc, 6, &EntryData::Value(PrimitiveValue::Int(12))).unwrap();
        encode_field_list_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let db2 = bid_ask_db();
        let mut dec = DecodeIterator::new(&wire);
        let got = decode_field_list(&mut dec, Some(&db2)).unwrap();
        assert!(got.enc_set_data.is_some());

        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!((e.field_id, e.data_type), (22, DataType::Real));
        assert_eq!(
            decode_real(&mut dec).unwrap(),
            Some(Real::new(RealHint::Exponent0, 101))
        );
        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!((e.field_id, e.data_type), (25, DataType::Real));
        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!((e.field_id, e.data_type), (6, DataType::Unknown));
        assert_eq!(decode_int(&mut dec).unwrap(), Some(12));
        assert!(decode_field_entry(&mut dec).unwrap().is_none());
    }

    #[test]
    fn test_set_data_skipped_without_db() {
        let db = bid_ask_db();
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        let list = FieldList {
            flags: FieldListFlags::HAS_SET_DATA | FieldListFlags::HAS_STANDARD_DATA,
            ..FieldList::default()
        };
        encode_field_list_init(&mut enc, &list, Some(&db)).unwrap();
        encode_field_entry(
            &mut enc,
            22,
            &EntryData::Value(PrimitiveValue::Real(Real::new(RealHint::Exponent0, 101))),
        )
        .unwrap();
        encode_field_entry(
            &mut enc,
            25,
            &EntryData::Value(PrimitiveValue::Real(Real::new(RealHint::Exponent0, 102))),
        )
        .unwrap();
        encode_field_entry(&mut enc, 6, &EntryData::Value(PrimitiveValue::Int(12))).unwrap();
        encode_field_list_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        // decoder has no definitions: only the standard entry appears
        let mut dec = DecodeIterator::new(&wire);
        decode_field_list(&mut dec, None).unwrap();
        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.field_id, 6);
        assert!(decode_field_entry(&mut dec).unwrap().is_none());
    }

    #[test]
    fn test_rollback_leaves_buffer_unchanged() {
        let mut buf = vec![0u8; 256];
        buf[0] = 0xEE;
        let mut enc = EncodeIterator::new(&mut buf);
        enc.put_u8(0x55).unwrap();
        let before = enc.cur;
        let list = FieldList {
            flags: FieldListFlags::HAS_STANDARD_DATA,
            ..FieldList::default()
        };
        encode_field_list_init(&mut enc, &list, None).unwrap();
        encode_field_entry(&mut enc, 1, &EntryData::Value(PrimitiveValue::Int(1))).unwrap();
        encode_field_entry(&mut enc, 2, &EntryData::Value(PrimitiveValue::Int(2))).unwrap();
        encode_field_list_complete(&mut enc, false).unwrap();
        assert_eq!(enc.cur, before);
        assert_eq!(enc.encoded(), &[0x55]);
    }

    #[test]
    fn test_entry_failure_spares_siblings() {
        let mut storage = vec![0u8; 16];
        let mut enc = EncodeIterator::new(&mut storage);
        let list = FieldList {
            flags: FieldListFlags::HAS_STANDARD_DATA,
            ..FieldList::default()
        };
        encode_field_list_init(&mut enc, &list, None).unwrap();
        encode_field_entry(&mut enc, 1, &EntryData::Value(PrimitiveValue::Int(1))).unwrap();
        // too big for what remains
        let big = [0u8; 64];
        assert_eq!(
            encode_field_entry(&mut enc, 2, &EntryData::PreEncoded(&big)),
            Err(CodecError::BufferTooSmall)
        );
        // parent still completes with the surviving entry
        encode_field_list_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&wire);
        decode_field_list(&mut dec, None).unwrap();
        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.field_id, 1);
        assert!(decode_field_entry(&mut dec).unwrap().is_none());
    }
}
