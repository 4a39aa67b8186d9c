// element_list.rs — element list container codec
//
// Entries are keyed by a UTF-8 name and carry their declared data type
// on the wire, unlike field lists. Set-defined entries omit both and
// are reconstructed from the bound set definition.

use bitflags::bitflags;

use crate::container::{
    close_entry, dec_blob, finish_container, open_entry, open_std_count, put_entry_data,
    remaining_hint, value_matches, EntryData,
};
use crate::error::{CodecError, CodecResult};
use crate::iter::{rb_get, DecPhase, DecodeIterator, EncState, EncodeIterator, Reserved, SetSource, NO_POS};
use crate::set_def::LocalElementSetDefDb;
use crate::types::DataType;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ElementListFlags: u8 {
        const HAS_ELEMENT_LIST_INFO = 0x01;
        const HAS_SET_DATA          = 0x02;
        const HAS_SET_ID            = 0x04;
        const HAS_STANDARD_DATA     = 0x08;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ElementList<'a> {
    pub flags: ElementListFlags,
    pub element_list_num: i16,
    pub set_id: u16,
    pub enc_set_data: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementEntry<'a> {
    pub name: &'a [u8],
    pub data_type: DataType,
    pub enc_data: &'a [u8],
}

// ============================================================
// Encode
// ============================================================

pub fn encode_element_list_init<'a>(
    iter: &mut EncodeIterator<'a>,
    list: &ElementList<'a>,
    set_db: Option<&'a LocalElementSetDefDb<'a>>,
) -> CodecResult<()> {
    iter.alive()?;
    let flags = list.flags;
    if !flags.intersects(ElementListFlags::HAS_SET_DATA | ElementListFlags::HAS_STANDARD_DATA) {
        return Err(CodecError::InvalidArgument("element list carries no data"));
    }
    iter.push_level(DataType::ElementList as u8)?;
    iter.level_mut()?.flags = u16::from(flags.bits());
    iter.put_u8(flags.bits())?;
    if flags.contains(ElementListFlags::HAS_ELEMENT_LIST_INFO) {
        iter.put_i16(list.element_list_num)?;
    }
    if flags.contains(ElementListFlags::HAS_SET_DATA) {
        if flags.contains(ElementListFlags::HAS_SET_ID) {
            iter.put_rb(u32::from(list.set_id))?;
        }
        match list.enc_set_data {
            Some(pre) => {
                if flags.contains(ElementListFlags::HAS_STANDARD_DATA) {
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
                let res = if flags.contains(ElementListFlags::HAS_STANDARD_DATA) {
                    iter.reserve(remaining_hint(iter))?
                } else {
                    Reserved::NONE
                };
                let lvl = iter.level_mut()?;
                lvl.set_db_elem = Some(db);
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

fn finish_set_section(iter: &mut EncodeIterator) -> CodecResult<()> {
    let res = iter.level()?.set_data_res;
    if !res.is_none() {
        iter.patch(res)?;
        iter.level_mut()?.set_data_res = Reserved::NONE;
    }
    let has_std =
        iter.level()?.flags & u16::from(ElementListFlags::HAS_STANDARD_DATA.bits()) != 0;
    if has_std {
        open_std_count(iter)?;
    } else {
        iter.level_mut()?.state = EncState::Entries;
    }
    Ok(())
}

fn set_entry_at<'a>(
    iter: &EncodeIterator<'a>,
    ordinal: u16,
) -> CodecResult<(&'a [u8], DataType)> {
    let lvl = iter.level()?;
    let db = lvl
        .set_db_elem
        .ok_or(CodecError::InvalidArgument("no set definition bound"))?;
    let e = db.defs[lvl.set_index].entries[ordinal as usize];
    Ok((e.name, e.data_type))
}

pub fn encode_element_entry(
    iter: &mut EncodeIterator,
    name: &[u8],
    data_type: DataType,
    data: &EntryData,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::ElementList as u8)?;
    let start = iter.cur;
    let r = encode_element_entry_inner(iter, name, data_type, data);
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
    }
    r
}

fn encode_element_entry_inner(
    iter: &mut EncodeIterator,
    name: &[u8],
    data_type: DataType,
    data: &EntryData,
) -> CodecResult<()> {
    match iter.level()?.state {
        EncState::SetEntries => {
            let ordinal = iter.level()?.set_next;
            let (def_name, def_type) = set_entry_at(iter, ordinal)?;
            if def_name != name {
                return Err(CodecError::InvalidArgument("element name out of set order"));
            }
            if let EntryData::Value(v) = data {
                if !value_matches(def_type, v) {
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
            if let EntryData::Value(v) = data {
                if !value_matches(data_type, v) {
                    return Err(CodecError::UnsupportedDataType(v.data_type() as u8));
                }
            }
            iter.put_rb_slice(name)?;
            iter.put_u8(data_type as u8)?;
            put_entry_data(iter, data)?;
            iter.level_mut()?.count += 1;
            Ok(())
        }
        _ => Err(CodecError::InvalidArgument("list is not accepting entries")),
    }
}

/// Begin an entry whose payload is a nested container.
pub fn encode_element_entry_init(
    iter: &mut EncodeIterator,
    name: &[u8],
    data_type: DataType,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::ElementList as u8)?;
    let start = iter.cur;
    match iter.level()?.state {
        EncState::SetEntries => {
            let ordinal = iter.level()?.set_next;
            let (def_name, _) = set_entry_at(iter, ordinal)?;
            if def_name != name {
                return Err(CodecError::InvalidArgument("element name out of set order"));
            }
            open_entry(iter, start)
        }
        EncState::Entries => {
            if iter.level()?.count_pos == NO_POS {
                return Err(CodecError::InvalidArgument("list has no standard section"));
            }
            iter.put_rb_slice(name)?;
            iter.put_u8(data_type as u8)?;
            open_entry(iter, start)
        }
        _ => Err(CodecError::InvalidArgument("list is not accepting entries")),
    }
}

pub fn encode_element_entry_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::ElementList as u8)?;
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

pub fn encode_element_list_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    finish_container(iter, DataType::ElementList as u8, success)
}

// ============================================================
// Decode
// ============================================================

pub fn decode_element_list<'a>(
    iter: &mut DecodeIterator<'a>,
    set_db: Option<&'a LocalElementSetDefDb<'a>>,
) -> CodecResult<ElementList<'a>> {
    let end = iter.value_end();
    let mut list = ElementList {
        flags: ElementListFlags::from_bits_truncate(iter.get_u8()?),
        ..ElementList::default()
    };
    if list.flags.contains(ElementListFlags::HAS_ELEMENT_LIST_INFO) {
        list.element_list_num = iter.get_i16()?;
    }

    let has_set = list.flags.contains(ElementListFlags::HAS_SET_DATA);
    let has_std = list.flags.contains(ElementListFlags::HAS_STANDARD_DATA);
    let mut set_range = (0usize, 0usize);
    let mut source = SetSource::None;
    let mut set_index = 0usize;
    let mut set_count = 0u16;

    if has_set {
        if list.flags.contains(ElementListFlags::HAS_SET_ID) {
            list.set_id = iter.get_rb()? as u16;
        }
        if has_std {
            set_range = dec_blob(iter)?;
        } else {
            set_range = (iter.cur, end);
        }
        let buf = iter.buf;
        list.enc_set_data = Some(&buf[set_range.0..set_range.1]);
        if let Some(db) = set_db {
            if let Some((i, d)) = db.defs.iter().enumerate().find(|(_, d)| d.set_id == list.set_id)
            {
                source = SetSource::Elem(db);
                set_index = i;
                set_count = d.entries.len() as u16;
            }
        }
        if matches!(source, SetSource::None) {
            if let Some(i) = iter
                .scratch_elem
                .defs
                .iter()
                .position(|d| d.set_id == list.set_id)
            {
                source = SetSource::Scratch;
                set_index = i;
                set_count = iter.scratch_elem.defs[i].entries.len() as u16;
            } else if let Some(db) = iter.global_elem {
                if let Some((i, d)) = db.find(list.set_id) {
                    source = SetSource::GlobalElem(db);
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
        set_count = 0;
    }

    let lvl = iter.push_level(DataType::ElementList as u8, end)?;
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

fn dec_set_entry_at<'a>(
    iter: &DecodeIterator<'a>,
    ordinal: u16,
) -> CodecResult<(&'a [u8], DataType)> {
    let lvl = iter.level()?;
    match lvl.set_source {
        SetSource::Elem(db) => {
            let e = db.defs[lvl.set_index].entries[ordinal as usize];
            Ok((e.name, e.data_type))
        }
        SetSource::Scratch => {
            let e = iter.scratch_elem.defs[lvl.set_index].entries[ordinal as usize];
            Ok((e.name, e.data_type))
        }
        SetSource::GlobalElem(db) => {
            let e = &db.def_at(lvl.set_index).entries[ordinal as usize];
            Ok((e.name.as_slice(), e.data_type))
        }
        _ => Err(CodecError::InvalidArgument("no set definition bound")),
    }
}

pub fn decode_element_entry<'a>(
    iter: &mut DecodeIterator<'a>,
) -> CodecResult<Option<ElementEntry<'a>>> {
    loop {
        let lvl = *iter.level()?;
        if lvl.container != DataType::ElementList as u8 {
            return Err(CodecError::InvalidArgument("no element list open"));
        }
        match lvl.phase {
            DecPhase::SetItems => {
                if lvl.set_next >= lvl.set_count {
                    let has_std =
                        lvl.flags & u16::from(ElementListFlags::HAS_STANDARD_DATA.bits()) != 0;
                    iter.level_mut()?.phase =
                        if has_std { DecPhase::StdHeader } else { DecPhase::Done };
                    continue;
                }
                let (name, data_type) = dec_set_entry_at(iter, lvl.set_next)?;
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
                let buf = iter.buf;
                return Ok(Some(ElementEntry {
                    name,
                    data_type,
                    enc_data: &buf[start..data_end],
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
                let name = iter.get_rb_slice()?;
                let data_type = DataType::from_u8(iter.get_u8()?)?;
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
                return Ok(Some(ElementEntry { name, data_type, enc_data: data }));
            }
            DecPhase::Done => {
                iter.pop_container();
                return Ok(None);
            }
        }
    }
}
