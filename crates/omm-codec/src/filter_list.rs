// filter_list.rs — filter list container codec
//
// Entries are keyed by a small filter id matching the bit positions of
// a message key's filter word. Unlike the other keyed containers, each
// entry may override the list's payload container type.

use bitflags::bitflags;

use crate::container::{
    close_entry, finish_container, open_entry, put_entry_data, EntryData,
};
use crate::error::{CodecError, CodecResult};
use crate::iter::{DecPhase, DecodeIterator, EncState, EncodeIterator};
use crate::types::DataType;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FilterListFlags: u8 {
        const HAS_PER_ENTRY_PERM_DATA = 0x01;
        const HAS_TOTAL_COUNT_HINT    = 0x02;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterList {
    pub flags: FilterListFlags,
    pub container_type: DataType,
    pub total_count_hint: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilterEntryAction {
    Update = 1,
    Set = 2,
    Clear = 3,
}

impl FilterEntryAction {
    fn from_u8(v: u8) -> CodecResult<FilterEntryAction> {
        Ok(match v {
            1 => FilterEntryAction::Update,
            2 => FilterEntryAction::Set,
            3 => FilterEntryAction::Clear,
            _ => return Err(CodecError::InvalidData("bad filter entry action")),
        })
    }
}

const ENTRY_HAS_PERM: u8 = 0x10;
const ENTRY_HAS_CONTAINER_TYPE: u8 = 0x20;

#[derive(Debug, Clone, Copy)]
pub struct FilterEntry<'a> {
    pub action: FilterEntryAction,
    pub id: u8,
    /// Effective payload type: the entry's own override, or the list
    /// default.
    pub container_type: DataType,
    pub perm_data: Option<&'a [u8]>,
    pub enc_data: &'a [u8],
}

// ============================================================
// Encode
// ============================================================

pub fn encode_filter_list_init(iter: &mut EncodeIterator, list: &FilterList) -> CodecResult<()> {
    iter.alive()?;
    iter.push_level(DataType::FilterList as u8)?;
    iter.level_mut()?.flags = u16::from(list.flags.bits());
    iter.put_u8(list.flags.bits())?;
    iter.put_u8(list.container_type as u8)?;
    if list.flags.contains(FilterListFlags::HAS_TOTAL_COUNT_HINT) {
        iter.put_u8(list.total_count_hint)?;
    }
    let pos = iter.cur;
    iter.put_u8(0)?;
    let lvl = iter.level_mut()?;
    lvl.count_pos = pos;
    lvl.child_type = list.container_type as u8;
    lvl.state = EncState::Entries;
    Ok(())
}

fn put_entry_header(
    iter: &mut EncodeIterator,
    action: FilterEntryAction,
    id: u8,
    container_type: Option<DataType>,
    perm_data: Option<&[u8]>,
) -> CodecResult<()> {
    let lvl = iter.level()?;
    if lvl.state != EncState::Entries {
        return Err(CodecError::InvalidArgument("filter list is not accepting entries"));
    }
    if perm_data.is_some()
        && lvl.flags & u16::from(FilterListFlags::HAS_PER_ENTRY_PERM_DATA.bits()) == 0
    {
        return Err(CodecError::InvalidArgument("perm data not declared on filter list"));
    }
    let mut b0 = action as u8;
    if perm_data.is_some() {
        b0 |= ENTRY_HAS_PERM;
    }
    if container_type.is_some() {
        b0 |= ENTRY_HAS_CONTAINER_TYPE;
    }
    iter.put_u8(b0)?;
    iter.put_u8(id)?;
    if let Some(t) = container_type {
        iter.put_u8(t as u8)?;
    }
    if let Some(p) = perm_data {
        iter.put_rb_slice(p)?;
    }
    Ok(())
}

fn effective_type(iter: &EncodeIterator, container_type: Option<DataType>) -> CodecResult<u8> {
    Ok(match container_type {
        Some(t) => t as u8,
        None => iter.level()?.child_type,
    })
}

pub fn encode_filter_entry(
    iter: &mut EncodeIterator,
    action: FilterEntryAction,
    id: u8,
    container_type: Option<DataType>,
    perm_data: Option<&[u8]>,
    payload: Option<&[u8]>,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::FilterList as u8)?;
    let start = iter.cur;
    let r = (|| {
        let no_payload = action == FilterEntryAction::Clear
            || effective_type(iter, container_type)? == DataType::NoData as u8;
        if no_payload && payload.is_some() {
            return Err(CodecError::InvalidArgument("entry carries no payload"));
        }
        put_entry_header(iter, action, id, container_type, perm_data)?;
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

pub fn encode_filter_entry_init(
    iter: &mut EncodeIterator,
    action: FilterEntryAction,
    id: u8,
    container_type: Option<DataType>,
    perm_data: Option<&[u8]>,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::FilterList as u8)?;
    if action == FilterEntryAction::Clear {
        return Err(CodecError::InvalidArgument("clear entries have no payload"));
    }
    let start = iter.cur;
    let r = put_entry_header(iter, action, id, container_type, perm_data);
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
        return r;
    }
    open_entry(iter, start)
}

pub fn encode_filter_entry_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::FilterList as u8)?;
    if close_entry(iter, success)? {
        iter.level_mut()?.count += 1;
    }
    Ok(())
}

pub fn encode_filter_list_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    finish_container(iter, DataType::FilterList as u8, success)
}

// ============================================================
// Decode
// ============================================================

pub fn decode_filter_list(iter: &mut DecodeIterator) -> CodecResult<FilterList> {
    let end = iter.value_end();
    let mut list = FilterList {
        flags: FilterListFlags::from_bits_truncate(iter.get_u8()?),
        container_type: DataType::from_u8(iter.get_u8()?)?,
        ..FilterList::default()
    };
    if list.flags.contains(FilterListFlags::HAS_TOTAL_COUNT_HINT) {
        list.total_count_hint = iter.get_u8()?;
    }
    let count = u16::from(iter.get_u8()?);
    let next = iter.cur;
    if next > end {
        return Err(CodecError::IncompleteData);
    }
    let lvl = iter.push_level(DataType::FilterList as u8, end)?;
    lvl.flags = u16::from(list.flags.bits());
    lvl.child_type = list.container_type as u8;
    lvl.count = count;
    lvl.next_entry = next;
    lvl.phase = DecPhase::StdItems;
    Ok(list)
}

pub fn decode_filter_entry<'a>(
    iter: &mut DecodeIterator<'a>,
) -> CodecResult<Option<FilterEntry<'a>>> {
    let lvl = *iter.level()?;
    if lvl.container != DataType::FilterList as u8 {
        return Err(CodecError::InvalidArgument("no filter list open"));
    }
    if lvl.read >= lvl.count {
        iter.pop_container();
        return Ok(None);
    }
    iter.cur = lvl.next_entry;
    let b0 = iter.get_u8()?;
    let action = FilterEntryAction::from_u8(b0 & 0x0F)?;
    let id = iter.get_u8()?;
    let container_type = if b0 & ENTRY_HAS_CONTAINER_TYPE != 0 {
        DataType::from_u8(iter.get_u8()?)?
    } else {
        DataType::from_u8(lvl.child_type)?
    };
    let perm_data = if b0 & ENTRY_HAS_PERM != 0 {
        Some(iter.get_rb_slice()?)
    } else {
        None
    };
    let enc_data = if action == FilterEntryAction::Clear
        || container_type == DataType::NoData
    {
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
    Ok(Some(FilterEntry { action, id, container_type, perm_data, enc_data }))
}
