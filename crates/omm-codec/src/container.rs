// container.rs — machinery shared by the container codecs
//
// Every container follows the same init / entry / complete protocol.
// This module holds the pieces they share: the entry payload forms, the
// set-defs/summary section sequencing for Map/Vector/Series, and the
// count back-patching at complete time.

use crate::error::{CodecError, CodecResult};
use crate::iter::{
    DecodeIterator, EncState, EncodeIterator, Reserved, NO_POS,
};
use crate::primitive::encode_primitive;
use crate::types::{DataType, PrimitiveValue};

/// Payload supplied with a one-shot entry encode.
#[derive(Debug, Clone, Copy)]
pub enum EntryData<'a> {
    /// Encode this primitive now.
    Value(PrimitiveValue<'a>),
    /// Copy pre-encoded bytes verbatim.
    PreEncoded(&'a [u8]),
    /// Zero-length blank entry.
    Blank,
}

/// Loose type compatibility between a declared type and a supplied
/// value: the Buffer value form carries every string flavor.
pub(crate) fn value_matches(declared: DataType, v: &PrimitiveValue) -> bool {
    let vt = v.data_type();
    if vt == declared {
        return true;
    }
    matches!(
        (declared, vt),
        (
            DataType::AsciiString | DataType::Utf8String | DataType::RmtesString | DataType::Buffer,
            DataType::Buffer
        )
    )
}

/// Remaining buffer capacity, used to size entry length reservations:
/// a length can never exceed the space left, so the reserved width is
/// always sufficient.
pub(crate) fn remaining_hint(iter: &EncodeIterator) -> u32 {
    let rem = iter.buf.len().saturating_sub(iter.cur);
    u32::try_from(rem).unwrap_or(u32::MAX)
}

/// Write an rb-prefixed entry payload from its one-shot form.
pub(crate) fn put_entry_data(iter: &mut EncodeIterator, data: &EntryData) -> CodecResult<()> {
    match data {
        EntryData::Value(v) => {
            let res = iter.reserve(remaining_hint(iter))?;
            encode_primitive(iter, v)?;
            iter.patch(res)
        }
        EntryData::PreEncoded(b) => iter.put_rb_slice(b),
        EntryData::Blank => iter.put_rb(0),
    }
}

// ============================================================
// Set-defs / summary sequencing (Map, Vector, Series)
// ============================================================

/// Handle the optional set-defs and summary sections right after a
/// Map/Vector/Series header. Pre-encoded sections are copied inline;
/// the first caller-encoded section leaves the level waiting for its
/// matching complete call.
pub(crate) fn begin_sections<'a>(
    iter: &mut EncodeIterator<'a>,
    has_set_defs: bool,
    enc_set_defs: Option<&'a [u8]>,
    has_summary: bool,
    enc_summary: Option<&'a [u8]>,
) -> CodecResult<()> {
    if has_set_defs {
        match enc_set_defs {
            Some(b) => iter.put_rb_slice(b)?,
            None => {
                let res = iter.reserve(remaining_hint(iter))?;
                let lvl = iter.level_mut()?;
                lvl.blob_res = res;
                lvl.state = EncState::WantSetDefs;
                lvl.pending_summary = if has_summary { enc_summary } else { None };
                return Ok(());
            }
        }
    }
    begin_summary(iter, has_summary, enc_summary)
}

fn begin_summary<'a>(
    iter: &mut EncodeIterator<'a>,
    has_summary: bool,
    enc_summary: Option<&'a [u8]>,
) -> CodecResult<()> {
    if has_summary {
        match enc_summary {
            Some(b) => iter.put_rb_slice(b)?,
            None => {
                let res = iter.reserve(remaining_hint(iter))?;
                let lvl = iter.level_mut()?;
                lvl.blob_res = res;
                lvl.state = EncState::WantSummary;
                return Ok(());
            }
        }
    }
    enter_entries(iter)
}

/// Write the standard-entry count placeholder and open the entry
/// section. The placeholder is patched by `finish_container`.
pub(crate) fn open_std_count(iter: &mut EncodeIterator) -> CodecResult<()> {
    let pos = iter.cur;
    iter.put_u16(0)?;
    let lvl = iter.level_mut()?;
    lvl.count_pos = pos;
    lvl.state = EncState::Entries;
    Ok(())
}

/// Open the entry section of a Map/Vector/Series: optional total-count
/// hint, then the count placeholder. `count_hint` is u32::MAX when the
/// header did not declare one.
pub(crate) fn enter_entries(iter: &mut EncodeIterator) -> CodecResult<()> {
    let hint = iter.level()?.count_hint;
    if hint != u32::MAX {
        iter.put_rb(hint)?;
    }
    open_std_count(iter)
}

/// Shared body of the `*_set_defs_complete` calls.
pub(crate) fn set_defs_complete(
    iter: &mut EncodeIterator,
    container: u8,
    success: bool,
) -> CodecResult<()> {
    iter.expect_level(container)?;
    let lvl = iter.level()?;
    if lvl.state != EncState::WantSetDefs {
        return Err(CodecError::InvalidArgument("set defs are not open"));
    }
    let res = lvl.blob_res;
    if !success {
        iter.cur = res.data_start();
        iter.dead = false;
        return Ok(());
    }
    iter.alive()?;
    iter.patch(res)?;
    let pending = {
        let lvl = iter.level_mut()?;
        lvl.blob_res = Reserved::NONE;
        lvl.state = EncState::None;
        lvl.pending_summary
    };
    let summary_flagged = iter.level()?.flags & SUMMARY_FLAG_BIT != 0;
    begin_summary(iter, summary_flagged, pending)
}

/// Shared body of the `*_summary_data_complete` calls.
pub(crate) fn summary_data_complete(
    iter: &mut EncodeIterator,
    container: u8,
    success: bool,
) -> CodecResult<()> {
    iter.expect_level(container)?;
    let lvl = iter.level()?;
    if lvl.state != EncState::WantSummary {
        return Err(CodecError::InvalidArgument("summary data is not open"));
    }
    let res = lvl.blob_res;
    if !success {
        iter.cur = res.data_start();
        iter.dead = false;
        return Ok(());
    }
    iter.alive()?;
    iter.patch(res)?;
    iter.level_mut()?.blob_res = Reserved::NONE;
    enter_entries(iter)
}

/// The Map/Vector/Series init paths normalize their flag words so this
/// single bit answers "was summary data declared".
pub(crate) const SUMMARY_FLAG_BIT: u16 = 0x02;

// ============================================================
// Entry open/close for the nested (init..complete) form
// ============================================================

/// Begin a nested entry: record the rollback point and reserve its
/// length prefix. The per-container entry header must already have been
/// written.
pub(crate) fn open_entry(iter: &mut EncodeIterator, entry_start: usize) -> CodecResult<()> {
    let prev = iter.level()?.state;
    let res = iter.reserve(remaining_hint(iter))?;
    let lvl = iter.level_mut()?;
    lvl.entry_res = res;
    lvl.entry_start = entry_start;
    lvl.entry_prev = prev;
    lvl.state = EncState::EntryOpen;
    Ok(())
}

/// Close a nested entry; returns true when the entry survived and the
/// caller should count it. The level returns to the state it was in
/// before the entry opened (set or standard section).
pub(crate) fn close_entry(iter: &mut EncodeIterator, success: bool) -> CodecResult<bool> {
    let lvl = iter.level()?;
    if lvl.state != EncState::EntryOpen {
        return Err(CodecError::InvalidArgument("no entry is open"));
    }
    let res = lvl.entry_res;
    let start = lvl.entry_start;
    let prev = lvl.entry_prev;
    if !success {
        iter.cur = start;
        iter.dead = false;
        let lvl = iter.level_mut()?;
        lvl.entry_res = Reserved::NONE;
        lvl.state = prev;
        return Ok(false);
    }
    iter.alive()?;
    iter.patch(res)?;
    let lvl = iter.level_mut()?;
    lvl.entry_res = Reserved::NONE;
    lvl.state = prev;
    Ok(true)
}

/// Patch the standard-entry count and pop the frame. Rolls everything
/// back when success is false.
pub(crate) fn finish_container(
    iter: &mut EncodeIterator,
    container: u8,
    success: bool,
) -> CodecResult<()> {
    iter.expect_level(container)?;
    if !success {
        iter.pop_level(false)?;
        return Ok(());
    }
    iter.alive()?;
    let lvl = iter.level()?;
    if lvl.state == EncState::EntryOpen {
        return Err(CodecError::InvalidArgument("entry still open at complete"));
    }
    if lvl.state == EncState::SetEntries && lvl.set_next < lvl.set_count {
        return Err(CodecError::InvalidArgument("set data incomplete at complete"));
    }
    if lvl.state == EncState::WantSetDefs || lvl.state == EncState::WantSummary {
        return Err(CodecError::InvalidArgument("section still open at complete"));
    }
    let (count_pos, count) = (lvl.count_pos, lvl.count);
    if count_pos != NO_POS {
        if container == DataType::FilterList as u8 {
            iter.buf[count_pos] = count as u8;
        } else {
            iter.buf[count_pos..count_pos + 2].copy_from_slice(&count.to_be_bytes());
        }
    }
    iter.pop_level(true)?;
    Ok(())
}

// ============================================================
// Decode-side helpers
// ============================================================

/// Read an rb-prefixed blob, returning its range and leaving the cursor
/// after it.
pub(crate) fn dec_blob(iter: &mut DecodeIterator) -> CodecResult<(usize, usize)> {
    let len = iter.get_rb()? as usize;
    let start = iter.cur;
    let end = start + len;
    if end > iter.buf.len() {
        return Err(CodecError::IncompleteData);
    }
    iter.cur = end;
    Ok((start, end))
}
