// series.rs — series container codec
//
// Rows are implicitly indexed by arrival order and carry nothing but
// their payload. Set definitions declared here typically drive the
// set-encoded lists inside each row.

use bitflags::bitflags;

use crate::container::{
    begin_sections, close_entry, dec_blob, finish_container, open_entry, put_entry_data,
    set_defs_complete, summary_data_complete, EntryData,
};
use crate::error::{CodecError, CodecResult};
use crate::iter::{DecPhase, DecodeIterator, EncState, EncodeIterator, NO_POS};
use crate::types::DataType;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SeriesFlags: u8 {
        const HAS_SET_DEFS         = 0x01;
        const HAS_SUMMARY_DATA     = 0x02;
        const HAS_TOTAL_COUNT_HINT = 0x04;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Series<'a> {
    pub flags: SeriesFlags,
    pub container_type: DataType,
    pub total_count_hint: u32,
    pub enc_set_defs: Option<&'a [u8]>,
    pub enc_summary: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesEntry<'a> {
    pub enc_data: &'a [u8],
}

// ============================================================
// Encode
// ============================================================

pub fn encode_series_init<'a>(iter: &mut EncodeIterator<'a>, series: &Series<'a>) -> CodecResult<()> {
    iter.alive()?;
    iter.push_level(DataType::Series as u8)?;
    {
        let lvl = iter.level_mut()?;
        lvl.flags = u16::from(series.flags.bits());
        lvl.child_type = series.container_type as u8;
        lvl.count_hint = if series.flags.contains(SeriesFlags::HAS_TOTAL_COUNT_HINT) {
            series.total_count_hint
        } else {
            u32::MAX
        };
    }
    iter.put_u8(series.flags.bits())?;
    iter.put_u8(series.container_type as u8)?;
    begin_sections(
        iter,
        series.flags.contains(SeriesFlags::HAS_SET_DEFS),
        series.enc_set_defs,
        series.flags.contains(SeriesFlags::HAS_SUMMARY_DATA),
        series.enc_summary,
    )
}

pub fn encode_series_set_defs_complete(
    iter: &mut EncodeIterator,
    success: bool,
) -> CodecResult<()> {
    set_defs_complete(iter, DataType::Series as u8, success)
}

pub fn encode_series_summary_data_complete(
    iter: &mut EncodeIterator,
    success: bool,
) -> CodecResult<()> {
    summary_data_complete(iter, DataType::Series as u8, success)
}

pub fn encode_series_entry(iter: &mut EncodeIterator, payload: &[u8]) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::Series as u8)?;
    let start = iter.cur;
    let r = (|| {
        if iter.level()?.state != EncState::Entries {
            return Err(CodecError::InvalidArgument("series is not accepting entries"));
        }
        put_entry_data(iter, &EntryData::PreEncoded(payload))?;
        iter.level_mut()?.count += 1;
        Ok(())
    })();
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
    }
    r
}

pub fn encode_series_entry_init(iter: &mut EncodeIterator) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::Series as u8)?;
    if iter.level()?.state != EncState::Entries {
        return Err(CodecError::InvalidArgument("series is not accepting entries"));
    }
    let start = iter.cur;
    open_entry(iter, start)
}

pub fn encode_series_entry_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::Series as u8)?;
    if close_entry(iter, success)? {
        iter.level_mut()?.count += 1;
    }
    Ok(())
}

pub fn encode_series_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    finish_container(iter, DataType::Series as u8, success)
}

// ============================================================
// Decode
// ============================================================

pub fn decode_series<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Series<'a>> {
    let end = iter.value_end();
    let mut series = Series {
        flags: SeriesFlags::from_bits_truncate(iter.get_u8()?),
        container_type: DataType::from_u8(iter.get_u8()?)?,
        ..Series::default()
    };
    let mut set_defs = (NO_POS, NO_POS);
    if series.flags.contains(SeriesFlags::HAS_SET_DEFS) {
        set_defs = dec_blob(iter)?;
        let buf = iter.buf;
        series.enc_set_defs = Some(&buf[set_defs.0..set_defs.1]);
    }
    let mut summary = (0usize, 0usize);
    if series.flags.contains(SeriesFlags::HAS_SUMMARY_DATA) {
        summary = dec_blob(iter)?;
        let buf = iter.buf;
        series.enc_summary = Some(&buf[summary.0..summary.1]);
    }
    if series.flags.contains(SeriesFlags::HAS_TOTAL_COUNT_HINT) {
        series.total_count_hint = iter.get_rb()?;
    }
    let count = iter.get_u16()?;
    let next = iter.cur;
    if next > end {
        return Err(CodecError::IncompleteData);
    }
    let lvl = iter.push_level(DataType::Series as u8, end)?;
    lvl.flags = u16::from(series.flags.bits());
    lvl.child_type = series.container_type as u8;
    lvl.count = count;
    lvl.next_entry = next;
    lvl.phase = DecPhase::StdItems;
    lvl.set_defs_pos = set_defs.0;
    lvl.set_defs_end = set_defs.1;
    if series.enc_summary.is_some() {
        lvl.entry_end = summary.1;
        iter.cur = summary.0;
    }
    Ok(series)
}

pub fn decode_series_entry<'a>(
    iter: &mut DecodeIterator<'a>,
) -> CodecResult<Option<SeriesEntry<'a>>> {
    let lvl = *iter.level()?;
    if lvl.container != DataType::Series as u8 {
        return Err(CodecError::InvalidArgument("no series open"));
    }
    if lvl.read >= lvl.count {
        iter.pop_container();
        return Ok(None);
    }
    iter.cur = lvl.next_entry;
    let enc_data = iter.get_rb_slice()?;
    let data_end = iter.cur;
    if data_end > lvl.list_end {
        return Err(CodecError::IncompleteData);
    }
    let m = iter.level_mut()?;
    m.read += 1;
    m.next_entry = data_end;
    m.entry_end = data_end;
    iter.cur = data_end - enc_data.len();
    Ok(Some(SeriesEntry { enc_data }))
}
