// vector.rs — vector container codec
//
// Entries are addressed by an unsigned index. The sort flag advertises
// that indexes arrive ordered; the codec itself does not reorder.

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
    pub struct VectorFlags: u8 {
        const HAS_SET_DEFS            = 0x01;
        const HAS_SUMMARY_DATA        = 0x02;
        const HAS_PER_ENTRY_PERM_DATA = 0x04;
        const HAS_TOTAL_COUNT_HINT    = 0x08;
        const SUPPORTS_SORTING        = 0x10;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Vector<'a> {
    pub flags: VectorFlags,
    pub container_type: DataType,
    pub total_count_hint: u32,
    pub enc_set_defs: Option<&'a [u8]>,
    pub enc_summary: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VectorEntryAction {
    Update = 1,
    Set = 2,
    Clear = 3,
    Insert = 4,
    Delete = 5,
}

impl VectorEntryAction {
    fn from_u8(v: u8) -> CodecResult<VectorEntryAction> {
        Ok(match v {
            1 => VectorEntryAction::Update,
            2 => VectorEntryAction::Set,
            3 => VectorEntryAction::Clear,
            4 => VectorEntryAction::Insert,
            5 => VectorEntryAction::Delete,
            _ => return Err(CodecError::InvalidData("bad vector entry action")),
        })
    }

    /// Clear and Delete entries carry no payload.
    pub fn has_payload(self) -> bool {
        !matches!(self, VectorEntryAction::Clear | VectorEntryAction::Delete)
    }
}

const ENTRY_HAS_PERM: u8 = 0x10;

#[derive(Debug, Clone, Copy)]
pub struct VectorEntry<'a> {
    pub action: VectorEntryAction,
    pub index: u32,
    pub perm_data: Option<&'a [u8]>,
    pub enc_data: &'a [u8],
}

// ============================================================
// Encode
// ============================================================

pub fn encode_vector_init<'a>(iter: &mut EncodeIterator<'a>, vector: &Vector<'a>) -> CodecResult<()> {
    iter.alive()?;
    iter.push_level(DataType::Vector as u8)?;
    {
        let lvl = iter.level_mut()?;
        lvl.flags = u16::from(vector.flags.bits());
        lvl.child_type = vector.container_type as u8;
        lvl.count_hint = if vector.flags.contains(VectorFlags::HAS_TOTAL_COUNT_HINT) {
            vector.total_count_hint
        } else {
            u32::MAX
        };
    }
    iter.put_u8(vector.flags.bits())?;
    iter.put_u8(vector.container_type as u8)?;
    begin_sections(
        iter,
        vector.flags.contains(VectorFlags::HAS_SET_DEFS),
        vector.enc_set_defs,
        vector.flags.contains(VectorFlags::HAS_SUMMARY_DATA),
        vector.enc_summary,
    )
}

pub fn encode_vector_set_defs_complete(
    iter: &mut EncodeIterator,
    success: bool,
) -> CodecResult<()> {
    set_defs_complete(iter, DataType::Vector as u8, success)
}

pub fn encode_vector_summary_data_complete(
    iter: &mut EncodeIterator,
    success: bool,
) -> CodecResult<()> {
    summary_data_complete(iter, DataType::Vector as u8, success)
}

fn put_entry_header(
    iter: &mut EncodeIterator,
    action: VectorEntryAction,
    index: u32,
    perm_data: Option<&[u8]>,
) -> CodecResult<()> {
    let lvl = iter.level()?;
    if lvl.state != EncState::Entries {
        return Err(CodecError::InvalidArgument("vector is not accepting entries"));
    }
    if perm_data.is_some()
        && lvl.flags & u16::from(VectorFlags::HAS_PER_ENTRY_PERM_DATA.bits()) == 0
    {
        return Err(CodecError::InvalidArgument("perm data not declared on vector"));
    }
    let mut b0 = action as u8;
    if perm_data.is_some() {
        b0 |= ENTRY_HAS_PERM;
    }
    iter.put_u8(b0)?;
    if let Some(p) = perm_data {
        iter.put_rb_slice(p)?;
    }
    iter.put_rb(index)
}

pub fn encode_vector_entry(
    iter: &mut EncodeIterator,
    action: VectorEntryAction,
    index: u32,
    perm_data: Option<&[u8]>,
    payload: Option<&[u8]>,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::Vector as u8)?;
    let start = iter.cur;
    let r = (|| {
        let no_payload =
            !action.has_payload() || iter.level()?.child_type == DataType::NoData as u8;
        if no_payload && payload.is_some() {
            return Err(CodecError::InvalidArgument("entry carries no payload"));
        }
        put_entry_header(iter, action, index, perm_data)?;
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

pub fn encode_vector_entry_init(
    iter: &mut EncodeIterator,
    action: VectorEntryAction,
    index: u32,
    perm_data: Option<&[u8]>,
) -> CodecResult<()> {
    iter.alive()?;
    iter.expect_level(DataType::Vector as u8)?;
    if !action.has_payload() {
        return Err(CodecError::InvalidArgument("entry carries no payload"));
    }
    let start = iter.cur;
    let r = put_entry_header(iter, action, index, perm_data);
    if r.is_err() {
        iter.cur = start;
        iter.dead = false;
        return r;
    }
    open_entry(iter, start)
}

pub fn encode_vector_entry_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::Vector as u8)?;
    if close_entry(iter, success)? {
        iter.level_mut()?.count += 1;
    }
    Ok(())
}

pub fn encode_vector_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    finish_container(iter, DataType::Vector as u8, success)
}

// ============================================================
// Decode
// ============================================================

pub fn decode_vector<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Vector<'a>> {
    let end = iter.value_end();
    let mut vector = Vector {
        flags: VectorFlags::from_bits_truncate(iter.get_u8()?),
        container_type: DataType::from_u8(iter.get_u8()?)?,
        ..Vector::default()
    };
    let mut set_defs = (NO_POS, NO_POS);
    if vector.flags.contains(VectorFlags::HAS_SET_DEFS) {
        set_defs = dec_blob(iter)?;
        let buf = iter.buf;
        vector.enc_set_defs = Some(&buf[set_defs.0..set_defs.1]);
    }
    let mut summary = (0usize, 0usize);
    if vector.flags.contains(VectorFlags::HAS_SUMMARY_DATA) {
        summary = dec_blob(iter)?;
        let buf = iter.buf;
        vector.enc_summary = Some(&buf[summary.0..summary.1]);
    }
    if vector.flags.contains(VectorFlags::HAS_TOTAL_COUNT_HINT) {
        vector.total_count_hint = iter.get_rb()?;
    }
    let count = iter.get_u16()?;
    let next = iter.cur;
    if next > end {
        return Err(CodecError::IncompleteData);
    }
    let lvl = iter.push_level(DataType::Vector as u8, end)?;
    lvl.flags = u16::from(vector.flags.bits());
    lvl.child_type = vector.container_type as u8;
    lvl.count = count;
    lvl.next_entry = next;
    lvl.phase = DecPhase::StdItems;
    lvl.set_defs_pos = set_defs.0;
    lvl.set_defs_end = set_defs.1;
    if vector.enc_summary.is_some() {
        lvl.entry_end = summary.1;
        iter.cur = summary.0;
    }
    Ok(vector)
}

pub fn decode_vector_entry<'a>(
    iter: &mut DecodeIterator<'a>,
) -> CodecResult<Option<VectorEntry<'a>>> {
    let lvl = *iter.level()?;
    if lvl.container != DataType::Vector as u8 {
        return Err(CodecError::InvalidArgument("no vector open"));
    }
    if lvl.read >= lvl.count {
        iter.pop_container();
        return Ok(None);
    }
    iter.cur = lvl.next_entry;
    let b0 = iter.get_u8()?;
    let action = VectorEntryAction::from_u8(b0 & 0x0F)?;
    let perm_data = if b0 & ENTRY_HAS_PERM != 0 {
        Some(iter.get_rb_slice()?)
    } else {
        None
    };
    let index = iter.get_rb()?;
    let enc_data = if !action.has_payload() || lvl.child_type == DataType::NoData as u8 {
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
    Ok(Some(VectorEntry { action, index, perm_data, enc_data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element_list::{
        decode_element_entry, decode_element_list, encode_element_entry,
        encode_element_list_complete, encode_element_list_init, ElementList, ElementListFlags,
    };
    use crate::primitive::decode_uint;
    use crate::types::PrimitiveValue;

    #[test]
    fn test_vector_round_trip_with_summary() {
        let mut buf = vec![0u8; 512];
        let mut enc = EncodeIterator::new(&mut buf);
        let vector = Vector {
            flags: VectorFlags::HAS_SUMMARY_DATA | VectorFlags::SUPPORTS_SORTING,
            container_type: DataType::ElementList,
            ..Vector::default()
        };
        encode_vector_init(&mut enc, &vector).unwrap();
        // summary encoded in place
        let list = ElementList { flags: ElementListFlags::HAS_STANDARD_DATA, ..ElementList::default() };
        encode_element_list_init(&mut enc, &list, None).unwrap();
        encode_element_entry(
            &mut enc,
            b"Rows",
            DataType::UInt,
            &EntryData::Value(PrimitiveValue::UInt(2)),
        )
        .unwrap();
        encode_element_list_complete(&mut enc, true).unwrap();
        encode_vector_summary_data_complete(&mut enc, true).unwrap();

        for idx in [0u32, 1] {
            encode_vector_entry_init(&mut enc, VectorEntryAction::Set, idx, None).unwrap();
            encode_element_list_init(&mut enc, &list, None).unwrap();
            encode_element_entry(
                &mut enc,
                b"Row",
                DataType::UInt,
                &EntryData::Value(PrimitiveValue::UInt(u64::from(idx) + 10)),
            )
            .unwrap();
            encode_element_list_complete(&mut enc, true).unwrap();
            encode_vector_entry_complete(&mut enc, true).unwrap();
        }
        encode_vector_entry(&mut enc, VectorEntryAction::Clear, 7, None, None).unwrap();
        encode_vector_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        let got = decode_vector(&mut dec).unwrap();
        assert!(got.flags.contains(VectorFlags::SUPPORTS_SORTING));
        // summary decodes in place
        decode_element_list(&mut dec, None).unwrap();
        let e = decode_element_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.name, b"Rows");
        assert_eq!(decode_uint(&mut dec).unwrap(), Some(2));
        assert!(decode_element_entry(&mut dec).unwrap().is_none());

        let mut indexes = Vec::new();
        loop {
            let Some(entry) = decode_vector_entry(&mut dec).unwrap() else { break };
            indexes.push((entry.index, entry.action));
            if entry.action.has_payload() {
                decode_element_list(&mut dec, None).unwrap();
                let e = decode_element_entry(&mut dec).unwrap().unwrap();
                assert_eq!(e.name, b"Row");
                assert_eq!(decode_uint(&mut dec).unwrap(), Some(u64::from(entry.index) + 10));
                assert!(decode_element_entry(&mut dec).unwrap().is_none());
            }
        }
        assert_eq!(
            indexes,
            vec![
                (0, VectorEntryAction::Set),
                (1, VectorEntryAction::Set),
                (7, VectorEntryAction::Clear)
            ]
        );
    }
}
