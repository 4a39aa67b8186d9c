// set_def.rs — local set-definition databases
//
// A set definition lets container entries omit their keys and types and
// carry only values in declared order. Local databases travel inline
// with a Map/Vector/Series header; ids above MAX_LOCAL_SET_ID can only
// be exchanged through the dictionary payload (set_dictionary.rs).

use crate::error::{CodecError, CodecResult};
use crate::iter::{DecodeIterator, EncState, EncodeIterator, NO_POS};
use crate::types::DataType;

/// Largest set id that may appear in an inline local database.
pub const MAX_LOCAL_SET_ID: u16 = 15;

// ============================================================
// Field set definitions
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSetDefEntry {
    pub field_id: i16,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSetDef {
    pub set_id: u16,
    pub entries: Vec<FieldSetDefEntry>,
}

/// Lookup table from set id to field definition. Kept small and dense;
/// inline encoding is limited to ids 0..=15 but the table itself also
/// serves as encode-side storage for dictionary-exchanged definitions.
#[derive(Debug, Clone, Default)]
pub struct LocalFieldSetDefDb {
    pub defs: Vec<FieldSetDef>,
}

impl LocalFieldSetDefDb {
    pub fn new() -> LocalFieldSetDefDb {
        LocalFieldSetDefDb { defs: Vec::new() }
    }

    pub fn add(&mut self, def: FieldSetDef) -> CodecResult<()> {
        if self.find(def.set_id).is_some() {
            return Err(CodecError::DuplicateSetDefId(def.set_id));
        }
        self.defs.push(def);
        Ok(())
    }

    pub fn find(&self, set_id: u16) -> Option<&FieldSetDef> {
        self.defs.iter().find(|d| d.set_id == set_id)
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

// ============================================================
// Element set definitions
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSetDefEntry<'a> {
    pub name: &'a [u8],
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSetDef<'a> {
    pub set_id: u16,
    pub entries: Vec<ElementSetDefEntry<'a>>,
}

/// Element flavor of the local database; names borrow from the wire
/// buffer (decode) or the caller's data (encode).
#[derive(Debug, Clone, Default)]
pub struct LocalElementSetDefDb<'a> {
    pub defs: Vec<ElementSetDef<'a>>,
}

impl<'a> LocalElementSetDefDb<'a> {
    pub fn new() -> LocalElementSetDefDb<'a> {
        LocalElementSetDefDb { defs: Vec::new() }
    }

    pub fn add(&mut self, def: ElementSetDef<'a>) -> CodecResult<()> {
        if self.find(def.set_id).is_some() {
            return Err(CodecError::DuplicateSetDefId(def.set_id));
        }
        self.defs.push(def);
        Ok(())
    }

    pub fn find(&self, set_id: u16) -> Option<&ElementSetDef<'a>> {
        self.defs.iter().find(|d| d.set_id == set_id)
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

// ============================================================
// Inline wire form
// ============================================================
//
// count u8, then per definition: set_id rb15, entry_count u8, entries.
// Field entries are `field_id i16be, type u8`; element entries are
// rb15 name then `type u8`.

fn check_set_defs_open(iter: &EncodeIterator) -> CodecResult<()> {
    let lvl = iter.level()?;
    if lvl.state != EncState::WantSetDefs {
        return Err(CodecError::InvalidArgument("container is not expecting set defs"));
    }
    Ok(())
}

/// Encode a local field database inline. The enclosing Map/Vector/Series
/// init must have declared HAS_SET_DEFS; finish with that container's
/// `*_set_defs_complete`.
pub fn encode_local_field_set_defs(
    iter: &mut EncodeIterator,
    db: &LocalFieldSetDefDb,
) -> CodecResult<()> {
    iter.alive()?;
    check_set_defs_open(iter)?;
    if db.defs.len() > (MAX_LOCAL_SET_ID as usize + 1) {
        return iter.fail(CodecError::InvalidArgument("too many local set defs"));
    }
    iter.put_u8(db.defs.len() as u8)?;
    for def in &db.defs {
        if def.set_id > MAX_LOCAL_SET_ID {
            return iter.fail(CodecError::InvalidArgument("local set id above 15"));
        }
        if def.entries.len() > 255 {
            return iter.fail(CodecError::InvalidArgument("set definition too large"));
        }
        iter.put_rb(u32::from(def.set_id))?;
        iter.put_u8(def.entries.len() as u8)?;
        for e in &def.entries {
            iter.put_i16(e.field_id)?;
            iter.put_u8(e.data_type as u8)?;
        }
    }
    Ok(())
}

/// Element flavor of `encode_local_field_set_defs`.
pub fn encode_local_element_set_defs(
    iter: &mut EncodeIterator,
    db: &LocalElementSetDefDb,
) -> CodecResult<()> {
    iter.alive()?;
    check_set_defs_open(iter)?;
    if db.defs.len() > (MAX_LOCAL_SET_ID as usize + 1) {
        return iter.fail(CodecError::InvalidArgument("too many local set defs"));
    }
    iter.put_u8(db.defs.len() as u8)?;
    for def in &db.defs {
        if def.set_id > MAX_LOCAL_SET_ID {
            return iter.fail(CodecError::InvalidArgument("local set id above 15"));
        }
        if def.entries.len() > 255 {
            return iter.fail(CodecError::InvalidArgument("set definition too large"));
        }
        iter.put_rb(u32::from(def.set_id))?;
        iter.put_u8(def.entries.len() as u8)?;
        for e in &def.entries {
            if e.name.len() > 0x3FFF {
                return iter.fail(CodecError::InvalidArgument("set entry name too long"));
            }
            iter.put_rb_slice(e.name)?;
            iter.put_u8(e.data_type as u8)?;
        }
    }
    Ok(())
}

fn set_defs_range(iter: &DecodeIterator) -> CodecResult<(usize, usize)> {
    let lvl = iter.level()?;
    if lvl.set_defs_pos == NO_POS {
        return Err(CodecError::InvalidArgument("container carries no set defs"));
    }
    Ok((lvl.set_defs_pos, lvl.set_defs_end))
}

fn parse_field_defs(buf: &[u8], pos: usize, end: usize) -> CodecResult<LocalFieldSetDefDb> {
    let mut db = LocalFieldSetDefDb::new();
    let mut cur = pos;
    if cur >= end {
        return Err(CodecError::IncompleteData);
    }
    let count = buf[cur];
    cur += 1;
    for _ in 0..count {
        let (set_id, n) = crate::iter::rb_get(&buf[..end], cur)?;
        cur += n;
        if cur >= end {
            return Err(CodecError::IncompleteData);
        }
        let entry_count = buf[cur] as usize;
        cur += 1;
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            if cur + 3 > end {
                return Err(CodecError::IncompleteData);
            }
            let field_id = i16::from_be_bytes([buf[cur], buf[cur + 1]]);
            let data_type = DataType::from_u8(buf[cur + 2])?;
            cur += 3;
            entries.push(FieldSetDefEntry { field_id, data_type });
        }
        db.add(FieldSetDef { set_id: set_id as u16, entries })?;
    }
    Ok(db)
}

fn parse_element_defs<'a>(
    buf: &'a [u8],
    pos: usize,
    end: usize,
) -> CodecResult<LocalElementSetDefDb<'a>> {
    let mut db = LocalElementSetDefDb::new();
    let mut cur = pos;
    if cur >= end {
        return Err(CodecError::IncompleteData);
    }
    let count = buf[cur];
    cur += 1;
    for _ in 0..count {
        let (set_id, n) = crate::iter::rb_get(&buf[..end], cur)?;
        cur += n;
        if cur >= end {
            return Err(CodecError::IncompleteData);
        }
        let entry_count = buf[cur] as usize;
        cur += 1;
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let (name_len, n) = crate::iter::rb_get(&buf[..end], cur)?;
            cur += n;
            let name_end = cur + name_len as usize;
            if name_end + 1 > end {
                return Err(CodecError::IncompleteData);
            }
            let name = &buf[cur..name_end];
            let data_type = DataType::from_u8(buf[name_end])?;
            cur = name_end + 1;
            entries.push(ElementSetDefEntry { name, data_type });
        }
        db.add(ElementSetDef { set_id: set_id as u16, entries })?;
    }
    Ok(db)
}

/// Decode the inline database of the innermost container into
/// caller-supplied storage (the thread-safe path).
pub fn decode_local_field_set_defs(
    iter: &mut DecodeIterator,
    db: &mut LocalFieldSetDefDb,
) -> CodecResult<()> {
    let (pos, end) = set_defs_range(iter)?;
    *db = parse_field_defs(iter.buf, pos, end)?;
    Ok(())
}

/// Decode the inline database into the iterator's scratch slot, for
/// single-threaded decode without caller storage. Nested containers
/// with set data pick it up automatically.
pub fn decode_local_field_set_defs_scratch(iter: &mut DecodeIterator) -> CodecResult<()> {
    let (pos, end) = set_defs_range(iter)?;
    iter.scratch_field = parse_field_defs(iter.buf, pos, end)?;
    Ok(())
}

pub fn decode_local_element_set_defs<'a>(
    iter: &mut DecodeIterator<'a>,
    db: &mut LocalElementSetDefDb<'a>,
) -> CodecResult<()> {
    let (pos, end) = set_defs_range(iter)?;
    *db = parse_element_defs(iter.buf, pos, end)?;
    Ok(())
}

pub fn decode_local_element_set_defs_scratch<'a>(
    iter: &mut DecodeIterator<'a>,
) -> CodecResult<()> {
    let (pos, end) = set_defs_range(iter)?;
    iter.scratch_elem = parse_element_defs(iter.buf, pos, end)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_db_rejects_duplicates() {
        let mut db = LocalFieldSetDefDb::new();
        db.add(FieldSetDef {
            set_id: 3,
            entries: vec![FieldSetDefEntry { field_id: 22, data_type: DataType::Real }],
        })
        .unwrap();
        let err = db
            .add(FieldSetDef { set_id: 3, entries: vec![] })
            .unwrap_err();
        assert_eq!(err, CodecError::DuplicateSetDefId(3));
        assert!(db.find(3).is_some());
        assert!(db.find(4).is_none());
    }

    #[test]
    fn test_parse_field_defs_round_trip_bytes() {
        // one def: set id 1, two entries (fid 22 REAL, fid 25 REAL)
        let wire = [
            1u8, // def count
            1,   // set id
            2,   // entry count
            0, 22, 8, // fid 22, REAL
            0, 25, 8, // fid 25, REAL
        ];
        let db = parse_field_defs(&wire, 0, wire.len()).unwrap();
        let def = db.find(1).unwrap();
        assert_eq!(def.entries.len(), 2);
        assert_eq!(def.entries[0].field_id, 22);
        assert_eq!(def.entries[1].data_type, DataType::Real);
    }

    #[test]
    fn test_parse_element_defs_borrows_names() {
        let wire = [
            1u8, // def count
            0,   // set id
            1,   // entry count
            3, b'B', b'I', b'D', // rb15 name "BID"
            8, // REAL
        ];
        let db = parse_element_defs(&wire, 0, wire.len()).unwrap();
        let def = db.find(0).unwrap();
        assert_eq!(def.entries[0].name, b"BID");
        assert_eq!(def.entries[0].data_type, DataType::Real);
    }

    #[test]
    fn test_parse_truncated_defs() {
        let wire = [1u8, 0, 2, 0, 22];
        assert!(parse_field_defs(&wire, 0, wire.len()).is_err());
    }
}
