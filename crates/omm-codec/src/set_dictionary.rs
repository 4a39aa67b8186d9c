// set_dictionary.rs — global set-definition databases and the
// dictionary payload codec
//
// Globally exchanged definitions travel as a Vector of ElementList:
// the summary names the dictionary (Type/Version/DictionaryId) and each
// entry, indexed by set id, is itself set-encoded with a bootstrap
// element definition (set id 0) as {NUMENTRIES, FIDS|NAMES, TYPES}.
// Large databases split across parts; the encoder resumes from a caller
// cursor and the decoder accumulates until the final part.

use crate::array::{
    decode_array, decode_array_entry, encode_array_complete, encode_array_entry,
    encode_array_init, Array,
};
use crate::container::EntryData;
use crate::element_list::{
    decode_element_entry, decode_element_list, encode_element_entry,
    encode_element_entry_complete, encode_element_entry_init, encode_element_list_complete,
    encode_element_list_init, ElementList, ElementListFlags,
};
use crate::error::{CodecError, CodecResult, DictionaryPart};
use crate::iter::{DecodeIterator, EncodeIterator};
use crate::primitive::{decode_buffer, decode_int, decode_uint};
use crate::set_def::{
    decode_local_element_set_defs_scratch, encode_local_element_set_defs, ElementSetDef,
    ElementSetDefEntry, FieldSetDef, FieldSetDefEntry, LocalElementSetDefDb,
};
use crate::types::{DataType, PrimitiveValue};
use crate::vector::{
    decode_vector, decode_vector_entry, encode_vector_complete, encode_vector_entry_complete,
    encode_vector_entry_init, encode_vector_init, encode_vector_set_defs_complete,
    encode_vector_summary_data_complete, Vector, VectorEntryAction, VectorFlags,
};
use std::sync::OnceLock;

/// Largest set id a global database accepts.
pub const MAX_GLOBAL_SET_ID: u16 = 65535;

/// Dictionary type discriminants carried in the summary `Type` element.
pub const DICTIONARY_TYPE_FIELD_SET_DEF: u64 = 1;
pub const DICTIONARY_TYPE_ELEMENT_SET_DEF: u64 = 2;

const ENAME_TYPE: &[u8] = b"Type";
const ENAME_VERSION: &[u8] = b"Version";
const ENAME_DICTIONARY_ID: &[u8] = b"DictionaryId";
const ENAME_NUMENTRIES: &[u8] = b"NUMENTRIES";
const ENAME_FIDS: &[u8] = b"FIDS";
const ENAME_NAMES: &[u8] = b"NAMES";
const ENAME_TYPES: &[u8] = b"TYPES";

/// How much of the dictionary a part carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryVerbosity {
    /// Summary data only.
    Info,
    /// Summary plus every definition.
    Normal,
}

// ============================================================
// Field flavor
// ============================================================

/// Dictionary-exchanged field set definitions: a dense id table over an
/// arena of definitions, sized for the full global id space.
#[derive(Debug, Clone)]
pub struct FieldSetDefDb {
    version: Vec<u8>,
    dictionary_id: u64,
    table: Vec<u32>,
    arena: Vec<FieldSetDef>,
    max_set_id: Option<u16>,
}

const EMPTY_SLOT: u32 = u32::MAX;

impl FieldSetDefDb {
    /// Reserve the dense `set id -> definition` table and record the
    /// version buffer.
    pub fn new(version: &[u8]) -> FieldSetDefDb {
        FieldSetDefDb {
            version: version.to_vec(),
            dictionary_id: 0,
            table: vec![EMPTY_SLOT; usize::from(MAX_GLOBAL_SET_ID) + 1],
            arena: Vec::new(),
            max_set_id: None,
        }
    }

    pub fn version(&self) -> &[u8] {
        &self.version
    }

    pub fn dictionary_id(&self) -> u64 {
        self.dictionary_id
    }

    pub fn set_dictionary_id(&mut self, id: u64) {
        self.dictionary_id = id;
    }

    pub fn max_set_id(&self) -> Option<u16> {
        self.max_set_id
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Deep-copy `def` into its slot; one definition per set id.
    pub fn add(&mut self, def: FieldSetDef) -> CodecResult<()> {
        let slot = usize::from(def.set_id);
        if self.table[slot] != EMPTY_SLOT {
            return Err(CodecError::DuplicateSetDefId(def.set_id));
        }
        self.table[slot] = self.arena.len() as u32;
        self.max_set_id = Some(self.max_set_id.map_or(def.set_id, |m| m.max(def.set_id)));
        self.arena.push(def);
        Ok(())
    }

    pub fn find(&self, set_id: u16) -> Option<(usize, &FieldSetDef)> {
        let idx = self.table[usize::from(set_id)];
        if idx == EMPTY_SLOT {
            None
        } else {
            Some((idx as usize, &self.arena[idx as usize]))
        }
    }

    pub(crate) fn def_at(&self, index: usize) -> &FieldSetDef {
        &self.arena[index]
    }

    /// Smallest defined set id at or above `from`.
    fn next_defined(&self, from: u32) -> Option<u16> {
        let max = u32::from(self.max_set_id?);
        (from..=max).find(|&id| self.table[id as usize] != EMPTY_SLOT).map(|id| id as u16)
    }
}

// ============================================================
// Element flavor
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSetDefOwnedEntry {
    pub name: Vec<u8>,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSetDefOwned {
    pub set_id: u16,
    pub entries: Vec<ElementSetDefOwnedEntry>,
}

/// Dictionary-exchanged element set definitions; names are owned by the
/// database.
#[derive(Debug, Clone)]
pub struct ElementSetDefDb {
    version: Vec<u8>,
    dictionary_id: u64,
    table: Vec<u32>,
    arena: Vec<ElementSetDefOwned>,
    max_set_id: Option<u16>,
}

impl ElementSetDefDb {
    pub fn new(version: &[u8]) -> ElementSetDefDb {
        ElementSetDefDb {
            version: version.to_vec(),
            dictionary_id: 0,
            table: vec![EMPTY_SLOT; usize::from(MAX_GLOBAL_SET_ID) + 1],
            arena: Vec::new(),
            max_set_id: None,
        }
    }

    pub fn version(&self) -> &[u8] {
        &self.version
    }

    pub fn dictionary_id(&self) -> u64 {
        self.dictionary_id
    }

    pub fn set_dictionary_id(&mut self, id: u64) {
        self.dictionary_id = id;
    }

    pub fn max_set_id(&self) -> Option<u16> {
        self.max_set_id
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn add(&mut self, def: ElementSetDefOwned) -> CodecResult<()> {
        let slot = usize::from(def.set_id);
        if self.table[slot] != EMPTY_SLOT {
            return Err(CodecError::DuplicateSetDefId(def.set_id));
        }
        self.table[slot] = self.arena.len() as u32;
        self.max_set_id = Some(self.max_set_id.map_or(def.set_id, |m| m.max(def.set_id)));
        self.arena.push(def);
        Ok(())
    }

    pub fn find(&self, set_id: u16) -> Option<(usize, &ElementSetDefOwned)> {
        let idx = self.table[usize::from(set_id)];
        if idx == EMPTY_SLOT {
            None
        } else {
            Some((idx as usize, &self.arena[idx as usize]))
        }
    }

    pub(crate) fn def_at(&self, index: usize) -> &ElementSetDefOwned {
        &self.arena[index]
    }

    fn next_defined(&self, from: u32) -> Option<u16> {
        let max = u32::from(self.max_set_id?);
        (from..=max).find(|&id| self.table[id as usize] != EMPTY_SLOT).map(|id| id as u16)
    }
}

// ============================================================
// Bootstrap definitions (set id 0 of the payload itself)
// ============================================================

static BOOT_FIELD_DEFS: OnceLock<LocalElementSetDefDb<'static>> = OnceLock::new();
static BOOT_ELEMENT_DEFS: OnceLock<LocalElementSetDefDb<'static>> = OnceLock::new();

fn bootstrap_field_payload_defs() -> &'static LocalElementSetDefDb<'static> {
    BOOT_FIELD_DEFS.get_or_init(|| {
        let mut db = LocalElementSetDefDb::new();
        // infallible: the db is empty
        let _ = db.add(ElementSetDef {
            set_id: 0,
            entries: vec![
                ElementSetDefEntry { name: ENAME_NUMENTRIES, data_type: DataType::Int },
                ElementSetDefEntry { name: ENAME_FIDS, data_type: DataType::Array },
                ElementSetDefEntry { name: ENAME_TYPES, data_type: DataType::Array },
            ],
        });
        db
    })
}

fn bootstrap_element_payload_defs() -> &'static LocalElementSetDefDb<'static> {
    BOOT_ELEMENT_DEFS.get_or_init(|| {
        let mut db = LocalElementSetDefDb::new();
        let _ = db.add(ElementSetDef {
            set_id: 0,
            entries: vec![
                ElementSetDefEntry { name: ENAME_NUMENTRIES, data_type: DataType::Int },
                ElementSetDefEntry { name: ENAME_NAMES, data_type: DataType::Array },
                ElementSetDefEntry { name: ENAME_TYPES, data_type: DataType::Array },
            ],
        });
        db
    })
}

// ============================================================
// Encode
// ============================================================

fn encode_summary(
    iter: &mut EncodeIterator,
    dict_type: u64,
    version: &[u8],
    dictionary_id: u64,
) -> CodecResult<()> {
    let list = ElementList { flags: ElementListFlags::HAS_STANDARD_DATA, ..ElementList::default() };
    encode_element_list_init(iter, &list, None)?;
    encode_element_entry(
        iter,
        ENAME_TYPE,
        DataType::UInt,
        &EntryData::Value(PrimitiveValue::UInt(dict_type)),
    )?;
    encode_element_entry(
        iter,
        ENAME_VERSION,
        DataType::AsciiString,
        &EntryData::Value(PrimitiveValue::Buffer(version)),
    )?;
    encode_element_entry(
        iter,
        ENAME_DICTIONARY_ID,
        DataType::UInt,
        &EntryData::Value(PrimitiveValue::UInt(dictionary_id)),
    )?;
    encode_element_list_complete(iter, true)
}

/// Unwind a partially encoded dictionary entry back to the enclosing
/// vector so the part can still complete cleanly.
fn unwind_entry(iter: &mut EncodeIterator, vector_depth: usize) {
    while iter.depth > vector_depth {
        let _ = iter.pop_level(false);
    }
    let _ = encode_vector_entry_complete(iter, false);
}

fn encode_field_def_entry(iter: &mut EncodeIterator, def: &FieldSetDef) -> CodecResult<()> {
    let boot = bootstrap_field_payload_defs();
    let depth0 = iter.depth;
    let r = (|| {
        encode_vector_entry_init(iter, VectorEntryAction::Set, u32::from(def.set_id), None)?;
        let list = ElementList {
            flags: ElementListFlags::HAS_SET_DATA,
            ..ElementList::default()
        };
        encode_element_list_init(iter, &list, Some(boot))?;
        encode_element_entry(
            iter,
            ENAME_NUMENTRIES,
            DataType::Int,
            &EntryData::Value(PrimitiveValue::Int(def.entries.len() as i64)),
        )?;
        encode_element_entry_init(iter, ENAME_FIDS, DataType::Array)?;
        encode_array_init(iter, &Array::new(DataType::Int, 2))?;
        for e in &def.entries {
            encode_array_entry(iter, &EntryData::Value(PrimitiveValue::Int(i64::from(e.field_id))))?;
        }
        encode_array_complete(iter, true)?;
        encode_element_entry_complete(iter, true)?;
        encode_element_entry_init(iter, ENAME_TYPES, DataType::Array)?;
        encode_array_init(iter, &Array::new(DataType::UInt, 1))?;
        for e in &def.entries {
            encode_array_entry(
                iter,
                &EntryData::Value(PrimitiveValue::UInt(u64::from(e.data_type as u8))),
            )?;
        }
        encode_array_complete(iter, true)?;
        encode_element_entry_complete(iter, true)?;
        encode_element_list_complete(iter, true)?;
        encode_vector_entry_complete(iter, true)
    })();
    if r.is_err() {
        unwind_entry(iter, depth0);
    }
    r
}

fn encode_element_def_entry(iter: &mut EncodeIterator, def: &ElementSetDefOwned) -> CodecResult<()> {
    let boot = bootstrap_element_payload_defs();
    let depth0 = iter.depth;
    let r = (|| {
        encode_vector_entry_init(iter, VectorEntryAction::Set, u32::from(def.set_id), None)?;
        let list = ElementList {
            flags: ElementListFlags::HAS_SET_DATA,
            ..ElementList::default()
        };
        encode_element_list_init(iter, &list, Some(boot))?;
        encode_element_entry(
            iter,
            ENAME_NUMENTRIES,
            DataType::Int,
            &EntryData::Value(PrimitiveValue::Int(def.entries.len() as i64)),
        )?;
        encode_element_entry_init(iter, ENAME_NAMES, DataType::Array)?;
        encode_array_init(iter, &Array::new(DataType::AsciiString, 0))?;
        for e in &def.entries {
            encode_array_entry(iter, &EntryData::Value(PrimitiveValue::Buffer(&e.name)))?;
        }
        encode_array_complete(iter, true)?;
        encode_element_entry_complete(iter, true)?;
        encode_element_entry_init(iter, ENAME_TYPES, DataType::Array)?;
        encode_array_init(iter, &Array::new(DataType::UInt, 1))?;
        for e in &def.entries {
            encode_array_entry(
                iter,
                &EntryData::Value(PrimitiveValue::UInt(u64::from(e.data_type as u8))),
            )?;
        }
        encode_array_complete(iter, true)?;
        encode_element_entry_complete(iter, true)?;
        encode_element_list_complete(iter, true)?;
        encode_vector_entry_complete(iter, true)
    })();
    if r.is_err() {
        unwind_entry(iter, depth0);
    }
    r
}

fn begin_part(
    iter: &mut EncodeIterator,
    dict_type: u64,
    version: &[u8],
    dictionary_id: u64,
    field: bool,
) -> CodecResult<()> {
    let vector = Vector {
        flags: VectorFlags::HAS_SET_DEFS | VectorFlags::HAS_SUMMARY_DATA,
        container_type: DataType::ElementList,
        ..Vector::default()
    };
    encode_vector_init(iter, &vector)?;
    let boot = if field {
        bootstrap_field_payload_defs()
    } else {
        bootstrap_element_payload_defs()
    };
    encode_local_element_set_defs(iter, boot)?;
    encode_vector_set_defs_complete(iter, true)?;
    encode_summary(iter, dict_type, version, dictionary_id)?;
    encode_vector_summary_data_complete(iter, true)
}

/// Encode one part of the field dictionary, resuming from `cursor`
/// (the next set id to consider; start at 0). Returns More when the
/// buffer filled before the last definition.
pub fn encode_field_set_defs_dictionary(
    iter: &mut EncodeIterator,
    db: &FieldSetDefDb,
    cursor: &mut u32,
    verbosity: DictionaryVerbosity,
) -> CodecResult<DictionaryPart> {
    iter.alive()?;
    begin_part(iter, DICTIONARY_TYPE_FIELD_SET_DEF, &db.version, db.dictionary_id, true)?;
    if verbosity == DictionaryVerbosity::Info {
        encode_vector_complete(iter, true)?;
        return Ok(DictionaryPart::Complete);
    }
    let mut wrote_any = false;
    while let Some(set_id) = db.next_defined(*cursor) {
        let (_, def) = db.find(set_id).ok_or(CodecError::Failure("table out of sync"))?;
        match encode_field_def_entry(iter, def) {
            Ok(()) => {
                *cursor = u32::from(set_id) + 1;
                wrote_any = true;
            }
            Err(CodecError::BufferTooSmall) if wrote_any => {
                encode_vector_complete(iter, true)?;
                return Ok(DictionaryPart::More);
            }
            Err(e) => {
                encode_vector_complete(iter, false)?;
                return Err(e);
            }
        }
    }
    encode_vector_complete(iter, true)?;
    Ok(DictionaryPart::Complete)
}

/// Element flavor of `encode_field_set_defs_dictionary`.
pub fn encode_element_set_defs_dictionary(
    iter: &mut EncodeIterator,
    db: &ElementSetDefDb,
    cursor: &mut u32,
    verbosity: DictionaryVerbosity,
) -> CodecResult<DictionaryPart> {
    iter.alive()?;
    begin_part(iter, DICTIONARY_TYPE_ELEMENT_SET_DEF, &db.version, db.dictionary_id, false)?;
    if verbosity == DictionaryVerbosity::Info {
        encode_vector_complete(iter, true)?;
        return Ok(DictionaryPart::Complete);
    }
    let mut wrote_any = false;
    while let Some(set_id) = db.next_defined(*cursor) {
        let (_, def) = db.find(set_id).ok_or(CodecError::Failure("table out of sync"))?;
        match encode_element_def_entry(iter, def) {
            Ok(()) => {
                *cursor = u32::from(set_id) + 1;
                wrote_any = true;
            }
            Err(CodecError::BufferTooSmall) if wrote_any => {
                encode_vector_complete(iter, true)?;
                return Ok(DictionaryPart::More);
            }
            Err(e) => {
                encode_vector_complete(iter, false)?;
                return Err(e);
            }
        }
    }
    encode_vector_complete(iter, true)?;
    Ok(DictionaryPart::Complete)
}

// ============================================================
// Decode
// ============================================================

struct SummaryInfo {
    dict_type: u64,
    version: Vec<u8>,
    dictionary_id: u64,
}

fn decode_summary(iter: &mut DecodeIterator) -> CodecResult<SummaryInfo> {
    decode_element_list(iter, None)?;
    let mut info = SummaryInfo { dict_type: 0, version: Vec::new(), dictionary_id: 0 };
    while let Some(e) = decode_element_entry(iter)? {
        if e.name == ENAME_TYPE {
            info.dict_type = decode_uint(iter)?
                .ok_or(CodecError::Failure("dictionary type is blank"))?;
        } else if e.name == ENAME_VERSION {
            info.version = decode_buffer(iter)?.unwrap_or_default().to_vec();
        } else if e.name == ENAME_DICTIONARY_ID {
            info.dictionary_id = decode_uint(iter)?.unwrap_or(0);
        }
    }
    Ok(info)
}

/// Raw element buffers of one definition entry, stashed so counts may
/// arrive before or after the id arrays.
#[derive(Default)]
struct DefElements<'a> {
    num_entries: Option<i64>,
    keys: Option<&'a [u8]>,
    types: Option<&'a [u8]>,
}

fn collect_def_elements<'a>(
    iter: &mut DecodeIterator<'a>,
    key_name: &[u8],
) -> CodecResult<DefElements<'a>> {
    decode_element_list(iter, None)?;
    let mut out = DefElements::default();
    while let Some(e) = decode_element_entry(iter)? {
        if e.name == ENAME_NUMENTRIES {
            let mut nested = DecodeIterator::new(e.enc_data);
            out.num_entries =
                Some(decode_int(&mut nested)?.ok_or(CodecError::Failure("blank NUMENTRIES"))?);
        } else if e.name == key_name {
            out.keys = Some(e.enc_data);
        } else if e.name == ENAME_TYPES {
            out.types = Some(e.enc_data);
        } else {
            return Err(CodecError::Failure("unexpected dictionary element"));
        }
    }
    Ok(out)
}

fn decode_int_array(buf: &[u8]) -> CodecResult<Vec<i64>> {
    let mut it = DecodeIterator::new(buf);
    decode_array(&mut it)?;
    let mut out = Vec::new();
    while decode_array_entry(&mut it)?.is_some() {
        out.push(decode_int(&mut it)?.ok_or(CodecError::Failure("blank array item"))?);
    }
    Ok(out)
}

fn decode_uint_array(buf: &[u8]) -> CodecResult<Vec<u64>> {
    let mut it = DecodeIterator::new(buf);
    decode_array(&mut it)?;
    let mut out = Vec::new();
    while decode_array_entry(&mut it)?.is_some() {
        out.push(decode_uint(&mut it)?.ok_or(CodecError::Failure("blank array item"))?);
    }
    Ok(out)
}

fn decode_buffer_array(buf: &[u8]) -> CodecResult<Vec<Vec<u8>>> {
    let mut it = DecodeIterator::new(buf);
    decode_array(&mut it)?;
    let mut out = Vec::new();
    while decode_array_entry(&mut it)?.is_some() {
        out.push(decode_buffer(&mut it)?.unwrap_or_default().to_vec());
    }
    Ok(out)
}

/// Decode one part of a field dictionary payload into `db`. Parts may
/// arrive in any number; definitions accumulate across calls.
pub fn decode_field_set_defs_dictionary(
    iter: &mut DecodeIterator,
    db: &mut FieldSetDefDb,
    verbosity: DictionaryVerbosity,
) -> CodecResult<()> {
    let vector = decode_vector(iter)?;
    if vector.container_type != DataType::ElementList {
        return Err(CodecError::Failure("dictionary payload is not element lists"));
    }
    let summary = decode_summary(iter)?;
    if summary.dict_type != DICTIONARY_TYPE_FIELD_SET_DEF {
        return Err(CodecError::Failure("wrong dictionary type"));
    }
    db.version = summary.version;
    db.dictionary_id = summary.dictionary_id;
    if vector.enc_set_defs.is_some() {
        decode_local_element_set_defs_scratch(iter)?;
    }
    while let Some(entry) = decode_vector_entry(iter)? {
        if verbosity == DictionaryVerbosity::Info {
            continue;
        }
        let set_id = u16::try_from(entry.index)
            .map_err(|_| CodecError::InvalidArgument("set id above 65535"))?;
        let parts = collect_def_elements(iter, ENAME_FIDS)?;
        let n = parts.num_entries.ok_or(CodecError::Failure("missing NUMENTRIES"))?;
        let fids = decode_int_array(parts.keys.ok_or(CodecError::Failure("missing FIDS"))?)?;
        let types = decode_uint_array(parts.types.ok_or(CodecError::Failure("missing TYPES"))?)?;
        if fids.len() != types.len() || fids.len() as i64 != n {
            return Err(CodecError::Failure("definition entry counts disagree"));
        }
        let entries = fids
            .iter()
            .zip(&types)
            .map(|(&fid, &ty)| {
                Ok(FieldSetDefEntry {
                    field_id: i16::try_from(fid)
                        .map_err(|_| CodecError::Failure("field id out of range"))?,
                    data_type: DataType::from_u8(
                        u8::try_from(ty).map_err(|_| CodecError::Failure("bad type value"))?,
                    )?,
                })
            })
            .collect::<CodecResult<Vec<_>>>()?;
        db.add(FieldSetDef { set_id, entries })?;
    }
    Ok(())
}

/// Element flavor of `decode_field_set_defs_dictionary`.
pub fn decode_element_set_defs_dictionary(
    iter: &mut DecodeIterator,
    db: &mut ElementSetDefDb,
    verbosity: DictionaryVerbosity,
) -> CodecResult<()> {
    let vector = decode_vector(iter)?;
    if vector.container_type != DataType::ElementList {
        return Err(CodecError::Failure("dictionary payload is not element lists"));
    }
    let summary = decode_summary(iter)?;
    if summary.dict_type != DICTIONARY_TYPE_ELEMENT_SET_DEF {
        return Err(CodecError::Failure("wrong dictionary type"));
    }
    db.version = summary.version;
    db.dictionary_id = summary.dictionary_id;
    if vector.enc_set_defs.is_some() {
        decode_local_element_set_defs_scratch(iter)?;
    }
    while let Some(entry) = decode_vector_entry(iter)? {
        if verbosity == DictionaryVerbosity::Info {
            continue;
        }
        let set_id = u16::try_from(entry.index)
            .map_err(|_| CodecError::InvalidArgument("set id above 65535"))?;
        let parts = collect_def_elements(iter, ENAME_NAMES)?;
        let n = parts.num_entries.ok_or(CodecError::Failure("missing NUMENTRIES"))?;
        let names = decode_buffer_array(parts.keys.ok_or(CodecError::Failure("missing NAMES"))?)?;
        let types = decode_uint_array(parts.types.ok_or(CodecError::Failure("missing TYPES"))?)?;
        if names.len() != types.len() || names.len() as i64 != n {
            return Err(CodecError::Failure("definition entry counts disagree"));
        }
        let entries = names
            .into_iter()
            .zip(&types)
            .map(|(name, &ty)| {
                Ok(ElementSetDefOwnedEntry {
                    name,
                    data_type: DataType::from_u8(
                        u8::try_from(ty).map_err(|_| CodecError::Failure("bad type value"))?,
                    )?,
                })
            })
            .collect::<CodecResult<Vec<_>>>()?;
        db.add(ElementSetDefOwned { set_id, entries })?;
    }
    Ok(())
}
