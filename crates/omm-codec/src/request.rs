// request.rs — request QoS mapping and batch/view payload detection
//
// Consumers express timeliness and rate in application terms; the
// mapping below turns those into the wire qos/worstQos pair. A request
// whose ElementList payload names ":ItemList" or ":ViewData" is a
// batch or view request: the detector flags it, collects the batch
// items (deduplicated, order preserved) and re-encodes the payload
// when duplicates were dropped, leaving unrecognized entries verbatim.

use crate::array::{
    decode_array, decode_array_entry, encode_array_complete, encode_array_entry,
    encode_array_init, Array,
};
use crate::container::EntryData;
use crate::element_list::{
    decode_element_entry, decode_element_list, encode_element_entry, encode_element_entry_init,
    encode_element_entry_complete, encode_element_list_complete, encode_element_list_init,
    ElementList, ElementListFlags,
};
use crate::error::{CodecError, CodecResult};
use crate::iter::{DecodeIterator, EncodeIterator};
use crate::msg::{RequestFlags, RequestMsg};
use crate::primitive::decode_buffer;
use crate::types::{DataType, PrimitiveValue, Qos, QosRate, QosTimeliness};

/// Payload element naming the batch item list.
pub const ENAME_ITEM_LIST: &[u8] = b":ItemList";
/// Payload element naming the view field list.
pub const ENAME_VIEW_DATA: &[u8] = b":ViewData";

// ============================================================
// QoS mapping
// ============================================================

/// Application-level timeliness choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTimeliness {
    RealTime,
    /// Any delay is acceptable; prefer the smallest.
    BestDelayed,
    /// Prefer realtime, accept any delay.
    BestTimeliness,
    /// Delayed by exactly this many milliseconds.
    DelayedBy(u16),
    /// Delayed by an amount the provider does not quantify.
    DelayedUnknown,
}

/// Application-level rate choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRate {
    TickByTick,
    JustInTimeConflated,
    /// Any conflation is acceptable; prefer the lightest.
    BestConflatedRate,
    /// Prefer tick-by-tick, accept conflation.
    BestRate,
    /// Conflated on exactly this interval in milliseconds.
    ConflatedEvery(u16),
    /// Conflated on an interval the provider does not quantify.
    ConflatedUnknown,
}

/// Populate a request's qos/worstQos pair (and their flags) from the
/// application-level choices.
pub fn apply_qos(req: &mut RequestMsg, timeliness: RequestTimeliness, rate: RequestRate) {
    req.flags |= RequestFlags::HAS_QOS;
    req.qos = Qos::default();
    let mut worst = Qos::default();
    let mut has_worst = false;

    match timeliness {
        RequestTimeliness::RealTime => req.qos.timeliness = QosTimeliness::Realtime,
        RequestTimeliness::BestDelayed => {
            req.qos.timeliness = QosTimeliness::DelayedByInfo;
            req.qos.time_info = 1;
            worst.timeliness = QosTimeliness::DelayedByInfo;
            worst.time_info = 65535;
            has_worst = true;
        }
        RequestTimeliness::BestTimeliness => {
            req.qos.timeliness = QosTimeliness::Realtime;
            worst.timeliness = QosTimeliness::DelayedByInfo;
            worst.time_info = 65535;
            has_worst = true;
        }
        RequestTimeliness::DelayedBy(ms) => {
            req.qos.timeliness = QosTimeliness::DelayedByInfo;
            req.qos.time_info = ms;
        }
        RequestTimeliness::DelayedUnknown => req.qos.timeliness = QosTimeliness::DelayedUnknown,
    }

    match rate {
        RequestRate::TickByTick => req.qos.rate = QosRate::TickByTick,
        RequestRate::JustInTimeConflated => req.qos.rate = QosRate::JitConflated,
        RequestRate::BestConflatedRate => {
            req.qos.rate = QosRate::TimeConflated;
            req.qos.rate_info = 1;
            worst.rate = QosRate::JitConflated;
            has_worst = true;
        }
        RequestRate::BestRate => {
            req.qos.rate = QosRate::TickByTick;
            worst.rate = QosRate::JitConflated;
            has_worst = true;
        }
        RequestRate::ConflatedEvery(ms) => {
            req.qos.rate = QosRate::TimeConflated;
            req.qos.rate_info = ms;
        }
        RequestRate::ConflatedUnknown => req.qos.rate = QosRate::JitConflated,
    }

    if has_worst {
        req.flags |= RequestFlags::HAS_WORST_QOS;
        req.worst_qos = worst;
    } else {
        req.flags &= !RequestFlags::HAS_WORST_QOS;
        req.worst_qos = Qos::default();
    }
}

// ============================================================
// Batch / view detection
// ============================================================

/// What the detector found in a request payload.
#[derive(Debug, Clone, Default)]
pub struct BatchView {
    pub has_batch: bool,
    pub has_view: bool,
    /// Batch items with duplicates dropped, first-seen order.
    pub items: Vec<Vec<u8>>,
    /// Replacement payload, present only when duplicates forced a
    /// re-encode. Never longer than the original.
    pub reencoded_payload: Option<Vec<u8>>,
}

/// Flags the request record according to what the payload carries and
/// returns the detection result. Only meaningful when the payload is
/// an ElementList; other container types yield None.
pub fn detect_batch_view(
    container_type: DataType,
    payload: &[u8],
) -> CodecResult<Option<BatchView>> {
    if container_type != DataType::ElementList || payload.is_empty() {
        return Ok(None);
    }
    let mut iter = DecodeIterator::new(payload);
    let list = decode_element_list(&mut iter, None)?;
    let mut out = BatchView::default();
    let mut had_duplicates = false;
    while let Some(entry) = decode_element_entry(&mut iter)? {
        if entry.name == ENAME_VIEW_DATA && entry.data_type == DataType::Array {
            out.has_view = true;
        } else if entry.name == ENAME_ITEM_LIST && entry.data_type == DataType::Array {
            let (items, dups) = collect_items(entry.enc_data)?;
            out.has_batch = true;
            out.items = items;
            had_duplicates = dups;
        }
    }
    if !out.has_batch && !out.has_view {
        return Ok(None);
    }
    if had_duplicates {
        out.reencoded_payload = Some(reencode_dedup(payload, &list, &out.items)?);
    }
    Ok(Some(out))
}

/// Pull the ASCII item names out of the `:ItemList` array, deduped with
/// first-seen order preserved.
fn collect_items(enc_array: &[u8]) -> CodecResult<(Vec<Vec<u8>>, bool)> {
    let mut iter = DecodeIterator::new(enc_array);
    let arr = decode_array(&mut iter)?;
    if arr.primitive_type != DataType::AsciiString && arr.primitive_type != DataType::Buffer {
        return Err(CodecError::InvalidData("batch item list is not ascii"));
    }
    let mut items: Vec<Vec<u8>> = Vec::new();
    let mut dups = false;
    while decode_array_entry(&mut iter)?.is_some() {
        let item = decode_buffer(&mut iter)?.unwrap_or_default();
        if items.iter().any(|i| i == item) {
            dups = true;
        } else {
            items.push(item.to_vec());
        }
    }
    Ok((items, dups))
}

/// Rebuild the payload with the deduplicated item list; every other
/// entry is copied through untouched.
fn reencode_dedup(
    payload: &[u8],
    list: &ElementList,
    items: &[Vec<u8>],
) -> CodecResult<Vec<u8>> {
    let mut out = vec![0u8; payload.len()];
    let mut enc = EncodeIterator::new(&mut out);
    let header = ElementList {
        flags: ElementListFlags::HAS_STANDARD_DATA
            | (list.flags & ElementListFlags::HAS_ELEMENT_LIST_INFO),
        element_list_num: list.element_list_num,
        ..ElementList::default()
    };
    encode_element_list_init(&mut enc, &header, None)?;

    let mut iter = DecodeIterator::new(payload);
    decode_element_list(&mut iter, None)?;
    while let Some(entry) = decode_element_entry(&mut iter)? {
        if entry.name == ENAME_ITEM_LIST && entry.data_type == DataType::Array {
            encode_element_entry_init(&mut enc, ENAME_ITEM_LIST, DataType::Array)?;
            encode_array_init(&mut enc, &Array::new(DataType::AsciiString, 0))?;
            for item in items {
                encode_array_entry(&mut enc, &EntryData::Value(PrimitiveValue::Buffer(item)))?;
            }
            encode_array_complete(&mut enc, true)?;
            encode_element_entry_complete(&mut enc, true)?;
        } else {
            encode_element_entry(
                &mut enc,
                entry.name,
                entry.data_type,
                &EntryData::PreEncoded(entry.enc_data),
            )?;
        }
    }
    encode_element_list_complete(&mut enc, true)?;
    let len = enc.encoded_len();
    out.truncate(len);
    Ok(out)
}
