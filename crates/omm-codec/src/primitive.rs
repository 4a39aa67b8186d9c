// primitive.rs — primitive type encoders and decoders
//
// All integer forms are length-minimized big-endian: leading bytes that
// are redundant for sign reconstruction are suppressed. Decoders consume
// the whole value window the enclosing container (or the bare buffer)
// gives them and return None for zero-length blank data.

use crate::error::{CodecError, CodecResult};
use crate::iter::{DecodeIterator, EncodeIterator};
use crate::types::{
    DataState, DataType, Date, DateTime, PrimitiveValue, Qos, QosRate, QosTimeliness, Real,
    RealHint, State, StreamState, Time,
};

// ============================================================
// Length-minimized integers
// ============================================================

/// Big-endian bytes of `v` with sign-redundant leading bytes dropped.
/// Returns the full byte array and the index of the first significant
/// byte (at most 7, so at least one byte remains).
pub(crate) fn int_min_bytes(v: i64) -> ([u8; 8], usize) {
    let be = v.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = if be[start + 1] & 0x80 == 0 {
            be[start] == 0x00
        } else {
            be[start] == 0xFF
        };
        if redundant {
            start += 1;
        } else {
            break;
        }
    }
    (be, start)
}

pub(crate) fn uint_min_bytes(v: u64) -> ([u8; 8], usize) {
    let be = v.to_be_bytes();
    let mut start = 0;
    while start < 7 && be[start] == 0 {
        start += 1;
    }
    (be, start)
}

/// Sign-extending reconstruction of a 1..=8 byte big-endian integer.
pub(crate) fn int_from_be(s: &[u8]) -> CodecResult<i64> {
    if s.is_empty() || s.len() > 8 {
        return Err(CodecError::IncompleteData);
    }
    let mut v: i64 = if s[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in s {
        v = (v << 8) | i64::from(b);
    }
    Ok(v)
}

pub(crate) fn uint_from_be(s: &[u8]) -> CodecResult<u64> {
    if s.is_empty() || s.len() > 8 {
        return Err(CodecError::IncompleteData);
    }
    let mut v: u64 = 0;
    for &b in s {
        v = (v << 8) | u64::from(b);
    }
    Ok(v)
}

// ============================================================
// Encoders
// ============================================================

pub fn encode_int(iter: &mut EncodeIterator, v: i64) -> CodecResult<()> {
    iter.alive()?;
    let (be, start) = int_min_bytes(v);
    iter.put_slice(&be[start..])
}

pub fn encode_uint(iter: &mut EncodeIterator, v: u64) -> CodecResult<()> {
    iter.alive()?;
    let (be, start) = uint_min_bytes(v);
    iter.put_slice(&be[start..])
}

pub fn encode_float(iter: &mut EncodeIterator, v: f32) -> CodecResult<()> {
    iter.alive()?;
    iter.put_slice(&v.to_be_bytes())
}

pub fn encode_double(iter: &mut EncodeIterator, v: f64) -> CodecResult<()> {
    iter.alive()?;
    iter.put_slice(&v.to_be_bytes())
}

pub fn encode_enum(iter: &mut EncodeIterator, v: u16) -> CodecResult<()> {
    iter.alive()?;
    if v <= 0xFF {
        iter.put_u8(v as u8)
    } else {
        iter.put_u16(v)
    }
}

pub fn encode_buffer(iter: &mut EncodeIterator, v: &[u8]) -> CodecResult<()> {
    iter.alive()?;
    iter.put_slice(v)
}

/// Hint byte then length-minimized mantissa. Blank is the bare blank
/// hint; infinity, negative infinity and NaN carry no mantissa.
pub fn encode_real(iter: &mut EncodeIterator, v: &Real) -> CodecResult<()> {
    iter.alive()?;
    match v.hint {
        RealHint::Blank => iter.put_u8(RealHint::Blank as u8),
        RealHint::Infinity | RealHint::NegInfinity | RealHint::NotANumber => {
            iter.put_u8(0x80 | (v.hint as u8 - RealHint::Infinity as u8))
        }
        hint => {
            iter.put_u8(hint as u8)?;
            if v.value != 0 {
                let (be, start) = int_min_bytes(v.value);
                iter.put_slice(&be[start..])?;
            }
            Ok(())
        }
    }
}

/// Day, month, then year, with trailing zero fields truncated. The
/// all-zero blank date encodes as zero bytes.
pub fn encode_date(iter: &mut EncodeIterator, v: &Date) -> CodecResult<()> {
    iter.alive()?;
    if v.is_blank() {
        return Ok(());
    }
    if v.year != 0 {
        iter.put_u8(v.day)?;
        iter.put_u8(v.month)?;
        iter.put_u16(v.year)
    } else if v.month != 0 {
        iter.put_u8(v.day)?;
        iter.put_u8(v.month)
    } else {
        iter.put_u8(v.day)
    }
}

fn time_wire_len(v: &Time) -> usize {
    if v.nanosecond != 0 {
        9
    } else if v.microsecond != 0 {
        7
    } else if v.millisecond != 0 {
        5
    } else if v.second != 0 {
        3
    } else {
        2
    }
}

fn put_time(iter: &mut EncodeIterator, v: &Time, len: usize) -> CodecResult<()> {
    iter.put_u8(v.hour)?;
    iter.put_u8(v.minute)?;
    if len >= 3 {
        iter.put_u8(v.second)?;
    }
    if len >= 5 {
        iter.put_u16(v.millisecond)?;
    }
    if len >= 7 {
        iter.put_u16(v.microsecond)?;
    }
    if len >= 9 {
        iter.put_u16(v.nanosecond)?;
    }
    Ok(())
}

/// Hour/minute always present, finer fields truncated when the rest of
/// the value is zero. Blank (sentinel) time encodes as zero bytes.
pub fn encode_time(iter: &mut EncodeIterator, v: &Time) -> CodecResult<()> {
    iter.alive()?;
    if v.is_blank() {
        return Ok(());
    }
    put_time(iter, v, time_wire_len(v))
}

/// Four date bytes then the truncated time; a blank time is expressed
/// by the date-only form.
pub fn encode_datetime(iter: &mut EncodeIterator, v: &DateTime) -> CodecResult<()> {
    iter.alive()?;
    if v.is_blank() {
        return Ok(());
    }
    iter.put_u8(v.date.day)?;
    iter.put_u8(v.date.month)?;
    iter.put_u16(v.date.year)?;
    if v.time.is_blank() {
        return Ok(());
    }
    put_time(iter, &v.time, time_wire_len(&v.time))
}

pub fn encode_qos(iter: &mut EncodeIterator, v: &Qos) -> CodecResult<()> {
    iter.alive()?;
    let b0 = ((v.timeliness as u8) << 5) | ((v.rate as u8) << 1) | u8::from(v.dynamic);
    iter.put_u8(b0)?;
    if v.timeliness == QosTimeliness::DelayedByInfo {
        iter.put_u16(v.time_info)?;
    }
    if v.rate == QosRate::TimeConflated {
        iter.put_u16(v.rate_info)?;
    }
    Ok(())
}

pub fn encode_state(iter: &mut EncodeIterator, v: &State) -> CodecResult<()> {
    iter.alive()?;
    iter.put_u8(((v.stream_state as u8) << 3) | (v.data_state as u8))?;
    iter.put_u8(v.code)?;
    iter.put_rb_slice(v.text)
}

/// Generic dispatch; produces byte-identical output to the per-type
/// functions.
pub fn encode_primitive(iter: &mut EncodeIterator, v: &PrimitiveValue) -> CodecResult<()> {
    match v {
        PrimitiveValue::Int(x) => encode_int(iter, *x),
        PrimitiveValue::UInt(x) => encode_uint(iter, *x),
        PrimitiveValue::Float(x) => encode_float(iter, *x),
        PrimitiveValue::Double(x) => encode_double(iter, *x),
        PrimitiveValue::Real(x) => encode_real(iter, x),
        PrimitiveValue::Date(x) => encode_date(iter, x),
        PrimitiveValue::Time(x) => encode_time(iter, x),
        PrimitiveValue::DateTime(x) => encode_datetime(iter, x),
        PrimitiveValue::Enum(x) => encode_enum(iter, *x),
        PrimitiveValue::Qos(x) => encode_qos(iter, x),
        PrimitiveValue::State(x) => encode_state(iter, x),
        PrimitiveValue::Buffer(x) => encode_buffer(iter, x),
    }
}

/// Fixed-width encode used by Array items with a declared item length.
/// Integer forms are zero/sign-padded to the width; Float, Double and
/// Date require their natural width; Buffer forms must match exactly.
pub(crate) fn encode_primitive_fixed(
    iter: &mut EncodeIterator,
    v: &PrimitiveValue,
    len: u16,
) -> CodecResult<()> {
    let len = len as usize;
    match v {
        PrimitiveValue::Int(x) => {
            let (be, start) = int_min_bytes(*x);
            if 8 - start > len || len > 8 {
                return iter.fail(CodecError::InvalidArgument("value wider than item length"));
            }
            let fill = if *x < 0 { 0xFF } else { 0x00 };
            for _ in 0..len - (8 - start) {
                iter.put_u8(fill)?;
            }
            iter.put_slice(&be[start..])
        }
        PrimitiveValue::UInt(_) | PrimitiveValue::Enum(_) => {
            let raw = match v {
                PrimitiveValue::UInt(u) => *u,
                PrimitiveValue::Enum(e) => u64::from(*e),
                _ => unreachable!(),
            };
            let (be, start) = uint_min_bytes(raw);
            if 8 - start > len || len > 8 {
                return iter.fail(CodecError::InvalidArgument("value wider than item length"));
            }
            for _ in 0..len - (8 - start) {
                iter.put_u8(0)?;
            }
            iter.put_slice(&be[start..])
        }
        PrimitiveValue::Float(x) => {
            if len != 4 {
                return iter.fail(CodecError::InvalidArgument("float item length must be 4"));
            }
            encode_float(iter, *x)
        }
        PrimitiveValue::Double(x) => {
            if len != 8 {
                return iter.fail(CodecError::InvalidArgument("double item length must be 8"));
            }
            encode_double(iter, *x)
        }
        PrimitiveValue::Date(x) => {
            if len != 4 {
                return iter.fail(CodecError::InvalidArgument("date item length must be 4"));
            }
            iter.put_u8(x.day)?;
            iter.put_u8(x.month)?;
            iter.put_u16(x.year)
        }
        PrimitiveValue::Time(x) => match len {
            2 | 3 | 5 | 7 | 9 => put_time(iter, x, len),
            _ => iter.fail(CodecError::InvalidArgument("bad time item length")),
        },
        PrimitiveValue::Buffer(x) => {
            if x.len() != len {
                return iter.fail(CodecError::InvalidArgument("buffer does not match item length"));
            }
            iter.put_slice(x)
        }
        _ => iter.fail(CodecError::UnsupportedDataType(v.data_type() as u8)),
    }
}

// ============================================================
// Decoders
// ============================================================

pub fn decode_int(iter: &mut DecodeIterator) -> CodecResult<Option<i64>> {
    let s = iter.take_value();
    if s.is_empty() {
        return Ok(None);
    }
    Ok(Some(int_from_be(s)?))
}

pub fn decode_uint(iter: &mut DecodeIterator) -> CodecResult<Option<u64>> {
    let s = iter.take_value();
    if s.is_empty() {
        return Ok(None);
    }
    Ok(Some(uint_from_be(s)?))
}

pub fn decode_float(iter: &mut DecodeIterator) -> CodecResult<Option<f32>> {
    let s = iter.take_value();
    match s.len() {
        0 => Ok(None),
        4 => Ok(Some(f32::from_be_bytes([s[0], s[1], s[2], s[3]]))),
        _ => Err(CodecError::IncompleteData),
    }
}

pub fn decode_double(iter: &mut DecodeIterator) -> CodecResult<Option<f64>> {
    let s = iter.take_value();
    match s.len() {
        0 => Ok(None),
        8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(s);
            Ok(Some(f64::from_be_bytes(b)))
        }
        _ => Err(CodecError::IncompleteData),
    }
}

pub fn decode_enum(iter: &mut DecodeIterator) -> CodecResult<Option<u16>> {
    let s = iter.take_value();
    match s.len() {
        0 => Ok(None),
        1 => Ok(Some(u16::from(s[0]))),
        2 => Ok(Some(u16::from_be_bytes([s[0], s[1]]))),
        _ => Err(CodecError::IncompleteData),
    }
}

/// Zero-copy; blank is a zero-length value, indistinguishable from the
/// empty string by design.
pub fn decode_buffer<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Option<&'a [u8]>> {
    let s = iter.take_value();
    if s.is_empty() {
        Ok(None)
    } else {
        Ok(Some(s))
    }
}

pub fn decode_real(iter: &mut DecodeIterator) -> CodecResult<Option<Real>> {
    let s = iter.take_value();
    if s.is_empty() {
        return Ok(None);
    }
    let b0 = s[0];
    if b0 & 0x80 != 0 {
        let hint = match b0 & 0x7F {
            0 => RealHint::Infinity,
            1 => RealHint::NegInfinity,
            2 => RealHint::NotANumber,
            _ => return Err(CodecError::InvalidData("bad real special")),
        };
        if s.len() != 1 {
            return Err(CodecError::InvalidData("special real carries mantissa"));
        }
        return Ok(Some(Real { hint, value: 0 }));
    }
    let h = b0 & 0x1F;
    if h == RealHint::Blank as u8 {
        return Ok(None);
    }
    let hint = RealHint::from_u8(h)?;
    let value = if s.len() == 1 { 0 } else { int_from_be(&s[1..])? };
    Ok(Some(Real { hint, value }))
}

pub fn decode_date(iter: &mut DecodeIterator) -> CodecResult<Option<Date>> {
    let s = iter.take_value();
    let mut d = Date::default();
    match s.len() {
        0 => return Ok(None),
        1 => d.day = s[0],
        2 => {
            d.day = s[0];
            d.month = s[1];
        }
        4 => {
            d.day = s[0];
            d.month = s[1];
            d.year = u16::from_be_bytes([s[2], s[3]]);
        }
        _ => return Err(CodecError::IncompleteData),
    }
    Ok(Some(d))
}

fn time_from_bytes(s: &[u8]) -> CodecResult<Time> {
    let mut t = Time::default();
    match s.len() {
        2 | 3 | 5 | 7 | 9 => {}
        _ => return Err(CodecError::IncompleteData),
    }
    t.hour = s[0];
    t.minute = s[1];
    if s.len() >= 3 {
        t.second = s[2];
    }
    if s.len() >= 5 {
        t.millisecond = u16::from_be_bytes([s[3], s[4]]);
    }
    if s.len() >= 7 {
        t.microsecond = u16::from_be_bytes([s[5], s[6]]);
    }
    if s.len() >= 9 {
        t.nanosecond = u16::from_be_bytes([s[7], s[8]]);
    }
    Ok(t)
}

pub fn decode_time(iter: &mut DecodeIterator) -> CodecResult<Option<Time>> {
    let s = iter.take_value();
    if s.is_empty() {
        return Ok(None);
    }
    Ok(Some(time_from_bytes(s)?))
}

pub fn decode_datetime(iter: &mut DecodeIterator) -> CodecResult<Option<DateTime>> {
    let s = iter.take_value();
    if s.is_empty() {
        return Ok(None);
    }
    if s.len() < 4 {
        return Err(CodecError::IncompleteData);
    }
    let date = Date {
        day: s[0],
        month: s[1],
        year: u16::from_be_bytes([s[2], s[3]]),
    };
    let time = if s.len() == 4 {
        Time::BLANK
    } else {
        time_from_bytes(&s[4..])?
    };
    Ok(Some(DateTime { date, time }))
}

pub fn decode_qos(iter: &mut DecodeIterator) -> CodecResult<Option<Qos>> {
    let s = iter.take_value();
    if s.is_empty() {
        return Ok(None);
    }
    let b0 = s[0];
    let mut q = Qos {
        timeliness: QosTimeliness::from_u8(b0 >> 5)?,
        rate: QosRate::from_u8((b0 >> 1) & 0x0F)?,
        dynamic: b0 & 0x01 != 0,
        time_info: 0,
        rate_info: 0,
    };
    let mut pos = 1;
    if q.timeliness == QosTimeliness::DelayedByInfo {
        if s.len() < pos + 2 {
            return Err(CodecError::IncompleteData);
        }
        q.time_info = u16::from_be_bytes([s[pos], s[pos + 1]]);
        pos += 2;
    }
    if q.rate == QosRate::TimeConflated {
        if s.len() < pos + 2 {
            return Err(CodecError::IncompleteData);
        }
        q.rate_info = u16::from_be_bytes([s[pos], s[pos + 1]]);
        pos += 2;
    }
    if pos != s.len() {
        return Err(CodecError::InvalidData("trailing qos bytes"));
    }
    Ok(Some(q))
}

pub fn decode_state<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Option<State<'a>>> {
    let s = iter.take_value();
    if s.is_empty() {
        return Ok(None);
    }
    if s.len() < 2 {
        return Err(CodecError::IncompleteData);
    }
    let stream_state = StreamState::from_u8(s[0] >> 3)?;
    let data_state = DataState::from_u8(s[0] & 0x07)?;
    let code = s[1];
    let (text_len, n) = crate::iter::rb_get(s, 2)?;
    let start = 2 + n;
    let end = start + text_len as usize;
    if end != s.len() {
        return Err(CodecError::IncompleteData);
    }
    Ok(Some(State {
        stream_state,
        data_state,
        code,
        text: &s[start..end],
    }))
}

/// Generic dispatch; mirrors `encode_primitive`.
pub fn decode_primitive<'a>(
    iter: &mut DecodeIterator<'a>,
    data_type: DataType,
) -> CodecResult<Option<PrimitiveValue<'a>>> {
    Ok(match data_type {
        DataType::Int => decode_int(iter)?.map(PrimitiveValue::Int),
        DataType::UInt => decode_uint(iter)?.map(PrimitiveValue::UInt),
        DataType::Float => decode_float(iter)?.map(PrimitiveValue::Float),
        DataType::Double => decode_double(iter)?.map(PrimitiveValue::Double),
        DataType::Real => decode_real(iter)?.map(PrimitiveValue::Real),
        DataType::Date => decode_date(iter)?.map(PrimitiveValue::Date),
        DataType::Time => decode_time(iter)?.map(PrimitiveValue::Time),
        DataType::DateTime => decode_datetime(iter)?.map(PrimitiveValue::DateTime),
        DataType::Enum => decode_enum(iter)?.map(PrimitiveValue::Enum),
        DataType::Qos => decode_qos(iter)?.map(PrimitiveValue::Qos),
        DataType::State => decode_state(iter)?.map(PrimitiveValue::State),
        DataType::Buffer | DataType::AsciiString | DataType::Utf8String
        | DataType::RmtesString => decode_buffer(iter)?.map(PrimitiveValue::Buffer),
        other => return Err(CodecError::UnsupportedDataType(other as u8)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &PrimitiveValue) -> Option<PrimitiveValue<'static>> {
        let mut buf = vec![0u8; 64];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_primitive(&mut enc, v).unwrap();
        let len = enc.encoded_len();
        let bytes: &'static [u8] = Box::leak(buf[..len].to_vec().into_boxed_slice());
        let mut dec = DecodeIterator::new(bytes);
        decode_primitive(&mut dec, v.data_type()).unwrap()
    }

    #[test]
    fn test_int_minimization() {
        let cases: [(i64, usize); 8] = [
            (0, 1),
            (1, 1),
            (-1, 1),
            (127, 1),
            (128, 2),
            (-129, 2),
            (65423, 3), // 0x00 0xFF 0x8F: leading zero needed for sign
            (i64::MIN, 8),
        ];
        for (v, want_len) in cases {
            let mut buf = [0u8; 16];
            let mut enc = EncodeIterator::new(&mut buf);
            encode_int(&mut enc, v).unwrap();
            assert_eq!(enc.encoded_len(), want_len, "value {v}");
            let bytes = enc.encoded().to_vec();
            let mut dec = DecodeIterator::new(&bytes);
            assert_eq!(decode_int(&mut dec).unwrap(), Some(v));
        }
    }

    #[test]
    fn test_uint_minimization() {
        for (v, want_len) in [(0u64, 1usize), (255, 1), (256, 2), (u64::MAX, 8)] {
            let mut buf = [0u8; 16];
            let mut enc = EncodeIterator::new(&mut buf);
            encode_uint(&mut enc, v).unwrap();
            assert_eq!(enc.encoded_len(), want_len);
            let bytes = enc.encoded().to_vec();
            let mut dec = DecodeIterator::new(&bytes);
            assert_eq!(decode_uint(&mut dec).unwrap(), Some(v));
        }
    }

    #[test]
    fn test_real_wire_layout() {
        // 654.23 as mantissa 65423 with exponent -2
        let r = Real::new(RealHint::ExponentNeg2, 65423);
        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_real(&mut enc, &r).unwrap();
        assert_eq!(enc.encoded(), &[0x0C, 0x00, 0xFF, 0x8F]);

        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        let got = decode_real(&mut dec).unwrap().unwrap();
        assert_eq!(got, r);
        assert!((got.to_f64().unwrap() - 654.23).abs() < 1e-9);
    }

    #[test]
    fn test_real_blank_and_specials() {
        let mut buf = [0u8; 4];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_real(&mut enc, &Real::BLANK).unwrap();
        assert_eq!(enc.encoded(), &[0x1F]);
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        assert_eq!(decode_real(&mut dec).unwrap(), None);

        for (hint, byte) in [
            (RealHint::Infinity, 0x80u8),
            (RealHint::NegInfinity, 0x81),
            (RealHint::NotANumber, 0x82),
        ] {
            let mut buf = [0u8; 4];
            let mut enc = EncodeIterator::new(&mut buf);
            encode_real(&mut enc, &Real::new(hint, 0)).unwrap();
            assert_eq!(enc.encoded(), &[byte]);
            let bytes = enc.encoded().to_vec();
            let mut dec = DecodeIterator::new(&bytes);
            assert_eq!(decode_real(&mut dec).unwrap(), Some(Real::new(hint, 0)));
        }

        // zero-length data is also blank
        let mut dec = DecodeIterator::new(&[]);
        assert_eq!(decode_real(&mut dec).unwrap(), None);
    }

    #[test]
    fn test_date_truncation() {
        let full = Date { year: 2026, month: 8, day: 1 };
        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_date(&mut enc, &full).unwrap();
        assert_eq!(enc.encoded(), &[1, 8, 0x07, 0xEA]);

        let no_year = Date { year: 0, month: 8, day: 1 };
        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_date(&mut enc, &no_year).unwrap();
        assert_eq!(enc.encoded_len(), 2);
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        assert_eq!(decode_date(&mut dec).unwrap(), Some(no_year));

        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_date(&mut enc, &Date::BLANK).unwrap();
        assert_eq!(enc.encoded_len(), 0);
        let mut dec = DecodeIterator::new(&[]);
        assert_eq!(decode_date(&mut dec).unwrap(), None);
    }

    #[test]
    fn test_time_truncation_lengths() {
        let cases = [
            (Time { hour: 13, minute: 5, ..Time::default() }, 2),
            (Time { hour: 13, minute: 5, second: 59, ..Time::default() }, 3),
            (Time { hour: 13, minute: 5, second: 0, millisecond: 250, ..Time::default() }, 5),
            (Time { hour: 1, minute: 2, second: 3, millisecond: 4, microsecond: 5, nanosecond: 0 }, 7),
            (Time { hour: 1, minute: 2, second: 3, millisecond: 4, microsecond: 5, nanosecond: 6 }, 9),
        ];
        for (t, want_len) in cases {
            let mut buf = [0u8; 16];
            let mut enc = EncodeIterator::new(&mut buf);
            encode_time(&mut enc, &t).unwrap();
            assert_eq!(enc.encoded_len(), want_len);
            let bytes = enc.encoded().to_vec();
            let mut dec = DecodeIterator::new(&bytes);
            assert_eq!(decode_time(&mut dec).unwrap(), Some(t));
        }
        // blank round trip
        let mut buf = [0u8; 16];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_time(&mut enc, &Time::BLANK).unwrap();
        assert_eq!(enc.encoded_len(), 0);
        let mut dec = DecodeIterator::new(&[]);
        assert_eq!(decode_time(&mut dec).unwrap(), None);
    }

    #[test]
    fn test_datetime_blank_time_round_trip() {
        let v = DateTime {
            date: Date { year: 2026, month: 8, day: 1 },
            time: Time::BLANK,
        };
        let mut buf = [0u8; 16];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_datetime(&mut enc, &v).unwrap();
        assert_eq!(enc.encoded_len(), 4);
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        assert_eq!(decode_datetime(&mut dec).unwrap(), Some(v));

        let midnight = DateTime {
            date: Date { year: 2026, month: 8, day: 1 },
            time: Time::default(),
        };
        let mut buf = [0u8; 16];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_datetime(&mut enc, &midnight).unwrap();
        assert_eq!(enc.encoded_len(), 6);
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        assert_eq!(decode_datetime(&mut dec).unwrap(), Some(midnight));
    }

    #[test]
    fn test_qos_info_fields() {
        let q = Qos {
            timeliness: QosTimeliness::DelayedByInfo,
            rate: QosRate::TimeConflated,
            dynamic: true,
            time_info: 1500,
            rate_info: 100,
        };
        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_qos(&mut enc, &q).unwrap();
        assert_eq!(enc.encoded_len(), 5);
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        assert_eq!(decode_qos(&mut dec).unwrap(), Some(q));

        let plain = Qos::realtime_tick_by_tick();
        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_qos(&mut enc, &plain).unwrap();
        assert_eq!(enc.encoded_len(), 1);
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        assert_eq!(decode_qos(&mut dec).unwrap(), Some(plain));
    }

    #[test]
    fn test_state_round_trip() {
        let st = State {
            stream_state: StreamState::ClosedRecover,
            data_state: DataState::Suspect,
            code: crate::types::STATE_CODE_TIMEOUT,
            text: b"source unreachable",
        };
        let mut buf = [0u8; 64];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_state(&mut enc, &st).unwrap();
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        let got = decode_state(&mut dec).unwrap().unwrap();
        assert_eq!(got.stream_state, StreamState::ClosedRecover);
        assert_eq!(got.data_state, DataState::Suspect);
        assert_eq!(got.text, b"source unreachable");
    }

    #[test]
    fn test_generic_dispatch_matches_specific() {
        let vals = [
            PrimitiveValue::Int(-42),
            PrimitiveValue::UInt(900_000),
            PrimitiveValue::Float(1.5),
            PrimitiveValue::Double(-2.25),
            PrimitiveValue::Enum(730),
            PrimitiveValue::Buffer(b"TRI.N"),
        ];
        for v in vals {
            assert_eq!(round_trip(&v).unwrap(), v);
        }
    }

    #[test]
    fn test_fixed_width_int_padding() {
        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_primitive_fixed(&mut enc, &PrimitiveValue::Int(-2), 4).unwrap();
        assert_eq!(enc.encoded(), &[0xFF, 0xFF, 0xFF, 0xFE]);
        let bytes = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&bytes);
        assert_eq!(decode_int(&mut dec).unwrap(), Some(-2));

        let mut buf = [0u8; 8];
        let mut enc = EncodeIterator::new(&mut buf);
        encode_primitive_fixed(&mut enc, &PrimitiveValue::UInt(7), 2).unwrap();
        assert_eq!(enc.encoded(), &[0x00, 0x07]);
    }
}
