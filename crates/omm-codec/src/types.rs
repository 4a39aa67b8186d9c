// types.rs — primitive value records and the wire data-type enumeration
//
// These are the abstract value contracts of the wire format: what a Real,
// Date, Time, Qos or State *is*, independent of how the codec lays it out
// in bytes. The byte layouts live in primitive.rs.

use crate::error::{CodecError, CodecResult};

// ============================================================
// Data types
// ============================================================

/// Wire data-type enumeration. Values 0..64 are primitives, 128 and up are
/// containers. The gap is reserved for set-defined primitive variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DataType {
    #[default]
    Unknown = 0,
    Int = 3,
    UInt = 4,
    Float = 5,
    Double = 6,
    Real = 8,
    Date = 9,
    Time = 10,
    DateTime = 11,
    Qos = 12,
    State = 13,
    Enum = 14,
    Array = 15,
    Buffer = 16,
    AsciiString = 17,
    Utf8String = 18,
    RmtesString = 19,
    NoData = 128,
    Opaque = 130,
    Xml = 131,
    FieldList = 132,
    ElementList = 133,
    AnsiPage = 134,
    FilterList = 135,
    Vector = 136,
    Map = 137,
    Series = 138,
    Msg = 141,
    Json = 142,
}

impl DataType {
    pub fn from_u8(v: u8) -> CodecResult<DataType> {
        Ok(match v {
            0 => DataType::Unknown,
            3 => DataType::Int,
            4 => DataType::UInt,
            5 => DataType::Float,
            6 => DataType::Double,
            8 => DataType::Real,
            9 => DataType::Date,
            10 => DataType::Time,
            11 => DataType::DateTime,
            12 => DataType::Qos,
            13 => DataType::State,
            14 => DataType::Enum,
            15 => DataType::Array,
            16 => DataType::Buffer,
            17 => DataType::AsciiString,
            18 => DataType::Utf8String,
            19 => DataType::RmtesString,
            128 => DataType::NoData,
            130 => DataType::Opaque,
            131 => DataType::Xml,
            132 => DataType::FieldList,
            133 => DataType::ElementList,
            134 => DataType::AnsiPage,
            135 => DataType::FilterList,
            136 => DataType::Vector,
            137 => DataType::Map,
            138 => DataType::Series,
            141 => DataType::Msg,
            142 => DataType::Json,
            other => return Err(CodecError::UnsupportedDataType(other)),
        })
    }

    /// True for types an Array item or a container key may carry.
    pub fn is_primitive(self) -> bool {
        (self as u8) < 64 && self != DataType::Unknown && self != DataType::Array
    }

    /// True for the uniform/keyed container types.
    pub fn is_container(self) -> bool {
        (self as u8) >= 128 || self == DataType::Array
    }
}

// ============================================================
// Real
// ============================================================

/// Scaling hint for a Real. Discriminants are the wire hint values;
/// hint 14 is exponent 0, so `value * 10^(hint - 14)` for the decimal
/// range and `value / 2^(hint - 22)` for the fractional range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RealHint {
    ExponentNeg14 = 0,
    ExponentNeg13 = 1,
    ExponentNeg12 = 2,
    ExponentNeg11 = 3,
    ExponentNeg10 = 4,
    ExponentNeg9 = 5,
    ExponentNeg8 = 6,
    ExponentNeg7 = 7,
    ExponentNeg6 = 8,
    ExponentNeg5 = 9,
    ExponentNeg4 = 10,
    ExponentNeg3 = 11,
    ExponentNeg2 = 12,
    ExponentNeg1 = 13,
    Exponent0 = 14,
    Exponent1 = 15,
    Exponent2 = 16,
    Exponent3 = 17,
    Exponent4 = 18,
    Exponent5 = 19,
    Exponent6 = 20,
    Exponent7 = 21,
    /// Denominator 1 (whole numbers).
    Fraction1 = 22,
    Fraction2 = 23,
    Fraction4 = 24,
    Fraction8 = 25,
    Fraction16 = 26,
    Fraction32 = 27,
    Fraction64 = 28,
    Fraction128 = 29,
    Fraction256 = 30,
    Blank = 31,
    Infinity = 33,
    NegInfinity = 34,
    NotANumber = 35,
}

impl RealHint {
    pub fn from_u8(v: u8) -> CodecResult<RealHint> {
        Ok(match v {
            0 => RealHint::ExponentNeg14,
            1 => RealHint::ExponentNeg13,
            2 => RealHint::ExponentNeg12,
            3 => RealHint::ExponentNeg11,
            4 => RealHint::ExponentNeg10,
            5 => RealHint::ExponentNeg9,
            6 => RealHint::ExponentNeg8,
            7 => RealHint::ExponentNeg7,
            8 => RealHint::ExponentNeg6,
            9 => RealHint::ExponentNeg5,
            10 => RealHint::ExponentNeg4,
            11 => RealHint::ExponentNeg3,
            12 => RealHint::ExponentNeg2,
            13 => RealHint::ExponentNeg1,
            14 => RealHint::Exponent0,
            15 => RealHint::Exponent1,
            16 => RealHint::Exponent2,
            17 => RealHint::Exponent3,
            18 => RealHint::Exponent4,
            19 => RealHint::Exponent5,
            20 => RealHint::Exponent6,
            21 => RealHint::Exponent7,
            22 => RealHint::Fraction1,
            23 => RealHint::Fraction2,
            24 => RealHint::Fraction4,
            25 => RealHint::Fraction8,
            26 => RealHint::Fraction16,
            27 => RealHint::Fraction32,
            28 => RealHint::Fraction64,
            29 => RealHint::Fraction128,
            30 => RealHint::Fraction256,
            31 => RealHint::Blank,
            33 => RealHint::Infinity,
            34 => RealHint::NegInfinity,
            35 => RealHint::NotANumber,
            _ => return Err(CodecError::InvalidData("bad real hint")),
        })
    }

    /// True for infinity / negative infinity / NaN.
    pub fn is_special(self) -> bool {
        matches!(
            self,
            RealHint::Infinity | RealHint::NegInfinity | RealHint::NotANumber
        )
    }
}

/// Decimal or binary-fraction scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Real {
    pub hint: RealHint,
    pub value: i64,
}

impl Real {
    pub const BLANK: Real = Real { hint: RealHint::Blank, value: 0 };

    pub fn new(hint: RealHint, value: i64) -> Real {
        Real { hint, value }
    }

    pub fn is_blank(&self) -> bool {
        self.hint == RealHint::Blank
    }

    /// Expand to a floating-point value. Blank yields None.
    pub fn to_f64(&self) -> Option<f64> {
        let h = self.hint as u8;
        match self.hint {
            RealHint::Blank => None,
            RealHint::Infinity => Some(f64::INFINITY),
            RealHint::NegInfinity => Some(f64::NEG_INFINITY),
            RealHint::NotANumber => Some(f64::NAN),
            _ if h < RealHint::Fraction1 as u8 => {
                Some(self.value as f64 * 10f64.powi(h as i32 - 14))
            }
            _ => Some(self.value as f64 / 2f64.powi(h as i32 - 22)),
        }
    }
}

impl Default for Real {
    fn default() -> Real {
        Real { hint: RealHint::Exponent0, value: 0 }
    }
}

// ============================================================
// Date / Time / DateTime
// ============================================================

/// Calendar date. Any field equal to zero is individually blank; the
/// all-zero date is the blank date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Date {
    pub const BLANK: Date = Date { year: 0, month: 0, day: 0 };

    pub fn is_blank(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }
}

/// Time of day down to nanoseconds. The 255/65535 sentinels mark the
/// blank time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
    pub microsecond: u16,
    pub nanosecond: u16,
}

impl Time {
    pub const BLANK: Time = Time {
        hour: 255,
        minute: 255,
        second: 255,
        millisecond: 65535,
        microsecond: 65535,
        nanosecond: 65535,
    };

    pub fn is_blank(&self) -> bool {
        *self == Time::BLANK
    }
}

impl Default for Time {
    fn default() -> Time {
        Time { hour: 0, minute: 0, second: 0, millisecond: 0, microsecond: 0, nanosecond: 0 }
    }
}

/// Combined date and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
}

impl DateTime {
    pub const BLANK: DateTime = DateTime { date: Date::BLANK, time: Time::BLANK };

    pub fn is_blank(&self) -> bool {
        self.date.is_blank() && self.time.is_blank()
    }
}

// ============================================================
// Qos
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum QosTimeliness {
    #[default]
    Unspecified = 0,
    /// No delay.
    Realtime = 1,
    /// Delayed by an unknown amount.
    DelayedUnknown = 2,
    /// Delayed by `time_info` milliseconds.
    DelayedByInfo = 3,
}

impl QosTimeliness {
    pub fn from_u8(v: u8) -> CodecResult<QosTimeliness> {
        Ok(match v {
            0 => QosTimeliness::Unspecified,
            1 => QosTimeliness::Realtime,
            2 => QosTimeliness::DelayedUnknown,
            3 => QosTimeliness::DelayedByInfo,
            _ => return Err(CodecError::InvalidData("bad qos timeliness")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum QosRate {
    #[default]
    Unspecified = 0,
    /// Every tick is delivered.
    TickByTick = 1,
    /// Conflated only under load.
    JitConflated = 2,
    /// Conflated on a `rate_info`-millisecond interval.
    TimeConflated = 3,
}

impl QosRate {
    pub fn from_u8(v: u8) -> CodecResult<QosRate> {
        Ok(match v {
            0 => QosRate::Unspecified,
            1 => QosRate::TickByTick,
            2 => QosRate::JitConflated,
            3 => QosRate::TimeConflated,
            _ => return Err(CodecError::InvalidData("bad qos rate")),
        })
    }
}

/// Quality of service for a stream: how timely and how conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qos {
    pub timeliness: QosTimeliness,
    pub rate: QosRate,
    /// Set when the provider may change the QoS over the stream's life.
    pub dynamic: bool,
    /// Delay in milliseconds when timeliness is DelayedByInfo.
    pub time_info: u16,
    /// Conflation interval in milliseconds when rate is TimeConflated.
    pub rate_info: u16,
}

impl Qos {
    pub fn realtime_tick_by_tick() -> Qos {
        Qos {
            timeliness: QosTimeliness::Realtime,
            rate: QosRate::TickByTick,
            ..Qos::default()
        }
    }

    /// Strict-better ordering on a single axis pair: lower timeliness
    /// enum and lower rate enum are better (realtime beats delayed,
    /// tick-by-tick beats conflated), with info values breaking ties.
    pub fn is_better_than(&self, other: &Qos) -> bool {
        if self.timeliness != other.timeliness {
            return self.timeliness < other.timeliness;
        }
        if self.timeliness == QosTimeliness::DelayedByInfo && self.time_info != other.time_info {
            return self.time_info < other.time_info;
        }
        if self.rate != other.rate {
            return self.rate < other.rate;
        }
        if self.rate == QosRate::TimeConflated && self.rate_info != other.rate_info {
            return self.rate_info < other.rate_info;
        }
        false
    }

    /// True when `self` falls inside the range [best, worst] that a
    /// request expresses via its qos/worstQos pair.
    pub fn is_in_range(&self, best: &Qos, worst: &Qos) -> bool {
        !self.is_better_than(best) && !worst.is_better_than(self)
    }
}

// ============================================================
// State
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum StreamState {
    #[default]
    Unspecified = 0,
    Open = 1,
    NonStreaming = 2,
    ClosedRecover = 3,
    Closed = 4,
    ClosedRedirected = 5,
}

impl StreamState {
    pub fn from_u8(v: u8) -> CodecResult<StreamState> {
        Ok(match v {
            0 => StreamState::Unspecified,
            1 => StreamState::Open,
            2 => StreamState::NonStreaming,
            3 => StreamState::ClosedRecover,
            4 => StreamState::Closed,
            5 => StreamState::ClosedRedirected,
            _ => return Err(CodecError::InvalidData("bad stream state")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DataState {
    NoChange = 0,
    #[default]
    Ok = 1,
    Suspect = 2,
}

impl DataState {
    pub fn from_u8(v: u8) -> CodecResult<DataState> {
        Ok(match v {
            0 => DataState::NoChange,
            1 => DataState::Ok,
            2 => DataState::Suspect,
            _ => return Err(CodecError::InvalidData("bad data state")),
        })
    }
}

// Well-known state codes. The code byte is an open namespace; these are
// the values the message layer itself produces.
pub const STATE_CODE_NONE: u8 = 0;
pub const STATE_CODE_NOT_FOUND: u8 = 5;
pub const STATE_CODE_TIMEOUT: u8 = 6;
pub const STATE_CODE_NOT_ENTITLED: u8 = 7;
pub const STATE_CODE_TOO_MANY_ITEMS: u8 = 13;

/// Stream and data health, with an optional human-readable text.
/// Decoded states borrow their text from the wire buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct State<'a> {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub code: u8,
    pub text: &'a [u8],
}

// ============================================================
// Generic primitive value
// ============================================================

/// A primitive value paired with its type, used by the generic
/// encode/decode dispatch and by Array entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveValue<'a> {
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Real(Real),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
    Enum(u16),
    Qos(Qos),
    State(State<'a>),
    /// Buffer, AsciiString, Utf8String and RmtesString payloads.
    Buffer(&'a [u8]),
}

impl<'a> PrimitiveValue<'a> {
    pub fn data_type(&self) -> DataType {
        match self {
            PrimitiveValue::Int(_) => DataType::Int,
            PrimitiveValue::UInt(_) => DataType::UInt,
            PrimitiveValue::Float(_) => DataType::Float,
            PrimitiveValue::Double(_) => DataType::Double,
            PrimitiveValue::Real(_) => DataType::Real,
            PrimitiveValue::Date(_) => DataType::Date,
            PrimitiveValue::Time(_) => DataType::Time,
            PrimitiveValue::DateTime(_) => DataType::DateTime,
            PrimitiveValue::Enum(_) => DataType::Enum,
            PrimitiveValue::Qos(_) => DataType::Qos,
            PrimitiveValue::State(_) => DataType::State,
            PrimitiveValue::Buffer(_) => DataType::Buffer,
        }
    }
}

// ============================================================
// Domain types
// ============================================================

// Message-model domains carried in the common message header.
pub const DOMAIN_LOGIN: u8 = 1;
pub const DOMAIN_SOURCE: u8 = 4;
pub const DOMAIN_DICTIONARY: u8 = 5;
pub const DOMAIN_MARKET_PRICE: u8 = 6;
pub const DOMAIN_MARKET_BY_ORDER: u8 = 7;
pub const DOMAIN_MARKET_BY_PRICE: u8 = 8;
pub const DOMAIN_SYMBOL_LIST: u8 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_round_trip() {
        for dt in [
            DataType::Int,
            DataType::Real,
            DataType::AsciiString,
            DataType::FieldList,
            DataType::Map,
            DataType::Msg,
        ] {
            assert_eq!(DataType::from_u8(dt as u8).unwrap(), dt);
        }
        assert!(DataType::from_u8(200).is_err());
    }

    #[test]
    fn test_primitive_container_split() {
        assert!(DataType::Qos.is_primitive());
        assert!(!DataType::Qos.is_container());
        assert!(DataType::Series.is_container());
        assert!(!DataType::Series.is_primitive());
        assert!(!DataType::Unknown.is_primitive());
    }

    #[test]
    fn test_real_to_f64() {
        let r = Real::new(RealHint::ExponentNeg2, 65423);
        assert!((r.to_f64().unwrap() - 654.23).abs() < 1e-9);

        let whole = Real::new(RealHint::Exponent0, 42);
        assert_eq!(whole.to_f64().unwrap(), 42.0);

        let frac = Real::new(RealHint::Fraction32, 96);
        assert_eq!(frac.to_f64().unwrap(), 3.0);

        assert!(Real::BLANK.to_f64().is_none());
        assert_eq!(
            Real::new(RealHint::Infinity, 0).to_f64().unwrap(),
            f64::INFINITY
        );
        assert!(Real::new(RealHint::NotANumber, 0).to_f64().unwrap().is_nan());
    }

    #[test]
    fn test_blank_sentinels() {
        assert!(Date::BLANK.is_blank());
        assert!(Time::BLANK.is_blank());
        assert!(!Time::default().is_blank());
        assert!(DateTime::BLANK.is_blank());
    }

    #[test]
    fn test_qos_ordering() {
        let rt = Qos::realtime_tick_by_tick();
        let delayed = Qos {
            timeliness: QosTimeliness::DelayedByInfo,
            rate: QosRate::TickByTick,
            time_info: 15,
            ..Qos::default()
        };
        assert!(rt.is_better_than(&delayed));
        assert!(!delayed.is_better_than(&rt));

        let worst = Qos {
            timeliness: QosTimeliness::DelayedByInfo,
            rate: QosRate::JitConflated,
            time_info: 65535,
            ..Qos::default()
        };
        assert!(delayed.is_in_range(&rt, &worst));
        assert!(rt.is_in_range(&rt, &worst));
        assert!(!rt.is_better_than(&rt));
    }
}
