// msg.rs — message codec
//
// Eight message classes share one wire header: class, domain, stream
// id, payload container type and a class-specific flag word, followed
// by class fields, the optional message key, the optional extended
// header, and the payload running to the end of the enclosing extent.
//
// Encoding is one-shot when attrib, extended header and payload are all
// pre-encoded; otherwise encode_msg_init interrupts at the points where
// the caller must encode the key attrib or extended header in place.

use bitflags::bitflags;

use crate::container::remaining_hint;
use crate::error::{CodecError, CodecResult, MsgInitNext};
use crate::iter::{DecodeIterator, EncodeIterator, MsgStage, Reserved};
use crate::primitive::{encode_qos, encode_state};
use crate::types::{DataType, Qos, State};

/// Message class discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgClass {
    Request = 1,
    Refresh = 2,
    Status = 3,
    Update = 4,
    Close = 5,
    Ack = 6,
    Generic = 7,
    Post = 8,
}

impl MsgClass {
    pub fn from_u8(v: u8) -> CodecResult<MsgClass> {
        Ok(match v {
            1 => MsgClass::Request,
            2 => MsgClass::Refresh,
            3 => MsgClass::Status,
            4 => MsgClass::Update,
            5 => MsgClass::Close,
            6 => MsgClass::Ack,
            7 => MsgClass::Generic,
            8 => MsgClass::Post,
            _ => return Err(CodecError::InvalidData("bad message class")),
        })
    }
}

// ============================================================
// Message key
// ============================================================

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MsgKeyFlags: u16 {
        const HAS_SERVICE_ID = 0x01;
        const HAS_NAME       = 0x02;
        const HAS_NAME_TYPE  = 0x04;
        const HAS_FILTER     = 0x08;
        const HAS_IDENTIFIER = 0x10;
        const HAS_ATTRIB     = 0x20;
    }
}

/// Identifies the item a stream carries: service, name, and optional
/// attrib payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgKey<'a> {
    pub flags: MsgKeyFlags,
    pub service_id: u16,
    pub name: &'a [u8],
    pub name_type: u8,
    pub filter: u32,
    pub identifier: i32,
    pub attrib_container_type: DataType,
    /// Pre-encoded attrib on encode; the decoded attrib extent on
    /// decode. Empty with HAS_ATTRIB set means "encode attrib in
    /// place".
    pub enc_attrib: &'a [u8],
}

impl<'a> MsgKey<'a> {
    /// Field-by-field comparison of everything both keys declare; used
    /// by stream tables to match responses to requests.
    pub fn matches(&self, other: &MsgKey) -> bool {
        if self.flags & !MsgKeyFlags::HAS_ATTRIB != other.flags & !MsgKeyFlags::HAS_ATTRIB {
            return false;
        }
        if self.flags.contains(MsgKeyFlags::HAS_SERVICE_ID) && self.service_id != other.service_id {
            return false;
        }
        if self.flags.contains(MsgKeyFlags::HAS_NAME) && self.name != other.name {
            return false;
        }
        if self.flags.contains(MsgKeyFlags::HAS_NAME_TYPE) && self.name_type != other.name_type {
            return false;
        }
        if self.flags.contains(MsgKeyFlags::HAS_FILTER) && self.filter != other.filter {
            return false;
        }
        if self.flags.contains(MsgKeyFlags::HAS_IDENTIFIER) && self.identifier != other.identifier
        {
            return false;
        }
        true
    }
}

// ============================================================
// Per-class flags
// ============================================================

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RequestFlags: u16 {
        const HAS_EXTENDED_HEADER   = 0x0001;
        const HAS_PRIORITY          = 0x0002;
        const STREAMING             = 0x0004;
        const MSG_KEY_IN_UPDATES    = 0x0008;
        const CONF_INFO_IN_UPDATES  = 0x0010;
        const NO_REFRESH            = 0x0020;
        const HAS_QOS               = 0x0040;
        const HAS_WORST_QOS         = 0x0080;
        const PRIVATE_STREAM        = 0x0100;
        const PAUSE                 = 0x0200;
        const HAS_VIEW              = 0x0400;
        const HAS_BATCH             = 0x0800;
        const QUALIFIED_STREAM      = 0x1000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RefreshFlags: u16 {
        const HAS_EXTENDED_HEADER = 0x0001;
        const HAS_PERM_DATA       = 0x0002;
        const HAS_MSG_KEY         = 0x0008;
        const HAS_SEQ_NUM         = 0x0010;
        const SOLICITED           = 0x0020;
        const REFRESH_COMPLETE    = 0x0040;
        const HAS_QOS             = 0x0080;
        const CLEAR_CACHE         = 0x0100;
        const DO_NOT_CACHE        = 0x0200;
        const PRIVATE_STREAM      = 0x0400;
        const HAS_POST_USER_INFO  = 0x0800;
        const HAS_PART_NUM        = 0x1000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct UpdateFlags: u16 {
        const HAS_EXTENDED_HEADER = 0x0001;
        const HAS_PERM_DATA       = 0x0002;
        const HAS_MSG_KEY         = 0x0008;
        const HAS_SEQ_NUM         = 0x0010;
        const HAS_CONF_INFO       = 0x0020;
        const DO_NOT_CACHE        = 0x0040;
        const DO_NOT_CONFLATE     = 0x0080;
        const DO_NOT_RIPPLE       = 0x0100;
        const HAS_POST_USER_INFO  = 0x0200;
        const DISCARDABLE         = 0x0400;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StatusFlags: u16 {
        const HAS_EXTENDED_HEADER = 0x0001;
        const HAS_PERM_DATA       = 0x0002;
        const HAS_MSG_KEY         = 0x0008;
        const HAS_GROUP_ID        = 0x0010;
        const HAS_STATE           = 0x0020;
        const CLEAR_CACHE         = 0x0040;
        const PRIVATE_STREAM      = 0x0080;
        const HAS_POST_USER_INFO  = 0x0100;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CloseFlags: u16 {
        const HAS_EXTENDED_HEADER = 0x0001;
        const ACK                 = 0x0002;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AckFlags: u16 {
        const HAS_EXTENDED_HEADER = 0x0001;
        const HAS_TEXT            = 0x0002;
        const PRIVATE_STREAM      = 0x0004;
        const HAS_SEQ_NUM         = 0x0008;
        const HAS_MSG_KEY         = 0x0010;
        const HAS_NAK_CODE        = 0x0020;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct GenericFlags: u16 {
        const HAS_EXTENDED_HEADER    = 0x0001;
        const HAS_PERM_DATA          = 0x0002;
        const HAS_MSG_KEY            = 0x0004;
        const HAS_SEQ_NUM            = 0x0008;
        const MESSAGE_COMPLETE       = 0x0010;
        const HAS_SECONDARY_SEQ_NUM  = 0x0020;
        const HAS_PART_NUM           = 0x0040;
        const PROVIDER_DRIVEN        = 0x4000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PostFlags: u16 {
        const HAS_EXTENDED_HEADER   = 0x0001;
        const HAS_POST_ID           = 0x0002;
        const HAS_MSG_KEY           = 0x0004;
        const HAS_SEQ_NUM           = 0x0008;
        const POST_COMPLETE         = 0x0010;
        const ACK                   = 0x0020;
        const HAS_PERM_DATA         = 0x0040;
        const HAS_PART_NUM          = 0x0080;
        const HAS_POST_USER_RIGHTS  = 0x0100;
    }
}

// Ack nak codes.
pub const NAK_CODE_NONE: u8 = 0;
pub const NAK_CODE_ACCESS_DENIED: u8 = 1;
pub const NAK_CODE_DENIED_BY_SRC: u8 = 2;
pub const NAK_CODE_SOURCE_DOWN: u8 = 3;
pub const NAK_CODE_SOURCE_UNKNOWN: u8 = 4;
pub const NAK_CODE_NO_RESOURCES: u8 = 5;
pub const NAK_CODE_NO_RESPONSE: u8 = 6;
pub const NAK_CODE_GATEWAY_DOWN: u8 = 7;
pub const NAK_CODE_SYMBOL_UNKNOWN: u8 = 10;
pub const NAK_CODE_NOT_OPEN: u8 = 11;
pub const NAK_CODE_INVALID_CONTENT: u8 = 12;

/// Stream priority: class orders streams, count weighs within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub class: u8,
    pub count: u16,
}

impl Default for Priority {
    fn default() -> Priority {
        Priority { class: 1, count: 1 }
    }
}

/// Identifies the poster of Post-sourced content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostUserInfo {
    pub addr: u32,
    pub id: u32,
}

// ============================================================
// Message records
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: RequestFlags,
    pub priority: Priority,
    pub qos: Qos,
    pub worst_qos: Qos,
    pub msg_key: MsgKey<'a>,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: RefreshFlags,
    pub seq_num: u32,
    pub state: State<'a>,
    pub group_id: &'a [u8],
    pub perm_data: &'a [u8],
    pub qos: Qos,
    pub post_user_info: PostUserInfo,
    pub part_num: u16,
    pub msg_key: MsgKey<'a>,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: UpdateFlags,
    pub update_type: u8,
    pub seq_num: u32,
    pub conflation_count: u16,
    pub conflation_time: u16,
    pub perm_data: &'a [u8],
    pub post_user_info: PostUserInfo,
    pub msg_key: MsgKey<'a>,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: StatusFlags,
    pub state: State<'a>,
    pub group_id: &'a [u8],
    pub perm_data: &'a [u8],
    pub post_user_info: PostUserInfo,
    pub msg_key: MsgKey<'a>,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CloseMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: CloseFlags,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AckMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: AckFlags,
    pub ack_id: u32,
    pub nak_code: u8,
    pub seq_num: u32,
    pub text: &'a [u8],
    pub msg_key: MsgKey<'a>,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: GenericFlags,
    pub seq_num: u32,
    pub secondary_seq_num: u32,
    pub part_num: u16,
    pub perm_data: &'a [u8],
    pub msg_key: MsgKey<'a>,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostMsg<'a> {
    pub stream_id: i32,
    pub domain_type: u8,
    pub container_type: DataType,
    pub flags: PostFlags,
    pub post_user_info: PostUserInfo,
    pub seq_num: u32,
    pub post_id: u32,
    pub part_num: u16,
    pub post_user_rights: u16,
    pub perm_data: &'a [u8],
    pub msg_key: MsgKey<'a>,
    pub extended_header: &'a [u8],
    pub enc_data: &'a [u8],
}

/// A decoded (or to-be-encoded) message of any class.
#[derive(Debug, Clone, Copy)]
pub enum Msg<'a> {
    Request(RequestMsg<'a>),
    Refresh(RefreshMsg<'a>),
    Status(StatusMsg<'a>),
    Update(UpdateMsg<'a>),
    Close(CloseMsg<'a>),
    Ack(AckMsg<'a>),
    Generic(GenericMsg<'a>),
    Post(PostMsg<'a>),
}

impl<'a> Msg<'a> {
    pub fn msg_class(&self) -> MsgClass {
        match self {
            Msg::Request(_) => MsgClass::Request,
            Msg::Refresh(_) => MsgClass::Refresh,
            Msg::Status(_) => MsgClass::Status,
            Msg::Update(_) => MsgClass::Update,
            Msg::Close(_) => MsgClass::Close,
            Msg::Ack(_) => MsgClass::Ack,
            Msg::Generic(_) => MsgClass::Generic,
            Msg::Post(_) => MsgClass::Post,
        }
    }

    pub fn stream_id(&self) -> i32 {
        match self {
            Msg::Request(m) => m.stream_id,
            Msg::Refresh(m) => m.stream_id,
            Msg::Status(m) => m.stream_id,
            Msg::Update(m) => m.stream_id,
            Msg::Close(m) => m.stream_id,
            Msg::Ack(m) => m.stream_id,
            Msg::Generic(m) => m.stream_id,
            Msg::Post(m) => m.stream_id,
        }
    }

    pub fn container_type(&self) -> DataType {
        match self {
            Msg::Request(m) => m.container_type,
            Msg::Refresh(m) => m.container_type,
            Msg::Status(m) => m.container_type,
            Msg::Update(m) => m.container_type,
            Msg::Close(m) => m.container_type,
            Msg::Ack(m) => m.container_type,
            Msg::Generic(m) => m.container_type,
            Msg::Post(m) => m.container_type,
        }
    }

    pub fn enc_data(&self) -> &'a [u8] {
        match self {
            Msg::Request(m) => m.enc_data,
            Msg::Refresh(m) => m.enc_data,
            Msg::Status(m) => m.enc_data,
            Msg::Update(m) => m.enc_data,
            Msg::Close(m) => m.enc_data,
            Msg::Ack(m) => m.enc_data,
            Msg::Generic(m) => m.enc_data,
            Msg::Post(m) => m.enc_data,
        }
    }

    /// The message key, for classes that carry one.
    pub fn msg_key(&self) -> Option<&MsgKey<'a>> {
        match self {
            Msg::Request(m) => Some(&m.msg_key),
            Msg::Refresh(m) if m.flags.contains(RefreshFlags::HAS_MSG_KEY) => Some(&m.msg_key),
            Msg::Status(m) if m.flags.contains(StatusFlags::HAS_MSG_KEY) => Some(&m.msg_key),
            Msg::Update(m) if m.flags.contains(UpdateFlags::HAS_MSG_KEY) => Some(&m.msg_key),
            Msg::Ack(m) if m.flags.contains(AckFlags::HAS_MSG_KEY) => Some(&m.msg_key),
            Msg::Generic(m) if m.flags.contains(GenericFlags::HAS_MSG_KEY) => Some(&m.msg_key),
            Msg::Post(m) if m.flags.contains(PostFlags::HAS_MSG_KEY) => Some(&m.msg_key),
            _ => None,
        }
    }
}

// ============================================================
// Encode
// ============================================================

fn put_prefixed_qos(iter: &mut EncodeIterator, qos: &Qos) -> CodecResult<()> {
    let res = iter.reserve(remaining_hint(iter))?;
    encode_qos(iter, qos)?;
    iter.patch(res)
}

fn put_prefixed_state(iter: &mut EncodeIterator, state: &State) -> CodecResult<()> {
    let res = iter.reserve(remaining_hint(iter))?;
    encode_state(iter, state)?;
    iter.patch(res)
}

enum KeyOutcome {
    Done,
    NeedAttrib,
}

/// Write the rb-prefixed key blob. With HAS_ATTRIB and no pre-encoded
/// attrib, both the key and attrib prefixes are left reserved on the
/// message frame for encode_msg_key_attrib_complete to patch.
fn put_msg_key(iter: &mut EncodeIterator, key: &MsgKey) -> CodecResult<KeyOutcome> {
    let key_res = iter.reserve(remaining_hint(iter))?;
    iter.put_rb(u32::from(key.flags.bits()))?;
    if key.flags.contains(MsgKeyFlags::HAS_SERVICE_ID) {
        iter.put_rb(u32::from(key.service_id))?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_NAME) {
        iter.put_rb_slice(key.name)?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_NAME_TYPE) {
        iter.put_u8(key.name_type)?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_FILTER) {
        iter.put_u32(key.filter)?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_IDENTIFIER) {
        iter.put_i32(key.identifier)?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_ATTRIB) {
        iter.put_u8(key.attrib_container_type as u8)?;
        if key.enc_attrib.is_empty() {
            let attrib_res = iter.reserve(remaining_hint(iter))?;
            let lvl = iter.level_mut()?;
            lvl.key_res = key_res;
            lvl.attrib_res = attrib_res;
            return Ok(KeyOutcome::NeedAttrib);
        }
        iter.put_rb_slice(key.enc_attrib)?;
    }
    iter.patch(key_res)?;
    Ok(KeyOutcome::Done)
}

/// Continue past the key: extended header, then payload.
fn proceed_to_payload(iter: &mut EncodeIterator) -> CodecResult<MsgInitNext> {
    let (ext_flagged, pending) = {
        let lvl = iter.level()?;
        (lvl.flags & 0x0001 != 0, lvl.pending_ext)
    };
    if ext_flagged {
        match pending {
            Some(ext) if !ext.is_empty() => iter.put_rb_slice(ext)?,
            _ => {
                let res = iter.reserve(remaining_hint(iter))?;
                let lvl = iter.level_mut()?;
                lvl.ext_res = res;
                lvl.msg_stage = MsgStage::ExtendedHeaderOpen;
                return Ok(MsgInitNext::ExtendedHeader);
            }
        }
    }
    iter.level_mut()?.msg_stage = MsgStage::Payload;
    Ok(MsgInitNext::Payload)
}

fn put_common_header(
    iter: &mut EncodeIterator,
    class: MsgClass,
    domain_type: u8,
    stream_id: i32,
    container_type: DataType,
    flags: u16,
) -> CodecResult<()> {
    iter.put_u8(class as u8)?;
    iter.put_u8(domain_type)?;
    iter.put_i32(stream_id)?;
    iter.put_u8(container_type as u8)?;
    iter.put_rb(u32::from(flags))
}

/// Begin encoding `msg`. Class fields and the key are written; the
/// return value tells the caller what must be encoded next.
pub fn encode_msg_init<'a>(iter: &mut EncodeIterator<'a>, msg: &Msg<'a>) -> CodecResult<MsgInitNext> {
    iter.alive()?;
    iter.push_level(DataType::Msg as u8)?;
    let r = encode_msg_init_inner(iter, msg);
    if r.is_err() {
        let _ = iter.pop_level(false);
    }
    r
}

fn encode_msg_init_inner<'a>(
    iter: &mut EncodeIterator<'a>,
    msg: &Msg<'a>,
) -> CodecResult<MsgInitNext> {
    let mut key: Option<&MsgKey<'a>> = None;
    let ext: &'a [u8];
    match msg {
        Msg::Request(m) => {
            put_common_header(
                iter,
                MsgClass::Request,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            if m.flags.contains(RequestFlags::HAS_PRIORITY) {
                iter.put_u8(m.priority.class)?;
                iter.put_u16(m.priority.count)?;
            }
            if m.flags.contains(RequestFlags::HAS_QOS) {
                put_prefixed_qos(iter, &m.qos)?;
            }
            if m.flags.contains(RequestFlags::HAS_WORST_QOS) {
                put_prefixed_qos(iter, &m.worst_qos)?;
            }
            key = Some(&m.msg_key);
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
        Msg::Refresh(m) => {
            put_common_header(
                iter,
                MsgClass::Refresh,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            if m.flags.contains(RefreshFlags::HAS_SEQ_NUM) {
                iter.put_u32(m.seq_num)?;
            }
            put_prefixed_state(iter, &m.state)?;
            iter.put_rb_slice(m.group_id)?;
            if m.flags.contains(RefreshFlags::HAS_PERM_DATA) {
                iter.put_rb_slice(m.perm_data)?;
            }
            if m.flags.contains(RefreshFlags::HAS_QOS) {
                put_prefixed_qos(iter, &m.qos)?;
            }
            if m.flags.contains(RefreshFlags::HAS_POST_USER_INFO) {
                iter.put_u32(m.post_user_info.addr)?;
                iter.put_u32(m.post_user_info.id)?;
            }
            if m.flags.contains(RefreshFlags::HAS_PART_NUM) {
                iter.put_u16(m.part_num)?;
            }
            if m.flags.contains(RefreshFlags::HAS_MSG_KEY) {
                key = Some(&m.msg_key);
            }
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
        Msg::Status(m) => {
            put_common_header(
                iter,
                MsgClass::Status,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            if m.flags.contains(StatusFlags::HAS_STATE) {
                put_prefixed_state(iter, &m.state)?;
            }
            if m.flags.contains(StatusFlags::HAS_GROUP_ID) {
                iter.put_rb_slice(m.group_id)?;
            }
            if m.flags.contains(StatusFlags::HAS_PERM_DATA) {
                iter.put_rb_slice(m.perm_data)?;
            }
            if m.flags.contains(StatusFlags::HAS_POST_USER_INFO) {
                iter.put_u32(m.post_user_info.addr)?;
                iter.put_u32(m.post_user_info.id)?;
            }
            if m.flags.contains(StatusFlags::HAS_MSG_KEY) {
                key = Some(&m.msg_key);
            }
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
        Msg::Update(m) => {
            put_common_header(
                iter,
                MsgClass::Update,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            iter.put_u8(m.update_type)?;
            if m.flags.contains(UpdateFlags::HAS_SEQ_NUM) {
                iter.put_u32(m.seq_num)?;
            }
            if m.flags.contains(UpdateFlags::HAS_CONF_INFO) {
                iter.put_u16(m.conflation_count)?;
                iter.put_u16(m.conflation_time)?;
            }
            if m.flags.contains(UpdateFlags::HAS_PERM_DATA) {
                iter.put_rb_slice(m.perm_data)?;
            }
            if m.flags.contains(UpdateFlags::HAS_POST_USER_INFO) {
                iter.put_u32(m.post_user_info.addr)?;
                iter.put_u32(m.post_user_info.id)?;
            }
            if m.flags.contains(UpdateFlags::HAS_MSG_KEY) {
                key = Some(&m.msg_key);
            }
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
        Msg::Close(m) => {
            put_common_header(
                iter,
                MsgClass::Close,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
        Msg::Ack(m) => {
            put_common_header(
                iter,
                MsgClass::Ack,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            iter.put_u32(m.ack_id)?;
            if m.flags.contains(AckFlags::HAS_NAK_CODE) {
                iter.put_u8(m.nak_code)?;
            }
            if m.flags.contains(AckFlags::HAS_SEQ_NUM) {
                iter.put_u32(m.seq_num)?;
            }
            if m.flags.contains(AckFlags::HAS_TEXT) {
                iter.put_rb_slice(m.text)?;
            }
            if m.flags.contains(AckFlags::HAS_MSG_KEY) {
                key = Some(&m.msg_key);
            }
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
        Msg::Generic(m) => {
            put_common_header(
                iter,
                MsgClass::Generic,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            if m.flags.contains(GenericFlags::HAS_SEQ_NUM) {
                iter.put_u32(m.seq_num)?;
            }
            if m.flags.contains(GenericFlags::HAS_SECONDARY_SEQ_NUM) {
                iter.put_u32(m.secondary_seq_num)?;
            }
            if m.flags.contains(GenericFlags::HAS_PART_NUM) {
                iter.put_u16(m.part_num)?;
            }
            if m.flags.contains(GenericFlags::HAS_PERM_DATA) {
                iter.put_rb_slice(m.perm_data)?;
            }
            if m.flags.contains(GenericFlags::HAS_MSG_KEY) {
                key = Some(&m.msg_key);
            }
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
        Msg::Post(m) => {
            put_common_header(
                iter,
                MsgClass::Post,
                m.domain_type,
                m.stream_id,
                m.container_type,
                m.flags.bits(),
            )?;
            iter.put_u32(m.post_user_info.addr)?;
            iter.put_u32(m.post_user_info.id)?;
            if m.flags.contains(PostFlags::HAS_SEQ_NUM) {
                iter.put_u32(m.seq_num)?;
            }
            if m.flags.contains(PostFlags::HAS_POST_ID) {
                iter.put_u32(m.post_id)?;
            }
            if m.flags.contains(PostFlags::HAS_PERM_DATA) {
                iter.put_rb_slice(m.perm_data)?;
            }
            if m.flags.contains(PostFlags::HAS_PART_NUM) {
                iter.put_u16(m.part_num)?;
            }
            if m.flags.contains(PostFlags::HAS_POST_USER_RIGHTS) {
                iter.put_u16(m.post_user_rights)?;
            }
            if m.flags.contains(PostFlags::HAS_MSG_KEY) {
                key = Some(&m.msg_key);
            }
            ext = m.extended_header;
            iter.level_mut()?.flags = m.flags.bits();
        }
    }
    iter.level_mut()?.pending_ext = Some(ext);
    if let Some(k) = key {
        match put_msg_key(iter, k)? {
            KeyOutcome::NeedAttrib => {
                iter.level_mut()?.msg_stage = MsgStage::KeyAttribOpen;
                return Ok(MsgInitNext::KeyAttrib);
            }
            KeyOutcome::Done => {}
        }
    }
    proceed_to_payload(iter)
}

/// Close the in-place key attrib. With success=false the attrib bytes
/// are discarded and the attrib may be re-encoded.
pub fn encode_msg_key_attrib_complete(
    iter: &mut EncodeIterator,
    success: bool,
) -> CodecResult<MsgInitNext> {
    iter.expect_level(DataType::Msg as u8)?;
    if iter.level()?.msg_stage != MsgStage::KeyAttribOpen {
        return Err(CodecError::InvalidArgument("key attrib is not open"));
    }
    let (key_res, attrib_res) = {
        let lvl = iter.level()?;
        (lvl.key_res, lvl.attrib_res)
    };
    if !success {
        iter.cur = attrib_res.data_start();
        iter.dead = false;
        return Ok(MsgInitNext::KeyAttrib);
    }
    iter.alive()?;
    iter.patch(attrib_res)?;
    iter.patch(key_res)?;
    {
        let lvl = iter.level_mut()?;
        lvl.key_res = Reserved::NONE;
        lvl.attrib_res = Reserved::NONE;
        lvl.msg_stage = MsgStage::None;
    }
    proceed_to_payload(iter)
}

/// Supply the extended header bytes encode_msg_init asked for.
pub fn encode_extended_header(iter: &mut EncodeIterator, bytes: &[u8]) -> CodecResult<MsgInitNext> {
    iter.alive()?;
    iter.expect_level(DataType::Msg as u8)?;
    if iter.level()?.msg_stage != MsgStage::ExtendedHeaderOpen {
        return Err(CodecError::InvalidArgument("extended header is not open"));
    }
    iter.put_slice(bytes)?;
    let res = iter.level()?.ext_res;
    iter.patch(res)?;
    let lvl = iter.level_mut()?;
    lvl.ext_res = Reserved::NONE;
    lvl.msg_stage = MsgStage::Payload;
    Ok(MsgInitNext::Payload)
}

/// Finish the message; success=false discards everything since
/// encode_msg_init.
pub fn encode_msg_complete(iter: &mut EncodeIterator, success: bool) -> CodecResult<()> {
    iter.expect_level(DataType::Msg as u8)?;
    if success {
        iter.alive()?;
        if iter.level()?.msg_stage != MsgStage::Payload {
            return Err(CodecError::InvalidArgument("message header incomplete"));
        }
    }
    iter.pop_level(success)?;
    Ok(())
}

/// One-shot encode: attrib, extended header and payload must all be
/// pre-encoded in the message record.
pub fn encode_msg<'a>(iter: &mut EncodeIterator<'a>, msg: &Msg<'a>) -> CodecResult<()> {
    let next = encode_msg_init(iter, msg)?;
    if next != MsgInitNext::Payload {
        let _ = iter.pop_level(false);
        return Err(CodecError::InvalidArgument("message is not fully pre-encoded"));
    }
    let payload = msg.enc_data();
    if !payload.is_empty() {
        if let Err(e) = iter.put_slice(payload) {
            let _ = iter.pop_level(false);
            return Err(e);
        }
    }
    encode_msg_complete(iter, true)
}

// ============================================================
// Decode
// ============================================================

fn dec_prefixed_qos(iter: &mut DecodeIterator) -> CodecResult<Qos> {
    let s = iter.get_rb_slice()?;
    let mut sub = DecodeIterator::new(s);
    crate::primitive::decode_qos(&mut sub)?.ok_or(CodecError::InvalidData("blank qos in header"))
}

fn dec_prefixed_state<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<State<'a>> {
    let s = iter.get_rb_slice()?;
    let mut sub = DecodeIterator::new(s);
    crate::primitive::decode_state(&mut sub)?
        .ok_or(CodecError::InvalidData("blank state in header"))
}

fn dec_msg_key<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<MsgKey<'a>> {
    let blob = iter.get_rb_slice()?;
    let mut sub = DecodeIterator::new(blob);
    let mut key = MsgKey {
        flags: MsgKeyFlags::from_bits_truncate(sub.get_rb()? as u16),
        ..MsgKey::default()
    };
    if key.flags.contains(MsgKeyFlags::HAS_SERVICE_ID) {
        key.service_id = sub.get_rb()? as u16;
    }
    if key.flags.contains(MsgKeyFlags::HAS_NAME) {
        key.name = sub.get_rb_slice()?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_NAME_TYPE) {
        key.name_type = sub.get_u8()?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_FILTER) {
        key.filter = sub.get_u32()?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_IDENTIFIER) {
        key.identifier = sub.get_i32()?;
    }
    if key.flags.contains(MsgKeyFlags::HAS_ATTRIB) {
        key.attrib_container_type = DataType::from_u8(sub.get_u8()?)?;
        key.enc_attrib = sub.get_rb_slice()?;
    }
    Ok(key)
}

/// Parse the header and position the iterator at the payload. The
/// returned message borrows everything from the buffer.
pub fn decode_msg<'a>(iter: &mut DecodeIterator<'a>) -> CodecResult<Msg<'a>> {
    let end = iter.value_end();
    let class = MsgClass::from_u8(iter.get_u8()?)?;
    let domain_type = iter.get_u8()?;
    let stream_id = iter.get_i32()?;
    let container_type = DataType::from_u8(iter.get_u8()?)?;
    let flags = iter.get_rb()? as u16;

    let msg = match class {
        MsgClass::Request => {
            let mut m = RequestMsg {
                stream_id,
                domain_type,
                container_type,
                flags: RequestFlags::from_bits_truncate(flags),
                ..RequestMsg::default()
            };
            if m.flags.contains(RequestFlags::HAS_PRIORITY) {
                m.priority.class = iter.get_u8()?;
                m.priority.count = iter.get_u16()?;
            }
            if m.flags.contains(RequestFlags::HAS_QOS) {
                m.qos = dec_prefixed_qos(iter)?;
            }
            if m.flags.contains(RequestFlags::HAS_WORST_QOS) {
                m.worst_qos = dec_prefixed_qos(iter)?;
            }
            m.msg_key = dec_msg_key(iter)?;
            if m.flags.contains(RequestFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Request(m)
        }
        MsgClass::Refresh => {
            let mut m = RefreshMsg {
                stream_id,
                domain_type,
                container_type,
                flags: RefreshFlags::from_bits_truncate(flags),
                ..RefreshMsg::default()
            };
            if m.flags.contains(RefreshFlags::HAS_SEQ_NUM) {
                m.seq_num = iter.get_u32()?;
            }
            m.state = dec_prefixed_state(iter)?;
            m.group_id = iter.get_rb_slice()?;
            if m.flags.contains(RefreshFlags::HAS_PERM_DATA) {
                m.perm_data = iter.get_rb_slice()?;
            }
            if m.flags.contains(RefreshFlags::HAS_QOS) {
                m.qos = dec_prefixed_qos(iter)?;
            }
            if m.flags.contains(RefreshFlags::HAS_POST_USER_INFO) {
                m.post_user_info.addr = iter.get_u32()?;
                m.post_user_info.id = iter.get_u32()?;
            }
            if m.flags.contains(RefreshFlags::HAS_PART_NUM) {
                m.part_num = iter.get_u16()?;
            }
            if m.flags.contains(RefreshFlags::HAS_MSG_KEY) {
                m.msg_key = dec_msg_key(iter)?;
            }
            if m.flags.contains(RefreshFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Refresh(m)
        }
        MsgClass::Status => {
            let mut m = StatusMsg {
                stream_id,
                domain_type,
                container_type,
                flags: StatusFlags::from_bits_truncate(flags),
                ..StatusMsg::default()
            };
            if m.flags.contains(StatusFlags::HAS_STATE) {
                m.state = dec_prefixed_state(iter)?;
            }
            if m.flags.contains(StatusFlags::HAS_GROUP_ID) {
                m.group_id = iter.get_rb_slice()?;
            }
            if m.flags.contains(StatusFlags::HAS_PERM_DATA) {
                m.perm_data = iter.get_rb_slice()?;
            }
            if m.flags.contains(StatusFlags::HAS_POST_USER_INFO) {
                m.post_user_info.addr = iter.get_u32()?;
                m.post_user_info.id = iter.get_u32()?;
            }
            if m.flags.contains(StatusFlags::HAS_MSG_KEY) {
                m.msg_key = dec_msg_key(iter)?;
            }
            if m.flags.contains(StatusFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Status(m)
        }
        MsgClass::Update => {
            let mut m = UpdateMsg {
                stream_id,
                domain_type,
                container_type,
                flags: UpdateFlags::from_bits_truncate(flags),
                ..UpdateMsg::default()
            };
            m.update_type = iter.get_u8()?;
            if m.flags.contains(UpdateFlags::HAS_SEQ_NUM) {
                m.seq_num = iter.get_u32()?;
            }
            if m.flags.contains(UpdateFlags::HAS_CONF_INFO) {
                m.conflation_count = iter.get_u16()?;
                m.conflation_time = iter.get_u16()?;
            }
            if m.flags.contains(UpdateFlags::HAS_PERM_DATA) {
                m.perm_data = iter.get_rb_slice()?;
            }
            if m.flags.contains(UpdateFlags::HAS_POST_USER_INFO) {
                m.post_user_info.addr = iter.get_u32()?;
                m.post_user_info.id = iter.get_u32()?;
            }
            if m.flags.contains(UpdateFlags::HAS_MSG_KEY) {
                m.msg_key = dec_msg_key(iter)?;
            }
            if m.flags.contains(UpdateFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Update(m)
        }
        MsgClass::Close => {
            let mut m = CloseMsg {
                stream_id,
                domain_type,
                container_type,
                flags: CloseFlags::from_bits_truncate(flags),
                ..CloseMsg::default()
            };
            if m.flags.contains(CloseFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Close(m)
        }
        MsgClass::Ack => {
            let mut m = AckMsg {
                stream_id,
                domain_type,
                container_type,
                flags: AckFlags::from_bits_truncate(flags),
                ..AckMsg::default()
            };
            m.ack_id = iter.get_u32()?;
            if m.flags.contains(AckFlags::HAS_NAK_CODE) {
                m.nak_code = iter.get_u8()?;
            }
            if m.flags.contains(AckFlags::HAS_SEQ_NUM) {
                m.seq_num = iter.get_u32()?;
            }
            if m.flags.contains(AckFlags::HAS_TEXT) {
                m.text = iter.get_rb_slice()?;
            }
            if m.flags.contains(AckFlags::HAS_MSG_KEY) {
                m.msg_key = dec_msg_key(iter)?;
            }
            if m.flags.contains(AckFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Ack(m)
        }
        MsgClass::Generic => {
            let mut m = GenericMsg {
                stream_id,
                domain_type,
                container_type,
                flags: GenericFlags::from_bits_truncate(flags),
                ..GenericMsg::default()
            };
            if m.flags.contains(GenericFlags::HAS_SEQ_NUM) {
                m.seq_num = iter.get_u32()?;
            }
            if m.flags.contains(GenericFlags::HAS_SECONDARY_SEQ_NUM) {
                m.secondary_seq_num = iter.get_u32()?;
            }
            if m.flags.contains(GenericFlags::HAS_PART_NUM) {
                m.part_num = iter.get_u16()?;
            }
            if m.flags.contains(GenericFlags::HAS_PERM_DATA) {
                m.perm_data = iter.get_rb_slice()?;
            }
            if m.flags.contains(GenericFlags::HAS_MSG_KEY) {
                m.msg_key = dec_msg_key(iter)?;
            }
            if m.flags.contains(GenericFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Generic(m)
        }
        MsgClass::Post => {
            let mut m = PostMsg {
                stream_id,
                domain_type,
                container_type,
                flags: PostFlags::from_bits_truncate(flags),
                ..PostMsg::default()
            };
            m.post_user_info.addr = iter.get_u32()?;
            m.post_user_info.id = iter.get_u32()?;
            if m.flags.contains(PostFlags::HAS_SEQ_NUM) {
                m.seq_num = iter.get_u32()?;
            }
            if m.flags.contains(PostFlags::HAS_POST_ID) {
                m.post_id = iter.get_u32()?;
            }
            if m.flags.contains(PostFlags::HAS_PERM_DATA) {
                m.perm_data = iter.get_rb_slice()?;
            }
            if m.flags.contains(PostFlags::HAS_PART_NUM) {
                m.part_num = iter.get_u16()?;
            }
            if m.flags.contains(PostFlags::HAS_POST_USER_RIGHTS) {
                m.post_user_rights = iter.get_u16()?;
            }
            if m.flags.contains(PostFlags::HAS_MSG_KEY) {
                m.msg_key = dec_msg_key(iter)?;
            }
            if m.flags.contains(PostFlags::HAS_EXTENDED_HEADER) {
                m.extended_header = iter.get_rb_slice()?;
            }
            Msg::Post(m)
        }
    };
    if iter.cur > end {
        return Err(CodecError::IncompleteData);
    }
    let buf = iter.buf;
    let payload = &buf[iter.cur..end];
    let msg = attach_payload(msg, payload);
    Ok(msg)
}

fn attach_payload<'a>(msg: Msg<'a>, payload: &'a [u8]) -> Msg<'a> {
    match msg {
        Msg::Request(mut m) => {
            m.enc_data = payload;
            Msg::Request(m)
        }
        Msg::Refresh(mut m) => {
            m.enc_data = payload;
            Msg::Refresh(m)
        }
        Msg::Status(mut m) => {
            m.enc_data = payload;
            Msg::Status(m)
        }
        Msg::Update(mut m) => {
            m.enc_data = payload;
            Msg::Update(m)
        }
        Msg::Close(mut m) => {
            m.enc_data = payload;
            Msg::Close(m)
        }
        Msg::Ack(mut m) => {
            m.enc_data = payload;
            Msg::Ack(m)
        }
        Msg::Generic(mut m) => {
            m.enc_data = payload;
            Msg::Generic(m)
        }
        Msg::Post(mut m) => {
            m.enc_data = payload;
            Msg::Post(m)
        }
    }
}

/// Re-enter the key attrib with the same iterator, required before
/// decoding the payload when attrib and payload container types could
/// collide. After the attrib container finishes, the iterator resumes
/// at the payload.
pub fn decode_msg_key_attrib<'a>(
    iter: &mut DecodeIterator<'a>,
    key: &MsgKey<'a>,
) -> CodecResult<()> {
    if !key.flags.contains(MsgKeyFlags::HAS_ATTRIB) || key.enc_attrib.is_empty() {
        return Err(CodecError::InvalidArgument("key carries no attrib"));
    }
    let base = iter.buf.as_ptr() as usize;
    let p = key.enc_attrib.as_ptr() as usize;
    if p < base || p + key.enc_attrib.len() > base + iter.buf.len() {
        return Err(CodecError::InvalidArgument("attrib is not from this buffer"));
    }
    let start = p - base;
    let end = start + key.enc_attrib.len();
    let payload_resume = iter.cur;
    let lvl = iter.push_level(DataType::Msg as u8, end)?;
    lvl.entry_end = end;
    lvl.resume_pos = payload_resume;
    iter.cur = start;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element_list::{
        decode_element_entry, decode_element_list, encode_element_entry,
        encode_element_list_complete, encode_element_list_init, ElementList, ElementListFlags,
    };
    use crate::container::EntryData;
    use crate::field_list::{
        decode_field_entry, decode_field_list, encode_field_entry, encode_field_list_complete,
        encode_field_list_init, FieldList, FieldListFlags,
    };
    use crate::primitive::{decode_buffer, decode_int, decode_uint};
    use crate::types::{
        DataState, PrimitiveValue, QosRate, QosTimeliness, StreamState, DOMAIN_MARKET_PRICE,
    };

    fn market_price_key(name: &'static [u8]) -> MsgKey<'static> {
        MsgKey {
            flags: MsgKeyFlags::HAS_SERVICE_ID | MsgKeyFlags::HAS_NAME,
            service_id: 10,
            name,
            ..MsgKey::default()
        }
    }

    #[test]
    fn test_request_round_trip() {
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        let req = RequestMsg {
            stream_id: 5,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::NoData,
            flags: RequestFlags::STREAMING | RequestFlags::HAS_PRIORITY | RequestFlags::HAS_QOS,
            priority: Priority { class: 2, count: 3 },
            qos: Qos::realtime_tick_by_tick(),
            msg_key: market_price_key(b"TRI.N"),
            ..RequestMsg::default()
        };
        encode_msg(&mut enc, &Msg::Request(req)).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        let Msg::Request(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert_eq!(got.stream_id, 5);
        assert_eq!(got.domain_type, DOMAIN_MARKET_PRICE);
        assert!(got.flags.contains(RequestFlags::STREAMING));
        assert_eq!(got.priority, Priority { class: 2, count: 3 });
        assert_eq!(got.qos.timeliness, QosTimeliness::Realtime);
        assert_eq!(got.qos.rate, QosRate::TickByTick);
        assert_eq!(got.msg_key.name, b"TRI.N");
        assert_eq!(got.msg_key.service_id, 10);
        assert!(got.enc_data.is_empty());
    }

    #[test]
    fn test_refresh_with_payload_round_trip() {
        let mut buf = vec![0u8; 512];
        let mut enc = EncodeIterator::new(&mut buf);
        let refresh = RefreshMsg {
            stream_id: 5,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::FieldList,
            flags: RefreshFlags::SOLICITED
                | RefreshFlags::REFRESH_COMPLETE
                | RefreshFlags::HAS_MSG_KEY
                | RefreshFlags::HAS_SEQ_NUM,
            seq_num: 42,
            state: State {
                stream_state: StreamState::Open,
                data_state: DataState::Ok,
                code: 0,
                text: b"all is well",
            },
            group_id: &[0, 1],
            msg_key: market_price_key(b"TRI.N"),
            ..RefreshMsg::default()
        };
        let next = encode_msg_init(&mut enc, &Msg::Refresh(refresh)).unwrap();
        assert_eq!(next, MsgInitNext::Payload);
        let list = FieldList { flags: FieldListFlags::HAS_STANDARD_DATA, ..FieldList::default() };
        encode_field_list_init(&mut enc, &list, None).unwrap();
        encode_field_entry(&mut enc, 22, &EntryData::Value(PrimitiveValue::Int(100))).unwrap();
        encode_field_list_complete(&mut enc, true).unwrap();
        encode_msg_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        let Msg::Refresh(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert_eq!(got.seq_num, 42);
        assert_eq!(got.state.stream_state, StreamState::Open);
        assert_eq!(got.state.text, b"all is well");
        assert_eq!(got.group_id, &[0, 1]);
        assert!(got.flags.contains(RefreshFlags::REFRESH_COMPLETE));
        // payload decodes from the same iterator
        decode_field_list(&mut dec, None).unwrap();
        let e = decode_field_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.field_id, 22);
        assert_eq!(decode_int(&mut dec).unwrap(), Some(100));
        assert!(decode_field_entry(&mut dec).unwrap().is_none());
    }

    #[test]
    fn test_key_attrib_interruption_and_shared_iterator_decode() {
        let mut buf = vec![0u8; 512];
        let mut enc = EncodeIterator::new(&mut buf);
        let mut key = market_price_key(b"login-user");
        key.flags |= MsgKeyFlags::HAS_ATTRIB;
        key.attrib_container_type = DataType::ElementList;
        let req = RequestMsg {
            stream_id: 1,
            domain_type: crate::types::DOMAIN_LOGIN,
            container_type: DataType::ElementList,
            flags: RequestFlags::STREAMING,
            msg_key: key,
            ..RequestMsg::default()
        };
        let next = encode_msg_init(&mut enc, &Msg::Request(req)).unwrap();
        assert_eq!(next, MsgInitNext::KeyAttrib);
        // attrib element list
        let list = ElementList { flags: ElementListFlags::HAS_STANDARD_DATA, ..ElementList::default() };
        encode_element_list_init(&mut enc, &list, None).unwrap();
        encode_element_entry(
            &mut enc,
            b"ApplicationId",
            DataType::AsciiString,
            &EntryData::Value(PrimitiveValue::Buffer(b"256")),
        )
        .unwrap();
        encode_element_list_complete(&mut enc, true).unwrap();
        let next = encode_msg_key_attrib_complete(&mut enc, true).unwrap();
        assert_eq!(next, MsgInitNext::Payload);
        // payload element list
        encode_element_list_init(&mut enc, &list, None).unwrap();
        encode_element_entry(
            &mut enc,
            b"SupportBatchRequests",
            DataType::UInt,
            &EntryData::Value(PrimitiveValue::UInt(1)),
        )
        .unwrap();
        encode_element_list_complete(&mut enc, true).unwrap();
        encode_msg_complete(&mut enc, true).unwrap();
        let wire = enc.encoded().to_vec();

        let mut dec = DecodeIterator::new(&wire);
        let Msg::Request(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert!(got.msg_key.flags.contains(MsgKeyFlags::HAS_ATTRIB));
        assert_eq!(got.msg_key.attrib_container_type, DataType::ElementList);

        // decode attrib through the same iterator, then fall through to
        // the payload
        decode_msg_key_attrib(&mut dec, &got.msg_key).unwrap();
        decode_element_list(&mut dec, None).unwrap();
        let e = decode_element_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.name, b"ApplicationId");
        assert_eq!(decode_buffer(&mut dec).unwrap(), Some(&b"256"[..]));
        assert!(decode_element_entry(&mut dec).unwrap().is_none());

        decode_element_list(&mut dec, None).unwrap();
        let e = decode_element_entry(&mut dec).unwrap().unwrap();
        assert_eq!(e.name, b"SupportBatchRequests");
        assert_eq!(decode_uint(&mut dec).unwrap(), Some(1));
        assert!(decode_element_entry(&mut dec).unwrap().is_none());
    }

    #[test]
    fn test_status_close_ack_round_trip() {
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        let status = StatusMsg {
            stream_id: 9,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::NoData,
            flags: StatusFlags::HAS_STATE,
            state: State {
                stream_state: StreamState::ClosedRecover,
                data_state: DataState::Suspect,
                code: crate::types::STATE_CODE_NOT_FOUND,
                text: b"not found",
            },
            ..StatusMsg::default()
        };
        encode_msg(&mut enc, &Msg::Status(status)).unwrap();
        let wire = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&wire);
        let Msg::Status(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert_eq!(got.state.stream_state, StreamState::ClosedRecover);
        assert_eq!(got.state.text, b"not found");

        let mut buf = vec![0u8; 64];
        let mut enc = EncodeIterator::new(&mut buf);
        let close = CloseMsg {
            stream_id: 9,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::NoData,
            flags: CloseFlags::ACK,
            ..CloseMsg::default()
        };
        encode_msg(&mut enc, &Msg::Close(close)).unwrap();
        let wire = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&wire);
        let Msg::Close(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert!(got.flags.contains(CloseFlags::ACK));

        let mut buf = vec![0u8; 128];
        let mut enc = EncodeIterator::new(&mut buf);
        let ack = AckMsg {
            stream_id: 9,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::NoData,
            flags: AckFlags::HAS_NAK_CODE | AckFlags::HAS_TEXT,
            ack_id: 77,
            nak_code: NAK_CODE_SYMBOL_UNKNOWN,
            text: b"unknown symbol",
            ..AckMsg::default()
        };
        encode_msg(&mut enc, &Msg::Ack(ack)).unwrap();
        let wire = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&wire);
        let Msg::Ack(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert_eq!(got.ack_id, 77);
        assert_eq!(got.nak_code, NAK_CODE_SYMBOL_UNKNOWN);
        assert_eq!(got.text, b"unknown symbol");
    }

    #[test]
    fn test_post_and_generic_round_trip() {
        let mut buf = vec![0u8; 128];
        let mut enc = EncodeIterator::new(&mut buf);
        let post = PostMsg {
            stream_id: 3,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::NoData,
            flags: PostFlags::HAS_POST_ID | PostFlags::POST_COMPLETE | PostFlags::ACK,
            post_user_info: PostUserInfo { addr: 0x0A00_0001, id: 4444 },
            post_id: 12,
            ..PostMsg::default()
        };
        encode_msg(&mut enc, &Msg::Post(post)).unwrap();
        let wire = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&wire);
        let Msg::Post(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert_eq!(got.post_id, 12);
        assert_eq!(got.post_user_info.id, 4444);
        assert!(got.flags.contains(PostFlags::POST_COMPLETE));

        let mut buf = vec![0u8; 128];
        let mut enc = EncodeIterator::new(&mut buf);
        let gen = GenericMsg {
            stream_id: 3,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::NoData,
            flags: GenericFlags::HAS_SEQ_NUM | GenericFlags::MESSAGE_COMPLETE,
            seq_num: 1000,
            ..GenericMsg::default()
        };
        encode_msg(&mut enc, &Msg::Generic(gen)).unwrap();
        let wire = enc.encoded().to_vec();
        let mut dec = DecodeIterator::new(&wire);
        let Msg::Generic(got) = decode_msg(&mut dec).unwrap() else {
            panic!("wrong class");
        };
        assert_eq!(got.seq_num, 1000);
    }

    #[test]
    fn test_msg_rollback() {
        let mut buf = vec![0u8; 256];
        let mut enc = EncodeIterator::new(&mut buf);
        enc.put_u8(0xAA).unwrap();
        let before = enc.encoded_len();
        let req = RequestMsg {
            stream_id: 5,
            domain_type: DOMAIN_MARKET_PRICE,
            container_type: DataType::NoData,
            flags: RequestFlags::STREAMING,
            msg_key: market_price_key(b"TRI.N"),
            ..RequestMsg::default()
        };
        encode_msg_init(&mut enc, &Msg::Request(req)).unwrap();
        encode_msg_complete(&mut enc, false).unwrap();
        assert_eq!(enc.encoded_len(), before);
        assert_eq!(enc.encoded(), &[0xAA]);
    }

    #[test]
    fn test_key_matches() {
        let a = market_price_key(b"TRI.N");
        let b = market_price_key(b"TRI.N");
        let c = market_price_key(b"IBM.N");
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        let mut d = a;
        d.service_id = 11;
        assert!(!a.matches(&d));
    }
}
