// ABOUTME: CMPP Submit (MT) message, its response and a builder that fragments long content
// ABOUTME: Terminal ID widths and the V3-only fields follow the negotiated ProtocolVersion

use crate::codec::{
    CodecError, Decodable, Encodable, MessageHeader, decode_bytes, decode_fixed_str,
    decode_status, decode_u8, decode_u64, encode_fixed_str, encode_status, require_body,
};
use crate::config::SubmitDefaults;
use crate::datatypes::report::report_time;
use crate::datatypes::{
    CommandId, Deliver, MsgFormat, ProtocolVersion, Report, ReportStat, SubmitResult,
};
use crate::fragment::{self, ConcatHeader, FragmentError};
use crate::sequence::SequenceGenerator;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Local};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

/// Upper bound of DestUsr_tl
pub const MAX_DESTINATIONS: usize = 99;
/// Msg_Length is a single byte
pub const MAX_CONTENT_LEN: usize = u8::MAX as usize;

const SERVICE_ID_LEN: usize = 10;
const MSG_SRC_LEN: usize = 6;
const FEE_TYPE_LEN: usize = 2;
const FEE_CODE_LEN: usize = 6;
const TIME_LEN: usize = 17;
const SRC_ID_LEN: usize = 21;
const LINK_ID_LEN: usize = 20;

/// Outbound short message from an SP
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submit {
    pub header: MessageHeader,
    /// Zero when sent by the SP; the gateway assigns one in SubmitResp
    pub msg_id: u64,
    pub pk_total: u8,
    pub pk_number: u8,
    pub registered_delivery: u8,
    pub msg_level: u8,
    pub service_id: String,
    pub fee_user_type: u8,
    pub fee_terminal_id: String,
    /// 3.0 only
    pub fee_terminal_type: u8,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: MsgFormat,
    pub msg_src: String,
    pub fee_type: String,
    pub fee_code: String,
    pub valid_time: String,
    pub at_time: String,
    pub src_id: String,
    pub dest_terminal_ids: Vec<String>,
    /// 3.0 only
    pub dest_terminal_type: u8,
    pub msg_content: Bytes,
    /// 3.0 only; 2.0 carries 8 reserved bytes instead
    pub link_id: String,
}

impl Submit {
    /// Length of a Submit with no destinations and no content
    pub fn base_size(version: ProtocolVersion) -> usize {
        let dest_terminal_type = if version.is_v3() { 1 } else { 0 };
        MessageHeader::SIZE
            + Self::fixed_prefix_len(version)
            + dest_terminal_type
            + 1
            + version.trailer_len()
    }

    /// Bytes from Msg_Id up to and including DestUsr_tl
    fn fixed_prefix_len(version: ProtocolVersion) -> usize {
        let fee_terminal_type = if version.is_v3() { 1 } else { 0 };
        8 + 4
            + SERVICE_ID_LEN
            + 1
            + version.terminal_id_len()
            + fee_terminal_type
            + 3
            + MSG_SRC_LEN
            + FEE_TYPE_LEN
            + FEE_CODE_LEN
            + 2 * TIME_LEN
            + SRC_ID_LEN
            + 1
    }

    /// Concatenation header of this fragment, if it carries one
    pub fn concat_header(&self) -> Option<ConcatHeader> {
        if self.tp_udhi == 0 {
            return None;
        }
        ConcatHeader::parse(&self.msg_content).map(|(header, _)| header)
    }

    /// Content bytes without the concatenation header
    pub fn body(&self) -> &[u8] {
        if self.tp_udhi != 0 {
            if let Some((_, body)) = ConcatHeader::parse(&self.msg_content) {
                return body;
            }
        }
        &self.msg_content
    }

    /// Content decoded according to Msg_Fmt, UDH stripped
    pub fn text(&self) -> String {
        self.msg_fmt.decode_text(self.body())
    }

    pub fn to_response(
        &self,
        result: SubmitResult,
        msg_id: u64,
        version: ProtocolVersion,
    ) -> SubmitResp {
        SubmitResp::new(self.header.sequence_id, msg_id, result, version)
    }

    /// Status report for the first destination of this message.
    ///
    /// The report is addressed back to the SP's `src_id` and quotes `msg_id`,
    /// the ID the gateway returned in SubmitResp.
    pub fn to_report(
        &self,
        sequence_id: u32,
        msg_id: u64,
        stat: ReportStat,
        smsc_sequence: u32,
        submitted_at: DateTime<Local>,
        version: ProtocolVersion,
    ) -> Deliver {
        let destination = self.dest_terminal_ids.first().cloned().unwrap_or_default();
        let report = Report {
            msg_id,
            stat,
            submit_time: report_time(&submitted_at),
            done_time: report_time(&Local::now()),
            dest_terminal_id: destination.clone(),
            smsc_sequence,
        };
        Deliver::report(
            sequence_id,
            msg_id,
            &self.src_id,
            &self.service_id,
            &destination,
            report,
            version,
        )
    }
}

impl Decodable for Submit {
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        let terminal_id_len = version.terminal_id_len();
        require_body(&header, buf, Self::fixed_prefix_len(version))?;

        let msg_id = decode_u64(buf)?;
        let pk_total = decode_u8(buf)?;
        let pk_number = decode_u8(buf)?;
        let registered_delivery = decode_u8(buf)?;
        let msg_level = decode_u8(buf)?;
        let service_id = decode_fixed_str(buf, SERVICE_ID_LEN, "service_id")?;
        let fee_user_type = decode_u8(buf)?;
        let fee_terminal_id = decode_fixed_str(buf, terminal_id_len, "fee_terminal_id")?;
        let fee_terminal_type = if version.is_v3() { decode_u8(buf)? } else { 0 };
        let tp_pid = decode_u8(buf)?;
        let tp_udhi = decode_u8(buf)?;
        let msg_fmt = MsgFormat::from(decode_u8(buf)?);
        let msg_src = decode_fixed_str(buf, MSG_SRC_LEN, "msg_src")?;
        let fee_type = decode_fixed_str(buf, FEE_TYPE_LEN, "fee_type")?;
        let fee_code = decode_fixed_str(buf, FEE_CODE_LEN, "fee_code")?;
        let valid_time = decode_fixed_str(buf, TIME_LEN, "valid_time")?;
        let at_time = decode_fixed_str(buf, TIME_LEN, "at_time")?;
        let src_id = decode_fixed_str(buf, SRC_ID_LEN, "src_id")?;

        let dest_count = decode_u8(buf)? as usize;
        if dest_count == 0 || dest_count > MAX_DESTINATIONS {
            return Err(CodecError::FieldValidation {
                field: "dest_usr_tl",
                reason: format!("{dest_count} destinations, must be 1-{MAX_DESTINATIONS}"),
            });
        }

        let dest_terminal_type_len = if version.is_v3() { 1 } else { 0 };
        require_body(
            &header,
            buf,
            dest_count * terminal_id_len + dest_terminal_type_len + 1,
        )?;
        let dest_terminal_ids = (0..dest_count)
            .map(|_| decode_fixed_str(buf, terminal_id_len, "dest_terminal_id"))
            .collect::<Result<Vec<_>, _>>()?;
        let dest_terminal_type = if version.is_v3() { decode_u8(buf)? } else { 0 };

        let msg_length = decode_u8(buf)? as usize;
        require_body(&header, buf, msg_length + version.trailer_len())?;
        let msg_content = decode_bytes(buf, msg_length)?;

        let link_id = if version.is_v3() {
            decode_fixed_str(buf, LINK_ID_LEN, "link_id")?
        } else {
            decode_bytes(buf, version.trailer_len())?;
            String::new()
        };

        Ok(Submit {
            header,
            msg_id,
            pk_total,
            pk_number,
            registered_delivery,
            msg_level,
            service_id,
            fee_user_type,
            fee_terminal_id,
            fee_terminal_type,
            tp_pid,
            tp_udhi,
            msg_fmt,
            msg_src,
            fee_type,
            fee_code,
            valid_time,
            at_time,
            src_id,
            dest_terminal_ids,
            dest_terminal_type,
            msg_content,
            link_id,
        })
    }

    fn expected_command_id() -> CommandId {
        CommandId::Submit
    }
}

impl Encodable for Submit {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError> {
        let dest_count = self.dest_terminal_ids.len();
        if dest_count == 0 || dest_count > MAX_DESTINATIONS {
            return Err(CodecError::FieldValidation {
                field: "dest_usr_tl",
                reason: format!("{dest_count} destinations, must be 1-{MAX_DESTINATIONS}"),
            });
        }
        if self.msg_content.len() > MAX_CONTENT_LEN {
            return Err(CodecError::FieldValidation {
                field: "msg_content",
                reason: format!(
                    "{} bytes exceeds {MAX_CONTENT_LEN}",
                    self.msg_content.len()
                ),
            });
        }

        let terminal_id_len = version.terminal_id_len();
        let header = MessageHeader {
            total_length: self.encoded_size(version) as u32,
            command_id: CommandId::Submit,
            sequence_id: self.header.sequence_id,
        };
        header.encode(buf);

        buf.put_u64(self.msg_id);
        buf.put_u8(self.pk_total);
        buf.put_u8(self.pk_number);
        buf.put_u8(self.registered_delivery);
        buf.put_u8(self.msg_level);
        encode_fixed_str(buf, &self.service_id, SERVICE_ID_LEN, "service_id")?;
        buf.put_u8(self.fee_user_type);
        encode_fixed_str(buf, &self.fee_terminal_id, terminal_id_len, "fee_terminal_id")?;
        if version.is_v3() {
            buf.put_u8(self.fee_terminal_type);
        }
        buf.put_u8(self.tp_pid);
        buf.put_u8(self.tp_udhi);
        buf.put_u8(self.msg_fmt.into());
        encode_fixed_str(buf, &self.msg_src, MSG_SRC_LEN, "msg_src")?;
        encode_fixed_str(buf, &self.fee_type, FEE_TYPE_LEN, "fee_type")?;
        encode_fixed_str(buf, &self.fee_code, FEE_CODE_LEN, "fee_code")?;
        encode_fixed_str(buf, &self.valid_time, TIME_LEN, "valid_time")?;
        encode_fixed_str(buf, &self.at_time, TIME_LEN, "at_time")?;
        encode_fixed_str(buf, &self.src_id, SRC_ID_LEN, "src_id")?;

        buf.put_u8(dest_count as u8);
        for dest in &self.dest_terminal_ids {
            encode_fixed_str(buf, dest, terminal_id_len, "dest_terminal_id")?;
        }
        if version.is_v3() {
            buf.put_u8(self.dest_terminal_type);
        }

        buf.put_u8(self.msg_content.len() as u8);
        buf.put_slice(&self.msg_content);

        if version.is_v3() {
            encode_fixed_str(buf, &self.link_id, LINK_ID_LEN, "link_id")?;
        } else {
            buf.put_bytes(0, version.trailer_len());
        }
        Ok(())
    }

    fn encoded_size(&self, version: ProtocolVersion) -> usize {
        Self::base_size(version)
            + self.dest_terminal_ids.len() * version.terminal_id_len()
            + self.msg_content.len()
    }
}

/// Submit response carrying the gateway-assigned Msg_Id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitResp {
    pub header: MessageHeader,
    pub msg_id: u64,
    pub result: SubmitResult,
}

impl SubmitResp {
    pub fn new(
        sequence_id: u32,
        msg_id: u64,
        result: SubmitResult,
        version: ProtocolVersion,
    ) -> Self {
        let mut header = MessageHeader::new(CommandId::SubmitResp, sequence_id);
        header.total_length = Self::wire_size(version) as u32;
        Self {
            header,
            msg_id,
            result,
        }
    }

    /// 24 bytes on 3.0, 21 bytes on 2.0
    pub fn wire_size(version: ProtocolVersion) -> usize {
        MessageHeader::SIZE + 8 + version.status_len()
    }
}

impl Decodable for SubmitResp {
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        require_body(&header, buf, Self::wire_size(version) - MessageHeader::SIZE)?;

        let msg_id = decode_u64(buf)?;
        let result = SubmitResult::from(decode_status(buf, version)?);
        Ok(SubmitResp {
            header,
            msg_id,
            result,
        })
    }

    fn expected_command_id() -> CommandId {
        CommandId::SubmitResp
    }
}

impl Encodable for SubmitResp {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError> {
        let header = MessageHeader {
            total_length: self.encoded_size(version) as u32,
            command_id: CommandId::SubmitResp,
            sequence_id: self.header.sequence_id,
        };
        header.encode(buf);
        buf.put_u64(self.msg_id);
        encode_status(buf, self.result.into(), version, "result")
    }

    fn encoded_size(&self, version: ProtocolVersion) -> usize {
        Self::wire_size(version)
    }
}

impl_pdu_header!(Submit, SubmitResp);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitBuildError {
    #[error("at least one destination is required")]
    NoDestination,

    #[error("{0} destinations exceeds {MAX_DESTINATIONS}")]
    TooManyDestinations(usize),

    #[error(transparent)]
    Fragment(#[from] FragmentError),
}

/// Builds the Submit frames for one logical message.
///
/// Service and billing fields come from [`SubmitDefaults`]; the setters
/// override them for a single message. Content longer than one fragment is
/// split and every part gets its own sequence ID.
pub struct SubmitBuilder<'a> {
    defaults: &'a SubmitDefaults,
    version: ProtocolVersion,
    msg_src: String,
    dest_terminal_ids: Vec<String>,
    msg_fmt: MsgFormat,
    content: Vec<u8>,
    registered_delivery: Option<u8>,
    service_id: Option<String>,
    src_id: Option<String>,
    at_time: String,
    group_id: Option<u8>,
}

impl<'a> SubmitBuilder<'a> {
    pub fn new(defaults: &'a SubmitDefaults, version: ProtocolVersion) -> Self {
        Self {
            defaults,
            version,
            msg_src: String::new(),
            dest_terminal_ids: Vec::new(),
            msg_fmt: MsgFormat::Ascii,
            content: Vec::new(),
            registered_delivery: None,
            service_id: None,
            src_id: None,
            at_time: String::new(),
            group_id: None,
        }
    }

    /// SP enterprise code (usually the login source address)
    pub fn msg_src(mut self, msg_src: &str) -> Self {
        self.msg_src = msg_src.to_string();
        self
    }

    pub fn destination(mut self, terminal_id: &str) -> Self {
        self.dest_terminal_ids.push(terminal_id.to_string());
        self
    }

    pub fn destinations<I, S>(mut self, terminal_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dest_terminal_ids
            .extend(terminal_ids.into_iter().map(Into::into));
        self
    }

    /// Text content; the format is ASCII when possible and UCS2 otherwise
    pub fn text(mut self, text: &str) -> Self {
        self.msg_fmt = MsgFormat::for_text(text);
        self.content = self.msg_fmt.encode_text(text);
        self
    }

    /// Pre-encoded content in an explicit format
    pub fn content(mut self, msg_fmt: MsgFormat, content: impl Into<Vec<u8>>) -> Self {
        self.msg_fmt = msg_fmt;
        self.content = content.into();
        self
    }

    pub fn registered_delivery(mut self, registered_delivery: u8) -> Self {
        self.registered_delivery = Some(registered_delivery);
        self
    }

    pub fn service_id(mut self, service_id: &str) -> Self {
        self.service_id = Some(service_id.to_string());
        self
    }

    pub fn src_id(mut self, src_id: &str) -> Self {
        self.src_id = Some(src_id.to_string());
        self
    }

    /// Scheduled delivery time; empty means immediate
    pub fn at_time(mut self, at_time: &str) -> Self {
        self.at_time = at_time.to_string();
        self
    }

    /// Fix the concatenation group ID instead of deriving it from the clock
    pub fn group_id(mut self, group_id: u8) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn build(self, sequences: &dyn SequenceGenerator) -> Result<Vec<Submit>, SubmitBuildError> {
        match self.dest_terminal_ids.len() {
            0 => return Err(SubmitBuildError::NoDestination),
            n if n > MAX_DESTINATIONS => return Err(SubmitBuildError::TooManyDestinations(n)),
            _ => {}
        }

        let parts = match self.group_id {
            Some(group_id) => fragment::fragment_with_group(self.msg_fmt, &self.content, group_id)?,
            None => fragment::fragment(self.msg_fmt, &self.content)?,
        };
        let pk_total = parts.len() as u8;
        let tp_udhi = u8::from(parts.len() > 1);
        let valid_time = valid_time(self.defaults.valid_duration());
        let defaults = self.defaults;

        let submits = parts
            .into_iter()
            .enumerate()
            .map(|(i, msg_content)| {
                let mut submit = Submit {
                    header: MessageHeader::new(CommandId::Submit, sequences.next_val()),
                    msg_id: 0,
                    pk_total,
                    pk_number: (i + 1) as u8,
                    registered_delivery: self
                        .registered_delivery
                        .unwrap_or(defaults.registered_delivery),
                    msg_level: defaults.msg_level,
                    service_id: self
                        .service_id
                        .clone()
                        .unwrap_or_else(|| defaults.service_id.clone()),
                    fee_user_type: defaults.fee_user_type,
                    fee_terminal_id: defaults.fee_terminal_id.clone(),
                    fee_terminal_type: defaults.fee_terminal_type,
                    tp_pid: 0,
                    tp_udhi,
                    msg_fmt: self.msg_fmt,
                    msg_src: self.msg_src.clone(),
                    fee_type: defaults.fee_type.clone(),
                    fee_code: defaults.fee_code.clone(),
                    valid_time: valid_time.clone(),
                    at_time: self.at_time.clone(),
                    src_id: self.src_id.clone().unwrap_or_else(|| defaults.src_id.clone()),
                    dest_terminal_ids: self.dest_terminal_ids.clone(),
                    dest_terminal_type: 0,
                    msg_content,
                    link_id: defaults.link_id.clone(),
                };
                submit.header.total_length = submit.encoded_size(self.version) as u32;
                submit
            })
            .collect();

        Ok(submits)
    }
}

/// Absolute validity time `yyMMddHHmmss032+` (relative to now)
fn valid_time(valid_for: Duration) -> String {
    chrono::Duration::from_std(valid_for)
        .ok()
        .and_then(|delta| Local::now().checked_add_signed(delta))
        .map(|expiry| format!("{}032+", expiry.format("%y%m%d%H%M%S")))
        .unwrap_or_default()
}
