// ABOUTME: CMPP Deliver: mobile-originated content or a status report for an earlier Submit
// ABOUTME: Registered_Delivery selects between the two; reports are a fixed 60-byte body

use crate::codec::{
    CodecError, Decodable, Encodable, MessageHeader, decode_bytes, decode_fixed_str,
    decode_status, decode_u8, decode_u64, encode_fixed_str, encode_status, require_body,
};
use crate::datatypes::{CommandId, DeliverResult, MsgFormat, ProtocolVersion, Report};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

const DEST_ID_LEN: usize = 21;
const SERVICE_ID_LEN: usize = 10;
const LINK_ID_LEN: usize = 20;

/// What a Deliver carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliverContent {
    /// Mobile-originated message bytes, encoded per Msg_Fmt
    Message(Bytes),
    /// Delivery status report
    Report(Report),
}

impl DeliverContent {
    pub fn len(&self) -> usize {
        match self {
            DeliverContent::Message(bytes) => bytes.len(),
            DeliverContent::Report(_) => Report::SIZE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deliver {
    pub header: MessageHeader,
    pub msg_id: u64,
    /// SP service number the message is addressed to
    pub dest_id: String,
    pub service_id: String,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: MsgFormat,
    pub src_terminal_id: String,
    /// 3.0 only
    pub src_terminal_type: u8,
    /// 1 when `content` is a status report
    pub registered_delivery: u8,
    pub content: DeliverContent,
    /// 3.0 only
    pub link_id: String,
}

impl Deliver {
    /// Length of a Deliver with empty content
    pub fn base_size(version: ProtocolVersion) -> usize {
        MessageHeader::SIZE + Self::fixed_prefix_len(version) + version.trailer_len()
    }

    /// Bytes from Msg_Id up to and including Msg_Length
    fn fixed_prefix_len(version: ProtocolVersion) -> usize {
        let src_terminal_type = if version.is_v3() { 1 } else { 0 };
        8 + DEST_ID_LEN + SERVICE_ID_LEN + 3 + version.terminal_id_len() + src_terminal_type + 2
    }

    /// Mobile-originated text, cut to what fits in one physical message
    pub fn mo(
        sequence_id: u32,
        msg_id: u64,
        dest_id: &str,
        service_id: &str,
        src_terminal_id: &str,
        text: &str,
        version: ProtocolVersion,
    ) -> Self {
        let msg_fmt = MsgFormat::for_text(text);
        let text: String = text.chars().take(msg_fmt.char_cap()).collect();
        let content = DeliverContent::Message(Bytes::from(msg_fmt.encode_text(&text)));
        Self::with_content(
            sequence_id,
            msg_id,
            dest_id,
            service_id,
            src_terminal_id,
            msg_fmt,
            0,
            content,
            version,
        )
    }

    /// Status report addressed to the SP
    pub fn report(
        sequence_id: u32,
        msg_id: u64,
        dest_id: &str,
        service_id: &str,
        src_terminal_id: &str,
        report: Report,
        version: ProtocolVersion,
    ) -> Self {
        Self::with_content(
            sequence_id,
            msg_id,
            dest_id,
            service_id,
            src_terminal_id,
            MsgFormat::Ascii,
            1,
            DeliverContent::Report(report),
            version,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_content(
        sequence_id: u32,
        msg_id: u64,
        dest_id: &str,
        service_id: &str,
        src_terminal_id: &str,
        msg_fmt: MsgFormat,
        registered_delivery: u8,
        content: DeliverContent,
        version: ProtocolVersion,
    ) -> Self {
        let mut deliver = Deliver {
            header: MessageHeader::new(CommandId::Deliver, sequence_id),
            msg_id,
            dest_id: dest_id.to_string(),
            service_id: service_id.to_string(),
            tp_pid: 0,
            tp_udhi: 0,
            msg_fmt,
            src_terminal_id: src_terminal_id.to_string(),
            src_terminal_type: 0,
            registered_delivery,
            content,
            link_id: String::new(),
        };
        deliver.header.total_length = deliver.encoded_size(version) as u32;
        deliver
    }

    pub fn is_report(&self) -> bool {
        matches!(self.content, DeliverContent::Report(_))
    }

    pub fn as_report(&self) -> Option<&Report> {
        match &self.content {
            DeliverContent::Report(report) => Some(report),
            DeliverContent::Message(_) => None,
        }
    }

    /// Decoded MO text; `None` for reports
    pub fn text(&self) -> Option<String> {
        match &self.content {
            DeliverContent::Message(bytes) => Some(self.msg_fmt.decode_text(bytes)),
            DeliverContent::Report(_) => None,
        }
    }

    pub fn to_response(&self, result: DeliverResult, version: ProtocolVersion) -> DeliverResp {
        DeliverResp::new(self.header.sequence_id, self.msg_id, result, version)
    }
}

impl Decodable for Deliver {
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        require_body(&header, buf, Self::fixed_prefix_len(version))?;

        let msg_id = decode_u64(buf)?;
        let dest_id = decode_fixed_str(buf, DEST_ID_LEN, "dest_id")?;
        let service_id = decode_fixed_str(buf, SERVICE_ID_LEN, "service_id")?;
        let tp_pid = decode_u8(buf)?;
        let tp_udhi = decode_u8(buf)?;
        let msg_fmt = MsgFormat::from(decode_u8(buf)?);
        let src_terminal_id =
            decode_fixed_str(buf, version.terminal_id_len(), "src_terminal_id")?;
        let src_terminal_type = if version.is_v3() { decode_u8(buf)? } else { 0 };
        let registered_delivery = decode_u8(buf)?;
        let msg_length = decode_u8(buf)? as usize;

        require_body(&header, buf, msg_length + version.trailer_len())?;
        let content = if registered_delivery == 1 {
            if msg_length != Report::SIZE {
                return Err(CodecError::FieldValidation {
                    field: "msg_content",
                    reason: format!("report must be {} bytes, got {msg_length}", Report::SIZE),
                });
            }
            DeliverContent::Report(Report::decode(buf)?)
        } else {
            DeliverContent::Message(decode_bytes(buf, msg_length)?)
        };

        let link_id = if version.is_v3() {
            decode_fixed_str(buf, LINK_ID_LEN, "link_id")?
        } else {
            decode_bytes(buf, version.trailer_len())?;
            String::new()
        };

        Ok(Deliver {
            header,
            msg_id,
            dest_id,
            service_id,
            tp_pid,
            tp_udhi,
            msg_fmt,
            src_terminal_id,
            src_terminal_type,
            registered_delivery,
            content,
            link_id,
        })
    }

    fn expected_command_id() -> CommandId {
        CommandId::Deliver
    }
}

impl Encodable for Deliver {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError> {
        if self.content.len() > u8::MAX as usize {
            return Err(CodecError::FieldValidation {
                field: "msg_content",
                reason: format!("{} bytes exceeds 255", self.content.len()),
            });
        }

        let header = MessageHeader {
            total_length: self.encoded_size(version) as u32,
            command_id: CommandId::Deliver,
            sequence_id: self.header.sequence_id,
        };
        header.encode(buf);

        buf.put_u64(self.msg_id);
        encode_fixed_str(buf, &self.dest_id, DEST_ID_LEN, "dest_id")?;
        encode_fixed_str(buf, &self.service_id, SERVICE_ID_LEN, "service_id")?;
        buf.put_u8(self.tp_pid);
        buf.put_u8(self.tp_udhi);
        buf.put_u8(self.msg_fmt.into());
        encode_fixed_str(
            buf,
            &self.src_terminal_id,
            version.terminal_id_len(),
            "src_terminal_id",
        )?;
        if version.is_v3() {
            buf.put_u8(self.src_terminal_type);
        }
        buf.put_u8(self.registered_delivery);
        buf.put_u8(self.content.len() as u8);
        match &self.content {
            DeliverContent::Message(bytes) => buf.put_slice(bytes),
            DeliverContent::Report(report) => report.encode(buf)?,
        }

        if version.is_v3() {
            encode_fixed_str(buf, &self.link_id, LINK_ID_LEN, "link_id")?;
        } else {
            buf.put_bytes(0, version.trailer_len());
        }
        Ok(())
    }

    fn encoded_size(&self, version: ProtocolVersion) -> usize {
        Self::base_size(version) + self.content.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliverResp {
    pub header: MessageHeader,
    pub msg_id: u64,
    pub result: DeliverResult,
}

impl DeliverResp {
    pub fn new(
        sequence_id: u32,
        msg_id: u64,
        result: DeliverResult,
        version: ProtocolVersion,
    ) -> Self {
        let mut header = MessageHeader::new(CommandId::DeliverResp, sequence_id);
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

impl Decodable for DeliverResp {
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        require_body(&header, buf, Self::wire_size(version) - MessageHeader::SIZE)?;

        let msg_id = decode_u64(buf)?;
        let result = DeliverResult::from(decode_status(buf, version)?);
        Ok(DeliverResp {
            header,
            msg_id,
            result,
        })
    }

    fn expected_command_id() -> CommandId {
        CommandId::DeliverResp
    }
}

impl Encodable for DeliverResp {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError> {
        let header = MessageHeader {
            total_length: self.encoded_size(version) as u32,
            command_id: CommandId::DeliverResp,
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

impl_pdu_header!(Deliver, DeliverResp);
