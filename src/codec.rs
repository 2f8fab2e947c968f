// CMPP Codec - Separates parsing/encoding logic from domain models
//
// This module provides a clean separation between the wire format (codec)
// and the domain models (messages). Each message implements Encodable/Decodable
// rather than having all parsing logic in a monolithic frame parser. Widths that
// differ between CMPP 2.0 and 3.0 are resolved by the negotiated ProtocolVersion
// passed into every encode and decode call.

use crate::datatypes::{
    ActiveTest, ActiveTestResp, CommandId, Connect, ConnectResp, Deliver, DeliverResp,
    ProtocolVersion, Submit, SubmitResp, Terminate, TerminateResp,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::OnceLock;
use thiserror::Error;

/// Smallest legal frame: a bare header.
pub const MIN_FRAME_LENGTH: u32 = MessageHeader::SIZE as u32;

/// Default upper bound for a declared frame length.
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 512;

/// CMPP message header (12 bytes, common to all messages)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub total_length: u32,
    pub command_id: CommandId,
    pub sequence_id: u32,
}

impl MessageHeader {
    pub const SIZE: usize = 12;

    /// Header for a message whose length is filled in at encode time
    pub fn new(command_id: CommandId, sequence_id: u32) -> Self {
        Self {
            total_length: Self::SIZE as u32,
            command_id,
            sequence_id,
        }
    }

    /// Decode a header from the buffer.
    ///
    /// Only the lower length bound is checked here; the upper bound is a
    /// transport concern and is applied by [`Frame::check`].
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }

        let total_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        let sequence_id = buf.get_u32();

        if total_length < MIN_FRAME_LENGTH {
            return Err(CodecError::InvalidFrameLength {
                length: total_length,
                min: MIN_FRAME_LENGTH,
                max: u32::MAX,
            });
        }

        let command_id = CommandId::try_from(command_id_raw)
            .map_err(|_| CodecError::InvalidCommandId(command_id_raw))?;

        Ok(MessageHeader {
            total_length,
            command_id,
            sequence_id,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.total_length);
        buf.put_u32(self.command_id.into());
        buf.put_u32(self.sequence_id);
    }

    /// Number of body bytes that follow this header on the wire
    pub fn body_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(Self::SIZE)
    }
}

/// Every typed message owns its header and forwards header accessors.
pub trait Pdu {
    fn header(&self) -> &MessageHeader;

    fn sequence_id(&self) -> u32 {
        self.header().sequence_id
    }

    fn command_id(&self) -> CommandId {
        self.header().command_id
    }
}

/// Trait for types that can be encoded to bytes
pub trait Encodable {
    /// Encode this message, header included, to the buffer
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError>;

    /// Exact wire size of this message for the given version
    fn encoded_size(&self, version: ProtocolVersion) -> usize;

    /// Encode into a fresh buffer.
    ///
    /// The total_length field is rewritten from the measured buffer length so
    /// the header always matches the bytes that follow it.
    fn to_bytes(&self, version: ProtocolVersion) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(self.encoded_size(version));
        self.encode(&mut buf, version)?;

        if buf.len() >= 4 {
            let length = buf.len() as u32;
            buf[0..4].copy_from_slice(&length.to_be_bytes());
        }

        Ok(buf.freeze())
    }
}

/// Trait for types that can be decoded from bytes
pub trait Decodable: Sized {
    /// Decode this message from the buffer positioned after the header
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        version: ProtocolVersion,
    ) -> Result<Self, CodecError>;

    /// Return the command_id this message type is decoded from
    fn expected_command_id() -> CommandId;

    /// Validate the header is appropriate for this message type
    fn validate_header(header: &MessageHeader) -> Result<(), CodecError> {
        if header.command_id != Self::expected_command_id() {
            return Err(CodecError::UnexpectedCommandId {
                expected: Self::expected_command_id(),
                actual: header.command_id,
            });
        }
        Ok(())
    }
}

/// Codec errors with detailed context for debugging
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Incomplete frame: need more data")]
    Incomplete,

    #[error("Invalid command_id: {0:#x}")]
    InvalidCommandId(u32),

    #[error("Invalid frame length: {length}, must be {min}-{max}")]
    InvalidFrameLength { length: u32, min: u32, max: u32 },

    #[error("Unexpected command_id: expected {expected:?}, got {actual:?}")]
    UnexpectedCommandId {
        expected: CommandId,
        actual: CommandId,
    },

    #[error("{command_id:?} body too short: need {needed} bytes, have {available}")]
    BodyTooShort {
        command_id: CommandId,
        needed: usize,
        available: usize,
    },

    #[error("{command_id:?} length {actual} does not match {expected} for protocol {version}")]
    VersionLengthMismatch {
        command_id: CommandId,
        version: ProtocolVersion,
        expected: u32,
        actual: u32,
    },

    #[error("Field '{field}' validation failed: {reason}")]
    FieldValidation { field: &'static str, reason: String },

    #[error("UTF-8 decoding error in field '{field}': {source}")]
    Utf8Error {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fail with [`CodecError::BodyTooShort`] unless `needed` body bytes remain
pub fn require_body(
    header: &MessageHeader,
    buf: &Cursor<&[u8]>,
    needed: usize,
) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::BodyTooShort {
            command_id: header.command_id,
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

/// Decode a fixed-width, NUL-padded string field.
///
/// The whole window is consumed; the value ends at the first zero byte.
pub fn decode_fixed_str(
    buf: &mut Cursor<&[u8]>,
    width: usize,
    field_name: &'static str,
) -> Result<String, CodecError> {
    if buf.remaining() < width {
        return Err(CodecError::Incomplete);
    }

    let field_bytes = buf.copy_to_bytes(width);
    let end = field_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(field_bytes.len());

    String::from_utf8(field_bytes[..end].to_vec()).map_err(|e| CodecError::Utf8Error {
        field: field_name,
        source: e,
    })
}

/// Encode a fixed-width, NUL-padded string field.
///
/// Unlike C-strings the value may fill the whole window.
pub fn encode_fixed_str(
    buf: &mut BytesMut,
    value: &str,
    width: usize,
    field_name: &'static str,
) -> Result<(), CodecError> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(CodecError::FieldValidation {
            field: field_name,
            reason: format!("{} bytes exceeds field width {}", bytes.len(), width),
        });
    }

    buf.put_slice(bytes);
    buf.put_bytes(0, width - bytes.len());
    Ok(())
}

/// Decode a single byte
pub fn decode_u8(buf: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u8())
}

/// Decode a 32-bit big-endian integer
pub fn decode_u32(buf: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u32())
}

/// Decode a 64-bit big-endian integer
pub fn decode_u64(buf: &mut Cursor<&[u8]>) -> Result<u64, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u64())
}

/// Decode `len` raw bytes
pub fn decode_bytes(buf: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.copy_to_bytes(len))
}

/// Decode a status/result code: u32 on 3.0, u8 on 2.0
pub fn decode_status(buf: &mut Cursor<&[u8]>, version: ProtocolVersion) -> Result<u32, CodecError> {
    if version.is_v3() {
        decode_u32(buf)
    } else {
        decode_u8(buf).map(u32::from)
    }
}

/// Encode a status/result code: u32 on 3.0, u8 on 2.0
pub fn encode_status(
    buf: &mut BytesMut,
    value: u32,
    version: ProtocolVersion,
    field_name: &'static str,
) -> Result<(), CodecError> {
    if version.is_v3() {
        buf.put_u32(value);
        return Ok(());
    }

    let narrow = u8::try_from(value).map_err(|_| CodecError::FieldValidation {
        field: field_name,
        reason: format!("{value} does not fit the one-byte CMPP 2.0 field"),
    })?;
    buf.put_u8(narrow);
    Ok(())
}

/// One complete frame as cut from the stream, not yet decoded
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub header: MessageHeader,
    /// Entire frame, header included
    pub bytes: Bytes,
}

impl RawFrame {
    /// Cut one frame off the front of `buffer` if it is complete.
    ///
    /// Returns `Ok(None)` while more bytes are needed. A declared length
    /// outside `[12, max_len]` or an unknown command ID is an error and the
    /// stream can no longer be trusted.
    pub fn split_from(buffer: &mut BytesMut, max_len: u32) -> Result<Option<RawFrame>, CodecError> {
        let mut cursor = Cursor::new(&buffer[..]);
        let length = match Frame::check(&mut cursor, max_len) {
            Ok(length) => length,
            Err(CodecError::Incomplete) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut cursor = Cursor::new(&buffer[..]);
        let header = MessageHeader::decode(&mut cursor)?;
        let bytes = buffer.split_to(length).freeze();
        Ok(Some(RawFrame { header, bytes }))
    }

    /// Body bytes after the header
    pub fn body(&self) -> &[u8] {
        &self.bytes[MessageHeader::SIZE..]
    }

    /// Decode into a typed frame
    pub fn decode(&self, version: ProtocolVersion) -> Result<Frame, CodecError> {
        let mut cursor = Cursor::new(&self.bytes[..]);
        Frame::parse(&mut cursor, version)
    }

    /// Decode into one concrete message type
    pub fn decode_as<T: Decodable>(&self, version: ProtocolVersion) -> Result<T, CodecError> {
        let mut cursor = Cursor::new(self.body());
        T::decode(self.header, &mut cursor, version)
    }
}

/// Generic frame type that can hold any CMPP message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    // Session management
    Connect(Connect),
    ConnectResp(ConnectResp),
    Terminate(Terminate),
    TerminateResp(TerminateResp),

    // Keep-alive
    ActiveTest(ActiveTest),
    ActiveTestResp(ActiveTestResp),

    // Messages (boxed for large structs)
    Submit(Box<Submit>),
    SubmitResp(SubmitResp),
    Deliver(Box<Deliver>),
    DeliverResp(DeliverResp),
}

/// Registry of message decoders keyed by command ID
type DecoderFn = Box<
    dyn Fn(MessageHeader, &mut Cursor<&[u8]>, ProtocolVersion) -> Result<Frame, CodecError>
        + Send
        + Sync,
>;

pub struct PduRegistry {
    decoders: HashMap<CommandId, DecoderFn>,
}

impl PduRegistry {
    /// Create a new registry with every CMPP command registered
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
        };

        registry.register_pdu::<Connect, _>(Frame::Connect);
        registry.register_pdu::<ConnectResp, _>(Frame::ConnectResp);
        registry.register_pdu::<Terminate, _>(Frame::Terminate);
        registry.register_pdu::<TerminateResp, _>(Frame::TerminateResp);
        registry.register_pdu::<ActiveTest, _>(Frame::ActiveTest);
        registry.register_pdu::<ActiveTestResp, _>(Frame::ActiveTestResp);
        registry.register_pdu::<Submit, _>(|pdu| Frame::Submit(Box::new(pdu)));
        registry.register_pdu::<SubmitResp, _>(Frame::SubmitResp);
        registry.register_pdu::<Deliver, _>(|pdu| Frame::Deliver(Box::new(pdu)));
        registry.register_pdu::<DeliverResp, _>(Frame::DeliverResp);

        registry
    }

    /// Shared read-only registry
    pub fn global() -> &'static PduRegistry {
        static REGISTRY: OnceLock<PduRegistry> = OnceLock::new();
        REGISTRY.get_or_init(PduRegistry::new)
    }

    fn register_pdu<T, F>(&mut self, frame_constructor: F)
    where
        T: Decodable + 'static,
        F: Fn(T) -> Frame + Send + Sync + 'static,
    {
        let command_id = T::expected_command_id();
        let decoder = Box::new(
            move |header: MessageHeader, buf: &mut Cursor<&[u8]>, version: ProtocolVersion| {
                let pdu = T::decode(header, buf, version)?;
                Ok(frame_constructor(pdu))
            },
        );
        self.decoders.insert(command_id, decoder);
    }

    /// Decode a message given its header and body
    pub fn decode_pdu(
        &self,
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        version: ProtocolVersion,
    ) -> Result<Frame, CodecError> {
        match self.decoders.get(&header.command_id) {
            Some(decoder) => decoder(header, buf, version),
            None => Err(CodecError::InvalidCommandId(header.command_id.into())),
        }
    }

    /// Check if a command_id is registered
    pub fn is_registered(&self, command_id: CommandId) -> bool {
        self.decoders.contains_key(&command_id)
    }

    /// Get all registered command_ids
    pub fn registered_commands(&self) -> Vec<CommandId> {
        self.decoders.keys().copied().collect()
    }
}

impl Default for PduRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Get the command_id for this frame
    pub fn command_id(&self) -> CommandId {
        self.header().command_id
    }

    /// Get the sequence ID for this frame
    pub fn sequence_id(&self) -> u32 {
        self.header().sequence_id
    }

    /// Check if this frame is a response
    pub fn is_response(&self) -> bool {
        self.command_id().is_response()
    }

    fn header(&self) -> &MessageHeader {
        match self {
            Frame::Connect(pdu) => pdu.header(),
            Frame::ConnectResp(pdu) => pdu.header(),
            Frame::Terminate(pdu) => pdu.header(),
            Frame::TerminateResp(pdu) => pdu.header(),
            Frame::ActiveTest(pdu) => pdu.header(),
            Frame::ActiveTestResp(pdu) => pdu.header(),
            Frame::Submit(pdu) => pdu.header(),
            Frame::SubmitResp(pdu) => pdu.header(),
            Frame::Deliver(pdu) => pdu.header(),
            Frame::DeliverResp(pdu) => pdu.header(),
        }
    }

    /// Encode whichever message this frame carries
    pub fn to_bytes(&self, version: ProtocolVersion) -> Result<Bytes, CodecError> {
        match self {
            Frame::Connect(pdu) => pdu.to_bytes(version),
            Frame::ConnectResp(pdu) => pdu.to_bytes(version),
            Frame::Terminate(pdu) => pdu.to_bytes(version),
            Frame::TerminateResp(pdu) => pdu.to_bytes(version),
            Frame::ActiveTest(pdu) => pdu.to_bytes(version),
            Frame::ActiveTestResp(pdu) => pdu.to_bytes(version),
            Frame::Submit(pdu) => pdu.to_bytes(version),
            Frame::SubmitResp(pdu) => pdu.to_bytes(version),
            Frame::Deliver(pdu) => pdu.to_bytes(version),
            Frame::DeliverResp(pdu) => pdu.to_bytes(version),
        }
    }

    /// Check whether a complete frame is buffered.
    ///
    /// On success returns the frame length without advancing the cursor.
    pub fn check(buf: &mut Cursor<&[u8]>, max_len: u32) -> Result<usize, CodecError> {
        if buf.remaining() < MessageHeader::SIZE {
            return Err(CodecError::Incomplete);
        }

        let pos = buf.position();
        let total_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        buf.set_position(pos);

        if !(MIN_FRAME_LENGTH..=max_len).contains(&total_length) {
            return Err(CodecError::InvalidFrameLength {
                length: total_length,
                min: MIN_FRAME_LENGTH,
                max: max_len,
            });
        }

        if CommandId::try_from(command_id_raw).is_err() {
            return Err(CodecError::InvalidCommandId(command_id_raw));
        }

        if buf.remaining() < total_length as usize {
            return Err(CodecError::Incomplete);
        }

        Ok(total_length as usize)
    }

    /// Parse a complete frame using the shared registry
    pub fn parse(buf: &mut Cursor<&[u8]>, version: ProtocolVersion) -> Result<Frame, CodecError> {
        let header = MessageHeader::decode(buf)?;
        if buf.remaining() < header.body_len() {
            return Err(CodecError::Incomplete);
        }

        // Restrict the decoder to exactly this frame's body
        let start = buf.position() as usize;
        let end = start + header.body_len();
        let data: &[u8] = buf.get_ref();
        let body = &data[start..end];
        let mut body_cursor = Cursor::new(body);
        let frame = PduRegistry::global().decode_pdu(header, &mut body_cursor, version)?;

        buf.set_position(end as u64);
        Ok(frame)
    }
}

/// Closed set of responses the gateway writes back to a peer
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Connect(ConnectResp),
    Submit(SubmitResp),
    Deliver(DeliverResp),
    ActiveTest(ActiveTestResp),
    Terminate(TerminateResp),
}

impl Response {
    fn header(&self) -> &MessageHeader {
        match self {
            Response::Connect(pdu) => pdu.header(),
            Response::Submit(pdu) => pdu.header(),
            Response::Deliver(pdu) => pdu.header(),
            Response::ActiveTest(pdu) => pdu.header(),
            Response::Terminate(pdu) => pdu.header(),
        }
    }

    pub fn command_id(&self) -> CommandId {
        self.header().command_id
    }

    pub fn sequence_id(&self) -> u32 {
        self.header().sequence_id
    }

    pub fn to_bytes(&self, version: ProtocolVersion) -> Result<Bytes, CodecError> {
        match self {
            Response::Connect(pdu) => pdu.to_bytes(version),
            Response::Submit(pdu) => pdu.to_bytes(version),
            Response::Deliver(pdu) => pdu.to_bytes(version),
            Response::ActiveTest(pdu) => pdu.to_bytes(version),
            Response::Terminate(pdu) => pdu.to_bytes(version),
        }
    }
}

impl From<ConnectResp> for Response {
    fn from(pdu: ConnectResp) -> Self {
        Response::Connect(pdu)
    }
}

impl From<SubmitResp> for Response {
    fn from(pdu: SubmitResp) -> Self {
        Response::Submit(pdu)
    }
}

impl From<DeliverResp> for Response {
    fn from(pdu: DeliverResp) -> Self {
        Response::Deliver(pdu)
    }
}

impl From<ActiveTestResp> for Response {
    fn from(pdu: ActiveTestResp) -> Self {
        Response::ActiveTest(pdu)
    }
}

impl From<TerminateResp> for Response {
    fn from(pdu: TerminateResp) -> Self {
        Response::Terminate(pdu)
    }
}

impl From<Response> for Frame {
    fn from(response: Response) -> Self {
        match response {
            Response::Connect(pdu) => Frame::ConnectResp(pdu),
            Response::Submit(pdu) => Frame::SubmitResp(pdu),
            Response::Deliver(pdu) => Frame::DeliverResp(pdu),
            Response::ActiveTest(pdu) => Frame::ActiveTestResp(pdu),
            Response::Terminate(pdu) => Frame::TerminateResp(pdu),
        }
    }
}
