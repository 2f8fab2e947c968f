use crate::codec::{
    CodecError, Decodable, Encodable, MessageHeader, Pdu, decode_u8, require_body,
};
use crate::datatypes::{CommandId, ProtocolVersion};
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

impl_header_only_pdu!(
    /// Heartbeat probe, sent by either side
    ActiveTest,
    CommandId::ActiveTest
);

impl ActiveTest {
    /// Echo response carrying the probe's sequence ID
    pub fn to_response(&self) -> ActiveTestResp {
        ActiveTestResp::new(self.header.sequence_id)
    }
}

/// Heartbeat response: header plus one reserved byte
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveTestResp {
    pub header: MessageHeader,
    pub reserved: u8,
}

impl ActiveTestResp {
    pub const SIZE: usize = MessageHeader::SIZE + 1;

    pub fn new(sequence_id: u32) -> Self {
        let mut header = MessageHeader::new(CommandId::ActiveTestResp, sequence_id);
        header.total_length = Self::SIZE as u32;
        Self {
            header,
            reserved: 0,
        }
    }
}

impl_pdu_header!(ActiveTestResp);

impl Decodable for ActiveTestResp {
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        _version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        require_body(&header, buf, 1)?;

        let reserved = decode_u8(buf)?;
        Ok(ActiveTestResp { header, reserved })
    }

    fn expected_command_id() -> CommandId {
        CommandId::ActiveTestResp
    }
}

impl Encodable for ActiveTestResp {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError> {
        let header = MessageHeader {
            total_length: self.encoded_size(version) as u32,
            command_id: CommandId::ActiveTestResp,
            sequence_id: self.sequence_id(),
        };
        header.encode(buf);
        buf.put_u8(self.reserved);
        Ok(())
    }

    fn encoded_size(&self, _version: ProtocolVersion) -> usize {
        Self::SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_test_resp_echoes_sequence() {
        let probe = ActiveTest::new(0x0000_ABCD);
        let resp = probe.to_response();
        let bytes = resp.to_bytes(ProtocolVersion::V30).unwrap();

        let expected: &[u8] = &[
            0x00, 0x00, 0x00, 0x0D, // total_length = 13
            0x80, 0x00, 0x00, 0x08, // command_id = ActiveTestResp
            0x00, 0x00, 0xAB, 0xCD, // sequence_id echoed
            0x00, // reserved
        ];
        assert_eq!(bytes.as_ref(), expected);
    }

    #[test]
    fn active_test_resp_roundtrip() {
        let original = ActiveTestResp::new(7);
        let bytes = original.to_bytes(ProtocolVersion::V20).unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = MessageHeader::decode(&mut cursor).unwrap();
        let decoded = ActiveTestResp::decode(header, &mut cursor, ProtocolVersion::V20).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn active_test_resp_requires_reserved_byte() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x0C, // total_length = 12
            0x80, 0x00, 0x00, 0x08, // command_id = ActiveTestResp
            0x00, 0x00, 0x00, 0x01, // sequence_id
        ];
        let mut cursor = Cursor::new(data);
        let header = MessageHeader::decode(&mut cursor).unwrap();
        assert!(matches!(
            ActiveTestResp::decode(header, &mut cursor, ProtocolVersion::V30),
            Err(CodecError::BodyTooShort { needed: 1, available: 0, .. })
        ));
    }
}
