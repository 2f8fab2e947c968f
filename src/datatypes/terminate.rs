use crate::datatypes::CommandId;

impl_header_only_pdu!(
    /// Terminate: either side asks to close the session
    Terminate,
    CommandId::Terminate
);

impl_header_only_pdu!(
    /// Acknowledges a Terminate; the receiver of this closes the socket
    TerminateResp,
    CommandId::TerminateResp
);

impl Terminate {
    pub fn to_response(&self) -> TerminateResp {
        TerminateResp::new(self.header.sequence_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decodable, Encodable, MessageHeader, Pdu};
    use crate::datatypes::ProtocolVersion;
    use std::io::Cursor;

    #[test]
    fn terminate_is_header_only() {
        let terminate = Terminate::new(0x0102_0304);
        let bytes = terminate.to_bytes(ProtocolVersion::V30).unwrap();

        let expected: &[u8] = &[
            0x00, 0x00, 0x00, 0x0C, // total_length = 12
            0x00, 0x00, 0x00, 0x02, // command_id = Terminate
            0x01, 0x02, 0x03, 0x04, // sequence_id
        ];
        assert_eq!(bytes.as_ref(), expected);
    }

    #[test]
    fn terminate_resp_roundtrip() {
        let original = Terminate::new(42).to_response();
        assert_eq!(original.sequence_id(), 42);

        let bytes = original.to_bytes(ProtocolVersion::V20).unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = MessageHeader::decode(&mut cursor).unwrap();
        let decoded = TerminateResp::decode(header, &mut cursor, ProtocolVersion::V20).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn terminate_rejects_body() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x0D, // total_length = 13
            0x00, 0x00, 0x00, 0x02, // command_id = Terminate
            0x00, 0x00, 0x00, 0x01, // sequence_id
            0xFF, // unexpected body
        ];
        let mut cursor = Cursor::new(data);
        let header = MessageHeader::decode(&mut cursor).unwrap();
        assert!(Terminate::decode(header, &mut cursor, ProtocolVersion::V30).is_err());
    }
}
