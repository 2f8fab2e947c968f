// ABOUTME: CMPP Connect handshake messages and the MD5 shared-secret authenticators
// ABOUTME: ConnectResp has two wire sizes (30 bytes on 2.0, 33 bytes on 3.0)

use crate::codec::{
    CodecError, Decodable, Encodable, MessageHeader, decode_bytes, decode_fixed_str,
    decode_status, decode_u8, decode_u32, encode_fixed_str, encode_status, require_body,
};
use crate::datatypes::{CommandId, ConnectStatus, ProtocolVersion};
use bytes::{BufMut, BytesMut};
use chrono::{Datelike, Local, Timelike};
use md5::{Digest, Md5};
use std::io::Cursor;

pub const SOURCE_ADDR_LEN: usize = 6;
pub const AUTHENTICATOR_LEN: usize = 16;

/// Number of zero bytes between source address and secret in the request digest
const AUTH_PADDING: [u8; 9] = [0; 9];

pub type Authenticator = [u8; AUTHENTICATOR_LEN];

/// `MD5(source_addr ++ 9 zero bytes ++ shared_secret ++ "%010d" timestamp)`
pub fn authenticator_source(source_addr: &str, shared_secret: &str, timestamp: u32) -> Authenticator {
    let mut hasher = Md5::new();
    hasher.update(source_addr.as_bytes());
    hasher.update(AUTH_PADDING);
    hasher.update(shared_secret.as_bytes());
    hasher.update(format!("{timestamp:010}").as_bytes());
    finish(hasher)
}

/// `MD5(decimal status ++ request authenticator ++ shared_secret)`
pub fn authenticator_ismg(
    status: ConnectStatus,
    request: &Authenticator,
    shared_secret: &str,
) -> Authenticator {
    let mut hasher = Md5::new();
    hasher.update(u32::from(status).to_string().as_bytes());
    hasher.update(request);
    hasher.update(shared_secret.as_bytes());
    finish(hasher)
}

fn finish(hasher: Md5) -> Authenticator {
    let mut out = [0u8; AUTHENTICATOR_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Local time as the MMDDHHMMSS integer carried in Connect
pub fn timestamp_now() -> u32 {
    let now = Local::now();
    now.month() * 100_000_000
        + now.day() * 1_000_000
        + now.hour() * 10_000
        + now.minute() * 100
        + now.second()
}

/// Connect request: SP login
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connect {
    pub header: MessageHeader,
    pub source_addr: String,
    pub authenticator_source: Authenticator,
    pub version: ProtocolVersion,
    /// MMDDHHMMSS
    pub timestamp: u32,
}

impl Connect {
    pub const SIZE: usize = 39;

    /// Build a login request, computing the digest from the shared secret
    pub fn new(
        sequence_id: u32,
        source_addr: impl Into<String>,
        shared_secret: &str,
        version: ProtocolVersion,
        timestamp: u32,
    ) -> Self {
        let source_addr = source_addr.into();
        let authenticator_source = authenticator_source(&source_addr, shared_secret, timestamp);
        let mut header = MessageHeader::new(CommandId::Connect, sequence_id);
        header.total_length = Self::SIZE as u32;

        Self {
            header,
            source_addr,
            authenticator_source,
            version,
            timestamp,
        }
    }

    /// Validate a login against the gateway's secret and version.
    ///
    /// A differing major version wins over a bad digest. The digest is only
    /// compared when `verify_digest` is set.
    pub fn check(
        &self,
        shared_secret: &str,
        version: ProtocolVersion,
        verify_digest: bool,
    ) -> ConnectStatus {
        if !self.version.same_major(version) {
            return ConnectStatus::VersionTooHigh;
        }

        let expected = authenticator_source(&self.source_addr, shared_secret, self.timestamp);
        if !verify_digest || expected == self.authenticator_source {
            ConnectStatus::Ok
        } else {
            ConnectStatus::AuthError
        }
    }

    pub fn to_response(
        &self,
        status: ConnectStatus,
        shared_secret: &str,
        version: ProtocolVersion,
    ) -> ConnectResp {
        ConnectResp::new(
            self.header.sequence_id,
            status,
            authenticator_ismg(status, &self.authenticator_source, shared_secret),
            version,
        )
    }
}

impl Decodable for Connect {
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        _version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        require_body(&header, buf, Self::SIZE - MessageHeader::SIZE)?;

        let source_addr = decode_fixed_str(buf, SOURCE_ADDR_LEN, "source_addr")?;
        let mut authenticator_source = [0u8; AUTHENTICATOR_LEN];
        authenticator_source.copy_from_slice(&decode_bytes(buf, AUTHENTICATOR_LEN)?);
        let version = ProtocolVersion::new(decode_u8(buf)?);
        let timestamp = decode_u32(buf)?;

        Ok(Connect {
            header,
            source_addr,
            authenticator_source,
            version,
            timestamp,
        })
    }

    fn expected_command_id() -> CommandId {
        CommandId::Connect
    }
}

impl Encodable for Connect {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError> {
        let header = MessageHeader {
            total_length: self.encoded_size(version) as u32,
            command_id: CommandId::Connect,
            sequence_id: self.header.sequence_id,
        };
        header.encode(buf);

        encode_fixed_str(buf, &self.source_addr, SOURCE_ADDR_LEN, "source_addr")?;
        buf.put_slice(&self.authenticator_source);
        buf.put_u8(self.version.raw());
        buf.put_u32(self.timestamp);
        Ok(())
    }

    fn encoded_size(&self, _version: ProtocolVersion) -> usize {
        Self::SIZE
    }
}

/// Connect response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectResp {
    pub header: MessageHeader,
    pub status: ConnectStatus,
    pub authenticator_ismg: Authenticator,
    pub version: ProtocolVersion,
}

impl ConnectResp {
    pub fn new(
        sequence_id: u32,
        status: ConnectStatus,
        authenticator_ismg: Authenticator,
        version: ProtocolVersion,
    ) -> Self {
        let mut header = MessageHeader::new(CommandId::ConnectResp, sequence_id);
        header.total_length = Self::wire_size(version) as u32;

        Self {
            header,
            status,
            authenticator_ismg,
            version,
        }
    }

    /// 33 bytes on 3.0 (u32 status), 30 bytes on 2.0 (u8 status)
    pub fn wire_size(version: ProtocolVersion) -> usize {
        MessageHeader::SIZE + version.status_len() + AUTHENTICATOR_LEN + 1
    }

    /// Check the gateway's digest against the request that was sent
    pub fn verify(&self, request: &Authenticator, shared_secret: &str) -> bool {
        authenticator_ismg(self.status, request, shared_secret) == self.authenticator_ismg
    }
}

impl Decodable for ConnectResp {
    fn decode(
        header: MessageHeader,
        buf: &mut Cursor<&[u8]>,
        version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let expected = Self::wire_size(version) as u32;
        if header.total_length != expected {
            return Err(CodecError::VersionLengthMismatch {
                command_id: CommandId::ConnectResp,
                version,
                expected,
                actual: header.total_length,
            });
        }
        require_body(&header, buf, header.body_len())?;

        let status = ConnectStatus::from(decode_status(buf, version)?);
        let mut authenticator_ismg = [0u8; AUTHENTICATOR_LEN];
        authenticator_ismg.copy_from_slice(&decode_bytes(buf, AUTHENTICATOR_LEN)?);
        let version = ProtocolVersion::new(decode_u8(buf)?);

        Ok(ConnectResp {
            header,
            status,
            authenticator_ismg,
            version,
        })
    }

    fn expected_command_id() -> CommandId {
        CommandId::ConnectResp
    }
}

impl Encodable for ConnectResp {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<(), CodecError> {
        let header = MessageHeader {
            total_length: self.encoded_size(version) as u32,
            command_id: CommandId::ConnectResp,
            sequence_id: self.header.sequence_id,
        };
        header.encode(buf);

        encode_status(buf, self.status.into(), version, "status")?;
        buf.put_slice(&self.authenticator_ismg);
        buf.put_u8(self.version.raw());
        Ok(())
    }

    fn encoded_size(&self, version: ProtocolVersion) -> usize {
        Self::wire_size(version)
    }
}

impl_pdu_header!(Connect, ConnectResp);

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "1234";

    fn decode_resp(bytes: &[u8], version: ProtocolVersion) -> Result<ConnectResp, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let header = MessageHeader::decode(&mut cursor)?;
        ConnectResp::decode(header, &mut cursor, version)
    }

    #[test]
    fn connect_wire_layout() {
        let connect = Connect::new(1, "123456", SECRET, ProtocolVersion::V30, 1001235010);
        let bytes = connect.to_bytes(ProtocolVersion::V30).unwrap();

        assert_eq!(bytes.len(), 39);
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x00, 0x27]); // total_length = 39
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x01]); // command_id = Connect
        assert_eq!(&bytes[12..18], b"123456"); // source_addr
        assert_eq!(&bytes[18..34], &connect.authenticator_source);
        assert_eq!(bytes[34], 0x30); // version
        assert_eq!(&bytes[35..39], &1001235010u32.to_be_bytes()); // timestamp
    }

    #[test]
    fn authenticator_source_matches_reference_digest() {
        let mut input = Vec::new();
        input.extend_from_slice(b"123456");
        input.extend_from_slice(&[0u8; 9]);
        input.extend_from_slice(SECRET.as_bytes());
        input.extend_from_slice(b"1001235010");
        let expected = Md5::digest(&input);

        assert_eq!(&authenticator_source("123456", SECRET, 1001235010)[..], &expected[..]);
    }

    #[test]
    fn timestamp_is_zero_padded_to_ten_digits() {
        let mut input = Vec::new();
        input.extend_from_slice(b"123456");
        input.extend_from_slice(&[0u8; 9]);
        input.extend_from_slice(SECRET.as_bytes());
        input.extend_from_slice(b"0101000000");
        let expected = Md5::digest(&input);

        assert_eq!(&authenticator_source("123456", SECRET, 101000000)[..], &expected[..]);
    }

    #[test]
    fn check_accepts_correct_digest() {
        let connect = Connect::new(1, "123456", SECRET, ProtocolVersion::V30, 1001235010);
        assert_eq!(connect.check(SECRET, ProtocolVersion::V30, true), ConnectStatus::Ok);
    }

    #[test]
    fn check_rejects_any_mutated_digest_byte() {
        let connect = Connect::new(1, "123456", SECRET, ProtocolVersion::V30, 1001235010);
        for i in 0..AUTHENTICATOR_LEN {
            let mut tampered = connect.clone();
            tampered.authenticator_source[i] ^= 0x01;
            assert_eq!(
                tampered.check(SECRET, ProtocolVersion::V30, true),
                ConnectStatus::AuthError,
                "byte {i}"
            );
        }
    }

    #[test]
    fn check_skips_digest_when_disabled() {
        let mut connect = Connect::new(1, "123456", SECRET, ProtocolVersion::V30, 1001235010);
        connect.authenticator_source = [0xAA; AUTHENTICATOR_LEN];
        assert_eq!(connect.check(SECRET, ProtocolVersion::V30, false), ConnectStatus::Ok);
    }

    #[test]
    fn check_rejects_higher_major_version() {
        let connect = Connect::new(1, "123456", SECRET, ProtocolVersion::new(0x40), 1001235010);
        assert_eq!(
            connect.check(SECRET, ProtocolVersion::V30, true),
            ConnectStatus::VersionTooHigh
        );

        let connect = Connect::new(1, "123456", SECRET, ProtocolVersion::V30, 1001235010);
        assert_eq!(
            connect.check(SECRET, ProtocolVersion::V20, true),
            ConnectStatus::VersionTooHigh
        );
    }

    #[test]
    fn connect_roundtrip() {
        let original = Connect::new(99, "901234", SECRET, ProtocolVersion::V20, 1231235959);
        let bytes = original.to_bytes(ProtocolVersion::V20).unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = MessageHeader::decode(&mut cursor).unwrap();
        let decoded = Connect::decode(header, &mut cursor, ProtocolVersion::V20).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn connect_resp_roundtrip_both_sizes() {
        let connect = Connect::new(5, "123456", SECRET, ProtocolVersion::V30, 1001235010);

        for version in [ProtocolVersion::V30, ProtocolVersion::V20] {
            let original = connect.to_response(ConnectStatus::AuthError, SECRET, version);
            let bytes = original.to_bytes(version).unwrap();
            assert_eq!(bytes.len(), ConnectResp::wire_size(version));

            let decoded = decode_resp(&bytes, version).unwrap();
            assert_eq!(original, decoded);
            assert!(decoded.verify(&connect.authenticator_source, SECRET));
        }
        assert_eq!(ConnectResp::wire_size(ProtocolVersion::V30), 33);
        assert_eq!(ConnectResp::wire_size(ProtocolVersion::V20), 30);
    }

    #[test]
    fn connect_resp_rejects_other_version_width() {
        let connect = Connect::new(5, "123456", SECRET, ProtocolVersion::V30, 1001235010);
        let resp = connect.to_response(ConnectStatus::Ok, SECRET, ProtocolVersion::V30);
        let bytes = resp.to_bytes(ProtocolVersion::V30).unwrap();

        assert!(matches!(
            decode_resp(&bytes, ProtocolVersion::V20),
            Err(CodecError::VersionLengthMismatch { expected: 30, actual: 33, .. })
        ));
    }

    #[test]
    fn connect_rejects_short_body() {
        let connect = Connect::new(1, "123456", SECRET, ProtocolVersion::V30, 1001235010);
        let bytes = connect.to_bytes(ProtocolVersion::V30).unwrap();

        let truncated = &bytes[..30];
        let mut cursor = Cursor::new(truncated);
        let header = MessageHeader::decode(&mut cursor).unwrap();
        assert!(matches!(
            Connect::decode(header, &mut cursor, ProtocolVersion::V30),
            Err(CodecError::BodyTooShort { needed: 27, available: 18, .. })
        ));
    }

    #[test]
    fn ismg_digest_covers_status() {
        let request = authenticator_source("123456", SECRET, 1001235010);
        let ok = authenticator_ismg(ConnectStatus::Ok, &request, SECRET);
        let failed = authenticator_ismg(ConnectStatus::AuthError, &request, SECRET);
        assert_ne!(ok, failed);
    }

    #[test]
    fn timestamp_now_has_ten_digit_shape() {
        let ts = timestamp_now();
        let month = ts / 100_000_000;
        assert!((1..=12).contains(&month));
    }
}
