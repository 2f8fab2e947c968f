//! Integration tests for CMPP frame encoding and decoding

use crate::codec::{CodecError, Encodable, Frame, MessageHeader, PduRegistry, RawFrame};
use crate::config::SubmitDefaults;
use crate::datatypes::*;
use crate::sequence::CycleSequence;
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn header_bytes(total_length: u32, command_id: u32, sequence_id: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&total_length.to_be_bytes());
        data.extend_from_slice(&command_id.to_be_bytes());
        data.extend_from_slice(&sequence_id.to_be_bytes());
        data
    }

    #[test]
    fn test_frame_check_insufficient_data() {
        let data = vec![0x00, 0x00]; // Only 2 bytes
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor, 512);
        assert!(matches!(result, Err(CodecError::Incomplete)));
    }

    #[test]
    fn test_frame_check_partial_body() {
        let data = header_bytes(39, 0x0000_0001, 1);
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor, 512);
        assert!(matches!(result, Err(CodecError::Incomplete)));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_frame_check_invalid_length() {
        let data = header_bytes(5, 0x0000_0008, 1);
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor, 512);
        assert!(matches!(
            result,
            Err(CodecError::InvalidFrameLength { length: 5, .. })
        ));
    }

    #[test]
    fn test_frame_check_length_too_large() {
        let data = header_bytes(u32::MAX, 0x0000_0004, 1);
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor, 512);
        assert!(matches!(
            result,
            Err(CodecError::InvalidFrameLength { max: 512, .. })
        ));
    }

    #[test]
    fn test_frame_check_unknown_command() {
        let data = header_bytes(12, 0x0000_0009, 1);
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor, 512);
        assert!(matches!(result, Err(CodecError::InvalidCommandId(0x0000_0009))));
    }

    #[test]
    fn test_registry_knows_every_command() {
        let registry = PduRegistry::global();
        for command_id in [
            CommandId::Connect,
            CommandId::ConnectResp,
            CommandId::Terminate,
            CommandId::TerminateResp,
            CommandId::Submit,
            CommandId::SubmitResp,
            CommandId::Deliver,
            CommandId::DeliverResp,
            CommandId::ActiveTest,
            CommandId::ActiveTestResp,
        ] {
            assert!(registry.is_registered(command_id), "{command_id:?}");
        }
        assert_eq!(registry.registered_commands().len(), 10);
    }

    #[test]
    fn test_split_stream_of_mixed_frames() {
        let version = ProtocolVersion::V30;
        let frames = vec![
            Frame::Connect(Connect::new(1, "901234", "123456", version, 1017120000)),
            Frame::ActiveTest(ActiveTest::new(2)),
            Frame::SubmitResp(SubmitResp::new(3, 77, SubmitResult::FlowControl, version)),
            Frame::Terminate(Terminate::new(4)),
        ];

        let mut buffer = BytesMut::new();
        for frame in &frames {
            buffer.extend_from_slice(&frame.to_bytes(version).unwrap());
        }
        // Trailing half header stays buffered
        buffer.put_slice(&[0x00, 0x00, 0x00]);

        let mut decoded = Vec::new();
        while let Some(raw) = RawFrame::split_from(&mut buffer, 512).unwrap() {
            decoded.push(raw.decode(version).unwrap());
        }

        assert_eq!(decoded, frames);
        assert_eq!(buffer.len(), 3);
        assert!(!decoded[0].is_response());
        assert!(decoded[2].is_response());
        assert_eq!(decoded[3].sequence_id(), 4);
    }

    #[test]
    fn test_submit_frame_decodes_per_version() {
        let defaults = SubmitDefaults::default();
        let sequences = CycleSequence::new();

        for version in [ProtocolVersion::V20, ProtocolVersion::V30] {
            let submit = SubmitBuilder::new(&defaults, version)
                .msg_src("901234")
                .destinations(["13800138000", "13900139000"])
                .text("你好")
                .build(&sequences)
                .unwrap()
                .remove(0);

            let bytes = submit.to_bytes(version).unwrap();
            assert_eq!(
                bytes.len(),
                Submit::base_size(version) + 2 * version.terminal_id_len() + 4
            );

            let mut cursor = Cursor::new(bytes.as_ref());
            let Frame::Submit(decoded) = Frame::parse(&mut cursor, version).unwrap() else {
                panic!("expected submit");
            };
            assert_eq!(decoded.dest_terminal_ids, submit.dest_terminal_ids);
            assert_eq!(decoded.msg_fmt, MsgFormat::Ucs2);
            assert_eq!(decoded.text(), "你好");
        }
    }

    #[test]
    fn test_submit_read_with_wrong_version_fails() {
        let defaults = SubmitDefaults::default();
        let submit = SubmitBuilder::new(&defaults, ProtocolVersion::V30)
            .destination("13800138000")
            .text("hello")
            .build(&CycleSequence::new())
            .unwrap()
            .remove(0);
        let bytes = submit.to_bytes(ProtocolVersion::V30).unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let decoded = Frame::parse(&mut cursor, ProtocolVersion::V20);
        assert!(decoded.is_err() || decoded.unwrap() != Frame::Submit(Box::new(submit)));
    }

    #[test]
    fn test_report_deliver_frame() {
        let version = ProtocolVersion::V30;
        let report = Report {
            msg_id: 0x0123_4567_89AB_CDEF,
            stat: ReportStat::Delivered,
            submit_time: "2610171200".to_string(),
            done_time: "2610171201".to_string(),
            dest_terminal_id: "13800138000".to_string(),
            smsc_sequence: 99,
        };
        let deliver = Deliver::report(
            8,
            1,
            "1068888",
            "MI0000",
            "13800138000",
            report.clone(),
            version,
        );
        let bytes = deliver.to_bytes(version).unwrap();
        assert_eq!(bytes.len(), Deliver::base_size(version) + Report::SIZE);

        let mut cursor = Cursor::new(bytes.as_ref());
        let Frame::Deliver(decoded) = Frame::parse(&mut cursor, version).unwrap() else {
            panic!("expected deliver");
        };
        assert!(decoded.is_report());
        assert_eq!(decoded.as_report(), Some(&report));
        assert_eq!(decoded.text(), None);

        let resp = decoded.to_response(DeliverResult::Ok, version);
        assert_eq!(resp.header.sequence_id, 8);
        assert_eq!(resp.msg_id, 1);
    }

    #[test]
    fn test_header_only_frames_carry_sequence() {
        let mut buf = BytesMut::new();
        MessageHeader::new(CommandId::TerminateResp, 0x7FFF_FFFF).encode(&mut buf);

        let mut cursor = Cursor::new(&buf[..]);
        let frame = Frame::parse(&mut cursor, ProtocolVersion::V20).unwrap();
        assert_eq!(frame, Frame::TerminateResp(TerminateResp::new(0x7FFF_FFFF)));
    }
}
