// ABOUTME: This module provides macros to reduce boilerplate in CMPP message implementations
// ABOUTME: Includes header forwarding and complete codecs for header-only messages

/// Forward the [`Pdu`](crate::codec::Pdu) accessors to a message's `header` field.
macro_rules! impl_pdu_header {
    ($($pdu_type:ident),* $(,)?) => {
        $(
            impl $crate::codec::Pdu for $pdu_type {
                fn header(&self) -> &$crate::codec::MessageHeader {
                    &self.header
                }
            }
        )*
    };
}

/// Macro for implementing a complete header-only message (no body)
///
/// # Arguments
/// * `$pdu_type` - The message struct name (e.g., Terminate)
/// * `$command_id` - The CommandId variant (e.g., CommandId::Terminate)
///
/// # Generated code
/// - The struct itself, holding only its header
/// - `new(sequence_id)` constructor
/// - Pdu, Decodable and Encodable implementations
macro_rules! impl_header_only_pdu {
    ($(#[$meta:meta])* $pdu_type:ident, $command_id:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $pdu_type {
            pub header: $crate::codec::MessageHeader,
        }

        impl $pdu_type {
            pub fn new(sequence_id: u32) -> Self {
                Self {
                    header: $crate::codec::MessageHeader::new($command_id, sequence_id),
                }
            }
        }

        impl_pdu_header!($pdu_type);

        impl $crate::codec::Decodable for $pdu_type {
            fn expected_command_id() -> $crate::datatypes::CommandId {
                $command_id
            }

            fn decode(
                header: $crate::codec::MessageHeader,
                buf: &mut std::io::Cursor<&[u8]>,
                _version: $crate::datatypes::ProtocolVersion,
            ) -> Result<Self, $crate::codec::CodecError> {
                use bytes::Buf;

                Self::validate_header(&header)?;

                // Header-only messages should have no body
                if buf.has_remaining() {
                    return Err($crate::codec::CodecError::FieldValidation {
                        field: concat!(stringify!($pdu_type), "_body"),
                        reason: concat!(stringify!($pdu_type), " should have no body").to_string(),
                    });
                }

                Ok($pdu_type { header })
            }
        }

        impl $crate::codec::Encodable for $pdu_type {
            fn encode(
                &self,
                buf: &mut bytes::BytesMut,
                _version: $crate::datatypes::ProtocolVersion,
            ) -> Result<(), $crate::codec::CodecError> {
                let header = $crate::codec::MessageHeader {
                    total_length: $crate::codec::MessageHeader::SIZE as u32,
                    command_id: $command_id,
                    sequence_id: self.header.sequence_id,
                };
                header.encode(buf);
                Ok(())
            }

            fn encoded_size(&self, _version: $crate::datatypes::ProtocolVersion) -> usize {
                $crate::codec::MessageHeader::SIZE
            }
        }
    };
}
