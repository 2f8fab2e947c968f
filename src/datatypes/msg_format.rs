// ABOUTME: CMPP Msg_Fmt values and the text encodings the gateway understands
// ABOUTME: Decides per-fragment byte budgets (160 single-byte, 140 otherwise)

use num_enum::{FromPrimitive, IntoPrimitive};

/// Message content format (Msg_Fmt)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MsgFormat {
    /// ASCII
    Ascii = 0,
    /// SIM write-card operation
    WriteCard = 3,
    /// Binary
    Binary = 4,
    /// UCS2, carried as UTF-16BE
    Ucs2 = 8,
    /// GB18030/GBK, passed through as raw bytes
    Gb = 15,
    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for MsgFormat {
    fn default() -> Self {
        MsgFormat::Ascii
    }
}

impl MsgFormat {
    /// ASCII when every character is ASCII, UCS2 otherwise
    pub fn for_text(text: &str) -> MsgFormat {
        if text.is_ascii() {
            MsgFormat::Ascii
        } else {
            MsgFormat::Ucs2
        }
    }

    pub fn is_single_byte(&self) -> bool {
        *self == MsgFormat::Ascii
    }

    /// Maximum bytes of content per physical message
    pub fn fragment_cap(&self) -> usize {
        if self.is_single_byte() { 160 } else { 140 }
    }

    /// Maximum characters of text per physical message
    pub fn char_cap(&self) -> usize {
        if self.is_single_byte() { 160 } else { 70 }
    }

    /// Encode text in this format.
    ///
    /// Formats the gateway cannot produce fall back to UTF-8 bytes.
    pub fn encode_text(&self, text: &str) -> Vec<u8> {
        match self {
            MsgFormat::Ucs2 => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            _ => text.as_bytes().to_vec(),
        }
    }

    /// Decode content bytes in this format
    pub fn decode_text(&self, content: &[u8]) -> String {
        match self {
            MsgFormat::Ucs2 => {
                let units: Vec<u16> = content
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            _ => String::from_utf8_lossy(content).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_format_from_text() {
        assert_eq!(MsgFormat::for_text("hello"), MsgFormat::Ascii);
        assert_eq!(MsgFormat::for_text("hello 世界"), MsgFormat::Ucs2);
    }

    #[test]
    fn ucs2_is_utf16_big_endian() {
        let bytes = MsgFormat::Ucs2.encode_text("A世");
        assert_eq!(bytes, vec![0x00, 0x41, 0x4E, 0x16]);
        assert_eq!(MsgFormat::Ucs2.decode_text(&bytes), "A世");
    }

    #[test]
    fn caps_depend_on_width() {
        assert_eq!(MsgFormat::Ascii.fragment_cap(), 160);
        assert_eq!(MsgFormat::Ucs2.fragment_cap(), 140);
        assert_eq!(MsgFormat::Gb.fragment_cap(), 140);
        assert_eq!(MsgFormat::Ucs2.char_cap(), 70);
    }

    #[test]
    fn unknown_formats_are_preserved() {
        assert_eq!(MsgFormat::from(25), MsgFormat::Other(25));
        assert_eq!(u8::from(MsgFormat::Other(25)), 25);
        assert_eq!(u8::from(MsgFormat::Gb), 15);
    }
}
