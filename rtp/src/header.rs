use std::fmt;

use bytes::Bytes;

pub const HEADER_LENGTH: usize = 12;
pub const RTP_VERSION: u8 = 2;
pub const VERSION_SHIFT: u8 = 6;
pub const VERSION_MASK: u8 = 0x3;
pub const PADDING_SHIFT: u8 = 5;
pub const PADDING_MASK: u8 = 0x1;
pub const EXTENSION_SHIFT: u8 = 4;
pub const EXTENSION_MASK: u8 = 0x1;
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;
pub const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;
pub const EXTENSION_PROFILE_TWO_BYTE_MASK: u16 = 0xFFF0;
pub const EXTENSION_ID_RESERVED: u8 = 0xF;
pub const EXTENSION_HEADER_LENGTH: usize = 4;
pub const MAX_ONE_BYTE_EXTENSION_ID: u16 = 14;
pub const MAX_TWO_BYTE_EXTENSION_ID: u16 = 255;
pub const CC_MASK: u8 = 0xF;
pub const MAX_CSRC_COUNT: usize = 15;
pub const MARKER_SHIFT: u8 = 7;
pub const MARKER_MASK: u8 = 0x1;
pub const PT_MASK: u8 = 0x7F;
pub const SEQ_NUM_OFFSET: usize = 2;
pub const TIMESTAMP_OFFSET: usize = 4;
pub const SSRC_OFFSET: usize = 8;
pub const CSRC_OFFSET: usize = 12;
pub const CSRC_LENGTH: usize = 4;

/// ExtensionProfile selects how the elements of a header extension are addressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtensionProfile {
    /// RFC 5285 one-byte header, profile 0xBEDE, ids 1-14, 1-16 bytes each.
    OneByte,
    /// RFC 5285 two-byte header, profile 0x100X, ids 1-255, 0-255 bytes each.
    TwoByte,
    /// A single RFC 3550 extension, identified by its profile value.
    Rfc3550(u16),
}

impl ExtensionProfile {
    /// Classifies the 16 bit "defined by profile" field of an extension header.
    pub fn from_profile(profile: u16) -> Self {
        if profile == EXTENSION_PROFILE_ONE_BYTE {
            ExtensionProfile::OneByte
        } else if profile & EXTENSION_PROFILE_TWO_BYTE_MASK == EXTENSION_PROFILE_TWO_BYTE {
            ExtensionProfile::TwoByte
        } else {
            ExtensionProfile::Rfc3550(profile)
        }
    }

    /// The value written into the profile field for a freshly created extension block.
    pub fn profile(&self) -> u16 {
        match self {
            ExtensionProfile::OneByte => EXTENSION_PROFILE_ONE_BYTE,
            ExtensionProfile::TwoByte => EXTENSION_PROFILE_TWO_BYTE,
            ExtensionProfile::Rfc3550(p) => *p,
        }
    }

    pub(crate) fn same_mode(&self, other: &ExtensionProfile) -> bool {
        match (self, other) {
            (ExtensionProfile::OneByte, ExtensionProfile::OneByte) => true,
            (ExtensionProfile::TwoByte, ExtensionProfile::TwoByte) => true,
            (ExtensionProfile::Rfc3550(a), ExtensionProfile::Rfc3550(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ExtensionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionProfile::OneByte => write!(f, "RFC5285-1"),
            ExtensionProfile::TwoByte => write!(f, "RFC5285-2"),
            ExtensionProfile::Rfc3550(p) => write!(f, "RFC3550(0x{p:04x})"),
        }
    }
}

/// Extension is one decoded header extension element. For RFC 3550 extensions
/// the id is the profile value.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Extension {
    pub id: u16,
    pub payload: Bytes,
}

/// Location of one element inside the extension body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct ExtensionElement {
    pub(crate) id: u16,
    /// offset of the element data, relative to the start of the body
    pub(crate) data: usize,
    pub(crate) len: usize,
}

/// Walks an extension body, returning the elements and the offset just past the last
/// element. Padding bytes are skipped and a truncated element ends the walk.
pub(crate) fn parse_extension_elements(
    profile: ExtensionProfile,
    body: &[u8],
) -> (Vec<ExtensionElement>, usize) {
    let mut elements = vec![];
    let mut end = 0;

    match profile {
        ExtensionProfile::OneByte => {
            /*
             *  0
             *  0 1 2 3 4 5 6 7
             * +-+-+-+-+-+-+-+-+
             * |  ID   |  len  |
             * +-+-+-+-+-+-+-+-+
             */
            let mut i = 0;
            while i < body.len() {
                let b = body[i];
                if b == 0x00 {
                    i += 1;
                    continue;
                }
                let id = b >> 4;
                if id == EXTENSION_ID_RESERVED {
                    break;
                }
                let len = ((b & 0x0F) + 1) as usize;
                if i + 1 + len > body.len() {
                    break;
                }
                elements.push(ExtensionElement {
                    id: id as u16,
                    data: i + 1,
                    len,
                });
                i += 1 + len;
                end = i;
            }
        }
        ExtensionProfile::TwoByte => {
            /*
             *  0                   1
             *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
             * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
             * |       ID      |     length    |
             * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
             */
            let mut i = 0;
            while i < body.len() {
                let id = body[i];
                if id == 0x00 {
                    i += 1;
                    continue;
                }
                if i + 2 > body.len() {
                    break;
                }
                let len = body[i + 1] as usize;
                if i + 2 + len > body.len() {
                    break;
                }
                elements.push(ExtensionElement {
                    id: id as u16,
                    data: i + 2,
                    len,
                });
                i += 2 + len;
                end = i;
            }
        }
        ExtensionProfile::Rfc3550(p) => {
            elements.push(ExtensionElement {
                id: p,
                data: 0,
                len: body.len(),
            });
            end = body.len();
        }
    }

    (elements, end)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_extension_profile_from_profile() {
        let tests = vec![
            (0xBEDE, ExtensionProfile::OneByte),
            (0x1000, ExtensionProfile::TwoByte),
            (0x100F, ExtensionProfile::TwoByte),
            (0x1010, ExtensionProfile::Rfc3550(0x1010)),
            (0x0001, ExtensionProfile::Rfc3550(0x0001)),
        ];

        for (profile, want) in tests {
            assert_eq!(
                ExtensionProfile::from_profile(profile),
                want,
                "profile 0x{profile:04x}"
            );
        }
    }

    #[test]
    fn test_parse_one_byte_skips_padding_and_stops_at_reserved() {
        let body = [0x10, 0xAA, 0x00, 0x21, 0xBB, 0xCC, 0xF0, 0x31, 0x00, 0x00];
        let (elements, end) = parse_extension_elements(ExtensionProfile::OneByte, &body);
        assert_eq!(
            elements,
            vec![
                ExtensionElement {
                    id: 1,
                    data: 1,
                    len: 1
                },
                ExtensionElement {
                    id: 2,
                    data: 4,
                    len: 2
                },
            ]
        );
        assert_eq!(end, 6);
    }

    #[test]
    fn test_parse_two_byte_truncated() {
        let body = [0x05, 0x01, 0xAA, 0x00, 0x07, 0x09, 0x01];
        let (elements, end) = parse_extension_elements(ExtensionProfile::TwoByte, &body);
        assert_eq!(
            elements,
            vec![ExtensionElement {
                id: 5,
                data: 2,
                len: 1
            }]
        );
        assert_eq!(end, 3);
    }
}
