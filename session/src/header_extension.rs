use std::collections::HashMap;

use rtp::extension::{ABS_SEND_TIME_URI, TRANSPORT_CC_URI};
use rtp::header::{ExtensionProfile, MAX_ONE_BYTE_EXTENSION_ID, MAX_TWO_BYTE_EXTENSION_ID};

use crate::error::{Error, Result};

/// Which way a negotiated extension id is used.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExtensionDirection {
    Send,
    Receive,
    SendReceive,
}

impl ExtensionDirection {
    fn covers(self, other: ExtensionDirection) -> bool {
        self == ExtensionDirection::SendReceive
            || other == ExtensionDirection::SendReceive
            || self == other
    }
}

/// Header extension uris the session acts on itself.
pub const KNOWN_EXTENSION_URIS: [&str; 2] = [ABS_SEND_TIME_URI, TRANSPORT_CC_URI];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExtensionEntry {
    uri: String,
    direction: ExtensionDirection,
}

/// HeaderExtensionMap holds the extension ids agreed during negotiation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderExtensionMap {
    entries: HashMap<u16, ExtensionEntry>,
}

impl HeaderExtensionMap {
    pub fn new() -> Self {
        HeaderExtensionMap::default()
    }

    /// register binds `id` to `uri`, replacing an earlier binding of that id.
    pub fn register(&mut self, id: u16, uri: &str, direction: ExtensionDirection) -> Result<()> {
        if id == 0 || id > MAX_TWO_BYTE_EXTENSION_ID {
            return Err(Error::Rtp(rtp::Error::ErrRfc8285twoByteHeaderIdrange));
        }
        self.entries.insert(
            id,
            ExtensionEntry {
                uri: uri.to_owned(),
                direction,
            },
        );
        Ok(())
    }

    /// id_for finds the id negotiated for `uri` in `direction`.
    pub fn id_for(&self, uri: &str, direction: ExtensionDirection) -> Option<u16> {
        self.entries
            .iter()
            .filter(|(_, e)| e.uri == uri && e.direction.covers(direction))
            .map(|(id, _)| *id)
            .min()
    }

    pub fn uri_for(&self, id: u16) -> Option<&str> {
        self.entries.get(&id).map(|e| e.uri.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// profile_for_id picks the smallest RFC 5285 form able to carry `id`.
pub(crate) fn profile_for_id(id: u16) -> ExtensionProfile {
    if id <= MAX_ONE_BYTE_EXTENSION_ID {
        ExtensionProfile::OneByte
    } else {
        ExtensionProfile::TwoByte
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_extension_map() -> Result<()> {
        let mut m = HeaderExtensionMap::new();
        m.register(3, ABS_SEND_TIME_URI, ExtensionDirection::SendReceive)?;
        m.register(5, TRANSPORT_CC_URI, ExtensionDirection::Receive)?;
        m.register(20, "urn:example:custom", ExtensionDirection::Send)?;

        let tests = vec![
            (ABS_SEND_TIME_URI, ExtensionDirection::Send, Some(3)),
            (ABS_SEND_TIME_URI, ExtensionDirection::Receive, Some(3)),
            (TRANSPORT_CC_URI, ExtensionDirection::Receive, Some(5)),
            (TRANSPORT_CC_URI, ExtensionDirection::Send, None),
            ("urn:example:custom", ExtensionDirection::Send, Some(20)),
            ("urn:example:missing", ExtensionDirection::Send, None),
        ];
        for (uri, direction, want) in tests {
            assert_eq!(m.id_for(uri, direction), want, "{uri} {direction:?}");
        }

        assert_eq!(m.uri_for(5), Some(TRANSPORT_CC_URI));
        assert_eq!(m.uri_for(6), None);
        assert_eq!(m.len(), 3);
        assert!(KNOWN_EXTENSION_URIS.contains(&m.uri_for(3).unwrap_or_default()));

        Ok(())
    }

    #[test]
    fn test_header_extension_map_rejects_bad_id() {
        let mut m = HeaderExtensionMap::new();
        assert!(m.register(0, ABS_SEND_TIME_URI, ExtensionDirection::Send).is_err());
        assert!(m.register(256, ABS_SEND_TIME_URI, ExtensionDirection::Send).is_err());
        assert!(m.is_empty());
    }

    #[test]
    fn test_profile_for_id() {
        assert_eq!(profile_for_id(1), ExtensionProfile::OneByte);
        assert_eq!(profile_for_id(14), ExtensionProfile::OneByte);
        assert_eq!(profile_for_id(15), ExtensionProfile::TwoByte);
    }
}
