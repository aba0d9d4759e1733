use std::borrow::Cow;
use std::fmt;

use util::{Marshal, MarshalSize};

pub mod abs_send_time_extension;
pub mod transport_cc_extension;

pub const ABS_SEND_TIME_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";

/// A typed RTP header extension payload, named by the URI negotiated for it.
pub enum HeaderExtension {
    AbsSendTime(abs_send_time_extension::AbsSendTimeExtension),
    TransportCc(transport_cc_extension::TransportCcExtension),

    /// An extension this crate has no codec for
    Custom {
        uri: Cow<'static, str>,
        extension: Box<dyn Marshal + Send + Sync + 'static>,
    },
}

impl HeaderExtension {
    pub fn uri(&self) -> Cow<'static, str> {
        match self {
            HeaderExtension::AbsSendTime(_) => ABS_SEND_TIME_URI.into(),
            HeaderExtension::TransportCc(_) => TRANSPORT_CC_URI.into(),
            HeaderExtension::Custom { uri, .. } => uri.clone(),
        }
    }

    pub fn is_same(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

impl MarshalSize for HeaderExtension {
    fn marshal_size(&self) -> usize {
        match self {
            HeaderExtension::AbsSendTime(ext) => ext.marshal_size(),
            HeaderExtension::TransportCc(ext) => ext.marshal_size(),
            HeaderExtension::Custom { extension, .. } => extension.marshal_size(),
        }
    }
}

impl Marshal for HeaderExtension {
    fn marshal_to(&self, buf: &mut [u8]) -> util::Result<usize> {
        match self {
            HeaderExtension::AbsSendTime(ext) => ext.marshal_to(buf),
            HeaderExtension::TransportCc(ext) => ext.marshal_to(buf),
            HeaderExtension::Custom { extension, .. } => extension.marshal_to(buf),
        }
    }
}

impl fmt::Debug for HeaderExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderExtension::AbsSendTime(ext) => f.debug_tuple("AbsSendTime").field(ext).finish(),
            HeaderExtension::TransportCc(ext) => f.debug_tuple("TransportCc").field(ext).finish(),
            HeaderExtension::Custom { uri, .. } => f.debug_struct("Custom").field("uri", uri).finish(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use abs_send_time_extension::AbsSendTimeExtension;
    use transport_cc_extension::TransportCcExtension;

    #[test]
    fn test_header_extension_marshal() -> util::Result<()> {
        let tests = vec![
            (
                HeaderExtension::AbsSendTime(AbsSendTimeExtension { timestamp: 0x010203 }),
                vec![0x01u8, 0x02, 0x03],
            ),
            (
                HeaderExtension::TransportCc(TransportCcExtension {
                    transport_sequence: 0x0405,
                }),
                vec![0x04, 0x05],
            ),
            (
                HeaderExtension::Custom {
                    uri: "urn:example:custom".into(),
                    extension: Box::new(TransportCcExtension {
                        transport_sequence: 7,
                    }),
                },
                vec![0x00, 0x07],
            ),
        ];

        for (ext, want) in tests {
            assert_eq!(&ext.marshal()?[..], &want[..], "{:?}", ext);
        }

        Ok(())
    }

    #[test]
    fn test_header_extension_is_same() {
        let a = HeaderExtension::AbsSendTime(AbsSendTimeExtension::default());
        let b = HeaderExtension::AbsSendTime(AbsSendTimeExtension { timestamp: 1 });
        let c = HeaderExtension::TransportCc(TransportCcExtension::default());
        assert!(a.is_same(&b));
        assert!(!a.is_same(&c));
        assert_eq!(c.uri(), TRANSPORT_CC_URI);
    }
}
