use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
    #[error("unknown SSRC {0:08x}")]
    UnknownSsrc(u32),
    #[error("unsupported feedback type")]
    UnsupportedFeedbackType,
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("SSRC {0:08x} already in use with a different direction or CNAME")]
    SsrcClash(u32),
    #[error("session is closed")]
    SessionClosed,
    #[error("feedback type not negotiated")]
    FeedbackNotNegotiated,
    #[error("SSRC {0:08x} is a retransmission source")]
    RtxSource(u32),
    #[error("Invalid CloseRx Channel")]
    ErrInvalidCloseRx,

    #[error("{0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("{0}")]
    Rtp(#[from] rtp::Error),
    #[error("{0}")]
    Util(#[from] util::Error),

    #[error("{0}")]
    Other(String),
}

impl From<Error> for util::Error {
    fn from(e: Error) -> Self {
        util::Error::from_std(e)
    }
}

impl PartialEq<util::Error> for Error {
    fn eq(&self, other: &util::Error) -> bool {
        if let Some(down) = other.downcast_ref::<Error>() {
            self == down
        } else {
            false
        }
    }
}

impl From<&Error> for crate::SendReceiveStatus {
    fn from(e: &Error) -> Self {
        match e {
            Error::TransportFailure(_) => crate::SendReceiveStatus::AbortTransport,
            _ => crate::SendReceiveStatus::IgnorePacket,
        }
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<Error>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.to_string()).collect();
        Err(Error::Other(errs_strs.join("\n")))
    }
}
