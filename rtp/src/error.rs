use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("RTP version must be 2, got {0}")]
    ErrInvalidVersion(u8),
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("extension not found")]
    ErrHeaderExtensionNotFound,
    #[error("too many contributing sources, at most 15")]
    ErrTooManyCsrcs,
    #[error("header extension size changed: old={0} new={1}")]
    ErrExtensionLengthMismatch(usize, usize),
    #[error("padding must be between 1 and 255 bytes")]
    ErrInvalidPaddingSize,

    #[error("header extension id must be between 1 and 14 for RFC 5285 extensions")]
    ErrRfc8285oneByteHeaderIdrange,
    #[error("header extension payload must be 16bytes or less for RFC 5285 one byte extensions")]
    ErrRfc8285oneByteHeaderSize,

    #[error("header extension id must be between 1 and 255 for RFC 5285 extensions")]
    ErrRfc8285twoByteHeaderIdrange,
    #[error("header extension payload must be 255bytes or less for RFC 5285 two byte extensions")]
    ErrRfc8285twoByteHeaderSize,

    #[error("header extension payload too large for RFC 3550 extensions")]
    ErrRfc3550headerSize,

    #[error("redundant block header truncated")]
    ErrRedundancyHeaderTruncated,
    #[error("redundant block length {0} exceeds remaining payload {1}")]
    ErrRedundancyBlockTooLong(usize, usize),
    #[error("redundant timestamp offset must fit in 14 bits")]
    ErrRedundancyTimestampOffset,
    #[error("redundant block must be shorter than 1024 bytes")]
    ErrRedundancyBlockSize,

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
