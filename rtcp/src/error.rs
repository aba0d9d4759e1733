use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid header")]
    InvalidHeader,
    #[error("empty compound packet")]
    EmptyCompound,
    #[error("compound packet must open with an SR or RR")]
    BadFirstPacket,
    #[error("compound packet has no SDES CNAME")]
    MissingCname,
    #[error("feedback before the SDES CNAME")]
    PacketBeforeCname,
    #[error("more than 31 report blocks")]
    TooManyReports,
    #[error("more than 31 SDES chunks")]
    TooManyChunks,
    #[error("more sources than the count field holds")]
    TooManySources,
    #[error("packet too short")]
    PacketTooShort,
    #[error("buffer too short")]
    BufferTooShort,
    #[error("wrong packet type")]
    WrongType,
    #[error("SDES text longer than 255 octets")]
    SdesTextTooLong,
    #[error("SDES item without a type")]
    SdesMissingType,
    #[error("BYE reason longer than 255 octets")]
    ReasonTooLong,
    #[error("version is not 2")]
    BadVersion,
    #[error("invalid padding")]
    WrongPadding,
    #[error("media SSRC must be zero")]
    SsrcMustBeZero,
    #[error("REMB identifier missing")]
    MissingRembIdentifier,
    #[error("SSRC count does not match the packet length")]
    SsrcNumAndLengthMismatch,
    #[error("receive delta out of range")]
    DeltaExceedLimit,
    #[error("packet status chunk is not 2 octets")]
    PacketStatusChunkLength,
    #[error("bitrate does not fit the exponent and mantissa")]
    InvalidBitrate,
    #[error("application name must be 4 octets")]
    AppNameLength,
    #[error("application subtype must fit in 5 bits")]
    InvalidSubtype,
    #[error("measured overhead must fit in 9 bits")]
    InvalidOverhead,
    #[error("trade-off index must fit in 5 bits")]
    InvalidTradeOff,
    /// a sub-packet declares more bytes than the compound holds
    #[error("sub-packet of {0} bytes overruns the remaining {1}")]
    LengthOverrun(usize, usize),
    #[error("no sub-packet is open")]
    NoOpenSubpacket,
    #[error("packet type outside 192..=223")]
    InvalidPacketType,

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

impl Error {
    /// Unwraps an rtcp error that travelled through a `util::Error`.
    pub(crate) fn flatten(err: util::Error) -> Self {
        err.downcast::<Error>().unwrap_or_else(Error::Util)
    }
}

impl PartialEq<util::Error> for Error {
    fn eq(&self, other: &util::Error) -> bool {
        other.downcast_ref::<Error>().map_or(false, |down| self == down)
    }
}
