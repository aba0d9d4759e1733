use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer: short")]
    ErrBufferShort,
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("marshal_to output size {0}, but expect {1}")]
    ErrMarshalSizeMismatch(usize, usize),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Std(#[source] StdError),
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn from_std<T>(error: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        Error::Std(StdError(Box::new(error)))
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        if let Error::Std(s) = self {
            return s.0.downcast_ref();
        }

        None
    }

    /// Takes back ownership of a wrapped higher-crate error.
    pub fn downcast<T>(self) -> std::result::Result<T, Self>
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Error::Std(StdError(inner)) => inner
                .downcast::<T>()
                .map(|e| *e)
                .map_err(|inner| Error::Std(StdError(inner))),
            err => Err(err),
        }
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

/// Carries a codec error from a higher crate through the shared `Marshal`/`Unmarshal`
/// signatures. `rtp::Error` and `rtcp::Error` convert into this with `Error::from_std`,
/// and callers get them back with `downcast_ref`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StdError(pub Box<dyn std::error::Error + Send + Sync>);

impl PartialEq for StdError {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}
