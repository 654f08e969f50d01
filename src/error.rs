use std::{io, path::PathBuf};

use derive_more::{Display, Error, From};

use crate::{decode::DecodeError, encode::EncodeError};

/// Coarse classification shared by every error in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// The input is not a well-formed QOI stream.
    #[display("format error")]
    Format,
    /// Dimensions are zero or overflow.
    #[display("size error")]
    Size,
    /// Reading or writing through a [`Storage`](crate::Storage) failed.
    #[display("i/o error")]
    Io,
    /// The encoder was handed arguments it cannot represent.
    #[display("invalid argument")]
    InvalidArgument,
}

/// Everything that can go wrong converting one image.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    #[display("failed to decode QOI: {_0}")]
    Decode(#[error(source)] DecodeError),
    #[display("failed to encode: {_0}")]
    Encode(#[error(source)] EncodeError),
    #[display("i/o error on {}: {source}", path.display())]
    #[from(ignore)]
    Io { path: PathBuf, source: io::Error },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(e) => e.kind(),
            Self::Encode(e) => e.kind(),
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn kinds_follow_the_wrapped_error() {
        let err = Error::from(DecodeError::InvalidMagic { found: *b"qoix" });
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("[71, 6f, 69, 78]"));
        assert!(err.source().is_some());

        let err = Error::from(EncodeError::InvalidChannels { found: 2 });
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = Error::Io {
            path: PathBuf::from("in.qoi"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().starts_with("i/o error on in.qoi"));
    }
}
