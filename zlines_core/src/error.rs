use thiserror::Error;

/// Error taxonomy for the zlines container.
///
/// Each variant corresponds to one of the error kinds the format
/// distinguishes: I/O failures, on-disk format problems, illegal calls
/// for the file's current mode, bad caller arguments, and codec
/// failures. Internal invariants (strictly increasing block offsets,
/// 8-byte index alignment) are checked with `debug_assert!` instead of
/// a variant here — a failure there is a bug in this crate, not
/// something a caller can trigger through the public API.
#[derive(Error, Debug)]
pub enum ZlinesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("illegal operation: {0}")]
    Mode(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("line index {0} out of range")]
    LineOutOfRange(u64),

    #[error("block index {0} out of range")]
    BlockOutOfRange(u64),

    #[error("codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, ZlinesError>;
