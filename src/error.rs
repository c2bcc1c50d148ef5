use thiserror::Error;

pub type Result<T> = std::result::Result<T, Gt06Error>;

#[derive(Debug, Error)]
pub enum Gt06Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame does not end with 0D 0A")]
    InvalidEndMarker,

    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    #[error("unsupported protocol id: {0:#04x}")]
    UnsupportedProtocolId(u8),

    #[error("truncated packet for protocol {protocol:#04x}: need {needed} payload bytes, got {got}")]
    TruncatedPacket {
        protocol: u8,
        needed: usize,
        got: usize,
    },

    #[error("malformed position packet: {0}")]
    MalformedPosition(&'static str),

    #[error("payload of {0} bytes does not fit the 1-byte length field")]
    OversizedPayload(usize),

    #[error("invalid BCD data: {0:#04x}")]
    InvalidBcd(u8),
}
