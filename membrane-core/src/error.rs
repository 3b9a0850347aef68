use thiserror::Error;

/// Provider payload could not be turned into a trigger.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum DecodeError {
    #[error("unrecognized payload shape")]
    UnknownPayload,

    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("invalid query string: {reason}")]
    InvalidQuery { reason: String },

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("io error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("failed to encode message: {reason}")]
    Encode { reason: String },

    #[error("failed to decode message: {reason}")]
    Decode { reason: String },
}
