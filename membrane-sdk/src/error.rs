use {
    thiserror::Error,
    membrane_core::FrameError,
};

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("failed to connect to membrane at {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("membrane rejected worker: {reason}")]
    Rejected {
        reason: String,
    },

    #[error("unexpected message from membrane: {message}")]
    UnexpectedMessage {
        message: String,
    },

    #[error("membrane closed the connection during handshake")]
    ClosedDuringHandshake,

    #[error("transport error: {0}")]
    Transport(#[from] FrameError),
}
