use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The session for `address` could not be opened.
    #[error("could not open a session to {address}")]
    Connect {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    /// The session opened, but `*IDN?` failed. Usually the wrong device.
    #[error("no identity reply from {address}, incorrect device connected?")]
    Identify {
        address: String,
        #[source]
        source: Box<Error>,
    },

    #[error("command {command:?} failed")]
    Command {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("empty response from device for command {command:?}")]
    EmptyReply { command: String },

    #[error("unexpected reply {reply:?} to {command:?}")]
    UnexpectedReply { command: String, reply: String },

    #[error("failed to parse {quantity} from {reply:?}")]
    ParseFloat {
        quantity: &'static str,
        reply: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("invalid channel {0:?}, expected 1..=4")]
    InvalidChannel(String),

    #[error("invalid instrument address {0:?}")]
    InvalidAddress(String),

    #[error("instrument is not connected")]
    NotConnected,
}
