use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("mutex poison: {0}")]
    PoisonError(String),

    //SCTP transport
    /// ErrMaxDataChannelID indicates that every stream identifier of the
    /// local parity is in use.
    #[error("Max Data Channel ID")]
    ErrMaxDataChannelID,

    /// ErrIdentifierCollision indicates that a stream identifier requested by
    /// the remote peer, or supplied for a negotiated channel, is already owned
    /// by a live data channel.
    #[error("data channel id {0} is already in use")]
    ErrIdentifierCollision(u16),

    /// ErrDtlsRoleNotNegotiated indicates that a stream identifier was
    /// requested before the DTLS role was known.
    #[error("DTLS role must be client or server to allocate a data channel id")]
    ErrDtlsRoleNotNegotiated,

    #[error("SCTP is not established")]
    ErrSCTPNotEstablished,

    /// ErrConnectionClosed indicates an operation executed after connection
    /// has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,

    #[error("stream not existed")]
    ErrStreamNotExisted,

    //Data Channel
    /// ErrDataChannelNotOpen indicates an operation executed while the data
    /// channel is still connecting.
    #[error("DataChannel is not opened")]
    ErrDataChannelNotOpen,

    /// ErrDataChannelClosed indicates an operation executed when the data
    /// channel is closing or closed.
    #[error("data channel closed")]
    ErrDataChannelClosed,

    /// ErrDataChannelNonExist indicates an operation executed when the data
    /// channel not existed.
    #[error("data channel not existed")]
    ErrDataChannelNotExisted,

    #[error("enable detaching by calling SettingEngine::detach_data_channels()")]
    ErrDetachNotEnabled,

    /// ErrAlreadyDetached indicates that detach was called a second time on
    /// the same data channel.
    #[error("data channel is already detached")]
    ErrAlreadyDetached,

    /// ErrHandlersRegistered indicates that detach was called on a data channel
    /// which already delivers through on_open/on_message/on_close handlers.
    #[error("data channel has handlers registered, detach is not allowed")]
    ErrHandlersRegistered,

    /// ErrStringSizeLimit indicates that the character size limit of string is
    /// exceeded. The limit is hardcoded to 65535 according to specifications.
    #[error("data channel label exceeds size limit")]
    ErrStringSizeLimit,

    /// ErrProtocolTooLarge indicates that value given for a DataChannelInit protocol is
    /// longer then 65535 bytes
    #[error("protocol is larger then 65535 bytes")]
    ErrProtocolTooLarge,

    /// ErrRetransmitsOrPacketLifeTime indicates that both max_packet_life_time and
    /// max_retransmits were set on the same data channel.
    #[error("both max_packet_life_time and max_retransmits was set")]
    ErrRetransmitsOrPacketLifeTime,

    /// ErrOutboundPacketTooLarge indicates that a message is larger than the
    /// max message size negotiated for the SCTP transport.
    #[error("outbound packet larger than maximum message size")]
    ErrOutboundPacketTooLarge,

    #[error("Other SCTP Err: {0}")]
    OtherSctpErr(String),

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

/// Maps data channel errors onto `std::io::Error` for the `Read`/`Write`
/// implementations of detached data channels. I/O errors coming from the
/// transport keep their original kind.
impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(IoError(e)) => e,
            Error::ErrDataChannelNotOpen => io::Error::new(io::ErrorKind::NotConnected, e),
            Error::ErrDataChannelClosed | Error::ErrConnectionClosed => {
                io::Error::new(io::ErrorKind::BrokenPipe, e)
            }
            Error::ErrOutboundPacketTooLarge => io::Error::new(io::ErrorKind::InvalidInput, e),
            e => io::Error::other(e),
        }
    }
}

/// An escape hatch to preserve stack traces when we don't know the error.
///
/// Transport implementations live outside of this workspace and produce their
/// own error types. By using `Error::from_std` we can preserve the underlying
/// error (and stack trace!) while passing it through unmodified.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StdError(pub Box<dyn std::error::Error + Send + Sync>);

impl PartialEq for StdError {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::Other(errs_strs.join("\n")))
    }
}
