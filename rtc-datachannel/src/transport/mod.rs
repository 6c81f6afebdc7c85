pub mod loopback;
#[cfg(test)]
pub(crate) mod mock;

use crate::data_channel::RTCDataChannelId;
use crate::data_channel::message::RTCDataChannelMessage;
use crate::data_channel::parameters::RTCDataChannelParameters;
use shared::error::Result;

/// DataChannelTransport is the multiplexed, SCTP-like stream service the data
/// channels run on. Framing, retransmission and congestion control belong to
/// the implementation; the data channel core only addresses streams by id.
///
/// Implementations report what happens on the wire by feeding
/// [`TransportEvent`]s into [`RTCSctpTransport::handle_event`]:
///
/// - `open_stream` is answered by `StreamOpened` once the stream is usable,
///   and announces the stream to the remote peer (`RemoteOpen` there) unless
///   the channel was negotiated out-of-band.
/// - every byte accepted by `write_stream` is eventually confirmed with
///   `BufferedAmountFlushed`.
/// - `close_stream` resets the stream in both directions. The remote peer
///   observes `StreamClosed` as the reset arrives, the local side observes
///   `StreamClosed` once the stream is released. Each side sees exactly one
///   `StreamClosed` per stream, and neither reuses the identifier before.
/// - `open_stream` and `write_stream` before the association is established
///   fail with `ErrSCTPNotEstablished`.
///
/// [`RTCSctpTransport::handle_event`]: crate::sctp_transport::RTCSctpTransport::handle_event
pub trait DataChannelTransport: Send + Sync {
    fn open_stream(
        &self,
        stream_id: RTCDataChannelId,
        params: &RTCDataChannelParameters,
    ) -> Result<()>;

    /// Returns the number of bytes the transport accepted.
    fn write_stream(
        &self,
        stream_id: RTCDataChannelId,
        message: &RTCDataChannelMessage,
    ) -> Result<usize>;

    fn close_stream(&self, stream_id: RTCDataChannelId) -> Result<()>;

    /// Shuts the whole association down.
    fn close(&self) -> Result<()>;
}

/// Inbound notifications from the transport, keyed by stream identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The association is established; channels created so far may open.
    Connected,
    /// The remote peer opened a stream and announced its parameters.
    RemoteOpen {
        stream_id: RTCDataChannelId,
        params: RTCDataChannelParameters,
    },
    /// A stream requested with `open_stream` is usable.
    StreamOpened { stream_id: RTCDataChannelId },
    Message {
        stream_id: RTCDataChannelId,
        message: RTCDataChannelMessage,
    },
    /// `amount` bytes previously accepted by `write_stream` left the send buffer.
    BufferedAmountFlushed {
        stream_id: RTCDataChannelId,
        amount: usize,
    },
    /// The stream is released, either reset by the remote peer or as the
    /// completion of a local `close_stream`.
    StreamClosed { stream_id: RTCDataChannelId },
    /// The association failed abruptly; every channel is gone.
    Failed { reason: String },
}

impl TransportEvent {
    pub fn stream_id(&self) -> Option<RTCDataChannelId> {
        match self {
            TransportEvent::RemoteOpen { stream_id, .. }
            | TransportEvent::StreamOpened { stream_id }
            | TransportEvent::Message { stream_id, .. }
            | TransportEvent::BufferedAmountFlushed { stream_id, .. }
            | TransportEvent::StreamClosed { stream_id } => Some(*stream_id),
            TransportEvent::Connected | TransportEvent::Failed { .. } => None,
        }
    }
}
