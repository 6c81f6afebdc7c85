use crate::data_channel::message::RTCDataChannelMessage;
use shared::error::Error;

/// Callback invocations waiting in a data channel's dispatch queue.
///
/// Every callback of one channel goes through the same FIFO, so an `OnClose`
/// is never delivered ahead of messages that were received before it.
#[allow(clippy::enum_variant_names)]
#[derive(Debug)]
pub enum RTCDataChannelEvent {
    OnOpen,
    OnMessage(RTCDataChannelMessage),
    OnBufferedAmountLow,
    OnError(Error),
    OnClose,
}
