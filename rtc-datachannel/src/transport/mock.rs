use super::DataChannelTransport;
use crate::data_channel::RTCDataChannelId;
use crate::data_channel::message::RTCDataChannelMessage;
use crate::data_channel::parameters::RTCDataChannelParameters;
use shared::error::{Error, Result};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    OpenStream(RTCDataChannelId),
    WriteStream(RTCDataChannelId, RTCDataChannelMessage),
    CloseStream(RTCDataChannelId),
    Close,
}

/// Records what the data channels ask of the transport. Nothing is confirmed
/// back; tests feed confirmations by hand.
#[derive(Default)]
pub(crate) struct MockTransport {
    calls: Mutex<Vec<Call>>,
    pub(crate) fail_open: AtomicBool,
    pub(crate) fail_write: AtomicBool,
    pub(crate) fail_close_stream: AtomicBool,
}

impl MockTransport {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DataChannelTransport for MockTransport {
    fn open_stream(
        &self,
        stream_id: RTCDataChannelId,
        _params: &RTCDataChannelParameters,
    ) -> Result<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::ErrSCTPNotEstablished);
        }
        self.record(Call::OpenStream(stream_id));
        Ok(())
    }

    fn write_stream(
        &self,
        stream_id: RTCDataChannelId,
        message: &RTCDataChannelMessage,
    ) -> Result<usize> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset).into());
        }
        self.record(Call::WriteStream(stream_id, message.clone()));
        Ok(message.len())
    }

    fn close_stream(&self, stream_id: RTCDataChannelId) -> Result<()> {
        self.record(Call::CloseStream(stream_id));
        if self.fail_close_stream.load(Ordering::SeqCst) {
            return Err(Error::ErrStreamNotExisted);
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.record(Call::Close);
        Ok(())
    }
}
