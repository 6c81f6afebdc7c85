use crate::data_channel::message::RTCDataChannelMessage;
use crate::data_channel::{RTCDataChannel, RTCDataChannelId};
use bytes::Bytes;
use shared::error::Result;
use std::io;
use std::sync::Arc;

/// A data channel consumed as a blocking byte stream.
///
/// Reads hand out inbound messages in arrival order. A message larger than
/// the read buffer is returned over several reads, and a read returns 0 once
/// the channel is closing or closed and everything buffered has been read. Writes and
/// close go through the channel, so a detached channel still reports its
/// buffered amount and closes the same way.
///
/// Both `DetachedDataChannel` and `&DetachedDataChannel` implement
/// [`io::Read`] and [`io::Write`], so one reader and one writer thread can
/// share it behind an `Arc`.
pub struct DetachedDataChannel {
    data_channel: Arc<RTCDataChannel>,
}

impl DetachedDataChannel {
    pub(crate) fn new(data_channel: Arc<RTCDataChannel>) -> Self {
        Self { data_channel }
    }

    /// Blocks until data is available. Returns Ok(0) at end of stream.
    pub fn read_data_channel(&self, buf: &mut [u8]) -> Result<usize> {
        self.data_channel.read_detached(buf)
    }

    pub fn write_data_channel(&self, data: &Bytes) -> Result<usize> {
        self.data_channel
            .write_message(RTCDataChannelMessage::binary(data.clone()))
    }

    pub fn write_data_channel_text(&self, s: impl Into<String>) -> Result<usize> {
        self.data_channel
            .write_message(RTCDataChannelMessage::text(s))
    }

    /// Closes the channel. Blocked readers wake up and see end of stream.
    pub fn close(&self) -> Result<()> {
        self.data_channel.close()
    }

    /// StreamIdentifier returns the Stream identifier associated to the stream.
    pub fn stream_identifier(&self) -> RTCDataChannelId {
        self.data_channel.id()
    }

    pub fn data_channel(&self) -> &Arc<RTCDataChannel> {
        &self.data_channel
    }
}

impl io::Read for &DetachedDataChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_data_channel(buf).map_err(Into::into)
    }
}

impl io::Read for DetachedDataChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl io::Write for &DetachedDataChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data_channel(&Bytes::copy_from_slice(buf))
            .map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for DetachedDataChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
