use crate::data_channel::RTCDataChannelId;
use crate::data_channel::event::RTCDataChannelEvent;
use crate::data_channel::message::RTCDataChannelMessage;
use crate::data_channel::state::RTCDataChannelState;
use crate::flow_control::FlowControlAccount;
use bytes::{Buf, Bytes};
use log::{debug, trace};
use shared::error::{Error, Result};
use std::collections::VecDeque;

/// Notifications from the transport about the stream behind a data channel.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Opened,
    Flushed(usize),
    /// The stream is released, after a local close or a remote reset.
    Closed,
    Failed(String),
}

/// The state machine of one data channel, free of locks and I/O.
///
/// Inbound messages and transport notifications go in through `handle_read`
/// and `handle_event`; callbacks to run come out of `poll_read`, messages to
/// hand to the transport come out of `poll_write`. `RTCDataChannel` drives it
/// under its mutex.
pub(crate) struct DataChannelInternal {
    pub(crate) id: RTCDataChannelId,
    pub(crate) ready_state: RTCDataChannelState,
    pub(crate) flow_control: FlowControlAccount,

    max_message_size: usize,
    // inbound messages go to the detached read buffer instead of on_message
    detach_mode: bool,
    pub(crate) detached: bool,
    pub(crate) dispatching: bool,
    pub(crate) dial_requested: bool,
    open_pending: bool,

    read_outs: VecDeque<RTCDataChannelEvent>,
    detached_outs: VecDeque<Bytes>,
    write_outs: VecDeque<RTCDataChannelMessage>,

    // stats
    pub(crate) messages_sent: usize,
    pub(crate) messages_received: usize,
    pub(crate) bytes_sent: usize,
    pub(crate) bytes_received: usize,
}

impl DataChannelInternal {
    pub(crate) fn new(id: RTCDataChannelId, max_message_size: usize, detach_mode: bool) -> Self {
        Self {
            id,
            ready_state: RTCDataChannelState::Connecting,
            flow_control: FlowControlAccount::new(),
            max_message_size,
            detach_mode,
            detached: false,
            dispatching: false,
            dial_requested: false,
            open_pending: false,
            read_outs: VecDeque::new(),
            detached_outs: VecDeque::new(),
            write_outs: VecDeque::new(),
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    fn push_close(&mut self) {
        self.ready_state = RTCDataChannelState::Closed;
        self.read_outs.push_back(RTCDataChannelEvent::OnClose);
        if !self.detached && !self.detached_outs.is_empty() {
            debug!(
                "data channel {} closed without a detached reader, discarding {} buffered messages",
                self.id,
                self.detached_outs.len()
            );
            self.detached_outs.clear();
        }
    }

    /// Queues an `OnOpen` for a handler registered after the channel opened.
    pub(crate) fn replay_open(&mut self) {
        if self.ready_state == RTCDataChannelState::Open && !self.open_pending {
            self.open_pending = true;
            self.read_outs.push_back(RTCDataChannelEvent::OnOpen);
        }
    }

    /// Switches to detached delivery. Messages still waiting for dispatch move
    /// to the read buffer so that none is lost.
    pub(crate) fn detach(&mut self) -> Result<()> {
        if self.detached {
            return Err(Error::ErrAlreadyDetached);
        }
        self.detached = true;
        self.detach_mode = true;

        let mut pending = VecDeque::with_capacity(self.read_outs.len());
        for event in self.read_outs.drain(..) {
            match event {
                RTCDataChannelEvent::OnMessage(message) => {
                    if !message.data.is_empty() {
                        self.detached_outs.push_back(message.data);
                    }
                }
                event => pending.push_back(event),
            }
        }
        self.read_outs = pending;

        Ok(())
    }

    /// Copies buffered inbound bytes into buf. A message larger than buf is
    /// handed out over several calls. Returns None when nothing is buffered.
    pub(crate) fn read_detached(&mut self, buf: &mut [u8]) -> Option<usize> {
        let front = self.detached_outs.front_mut()?;
        let n = front.len().min(buf.len());
        buf[..n].copy_from_slice(&front[..n]);
        front.advance(n);
        if front.is_empty() {
            self.detached_outs.pop_front();
        }
        Some(n)
    }
}

impl sansio::Protocol<RTCDataChannelMessage, RTCDataChannelMessage, StreamEvent>
    for DataChannelInternal
{
    type Rout = RTCDataChannelEvent;
    type Wout = RTCDataChannelMessage;
    type Eout = ();
    type Error = Error;
    type Time = ();

    fn handle_read(&mut self, msg: RTCDataChannelMessage) -> Result<()> {
        if self.ready_state.is_closing_or_closed() {
            debug!(
                "data channel {} is {}, dropping inbound message of {} bytes",
                self.id,
                self.ready_state,
                msg.len()
            );
            return Ok(());
        }

        self.messages_received += 1;
        self.bytes_received += msg.len();

        if self.detach_mode {
            // an empty read means end of stream on a detached channel
            if !msg.data.is_empty() {
                self.detached_outs.push_back(msg.data);
            }
        } else {
            self.read_outs.push_back(RTCDataChannelEvent::OnMessage(msg));
        }

        Ok(())
    }

    fn poll_read(&mut self) -> Option<RTCDataChannelEvent> {
        let event = self.read_outs.pop_front();
        if matches!(event, Some(RTCDataChannelEvent::OnOpen)) {
            self.open_pending = false;
        }
        event
    }

    fn handle_write(&mut self, msg: RTCDataChannelMessage) -> Result<()> {
        match self.ready_state {
            RTCDataChannelState::Open => {}
            RTCDataChannelState::Closing | RTCDataChannelState::Closed => {
                return Err(Error::ErrDataChannelClosed);
            }
            RTCDataChannelState::Connecting | RTCDataChannelState::Unspecified => {
                return Err(Error::ErrDataChannelNotOpen);
            }
        }

        if msg.len() > self.max_message_size {
            return Err(Error::ErrOutboundPacketTooLarge);
        }

        self.messages_sent += 1;
        self.bytes_sent += msg.len();
        self.flow_control.add(msg.len());
        self.write_outs.push_back(msg);

        Ok(())
    }

    fn poll_write(&mut self) -> Option<RTCDataChannelMessage> {
        self.write_outs.pop_front()
    }

    fn handle_event(&mut self, evt: StreamEvent) -> Result<()> {
        trace!(
            "data channel {} in state {} handles {:?}",
            self.id, self.ready_state, evt
        );
        match evt {
            StreamEvent::Opened => {
                if self.ready_state == RTCDataChannelState::Connecting {
                    self.ready_state = RTCDataChannelState::Open;
                    self.flow_control.activate();
                    self.open_pending = true;
                    self.read_outs.push_back(RTCDataChannelEvent::OnOpen);
                }
            }
            StreamEvent::Flushed(n) => {
                if self.flow_control.subtract(n) {
                    self.read_outs
                        .push_back(RTCDataChannelEvent::OnBufferedAmountLow);
                }
            }
            StreamEvent::Closed => {
                if self.ready_state != RTCDataChannelState::Closed {
                    self.push_close();
                }
            }
            StreamEvent::Failed(reason) => {
                if self.ready_state != RTCDataChannelState::Closed {
                    self.read_outs
                        .push_back(RTCDataChannelEvent::OnError(Error::OtherSctpErr(reason)));
                    self.push_close();
                }
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<()> {
        None
    }

    fn handle_timeout(&mut self, _now: ()) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<()> {
        None
    }

    /// Starts closing. A channel whose stream was requested or opened moves
    /// to `Closing` until the stream is released; one that never asked for a
    /// stream is closed right away. Closing twice is a no-op.
    fn close(&mut self) -> Result<()> {
        match self.ready_state {
            RTCDataChannelState::Open => {
                self.ready_state = RTCDataChannelState::Closing;
            }
            RTCDataChannelState::Connecting if self.dial_requested => {
                self.ready_state = RTCDataChannelState::Closing;
            }
            RTCDataChannelState::Connecting | RTCDataChannelState::Unspecified => {
                self.push_close();
            }
            RTCDataChannelState::Closing | RTCDataChannelState::Closed => {}
        }
        Ok(())
    }
}
