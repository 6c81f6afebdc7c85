//! An in-process [`DataChannelTransport`] connecting two registries.
//!
//! Each side owns an unbounded event queue. What one side writes lands in the
//! queue of the other; confirmations such as `StreamOpened` and
//! `BufferedAmountFlushed` land in its own. A pump thread per side feeds its
//! queue into an [`RTCSctpTransport`], so every callback of that side runs on
//! the pump thread in arrival order.
//!
//! Both sides share the set of open streams. Resetting a stream releases it
//! for both sides at once, so each side sees exactly one `StreamClosed` for
//! it, even when both sides close the stream at the same time.

use super::{DataChannelTransport, TransportEvent};
use crate::data_channel::RTCDataChannelId;
use crate::data_channel::message::RTCDataChannelMessage;
use crate::data_channel::parameters::RTCDataChannelParameters;
use crate::sctp_transport::RTCSctpTransport;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};
use shared::error::{Error, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

enum LoopbackCommand {
    Event(TransportEvent),
    Stop,
}

pub struct LoopbackTransport {
    name: &'static str,
    local_tx: Sender<LoopbackCommand>,
    remote_tx: Sender<LoopbackCommand>,
    local_rx: Mutex<Option<Receiver<LoopbackCommand>>>,
    connected: Arc<AtomicBool>,
    streams: Arc<Mutex<HashSet<RTCDataChannelId>>>,
    closed: AtomicBool,
}

impl LoopbackTransport {
    /// Creates two transports wired to each other.
    pub fn pair() -> (Arc<LoopbackTransport>, Arc<LoopbackTransport>) {
        let (a_tx, a_rx) = crossbeam_channel::unbounded();
        let (b_tx, b_rx) = crossbeam_channel::unbounded();
        let connected = Arc::new(AtomicBool::new(false));
        let streams = Arc::new(Mutex::new(HashSet::new()));

        let a = Arc::new(LoopbackTransport {
            name: "a",
            local_tx: a_tx.clone(),
            remote_tx: b_tx.clone(),
            local_rx: Mutex::new(Some(a_rx)),
            connected: Arc::clone(&connected),
            streams: Arc::clone(&streams),
            closed: AtomicBool::new(false),
        });
        let b = Arc::new(LoopbackTransport {
            name: "b",
            local_tx: b_tx,
            remote_tx: a_tx,
            local_rx: Mutex::new(Some(b_rx)),
            connected,
            streams,
            closed: AtomicBool::new(false),
        });

        (a, b)
    }

    /// Spawns the pump thread delivering this side's events to sctp_transport.
    /// A transport can be served once.
    pub fn serve(&self, sctp_transport: Arc<RTCSctpTransport>) -> Result<JoinHandle<()>> {
        let rx = self
            .local_rx
            .lock()?
            .take()
            .ok_or_else(|| Error::Other(format!("loopback {} is already served", self.name)))?;
        let name = self.name;

        thread::Builder::new()
            .name(format!("loopback-{}", name))
            .spawn(move || {
                for command in rx.iter() {
                    match command {
                        LoopbackCommand::Event(event) => {
                            trace!("loopback {} delivers {:?}", name, event);
                            if let Err(err) = sctp_transport.handle_event(event) {
                                debug!("loopback {}: event rejected: {}", name, err);
                            }
                        }
                        LoopbackCommand::Stop => break,
                    }
                }
                debug!("loopback {} pump stopped", name);
            })
            .map_err(|err| err.into())
    }

    /// Announces the association as established on both sides.
    pub fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        self.to_local(TransportEvent::Connected)?;
        self.to_remote(TransportEvent::Connected)
    }

    /// Simulates an abrupt loss of the association on both sides.
    pub fn fail(&self, reason: &str) -> Result<()> {
        self.to_local(TransportEvent::Failed {
            reason: reason.to_owned(),
        })?;
        self.to_remote(TransportEvent::Failed {
            reason: reason.to_owned(),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::ErrConnectionClosed)
        } else if !self.connected.load(Ordering::SeqCst) {
            Err(Error::ErrSCTPNotEstablished)
        } else {
            Ok(())
        }
    }

    fn to_local(&self, event: TransportEvent) -> Result<()> {
        self.local_tx
            .send(LoopbackCommand::Event(event))
            .map_err(|_| Error::ErrConnectionClosed)
    }

    fn to_remote(&self, event: TransportEvent) -> Result<()> {
        self.remote_tx
            .send(LoopbackCommand::Event(event))
            .map_err(|_| Error::ErrConnectionClosed)
    }
}

impl DataChannelTransport for LoopbackTransport {
    fn open_stream(
        &self,
        stream_id: RTCDataChannelId,
        params: &RTCDataChannelParameters,
    ) -> Result<()> {
        self.check_open()?;
        self.streams.lock()?.insert(stream_id);
        if !params.negotiated {
            self.to_remote(TransportEvent::RemoteOpen {
                stream_id,
                params: params.clone(),
            })?;
        }
        self.to_local(TransportEvent::StreamOpened { stream_id })
    }

    fn write_stream(
        &self,
        stream_id: RTCDataChannelId,
        message: &RTCDataChannelMessage,
    ) -> Result<usize> {
        self.check_open()?;
        if !self.streams.lock()?.contains(&stream_id) {
            return Err(Error::ErrStreamNotExisted);
        }
        let amount = message.len();
        self.to_remote(TransportEvent::Message {
            stream_id,
            message: message.clone(),
        })?;
        self.to_local(TransportEvent::BufferedAmountFlushed { stream_id, amount })?;
        Ok(amount)
    }

    fn close_stream(&self, stream_id: RTCDataChannelId) -> Result<()> {
        self.check_open()?;
        if !self.streams.lock()?.remove(&stream_id) {
            // released already, both sides have their StreamClosed queued
            trace!("loopback {}: stream {} is already released", self.name, stream_id);
            return Ok(());
        }
        self.to_remote(TransportEvent::StreamClosed { stream_id })?;
        self.to_local(TransportEvent::StreamClosed { stream_id })
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.local_tx
            .send(LoopbackCommand::Stop)
            .map_err(|_| Error::ErrConnectionClosed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn drain(transport: &LoopbackTransport) -> Vec<TransportEvent> {
        let rx = transport.local_rx.lock().unwrap();
        rx.as_ref()
            .unwrap()
            .try_iter()
            .filter_map(|command| match command {
                LoopbackCommand::Event(event) => Some(event),
                LoopbackCommand::Stop => None,
            })
            .collect()
    }

    #[test]
    fn test_streams_need_an_association() {
        let (a, _b) = LoopbackTransport::pair();
        let params = RTCDataChannelParameters::default();

        assert_eq!(a.open_stream(0, &params), Err(Error::ErrSCTPNotEstablished));
        assert_eq!(a.close_stream(0), Err(Error::ErrSCTPNotEstablished));

        a.close().unwrap();
        assert_eq!(a.open_stream(0, &params), Err(Error::ErrConnectionClosed));
    }

    #[test]
    fn test_write_to_unknown_stream() {
        let (a, _b) = LoopbackTransport::pair();
        a.connect().unwrap();

        assert_eq!(
            a.write_stream(4, &RTCDataChannelMessage::text("hello")),
            Err(Error::ErrStreamNotExisted)
        );
    }

    #[test]
    fn test_simultaneous_reset_releases_stream_once() {
        let (a, b) = LoopbackTransport::pair();
        a.connect().unwrap();
        a.open_stream(0, &RTCDataChannelParameters::default()).unwrap();
        drain(&a);
        drain(&b);

        b.close_stream(0).unwrap();
        a.close_stream(0).unwrap();

        let closed = TransportEvent::StreamClosed { stream_id: 0 };
        assert_eq!(drain(&a), vec![closed.clone()]);
        assert_eq!(drain(&b), vec![closed]);
        assert_eq!(
            a.write_stream(0, &RTCDataChannelMessage::text("late")),
            Err(Error::ErrStreamNotExisted)
        );
    }
}
