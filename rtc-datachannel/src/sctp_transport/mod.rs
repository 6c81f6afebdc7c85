
pub(crate) mod data_channel_id;
pub mod sctp_transport_state;

use crate::data_channel::init::RTCDataChannelInit;
use crate::data_channel::parameters::RTCDataChannelParameters;
use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{OnErrorHdlrFn, RTCDataChannel, RTCDataChannelId, guard_handler, lock};
use crate::dtls_role::RTCDtlsRole;
use crate::setting_engine::SettingEngine;
use crate::transport::{DataChannelTransport, TransportEvent};
use arc_swap::ArcSwapOption;
use data_channel_id::generate_data_channel_id;
use log::{debug, trace, warn};
use sctp_transport_state::RTCSctpTransportState;
use shared::error::{Error, Result, flatten_errs};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub type OnDataChannelHdlrFn = Box<dyn FnMut(Arc<RTCDataChannel>) + Send>;

/// Channels by stream identifier. An identifier stays taken until its
/// channel is closed and has left the map.
pub(crate) type DataChannelMap = RwLock<HashMap<RTCDataChannelId, Arc<RTCDataChannel>>>;

/// Label and protocol are carried in 16 bit length fields on the wire.
const MAX_LABEL_OR_PROTOCOL_LEN: usize = 65535;

/// SCTPTransport provides details about the SCTP transport and owns the data
/// channels multiplexed on it.
///
/// The transport below it is driven through [`DataChannelTransport`]; whatever
/// it observes comes back through [`RTCSctpTransport::handle_event`], which
/// routes each event to the channel owning the stream. No internal lock is
/// held while a channel callback runs or while the transport is called.
pub struct RTCSctpTransport {
    transport: Arc<dyn DataChannelTransport>,
    setting_engine: Arc<SettingEngine>,

    state: AtomicU8, //RTCSctpTransportState
    dtls_role: Mutex<RTCDtlsRole>,

    data_channels: Arc<DataChannelMap>,
    data_channels_opened: AtomicU32,
    data_channels_requested: AtomicU32,
    data_channels_accepted: AtomicU32,

    on_data_channel_handler: ArcSwapOption<Mutex<OnDataChannelHdlrFn>>,
    on_error_handler: ArcSwapOption<Mutex<OnErrorHdlrFn>>,
}

impl RTCSctpTransport {
    pub fn new(
        transport: Arc<dyn DataChannelTransport>,
        setting_engine: Arc<SettingEngine>,
    ) -> Self {
        Self {
            transport,
            setting_engine,
            state: AtomicU8::new(RTCSctpTransportState::Connecting as u8),
            dtls_role: Mutex::new(RTCDtlsRole::Unspecified),
            data_channels: Arc::new(RwLock::new(HashMap::new())),
            data_channels_opened: AtomicU32::new(0),
            data_channels_requested: AtomicU32::new(0),
            data_channels_accepted: AtomicU32::new(0),
            on_data_channel_handler: ArcSwapOption::empty(),
            on_error_handler: ArcSwapOption::empty(),
        }
    }

    /// state returns the current state of the SCTPTransport
    pub fn state(&self) -> RTCSctpTransportState {
        self.state.load(Ordering::SeqCst).into()
    }

    fn set_state(&self, state: RTCSctpTransportState) -> RTCSctpTransportState {
        self.state.swap(state as u8, Ordering::SeqCst).into()
    }

    /// Sets the negotiated DTLS role, which decides the parity of the
    /// identifiers allocated for new channels.
    pub fn set_dtls_role(&self, dtls_role: RTCDtlsRole) {
        *lock(&self.dtls_role) = dtls_role;
    }

    pub fn dtls_role(&self) -> RTCDtlsRole {
        *lock(&self.dtls_role)
    }

    pub fn setting_engine(&self) -> &Arc<SettingEngine> {
        &self.setting_engine
    }

    /// The largest message a channel of this transport may send.
    pub fn max_message_size(&self) -> usize {
        self.setting_engine.max_message_size()
    }

    /// on_data_channel sets an event handler which is invoked when a data
    /// channel message arrives from a remote peer.
    pub fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        self.on_data_channel_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_error sets an event handler which is invoked when the transport
    /// rejects something the remote peer did, such as opening a channel on an
    /// identifier already in use.
    pub fn on_error(&self, f: OnErrorHdlrFn) {
        self.on_error_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// create_data_channel creates a new DataChannel object with the given label
    /// and optional DataChannelInit used to configure properties of the
    /// underlying channel such as data reliability.
    ///
    /// The channel starts out connecting. It opens once the transport is
    /// connected and confirms the stream.
    pub fn create_data_channel(
        &self,
        label: &str,
        options: Option<RTCDataChannelInit>,
    ) -> Result<Arc<RTCDataChannel>> {
        if self.state() == RTCSctpTransportState::Closed {
            return Err(Error::ErrConnectionClosed);
        }

        let init = options.unwrap_or_default();

        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #7)
        if label.len() > MAX_LABEL_OR_PROTOCOL_LEN {
            return Err(Error::ErrStringSizeLimit);
        }
        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #12)
        if init.protocol.len() > MAX_LABEL_OR_PROTOCOL_LEN {
            return Err(Error::ErrProtocolTooLarge);
        }
        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #15)
        if init.max_packet_life_time.is_some() && init.max_retransmits.is_some() {
            return Err(Error::ErrRetransmitsOrPacketLifeTime);
        }

        let params = RTCDataChannelParameters {
            label: label.to_owned(),
            protocol: init.protocol,
            ordered: init.ordered,
            max_packet_life_time: init.max_packet_life_time,
            max_retransmits: init.max_retransmits,
            negotiated: init.negotiated.is_some(),
            priority: init.priority,
        };

        let data_channel = {
            let mut data_channels = self.data_channels.write()?;

            let id = if let Some(id) = init.negotiated {
                if data_channels.contains_key(&id) {
                    return Err(Error::ErrIdentifierCollision(id));
                }
                id
            } else {
                let used: HashSet<RTCDataChannelId> = data_channels.keys().copied().collect();
                generate_data_channel_id(&used, self.dtls_role())?
            };

            let data_channel = Arc::new(RTCDataChannel::new(
                id,
                params,
                Arc::clone(&self.transport),
                Arc::clone(&self.setting_engine),
                Arc::downgrade(&self.data_channels),
            ));
            data_channels.insert(id, Arc::clone(&data_channel));
            data_channel
        };

        debug!(
            "created data channel {} ({})",
            data_channel.id(),
            data_channel.label()
        );

        if self.state() == RTCSctpTransportState::Connected {
            if let Err(err) = self.dial(&data_channel) {
                self.remove_if_same(&data_channel);
                return Err(err);
            }
        }

        Ok(data_channel)
    }

    /// Registers a channel the remote peer opened on stream_id and opens it.
    ///
    /// An identifier still held by a channel, including one that is closing,
    /// is a collision; the registry stays untouched in that case.
    pub fn accept_remote(
        &self,
        stream_id: RTCDataChannelId,
        params: RTCDataChannelParameters,
    ) -> Result<Arc<RTCDataChannel>> {
        let data_channel = {
            let mut data_channels = self.data_channels.write()?;
            if data_channels.contains_key(&stream_id) {
                return Err(Error::ErrIdentifierCollision(stream_id));
            }

            let data_channel = Arc::new(RTCDataChannel::new(
                stream_id,
                params,
                Arc::clone(&self.transport),
                Arc::clone(&self.setting_engine),
                Arc::downgrade(&self.data_channels),
            ));
            data_channels.insert(stream_id, Arc::clone(&data_channel));
            data_channel
        };
        self.data_channels_accepted.fetch_add(1, Ordering::SeqCst);

        debug!(
            "accepted data channel {} ({}) from remote peer",
            stream_id,
            data_channel.label()
        );

        if let Some(handler) = self.on_data_channel_handler.load_full() {
            let mut f = lock(&handler);
            guard_handler(stream_id, "on_data_channel", || {
                (*f)(Arc::clone(&data_channel))
            });
        }

        if data_channel.handle_open() {
            self.data_channels_opened.fetch_add(1, Ordering::SeqCst);
        }

        Ok(data_channel)
    }

    fn dial(&self, data_channel: &Arc<RTCDataChannel>) -> Result<()> {
        data_channel.dial()?;
        self.data_channels_requested.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Feeds one event observed by the transport into the registry.
    ///
    /// Events for identifiers without a channel are stale and dropped. A
    /// rejected remote open is reported to the on_error handler.
    pub fn handle_event(&self, event: TransportEvent) -> Result<()> {
        trace!("sctp transport handles {:?}", event);
        match event {
            TransportEvent::Connected => self.handle_connected(),
            TransportEvent::RemoteOpen { stream_id, params } => {
                if let Err(err) = self.accept_remote(stream_id, params) {
                    warn!("rejected data channel {} from remote peer: {}", stream_id, err);
                    self.do_error(err);
                }
                Ok(())
            }
            TransportEvent::StreamOpened { stream_id } => {
                if let Some(data_channel) = self.lookup(stream_id)? {
                    if data_channel.handle_open() {
                        self.data_channels_opened.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Ok(())
            }
            TransportEvent::Message { stream_id, message } => {
                if let Some(data_channel) = self.lookup(stream_id)? {
                    data_channel.handle_message(message);
                }
                Ok(())
            }
            TransportEvent::BufferedAmountFlushed { stream_id, amount } => {
                if let Some(data_channel) = self.lookup(stream_id)? {
                    data_channel.handle_flushed(amount);
                }
                Ok(())
            }
            TransportEvent::StreamClosed { stream_id } => {
                if let Some(data_channel) = self.lookup(stream_id)? {
                    data_channel.handle_stream_closed();
                }
                Ok(())
            }
            TransportEvent::Failed { reason } => {
                self.handle_failed(reason);
                Ok(())
            }
        }
    }

    fn handle_connected(&self) -> Result<()> {
        if self.state() == RTCSctpTransportState::Closed {
            return Err(Error::ErrConnectionClosed);
        }
        self.set_state(RTCSctpTransportState::Connected);

        let pending: Vec<Arc<RTCDataChannel>> = self
            .data_channels
            .read()?
            .values()
            .filter(|dc| dc.ready_state() == RTCDataChannelState::Connecting)
            .cloned()
            .collect();

        for data_channel in pending {
            if let Err(err) = self.dial(&data_channel) {
                warn!(
                    "failed to open data channel {}: {}",
                    data_channel.id(),
                    err
                );
                data_channel.handle_failure(err.to_string());
            }
        }

        Ok(())
    }

    fn handle_failed(&self, reason: String) {
        warn!("sctp transport failed: {}", reason);
        self.set_state(RTCSctpTransportState::Closed);

        let data_channels: Vec<Arc<RTCDataChannel>> = match self.data_channels.write() {
            Ok(mut data_channels) => data_channels.drain().map(|(_, dc)| dc).collect(),
            Err(err) => {
                warn!("{}", err);
                return;
            }
        };

        for data_channel in data_channels {
            data_channel.handle_failure(reason.clone());
        }

        self.do_error(Error::OtherSctpErr(reason));
    }

    fn lookup(&self, stream_id: RTCDataChannelId) -> Result<Option<Arc<RTCDataChannel>>> {
        let data_channel = self.data_channels.read()?.get(&stream_id).cloned();
        if data_channel.is_none() {
            debug!("dropping event for unknown data channel {}", stream_id);
        }
        Ok(data_channel)
    }

    fn do_error(&self, err: Error) {
        if let Some(handler) = self.on_error_handler.load_full() {
            let mut f = lock(&handler);
            guard_handler(0, "sctp transport on_error", || (*f)(err));
        }
    }

    /// Removes the channel registered under id and returns it. Channels
    /// leave the registry by themselves once closed; this drops one early.
    pub fn remove(&self, id: RTCDataChannelId) -> Result<Arc<RTCDataChannel>> {
        self.data_channels
            .write()?
            .remove(&id)
            .ok_or(Error::ErrDataChannelNotExisted)
    }

    // leaves a newer channel that reuses the identifier alone
    fn remove_if_same(&self, data_channel: &Arc<RTCDataChannel>) {
        match self.data_channels.write() {
            Ok(mut data_channels) => {
                if data_channels
                    .get(&data_channel.id())
                    .is_some_and(|dc| Arc::ptr_eq(dc, data_channel))
                {
                    data_channels.remove(&data_channel.id());
                }
            }
            Err(err) => warn!("{}", err),
        }
    }

    /// The channel registered under id, if any.
    pub fn data_channel(&self, id: RTCDataChannelId) -> Option<Arc<RTCDataChannel>> {
        self.data_channels
            .read()
            .ok()
            .and_then(|data_channels| data_channels.get(&id).cloned())
    }

    pub fn data_channels_len(&self) -> usize {
        self.data_channels
            .read()
            .map(|data_channels| data_channels.len())
            .unwrap_or_default()
    }

    pub fn data_channels_opened(&self) -> u32 {
        self.data_channels_opened.load(Ordering::SeqCst)
    }

    pub fn data_channels_requested(&self) -> u32 {
        self.data_channels_requested.load(Ordering::SeqCst)
    }

    pub fn data_channels_accepted(&self) -> u32 {
        self.data_channels_accepted.load(Ordering::SeqCst)
    }

    /// Stop stops the SCTPTransport: every channel is closed, then the
    /// transport below. Streams do not outlive the association, so channels
    /// finish closing right here. Stopping twice is a no-op.
    pub fn stop(&self) -> Result<()> {
        if self.set_state(RTCSctpTransportState::Closed) == RTCSctpTransportState::Closed {
            return Ok(());
        }

        let data_channels: Vec<Arc<RTCDataChannel>> = self
            .data_channels
            .write()?
            .drain()
            .map(|(_, dc)| dc)
            .collect();

        let mut errs = vec![];
        for data_channel in data_channels {
            if let Err(err) = data_channel.close() {
                errs.push(err);
            }
            data_channel.handle_stream_closed();
        }
        if let Err(err) = self.transport.close() {
            errs.push(err);
        }

        flatten_errs(errs)
    }
}
