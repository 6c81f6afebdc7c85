
pub mod detached;
pub mod event;
pub mod init;
pub(crate) mod internal;
pub mod message;
pub mod parameters;
pub mod state;

use crate::data_channel::detached::DetachedDataChannel;
use crate::data_channel::event::RTCDataChannelEvent;
use crate::data_channel::internal::{DataChannelInternal, StreamEvent};
use crate::data_channel::message::RTCDataChannelMessage;
use crate::data_channel::parameters::{RTCDataChannelParameters, RTCPriorityType};
use crate::data_channel::state::RTCDataChannelState;
use crate::flow_control::OnBufferedAmountLowHdlrFn;
use crate::sctp_transport::DataChannelMap;
use crate::setting_engine::SettingEngine;
use crate::transport::DataChannelTransport;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use log::{debug, error, trace, warn};
use sansio::Protocol;
use shared::error::{Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

/// Identifier for a data channel within a particular SCTP transport
pub type RTCDataChannelId = u16;

pub type OnOpenHdlrFn = Box<dyn FnMut() + Send>;
pub type OnMessageHdlrFn = Box<dyn FnMut(RTCDataChannelMessage) + Send>;
pub type OnErrorHdlrFn = Box<dyn FnMut(Error) + Send>;
pub type OnCloseHdlrFn = Box<dyn FnMut() + Send>;

/// Locks m even if a previous holder panicked. Handler slots and the channel
/// state stay consistent across a panicking callback because callbacks never
/// run while the lock is held.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Runs f and keeps a panic from unwinding into the transport that delivered
/// the event.
pub(crate) fn guard_handler<F: FnOnce()>(id: RTCDataChannelId, name: &str, f: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(
            "data channel {}: {} handler panicked: {}",
            id,
            name,
            panic_message(payload.as_ref())
        );
    }
}

/// DataChannel represents a WebRTC DataChannel
/// The DataChannel interface represents a network channel
/// which can be used for bidirectional peer-to-peer transfers of arbitrary data
///
/// Callbacks of one channel never run concurrently and run in the order their
/// causes happened: `on_open` first, then messages in arrival order, then
/// `on_close` exactly once. They run on whichever thread delivered the event,
/// outside of every internal lock, so a handler may call back into the
/// channel, including `send`, `close` and the handler setters.
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCDataChannel
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-rtcdatachannel
pub struct RTCDataChannel {
    id: RTCDataChannelId,
    params: RTCDataChannelParameters,
    transport: Arc<dyn DataChannelTransport>,
    setting_engine: Arc<SettingEngine>,
    // the registry entry this channel gives up once closed
    registry: Weak<DataChannelMap>,

    internal: Mutex<DataChannelInternal>,
    read_notify: Condvar,
    write_lock: Mutex<()>,

    on_open_handler: ArcSwapOption<Mutex<OnOpenHdlrFn>>,
    on_message_handler: ArcSwapOption<Mutex<OnMessageHdlrFn>>,
    on_error_handler: ArcSwapOption<Mutex<OnErrorHdlrFn>>,
    on_close_handler: ArcSwapOption<Mutex<OnCloseHdlrFn>>,
}

impl std::fmt::Debug for RTCDataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCDataChannel")
            .field("id", &self.id)
            .field("label", &self.params.label)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl RTCDataChannel {
    pub(crate) fn new(
        id: RTCDataChannelId,
        params: RTCDataChannelParameters,
        transport: Arc<dyn DataChannelTransport>,
        setting_engine: Arc<SettingEngine>,
        registry: Weak<DataChannelMap>,
    ) -> Self {
        let internal = DataChannelInternal::new(
            id,
            setting_engine.max_message_size(),
            setting_engine.detach_enabled(),
        );

        Self {
            id,
            params,
            transport,
            setting_engine,
            registry,
            internal: Mutex::new(internal),
            read_notify: Condvar::new(),
            write_lock: Mutex::new(()),
            on_open_handler: ArcSwapOption::empty(),
            on_message_handler: ArcSwapOption::empty(),
            on_error_handler: ArcSwapOption::empty(),
            on_close_handler: ArcSwapOption::empty(),
        }
    }

    fn internal(&self) -> MutexGuard<'_, DataChannelInternal> {
        lock(&self.internal)
    }

    /// ID represents the ID for this DataChannel. It is fixed for the
    /// lifetime of the channel.
    pub fn id(&self) -> RTCDataChannelId {
        self.id
    }

    /// label represents a label that can be used to distinguish this
    /// DataChannel object from other DataChannel objects. Scripts are
    /// allowed to create multiple DataChannel objects with the same label.
    pub fn label(&self) -> &str {
        &self.params.label
    }

    /// protocol represents the name of the sub-protocol used with this
    /// DataChannel.
    pub fn protocol(&self) -> &str {
        &self.params.protocol
    }

    /// Ordered returns true if the DataChannel is ordered, and false if
    /// out-of-order delivery is allowed.
    pub fn ordered(&self) -> bool {
        self.params.ordered
    }

    /// max_packet_lifetime represents the length of the time window (msec) during
    /// which transmissions and retransmissions may occur in unreliable mode.
    pub fn max_packet_life_time(&self) -> Option<u16> {
        self.params.max_packet_life_time
    }

    /// max_retransmits represents the maximum number of retransmissions that are
    /// attempted in unreliable mode.
    pub fn max_retransmits(&self) -> Option<u16> {
        self.params.max_retransmits
    }

    /// negotiated represents whether this DataChannel was negotiated by the
    /// application (true), or not (false).
    pub fn negotiated(&self) -> bool {
        self.params.negotiated
    }

    pub fn priority(&self) -> RTCPriorityType {
        self.params.priority
    }

    pub fn parameters(&self) -> &RTCDataChannelParameters {
        &self.params
    }

    /// ready_state represents the state of the DataChannel object.
    pub fn ready_state(&self) -> RTCDataChannelState {
        self.internal().ready_state
    }

    /// buffered_amount represents the number of bytes of application data
    /// (UTF-8 text and binary data) that have been queued using send() and
    /// not yet flushed by the transport. It does not reset to zero once the
    /// channel closes.
    pub fn buffered_amount(&self) -> usize {
        self.internal().flow_control.amount()
    }

    /// buffered_amount_low_threshold represents the threshold at which the
    /// bufferedAmount is considered to be low. When the bufferedAmount decreases
    /// from above this threshold to equal or below it, the bufferedamountlow
    /// event fires. buffered_amount_low_threshold is initially zero on each new
    /// DataChannel, but the application may change its value at any time.
    pub fn buffered_amount_low_threshold(&self) -> usize {
        self.internal().flow_control.threshold()
    }

    pub fn set_buffered_amount_low_threshold(&self, threshold: usize) {
        self.internal().flow_control.set_threshold(threshold);
    }

    /// on_buffered_amount_low sets the handler that is called once each time
    /// the buffered amount drops from above the threshold to at or below it.
    /// It may be set before the channel opens.
    pub fn on_buffered_amount_low(&self, f: OnBufferedAmountLowHdlrFn) {
        self.internal().flow_control.set_on_low(f);
    }

    /// on_open sets an event handler which is invoked when
    /// the underlying data transport has been established (or re-established).
    ///
    /// The handler runs once. A handler registered after the channel opened
    /// runs right away through the dispatch queue.
    pub fn on_open(&self, f: OnOpenHdlrFn) {
        self.on_open_handler.store(Some(Arc::new(Mutex::new(f))));
        self.internal().replay_open();
        self.dispatch_events();
    }

    /// on_message sets an event handler which is invoked on a binary
    /// message arrival over the sctp transport from a remote peer.
    /// A message arriving while no handler is set is dropped.
    pub fn on_message(&self, f: OnMessageHdlrFn) {
        self.on_message_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_error sets an event handler which is invoked when
    /// the underlying data transport fails.
    pub fn on_error(&self, f: OnErrorHdlrFn) {
        self.on_error_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_close sets an event handler which is invoked when
    /// the underlying data transport has been closed.
    pub fn on_close(&self, f: OnCloseHdlrFn) {
        self.on_close_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// send sends the binary message to the DataChannel peer
    pub fn send(&self, data: &Bytes) -> Result<usize> {
        self.write_message(RTCDataChannelMessage::binary(data.clone()))
    }

    /// send_text sends the text message to the DataChannel peer
    pub fn send_text(&self, s: impl Into<String>) -> Result<usize> {
        self.write_message(RTCDataChannelMessage::text(s))
    }

    pub(crate) fn write_message(&self, message: RTCDataChannelMessage) -> Result<usize> {
        // one writer at a time, so messages reach the transport in call order
        let _write = lock(&self.write_lock);

        let outs: Vec<RTCDataChannelMessage> = {
            let mut internal = self.internal();
            internal.handle_write(message)?;
            std::iter::from_fn(|| internal.poll_write()).collect()
        };

        let mut n = 0;
        for out in outs {
            let len = out.len();
            match self.transport.write_stream(self.id, &out) {
                Ok(accepted) => {
                    if accepted < len {
                        self.internal().flow_control.rollback(len - accepted);
                    }
                    n += accepted;
                }
                Err(err) => {
                    self.internal().flow_control.rollback(len);
                    return Err(err);
                }
            }
        }

        Ok(n)
    }

    /// Close Closes the DataChannel. It may be called regardless of whether
    /// the DataChannel object was created by this peer or the remote peer.
    ///
    /// Closing a channel with a stream resets the stream and leaves the
    /// channel `Closing` until the transport reports the stream released;
    /// `on_close` runs then. A channel that never asked for a stream closes
    /// right away. Closing twice is a no-op. When the transport fails to
    /// reset the stream the channel closes at once and the failure is
    /// returned.
    ///
    /// Detached readers see end of stream as soon as closing starts.
    pub fn close(&self) -> Result<()> {
        let (previous, current) = {
            let mut internal = self.internal();
            let previous = internal.ready_state;
            internal.close()?;
            (previous, internal.ready_state)
        };
        if previous.is_closing_or_closed() {
            return Ok(());
        }

        let mut result = Ok(());
        if current == RTCDataChannelState::Closing {
            debug!("data channel {} resets its stream", self.id);
            result = self.transport.close_stream(self.id);
            if result.is_err() {
                self.internal().handle_event(StreamEvent::Closed)?;
            }
        }

        self.read_notify.notify_all();
        self.release_if_closed();
        self.dispatch_events();

        result
    }

    /// Detach allows you to detach the underlying datachannel. This provides
    /// an idiomatic API to work with, however it disables the OnMessage callback.
    /// Before calling Detach you have to enable this behavior by calling
    /// SettingEngine.detach_data_channels(). Combining detached and normal data channels
    /// is not supported.
    /// Please refer to the data-channels-detach-create demo for an example.
    ///
    /// Detaching fails while an open, message or close handler is registered.
    /// An open handler is consumed when it runs, so detaching from inside
    /// `on_open` works.
    pub fn detach(self: &Arc<Self>) -> Result<DetachedDataChannel> {
        if !self.setting_engine.detach_enabled() {
            return Err(Error::ErrDetachNotEnabled);
        }

        let mut internal = self.internal();
        if internal.detached {
            return Err(Error::ErrAlreadyDetached);
        }
        if self.on_open_handler.load().is_some()
            || self.on_message_handler.load().is_some()
            || self.on_close_handler.load().is_some()
        {
            return Err(Error::ErrHandlersRegistered);
        }
        internal.detach()?;
        drop(internal);

        debug!("data channel {} detached", self.id);
        Ok(DetachedDataChannel::new(Arc::clone(self)))
    }

    pub fn detached(&self) -> bool {
        self.internal().detached
    }

    /// Blocks until buffered inbound data is available or the channel closed.
    /// Returns Ok(0) at end of stream.
    pub(crate) fn read_detached(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut internal = self.internal();
        loop {
            if let Some(n) = internal.read_detached(buf) {
                return Ok(n);
            }
            if internal.ready_state.is_closing_or_closed() {
                return Ok(0);
            }
            internal = self.read_notify.wait(internal)?;
        }
    }

    /// MessagesSent returns the number of messages sent
    pub fn messages_sent(&self) -> usize {
        self.internal().messages_sent
    }

    /// MessagesReceived returns the number of messages received
    pub fn messages_received(&self) -> usize {
        self.internal().messages_received
    }

    /// BytesSent returns the number of bytes sent
    pub fn bytes_sent(&self) -> usize {
        self.internal().bytes_sent
    }

    /// BytesReceived returns the number of bytes received
    pub fn bytes_received(&self) -> usize {
        self.internal().bytes_received
    }

    /// Asks the transport for the stream. Only the first call has an effect.
    pub(crate) fn dial(&self) -> Result<()> {
        {
            let mut internal = self.internal();
            if internal.dial_requested
                || internal.ready_state != RTCDataChannelState::Connecting
            {
                return Ok(());
            }
            internal.dial_requested = true;
        }

        debug!(
            "data channel {} ({}) requests its stream",
            self.id, self.params.label
        );
        if let Err(err) = self.transport.open_stream(self.id, &self.params) {
            self.internal().dial_requested = false;
            return Err(err);
        }
        Ok(())
    }

    /// Returns whether the channel opened. A confirmation reaching a channel
    /// that was cancelled meanwhile changes nothing.
    pub(crate) fn handle_open(&self) -> bool {
        let opened = {
            let mut internal = self.internal();
            if let Err(err) = internal.handle_event(StreamEvent::Opened) {
                warn!("data channel {}: {}", self.id, err);
            }
            internal.ready_state == RTCDataChannelState::Open
        };
        self.dispatch_events();
        opened
    }

    pub(crate) fn handle_message(&self, message: RTCDataChannelMessage) {
        if let Err(err) = self.internal().handle_read(message) {
            warn!("data channel {}: {}", self.id, err);
        }
        self.read_notify.notify_all();
        self.dispatch_events();
    }

    pub(crate) fn handle_flushed(&self, amount: usize) {
        if let Err(err) = self.internal().handle_event(StreamEvent::Flushed(amount)) {
            warn!("data channel {}: {}", self.id, err);
        }
        self.dispatch_events();
    }

    /// The stream is released in both directions: the completion of our own
    /// reset while `Closing`, or a reset by the remote peer while `Open`.
    /// The identifier is free for reuse before `on_close` runs.
    pub(crate) fn handle_stream_closed(&self) {
        {
            let mut internal = self.internal();
            if internal.ready_state == RTCDataChannelState::Open {
                debug!("data channel {} was reset by the remote peer", self.id);
            }
            if let Err(err) = internal.handle_event(StreamEvent::Closed) {
                warn!("data channel {}: {}", self.id, err);
            }
        }

        self.read_notify.notify_all();
        self.release_if_closed();
        self.dispatch_events();
    }

    pub(crate) fn handle_failure(&self, reason: String) {
        if let Err(err) = self.internal().handle_event(StreamEvent::Failed(reason)) {
            warn!("data channel {}: {}", self.id, err);
        }
        self.read_notify.notify_all();
        self.release_if_closed();
        self.dispatch_events();
    }

    /// Drops the registry entry of a closed channel. A newer channel holding
    /// the identifier is left alone.
    fn release_if_closed(&self) {
        if self.ready_state() != RTCDataChannelState::Closed {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        match registry.write() {
            Ok(mut data_channels) => {
                if data_channels
                    .get(&self.id)
                    .is_some_and(|dc| std::ptr::eq(Arc::as_ptr(dc), self))
                {
                    data_channels.remove(&self.id);
                    trace!("data channel {} released its identifier", self.id);
                }
            }
            Err(err) => warn!("data channel {}: {}", self.id, err),
        }
    }

    /// Drains the dispatch queue unless another thread is already draining
    /// it, in which case that thread picks up what was just queued.
    pub(crate) fn dispatch_events(&self) {
        {
            let mut internal = self.internal();
            if internal.dispatching {
                return;
            }
            internal.dispatching = true;
        }

        loop {
            let event = {
                let mut internal = self.internal();
                match internal.poll_read() {
                    Some(event) => event,
                    None => {
                        internal.dispatching = false;
                        return;
                    }
                }
            };
            self.dispatch(event);
        }
    }

    fn dispatch(&self, event: RTCDataChannelEvent) {
        trace!("data channel {} dispatches {:?}", self.id, event);
        match event {
            RTCDataChannelEvent::OnOpen => {
                if let Some(handler) = self.on_open_handler.swap(None) {
                    let mut f = lock(&handler);
                    guard_handler(self.id, "on_open", || (*f)());
                }
            }
            RTCDataChannelEvent::OnMessage(message) => {
                if let Some(handler) = self.on_message_handler.load_full() {
                    let mut f = lock(&handler);
                    guard_handler(self.id, "on_message", || (*f)(message));
                } else {
                    trace!(
                        "data channel {} has no message handler, dropping {} bytes",
                        self.id,
                        message.len()
                    );
                }
            }
            RTCDataChannelEvent::OnBufferedAmountLow => {
                let handler = self.internal().flow_control.on_low();
                if let Some(handler) = handler {
                    let mut f = lock(&handler);
                    guard_handler(self.id, "on_buffered_amount_low", || (*f)());
                }
            }
            RTCDataChannelEvent::OnError(err) => {
                if let Some(handler) = self.on_error_handler.load_full() {
                    let mut f = lock(&handler);
                    guard_handler(self.id, "on_error", || (*f)(err));
                } else {
                    warn!("data channel {} failed: {}", self.id, err);
                }
            }
            RTCDataChannelEvent::OnClose => {
                if let Some(handler) = self.on_close_handler.load_full() {
                    let mut f = lock(&handler);
                    guard_handler(self.id, "on_close", || (*f)());
                }
            }
        }
    }
}
