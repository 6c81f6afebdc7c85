//! Low-level knobs for the data channel core.
//!
//! `SettingEngine` collects the settings that are not part of the standard
//! data channel API: whether channels may be detached into blocking streams,
//! and the largest message the SCTP transport accepts.
//!
//! ```
//! use rtc_datachannel::setting_engine::{SctpMaxMessageSize, SettingEngine};
//!
//! let mut setting_engine = SettingEngine::default();
//! setting_engine.detach_data_channels();
//! setting_engine.set_sctp_max_message_size(SctpMaxMessageSize::Bounded(256 * 1024));
//!
//! assert!(setting_engine.detach_enabled());
//! assert_eq!(setting_engine.max_message_size(), 256 * 1024);
//! ```

/// Configuration for detaching data channels.
#[derive(Default, Debug, Clone)]
pub struct Detach {
    /// Whether data channels may be turned into blocking read/write streams.
    pub data_channels: bool,
}

/// Maximum message size for SCTP data channels.
///
/// Per [RFC 8841](https://datatracker.ietf.org/doc/html/rfc8841), the default is 64KB.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SctpMaxMessageSize {
    /// Fixed maximum message size in bytes.
    Bounded(u32),

    /// No practical limit (uses MAX_MESSAGE_SIZE internally).
    Unbounded,
}

impl SctpMaxMessageSize {
    /// Default message size per RFC 8841 (64KB).
    pub const DEFAULT_MESSAGE_SIZE: u32 = 65536;

    /// Maximum message size (256KB).
    pub const MAX_MESSAGE_SIZE: u32 = 262144;

    /// Returns the message size as `usize`.
    pub fn as_usize(&self) -> usize {
        match self {
            Self::Bounded(result) => *result as usize,
            Self::Unbounded => Self::MAX_MESSAGE_SIZE as usize,
        }
    }
}

impl Default for SctpMaxMessageSize {
    fn default() -> Self {
        // https://datatracker.ietf.org/doc/html/rfc8841#section-6.1-4
        // > If the SDP "max-message-size" attribute is not present, the default value is 64K.
        Self::Bounded(Self::DEFAULT_MESSAGE_SIZE)
    }
}

/// Advanced configuration shared by the SCTP transport and all of its data
/// channels. Built once, then handed to [`RTCSctpTransport::new`] behind an `Arc`.
///
/// [`RTCSctpTransport::new`]: crate::sctp_transport::RTCSctpTransport::new
#[derive(Default, Debug, Clone)]
pub struct SettingEngine {
    pub(crate) detach: Detach,
    pub(crate) sctp_max_message_size: SctpMaxMessageSize,
}

impl SettingEngine {
    /// Enables detached mode for data channels.
    ///
    /// Without it, `RTCDataChannel::detach` fails with `ErrDetachNotEnabled`.
    /// With it, inbound data is kept for the detached reader from the moment
    /// it arrives and never reaches `on_message`. Mixing detached and handler
    /// based consumption on one channel is not supported.
    ///
    /// The read buffer is unbounded. A channel that is never detached keeps
    /// what the peer sends until it closes, so detach from `on_open` and keep
    /// a reader running. Data of a channel that closes without being detached
    /// is discarded.
    pub fn detach_data_channels(&mut self) {
        self.detach.data_channels = true;
    }

    pub fn detach_enabled(&self) -> bool {
        self.detach.data_channels
    }

    /// Sets the maximum message size for SCTP data channels. Larger messages
    /// are rejected by `send` with `ErrOutboundPacketTooLarge`.
    pub fn set_sctp_max_message_size(&mut self, max_message_size: SctpMaxMessageSize) {
        self.sctp_max_message_size = max_message_size;
    }

    pub fn max_message_size(&self) -> usize {
        self.sctp_max_message_size.as_usize()
    }
}
