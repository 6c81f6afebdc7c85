//! # RTC DataChannel
//!
//! The transport core of WebRTC data channels: bidirectional, message
//! oriented channels multiplexed as streams over one SCTP association.
//!
//! The SCTP association itself is not part of this crate. It is reached
//! through the [`DataChannelTransport`] trait, and reports back by feeding
//! [`TransportEvent`]s into [`RTCSctpTransport::handle_event`]. On top of
//! that this crate provides:
//!
//! - [`RTCSctpTransport`], the registry owning every channel of one
//!   association, which allocates stream identifiers by DTLS role and routes
//!   inbound events by identifier.
//! - [`RTCDataChannel`], the per channel state machine with its ordered
//!   callback dispatch and buffered amount accounting.
//! - [`DetachedDataChannel`], a blocking `Read`/`Write` stream view of a
//!   channel.
//! - [`LoopbackTransport`], an in-process transport pair for tests and demos.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bytes::Bytes;
//! use rtc_datachannel::dtls_role::RTCDtlsRole;
//! use rtc_datachannel::sctp_transport::RTCSctpTransport;
//! use rtc_datachannel::setting_engine::SettingEngine;
//! use rtc_datachannel::transport::loopback::LoopbackTransport;
//! use std::sync::Arc;
//!
//! # fn example() -> rtc_datachannel::shared::error::Result<()> {
//! let (a, b) = LoopbackTransport::pair();
//! let setting_engine = Arc::new(SettingEngine::default());
//!
//! let offerer = Arc::new(RTCSctpTransport::new(a.clone(), Arc::clone(&setting_engine)));
//! offerer.set_dtls_role(RTCDtlsRole::Client);
//! let answerer = Arc::new(RTCSctpTransport::new(b.clone(), setting_engine));
//! answerer.set_dtls_role(RTCDtlsRole::Server);
//!
//! answerer.on_data_channel(Box::new(|dc| {
//!     let label = dc.label().to_owned();
//!     dc.on_message(Box::new(move |msg| {
//!         println!("{label}: {} bytes", msg.len());
//!     }));
//! }));
//!
//! let dc = offerer.create_data_channel("chat", None)?;
//! let sender = Arc::clone(&dc);
//! dc.on_open(Box::new(move || {
//!     let _ = sender.send(&Bytes::from_static(b"hello"));
//! }));
//!
//! a.serve(Arc::clone(&offerer))?;
//! b.serve(Arc::clone(&answerer))?;
//! a.connect()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`DataChannelTransport`]: transport::DataChannelTransport
//! [`TransportEvent`]: transport::TransportEvent
//! [`RTCSctpTransport::handle_event`]: sctp_transport::RTCSctpTransport::handle_event
//! [`RTCSctpTransport`]: sctp_transport::RTCSctpTransport
//! [`RTCDataChannel`]: data_channel::RTCDataChannel
//! [`DetachedDataChannel`]: data_channel::detached::DetachedDataChannel
//! [`LoopbackTransport`]: transport::loopback::LoopbackTransport

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod data_channel;
pub mod dtls_role;
pub mod flow_control;
pub mod sctp_transport;
pub mod setting_engine;
pub mod transport;

pub use shared;
