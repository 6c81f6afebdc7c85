use std::fmt;

use serde::{Deserialize, Serialize};

/// Priority of a data channel relative to the other channels of the same
/// SCTP association.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCPriorityType {
    #[serde(rename = "very-low")]
    VeryLow,
    #[default]
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
}

impl RTCPriorityType {
    /// Wire value from the DATA_CHANNEL_OPEN message (RFC 8832, section 5.1).
    pub fn as_u16(self) -> u16 {
        match self {
            RTCPriorityType::VeryLow => 128,
            RTCPriorityType::Low => 256,
            RTCPriorityType::Medium => 512,
            RTCPriorityType::High => 1024,
        }
    }
}

impl From<u16> for RTCPriorityType {
    fn from(raw: u16) -> Self {
        match raw {
            0..=128 => RTCPriorityType::VeryLow,
            129..=256 => RTCPriorityType::Low,
            257..=512 => RTCPriorityType::Medium,
            _ => RTCPriorityType::High,
        }
    }
}

impl fmt::Display for RTCPriorityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCPriorityType::VeryLow => "very-low",
            RTCPriorityType::Low => "low",
            RTCPriorityType::Medium => "medium",
            RTCPriorityType::High => "high",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReliabilityType {
    #[default]
    Reliable = 0,
    Rexmit,
    Timed,
}

/// ChannelType determines the reliability of the WebRTC DataChannel.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChannelType {
    // `Reliable` determines the Data Channel provides a
    // reliable in-order bi-directional communication.
    #[default]
    Reliable,
    // `ReliableUnordered` determines the Data Channel
    // provides a reliable unordered bi-directional communication.
    ReliableUnordered,
    // `PartialReliableRexmit` determines the Data Channel
    // provides a partially-reliable in-order bi-directional communication.
    // User messages will not be retransmitted more times than specified in the Reliability Parameter.
    PartialReliableRexmit,
    // `PartialReliableRexmitUnordered` determines
    //  the Data Channel provides a partial reliable unordered bi-directional communication.
    // User messages will not be retransmitted more times than specified in the Reliability Parameter.
    PartialReliableRexmitUnordered,
    // `PartialReliableTimed` determines the Data Channel
    // provides a partial reliable in-order bi-directional communication.
    // User messages might not be transmitted or retransmitted after
    // a specified life-time given in milli- seconds in the Reliability Parameter.
    // This life-time starts when providing the user message to the protocol stack.
    PartialReliableTimed,
    // The Data Channel provides a partial reliable unordered bi-directional
    // communication.  User messages might not be transmitted or retransmitted
    // after a specified life-time given in milli- seconds in the Reliability Parameter.
    // This life-time starts when providing the user message to the protocol stack.
    PartialReliableTimedUnordered,
}

/// Parameters describing the configuration of a data channel.
///
/// Carried to the transport when a stream is opened, and received from it when
/// the remote peer opens one. `max_packet_life_time` and `max_retransmits` are
/// mutually exclusive.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCDataChannelParameters {
    /// The label that can be used to distinguish this DataChannel from others.
    pub label: String,

    /// The name of the sub-protocol in use.
    pub protocol: String,

    /// Whether the data channel guarantees in-order delivery of messages.
    pub ordered: bool,

    /// The maximum time in milliseconds during which transmissions and
    /// retransmissions may occur in unreliable mode.
    pub max_packet_life_time: Option<u16>,

    /// The maximum number of retransmission attempts in unreliable mode.
    pub max_retransmits: Option<u16>,

    /// Whether the stream identifier was agreed out-of-band by the application.
    pub negotiated: bool,

    pub priority: RTCPriorityType,
}

impl RTCDataChannelParameters {
    pub fn channel_type_and_reliability_parameter(&self) -> (ChannelType, u32) {
        match (self.max_retransmits, self.max_packet_life_time) {
            (None, None) => {
                if self.ordered {
                    (ChannelType::Reliable, 0)
                } else {
                    (ChannelType::ReliableUnordered, 0)
                }
            }
            (Some(max_retransmits), _) => {
                if self.ordered {
                    (ChannelType::PartialReliableRexmit, max_retransmits as u32)
                } else {
                    (
                        ChannelType::PartialReliableRexmitUnordered,
                        max_retransmits as u32,
                    )
                }
            }
            (None, Some(max_packet_life_time)) => {
                if self.ordered {
                    (ChannelType::PartialReliableTimed, max_packet_life_time as u32)
                } else {
                    (
                        ChannelType::PartialReliableTimedUnordered,
                        max_packet_life_time as u32,
                    )
                }
            }
        }
    }

    /// Returns `(unordered, reliability_type)` as the SCTP stream needs them.
    pub fn reliability_params(&self) -> (bool, ReliabilityType) {
        let (channel_type, _) = self.channel_type_and_reliability_parameter();
        match channel_type {
            ChannelType::Reliable => (false, ReliabilityType::Reliable),
            ChannelType::ReliableUnordered => (true, ReliabilityType::Reliable),
            ChannelType::PartialReliableRexmit => (false, ReliabilityType::Rexmit),
            ChannelType::PartialReliableRexmitUnordered => (true, ReliabilityType::Rexmit),
            ChannelType::PartialReliableTimed => (false, ReliabilityType::Timed),
            ChannelType::PartialReliableTimedUnordered => (true, ReliabilityType::Timed),
        }
    }
}
