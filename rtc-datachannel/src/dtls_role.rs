use std::fmt;

use serde::{Deserialize, Serialize};

const UNSPECIFIED_STR: &str = "Unspecified";

/// RTCDtlsRole indicates the role of the DTLS transport.
///
/// The SCTP transport only needs the negotiated role: it decides the parity
/// of the stream identifiers this peer may allocate (RFC 8832, section 6).
/// The DTLS client allocates even identifiers, the DTLS server odd ones.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCDtlsRole {
    #[default]
    Unspecified = 0,

    /// DTLSRoleAuto defines the DTLS role is determined based on
    /// the resolved ICE role: the ICE controlled role acts as the DTLS
    /// client and the ICE controlling role acts as the DTLS server.
    #[serde(rename = "auto")]
    Auto = 1,

    /// DTLSRoleClient defines the DTLS client role.
    #[serde(rename = "client")]
    Client = 2,

    /// DTLSRoleServer defines the DTLS server role.
    #[serde(rename = "server")]
    Server = 3,
}

impl fmt::Display for RTCDtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCDtlsRole::Auto => write!(f, "auto"),
            RTCDtlsRole::Client => write!(f, "client"),
            RTCDtlsRole::Server => write!(f, "server"),
            _ => write!(f, "{UNSPECIFIED_STR}"),
        }
    }
}

impl From<&str> for RTCDtlsRole {
    fn from(raw: &str) -> Self {
        match raw {
            "auto" => RTCDtlsRole::Auto,
            "client" => RTCDtlsRole::Client,
            "server" => RTCDtlsRole::Server,
            _ => RTCDtlsRole::Unspecified,
        }
    }
}

impl RTCDtlsRole {
    /// Returns true once the role is settled to either client or server.
    pub fn is_negotiated(self) -> bool {
        matches!(self, RTCDtlsRole::Client | RTCDtlsRole::Server)
    }
}
