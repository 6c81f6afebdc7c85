use crate::data_channel::RTCDataChannelId;
use crate::dtls_role::RTCDtlsRole;
use shared::error::{Error, Result};
use std::collections::HashSet;

/// Picks the lowest free stream identifier of the parity owned by dtls_role.
///
/// Per RFC 8832 the DTLS client uses even identifiers and the DTLS server odd
/// ones, so the two peers never pick the same identifier for a new channel.
/// Every value of that parity up to and including 65535 is a candidate.
pub(crate) fn generate_data_channel_id(
    used: &HashSet<RTCDataChannelId>,
    dtls_role: RTCDtlsRole,
) -> Result<RTCDataChannelId> {
    let start = match dtls_role {
        RTCDtlsRole::Client => 0,
        RTCDtlsRole::Server => 1,
        RTCDtlsRole::Auto | RTCDtlsRole::Unspecified => {
            return Err(Error::ErrDtlsRoleNotNegotiated);
        }
    };

    (start..=RTCDataChannelId::MAX)
        .step_by(2)
        .find(|id| !used.contains(id))
        .ok_or(Error::ErrMaxDataChannelID)
}
