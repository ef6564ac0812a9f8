//! The Connection's role flag and its small size/timeout configuration surface.

use std::time::Duration;

/// Which side of the handshake a [`crate::connection::Connection`] is playing.
///
/// This is the single switch that determines masking direction (§4.1): a Client
/// masks every frame it writes and rejects masked frames it reads; a Server does
/// the opposite. Modeled as a plain enum rather than two separate types, since
/// nothing else about the state machine differs between the roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub(crate) fn masks_outgoing(self) -> bool {
        matches!(self, Role::Client)
    }

    pub(crate) fn requires_masked_incoming(self) -> bool {
        matches!(self, Role::Server)
    }
}

/// Size ceilings and the defensive read timeout a [`crate::connection::Connection`]
/// enforces. Defaults match the reference crate this was distilled from.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    /// Largest single-frame payload the codec accepts.
    pub max_frame_size: usize,
    /// Largest assembled (post-defragmentation) message accepted.
    pub max_message_size: usize,
    /// How long the codec waits for a promised frame payload once the header
    /// announcing its length has been read, guarding against a peer that
    /// completes the handshake and then stalls.
    pub frame_read_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: 16 << 20,
            max_message_size: 64 << 20,
            frame_read_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_masking_direction() {
        assert!(Role::Client.masks_outgoing());
        assert!(!Role::Server.masks_outgoing());

        assert!(Role::Server.requires_masked_incoming());
        assert!(!Role::Client.requires_masked_incoming());
    }

    #[test]
    fn default_config_matches_reference_sizes() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_frame_size, 16 << 20);
        assert_eq!(config.max_message_size, 64 << 20);
        assert_eq!(config.frame_read_timeout, Duration::from_secs(5));
    }
}
