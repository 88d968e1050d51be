//! Radio driver trait for abstraction and testability
//!
//! The datagram radio is an external collaborator: it owns the peer table
//! and delivers completion and receive events from its own context. This
//! trait covers only what the link layers demand from it; events flow back
//! through the link layers' callback entry points.

/// 48-bit link-layer address
pub type Mac = [u8; 6];

/// Destination accepted by every radio
pub const BROADCAST_MAC: Mac = [0xFF; 6];

/// True for the two placeholder addresses (all-00 and all-FF)
pub fn mac_is_unknown(mac: &Mac) -> bool {
    mac.iter().all(|&b| b == 0xFF) || mac.iter().all(|&b| b == 0x00)
}

/// Errors that can occur when submitting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Frame exceeds the driver's maximum payload
    FrameTooLarge,
    /// Driver refused the frame
    SubmitFailed,
}

/// Abstract datagram radio interface.
///
/// `send` submits one frame for transmission and returns once the driver
/// has accepted it; delivery confirmation arrives later through the link
/// layer's `on_send_complete`. No link-layer retries are assumed.
pub trait RadioDriver {
    fn send(&mut self, dest: &Mac, frame: &[u8]) -> Result<(), RadioError>;
}
