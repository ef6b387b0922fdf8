//! Per-family discovery policy.
//!
//! Each device family carries its own admission threshold and eviction limit.
//! The generic family admits every advertisement and never evicts on signal
//! strength.
use serde::{Deserialize, Serialize};

use crate::transport::{Advertisement, UART_SERVICE_UUID};

/// Platform value for "no RSSI measurement available".
pub const RSSI_UNAVAILABLE: i16 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Generic,
    /// UART light controller with a multi-channel driver.
    Amber,
}

/// RSSI thresholds for families that police signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssiPolicy {
    /// Weakest admitted signal (dBm), inclusive.
    pub minimum_rssi: i16,
    /// Consecutive failing readings before an admitted device is dropped.
    pub maximum_bad_rssi_count: u32,
}

impl Default for RssiPolicy {
    fn default() -> Self {
        Self {
            minimum_rssi: -76,
            maximum_bad_rssi_count: 5,
        }
    }
}

impl DeviceKind {
    /// Pick a family from the advertisement payload.
    pub fn classify(advertisement: &Advertisement) -> Self {
        if advertisement.advertises(&UART_SERVICE_UUID) {
            DeviceKind::Amber
        } else {
            DeviceKind::Generic
        }
    }

    pub fn admits(self, rssi: i16, policy: &RssiPolicy) -> bool {
        match self {
            DeviceKind::Generic => true,
            DeviceKind::Amber => rssi != RSSI_UNAVAILABLE && rssi >= policy.minimum_rssi,
        }
    }

    pub fn should_evict(self, bad_rssi_count: u32, policy: &RssiPolicy) -> bool {
        match self {
            DeviceKind::Generic => false,
            DeviceKind::Amber => bad_rssi_count >= policy.maximum_bad_rssi_count,
        }
    }

    /// Whether connected devices of this family get a channel driver.
    pub fn has_channel_driver(self) -> bool {
        matches!(self, DeviceKind::Amber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amber_threshold() {
        let policy = RssiPolicy::default();
        assert!(!DeviceKind::Amber.admits(-80, &policy));
        assert!(DeviceKind::Amber.admits(-70, &policy));
        assert!(DeviceKind::Amber.admits(-76, &policy));
        assert!(!DeviceKind::Amber.admits(RSSI_UNAVAILABLE, &policy));
        assert!(!DeviceKind::Amber.should_evict(4, &policy));
        assert!(DeviceKind::Amber.should_evict(5, &policy));
    }

    #[test]
    fn generic_admits_everything() {
        let policy = RssiPolicy::default();
        assert!(DeviceKind::Generic.admits(-120, &policy));
        assert!(DeviceKind::Generic.admits(RSSI_UNAVAILABLE, &policy));
        assert!(!DeviceKind::Generic.should_evict(u32::MAX, &policy));
    }

    #[test]
    fn classifies_by_uart_service() {
        let amber = Advertisement {
            local_name: Some("Amber".into()),
            service_uuids: vec![UART_SERVICE_UUID],
        };
        assert_eq!(DeviceKind::classify(&amber), DeviceKind::Amber);
        assert_eq!(
            DeviceKind::classify(&Advertisement::default()),
            DeviceKind::Generic
        );
    }
}
