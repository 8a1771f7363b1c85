//! Device configuration
//!
//! Device-level knobs consumed by the frame assembler. Everything here is
//! decided outside the transmit path (association, calibration, user
//! configuration) and read per frame.

use serde::{Deserialize, Serialize};

use crate::mac::MacAddr;
use crate::rates::{FallbackMode, Preamble, Rate};

/// Operating mode of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Access point: frames leave the distribution system (from-DS).
    AccessPoint,
    /// Independent BSS: direct station-to-station frames.
    Adhoc,
    /// Infrastructure station: frames enter the distribution system (to-DS).
    Station,
}

/// Baseband band type the radio is tuned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandType {
    B,
    G,
    A,
}

impl BandType {
    /// Short interframe space for this band, in microseconds.
    pub fn sifs(self) -> u32 {
        match self {
            BandType::A => 16,
            BandType::B | BandType::G => 10,
        }
    }
}

/// Default RTS threshold: protection disabled for all legal frame sizes.
pub const DEFAULT_RTS_THRESHOLD: u32 = 2347;

/// MSDU lifetime written into the FIFO head for data frames, 64 us units.
pub const DEFAULT_MSDU_LIFETIME_RES_64US: u16 = 8000;

/// Management frame lifetime, 64 us units.
pub const DEFAULT_MGMT_LIFETIME_RES_64US: u16 = 125;

/// Device configuration snapshot read by the transmit path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Adapter's own MAC address.
    pub own_addr: MacAddr,
    /// BSSID of the current network.
    pub bssid: MacAddr,
    /// Operating mode.
    pub mode: OperatingMode,
    /// Band the radio is on.
    pub band: BandType,
    /// CCK preamble type.
    pub preamble: Preamble,
    /// Highest CCK basic rate negotiated with the BSS.
    pub top_cck_rate: Rate,
    /// Highest OFDM basic rate negotiated with the BSS.
    pub top_ofdm_rate: Rate,
    /// RTS protection threshold (header + body + ICV + FCS).
    pub rts_threshold: u32,
    /// Automatic-fallback table selection.
    pub fallback: FallbackMode,
    /// Group-ACK policy flag forwarded to hardware.
    pub group_ack_policy: bool,
    /// Data frames must be encrypted; sends are dropped when no key
    /// resolves.
    pub encryption_enabled: bool,
    /// ERP protection active in the BSS; 11g data goes out as the
    /// CCK-protected packet type.
    pub protect_mode: bool,
    /// Ciphers run in software instead of the radio's crypto engine.
    pub software_crypto: bool,
    /// WPA-None authentication (ad-hoc); selects the authenticator half
    /// of the TKIP MIC key.
    pub wpa_none: bool,
    /// Number of reusable transmit contexts.
    pub tx_contexts: usize,
}

impl DeviceConfig {
    /// Short interframe space in effect, in microseconds.
    pub fn sifs(&self) -> u32 {
        self.band.sifs()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            own_addr: MacAddr::ZERO,
            bssid: MacAddr::ZERO,
            mode: OperatingMode::Station,
            band: BandType::G,
            preamble: Preamble::Long,
            top_cck_rate: Rate::R1M,
            top_ofdm_rate: Rate::R6M,
            rts_threshold: DEFAULT_RTS_THRESHOLD,
            fallback: FallbackMode::None,
            group_ack_policy: false,
            encryption_enabled: false,
            protect_mode: false,
            software_crypto: false,
            wpa_none: false,
            tx_contexts: 8,
        }
    }
}
