//! # 802.11 Transmit Frame Assembly
//!
//! This crate implements the transmit path of a legacy 802.11a/b/g USB
//! wireless adapter: it turns outgoing Ethernet frames, management frames
//! and beacons into fully formed hardware transmit buffers.
//!
//! ## Architecture
//!
//! The implementation is organized into several modules:
//! - `config`: device-level configuration (operating mode, rates, thresholds)
//! - `rates`: data rates, PHY packet types and the automatic-fallback tables
//! - `baseband`: PHY airtime model and signal/service/length field generation
//! - `duration`: duration/ID and channel-reservation time calculations
//! - `wire`: low-level wire buffer utilities
//! - `mac`: 802.3 to 802.11 MAC header translation
//! - `protect`: RTS/CTS protection heads and per-PHY data heads
//! - `key`: transmit key material and packet-sequence counters
//! - `crypto`: per-packet WEP/TKIP/CCMP encryption framing
//! - `context`: reusable transmit buffer pool
//! - `assembler`: top-level frame assembly entry points

pub mod assembler;
pub mod baseband;
pub mod config;
pub mod context;
pub mod crypto;
pub mod duration;
pub mod key;
pub mod mac;
pub mod protect;
pub mod rates;
pub mod wire;

// Re-export commonly used types
pub use crate::{
    assembler::{FrameAssembler, MgmtPacket, Transport, TxStats},
    config::{DeviceConfig, OperatingMode},
    context::{ContextHandle, PacketKind, TxContextPool},
    crypto::TkipMixer,
    key::{CipherKind, KeyClass, KeyStore, KeyTable, TransmitKey},
    rates::{FallbackMode, PhyType, Preamble, Rate},
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no free transmit context")]
    ResourceExhaustion,

    #[error("encryption required but no transmit key resolved")]
    KeyUnavailable,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("buffer is full")]
    BufferFull,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, TxError>;

// Constants
/// 802.11 FCS trailer length appended by hardware.
pub const FCS_LEN: usize = 4;
/// Three-address 802.11 MAC header length.
pub const MAC_HDR_LEN: usize = 24;
/// Two-address MAC header length (PS-Poll and other short control frames).
pub const MAC_HDR_ADDR2_LEN: usize = 16;
/// 802.3 header length.
pub const ETH_HDR_LEN: usize = 14;
/// Maximum 802.3 length-field value; larger values are ethertypes.
pub const ETH_DATA_LEN: u16 = 1500;
/// SNAP/802.1H encapsulation growth (6-byte SNAP + 2-byte ethertype).
pub const SNAP_LEN: usize = 8;
/// An RTS control frame is 20 bytes, a CTS or ACK is 14.
pub const RTS_FRAME_LEN: usize = 20;
pub const CTS_FRAME_LEN: usize = 14;
pub const ACK_FRAME_LEN: usize = 14;

// Utility functions
pub fn init_logging() {
    env_logger::init();
}
