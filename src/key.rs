//! Transmit key material
//!
//! Keys as the transmit path sees them: cipher kind, key index, the raw
//! key bytes and the 48-bit transmit sequence counter (TSC). The counter
//! lives behind a per-key lock so concurrent senders never reuse a
//! nonce; [`TransmitKey::advance`] is the only way to obtain a TSC value
//! for a frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::mac::MacAddr;
use crate::{Result, TxError};

/// Cipher suite a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Wep,
    Tkip,
    Ccmp,
}

impl CipherKind {
    /// IV bytes inserted between the MAC header and the payload.
    pub fn iv_len(self) -> usize {
        match self {
            CipherKind::Wep => 4,
            CipherKind::Tkip | CipherKind::Ccmp => 8,
        }
    }

    /// Integrity bytes appended after the payload (WEP/TKIP ICV or the
    /// CCMP MIC).
    pub fn icv_len(self) -> usize {
        match self {
            CipherKind::Wep | CipherKind::Tkip => 4,
            CipherKind::Ccmp => 8,
        }
    }

    /// Michael MIC bytes appended to the plaintext, TKIP only.
    pub fn mic_len(self) -> usize {
        match self {
            CipherKind::Tkip => 8,
            _ => 0,
        }
    }
}

/// Whether a key protects a single peer or the group address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Pairwise,
    Group,
}

/// One installed transmit key.
#[derive(Debug)]
pub struct TransmitKey {
    cipher: CipherKind,
    key_index: u8,
    class: KeyClass,
    /// Holder of the authenticator role for this key; selects which half
    /// of the TKIP key carries the transmit MIC key.
    authenticator: bool,
    key: Vec<u8>,
    tsc: Mutex<u64>,
}

/// TSC values wrap at 48 bits.
const TSC_MASK: u64 = 0x0000_ffff_ffff_ffff;

impl TransmitKey {
    pub fn new(
        cipher: CipherKind,
        key_index: u8,
        class: KeyClass,
        authenticator: bool,
        key: Vec<u8>,
    ) -> Result<Self> {
        if key_index > 3 {
            return Err(TxError::InvalidParameter(format!(
                "key index {} out of range",
                key_index
            )));
        }
        let valid_len = match cipher {
            CipherKind::Wep => matches!(key.len(), 5 | 13),
            CipherKind::Tkip => key.len() == 32,
            CipherKind::Ccmp => key.len() == 16,
        };
        if !valid_len {
            return Err(TxError::InvalidParameter(format!(
                "bad {:?} key length {}",
                cipher,
                key.len()
            )));
        }
        Ok(Self {
            cipher,
            key_index,
            class,
            authenticator,
            key,
            tsc: Mutex::new(0),
        })
    }

    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub fn key_index(&self) -> u8 {
        self.key_index
    }

    pub fn class(&self) -> KeyClass {
        self.class
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Temporal (encryption) portion of the key.
    pub fn temporal_key(&self) -> &[u8] {
        match self.cipher {
            CipherKind::Tkip => &self.key[..16],
            _ => &self.key,
        }
    }

    /// Michael MIC transmit key half. The authenticator transmits with
    /// bytes 16..24, the supplicant with 24..32; WPA-None peers all use
    /// the authenticator half.
    pub fn mic_tx_key(&self, wpa_none: bool) -> &[u8] {
        debug_assert_eq!(self.cipher, CipherKind::Tkip);
        if self.authenticator || wpa_none {
            &self.key[16..24]
        } else {
            &self.key[24..32]
        }
    }

    /// Increment the TSC and return the value to use for this frame.
    /// TKIP and CCMP consume the counter post-increment, so the first
    /// frame goes out with TSC 1.
    pub fn advance(&self) -> u64 {
        let mut tsc = self.tsc.lock().unwrap();
        *tsc = (*tsc + 1) & TSC_MASK;
        *tsc
    }

    /// Current counter value, without consuming one.
    pub fn current_tsc(&self) -> u64 {
        *self.tsc.lock().unwrap()
    }
}

/// Key lookup used by the transmit path.
pub trait KeyStore: Send + Sync {
    /// Pairwise key for a peer address.
    fn pairwise_key(&self, addr: &MacAddr) -> Option<Arc<TransmitKey>>;
    /// Group key installed for a BSSID.
    fn group_key(&self, bssid: &MacAddr) -> Option<Arc<TransmitKey>>;

    /// Transmit-key resolution: pairwise for the peer, then the group
    /// key of its BSS, then the broadcast group key.
    fn transmit_key(&self, addr: &MacAddr, bssid: &MacAddr) -> Option<Arc<TransmitKey>> {
        self.pairwise_key(addr)
            .or_else(|| self.group_key(bssid))
            .or_else(|| self.group_key(&MacAddr::BROADCAST))
    }
}

/// In-memory key table.
#[derive(Debug, Default)]
pub struct KeyTable {
    pairwise: RwLock<HashMap<MacAddr, Arc<TransmitKey>>>,
    group: RwLock<HashMap<MacAddr, Arc<TransmitKey>>>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pairwise(&self, addr: MacAddr, key: TransmitKey) {
        self.pairwise.write().unwrap().insert(addr, Arc::new(key));
    }

    pub fn set_group(&self, bssid: MacAddr, key: TransmitKey) {
        self.group.write().unwrap().insert(bssid, Arc::new(key));
    }

    pub fn remove_pairwise(&self, addr: &MacAddr) {
        self.pairwise.write().unwrap().remove(addr);
    }

    pub fn clear(&self) {
        self.pairwise.write().unwrap().clear();
        self.group.write().unwrap().clear();
    }
}

impl KeyStore for KeyTable {
    fn pairwise_key(&self, addr: &MacAddr) -> Option<Arc<TransmitKey>> {
        self.pairwise.read().unwrap().get(addr).cloned()
    }

    fn group_key(&self, bssid: &MacAddr) -> Option<Arc<TransmitKey>> {
        self.group.read().unwrap().get(bssid).cloned()
    }
}
