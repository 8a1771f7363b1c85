//! Encryption framing
//!
//! Per-cipher IV/ExtIV material, the hardware key block placed in the
//! FIFO head, the CCMP MIC pseudo-header and the software cipher
//! primitives (RC4, Michael). All cipher state is either per-call or
//! behind the per-key TSC lock; nothing here shares scratch buffers
//! between frames.
//!
//! TKIP per-packet key mixing is not implemented locally; callers inject
//! it through [`TkipMixer`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::key::{CipherKind, TransmitKey};
use crate::mac::{MacAddr, MacHeader, FC_FROM_DS, FC_TO_DS};
use crate::wire::{crc32, WireWriter};
use crate::{Result, TxError};

/// Serialized size of [`MicHeader`].
pub const MIC_HDR_LEN: usize = 48;

/// Extended-IV flag in the key-index byte of TKIP and CCMP IVs.
const IV_EXT_FLAG: u8 = 0x20;

/// TKIP phase-1/phase-2 per-packet key mixing.
///
/// Produces the 16-byte RC4 seed for one frame from the temporal key,
/// the transmitter address and the 48-bit TSC. The first three seed
/// bytes double as the first three IV octets on the wire.
pub trait TkipMixer: Send + Sync {
    fn mix(&self, temporal_key: &[u8], ta: &MacAddr, tsc: u64) -> [u8; 16];
}

/// Per-frame key material: the 16-byte key block the hardware cipher
/// engine reads from the FIFO head, and the IV/ExtIV octets placed
/// between the MAC header and the payload.
#[derive(Debug, Clone)]
pub struct FrameKeyMaterial {
    pub tx_key: [u8; 16],
    pub iv: Vec<u8>,
    /// Counter value this frame consumed: the WEP IV counter or the
    /// key's TSC. The CCMP MIC pseudo-header is stamped from this value,
    /// not from the key, so a concurrent sender cannot skew the PN.
    pub tsc: u64,
}

/// Builds the cipher-specific framing for outgoing frames.
pub struct EncryptionFramer {
    /// Device-level WEP IV counter, 24 bits.
    wep_iv: AtomicU32,
    mixer: Option<Arc<dyn TkipMixer>>,
}

impl EncryptionFramer {
    pub fn new(mixer: Option<Arc<dyn TkipMixer>>) -> Self {
        Self {
            wep_iv: AtomicU32::new(0),
            mixer,
        }
    }

    /// Consume one IV/TSC value for `key` and build the frame's key
    /// material. WEP draws from the device-level IV counter; TKIP and
    /// CCMP advance the key's own TSC first and use the new value.
    pub fn frame_key(&self, key: &TransmitKey, ta: &MacAddr) -> Result<FrameKeyMaterial> {
        match key.cipher() {
            CipherKind::Wep => {
                let counter = self
                    .wep_iv
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                        Some(if c == 0x00ff_ffff { 0 } else { c + 1 })
                    })
                    .unwrap_or(0);
                let iv_word = counter | (u32::from(key.key_index()) << 30);
                let iv = iv_word.to_le_bytes().to_vec();

                // Hardware RC4 seed: the three IV octets then the key.
                // A 40-bit key fills only half the block; the engine
                // expects the 8-byte seed repeated.
                let mut tx_key = [0u8; 16];
                let key_len = key.key_bytes().len();
                tx_key[..3].copy_from_slice(&iv[..3]);
                tx_key[3..3 + key_len].copy_from_slice(key.key_bytes());
                if key_len == 5 {
                    let (head, tail) = tx_key.split_at_mut(8);
                    tail.copy_from_slice(head);
                }
                Ok(FrameKeyMaterial {
                    tx_key,
                    iv,
                    tsc: u64::from(counter),
                })
            }
            CipherKind::Tkip => {
                let mixer = self.mixer.as_ref().ok_or_else(|| {
                    TxError::KeyUnavailable
                })?;
                let tsc = key.advance();
                let seed = mixer.mix(key.temporal_key(), ta, tsc);

                let mut iv = Vec::with_capacity(8);
                iv.extend_from_slice(&seed[..3]);
                iv.push((key.key_index() << 6) | IV_EXT_FLAG);
                iv.extend_from_slice(&((tsc >> 16) as u32).to_le_bytes());
                Ok(FrameKeyMaterial {
                    tx_key: seed,
                    iv,
                    tsc,
                })
            }
            CipherKind::Ccmp => {
                let tsc = key.advance();
                let mut iv = Vec::with_capacity(8);
                iv.push(tsc as u8);
                iv.push((tsc >> 8) as u8);
                iv.push(0);
                iv.push((key.key_index() << 6) | IV_EXT_FLAG);
                iv.extend_from_slice(&((tsc >> 16) as u32).to_le_bytes());

                let mut tx_key = [0u8; 16];
                tx_key.copy_from_slice(key.key_bytes());
                Ok(FrameKeyMaterial { tx_key, iv, tsc })
            }
        }
    }

    /// Pseudo-header the hardware CCMP engine hashes as associated data.
    /// Built for protected data frames only; management frames never
    /// carry one. `tsc` is the frame's consumed counter value from
    /// [`FrameKeyMaterial`].
    pub fn mic_header(hdr: &MacHeader, payload_len: u16, tsc: u64) -> MicHeader {
        let four_addr = hdr.frame_control & (FC_TO_DS | FC_FROM_DS) == (FC_TO_DS | FC_FROM_DS);
        let mut ccmp_pn = [0u8; 6];
        for (i, b) in ccmp_pn.iter_mut().enumerate() {
            *b = (tsc >> (40 - 8 * i)) as u8;
        }
        MicHeader {
            id: 0x59,
            tx_priority: 0,
            mic_addr2: hdr.addr2,
            ccmp_pn,
            payload_len,
            hlen: if four_addr { 28 } else { 22 },
            frame_control: hdr.frame_control & 0xc78f,
            seq_ctrl: hdr.seq_ctrl & 0x000f,
            addr1: hdr.addr1,
            addr2: hdr.addr2,
            addr3: hdr.addr3,
            addr4: MacAddr::ZERO,
        }
    }
}

/// CCMP MIC associated-data block. Counters and lengths are big-endian,
/// frame/sequence control little-endian, matching the hardware's reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicHeader {
    pub id: u8,
    pub tx_priority: u8,
    pub mic_addr2: MacAddr,
    pub ccmp_pn: [u8; 6],
    pub payload_len: u16,
    pub hlen: u16,
    pub frame_control: u16,
    pub seq_ctrl: u16,
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub addr4: MacAddr,
}

impl MicHeader {
    pub fn serialize(&self, w: &mut WireWriter) -> Result<()> {
        w.write_u8(self.id)?;
        w.write_u8(self.tx_priority)?;
        w.write(self.mic_addr2.as_bytes())?;
        w.write(&self.ccmp_pn)?;
        w.write(&self.payload_len.to_be_bytes())?;
        w.write(&self.hlen.to_be_bytes())?;
        w.write_u16_le(self.frame_control)?;
        w.write_u16_le(self.seq_ctrl)?;
        w.write(self.addr1.as_bytes())?;
        w.write(self.addr2.as_bytes())?;
        w.write(self.addr3.as_bytes())?;
        w.write(self.addr4.as_bytes())?;
        w.write_zeros(2)
    }
}

/// RC4 stream cipher, one instance per frame.
pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(seed: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, b) in s.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j
                .wrapping_add(s[i])
                .wrapping_add(seed[i % seed.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    /// XOR the keystream over `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s
                [(self.s[self.i as usize].wrapping_add(self.s[self.j as usize])) as usize];
            *b ^= k;
        }
    }
}

/// WEP/TKIP integrity check value over the plaintext payload.
pub fn icv(data: &[u8]) -> [u8; 4] {
    crc32(data).to_le_bytes()
}

/// Software WEP/TKIP seal: append the ICV, then RC4 the payload and ICV
/// in place with the frame's key material.
pub fn seal_in_place(material: &FrameKeyMaterial, key: &TransmitKey, payload: &mut Vec<u8>) {
    let tag = icv(payload);
    payload.extend_from_slice(&tag);
    let seed_len = match key.cipher() {
        // IV octets + key, as loaded into the hardware key block.
        CipherKind::Wep => 3 + key.key_bytes().len(),
        _ => 16,
    };
    let mut rc4 = Rc4::new(&material.tx_key[..seed_len]);
    rc4.apply(payload);
}

/// Michael message integrity code over a frame's addresses and payload.
///
/// The hashed stream is destination, source, a zeroed 4-byte priority
/// word, the payload, then the 0x5a terminator and at least four zero
/// octets of padding to a 32-bit boundary.
pub fn michael_mic(mic_key: &[u8], dest: &MacAddr, src: &MacAddr, payload: &[u8]) -> [u8; 8] {
    let mut l = u32::from_le_bytes([mic_key[0], mic_key[1], mic_key[2], mic_key[3]]);
    let mut r = u32::from_le_bytes([mic_key[4], mic_key[5], mic_key[6], mic_key[7]]);

    let mut data = Vec::with_capacity(16 + payload.len() + 8);
    data.extend_from_slice(dest.as_bytes());
    data.extend_from_slice(src.as_bytes());
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(payload);
    data.push(0x5a);
    data.extend_from_slice(&[0, 0, 0, 0]);
    while data.len() % 4 != 0 {
        data.push(0);
    }

    for chunk in data.chunks_exact(4) {
        l ^= u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        michael_block(&mut l, &mut r);
    }

    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&l.to_le_bytes());
    out[4..].copy_from_slice(&r.to_le_bytes());
    out
}

fn michael_block(l: &mut u32, r: &mut u32) {
    *r ^= l.rotate_left(17);
    *l = l.wrapping_add(*r);
    *r ^= ((*l & 0xff00ff00) >> 8) | ((*l & 0x00ff00ff) << 8);
    *l = l.wrapping_add(*r);
    *r ^= l.rotate_left(3);
    *l = l.wrapping_add(*r);
    *r ^= l.rotate_right(2);
    *l = l.wrapping_add(*r);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyClass;

    fn wep_key() -> TransmitKey {
        TransmitKey::new(
            CipherKind::Wep,
            1,
            KeyClass::Group,
            false,
            vec![1, 2, 3, 4, 5],
        )
        .unwrap()
    }

    fn ccmp_key() -> TransmitKey {
        TransmitKey::new(
            CipherKind::Ccmp,
            2,
            KeyClass::Pairwise,
            false,
            (0u8..16).collect(),
        )
        .unwrap()
    }

    struct FixedMixer;
    impl TkipMixer for FixedMixer {
        fn mix(&self, _tk: &[u8], _ta: &MacAddr, tsc: u64) -> [u8; 16] {
            let mut seed = [0xa5u8; 16];
            seed[0] = tsc as u8;
            seed
        }
    }

    #[test]
    fn test_wep_iv_counter_use_then_increment() {
        let framer = EncryptionFramer::new(None);
        let key = wep_key();
        let ta = MacAddr::ZERO;

        let m0 = framer.frame_key(&key, &ta).unwrap();
        let m1 = framer.frame_key(&key, &ta).unwrap();
        // First frame uses counter value zero, key index in the top bits.
        assert_eq!(m0.iv, vec![0, 0, 0, 0x40]);
        assert_eq!(m1.iv, vec![1, 0, 0, 0x40]);
        // Seed is IV octets then the key bytes.
        assert_eq!(&m0.tx_key[..8], &[0, 0, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_wep_iv_counter_wraps_at_24_bits() {
        let framer = EncryptionFramer::new(None);
        framer.wep_iv.store(0x00ff_ffff, Ordering::Relaxed);
        let key = wep_key();
        let m = framer.frame_key(&key, &MacAddr::ZERO).unwrap();
        assert_eq!(m.iv, vec![0xff, 0xff, 0xff, 0x40]);
        let m = framer.frame_key(&key, &MacAddr::ZERO).unwrap();
        assert_eq!(m.iv, vec![0, 0, 0, 0x40]);
    }

    #[test]
    fn test_ccmp_iv_layout() {
        let framer = EncryptionFramer::new(None);
        let key = ccmp_key();
        let m = framer.frame_key(&key, &MacAddr::ZERO).unwrap();
        // TSC advanced to 1 before use; ext-IV flag and key index 2.
        assert_eq!(m.iv, vec![0x01, 0x00, 0x00, 0x20 | (2 << 6), 0, 0, 0, 0]);
        assert_eq!(&m.tx_key[..], key.key_bytes());
    }

    #[test]
    fn test_tkip_requires_mixer() {
        let framer = EncryptionFramer::new(None);
        let key = TransmitKey::new(
            CipherKind::Tkip,
            0,
            KeyClass::Pairwise,
            true,
            vec![0; 32],
        )
        .unwrap();
        assert!(framer.frame_key(&key, &MacAddr::ZERO).is_err());
    }

    #[test]
    fn test_tkip_iv_from_mixed_seed() {
        let framer = EncryptionFramer::new(Some(Arc::new(FixedMixer)));
        let key = TransmitKey::new(
            CipherKind::Tkip,
            1,
            KeyClass::Pairwise,
            true,
            vec![0; 32],
        )
        .unwrap();
        let m = framer.frame_key(&key, &MacAddr::ZERO).unwrap();
        // Seed bytes 0..3 become the IV head; TSC was 1.
        assert_eq!(&m.iv[..4], &[0x01, 0xa5, 0xa5, 0x20 | (1 << 6)]);
        assert_eq!(&m.iv[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_mic_header_layout() {
        let hdr = MacHeader {
            frame_control: 0x4208, // data, from-DS, protected
            duration: 44,
            addr1: MacAddr([1; 6]),
            addr2: MacAddr([2; 6]),
            addr3: MacAddr([3; 6]),
            seq_ctrl: 0x0ab5,
        };
        let mic = EncryptionFramer::mic_header(&hdr, 200, 1);
        assert_eq!(mic.id, 0x59);
        assert_eq!(mic.hlen, 22);
        assert_eq!(mic.ccmp_pn, [0, 0, 0, 0, 0, 1]);
        assert_eq!(mic.frame_control, 0x4208 & 0xc78f);
        assert_eq!(mic.seq_ctrl, 0x0005);

        let mut w = WireWriter::new(64);
        mic.serialize(&mut w).unwrap();
        assert_eq!(w.position(), MIC_HDR_LEN);
        // payload_len is big-endian at offset 14.
        assert_eq!(&w.as_slice()[14..16], &[0, 200]);
    }

    #[test]
    fn test_wep40_seed_fills_the_key_block() {
        let framer = EncryptionFramer::new(None);
        let key = wep_key();
        framer.wep_iv.store(0x00030201, Ordering::Relaxed);
        let m = framer.frame_key(&key, &MacAddr::ZERO).unwrap();
        // 3 IV octets + 5 key bytes, repeated into the upper half.
        let half = [0x01, 0x02, 0x03, 1, 2, 3, 4, 5];
        assert_eq!(&m.tx_key[..8], &half);
        assert_eq!(&m.tx_key[8..], &half);
    }

    #[test]
    fn test_material_carries_consumed_counter() {
        let framer = EncryptionFramer::new(None);
        let key = ccmp_key();
        // Advance the key from another frame first; the material must
        // hold the value its own IV was built from.
        key.advance();
        let m = framer.frame_key(&key, &MacAddr::ZERO).unwrap();
        assert_eq!(m.tsc, 2);
        assert_eq!(m.iv[0], 0x02);
        let mic = EncryptionFramer::mic_header(
            &MacHeader {
                frame_control: 0x4108,
                duration: 0,
                addr1: MacAddr([1; 6]),
                addr2: MacAddr([2; 6]),
                addr3: MacAddr([3; 6]),
                seq_ctrl: 0,
            },
            64,
            m.tsc,
        );
        assert_eq!(mic.ccmp_pn, [0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_rc4_round_trip() {
        let seed = [1u8, 2, 3, 4, 5];
        let mut data = b"wireless payload".to_vec();
        Rc4::new(&seed).apply(&mut data);
        assert_ne!(&data, b"wireless payload");
        Rc4::new(&seed).apply(&mut data);
        assert_eq!(&data, b"wireless payload");
    }

    #[test]
    fn test_wep_seal_is_recoverable() {
        let framer = EncryptionFramer::new(None);
        let key = wep_key();
        let m = framer.frame_key(&key, &MacAddr::ZERO).unwrap();

        let plain = b"snap payload".to_vec();
        let mut sealed = plain.clone();
        seal_in_place(&m, &key, &mut sealed);
        assert_eq!(sealed.len(), plain.len() + 4);

        let mut rc4 = Rc4::new(&m.tx_key[..8]);
        rc4.apply(&mut sealed);
        assert_eq!(&sealed[..plain.len()], &plain[..]);
        assert_eq!(&sealed[plain.len()..], &icv(&plain));
    }

    #[test]
    fn test_michael_block_values() {
        // Michael test vector: key of zeros, empty message.
        // MIC("") with K = 0 is 82925c1ca1d130b8 per the TKIP annex.
        let mut l = 0u32;
        let mut r = 0u32;
        // One padding block: 0x5a then zeros.
        l ^= u32::from_le_bytes([0x5a, 0, 0, 0]);
        michael_block(&mut l, &mut r);
        l ^= 0;
        michael_block(&mut l, &mut r);
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&l.to_le_bytes());
        out[4..].copy_from_slice(&r.to_le_bytes());
        assert_eq!(out, [0x82, 0x92, 0x5c, 0x1c, 0xa1, 0xd1, 0x30, 0xb8]);
    }

    #[test]
    fn test_michael_mic_padding_alignment() {
        // Payload lengths around the padding boundary all hash without
        // panicking and give distinct results.
        let key = [0x11u8; 8];
        let d = MacAddr([1; 6]);
        let s = MacAddr([2; 6]);
        let mut seen = std::collections::HashSet::new();
        for len in 0..8 {
            let payload = vec![0x42u8; len];
            assert!(seen.insert(michael_mic(&key, &d, &s, &payload)));
        }
    }
}
