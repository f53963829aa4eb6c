//! Persisted configuration model and its binary codec.
//!
//! The blob layout is: 2-byte magic (`0xBEEF`), 2-byte CRC-16/IBM over
//! the payload, then the payload in fixed array-major order (all OC
//! thresholds, all inrush thresholds, ...). A wrong magic means "no
//! saved config"; a wrong CRC means the payload is discarded and the
//! caller keeps its defaults.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::crc::crc16;
use crate::frame::DEFAULT_DIGOUT_COB_ID;
use crate::types::{OutputMode, CHANNEL_COUNT, MAX_GROUP};

/// Magic marker at the start of a valid blob.
pub const CONFIG_MAGIC: u16 = 0xBEEF;

/// Payload size in bytes (fields of [`PdmConfig`] in fixed order).
pub const CONFIG_PAYLOAD_LEN: usize =
    4 * 4 + 4 * 4 + 4 * 4 + 4 * 4 + 4 + 4 + CHANNEL_COUNT + CHANNEL_COUNT + 2 + 1 + 1 + 2;

/// Full blob size: magic + CRC + payload.
pub const CONFIG_BLOB_LEN: usize = 4 + CONFIG_PAYLOAD_LEN;

const_assert_eq!(CONFIG_PAYLOAD_LEN, 86);
const_assert_eq!(CONFIG_BLOB_LEN, 90);

/// Accepted CAN bit rates [kbps].
pub const CAN_BIT_RATES: [u16; 4] = [125, 250, 500, 1000];

// ─── Model ──────────────────────────────────────────────────────────

/// Per-channel fusing and behavior parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Steady-state fuse threshold [A].
    pub oc_threshold_a: f32,
    /// Inrush fuse threshold [A], applied inside the inrush window.
    pub inrush_threshold_a: f32,
    /// Inrush window length after turn-on [ms]. Zero skips the window.
    pub inrush_time_ms: u32,
    /// Undercurrent warning threshold [A].
    pub under_warn_a: f32,
    /// Latch or momentary behavior.
    pub mode: OutputMode,
    /// Logical ganging identifier, `1..=MAX_GROUP`.
    pub group: u8,
}

/// Complete persisted configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdmConfig {
    pub channels: [ChannelConfig; CHANNEL_COUNT],
    /// Temperature warning threshold [°C].
    pub temp_warn_c: f32,
    /// Temperature trip threshold [°C].
    pub temp_trip_c: f32,
    /// CAN bit rate [kbps].
    pub can_kbps: u16,
    /// Our node id (telemetry CoB-ID base).
    pub pdm_node_id: u8,
    /// Keypad node id (PDO/LED/SDO CoB-ID bases).
    pub keypad_node_id: u8,
    /// Remote digital-output command CoB-ID.
    pub digout_cob_id: u16,
}

impl Default for PdmConfig {
    fn default() -> Self {
        let channel = |group| ChannelConfig {
            oc_threshold_a: 3.0,
            inrush_threshold_a: 5.0,
            inrush_time_ms: 1000,
            under_warn_a: 0.10,
            mode: OutputMode::Latch,
            group,
        };
        Self {
            channels: [channel(1), channel(2), channel(3), channel(4)],
            temp_warn_c: 70.0,
            temp_trip_c: 85.0,
            can_kbps: 1000,
            pdm_node_id: 0x15,
            keypad_node_id: 0x15,
            digout_cob_id: DEFAULT_DIGOUT_COB_ID,
        }
    }
}

impl PdmConfig {
    /// Bounds-check every field.
    pub fn validate(&self) -> Result<(), String> {
        for (ch, c) in self.channels.iter().enumerate() {
            if !c.oc_threshold_a.is_finite() || c.oc_threshold_a < 0.0 {
                return Err(format!("CH{} OC threshold {} out of range", ch + 1, c.oc_threshold_a));
            }
            if !c.inrush_threshold_a.is_finite() || c.inrush_threshold_a < 0.0 {
                return Err(format!(
                    "CH{} inrush threshold {} out of range",
                    ch + 1,
                    c.inrush_threshold_a
                ));
            }
            if !c.under_warn_a.is_finite() || c.under_warn_a < 0.0 {
                return Err(format!(
                    "CH{} undercurrent warning {} out of range",
                    ch + 1,
                    c.under_warn_a
                ));
            }
            if c.group == 0 || c.group > MAX_GROUP {
                return Err(format!("CH{} group {} out of range [1, {MAX_GROUP}]", ch + 1, c.group));
            }
        }
        if !self.temp_warn_c.is_finite() || !self.temp_trip_c.is_finite() {
            return Err("temperature thresholds must be finite".to_string());
        }
        if !CAN_BIT_RATES.contains(&self.can_kbps) {
            return Err(format!("CAN bit rate {} kbps not supported", self.can_kbps));
        }
        Ok(())
    }

    /// Members of a group, as channel indices.
    pub fn group_members(&self, group: u8) -> impl Iterator<Item = usize> + '_ {
        self.channels
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.group == group)
            .map(|(ch, _)| ch)
    }
}

// ─── Codec errors ───────────────────────────────────────────────────

/// Failures reading or decoding a persisted blob.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Magic mismatch: the store holds no saved configuration.
    #[error("no saved configuration (magic 0x{found:04X})")]
    NoConfig { found: u16 },

    /// Blob shorter than the fixed layout.
    #[error("config blob truncated: {len} bytes, expected {expected}")]
    Truncated { len: usize, expected: usize },

    /// Payload CRC does not match the stored CRC.
    #[error("config CRC mismatch: stored 0x{stored:04X}, computed 0x{computed:04X}")]
    CrcMismatch { stored: u16, computed: u16 },

    /// Backing store I/O failure.
    #[error("config store I/O: {0}")]
    Io(String),
}

// ─── Codec ──────────────────────────────────────────────────────────

impl PdmConfig {
    /// Serialize to the persisted blob (magic, CRC, payload).
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload_bytes();
        let crc = crc16(&payload);
        let mut blob = Vec::with_capacity(CONFIG_BLOB_LEN);
        blob.extend_from_slice(&CONFIG_MAGIC.to_le_bytes());
        blob.extend_from_slice(&crc.to_le_bytes());
        blob.extend_from_slice(&payload);
        blob
    }

    /// Decode a persisted blob, verifying magic and CRC.
    pub fn from_bytes(blob: &[u8]) -> Result<Self, StoreError> {
        if blob.len() < 2 {
            return Err(StoreError::Truncated {
                len: blob.len(),
                expected: CONFIG_BLOB_LEN,
            });
        }
        let magic = u16::from_le_bytes([blob[0], blob[1]]);
        if magic != CONFIG_MAGIC {
            return Err(StoreError::NoConfig { found: magic });
        }
        if blob.len() < CONFIG_BLOB_LEN {
            return Err(StoreError::Truncated {
                len: blob.len(),
                expected: CONFIG_BLOB_LEN,
            });
        }
        let stored = u16::from_le_bytes([blob[2], blob[3]]);
        let payload = &blob[4..CONFIG_BLOB_LEN];
        let computed = crc16(payload);
        if stored != computed {
            return Err(StoreError::CrcMismatch { stored, computed });
        }
        Ok(Self::decode_payload(payload))
    }

    fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CONFIG_PAYLOAD_LEN);
        for c in &self.channels {
            out.extend_from_slice(&c.oc_threshold_a.to_le_bytes());
        }
        for c in &self.channels {
            out.extend_from_slice(&c.inrush_threshold_a.to_le_bytes());
        }
        for c in &self.channels {
            out.extend_from_slice(&c.inrush_time_ms.to_le_bytes());
        }
        for c in &self.channels {
            out.extend_from_slice(&c.under_warn_a.to_le_bytes());
        }
        out.extend_from_slice(&self.temp_warn_c.to_le_bytes());
        out.extend_from_slice(&self.temp_trip_c.to_le_bytes());
        for c in &self.channels {
            out.push(c.mode.as_u8());
        }
        for c in &self.channels {
            out.push(c.group);
        }
        out.extend_from_slice(&self.can_kbps.to_le_bytes());
        out.push(self.pdm_node_id);
        out.push(self.keypad_node_id);
        out.extend_from_slice(&self.digout_cob_id.to_le_bytes());
        out
    }

    /// Decode a CRC-verified payload. Individual out-of-range values are
    /// coerced to safe defaults rather than rejected wholesale.
    fn decode_payload(payload: &[u8]) -> Self {
        let mut cfg = Self::default();
        let mut pos = 0;
        let f32_at = |p: &mut usize| {
            let v = f32::from_le_bytes(payload[*p..*p + 4].try_into().unwrap_or([0; 4]));
            *p += 4;
            v
        };
        for ch in 0..CHANNEL_COUNT {
            cfg.channels[ch].oc_threshold_a = f32_at(&mut pos);
        }
        for ch in 0..CHANNEL_COUNT {
            cfg.channels[ch].inrush_threshold_a = f32_at(&mut pos);
        }
        for ch in 0..CHANNEL_COUNT {
            cfg.channels[ch].inrush_time_ms =
                u32::from_le_bytes(payload[pos..pos + 4].try_into().unwrap_or([0; 4]));
            pos += 4;
        }
        for ch in 0..CHANNEL_COUNT {
            cfg.channels[ch].under_warn_a = f32_at(&mut pos);
        }
        cfg.temp_warn_c = f32_at(&mut pos);
        cfg.temp_trip_c = f32_at(&mut pos);
        for ch in 0..CHANNEL_COUNT {
            cfg.channels[ch].mode = OutputMode::from_u8(payload[pos]);
            pos += 1;
        }
        for ch in 0..CHANNEL_COUNT {
            let g = payload[pos];
            cfg.channels[ch].group = if g == 0 || g > MAX_GROUP { (ch as u8) + 1 } else { g };
            pos += 1;
        }
        let kbps = u16::from_le_bytes([payload[pos], payload[pos + 1]]);
        cfg.can_kbps = if CAN_BIT_RATES.contains(&kbps) { kbps } else { 1000 };
        pos += 2;
        cfg.pdm_node_id = payload[pos];
        pos += 1;
        cfg.keypad_node_id = payload[pos];
        pos += 1;
        cfg.digout_cob_id = u16::from_le_bytes([payload[pos], payload[pos + 1]]);
        cfg
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
