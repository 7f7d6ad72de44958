//! Scalar kinds used to store vector components.

use bit_vec::BitVec;
use byteorder::{ByteOrder, LittleEndian};
use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{AnnBridgeError, Result};

/// Storage representation of vector components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// 64-bit IEEE float.
    F64,
    /// 32-bit IEEE float.
    #[default]
    F32,
    /// 16-bit IEEE float.
    F16,
    /// Signed byte, components scaled from `[-1, 1]`.
    I8,
    /// One bit per component (`x > 0`), packed eight to a byte.
    B1,
    /// Placeholder for names the engine does not know.
    Unknown,
}

impl ScalarKind {
    /// Get the host name of this scalar kind.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::F64 => "f64",
            ScalarKind::F32 => "f32",
            ScalarKind::F16 => "f16",
            ScalarKind::I8 => "i8",
            ScalarKind::B1 => "b1",
            ScalarKind::Unknown => "unknown",
        }
    }

    /// Parse a scalar kind from its host name.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "f64" | "float64" | "double" => Ok(ScalarKind::F64),
            "f32" | "float32" | "float" => Ok(ScalarKind::F32),
            "f16" | "float16" | "half" => Ok(ScalarKind::F16),
            "i8" | "int8" => Ok(ScalarKind::I8),
            "b1" | "b1x8" | "bits" => Ok(ScalarKind::B1),
            _ => Err(AnnBridgeError::invalid_argument(format!(
                "Unknown quantization: {s}, choose: f64, f32, f16, i8, b1"
            ))),
        }
    }

    /// Number of bytes one vector of `dimensions` components occupies.
    pub fn bytes_per_vector(&self, dimensions: usize) -> usize {
        match self {
            ScalarKind::F64 => dimensions * 8,
            ScalarKind::F32 => dimensions * 4,
            ScalarKind::F16 => dimensions * 2,
            ScalarKind::I8 => dimensions,
            ScalarKind::B1 => dimensions.div_ceil(8),
            ScalarKind::Unknown => 0,
        }
    }

    /// Append the encoded form of `vector` to `out`.
    pub(crate) fn encode(&self, vector: &[f32], out: &mut Vec<u8>) {
        match self {
            ScalarKind::F64 => {
                for &x in vector {
                    out.extend_from_slice(&f64::from(x).to_le_bytes());
                }
            }
            ScalarKind::F32 => {
                for &x in vector {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
            ScalarKind::F16 => {
                for &x in vector {
                    out.extend_from_slice(&f16::from_f32(x).to_le_bytes());
                }
            }
            ScalarKind::I8 => {
                out.extend(
                    vector
                        .iter()
                        .map(|x| ((x.clamp(-1.0, 1.0) * 127.0).round() as i8) as u8),
                );
            }
            ScalarKind::B1 => {
                let bits = BitVec::from_fn(vector.len(), |i| vector[i] > 0.0);
                out.extend_from_slice(&bits.to_bytes());
            }
            ScalarKind::Unknown => {}
        }
    }

    /// Decode one stored vector into `out`, whose length is the dimensionality.
    pub(crate) fn decode(&self, bytes: &[u8], out: &mut [f32]) {
        match self {
            ScalarKind::F64 => {
                for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
                    *value = LittleEndian::read_f64(chunk) as f32;
                }
            }
            ScalarKind::F32 => LittleEndian::read_f32_into(&bytes[..out.len() * 4], out),
            ScalarKind::F16 => {
                for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                    *value = f16::from_le_bytes([chunk[0], chunk[1]]).to_f32();
                }
            }
            ScalarKind::I8 => {
                for (value, &byte) in out.iter_mut().zip(bytes) {
                    *value = f32::from(byte as i8) / 127.0;
                }
            }
            ScalarKind::B1 => {
                let bits = BitVec::from_bytes(bytes);
                for (i, value) in out.iter_mut().enumerate() {
                    *value = if bits.get(i).unwrap_or(false) { 1.0 } else { 0.0 };
                }
            }
            ScalarKind::Unknown => out.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(kind: ScalarKind, vector: &[f32]) -> Vec<f32> {
        let mut bytes = Vec::new();
        kind.encode(vector, &mut bytes);
        assert_eq!(bytes.len(), kind.bytes_per_vector(vector.len()));
        let mut decoded = vec![0.0; vector.len()];
        kind.decode(&bytes, &mut decoded);
        decoded
    }

    #[test]
    fn test_parse_names() {
        for kind in [
            ScalarKind::F64,
            ScalarKind::F32,
            ScalarKind::F16,
            ScalarKind::I8,
            ScalarKind::B1,
        ] {
            assert_eq!(ScalarKind::parse_str(kind.name()).unwrap(), kind);
        }
        assert!(ScalarKind::parse_str("u4").is_err());
    }

    #[test]
    fn test_float_kinds_preserve_values() {
        let vector = [0.5, -0.25, 1.0, 0.0];
        assert_eq!(roundtrip(ScalarKind::F32, &vector), vector);
        assert_eq!(roundtrip(ScalarKind::F64, &vector), vector);
        assert_eq!(roundtrip(ScalarKind::F16, &vector), vector);
    }

    #[test]
    fn test_i8_scales_and_clamps() {
        let decoded = roundtrip(ScalarKind::I8, &[1.0, -1.0, 0.5, 3.0]);
        assert_eq!(decoded[0], 1.0);
        assert_eq!(decoded[1], -1.0);
        assert!((decoded[2] - 0.5).abs() < 0.01);
        assert_eq!(decoded[3], 1.0);
    }

    #[test]
    fn test_b1_packs_sign_bits() {
        let vector = [1.0, 0.0, -2.0, 0.3, 0.0, 0.0, 0.0, 0.0, 5.0];
        assert_eq!(ScalarKind::B1.bytes_per_vector(vector.len()), 2);
        assert_eq!(
            roundtrip(ScalarKind::B1, &vector),
            vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]
        );
    }
}
