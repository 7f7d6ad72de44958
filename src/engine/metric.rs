//! Distance metrics understood by the engine.

use serde::{Deserialize, Serialize};

use crate::error::{AnnBridgeError, Result};

/// Distance metric kinds, named the way the host spells them.
///
/// All kernels return a distance: lower is closer and identical inputs score
/// zero (except degenerate all-zero inputs under `Cos`/`Pearson`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Inner product, reported as `1 - a·b`.
    #[default]
    Ip,
    /// Squared Euclidean distance.
    L2sq,
    /// Cosine distance (`1 - cos θ`).
    Cos,
    /// Pearson correlation distance (`1 - r`).
    Pearson,
    /// Great-circle angle between `(lat, lon)` pairs given in radians.
    Haversine,
    /// Number of differing bits.
    Hamming,
    /// Jaccard distance over set bits.
    Tanimoto,
    /// Dice distance over set bits.
    Sorensen,
    /// Placeholder for names the engine does not know.
    Unknown,
}

impl MetricKind {
    /// Get the host name of this metric.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Ip => "ip",
            MetricKind::L2sq => "l2sq",
            MetricKind::Cos => "cos",
            MetricKind::Pearson => "pearson",
            MetricKind::Haversine => "haversine",
            MetricKind::Hamming => "hamming",
            MetricKind::Tanimoto => "tanimoto",
            MetricKind::Sorensen => "sorensen",
            MetricKind::Unknown => "unknown",
        }
    }

    /// Parse a metric from its host name.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ip" | "inner_product" | "dot" => Ok(MetricKind::Ip),
            "l2sq" | "euclidean_sq" => Ok(MetricKind::L2sq),
            "cos" | "cosine" | "angular" => Ok(MetricKind::Cos),
            "pearson" => Ok(MetricKind::Pearson),
            "haversine" => Ok(MetricKind::Haversine),
            "hamming" => Ok(MetricKind::Hamming),
            "tanimoto" | "jaccard" => Ok(MetricKind::Tanimoto),
            "sorensen" | "dice" => Ok(MetricKind::Sorensen),
            _ => Err(AnnBridgeError::invalid_argument(format!(
                "Unknown distance metric: {s}, choose: ip, l2sq, cos, pearson, haversine, hamming, tanimoto, sorensen"
            ))),
        }
    }

    /// Calculate the distance between two equally sized vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        match self {
            MetricKind::Ip => 1.0 - dot(a, b),
            MetricKind::L2sq => a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum(),
            MetricKind::Cos => {
                let norm_a = dot(a, a).sqrt();
                let norm_b = dot(b, b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot(a, b) / (norm_a * norm_b)
                }
            }
            MetricKind::Pearson => pearson(a, b),
            MetricKind::Haversine => haversine(a, b),
            MetricKind::Hamming => a
                .iter()
                .zip(b.iter())
                .filter(|(x, y)| (**x > 0.0) != (**y > 0.0))
                .count() as f32,
            MetricKind::Tanimoto => {
                let (both, either, _) = bit_counts(a, b);
                if either == 0 {
                    0.0
                } else {
                    1.0 - both as f32 / either as f32
                }
            }
            MetricKind::Sorensen => {
                let (both, _, total) = bit_counts(a, b);
                if total == 0 {
                    0.0
                } else {
                    1.0 - (2 * both) as f32 / total as f32
                }
            }
            MetricKind::Unknown => f32::NAN,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn pearson(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() {
        return 1.0;
    }

    let n = a.len() as f32;
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut covariance = 0.0f32;
    let mut variance_a = 0.0f32;
    let mut variance_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        covariance += dx * dy;
        variance_a += dx * dx;
        variance_b += dy * dy;
    }

    let denominator = (variance_a * variance_b).sqrt();
    if denominator == 0.0 {
        1.0
    } else {
        1.0 - covariance / denominator
    }
}

// Only the first two components take part; `make` guarantees there are two.
fn haversine(a: &[f32], b: &[f32]) -> f32 {
    let (lat_a, lon_a) = (a[0], a[1]);
    let (lat_b, lon_b) = (b[0], b[1]);

    let half_lat = ((lat_b - lat_a) * 0.5).sin();
    let half_lon = ((lon_b - lon_a) * 0.5).sin();
    let x = half_lat * half_lat + lat_a.cos() * lat_b.cos() * half_lon * half_lon;

    2.0 * x.clamp(0.0, 1.0).sqrt().asin()
}

/// Returns (bits set in both, bits set in either, bits set in a plus bits set in b).
fn bit_counts(a: &[f32], b: &[f32]) -> (usize, usize, usize) {
    a.iter()
        .zip(b.iter())
        .fold((0, 0, 0), |(both, either, total), (x, y)| {
            let (x, y) = (*x > 0.0, *y > 0.0);
            (
                both + (x && y) as usize,
                either + (x || y) as usize,
                total + x as usize + y as usize,
            )
        })
}
