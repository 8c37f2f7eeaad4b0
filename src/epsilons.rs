use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::StandardNormal;

use crate::exposure::Asset;

/// Correlation of the epsilon draws between assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCorrelation {
    /// Every asset gets an independent sample sequence.
    None,
    /// All assets sharing a taxonomy get the same sample sequence.
    Perfect,
}

/// Dense standard-normal samples, one row per asset ordinal and one
/// column per sampling slot. Built once before dispatch and shared
/// read-only with every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct EpsilonMatrix {
    rows: Vec<Vec<f64>>,
    num_samples: usize,
}

impl EpsilonMatrix {
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn row(&self, ordinal: usize) -> &[f64] {
        &self.rows[ordinal]
    }

    /// The epsilon for one asset and one event. When the matrix carries
    /// fewer columns than there are events (reduced sampling for memory
    /// economy), events wrap around the columns.
    pub fn eps_for(&self, ordinal: usize, event_index: usize) -> f64 {
        self.rows[ordinal][event_index % self.num_samples]
    }
}

/// Draw the epsilon matrix for a calculation.
///
/// Assets are regrouped by taxonomy; each group draws from its own
/// seeded stream (master seed mixed with a stable hash of the tag), so
/// the result is bit-for-bit reproducible and independent of how the
/// input happens to be nested by site. Under perfect correlation one
/// row is drawn per group and broadcast to all of its assets.
pub fn make_epsilons(
    assets_by_site: &[Vec<&Asset>],
    num_samples: usize,
    seed: u64,
    correlation: AssetCorrelation,
) -> Result<EpsilonMatrix, EpsilonError> {
    let mut by_taxonomy: BTreeMap<&str, Vec<&Asset>> = BTreeMap::new();
    let mut rows_needed = 0usize;
    for site in assets_by_site {
        for asset in site {
            if asset.taxonomy.is_empty() && correlation == AssetCorrelation::Perfect {
                return Err(EpsilonError::MissingTaxonomy {
                    asset_ref: asset.asset_ref.clone(),
                });
            }
            by_taxonomy.entry(&asset.taxonomy).or_default().push(asset);
            rows_needed = rows_needed.max(asset.ordinal + 1);
        }
    }

    let mut rows = vec![Vec::new(); rows_needed];
    for (taxonomy, mut group) in by_taxonomy {
        group.sort_by_key(|a| a.ordinal);
        let mut rng = ChaCha20Rng::seed_from_u64(seed ^ fnv1a(taxonomy));
        match correlation {
            AssetCorrelation::Perfect => {
                let shared = draw_row(&mut rng, num_samples);
                for asset in group {
                    rows[asset.ordinal] = shared.clone();
                }
            }
            AssetCorrelation::None => {
                for asset in group {
                    rows[asset.ordinal] = draw_row(&mut rng, num_samples);
                }
            }
        }
    }

    Ok(EpsilonMatrix { rows, num_samples })
}

fn draw_row(rng: &mut ChaCha20Rng, num_samples: usize) -> Vec<f64> {
    (0..num_samples).map(|_| rng.sample(StandardNormal)).collect()
}

fn fnv1a(tag: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in tag.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

#[derive(Debug, Clone, PartialEq)]
pub enum EpsilonError {
    MissingTaxonomy { asset_ref: String },
}

impl fmt::Display for EpsilonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpsilonError::MissingTaxonomy { asset_ref } => {
                write!(f, "asset {asset_ref} has no structure category")
            }
        }
    }
}

impl Error for EpsilonError {}
