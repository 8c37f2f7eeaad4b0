use std::collections::HashSet;
use std::error::Error;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, LogNormal};

use crate::config::RiskConfig;
use crate::types::{LossType, SiteId, N_LOSS_TYPES};

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: SiteId,
    pub lon: f64,
    pub lat: f64,
}

/// One exposed asset. Replacement values, deductibles and limits are held
/// per loss type; a `None` slot means the asset does not carry that loss
/// type. Deductible and limit are fractions of the corresponding value.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub asset_ref: String,
    pub site: SiteId,
    pub taxonomy: String,
    /// Position in the owning collection, assigned by
    /// `AssetCollection::new`. Epsilon matrix rows are indexed by it.
    pub ordinal: usize,
    values: [Option<f64>; N_LOSS_TYPES],
    deductibles: [Option<f64>; N_LOSS_TYPES],
    limits: [Option<f64>; N_LOSS_TYPES],
}

impl Asset {
    pub fn new(asset_ref: impl Into<String>, site: SiteId, taxonomy: impl Into<String>) -> Self {
        Asset {
            asset_ref: asset_ref.into(),
            site,
            taxonomy: taxonomy.into(),
            ordinal: 0,
            values: [None; N_LOSS_TYPES],
            deductibles: [None; N_LOSS_TYPES],
            limits: [None; N_LOSS_TYPES],
        }
    }

    pub fn set_value(&mut self, loss_type: LossType, value: f64) {
        self.values[loss_type.index()] = Some(value);
    }

    pub fn set_insurance(&mut self, loss_type: LossType, deductible: f64, limit: f64) {
        self.deductibles[loss_type.index()] = Some(deductible);
        self.limits[loss_type.index()] = Some(limit);
    }

    pub fn value(&self, loss_type: LossType) -> Option<f64> {
        self.values[loss_type.index()]
    }

    pub fn deductible(&self, loss_type: LossType) -> Option<f64> {
        self.deductibles[loss_type.index()]
    }

    pub fn insurance_limit(&self, loss_type: LossType) -> Option<f64> {
        self.limits[loss_type.index()]
    }
}

/// The exposure model: sites plus assets with stable ordinals. Immutable
/// once built; every downstream table row refers back to it by ordinal.
#[derive(Debug, Clone)]
pub struct AssetCollection {
    sites: Vec<Site>,
    assets: Vec<Asset>,
    /// Parallel to `sites`: ordinals of the assets at that site.
    by_site: Vec<Vec<usize>>,
}

impl AssetCollection {
    pub fn new(sites: Vec<Site>, mut assets: Vec<Asset>) -> Result<Self, ExposureError> {
        if sites.is_empty() {
            return Err(ExposureError::NoSites);
        }
        if assets.is_empty() {
            return Err(ExposureError::NoAssets);
        }

        let mut seen = HashSet::new();
        for site in &sites {
            if !seen.insert(site.id) {
                return Err(ExposureError::DuplicateSite(site.id));
            }
        }

        let mut by_site = vec![Vec::new(); sites.len()];
        for (ordinal, asset) in assets.iter_mut().enumerate() {
            asset.ordinal = ordinal;
            for lt in LossType::ALL {
                if let Some(v) = asset.value(lt)
                    && v < 0.0
                {
                    return Err(ExposureError::NegativeValue {
                        asset_ref: asset.asset_ref.clone(),
                        loss_type: lt,
                        value: v,
                    });
                }
                if let (Some(d), Some(l)) = (asset.deductible(lt), asset.insurance_limit(lt))
                    && !(0.0 <= d && d <= l && l <= 1.0)
                {
                    return Err(ExposureError::InvalidInsurance {
                        asset_ref: asset.asset_ref.clone(),
                        loss_type: lt,
                    });
                }
            }
            let site_index = sites
                .iter()
                .position(|s| s.id == asset.site)
                .ok_or_else(|| ExposureError::UnknownSite {
                    asset_ref: asset.asset_ref.clone(),
                    site: asset.site,
                })?;
            by_site[site_index].push(ordinal);
        }

        Ok(AssetCollection { sites, assets, by_site })
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> &Asset {
        &self.assets[ordinal]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Ordinals of the assets at the site with the given position in
    /// `sites()`, in insertion order.
    pub fn ordinals_at(&self, site_index: usize) -> &[usize] {
        &self.by_site[site_index]
    }

    /// Assets grouped per site, the shape the epsilon sampler consumes.
    pub fn grouped_by_site(&self) -> Vec<Vec<&Asset>> {
        self.by_site
            .iter()
            .map(|ordinals| ordinals.iter().map(|&o| &self.assets[o]).collect())
            .collect()
    }

    /// Distinct taxonomies, sorted.
    pub fn taxonomies(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .assets
            .iter()
            .map(|a| a.taxonomy.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        out.sort();
        out
    }
}

/// Build the demo portfolio: a square site grid with `assets_per_site`
/// assets on each site, taxonomies assigned round-robin from the
/// vulnerability templates. Values are lognormally scattered around
/// `mean_asset_value`; occupant counts are drawn uniformly. Deterministic
/// for a fixed config.
pub fn synthetic_portfolio(config: &RiskConfig) -> Result<AssetCollection, ExposureError> {
    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);

    let width = (config.num_sites as f64).sqrt().ceil() as usize;
    let sites: Vec<Site> = (0..config.num_sites)
        .map(|i| Site {
            id: SiteId(i as u64),
            lon: -121.8 + 0.05 * (i % width) as f64,
            lat: 37.2 + 0.05 * (i / width) as f64,
        })
        .collect();

    // Taxonomies in template order, deduplicated.
    let mut taxonomies: Vec<&str> = Vec::new();
    for vc in &config.vulnerability {
        if !taxonomies.contains(&vc.taxonomy.as_str()) {
            taxonomies.push(&vc.taxonomy);
        }
    }

    let scatter = LogNormal::new(0.0, 0.35).expect("invalid LogNormal params");

    let mut assets = Vec::with_capacity(config.num_sites * config.assets_per_site);
    for site in &sites {
        for slot in 0..config.assets_per_site {
            let n = assets.len();
            let taxonomy = taxonomies[n % taxonomies.len()];
            let mut asset = Asset::new(
                format!("a{}-{}", site.id.0, slot),
                site.id,
                taxonomy,
            );
            for vc in &config.vulnerability {
                if vc.taxonomy != taxonomy {
                    continue;
                }
                let value = match vc.loss_type {
                    LossType::Occupants => rng.random_range(2.0..120.0_f64).round(),
                    LossType::Structural => config.mean_asset_value * scatter.sample(&mut rng),
                    // Secondary categories sit below the structural value.
                    _ => 0.4 * config.mean_asset_value * scatter.sample(&mut rng),
                };
                asset.set_value(vc.loss_type, value);
                if config.insured_losses && vc.loss_type.insurable() {
                    asset.set_insurance(
                        vc.loss_type,
                        config.deductible_fraction,
                        config.limit_fraction,
                    );
                }
            }
            assets.push(asset);
        }
    }

    AssetCollection::new(sites, assets)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExposureError {
    NoSites,
    NoAssets,
    DuplicateSite(SiteId),
    UnknownSite { asset_ref: String, site: SiteId },
    NegativeValue { asset_ref: String, loss_type: LossType, value: f64 },
    InvalidInsurance { asset_ref: String, loss_type: LossType },
}

impl fmt::Display for ExposureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposureError::NoSites => f.write_str("exposure has no sites"),
            ExposureError::NoAssets => f.write_str("exposure has no assets"),
            ExposureError::DuplicateSite(id) => {
                write!(f, "duplicate site id {}", id.0)
            }
            ExposureError::UnknownSite { asset_ref, site } => {
                write!(f, "asset {asset_ref} references unknown site {}", site.0)
            }
            ExposureError::NegativeValue { asset_ref, loss_type, value } => {
                write!(f, "asset {asset_ref} has negative {loss_type} value {value}")
            }
            ExposureError::InvalidInsurance { asset_ref, loss_type } => write!(
                f,
                "asset {asset_ref} needs 0 <= deductible <= limit <= 1 for {loss_type}"
            ),
        }
    }
}

impl Error for ExposureError {}
