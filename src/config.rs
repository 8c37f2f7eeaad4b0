use std::error::Error;
use std::fmt;

use crate::epsilons::AssetCorrelation;
use crate::types::{Imt, LossType};

/// Control points for one vulnerability function, keyed by taxonomy and
/// loss type. Kept as plain vectors here; the calculator turns each row
/// into a validated function at startup.
#[derive(Debug, Clone)]
pub struct VulnerabilityConfig {
    pub taxonomy: String,
    pub loss_type: LossType,
    pub imt: Imt,
    pub imls: Vec<f64>,
    pub mean_ratios: Vec<f64>,
    pub covs: Vec<f64>,
}

/// Every knob of one event-based risk calculation, constructed once and
/// passed explicitly. No field is read from the environment or looked up
/// by name at use sites.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub seed: u64,
    pub correlation: AssetCorrelation,

    // ── Curves and maps ───────────────────────────────────────────────────
    /// Number of points on every loss curve.
    pub curve_resolution: usize,
    /// PoEs at which per-asset loss map values are read off the curves.
    pub conditional_loss_poes: Vec<f64>,
    /// Quantile levels for across-realization statistics.
    pub quantiles: Vec<f64>,
    pub insured_losses: bool,

    // ── Sampling and distribution ─────────────────────────────────────────
    /// Epsilon columns per asset; 0 draws one column per event.
    pub epsilon_sampling: usize,
    /// Task chunking hint; 0 runs every chunk in-process, serially.
    pub concurrent_tasks: usize,
    pub soft_mem_percent: u32,
    pub hard_mem_percent: u32,

    // ── Stochastic event sets ─────────────────────────────────────────────
    /// Hazard investigation time in years; also the loss-curve time span.
    pub investigation_time: f64,
    pub ses_per_logic_tree_path: u32,
    pub number_of_logic_tree_samples: usize,
    pub num_realizations: usize,

    // ── Synthetic catalog and portfolio shape ─────────────────────────────
    /// Mean rupture count per year in each stochastic event set.
    pub annual_event_rate: f64,
    /// Median of the per-site ground-motion distribution, in g.
    pub gmv_median: f64,
    /// Lognormal sigma of the per-site ground-motion distribution.
    pub gmv_beta: f64,
    pub num_sites: usize,
    pub assets_per_site: usize,
    pub mean_asset_value: f64,
    /// Insurance deductible and limit as fractions of asset value.
    pub deductible_fraction: f64,
    pub limit_fraction: f64,

    pub vulnerability: Vec<VulnerabilityConfig>,
}

impl RiskConfig {
    pub fn canonical() -> Self {
        // ── Vulnerability templates ───────────────────────────────────────
        // IMLs in g, mean ratios as fractions of replacement value.
        // Three building taxonomies; contents for timber is mean-based
        // (all CoVs zero) so the deterministic path stays exercised.

        let rc_structural = VulnerabilityConfig {
            taxonomy: "RC".to_string(),
            loss_type: LossType::Structural,
            imt: Imt::Pga,
            imls: vec![0.05, 0.10, 0.20, 0.40, 0.80, 1.20],
            mean_ratios: vec![0.01, 0.04, 0.10, 0.30, 0.60, 0.90],
            covs: vec![0.30, 0.30, 0.25, 0.20, 0.15, 0.10],
        };

        let rc_contents = VulnerabilityConfig {
            taxonomy: "RC".to_string(),
            loss_type: LossType::Contents,
            imt: Imt::Pga,
            imls: vec![0.05, 0.10, 0.20, 0.40, 0.80, 1.20],
            mean_ratios: vec![0.02, 0.06, 0.15, 0.35, 0.55, 0.70],
            covs: vec![0.35, 0.35, 0.30, 0.25, 0.20, 0.20],
        };

        let urm_structural = VulnerabilityConfig {
            taxonomy: "URM".to_string(),
            loss_type: LossType::Structural,
            imt: Imt::Pga,
            imls: vec![0.03, 0.08, 0.15, 0.30, 0.60, 1.00],
            mean_ratios: vec![0.02, 0.08, 0.20, 0.45, 0.80, 1.00],
            covs: vec![0.40, 0.35, 0.30, 0.25, 0.15, 0.10],
        };

        let urm_occupants = VulnerabilityConfig {
            taxonomy: "URM".to_string(),
            loss_type: LossType::Occupants,
            imt: Imt::Pga,
            imls: vec![0.10, 0.30, 0.60, 1.00],
            mean_ratios: vec![0.00001, 0.001, 0.01, 0.05],
            covs: vec![0.50, 0.50, 0.40, 0.30],
        };

        let timber_structural = VulnerabilityConfig {
            taxonomy: "W1".to_string(),
            loss_type: LossType::Structural,
            imt: Imt::Sa { period_cs: 30 },
            imls: vec![0.05, 0.15, 0.30, 0.60, 1.00],
            mean_ratios: vec![0.01, 0.05, 0.12, 0.35, 0.70],
            covs: vec![0.30, 0.30, 0.25, 0.20, 0.15],
        };

        let timber_contents = VulnerabilityConfig {
            taxonomy: "W1".to_string(),
            loss_type: LossType::Contents,
            imt: Imt::Sa { period_cs: 30 },
            imls: vec![0.05, 0.15, 0.30, 0.60, 1.00],
            mean_ratios: vec![0.01, 0.04, 0.10, 0.25, 0.50],
            covs: vec![0.0, 0.0, 0.0, 0.0, 0.0],
        };

        RiskConfig {
            seed: 42,
            correlation: AssetCorrelation::None,
            curve_resolution: 50,
            conditional_loss_poes: vec![0.01, 0.02, 0.10],
            quantiles: vec![0.15, 0.50, 0.85],
            insured_losses: true,
            epsilon_sampling: 0,
            concurrent_tasks: 8,
            soft_mem_percent: 90,
            hard_mem_percent: 99,
            investigation_time: 50.0,
            ses_per_logic_tree_path: 10,
            number_of_logic_tree_samples: 1,
            num_realizations: 2,
            annual_event_rate: 0.2,
            gmv_median: 0.12,
            gmv_beta: 0.6,
            num_sites: 20,
            assets_per_site: 5,
            mean_asset_value: 250_000.0,
            deductible_fraction: 0.05,
            limit_fraction: 0.80,
            vulnerability: vec![
                rc_structural,
                rc_contents,
                urm_structural,
                urm_occupants,
                timber_structural,
                timber_contents,
            ],
        }
    }

    /// Total simulated time in years covered by one realization's event
    /// sets. This is the rate normalizer for every exceedance curve.
    pub fn tses(&self) -> f64 {
        self.investigation_time
            * self.ses_per_logic_tree_path as f64
            * self.number_of_logic_tree_samples as f64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.curve_resolution < 2 {
            return Err(ConfigError::CurveResolution(self.curve_resolution));
        }
        for &poe in &self.conditional_loss_poes {
            if !(poe > 0.0 && poe < 1.0) {
                return Err(ConfigError::PoeOutOfRange(poe));
            }
        }
        for &q in &self.quantiles {
            if !(q > 0.0 && q < 1.0) {
                return Err(ConfigError::QuantileOutOfRange(q));
            }
        }
        if self.investigation_time <= 0.0 {
            return Err(ConfigError::Param("investigation_time", self.investigation_time));
        }
        if self.ses_per_logic_tree_path == 0 {
            return Err(ConfigError::Param("ses_per_logic_tree_path", 0.0));
        }
        if self.number_of_logic_tree_samples == 0 {
            return Err(ConfigError::Param("number_of_logic_tree_samples", 0.0));
        }
        if self.num_realizations == 0 {
            return Err(ConfigError::Param("num_realizations", 0.0));
        }
        if self.soft_mem_percent > self.hard_mem_percent || self.hard_mem_percent > 100 {
            return Err(ConfigError::MemoryThresholds {
                soft: self.soft_mem_percent,
                hard: self.hard_mem_percent,
            });
        }
        if self.annual_event_rate <= 0.0 {
            return Err(ConfigError::Param("annual_event_rate", self.annual_event_rate));
        }
        if self.gmv_median <= 0.0 {
            return Err(ConfigError::Param("gmv_median", self.gmv_median));
        }
        if self.gmv_beta <= 0.0 {
            return Err(ConfigError::Param("gmv_beta", self.gmv_beta));
        }
        if self.num_sites == 0 || self.assets_per_site == 0 {
            return Err(ConfigError::EmptyPortfolio);
        }
        if self.mean_asset_value <= 0.0 {
            return Err(ConfigError::Param("mean_asset_value", self.mean_asset_value));
        }
        if !(0.0..=1.0).contains(&self.deductible_fraction)
            || !(0.0..=1.0).contains(&self.limit_fraction)
            || self.deductible_fraction > self.limit_fraction
        {
            return Err(ConfigError::InsuranceFractions {
                deductible: self.deductible_fraction,
                limit: self.limit_fraction,
            });
        }
        if self.vulnerability.is_empty() {
            return Err(ConfigError::NoVulnerability);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    CurveResolution(usize),
    PoeOutOfRange(f64),
    QuantileOutOfRange(f64),
    MemoryThresholds { soft: u32, hard: u32 },
    InsuranceFractions { deductible: f64, limit: f64 },
    EmptyPortfolio,
    NoVulnerability,
    Param(&'static str, f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::CurveResolution(n) => {
                write!(f, "curve_resolution must be at least 2, got {n}")
            }
            ConfigError::PoeOutOfRange(p) => {
                write!(f, "conditional loss PoE must lie in (0, 1), got {p}")
            }
            ConfigError::QuantileOutOfRange(q) => {
                write!(f, "quantile level must lie in (0, 1), got {q}")
            }
            ConfigError::MemoryThresholds { soft, hard } => write!(
                f,
                "memory thresholds need soft <= hard <= 100, got soft {soft}% hard {hard}%"
            ),
            ConfigError::InsuranceFractions { deductible, limit } => write!(
                f,
                "insurance fractions need 0 <= deductible <= limit <= 1, \
                 got deductible {deductible} limit {limit}"
            ),
            ConfigError::EmptyPortfolio => {
                f.write_str("portfolio must have at least one site and one asset per site")
            }
            ConfigError::NoVulnerability => {
                f.write_str("at least one vulnerability function is required")
            }
            ConfigError::Param(name, value) => {
                write!(f, "{name} out of range: {value}")
            }
        }
    }
}

impl Error for ConfigError {}
