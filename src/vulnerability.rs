use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use crate::config::VulnerabilityConfig;
use crate::types::{Imt, LossType};

/// How a loss ratio scatters around the interpolated mean. Selected once
/// at construction: a function whose CoVs are all exactly zero never
/// samples, whatever epsilons it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossRatioDistribution {
    LogNormal,
    Degenerate,
}

impl LossRatioDistribution {
    pub fn for_covs(covs: &[f64]) -> Self {
        if covs.iter().all(|&c| c == 0.0) {
            LossRatioDistribution::Degenerate
        } else {
            LossRatioDistribution::LogNormal
        }
    }

    /// One loss ratio given the interpolated mean and CoV at an intensity
    /// level. A non-positive mean short-circuits to 0 so the ln-space
    /// parameters are never computed from it.
    pub fn sample(self, mean: f64, cov: f64, epsilon: f64) -> f64 {
        if mean <= 0.0 {
            return 0.0;
        }
        match self {
            LossRatioDistribution::Degenerate => mean,
            LossRatioDistribution::LogNormal => {
                if cov == 0.0 {
                    return mean;
                }
                let variance = (mean * cov) * (mean * cov);
                let sigma = (cov * cov + 1.0).ln().sqrt();
                let mu = (mean * mean / (variance + mean * mean).sqrt()).ln();
                (mu + epsilon * sigma).exp()
            }
        }
    }
}

/// Discrete vulnerability: mean loss ratio and CoV over ascending
/// intensity levels, linearly interpolated in between. IMLs are in the
/// units of the function's IMT (g for PGA/SA), ratios are fractions of
/// replacement value.
#[derive(Debug, Clone)]
pub struct VulnerabilityFunction {
    imt: Imt,
    imls: Vec<f64>,
    mean_ratios: Vec<f64>,
    covs: Vec<f64>,
    distribution: LossRatioDistribution,
}

impl VulnerabilityFunction {
    pub fn new(
        imt: Imt,
        imls: Vec<f64>,
        mean_ratios: Vec<f64>,
        covs: Vec<f64>,
    ) -> Result<Self, VulnerabilityError> {
        if imls.is_empty() {
            return Err(VulnerabilityError::EmptyImls);
        }
        if imls.len() != mean_ratios.len() || imls.len() != covs.len() {
            return Err(VulnerabilityError::LengthMismatch {
                imls: imls.len(),
                ratios: mean_ratios.len(),
                covs: covs.len(),
            });
        }
        if imls[0] < 0.0 {
            return Err(VulnerabilityError::NegativeIml(imls[0]));
        }
        if imls.windows(2).any(|w| w[0] >= w[1]) {
            return Err(VulnerabilityError::NonAscendingImls);
        }
        if let Some(&r) = mean_ratios.iter().find(|r| !(0.0..=1.0).contains(*r)) {
            return Err(VulnerabilityError::RatioOutOfRange(r));
        }
        if let Some(&c) = covs.iter().find(|c| **c < 0.0) {
            return Err(VulnerabilityError::NegativeCov(c));
        }
        let distribution = LossRatioDistribution::for_covs(&covs);
        Ok(VulnerabilityFunction { imt, imls, mean_ratios, covs, distribution })
    }

    pub fn imt(&self) -> Imt {
        self.imt
    }

    pub fn distribution(&self) -> LossRatioDistribution {
        self.distribution
    }

    pub fn iml_range(&self) -> (f64, f64) {
        (self.imls[0], self.imls[self.imls.len() - 1])
    }

    /// Interpolated mean loss ratio; input clipped to the IML range.
    pub fn loss_ratio_for(&self, iml: f64) -> f64 {
        interp(&self.imls, &self.mean_ratios, iml)
    }

    /// Interpolated CoV; input clipped to the IML range.
    pub fn cov_for(&self, iml: f64) -> f64 {
        interp(&self.imls, &self.covs, iml)
    }

    /// One loss ratio for one ground-motion value. Shaking below the
    /// first IML is below the damage threshold and yields exactly 0;
    /// above the last IML the ratio clips to the final control point.
    pub fn sample(&self, gmv: f64, epsilon: f64) -> f64 {
        if gmv < self.imls[0] {
            return 0.0;
        }
        let mean = self.loss_ratio_for(gmv);
        let cov = self.cov_for(gmv);
        self.distribution.sample(mean, cov, epsilon)
    }

    /// Loss ratios for a ground-motion series with aligned epsilons.
    pub fn evaluate(&self, gmvs: &[f32], epsilons: &[f64]) -> Vec<f64> {
        assert_eq!(gmvs.len(), epsilons.len(), "gmvs and epsilons must align");
        gmvs.iter()
            .zip(epsilons)
            .map(|(&gmv, &eps)| self.sample(gmv as f64, eps))
            .collect()
    }
}

/// Insurance transform: the retained part of a loss ratio between the
/// deductible and the limit, both expressed as fractions of value.
pub fn insured_ratio(ratio: f64, deductible: f64, limit: f64) -> f64 {
    (ratio.min(limit) - deductible).max(0.0)
}

/// Piecewise-linear interpolation with clipping at both ends.
fn interp(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let hi = xs.partition_point(|&v| v < x);
    let lo = hi - 1;
    let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] + t * (ys[hi] - ys[lo])
}

/// All vulnerability functions of one calculation, keyed by taxonomy and
/// loss type. The set of loss types and IMTs appearing here define the
/// shape of the output tables and the hazard data the run requires.
#[derive(Debug, Clone, Default)]
pub struct VulnerabilityModel {
    functions: HashMap<(String, LossType), VulnerabilityFunction>,
}

impl VulnerabilityModel {
    pub fn new() -> Self {
        VulnerabilityModel { functions: HashMap::new() }
    }

    pub fn from_config(rows: &[VulnerabilityConfig]) -> Result<Self, VulnerabilityError> {
        let mut model = VulnerabilityModel::new();
        for row in rows {
            let vf = VulnerabilityFunction::new(
                row.imt,
                row.imls.clone(),
                row.mean_ratios.clone(),
                row.covs.clone(),
            )?;
            model.insert(&row.taxonomy, row.loss_type, vf)?;
        }
        Ok(model)
    }

    pub fn insert(
        &mut self,
        taxonomy: &str,
        loss_type: LossType,
        function: VulnerabilityFunction,
    ) -> Result<(), VulnerabilityError> {
        let key = (taxonomy.to_string(), loss_type);
        if self.functions.contains_key(&key) {
            return Err(VulnerabilityError::DuplicateFunction {
                taxonomy: taxonomy.to_string(),
                loss_type,
            });
        }
        self.functions.insert(key, function);
        Ok(())
    }

    pub fn get(&self, taxonomy: &str, loss_type: LossType) -> Option<&VulnerabilityFunction> {
        self.functions.get(&(taxonomy.to_string(), loss_type))
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Functions registered for one taxonomy, ordered by loss type.
    pub fn functions_for(&self, taxonomy: &str) -> Vec<(LossType, &VulnerabilityFunction)> {
        let mut out: Vec<_> = self
            .functions
            .iter()
            .filter(|((t, _), _)| t == taxonomy)
            .map(|((_, lt), vf)| (*lt, vf))
            .collect();
        out.sort_by_key(|(lt, _)| lt.index());
        out
    }

    /// Distinct loss types across the model, ordered by column index.
    /// This ordering defines the loss-type axis of every output table.
    pub fn loss_types(&self) -> Vec<LossType> {
        let mut out: Vec<LossType> = LossType::ALL
            .into_iter()
            .filter(|lt| self.functions.keys().any(|(_, l)| l == lt))
            .collect();
        out.sort_by_key(|lt| lt.index());
        out
    }

    /// Distinct IMTs the model needs hazard data for.
    pub fn imts(&self) -> Vec<Imt> {
        let mut out: Vec<Imt> = Vec::new();
        for vf in self.functions.values() {
            if !out.contains(&vf.imt) {
                out.push(vf.imt);
            }
        }
        out.sort();
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VulnerabilityError {
    EmptyImls,
    LengthMismatch { imls: usize, ratios: usize, covs: usize },
    NonAscendingImls,
    NegativeIml(f64),
    RatioOutOfRange(f64),
    NegativeCov(f64),
    DuplicateFunction { taxonomy: String, loss_type: LossType },
}

impl fmt::Display for VulnerabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VulnerabilityError::EmptyImls => {
                f.write_str("vulnerability function needs at least one IML")
            }
            VulnerabilityError::LengthMismatch { imls, ratios, covs } => write!(
                f,
                "IMLs, loss ratios and CoVs must have equal length, \
                 got {imls}/{ratios}/{covs}"
            ),
            VulnerabilityError::NonAscendingImls => {
                f.write_str("IMLs must be strictly ascending")
            }
            VulnerabilityError::NegativeIml(v) => {
                write!(f, "IMLs must be non-negative, got {v}")
            }
            VulnerabilityError::RatioOutOfRange(r) => {
                write!(f, "mean loss ratios must lie in [0, 1], got {r}")
            }
            VulnerabilityError::NegativeCov(c) => {
                write!(f, "CoVs must be non-negative, got {c}")
            }
            VulnerabilityError::DuplicateFunction { taxonomy, loss_type } => {
                write!(f, "duplicate vulnerability function for {taxonomy}/{loss_type}")
            }
        }
    }
}

impl Error for VulnerabilityError {}
