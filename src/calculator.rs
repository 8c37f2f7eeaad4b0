//! The event-based risk calculator: wires exposure, hazard, sampling,
//! dispatch and aggregation into one run.

use std::error::Error;
use std::fmt;

use crate::aggregation::{Aggregator, RiskOutputs};
use crate::config::{ConfigError, RiskConfig};
use crate::curves::CurveError;
use crate::epsilons::{make_epsilons, EpsilonError};
use crate::evaluator::{evaluate_chunk, CurveParams, RiskPartial};
use crate::exposure::{synthetic_portfolio, AssetCollection, ExposureError};
use crate::hazard::{synthetic_catalog, GmfCatalog};
use crate::parallel::{TaskError, TaskManager};
use crate::riskinput::{build_inputs, RiskInput, RiskInputError};
use crate::stats::{compute_stats, StatsError, StatsOutputs};
use crate::vulnerability::{VulnerabilityError, VulnerabilityModel};

/// Anything that can end a calculation early.
#[derive(Debug, Clone, PartialEq)]
pub enum CalcError {
    Config(ConfigError),
    Exposure(ExposureError),
    Vulnerability(VulnerabilityError),
    Epsilon(EpsilonError),
    Input(RiskInputError),
    Curve(CurveError),
    Task(TaskError),
    Stats(StatsError),
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcError::Config(e) => write!(f, "{e}"),
            CalcError::Exposure(e) => write!(f, "{e}"),
            CalcError::Vulnerability(e) => write!(f, "{e}"),
            CalcError::Epsilon(e) => write!(f, "{e}"),
            CalcError::Input(e) => write!(f, "{e}"),
            CalcError::Curve(e) => write!(f, "{e}"),
            CalcError::Task(e) => write!(f, "{e}"),
            CalcError::Stats(e) => write!(f, "{e}"),
        }
    }
}

impl Error for CalcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CalcError::Config(e) => Some(e),
            CalcError::Exposure(e) => Some(e),
            CalcError::Vulnerability(e) => Some(e),
            CalcError::Epsilon(e) => Some(e),
            CalcError::Input(e) => Some(e),
            CalcError::Curve(e) => Some(e),
            CalcError::Task(e) => Some(e),
            CalcError::Stats(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CalcError {
    fn from(e: ConfigError) -> Self {
        CalcError::Config(e)
    }
}

impl From<ExposureError> for CalcError {
    fn from(e: ExposureError) -> Self {
        CalcError::Exposure(e)
    }
}

impl From<VulnerabilityError> for CalcError {
    fn from(e: VulnerabilityError) -> Self {
        CalcError::Vulnerability(e)
    }
}

impl From<EpsilonError> for CalcError {
    fn from(e: EpsilonError) -> Self {
        CalcError::Epsilon(e)
    }
}

impl From<RiskInputError> for CalcError {
    fn from(e: RiskInputError) -> Self {
        CalcError::Input(e)
    }
}

impl From<CurveError> for CalcError {
    fn from(e: CurveError) -> Self {
        CalcError::Curve(e)
    }
}

impl From<TaskError> for CalcError {
    fn from(e: TaskError) -> Self {
        CalcError::Task(e)
    }
}

impl From<StatsError> for CalcError {
    fn from(e: StatsError) -> Self {
        CalcError::Stats(e)
    }
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct CalculationResults {
    pub outputs: RiskOutputs,
    /// Present when the catalog has more than one realization.
    pub stats: Option<StatsOutputs>,
}

#[derive(Debug)]
pub struct EventBasedCalculator {
    config: RiskConfig,
}

impl EventBasedCalculator {
    /// Validates the configuration up front; a bad config never reaches
    /// the pipeline.
    pub fn new(config: RiskConfig) -> Result<Self, CalcError> {
        config.validate()?;
        Ok(EventBasedCalculator { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Run over the synthetic portfolio and catalog the config describes.
    pub fn run(&self) -> Result<CalculationResults, CalcError> {
        let portfolio = synthetic_portfolio(&self.config)?;
        let model = VulnerabilityModel::from_config(&self.config.vulnerability)?;
        let catalog = synthetic_catalog(&self.config, portfolio.sites(), &model.imts());
        self.execute(&portfolio, &model, &catalog)
    }

    /// Run against externally supplied exposure and hazard.
    pub fn run_with(
        &self,
        assets: &AssetCollection,
        catalog: &GmfCatalog,
    ) -> Result<CalculationResults, CalcError> {
        let model = VulnerabilityModel::from_config(&self.config.vulnerability)?;
        self.execute(assets, &model, catalog)
    }

    fn execute(
        &self,
        assets: &AssetCollection,
        model: &VulnerabilityModel,
        catalog: &GmfCatalog,
    ) -> Result<CalculationResults, CalcError> {
        let num_samples = if self.config.epsilon_sampling == 0 {
            catalog.num_events().max(1)
        } else {
            self.config.epsilon_sampling
        };
        let epsilons = make_epsilons(
            &assets.grouped_by_site(),
            num_samples,
            self.config.seed,
            self.config.correlation,
        )?;
        let inputs = build_inputs(catalog, assets, model, &epsilons)?;

        let params = CurveParams::new(&self.config, catalog);
        let aggregator = Aggregator::new(
            model.loss_types(),
            catalog.realizations(),
            assets.len(),
            catalog.num_events(),
            self.config.conditional_loss_poes.clone(),
            params,
        );
        let manager = TaskManager::from_config(&self.config);
        let events = catalog.events.as_slice();
        let aggregator = manager.apply(
            |chunk: &[RiskInput<'_>]| evaluate_chunk(chunk, events, model, params),
            inputs,
            |input| input.weight() as f64,
            |input| input.chunk_key(),
            aggregator,
            |acc: &mut Aggregator, partial: RiskPartial| acc.add(partial),
        )?;
        let outputs = aggregator.finish()?;

        let stats = if outputs.realizations.len() > 1 {
            Some(compute_stats(&outputs, &self.config.quantiles)?)
        } else {
            None
        };
        Ok(CalculationResults { outputs, stats })
    }
}
