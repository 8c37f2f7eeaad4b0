use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, LogNormal, Normal, Poisson};
use serde::Serialize;

use crate::config::RiskConfig;
use crate::exposure::Site;
use crate::types::{EventId, Imt, Realization, SiteId};

/// Ground motion below this level is recorded as exactly zero. Such
/// events still count in the catalog but produce no loss at the site,
/// which is what the first-bin exclusion in the curve transform is for.
pub const MIN_GMV: f32 = 0.005;

/// One rupture occurrence. `ses` is the 1-based stochastic-event-set
/// index within a logic-tree sample, `sample` the 0-based sample index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub ses: u32,
    pub sample: u32,
    pub magnitude: f64,
}

/// The ground-motion fields of one realization: per (IMT, site), one
/// intensity value per catalog event, aligned with `GmfCatalog::events`.
#[derive(Debug, Clone)]
pub struct GmfSet {
    pub realization: Realization,
    data: HashMap<(Imt, SiteId), Vec<f32>>,
}

impl GmfSet {
    pub fn new(realization: Realization) -> Self {
        GmfSet { realization, data: HashMap::new() }
    }

    pub fn insert(&mut self, imt: Imt, site: SiteId, gmvs: Vec<f32>) {
        self.data.insert((imt, site), gmvs);
    }

    pub fn gmvs(&self, imt: Imt, site: SiteId) -> Option<&[f32]> {
        self.data.get(&(imt, site)).map(|v| v.as_slice())
    }

    pub fn imts(&self) -> Vec<Imt> {
        let mut out: Vec<Imt> = Vec::new();
        for (imt, _) in self.data.keys() {
            if !out.contains(imt) {
                out.push(*imt);
            }
        }
        out.sort();
        out
    }
}

/// The hazard input of one calculation: a shared ordered event list plus
/// one ground-motion field set per realization. Immutable once built.
#[derive(Debug, Clone)]
pub struct GmfCatalog {
    pub events: Vec<Event>,
    pub sets: Vec<GmfSet>,
    pub investigation_time: f64,
    pub ses_per_logic_tree_path: u32,
    pub samples: usize,
}

impl GmfCatalog {
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Total simulated time in years; the rate normalizer of every
    /// exceedance curve built from this catalog.
    pub fn tses(&self) -> f64 {
        self.investigation_time * self.ses_per_logic_tree_path as f64 * self.samples as f64
    }

    /// The time span loss-curve probabilities refer to.
    pub fn time_span(&self) -> f64 {
        self.investigation_time
    }

    pub fn realizations(&self) -> Vec<Realization> {
        self.sets.iter().map(|s| s.realization.clone()).collect()
    }

    /// Distinct IMTs available across all realizations.
    pub fn imts(&self) -> Vec<Imt> {
        let mut out: Vec<Imt> = Vec::new();
        for set in &self.sets {
            for imt in set.imts() {
                if !out.contains(&imt) {
                    out.push(imt);
                }
            }
        }
        out.sort();
        out
    }

    /// Flat per-value records for the ndjson dump.
    pub fn flatten(&self) -> Vec<GmfRecord> {
        let mut out = Vec::new();
        for set in &self.sets {
            for (&(imt, site), gmvs) in &set.data {
                for (event, &gmv) in self.events.iter().zip(gmvs) {
                    out.push(GmfRecord {
                        rlz: set.realization.ordinal,
                        imt: imt.to_string(),
                        site: site.0,
                        event: event.id.0,
                        magnitude: event.magnitude,
                        gmv,
                    });
                }
            }
        }
        out.sort_by(|a, b| {
            (a.rlz, &a.imt, a.site, a.event).cmp(&(b.rlz, &b.imt, b.site, b.event))
        });
        out
    }
}

/// One line of the catalog dump.
#[derive(Debug, Clone, Serialize)]
pub struct GmfRecord {
    pub rlz: usize,
    pub imt: String,
    pub site: u64,
    pub event: u64,
    pub magnitude: f64,
    pub gmv: f32,
}

/// Generate a synthetic catalog: Poisson rupture arrivals per stochastic
/// event set, a normal magnitude scatter, and per-site lognormal ground
/// motion whose median scales with magnitude. Stands in for the hazard
/// side in the binaries, benches and end-to-end tests. Deterministic for
/// a fixed config.
pub fn synthetic_catalog(config: &RiskConfig, sites: &[Site], imts: &[Imt]) -> GmfCatalog {
    // Offset keeps this stream apart from the portfolio stream, which
    // draws from the seed itself.
    let mut rng = ChaCha20Rng::seed_from_u64(config.seed.wrapping_add(1));

    let lambda = config.annual_event_rate * config.investigation_time;
    let poisson = Poisson::new(lambda).expect("invalid Poisson lambda");
    let magnitudes = Normal::<f64>::new(5.5, 0.8).expect("invalid Normal params");

    let mut events = Vec::new();
    let mut next_id = 0u64;
    for sample in 0..config.number_of_logic_tree_samples as u32 {
        for ses in 1..=config.ses_per_logic_tree_path {
            let n = poisson.sample(&mut rng) as u64;
            for _ in 0..n {
                let magnitude = magnitudes.sample(&mut rng).clamp(4.0, 8.5);
                events.push(Event { id: EventId(next_id), ses, sample, magnitude });
                next_id += 1;
            }
        }
    }

    let realizations: Vec<Realization> = (0..config.num_realizations)
        .map(|r| {
            Realization::new(
                r,
                1.0 / config.num_realizations as f64,
                format!("b1~g{r}"),
            )
        })
        .collect();

    let mut sets = Vec::with_capacity(realizations.len());
    for realization in realizations {
        let mut set = GmfSet::new(realization);
        for &imt in imts {
            for site in sites {
                let gmvs: Vec<f32> = events
                    .iter()
                    .map(|event| {
                        let event_scale = (0.9 * (event.magnitude - 5.5)).exp();
                        let median = config.gmv_median * event_scale * imt_scale(imt);
                        let dist = LogNormal::new(median.ln(), config.gmv_beta)
                            .expect("invalid LogNormal params");
                        let gmv = dist.sample(&mut rng) as f32;
                        if gmv < MIN_GMV { 0.0 } else { gmv }
                    })
                    .collect();
                set.insert(imt, site.id, gmvs);
            }
        }
        sets.push(set);
    }

    GmfCatalog {
        events,
        sets,
        investigation_time: config.investigation_time,
        ses_per_logic_tree_path: config.ses_per_logic_tree_path,
        samples: config.number_of_logic_tree_samples,
    }
}

/// Crude spectral shape: short-period SA amplifies PGA, PGV is on a
/// different scale entirely.
fn imt_scale(imt: Imt) -> f64 {
    match imt {
        Imt::Pga => 1.0,
        Imt::Pgv => 8.0,
        Imt::Sa { period_cs } if period_cs <= 50 => 1.4,
        Imt::Sa { .. } => 0.8,
    }
}
