//! Units of parallelizable risk work.
//!
//! A risk input pairs one site's ground motion for one intensity measure
//! type with the assets standing at that site and the epsilon matrix they
//! draw from, under one hazard realization. Inputs carry a weight (their
//! asset count) so the chunking layer can balance workers, and a grouping
//! key so no chunk ever mixes realizations or IMTs.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use crate::epsilons::EpsilonMatrix;
use crate::exposure::{Asset, AssetCollection};
use crate::hazard::GmfCatalog;
use crate::types::{Imt, SiteId};
use crate::vulnerability::VulnerabilityModel;

#[derive(Debug, Clone, PartialEq)]
pub enum RiskInputError {
    /// The hazard computed none of the IMTs the vulnerability model needs.
    ImtMismatch { risk: Vec<Imt>, hazard: Vec<Imt> },
    /// The hazard knows the IMT but has no values at this site.
    MissingGmvs { imt: Imt, site: SiteId },
}

impl fmt::Display for RiskInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskInputError::ImtMismatch { risk, hazard } => write!(
                f,
                "no intersection between risk model IMTs [{}] and hazard IMTs [{}]",
                join_imts(risk),
                join_imts(hazard),
            ),
            RiskInputError::MissingGmvs { imt, site } => {
                write!(f, "no ground motion for {imt} at site {}", site.0)
            }
        }
    }
}

impl Error for RiskInputError {}

fn join_imts(imts: &[Imt]) -> String {
    imts.iter()
        .map(|imt| imt.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One unit of work: every event's ground motion for `imt` at `site`,
/// the assets standing there whose vulnerability reads that IMT, and the
/// epsilon matrix. Consumed exactly once by a worker.
#[derive(Debug, Clone)]
pub struct RiskInput<'a> {
    /// Ordinal of the hazard realization the ground motion belongs to.
    pub realization: usize,
    pub imt: Imt,
    pub site: SiteId,
    pub assets: Vec<&'a Asset>,
    /// One value per catalog event, aligned with the shared event list.
    pub gmvs: &'a [f32],
    pub epsilons: &'a EpsilonMatrix,
}

impl RiskInput<'_> {
    /// Chunking weight. Evaluation cost scales with the asset count; the
    /// event axis is the same for every input of a calculation.
    pub fn weight(&self) -> usize {
        self.assets.len()
    }

    /// Chunk grouping key: inputs from different realizations or IMTs
    /// never share a chunk.
    pub fn chunk_key(&self) -> (usize, Imt) {
        (self.realization, self.imt)
    }
}

/// Pair every (realization, IMT, site) with its assets, in a fixed order:
/// realizations as the catalog lists them, IMTs ascending, sites in
/// collection order. Sites where no asset reads the IMT produce no input.
///
/// Fails before any parallel work is dispatched when the hazard and the
/// vulnerability model have no IMT in common, or when a required site has
/// no ground motion for an IMT its assets need.
pub fn build_inputs<'a>(
    catalog: &'a GmfCatalog,
    assets: &'a AssetCollection,
    model: &VulnerabilityModel,
    epsilons: &'a EpsilonMatrix,
) -> Result<Vec<RiskInput<'a>>, RiskInputError> {
    let hazard_imts = catalog.imts();
    let risk_imts = model.imts();
    if !risk_imts.iter().any(|imt| hazard_imts.contains(imt)) {
        return Err(RiskInputError::ImtMismatch {
            risk: risk_imts,
            hazard: hazard_imts,
        });
    }

    let mut imts_by_taxonomy: HashMap<String, Vec<Imt>> = HashMap::new();
    for taxonomy in assets.taxonomies() {
        let imts: Vec<Imt> = model
            .functions_for(&taxonomy)
            .iter()
            .map(|(_, vf)| vf.imt())
            .collect();
        if imts.is_empty() {
            eprintln!("no vulnerability function for taxonomy {taxonomy}, its assets produce no losses");
        }
        imts_by_taxonomy.insert(taxonomy, imts);
    }

    let mut inputs = Vec::new();
    for set in &catalog.sets {
        for &imt in &risk_imts {
            for (site_index, site) in assets.sites().iter().enumerate() {
                let selected: Vec<&Asset> = assets
                    .ordinals_at(site_index)
                    .iter()
                    .map(|&ordinal| assets.get(ordinal))
                    .filter(|asset| {
                        imts_by_taxonomy
                            .get(&asset.taxonomy)
                            .is_some_and(|imts| imts.contains(&imt))
                    })
                    .collect();
                if selected.is_empty() {
                    continue;
                }
                let Some(gmvs) = set.gmvs(imt, site.id) else {
                    return Err(RiskInputError::MissingGmvs { imt, site: site.id });
                };
                inputs.push(RiskInput {
                    realization: set.realization.ordinal,
                    imt,
                    site: site.id,
                    assets: selected,
                    gmvs,
                    epsilons,
                });
            }
        }
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epsilons::{make_epsilons, AssetCorrelation};
    use crate::exposure::Site;
    use crate::hazard::{Event, GmfSet};
    use crate::types::{EventId, LossType, Realization};
    use crate::vulnerability::VulnerabilityFunction;

    fn model() -> VulnerabilityModel {
        let mut model = VulnerabilityModel::new();
        let pga = VulnerabilityFunction::new(
            Imt::Pga,
            vec![0.1, 0.3, 0.5],
            vec![0.05, 0.2, 0.5],
            vec![0.0; 3],
        )
        .unwrap();
        let sa = VulnerabilityFunction::new(
            Imt::Sa { period_cs: 30 },
            vec![0.1, 0.4, 0.9],
            vec![0.02, 0.1, 0.4],
            vec![0.0; 3],
        )
        .unwrap();
        model.insert("rc", LossType::Structural, pga).unwrap();
        model.insert("w1", LossType::Structural, sa).unwrap();
        model
    }

    fn collection() -> AssetCollection {
        let sites = vec![
            Site { id: SiteId(0), lon: -122.0, lat: 38.0 },
            Site { id: SiteId(1), lon: -122.1, lat: 38.1 },
        ];
        let mut a1 = Asset::new("a1", SiteId(0), "rc");
        a1.set_value(LossType::Structural, 1000.0);
        let mut a2 = Asset::new("a2", SiteId(0), "rc");
        a2.set_value(LossType::Structural, 2000.0);
        let mut b1 = Asset::new("b1", SiteId(1), "w1");
        b1.set_value(LossType::Structural, 500.0);
        AssetCollection::new(sites, vec![a1, a2, b1]).unwrap()
    }

    fn catalog() -> GmfCatalog {
        let events = vec![
            Event { id: EventId(0), ses: 1, sample: 0, magnitude: 5.2 },
            Event { id: EventId(1), ses: 1, sample: 0, magnitude: 6.0 },
            Event { id: EventId(2), ses: 2, sample: 0, magnitude: 5.7 },
        ];
        let mut set = GmfSet::new(Realization::new(0, 1.0, "b1~g0"));
        set.insert(Imt::Pga, SiteId(0), vec![0.1, 0.4, 0.2]);
        set.insert(Imt::Pga, SiteId(1), vec![0.05, 0.3, 0.15]);
        set.insert(Imt::Sa { period_cs: 30 }, SiteId(0), vec![0.2, 0.5, 0.3]);
        set.insert(Imt::Sa { period_cs: 30 }, SiteId(1), vec![0.1, 0.6, 0.2]);
        GmfCatalog {
            events,
            sets: vec![set],
            investigation_time: 50.0,
            ses_per_logic_tree_path: 10,
            samples: 1,
        }
    }

    fn epsilons(assets: &AssetCollection) -> EpsilonMatrix {
        make_epsilons(&assets.grouped_by_site(), 3, 42, AssetCorrelation::None).unwrap()
    }

    // ── Input construction ──────────────────────────────────────────────

    #[test]
    fn one_input_per_realization_imt_and_occupied_site() {
        let catalog = catalog();
        let assets = collection();
        let eps = epsilons(&assets);
        let inputs = build_inputs(&catalog, &assets, &model(), &eps).unwrap();

        // rc assets read PGA at site 0, w1 reads SA(0.30) at site 1
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].imt, Imt::Pga);
        assert_eq!(inputs[0].site, SiteId(0));
        assert_eq!(inputs[0].weight(), 2);
        assert_eq!(inputs[1].imt, Imt::Sa { period_cs: 30 });
        assert_eq!(inputs[1].site, SiteId(1));
        assert_eq!(inputs[1].weight(), 1);
    }

    #[test]
    fn gmvs_are_aligned_with_the_event_list() {
        let catalog = catalog();
        let assets = collection();
        let eps = epsilons(&assets);
        let inputs = build_inputs(&catalog, &assets, &model(), &eps).unwrap();
        for input in &inputs {
            assert_eq!(input.gmvs.len(), catalog.num_events());
        }
        assert_eq!(inputs[0].gmvs, &[0.1, 0.4, 0.2]);
    }

    #[test]
    fn chunk_keys_separate_realizations_and_imts() {
        let mut catalog = catalog();
        let second = {
            let mut set = GmfSet::new(Realization::new(1, 1.0, "b1~g1"));
            set.insert(Imt::Pga, SiteId(0), vec![0.2, 0.3, 0.1]);
            set.insert(Imt::Sa { period_cs: 30 }, SiteId(1), vec![0.3, 0.4, 0.1]);
            set
        };
        catalog.sets.push(second);
        let assets = collection();
        let eps = epsilons(&assets);
        let inputs = build_inputs(&catalog, &assets, &model(), &eps).unwrap();

        assert_eq!(inputs.len(), 4);
        let keys: Vec<_> = inputs.iter().map(|i| i.chunk_key()).collect();
        assert_eq!(
            keys,
            vec![
                (0, Imt::Pga),
                (0, Imt::Sa { period_cs: 30 }),
                (1, Imt::Pga),
                (1, Imt::Sa { period_cs: 30 }),
            ]
        );
    }

    // ── Failure modes ───────────────────────────────────────────────────

    #[test]
    fn disjoint_imts_fail_before_dispatch() {
        let events = vec![Event { id: EventId(0), ses: 1, sample: 0, magnitude: 5.0 }];
        let mut set = GmfSet::new(Realization::new(0, 1.0, "b1~g0"));
        set.insert(Imt::Pgv, SiteId(0), vec![1.0]);
        set.insert(Imt::Pgv, SiteId(1), vec![2.0]);
        let catalog = GmfCatalog {
            events,
            sets: vec![set],
            investigation_time: 50.0,
            ses_per_logic_tree_path: 10,
            samples: 1,
        };
        let assets = collection();
        let eps = epsilons(&assets);
        let err = build_inputs(&catalog, &assets, &model(), &eps).unwrap_err();
        assert!(matches!(err, RiskInputError::ImtMismatch { .. }));
        let text = err.to_string();
        assert!(text.contains("PGA"), "{text}");
        assert!(text.contains("PGV"), "{text}");
    }

    #[test]
    fn missing_site_gmvs_fail_before_dispatch() {
        let mut catalog = catalog();
        let mut set = GmfSet::new(Realization::new(0, 1.0, "b1~g0"));
        set.insert(Imt::Pga, SiteId(0), vec![0.1, 0.4, 0.2]);
        // no SA(0.30) at site 1, which the w1 asset needs
        catalog.sets = vec![set];
        let assets = collection();
        let eps = epsilons(&assets);
        let err = build_inputs(&catalog, &assets, &model(), &eps).unwrap_err();
        assert_eq!(
            err,
            RiskInputError::MissingGmvs {
                imt: Imt::Sa { period_cs: 30 },
                site: SiteId(1),
            }
        );
    }

    #[test]
    fn unknown_taxonomies_are_skipped_not_fatal() {
        let sites = vec![Site { id: SiteId(0), lon: 0.0, lat: 0.0 }];
        let mut known = Asset::new("k", SiteId(0), "rc");
        known.set_value(LossType::Structural, 100.0);
        let mut unknown = Asset::new("u", SiteId(0), "adobe");
        unknown.set_value(LossType::Structural, 100.0);
        let assets = AssetCollection::new(sites, vec![known, unknown]).unwrap();

        let events = vec![Event { id: EventId(0), ses: 1, sample: 0, magnitude: 5.0 }];
        let mut set = GmfSet::new(Realization::new(0, 1.0, "b1~g0"));
        set.insert(Imt::Pga, SiteId(0), vec![0.2]);
        set.insert(Imt::Sa { period_cs: 30 }, SiteId(0), vec![0.2]);
        let catalog = GmfCatalog {
            events,
            sets: vec![set],
            investigation_time: 50.0,
            ses_per_logic_tree_path: 10,
            samples: 1,
        };
        let eps = epsilons(&assets);
        let inputs = build_inputs(&catalog, &assets, &model(), &eps).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].assets.len(), 1);
        assert_eq!(inputs[0].assets[0].asset_ref, "k");
    }
}
