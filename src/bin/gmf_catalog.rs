use std::collections::HashMap;
use std::env;

use eqrisk::config::RiskConfig;
use eqrisk::exposure::synthetic_portfolio;
use eqrisk::hazard::synthetic_catalog;
use eqrisk::vulnerability::VulnerabilityModel;

fn main() {
    let mut config = RiskConfig::canonical();

    if let Some(ses) = env::args().nth(1).and_then(|s| s.parse().ok()) {
        config.ses_per_logic_tree_path = ses;
    }

    let portfolio = synthetic_portfolio(&config).expect("failed to build the portfolio");
    let model =
        VulnerabilityModel::from_config(&config.vulnerability).expect("invalid vulnerability model");
    let catalog = synthetic_catalog(&config, portfolio.sites(), &model.imts());
    let records = catalog.flatten();

    // Write NDJSON to stdout.
    for record in &records {
        println!("{}", serde_json::to_string(record).expect("serialisation failed"));
    }

    // Per-IMT summary to stderr.
    let mut imt_counts: HashMap<&str, usize> = HashMap::new();
    let mut imt_sum_gmv: HashMap<&str, f64> = HashMap::new();
    let mut imt_max_gmv: HashMap<&str, f64> = HashMap::new();
    for r in &records {
        let imt = r.imt.as_str();
        *imt_counts.entry(imt).or_insert(0) += 1;
        *imt_sum_gmv.entry(imt).or_insert(0.0) += r.gmv as f64;
        let cur = imt_max_gmv.entry(imt).or_insert(0.0);
        if r.gmv as f64 > *cur {
            *cur = r.gmv as f64;
        }
    }

    let expected_events = config.annual_event_rate * config.tses();
    eprintln!(
        "gmf_catalog: {} events (expected ~{:.0}) on {} sites, {} records across {} realizations",
        catalog.num_events(),
        expected_events,
        portfolio.sites().len(),
        records.len(),
        catalog.sets.len(),
    );

    let magnitudes: Vec<f64> = catalog.events.iter().map(|e| e.magnitude).collect();
    if let (Some(lo), Some(hi)) = (
        magnitudes.iter().copied().reduce(f64::min),
        magnitudes.iter().copied().reduce(f64::max),
    ) {
        eprintln!("  magnitudes in [{lo:.2}, {hi:.2}]");
    }

    let mut imts: Vec<&str> = imt_counts.keys().copied().collect();
    imts.sort_unstable();
    for imt in imts {
        let n = imt_counts[imt];
        let mean = imt_sum_gmv[imt] / n as f64;
        let max = imt_max_gmv[imt];
        eprintln!("  imt={imt:<8}  records={n:>6}  mean_gmv={mean:.4}  max_gmv={max:.4}");
    }
}
