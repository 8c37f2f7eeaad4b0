use std::fs::File;
use std::io::{BufWriter, Write};

use eqrisk::calculator::{CalculationResults, EventBasedCalculator};
use eqrisk::config::RiskConfig;
use eqrisk::epsilons::AssetCorrelation;
use eqrisk::exposure::{synthetic_portfolio, AssetCollection};
use eqrisk::hazard::{synthetic_catalog, GmfCatalog};
use eqrisk::output::{export_results, NdjsonDirSink};
use eqrisk::vulnerability::VulnerabilityModel;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut config = RiskConfig::canonical();
    let mut output_dir_opt: Option<String> = None;
    let mut csv_path_opt: Option<String> = None;
    let mut quiet = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                i += 1;
                config.seed = args[i].parse().expect("--seed requires a u64");
            }
            "--sites" => {
                i += 1;
                config.num_sites = args[i].parse().expect("--sites requires a positive integer");
            }
            "--assets-per-site" => {
                i += 1;
                config.assets_per_site =
                    args[i].parse().expect("--assets-per-site requires a positive integer");
            }
            "--ses" => {
                i += 1;
                config.ses_per_logic_tree_path =
                    args[i].parse().expect("--ses requires a positive integer");
            }
            "--time" => {
                i += 1;
                config.investigation_time =
                    args[i].parse().expect("--time requires a number of years");
            }
            "--realizations" => {
                i += 1;
                config.num_realizations =
                    args[i].parse().expect("--realizations requires a positive integer");
            }
            "--tasks" => {
                i += 1;
                config.concurrent_tasks =
                    args[i].parse().expect("--tasks requires an integer (0 = serial)");
            }
            "--correlated" => config.correlation = AssetCorrelation::Perfect,
            "--output-dir" => {
                i += 1;
                output_dir_opt = Some(args[i].clone());
            }
            "--csv" => {
                i += 1;
                csv_path_opt = Some(args[i].clone());
            }
            "--quiet" => quiet = true,
            _ => {}
        }
        i += 1;
    }

    let calculator = EventBasedCalculator::new(config).expect("invalid configuration");
    let config = calculator.config();

    let portfolio = synthetic_portfolio(config).expect("failed to build the portfolio");
    let model =
        VulnerabilityModel::from_config(&config.vulnerability).expect("invalid vulnerability model");
    let catalog = synthetic_catalog(config, portfolio.sites(), &model.imts());

    let results = calculator.run_with(&portfolio, &catalog).expect("calculation failed");

    if let Some(ref dir) = output_dir_opt {
        let mut sink = NdjsonDirSink::new(dir).expect("failed to open output directory");
        export_results(&results, &mut sink).expect("failed to export results");
        sink.flush().expect("failed to flush output files");
        if !quiet {
            let tables = if results.stats.is_some() { 7 } else { 5 };
            println!("{tables} tables → {dir}/");
        }
    }

    if let Some(ref csv_path) = csv_path_opt {
        write_event_csv(&results, &catalog, csv_path);
    }

    if !quiet {
        print_shape(&portfolio, &catalog);
        print_aggregates(&results);
        print_loss_maps(&results);
        print_statistics(&results);
    }
}

fn write_event_csv(results: &CalculationResults, catalog: &GmfCatalog, path: &str) {
    let file = File::create(path).unwrap_or_else(|e| panic!("failed to create {path}: {e}"));
    let mut w = BufWriter::new(file);
    writeln!(w, "loss_type,rlz,event,ses,magnitude,loss").expect("write");
    let outputs = &results.outputs;
    for &loss_type in &outputs.loss_types {
        for rlz in 0..outputs.realizations.len() {
            for (event, loss) in outputs.event_loss_table(loss_type, rlz) {
                let meta = &catalog.events[event.0 as usize];
                writeln!(
                    w,
                    "{},{},{},{},{:.2},{:.2}",
                    loss_type, rlz, event.0, meta.ses, meta.magnitude, loss,
                )
                .expect("write");
            }
        }
    }
}

fn print_shape(portfolio: &AssetCollection, catalog: &GmfCatalog) {
    println!("\n=== Portfolio and catalog ===");
    println!(
        "  {} assets on {} sites ({} taxonomies), total value {:.0}",
        portfolio.len(),
        portfolio.sites().len(),
        portfolio.taxonomies().len(),
        portfolio
            .iter()
            .filter_map(|a| a.value(eqrisk::types::LossType::Structural))
            .sum::<f64>(),
    );
    println!(
        "  {} events over {:.0} years of event sets, {} realizations",
        catalog.num_events(),
        catalog.tses(),
        catalog.sets.len(),
    );
}

fn print_aggregates(results: &CalculationResults) {
    let outputs = &results.outputs;

    println!("\n=== Aggregate losses ===");
    println!(
        "{:>14} | {:>4} | {:>7} | {:>14} | {:>12} | {:>12} | {:>14}",
        "Loss type", "Rlz", "Events", "Total", "AvgAnnual", "StdDev", "MaxEvent"
    );
    println!("{}", "-".repeat(96));

    for (column, &loss_type) in outputs.loss_types.iter().enumerate() {
        for rlz in 0..outputs.realizations.len() {
            let table = outputs.event_loss_table(loss_type, rlz);
            let total: f64 = table.iter().map(|(_, loss)| loss).sum();
            let max_event = table.iter().map(|(_, loss)| *loss).fold(0.0, f64::max);
            let nonzero = table.iter().filter(|(_, loss)| *loss > 0.0).count();
            let agg = outputs.agg_curves.get(column, rlz);
            println!(
                "{:>14} | {:>4} | {:>7} | {:>14.0} | {:>12.2} | {:>12.2} | {:>14.0}",
                loss_type.to_string(),
                rlz,
                nonzero,
                total,
                agg.curve.average_loss,
                agg.stddev,
                max_event,
            );
        }
    }
}

fn print_loss_maps(results: &CalculationResults) {
    let outputs = &results.outputs;
    if outputs.conditional_poes.is_empty() {
        return;
    }

    println!("\n=== Loss maps (portfolio totals) ===");
    println!(
        "{:>14} | {:>4} | {:>6} | {:>14}",
        "Loss type", "Rlz", "PoE", "Loss"
    );
    println!("{}", "-".repeat(48));

    for (column, &loss_type) in outputs.loss_types.iter().enumerate() {
        for rlz in 0..outputs.realizations.len() {
            let map = outputs.loss_maps.get(column, rlz);
            for (poe, losses) in outputs.conditional_poes.iter().zip(map) {
                let total: f64 = losses.iter().sum();
                println!(
                    "{:>14} | {:>4} | {:>6.3} | {:>14.0}",
                    loss_type.to_string(),
                    rlz,
                    poe,
                    total,
                );
            }
        }
    }
}

fn print_statistics(results: &CalculationResults) {
    let Some(stats) = &results.stats else {
        eprintln!("Warning: statistics require >= 2 realizations");
        return;
    };

    println!("\n=== Across-realization statistics (portfolio average annual loss) ===");
    print!("{:>14} | {:>12}", "Loss type", "mean");
    for q in &stats.quantiles {
        print!(" | {:>11}", format!("q{q:.2}"));
    }
    println!();
    println!("{}", "-".repeat(31 + 14 * stats.quantiles.len()));

    for per_type in &stats.per_loss_type {
        let mean_total: f64 = per_type
            .mean_curves
            .iter()
            .flatten()
            .map(|curve| curve.average_loss)
            .sum();
        print!("{:>14} | {:>12.2}", per_type.loss_type.to_string(), mean_total);
        for curves in &per_type.quantile_curves {
            let total: f64 = curves.iter().flatten().map(|curve| curve.average_loss).sum();
            print!(" | {:>11.2}", total);
        }
        println!();
    }
}
