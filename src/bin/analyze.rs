//! Equilibrium analysis binary.
//!
//! Usage:
//!   cargo run --release --bin analyze -- [OPTIONS]
//!
//! Options:
//!   --config <FILE>        Analysis configuration JSON file (optional)
//!   --trials <N>           Monte-Carlo trials (overrides the config)
//!   --generations <N>      Evolutionary generations (overrides the config)
//!   --seed <N>             Random seed (optional)
//!   --output <FILE>        Output file (default: analysis.json)
//!
//! Set `RUST_LOG=info` (or `debug`) for solver progress.

use std::env;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use community_betting_solver::analysis::{
    analyze_parameter_set, simulate, AnalysisConfig, AnalysisReport,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let mut config_file: Option<String> = None;
    let mut trials: Option<usize> = None;
    let mut generations: Option<usize> = None;
    let mut seed: Option<u64> = None;
    let mut output_file = "analysis.json".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_file = Some(args[i].clone());
                }
            }
            "--trials" | "-t" => {
                i += 1;
                if i < args.len() {
                    trials = args[i].parse().ok();
                }
            }
            "--generations" | "-g" => {
                i += 1;
                if i < args.len() {
                    generations = args[i].parse().ok();
                }
            }
            "--seed" | "-s" => {
                i += 1;
                if i < args.len() {
                    seed = args[i].parse().ok();
                }
            }
            "--output" | "-o" => {
                i += 1;
                if i < args.len() {
                    output_file = args[i].clone();
                }
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                return;
            }
        }
        i += 1;
    }

    println!("=================================================");
    println!("  Community Betting Equilibrium Analysis");
    println!("=================================================");
    println!();

    // Load or create configuration
    let mut config = if let Some(path) = &config_file {
        println!("Loading configuration from: {}", path);
        match AnalysisConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                return;
            }
        }
    } else {
        println!("Using default configuration");
        AnalysisConfig::default()
    };

    if let Some(n) = trials {
        config.simulation_trials = n;
    }
    if let Some(n) = generations {
        config.generations = n;
    }
    if let Some(s) = seed {
        config = config.with_seed(s);
    }

    println!("Parameter sets: {}", config.parameter_sets.len());
    println!("Simulation trials: {}", config.simulation_trials);
    println!("Generations: {}", config.generations);
    if let Some(s) = seed {
        println!("Seed: {}", s);
    }
    println!("Output: {}", output_file);
    println!();

    let start_time = Instant::now();

    // General simulation
    println!("Running general simulation...");
    let simulation = match simulate(&config, seed) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            return;
        }
    };
    println!(
        "  Layer 1 profit: mean {:.2}, variance {:.2}",
        simulation.layer1.mean, simulation.layer1.variance
    );
    println!(
        "  Layer 2 profit: mean {:.2}, variance {:.2}",
        simulation.layer2.mean, simulation.layer2.variance
    );
    println!("  Average community score: {:.2}", simulation.average_community_score);
    println!("  Average reputation: {:.3}", simulation.average_reputation);
    println!();

    // Per parameter set analysis
    let progress = ProgressBar::new(config.parameter_sets.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut reports = Vec::with_capacity(config.parameter_sets.len());
    for (k, set) in config.parameter_sets.iter().enumerate() {
        progress.set_message(set.name.clone());
        let set_seed = seed.map(|s| s.wrapping_add(k as u64 + 1));
        match analyze_parameter_set(set, &config, set_seed) {
            Ok(report) => reports.push(report),
            Err(e) => {
                progress.println(format!("Parameter set '{}' failed: {}", set.name, e));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    for report in &reports {
        println!("Parameter set: {} (time constraint {})", report.name, report.time_constraint);
        println!(
            "  Nash: {:?} (success: {}, verified: {})",
            rounded(&report.nash.profile),
            report.nash.success,
            report.nash.verified
        );
        println!(
            "  Bayesian: {:?} (success: {})",
            rounded(report.bayesian.strategies.as_slice()),
            report.bayesian.success
        );
        println!(
            "  Community Bayesian: {:?} (success: {})",
            rounded(report.community_bayesian.strategies.as_slice()),
            report.community_bayesian.success
        );
        println!(
            "  Round: layer 1 {:.2}, layer 2 {:.2}, community score {:.2}",
            report.layer1_profit, report.layer2_profit, report.community_score
        );
        if let Some(distance) = report.evolution.final_distance() {
            println!(
                "  Evolution: final distance to Nash {:.3} ({} degenerate generations)",
                distance,
                report.evolution.degenerate_generations()
            );
        }
        println!();
    }

    let analysis = AnalysisReport::new(simulation, reports);
    println!("Statistical analysis:");
    println!(
        "  Layer 1 profits: mean = {:.2}, variance = {:.2}",
        analysis.layer1_profits.mean, analysis.layer1_profits.variance
    );
    println!(
        "  Layer 2 profits: mean = {:.2}, variance = {:.2}",
        analysis.layer2_profits.mean, analysis.layer2_profits.variance
    );
    println!("Total time: {:.2}s", start_time.elapsed().as_secs_f64());

    match analysis.save_json(&output_file) {
        Ok(()) => println!("Report written to {}", output_file),
        Err(e) => eprintln!("Error writing report: {}", e),
    }
}

fn rounded(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| (v * 100.0).round() / 100.0).collect()
}

fn print_help() {
    println!("Community Betting Equilibrium Analysis");
    println!();
    println!("Usage: analyze [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>      Analysis configuration JSON file");
    println!("  -t, --trials <N>         Monte-Carlo trials");
    println!("  -g, --generations <N>    Evolutionary generations");
    println!("  -s, --seed <N>           Random seed");
    println!("  -o, --output <FILE>      Output file (default: analysis.json)");
    println!("  -h, --help               Show this help");
}
