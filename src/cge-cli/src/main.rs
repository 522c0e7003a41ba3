// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cge_engine::models::Pipeline;
use cge_engine::models::steel::{self, SteelData};
use cge_engine::models::trade::{self, TradeData};
use cge_engine::table::{write_levels_csv, write_records_csv};
use cge_engine::{Isolation, MicroLpSolver, NewtonSolver};

/// Calibrate an equilibrium model and run its policy scenarios.
#[derive(Parser, Debug)]
#[command(name = "cge", version)]
struct Cli {
    #[command(subcommand)]
    model: Model,

    /// Write the result table here instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Also write long-format variable levels
    #[arg(long, global = true)]
    levels: Option<PathBuf>,

    /// Iteration limit for every scenario that iterates
    #[arg(long, global = true)]
    iteration_limit: Option<usize>,

    /// Roll each scenario's mutations back once it has been collected
    #[arg(long, global = true, conflicts_with = "isolated")]
    restore: bool,

    /// Run each scenario on its own copy of the calibrated model
    #[arg(long, global = true)]
    isolated: bool,

    /// Replication tolerance for the benchmark check
    #[arg(long, global = true, default_value_t = 1e-6)]
    tolerance: f64,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Model {
    /// Steel industry with an emissions cap and a carbon tax
    Steel {
        /// Directory of CSV tables; the built-in example data otherwise
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Two-region trade with a transport cost shock
    Trade,
}

fn build(model: &Model) -> Result<Pipeline> {
    match model {
        Model::Steel { data } => {
            let input = match data {
                Some(dir) => SteelData::load_dir(dir)
                    .with_context(|| format!("loading steel tables from {}", dir.display()))?,
                None => SteelData::example(),
            };
            let (pipeline, report) =
                steel::build(&input, &MicroLpSolver::new()).context("calibrating steel model")?;
            tracing::info!(
                component = "cli",
                operation = "calibrate",
                status = "success",
                objective = report.lp.objective,
                parameters = ?report.parameters,
                "Calibrated"
            );
            Ok(pipeline)
        }
        Model::Trade => trade::build(&TradeData::example()).context("building trade model"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut pipeline = build(&cli.model)?;
    if let Some(limit) = cli.iteration_limit {
        pipeline.set_iteration_limit(limit);
    }

    let solver = NewtonSolver::new();
    pipeline
        .replication_check(&solver, cli.tolerance)
        .context("benchmark replication check")?;

    let report = if cli.isolated {
        pipeline.run_isolated(&solver)?
    } else if cli.restore {
        pipeline.run(&solver, Isolation::Restore)?
    } else {
        pipeline.run(&solver, Isolation::Cumulative)?
    };
    for failure in report.failures.iter() {
        eprintln!("skipped {}: {}", failure.scenario, failure.reason);
    }

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_records_csv(BufWriter::new(file), &pipeline.schema, &report)?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_records_csv(&mut out, &pipeline.schema, &report)?;
            out.flush()?;
        }
    }
    if let Some(path) = &cli.levels {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write_levels_csv(BufWriter::new(file), &report)?;
    }

    Ok(())
}
