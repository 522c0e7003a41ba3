// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! End-to-end runs of the steel model: calibration, the benchmark
//! replication check, and the policy scenarios.

use float_cmp::approx_eq;

use cge_engine::expr::scalar;
use cge_engine::models::Pipeline;
use cge_engine::models::steel::{self, SteelData};
use cge_engine::table::Table;
use cge_engine::{
    ErrorCode, ErrorKind, Isolation, McpBuilder, MicroLpSolver, NewtonSolver, Scenario,
};

fn pipeline() -> Pipeline {
    let (pipeline, _) = steel::build(&SteelData::example(), &MicroLpSolver::new()).unwrap();
    pipeline
}

fn level(pipeline: &Pipeline, var: &str, key: &[&str]) -> f64 {
    let key: Vec<String> = key.iter().map(|k| (*k).to_owned()).collect();
    pipeline.data.variable(var).unwrap().level(&key)
}

#[test]
fn calibrated_price_is_the_demand_dual() {
    let (pipeline, report) = steel::build(&SteelData::example(), &MicroLpSolver::new()).unwrap();
    assert_eq!(
        vec!["pbar", "ybar", "rbar", "hbar", "ebar"],
        report.parameters
    );
    assert!(approx_eq!(f64, 55.0 * 112.0 + 45.0 * 100.0, report.lp.objective, epsilon = 1e-6));

    let data = &pipeline.data;
    let pbar = data.scalar("pbar").unwrap();
    let dual = data.equation("demand").unwrap().state(&[]).marginal;
    assert!(approx_eq!(f64, 112.0, pbar, epsilon = 1e-6));
    assert!(approx_eq!(f64, -dual, pbar, epsilon = 1e-9));

    // p2 runs at capacity and earns the rent; p1 sets the price
    assert!(approx_eq!(f64, 12.0, data.param_value("rbar", &["p2"]).unwrap(), epsilon = 1e-6));
    assert!(approx_eq!(f64, 0.0, data.param_value("rbar", &["p1"]).unwrap(), epsilon = 1e-6));
    assert!(approx_eq!(f64, 45.0, data.param_value("ybar", &["p2"]).unwrap(), epsilon = 1e-6));
    assert!(approx_eq!(f64, 55.0, data.param_value("ybar", &["p1"]).unwrap(), epsilon = 1e-6));
    assert_eq!(0.0, data.param_value("ybar", &["p3"]).unwrap());
}

#[test]
fn benchmark_replicates() {
    let mut pipeline = pipeline();
    let before = pipeline.mcp.current_point(&pipeline.data).unwrap();

    let result = pipeline.replication_check(&NewtonSolver::new(), 1e-6).unwrap();
    assert_eq!(0, result.iterations);
    assert!(result.residual <= 1e-6);

    let after = pipeline.mcp.current_point(&pipeline.data).unwrap();
    assert_eq!(before, after);
    assert_eq!(112.0, level(&pipeline, "P", &[]).round());
    assert_eq!(0.0, level(&pipeline, "W", &[]));

    // the paired equations hold at the benchmark
    let mkt_y = pipeline.data.equation("mkt_y").unwrap().state(&[]);
    assert!(mkt_y.level.abs() < 1e-6);
    assert!(approx_eq!(f64, 112.0, mkt_y.marginal, epsilon = 1e-6));
}

#[test]
fn scenario_batch() {
    let mut pipeline = pipeline();
    let report = pipeline
        .run(&NewtonSolver::new(), Isolation::Cumulative)
        .unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(3, report.records.len());

    let reference = report.record("Reference").unwrap();
    assert_eq!(0, reference.iterations);
    assert!(approx_eq!(f64, 100.0, reference.total_quantity, epsilon = 1e-6));
    assert!(approx_eq!(f64, 158.25, reference.total_externality, epsilon = 1e-6));
    assert!(approx_eq!(f64, 112.0, reference.price("steel_price").unwrap(), epsilon = 1e-6));
    assert_eq!(Some(0.0), reference.price("carbon_price"));

    let cap = report.record("Cap (-20%)").unwrap();
    assert!(cap.price("carbon_price").unwrap() > 0.0);
    assert!(cap.total_quantity < reference.total_quantity);
    assert!(cap.price("steel_price").unwrap() > 112.0);
    // the cap binds
    assert!(approx_eq!(f64, 0.8 * 158.25, cap.total_externality, epsilon = 1e-4));

    let tax = report.record("Tax ($10/tCO2)").unwrap();
    assert_eq!(Some(10.0), tax.price("carbon_price"));
    assert!(tax.total_quantity < reference.total_quantity);

    // one level record per plant per scenario
    assert_eq!(9, report.levels.len());
    assert!(
        report
            .levels
            .iter()
            .all(|l| l.variable == "Y" && l.value >= 0.0)
    );
}

#[test]
fn mutations_carry_into_later_scenarios() {
    let mut pipeline = pipeline();
    pipeline.scenarios.truncate(2);
    pipeline.scenarios.push(Scenario::new("Probe"));
    pipeline.schema = pipeline.schema.clone().price("chi", scalar("chi"));

    let report = pipeline
        .run(&NewtonSolver::new(), Isolation::Cumulative)
        .unwrap();
    let probe = report.record("Probe").unwrap();
    assert_eq!(Some(0.8), probe.price("chi"));
    assert_eq!(0, probe.iterations);
    // the carbon price stays free after the cap scenario
    let w = pipeline.data.variable("W").unwrap().state(&[]);
    assert!(!w.fixed);
    assert!(w.level > 0.0);
}

#[test]
fn restore_isolation_rolls_back() {
    let mut pipeline = pipeline();
    let report = pipeline.run(&NewtonSolver::new(), Isolation::Restore).unwrap();
    assert_eq!(3, report.records.len());
    assert_eq!(0.0, pipeline.data.scalar("chi").unwrap());
    let w = pipeline.data.variable("W").unwrap().state(&[]);
    assert!(w.fixed);
    assert_eq!(0.0, w.level);
}

#[test]
fn isolated_runs_match_restore() {
    let mut pipeline = pipeline();
    let isolated = pipeline.run_isolated(&NewtonSolver::new()).unwrap();
    let names: Vec<_> = isolated.records.iter().map(|r| r.scenario.clone()).collect();
    assert_eq!(vec!["Reference", "Cap (-20%)", "Tax ($10/tCO2)"], names);

    let restored = pipeline.run(&NewtonSolver::new(), Isolation::Restore).unwrap();
    for (a, b) in isolated.records.iter().zip(restored.records.iter()) {
        assert_eq!(a.scenario, b.scenario);
        assert!(approx_eq!(f64, a.total_quantity, b.total_quantity, epsilon = 1e-5));
        assert!(approx_eq!(f64, a.total_externality, b.total_externality, epsilon = 1e-5));
    }
}

#[test]
fn demand_above_capacity_fails_calibration() {
    let mut input = SteelData::example();
    input.scalars = Table::new("scalars", &["name", "value"])
        .row(&["dbar", "200"])
        .row(&["epsilon", "-0.3"]);
    let err = steel::build(&input, &MicroLpSolver::new()).unwrap_err();
    assert_eq!(ErrorKind::Calibration, err.kind);
    assert_eq!(ErrorCode::Infeasible, err.code);
}

#[test]
fn unmatched_equation_is_rejected_before_solve() {
    let data = steel::define(&SteelData::example()).unwrap();
    let err = McpBuilder::new(
        &data,
        "steel",
        &["zpf_y", "mkt_y", "mkt_f", "capacity", "mkt_co2"],
    )
    .pair("zpf_y", "Y")
    .pair("mkt_y", "P")
    .pair("mkt_f", "V")
    .pair("capacity", "R")
    .build()
    .unwrap_err();
    assert_eq!(ErrorKind::ModelDefinition, err.kind);
    assert_eq!(ErrorCode::UnmatchedEquation, err.code);
}

#[cfg(feature = "file_io")]
#[test]
fn loads_steel_tables_from_csv() {
    use std::fs;

    let dir = tempfile::tempdir().unwrap();
    let files = [
        ("plants", "i\np1\np2\np3\n"),
        ("factors", "f\ncoal\nelec\n"),
        ("techs", "t\nbof\neaf\ndri\n"),
        ("plant_tech", "i,t\np1,bof\np2,eaf\np3,dri\n"),
        (
            "abar",
            concat!(
                "t,f,value\nbof,coal,1.0\nbof,elec,0.2\neaf,coal,0.1\n",
                "eaf,elec,1.5\ndri,coal,0.6\ndri,elec,1.2\n",
            ),
        ),
        ("vbar", "f,value\ncoal,100\nelec,60\n"),
        ("rho", "f,value\ncoal,1\nelec,1\n"),
        ("kappa", "f,value\ncoal,2\nelec,0.5\n"),
        ("tau", "i,f,value\n"),
        ("ylim", "i,value\np1,60\np2,45\np3,50\n"),
        ("scalars", "name,value\ndbar,100\nepsilon,-0.3\n"),
    ];
    for (name, contents) in files {
        fs::write(dir.path().join(format!("{name}.csv")), contents).unwrap();
    }

    let input = SteelData::load_dir(dir.path()).unwrap();
    let (loaded, _) = steel::build(&input, &MicroLpSolver::new()).unwrap();
    let expected = pipeline();
    assert_eq!(
        expected.data.scalar("pbar").unwrap(),
        loaded.data.scalar("pbar").unwrap()
    );
    assert_eq!(
        expected.data.param_value("ebar", &["coal"]).unwrap(),
        loaded.data.param_value("ebar", &["coal"]).unwrap()
    );

    fs::remove_file(dir.path().join("kappa.csv")).unwrap();
    let err = SteelData::load_dir(dir.path()).unwrap_err();
    assert_eq!(ErrorCode::BadTable, err.code);
}
