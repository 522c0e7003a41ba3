// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Two-region trade in a single good.
//!
//! Each region's final demand is met by a CES-style composite of imports
//! from every region (including itself); route prices are the producer
//! price plus a transport cost.  The benchmark needs no LP: reference
//! prices, demand and value shares follow from the trade flow matrix.

use crate::common::Result;
use crate::datamodel::{DataModel, Selector, VarKind};
use crate::expr::*;
use crate::mcp::{ComplementarityModel, McpBuilder, SolveOptions};
use crate::models::Pipeline;
use crate::scenario::{Mutation, ResultSchema, Scenario};

#[derive(Clone, PartialEq, Debug)]
pub struct TradeData {
    pub regions: Vec<String>,
    /// `(from, to, kt)`
    pub flows: Vec<(String, String, f64)>,
    /// `(from, to, USD/t)`
    pub transport_cost: Vec<(String, String, f64)>,
    /// `(region, USD/t)`
    pub producer_price: Vec<(String, f64)>,
    pub elasticity: f64,
}

impl TradeData {
    pub fn example() -> Self {
        let route = |from: &str, to: &str, v: f64| (from.to_owned(), to.to_owned(), v);
        TradeData {
            regions: vec!["A".to_owned(), "B".to_owned()],
            flows: vec![
                route("A", "A", 800.0),
                route("A", "B", 200.0),
                route("B", "A", 400.0),
                route("B", "B", 1800.0),
            ],
            transport_cost: vec![
                route("A", "A", 100.0),
                route("A", "B", 60.0),
                route("B", "A", 90.0),
                route("B", "B", 0.0),
            ],
            producer_price: vec![("A".to_owned(), 190.0), ("B".to_owned(), 220.0)],
            elasticity: -1.0,
        }
    }
}

fn routes(records: &[(String, String, f64)]) -> Vec<([&str; 2], f64)> {
    records
        .iter()
        .map(|(from, to, v)| ([from.as_str(), to.as_str()], *v))
        .collect()
}

/// Unit cost of the import composite in region `to`, relative to the
/// benchmark.
fn composite_cost(to: &str) -> Expr {
    sum(
        &["rrr"],
        param("sha_PM", &["rrr", to])
            .times(var("PM", &["rrr", to]).divide(param("ref_PM", &["rrr", to]))),
    )
}

pub fn define(input: &TradeData) -> Result<DataModel> {
    let mut data = DataModel::new();
    data.define_set("r", &input.regions)?;
    data.define_alias("rr", "r")?;
    data.define_alias("rrr", "r")?;

    data.define_parameter("ref_YM", &["r", "rr"], &routes(&input.flows))?;
    data.define_parameter("tcost", &["r", "rr"], &routes(&input.transport_cost))?;
    let prices: Vec<([&str; 1], f64)> = input
        .producer_price
        .iter()
        .map(|(r, v)| ([r.as_str()], *v))
        .collect();
    data.define_parameter("ref_P", &["r"], &prices)?;
    data.define_scalar("epsilon", input.elasticity)?;

    let none1: &[([&str; 1], f64)] = &[];
    let none2: &[([&str; 2], f64)] = &[];
    data.define_parameter("ref_PM", &["r", "rr"], none2)?;
    data.define_parameter("sha_PM", &["r", "rr"], none2)?;
    data.define_parameter("ref_YA", &["r"], none1)?;
    data.define_parameter("ref_PA", &["r"], none1)?;
    data.define_parameter("ref_CM", &["r"], none1)?;

    data.assign_parameter(
        "ref_PM",
        &["r", "rr"],
        &param("ref_P", &["r"]).plus(param("tcost", &["r", "rr"])),
    )?;
    data.assign_parameter("ref_YA", &["r"], &sum(&["rr"], param("ref_YM", &["rr", "r"])))?;
    let import_cost = sum(
        &["rr"],
        param("ref_YM", &["rr", "r"]).times(param("ref_PM", &["rr", "r"])),
    );
    data.assign_parameter("ref_CM", &["r"], &import_cost)?;
    data.assign_parameter(
        "ref_PA",
        &["r"],
        &param("ref_CM", &["r"]).divide(param("ref_YA", &["r"])),
    )?;
    data.assign_parameter(
        "sha_PM",
        &["rr", "r"],
        &param("ref_YM", &["rr", "r"])
            .times(param("ref_PM", &["rr", "r"]))
            .divide(param("ref_CM", &["r"])),
    )?;

    data.define_variable("YM", &["r", "rr"], VarKind::Positive)?;
    data.define_variable("PM", &["r", "rr"], VarKind::Positive)?;
    data.define_variable("YA", &["r"], VarKind::Positive)?;
    data.define_variable("PA", &["r"], VarKind::Positive)?;

    data.define_equation(
        "zpf_ym",
        &["r", "rr"],
        var("YM", &["r", "rr"]).geq(param("ref_YM", &["r", "rr"]).times(
            num(1.0).plus(scalar("epsilon").times(composite_cost("rr").minus(num(1.0)))),
        )),
    )?;
    data.define_equation(
        "mkt_pm",
        &["r", "rr"],
        param("ref_P", &["r"])
            .plus(param("tcost", &["r", "rr"]))
            .geq(var("PM", &["r", "rr"])),
    )?;
    data.define_equation(
        "zpf_ya",
        &["r"],
        var("YA", &["r"]).geq(param("ref_YA", &["r"]).times(
            num(1.0).plus(scalar("epsilon").times(
                var("PA", &["r"]).divide(param("ref_PA", &["r"])).minus(num(1.0)),
            )),
        )),
    )?;
    data.define_equation(
        "mkt_pa",
        &["r"],
        param("ref_PA", &["r"])
            .times(composite_cost("r"))
            .geq(var("PA", &["r"])),
    )?;
    Ok(data)
}

pub fn complementarity(data: &DataModel) -> Result<ComplementarityModel> {
    McpBuilder::new(data, "trade", &["zpf_ym", "mkt_pm", "zpf_ya", "mkt_pa"])
        .pair("zpf_ym", "YM")
        .pair("mkt_pm", "PM")
        .pair("zpf_ya", "YA")
        .pair("mkt_pa", "PA")
        .build()
}

pub fn start_at_benchmark(data: &mut DataModel) -> Result<()> {
    data.assign_level("YM", &["r", "rr"], &param("ref_YM", &["r", "rr"]))?;
    data.assign_level("PM", &["r", "rr"], &param("ref_PM", &["r", "rr"]))?;
    data.assign_level("PA", &["r"], &param("ref_PA", &["r"]))?;
    data.assign_level("YA", &["r"], &param("ref_YA", &["r"]))
}

/// The benchmark, then twice the transport cost from B to A.
pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("Benchmark").options(SolveOptions::evaluate_only()),
        Scenario::new("Double_TC_BA")
            .with(Mutation::scale("tcost", Selector::key(&["B", "A"]), 2.0))
            .options(SolveOptions::with_iteration_limit(100)),
    ]
}

/// Total consumption and total transport cost, with the final price of
/// every region and the import price of every route.
pub fn schema(data: &DataModel) -> Result<ResultSchema> {
    let mut schema = ResultSchema::new(
        sum(&["r"], var("YA", &["r"])),
        sum(
            &["r", "rr"],
            param("tcost", &["r", "rr"]).times(var("YM", &["r", "rr"])),
        ),
    );
    let regions: Vec<String> = data.set("r")?.labels().cloned().collect();
    for to in regions.iter() {
        schema = schema.price(&format!("PA_{to}"), var_at("PA", vec![el(to)]));
    }
    for from in regions.iter() {
        for to in regions.iter() {
            schema = schema.price(
                &format!("PM_{from}_{to}"),
                var_at("PM", vec![el(from), el(to)]),
            );
        }
    }
    Ok(schema.report_levels("YM").report_levels("PM"))
}

pub fn build(input: &TradeData) -> Result<Pipeline> {
    let mut data = define(input)?;
    let mcp = complementarity(&data)?;
    start_at_benchmark(&mut data)?;
    let schema = schema(&data)?;
    Ok(Pipeline {
        name: "trade".to_owned(),
        data,
        mcp,
        scenarios: scenarios(),
        schema,
    })
}
