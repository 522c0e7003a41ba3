// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Partial-equilibrium model of a steel industry.
//!
//! Plants run exactly one technology each; technologies use factors
//! (coal, electricity, ...) in fixed proportions.  A least-cost dispatch LP
//! recovers the benchmark steel price and per-plant capacity rents, and the
//! complementarity model then adds price-responsive demand, upward-sloping
//! factor supply and an optional emissions cap.

use crate::calibrate::{Backfill, Calibration, CalibrationReport, LpModel};
use crate::common::Result;
use crate::datamodel::{DataModel, Selector, VarKind};
use crate::expr::*;
use crate::mcp::{ComplementarityModel, McpBuilder, SolveOptions};
use crate::models::Pipeline;
use crate::scenario::{Mutation, ResultSchema, Scenario};
use crate::solver::{LinearProgramSolver, Objective};
use crate::table::Table;
use crate::data_err;

/// Input tables.  Set tables carry one column named after the set; the
/// parameter tables carry their domain columns and a `value` column.
#[derive(Clone, PartialEq, Debug)]
pub struct SteelData {
    /// `i`
    pub plants: Table,
    /// `f`
    pub factors: Table,
    /// `t`
    pub techs: Table,
    /// `i,t`: the technology each plant runs
    pub plant_tech: Table,
    /// `t,f,value`: factor use per tonne
    pub abar: Table,
    /// `f,value`: benchmark factor prices
    pub vbar: Table,
    /// `f,value`: factor supply elasticities
    pub rho: Table,
    /// `f,value`: emissions per unit of factor
    pub kappa: Table,
    /// `i,f,value`: plant-specific factor surcharges
    pub tau: Table,
    /// `i,value`: plant capacities
    pub ylim: Table,
    /// `name,value`: `dbar` and `epsilon`
    pub scalars: Table,
}

impl SteelData {
    /// Three plants, one per technology, with the EAF plant short of
    /// capacity at the benchmark.
    pub fn example() -> Self {
        SteelData {
            plants: Table::new("plants", &["i"]).row(&["p1"]).row(&["p2"]).row(&["p3"]),
            factors: Table::new("factors", &["f"]).row(&["coal"]).row(&["elec"]),
            techs: Table::new("techs", &["t"])
                .row(&["bof"])
                .row(&["eaf"])
                .row(&["dri"]),
            plant_tech: Table::new("plant_tech", &["i", "t"])
                .row(&["p1", "bof"])
                .row(&["p2", "eaf"])
                .row(&["p3", "dri"]),
            abar: Table::new("abar", &["t", "f", "value"])
                .row(&["bof", "coal", "1.0"])
                .row(&["bof", "elec", "0.2"])
                .row(&["eaf", "coal", "0.1"])
                .row(&["eaf", "elec", "1.5"])
                .row(&["dri", "coal", "0.6"])
                .row(&["dri", "elec", "1.2"]),
            vbar: Table::new("vbar", &["f", "value"])
                .row(&["coal", "100"])
                .row(&["elec", "60"]),
            rho: Table::new("rho", &["f", "value"])
                .row(&["coal", "1.0"])
                .row(&["elec", "1.0"]),
            kappa: Table::new("kappa", &["f", "value"])
                .row(&["coal", "2.0"])
                .row(&["elec", "0.5"]),
            tau: Table::new("tau", &["i", "f", "value"]),
            ylim: Table::new("ylim", &["i", "value"])
                .row(&["p1", "60"])
                .row(&["p2", "45"])
                .row(&["p3", "50"]),
            scalars: Table::new("scalars", &["name", "value"])
                .row(&["dbar", "100"])
                .row(&["epsilon", "-0.3"]),
        }
    }

    /// Read every table from `<dir>/<table>.csv`.
    #[cfg(feature = "file_io")]
    pub fn load_dir(dir: &std::path::Path) -> Result<Self> {
        use crate::table::read_table_csv;

        let read = |name: &str| read_table_csv(&dir.join(format!("{name}.csv")));
        Ok(SteelData {
            plants: read("plants")?,
            factors: read("factors")?,
            techs: read("techs")?,
            plant_tech: read("plant_tech")?,
            abar: read("abar")?,
            vbar: read("vbar")?,
            rho: read("rho")?,
            kappa: read("kappa")?,
            tau: read("tau")?,
            ylim: read("ylim")?,
            scalars: read("scalars")?,
        })
    }

    fn scalar(&self, name: &str) -> Result<f64> {
        let names = self.scalars.column("name")?;
        let values = self.scalars.column("value")?;
        for row in self.scalars.rows.iter() {
            if row.get(names).map(|n| n.trim()) == Some(name) {
                if let Some(Ok(v)) = row.get(values).map(|v| v.trim().parse::<f64>()) {
                    return Ok(v);
                }
                return data_err!(BadTable, format!("scalars: bad value for '{name}'"));
            }
        }
        data_err!(BadTable, format!("scalars: no value for '{name}'"))
    }
}

/// Factor `f` used per tonne at plant `i`, through the plant's technology.
fn unit_use() -> Expr {
    sum_where(&["t"], member("it", &["i", "t"]), param("abar", &["t", "f"]))
}

/// Emissions per tonne at plant `i`, summed over factors.
fn unit_emissions() -> Expr {
    sum(&["f"], unit_use().times(param("kappa", &["f"])))
}

/// Declare the sets, data and symbols of the model and its equations.
/// Benchmark parameters start empty until [`calibration`] fills them.
pub fn define(input: &SteelData) -> Result<DataModel> {
    let mut data = DataModel::new();
    input.plants.load_set(&mut data, "i", "i")?;
    input.factors.load_set(&mut data, "f", "f")?;
    input.techs.load_set(&mut data, "t", "t")?;
    input.plant_tech.load_relation(&mut data, "it", &["i", "t"], &["i", "t"])?;

    input.abar.load_parameter(&mut data, "abar", &["t", "f"], &["t", "f"], "value")?;
    input.vbar.load_parameter(&mut data, "vbar", &["f"], &["f"], "value")?;
    input.rho.load_parameter(&mut data, "rho", &["f"], &["f"], "value")?;
    input.kappa.load_parameter(&mut data, "kappa", &["f"], &["f"], "value")?;
    input.tau.load_parameter(&mut data, "tau", &["i", "f"], &["i", "f"], "value")?;
    input.ylim.load_parameter(&mut data, "ylim", &["i"], &["i"], "value")?;
    data.define_scalar("dbar", input.scalar("dbar")?)?;
    data.define_scalar("epsilon", input.scalar("epsilon")?)?;
    data.define_scalar("chi", 0.0)?;

    let none: &[([&str; 1], f64)] = &[];
    data.define_scalar("pbar", 0.0)?;
    data.define_parameter("ybar", &["i"], none)?;
    data.define_parameter("rbar", &["i"], none)?;
    data.define_parameter("hbar", &["f"], none)?;
    data.define_parameter("ebar", &["f"], none)?;

    data.define_variable("Y", &["i"], VarKind::Positive)?;
    data.define_variable("P", &[], VarKind::Positive)?;
    data.define_variable("V", &["f"], VarKind::Positive)?;
    data.define_variable("R", &["i"], VarKind::Positive)?;
    data.define_variable("W", &[], VarKind::Positive)?;

    // dispatch LP
    data.define_equation("demand", &[], sum(&["i"], var("Y", &["i"])).geq(scalar("dbar")))?;
    // shared by the LP and the complementarity model
    data.define_equation("capacity", &["i"], param("ylim", &["i"]).geq(var("Y", &["i"])))?;

    let unit_cost = sum(
        &["f"],
        unit_use().times(var("V", &["f"]).plus(param("tau", &["i", "f"]))),
    );
    let carbon_cost = sum(
        &["f"],
        var("W", &[]).times(param("kappa", &["f"])).times(unit_use()),
    );
    data.define_equation(
        "zpf_y",
        &["i"],
        unit_cost
            .plus(var("R", &["i"]))
            .plus(carbon_cost)
            .geq(var("P", &[])),
    )?;

    let demand = scalar("dbar").times(
        num(1.0).plus(
            scalar("epsilon").times(var("P", &[]).divide(scalar("pbar")).minus(num(1.0))),
        ),
    );
    data.define_equation("mkt_y", &[], sum(&["i"], var("Y", &["i"])).geq(demand))?;

    let supply = param("hbar", &["f"]).times(
        num(1.0).plus(
            param("rho", &["f"])
                .times(var("V", &["f"]).divide(param("vbar", &["f"])).minus(num(1.0))),
        ),
    );
    data.define_equation(
        "mkt_f",
        &["f"],
        supply.geq(sum(&["i"], unit_use().times(var("Y", &["i"])))),
    )?;

    data.define_equation(
        "mkt_co2",
        &[],
        scalar("chi")
            .times(sum(&["f"], param("ebar", &["f"])))
            .geq(sum(&["i"], unit_emissions().times(var("Y", &["i"])))),
    )?;

    Ok(data)
}

/// Least-cost dispatch against benchmark demand and plant capacity, and
/// the benchmark parameters derived from it.
pub fn calibration(data: &DataModel) -> Result<Calibration> {
    let objective = sum(
        &["i", "f"],
        unit_use()
            .times(param("vbar", &["f"]).plus(param("tau", &["i", "f"])))
            .times(var("Y", &["i"])),
    );
    let equations = ["demand", "capacity"];
    let lp = LpModel::new(data, "mincost", &equations, Objective::Minimize, objective)?;
    Ok(Calibration::new(lp)
        .backfill(Backfill::shadow_price("pbar", "demand"))
        .backfill(Backfill::level("ybar", "Y"))
        .backfill(Backfill::shadow_price("rbar", "capacity"))
        .backfill(Backfill::assign(
            "hbar",
            &["f"],
            sum(&["i"], unit_use().times(param("ybar", &["i"]))),
        ))
        .backfill(Backfill::assign(
            "ebar",
            &["f"],
            sum(
                &["i"],
                unit_use().times(param("kappa", &["f"])).times(param("ybar", &["i"])),
            ),
        )))
}

pub fn complementarity(data: &DataModel) -> Result<ComplementarityModel> {
    McpBuilder::new(
        data,
        "steel",
        &["zpf_y", "mkt_y", "mkt_f", "capacity", "mkt_co2"],
    )
    .pair("zpf_y", "Y")
    .pair("mkt_y", "P")
    .pair("mkt_f", "V")
    .pair("capacity", "R")
    .pair("mkt_co2", "W")
    .build()
}

/// Start every price and quantity at its benchmark value, with no carbon
/// price.
pub fn start_at_benchmark(data: &mut DataModel) -> Result<()> {
    data.assign_level("P", &[], &scalar("pbar"))?;
    data.assign_level("R", &["i"], &param("rbar", &["i"]))?;
    data.assign_level("Y", &["i"], &param("ybar", &["i"]))?;
    data.assign_level("V", &["f"], &param("vbar", &["f"]))?;
    data.fix("W", &Selector::scalar(), 0.0)
}

/// The benchmark, a 20% emissions cap, then a fixed carbon tax.  The tax
/// scenario lifts the cap the previous one imposed.
pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("Reference").options(SolveOptions::evaluate_only()),
        Scenario::new("Cap (-20%)")
            .with(Mutation::set_scalar("chi", 0.8))
            .with(Mutation::bounds("W", Selector::scalar(), 0.0, f64::INFINITY))
            .options(SolveOptions::with_iteration_limit(1000)),
        Scenario::new("Tax ($10/tCO2)")
            .with(Mutation::set_scalar("chi", 0.0))
            .with(Mutation::fix("W", Selector::scalar(), 10.0)),
    ]
}

/// Production, emissions, the steel price and the carbon price.
pub fn schema() -> ResultSchema {
    ResultSchema::new(
        sum(&["i"], var("Y", &["i"])),
        sum(&["i"], unit_emissions().times(var("Y", &["i"]))),
    )
    .price("steel_price", var("P", &[]))
    .price("carbon_price", var("W", &[]))
    .report_levels("Y")
}

/// Define, calibrate and start the model at its benchmark.
pub fn build(
    input: &SteelData,
    lp: &dyn LinearProgramSolver,
) -> Result<(Pipeline, CalibrationReport)> {
    let mut data = define(input)?;
    let report = calibration(&data)?.run(&mut data, lp)?;
    let mcp = complementarity(&data)?;
    start_at_benchmark(&mut data)?;
    Ok((
        Pipeline {
            name: "steel".to_owned(),
            data,
            mcp,
            scenarios: scenarios(),
            schema: schema(),
        },
        report,
    ))
}
