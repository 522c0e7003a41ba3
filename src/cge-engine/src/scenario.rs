// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Scenario batches: perturb the data model, re-solve the complementarity
//! model, and collect one result record per scenario.
//!
//! Scenarios run in order against the same data model, so each one sees
//! the mutations of the ones before it.  [`Isolation::Restore`] rolls each
//! scenario's mutated keys back after its results are collected, and
//! [`ScenarioRunner::run_isolated`] gives every scenario its own copy.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

use crate::common::{ErrorCode, Ident, Result};
use crate::datamodel::{DataModel, Selector, Snapshot};
use crate::expr::Expr;
use crate::mcp::{ComplementarityModel, SolveOptions};
use crate::solver::{ComplementaritySolver, SolveStatus};

#[derive(Clone, PartialEq, Debug)]
pub enum Mutation {
    SetParameter {
        parameter: Ident,
        selector: Selector,
        value: f64,
    },
    /// Multiply the selected keys by `factor`.
    ScaleParameter {
        parameter: Ident,
        selector: Selector,
        factor: f64,
    },
    FixVariable {
        variable: Ident,
        selector: Selector,
        value: f64,
    },
    /// Replace the bounds, releasing any fixed value.
    SetBounds {
        variable: Ident,
        selector: Selector,
        lower: f64,
        upper: f64,
    },
    SetLevel {
        variable: Ident,
        selector: Selector,
        level: f64,
    },
}

impl Mutation {
    pub fn set_scalar(parameter: &str, value: f64) -> Self {
        Mutation::SetParameter {
            parameter: parameter.to_owned(),
            selector: Selector::scalar(),
            value,
        }
    }

    pub fn scale(parameter: &str, selector: Selector, factor: f64) -> Self {
        Mutation::ScaleParameter {
            parameter: parameter.to_owned(),
            selector,
            factor,
        }
    }

    pub fn fix(variable: &str, selector: Selector, value: f64) -> Self {
        Mutation::FixVariable {
            variable: variable.to_owned(),
            selector,
            value,
        }
    }

    pub fn bounds(variable: &str, selector: Selector, lower: f64, upper: f64) -> Self {
        Mutation::SetBounds {
            variable: variable.to_owned(),
            selector,
            lower,
            upper,
        }
    }

    fn apply(&self, data: &mut DataModel) -> Result<()> {
        match self {
            Mutation::SetParameter {
                parameter,
                selector,
                value,
            } => data.set_parameter_at(parameter, selector, *value),
            Mutation::ScaleParameter {
                parameter,
                selector,
                factor,
            } => data.scale_parameter(parameter, selector, *factor),
            Mutation::FixVariable {
                variable,
                selector,
                value,
            } => data.fix(variable, selector, *value),
            Mutation::SetBounds {
                variable,
                selector,
                lower,
                upper,
            } => data.set_bounds(variable, selector, *lower, *upper),
            Mutation::SetLevel {
                variable,
                selector,
                level,
            } => data.set_level(variable, selector, *level),
        }
    }

    fn capture(&self, data: &DataModel, snapshot: &mut Snapshot) -> Result<()> {
        match self {
            Mutation::SetParameter {
                parameter,
                selector,
                ..
            }
            | Mutation::ScaleParameter {
                parameter,
                selector,
                ..
            } => data.snapshot_parameter(snapshot, parameter, selector),
            Mutation::FixVariable {
                variable, selector, ..
            }
            | Mutation::SetBounds {
                variable, selector, ..
            }
            | Mutation::SetLevel {
                variable, selector, ..
            } => data.snapshot_variable(snapshot, variable, selector),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Scenario {
    pub name: String,
    pub mutations: Vec<Mutation>,
    pub options: SolveOptions,
}

impl Scenario {
    pub fn new(name: &str) -> Self {
        Scenario {
            name: name.to_owned(),
            mutations: vec![],
            options: SolveOptions::default(),
        }
    }

    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }
}

/// The fixed set of aggregates collected after every solve.
#[derive(Clone, PartialEq, Debug)]
pub struct ResultSchema {
    pub quantity: Expr,
    pub externality: Expr,
    /// Named price fields, in output order.
    pub prices: Vec<(String, Expr)>,
    /// Variables whose every level is reported in long format.
    pub levels: Vec<Ident>,
}

impl ResultSchema {
    pub fn new(quantity: Expr, externality: Expr) -> Self {
        ResultSchema {
            quantity,
            externality,
            prices: vec![],
            levels: vec![],
        }
    }

    pub fn price(mut self, name: &str, expr: Expr) -> Self {
        self.prices.push((name.to_owned(), expr));
        self
    }

    pub fn report_levels(mut self, variable: &str) -> Self {
        self.levels.push(variable.to_owned());
        self
    }

    pub fn price_names(&self) -> impl Iterator<Item = &str> {
        self.prices.iter().map(|(n, _)| n.as_str())
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ResultRecord {
    pub scenario: String,
    pub iterations: usize,
    pub residual: f64,
    pub total_quantity: f64,
    pub total_externality: f64,
    pub prices: Vec<(String, f64)>,
}

impl ResultRecord {
    pub fn price(&self, name: &str) -> Option<f64> {
        self.prices.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// One variable level, in long format.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct LevelRecord {
    pub scenario: String,
    pub variable: String,
    /// Set elements joined with `.`; empty for scalars.
    pub key: String,
    pub value: f64,
}

#[derive(Clone, PartialEq, Debug)]
pub struct ScenarioFailure {
    pub scenario: String,
    pub code: ErrorCode,
    pub reason: String,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct BatchReport {
    pub records: Vec<ResultRecord>,
    pub levels: Vec<LevelRecord>,
    pub failures: Vec<ScenarioFailure>,
}

impl BatchReport {
    pub fn record(&self, scenario: &str) -> Option<&ResultRecord> {
        self.records.iter().find(|r| r.scenario == scenario)
    }

    fn push(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Solved(record, levels) => {
                self.records.push(record);
                self.levels.extend(levels);
            }
            Outcome::Skipped(failure) => self.failures.push(failure),
        }
    }
}

enum Outcome {
    Solved(ResultRecord, Vec<LevelRecord>),
    Skipped(ScenarioFailure),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Isolation {
    /// Mutations persist into later scenarios.
    #[default]
    Cumulative,
    /// Mutated keys are restored once the scenario's results are collected.
    Restore,
}

#[derive(Clone, PartialEq, Debug)]
pub struct ScenarioRunner {
    pub schema: ResultSchema,
    pub isolation: Isolation,
}

impl ScenarioRunner {
    pub fn new(schema: ResultSchema) -> Self {
        ScenarioRunner {
            schema,
            isolation: Isolation::Cumulative,
        }
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Run the scenarios in order.  A scenario whose solve stops short of a
    /// solution is recorded as a failure and the batch moves on; any other
    /// error ends the batch.
    pub fn run(
        &self,
        data: &mut DataModel,
        model: &mut ComplementarityModel,
        solver: &dyn ComplementaritySolver,
        scenarios: &[Scenario],
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for scenario in scenarios.iter() {
            let outcome = match self.isolation {
                Isolation::Cumulative => self.run_one(data, model, solver, scenario)?,
                Isolation::Restore => {
                    let mut snapshot = Snapshot::default();
                    for mutation in scenario.mutations.iter() {
                        mutation.capture(data, &mut snapshot)?;
                    }
                    let outcome = self.run_one(data, model, solver, scenario);
                    data.restore(snapshot)?;
                    outcome?
                }
            };
            report.push(outcome);
        }
        Ok(report)
    }

    /// Run every scenario against its own copy of `data` and `model`,
    /// starting from their current state.  Results keep input order.
    pub fn run_isolated(
        &self,
        data: &DataModel,
        model: &ComplementarityModel,
        solver: &dyn ComplementaritySolver,
        scenarios: &[Scenario],
    ) -> Result<BatchReport> {
        let run = |scenario: &Scenario| {
            let mut data = data.clone();
            let mut model = model.clone();
            self.run_one(&mut data, &mut model, solver, scenario)
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<Result<Outcome>> = scenarios.par_iter().map(run).collect();
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<Result<Outcome>> = scenarios.iter().map(run).collect();

        let mut report = BatchReport::default();
        for outcome in outcomes {
            report.push(outcome?);
        }
        Ok(report)
    }

    fn run_one(
        &self,
        data: &mut DataModel,
        model: &mut ComplementarityModel,
        solver: &dyn ComplementaritySolver,
        scenario: &Scenario,
    ) -> Result<Outcome> {
        for mutation in scenario.mutations.iter() {
            mutation.apply(data)?;
        }

        let result = match model.solve(data, solver, &scenario.options) {
            Ok(result) => result,
            Err(err) if err.is_recoverable() => {
                return Ok(self.skip(scenario, err.code, err.to_string()));
            }
            Err(err) => return Err(err),
        };
        if !result.status.is_solved() {
            let code = match result.status {
                SolveStatus::IterationLimit => ErrorCode::IterationLimit,
                SolveStatus::TimeLimit => ErrorCode::TimeLimit,
                _ => ErrorCode::SolverFailure,
            };
            let reason = match result.into_result() {
                Err(err) => err.to_string(),
                Ok(_) => String::new(),
            };
            return Ok(self.skip(scenario, code, reason));
        }

        let schema = &self.schema;
        let mut prices = Vec::with_capacity(schema.prices.len());
        for (name, expr) in schema.prices.iter() {
            prices.push((name.clone(), data.evaluate(expr)?));
        }
        let record = ResultRecord {
            scenario: scenario.name.clone(),
            iterations: result.iterations,
            residual: result.residual,
            total_quantity: data.evaluate(&schema.quantity)?,
            total_externality: data.evaluate(&schema.externality)?,
            prices,
        };

        let mut levels = vec![];
        for name in schema.levels.iter() {
            let var = data.variable(name)?;
            for key in data.domain_tuples(&var.domain)? {
                levels.push(LevelRecord {
                    scenario: scenario.name.clone(),
                    variable: name.clone(),
                    value: var.level(&key),
                    key: key.join("."),
                });
            }
        }

        tracing::info!(
            component = "scenario",
            operation = "run",
            status = "success",
            scenario = %scenario.name,
            iterations = record.iterations,
            quantity = record.total_quantity,
            externality = record.total_externality,
            "Scenario solved"
        );
        Ok(Outcome::Solved(record, levels))
    }

    fn skip(&self, scenario: &Scenario, code: ErrorCode, reason: String) -> Outcome {
        tracing::warn!(
            component = "scenario",
            operation = "run",
            status = "skipped",
            scenario = %scenario.name,
            code = %code,
            reason = %reason,
            "Scenario skipped"
        );
        Outcome::Skipped(ScenarioFailure {
            scenario: scenario.name.clone(),
            code,
            reason,
        })
    }
}
