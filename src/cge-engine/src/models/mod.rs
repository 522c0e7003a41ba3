// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Ready-made models: a calibrated complementarity model plus the scenario
//! batch and result schema that go with it.

use crate::common::Result;
use crate::datamodel::DataModel;
use crate::mcp::{ComplementarityModel, SolveResult};
use crate::scenario::{BatchReport, Isolation, ResultSchema, Scenario, ScenarioRunner};
use crate::solver::ComplementaritySolver;

pub mod steel;
pub mod trade;

/// Everything needed to run a model's scenarios, with the data model at
/// its calibrated benchmark.
#[derive(Clone, PartialEq, Debug)]
pub struct Pipeline {
    pub name: String,
    pub data: DataModel,
    pub mcp: ComplementarityModel,
    pub scenarios: Vec<Scenario>,
    pub schema: ResultSchema,
}

impl Pipeline {
    /// Evaluate the benchmark without iterating; see
    /// [`ComplementarityModel::replication_check`].
    pub fn replication_check(
        &mut self,
        solver: &dyn ComplementaritySolver,
        tolerance: f64,
    ) -> Result<SolveResult> {
        self.mcp.replication_check(&mut self.data, solver, tolerance)
    }

    /// Override the iteration limit of every scenario that iterates.
    /// Evaluate-only scenarios are left alone.
    pub fn set_iteration_limit(&mut self, limit: usize) {
        for scenario in self.scenarios.iter_mut() {
            if !scenario.options.evaluate_only {
                scenario.options.iteration_limit = limit;
            }
        }
    }

    pub fn run(
        &mut self,
        solver: &dyn ComplementaritySolver,
        isolation: Isolation,
    ) -> Result<BatchReport> {
        ScenarioRunner::new(self.schema.clone())
            .isolation(isolation)
            .run(&mut self.data, &mut self.mcp, solver, &self.scenarios)
    }

    pub fn run_isolated(&self, solver: &dyn ComplementaritySolver) -> Result<BatchReport> {
        ScenarioRunner::new(self.schema.clone()).run_isolated(
            &self.data,
            &self.mcp,
            solver,
            &self.scenarios,
        )
    }
}
