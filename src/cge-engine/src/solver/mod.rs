// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Contracts between the model layer and numerical solvers.
//!
//! The calibration engine and the complementarity model only ever see
//! [`LinearProgramSolver`] and [`ComplementaritySolver`]; the default
//! backends live in the submodules.

use std::time::Duration;

use crate::common::Result;
use crate::expr::Sense;

mod simplex;
mod newton;

pub use self::simplex::MicroLpSolver;
pub use self::newton::{NewtonConfig, NewtonSolver};

#[derive(Clone, PartialEq, Debug)]
pub enum SolveStatus {
    Solved,
    IterationLimit,
    TimeLimit,
    Failed(String),
}

impl SolveStatus {
    pub fn is_solved(&self) -> bool {
        matches!(self, SolveStatus::Solved)
    }
}

/// A box-constrained complementarity problem: find `x` in `[lower, upper]`
/// such that each `F_i(x)` is non-negative where `x_i` sits at its lower
/// bound, non-positive at its upper bound, and zero in between.
pub trait McpFunction {
    fn dim(&self) -> usize;
    fn lower(&self) -> &[f64];
    fn upper(&self) -> &[f64];
    /// Write `F(x)` into `out`.
    fn evaluate(&self, x: &[f64], out: &mut [f64]) -> Result<()>;
}

#[derive(Clone, PartialEq, Debug)]
pub struct SolveLimits {
    pub iteration_limit: usize,
    pub time_limit: Option<Duration>,
    pub tolerance: f64,
}

impl Default for SolveLimits {
    fn default() -> Self {
        SolveLimits {
            iteration_limit: 1000,
            time_limit: None,
            tolerance: 1e-7,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct McpSolution {
    pub status: SolveStatus,
    pub iterations: usize,
    pub levels: Vec<f64>,
    /// `F` at the returned levels.
    pub marginals: Vec<f64>,
    /// Max-norm natural residual at the returned levels.
    pub residual: f64,
}

pub trait ComplementaritySolver: Send + Sync {
    fn solve(
        &self,
        problem: &dyn McpFunction,
        start: &[f64],
        limits: &SolveLimits,
    ) -> Result<McpSolution>;
}

/// Natural residual of one complementarity pair:
/// `|x - mid(lower, x - f, upper)|`.
pub fn natural_residual(x: f64, f: f64, lower: f64, upper: f64) -> f64 {
    let mut projected = x - f;
    if projected < lower {
        projected = lower;
    }
    if projected > upper {
        projected = upper;
    }
    (x - projected).abs()
}

#[derive(Clone, PartialEq, Debug)]
pub struct LpRow {
    /// Column and coefficient pairs; each column appears at most once.
    pub coeffs: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Objective {
    Minimize,
    Maximize,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LpProblem {
    pub sense: Objective,
    pub objective: Vec<f64>,
    pub objective_constant: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub rows: Vec<LpRow>,
}

impl LpProblem {
    pub fn columns(&self) -> usize {
        self.objective.len()
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Failed(String),
}

#[derive(Clone, PartialEq, Debug)]
pub struct LpSolution {
    pub status: LpStatus,
    pub objective: f64,
    pub primal: Vec<f64>,
    /// One multiplier per row, `-d objective / d rhs` of the row in
    /// `lhs - rhs >= 0` form.
    pub duals: Vec<f64>,
    /// One reduced cost per column.
    pub reduced_costs: Vec<f64>,
}

impl LpSolution {
    pub fn failed(status: LpStatus, problem: &LpProblem) -> Self {
        LpSolution {
            status,
            objective: f64::NAN,
            primal: vec![f64::NAN; problem.columns()],
            duals: vec![f64::NAN; problem.rows.len()],
            reduced_costs: vec![f64::NAN; problem.columns()],
        }
    }
}

pub trait LinearProgramSolver: Send + Sync {
    fn solve(&self, problem: &LpProblem) -> Result<LpSolution>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_residual() {
        // interior point: residual is |F|
        assert_eq!(2.0, natural_residual(5.0, 2.0, 0.0, f64::INFINITY));
        // at the lower bound with F >= 0 the pair is satisfied
        assert_eq!(0.0, natural_residual(0.0, 3.0, 0.0, f64::INFINITY));
        // at the lower bound with F < 0 the bound should not be active
        assert_eq!(1.5, natural_residual(0.0, -1.5, 0.0, f64::INFINITY));
        // fixed variables are always complementary
        assert_eq!(0.0, natural_residual(10.0, -7.0, 10.0, 10.0));
        assert_eq!(0.0, natural_residual(10.0, 7.0, 10.0, 10.0));
    }
}
