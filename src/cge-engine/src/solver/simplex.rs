// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Linear programs via `microlp`.
//!
//! `microlp` reports primal values only, so multipliers come from a second
//! solve of the dual program.  With every row written as `g x >= h` (or
//! `g x = h`) and the objective in minimisation form `c`, the dual is
//!
//! ```text
//! max  h'y + l'm_l - u'm_u
//! s.t. G'y + m_l - m_u = c,   y >= 0 on inequality rows, m >= 0
//! ```
//!
//! and `y_k` is the sensitivity of the optimal (minimised) cost to `h_k`.

use std::collections::BTreeMap;

use microlp::{ComparisonOp, OptimizationDirection, Problem, Variable};

use super::{LinearProgramSolver, LpProblem, LpSolution, LpStatus, Objective};
use crate::common::Result;
use crate::expr::Sense;

/// Rows are compared against this to decide feasibility of empty rows.
const FEASIBILITY_TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Default)]
pub struct MicroLpSolver {}

impl MicroLpSolver {
    pub fn new() -> Self {
        MicroLpSolver {}
    }
}

/// A row in `coeffs . x (>=|=) rhs` form.
struct NormalRow {
    coeffs: Vec<(usize, f64)>,
    equality: bool,
    rhs: f64,
}

fn normalise(problem: &LpProblem) -> Vec<NormalRow> {
    problem
        .rows
        .iter()
        .map(|row| {
            let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
            for (j, c) in row.coeffs.iter() {
                *merged.entry(*j).or_insert(0.0) += c;
            }
            let sign = if row.sense == Sense::Leq { -1.0 } else { 1.0 };
            NormalRow {
                coeffs: merged
                    .into_iter()
                    .filter(|(_, c)| *c != 0.0)
                    .map(|(j, c)| (j, sign * c))
                    .collect(),
                equality: row.sense == Sense::Eq,
                rhs: sign * row.rhs,
            }
        })
        .collect()
}

fn empty_row_feasible(row: &NormalRow) -> bool {
    if row.equality {
        row.rhs.abs() <= FEASIBILITY_TOLERANCE
    } else {
        row.rhs <= FEASIBILITY_TOLERANCE
    }
}

fn lp_status(err: microlp::Error) -> LpStatus {
    match err {
        microlp::Error::Infeasible => LpStatus::Infeasible,
        microlp::Error::Unbounded => LpStatus::Unbounded,
        microlp::Error::InternalError(msg) => LpStatus::Failed(msg),
    }
}

impl LinearProgramSolver for MicroLpSolver {
    fn solve(&self, problem: &LpProblem) -> Result<LpSolution> {
        let n = problem.columns();
        let rows = normalise(problem);
        if rows.iter().any(|r| r.coeffs.is_empty() && !empty_row_feasible(r)) {
            return Ok(LpSolution::failed(LpStatus::Infeasible, problem));
        }

        let direction = match problem.sense {
            Objective::Minimize => OptimizationDirection::Minimize,
            Objective::Maximize => OptimizationDirection::Maximize,
        };
        let mut primal = Problem::new(direction);
        let columns: Vec<Variable> = (0..n)
            .map(|j| primal.add_var(problem.objective[j], (problem.lower[j], problem.upper[j])))
            .collect();
        for row in rows.iter().filter(|r| !r.coeffs.is_empty()) {
            let terms: Vec<(Variable, f64)> =
                row.coeffs.iter().map(|(j, c)| (columns[*j], *c)).collect();
            let op = if row.equality {
                ComparisonOp::Eq
            } else {
                ComparisonOp::Ge
            };
            primal.add_constraint(terms, op, row.rhs);
        }

        let solution = match primal.solve() {
            Ok(solution) => solution,
            Err(err) => return Ok(LpSolution::failed(lp_status(err), problem)),
        };
        let values: Vec<f64> = columns.iter().map(|v| *solution.var_value(*v)).collect();
        let objective = solution.objective() + problem.objective_constant;

        // objective in minimisation form
        let sign = match problem.sense {
            Objective::Minimize => 1.0,
            Objective::Maximize => -1.0,
        };

        let mut dual = Problem::new(OptimizationDirection::Maximize);
        // G' y + m_l - m_u = c, one equality per column
        let mut by_column: Vec<Vec<(Variable, f64)>> = vec![vec![]; n];
        let mut row_duals: Vec<Option<Variable>> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            if row.coeffs.is_empty() {
                row_duals.push(None);
                continue;
            }
            let bounds = if row.equality {
                (f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (0.0, f64::INFINITY)
            };
            let y = dual.add_var(row.rhs, bounds);
            for (j, c) in row.coeffs.iter() {
                by_column[*j].push((y, *c));
            }
            row_duals.push(Some(y));
        }

        let mut bound_duals: Vec<(Option<Variable>, Option<Variable>)> = Vec::with_capacity(n);
        for j in 0..n {
            let (lower, upper) = (problem.lower[j], problem.upper[j]);
            if lower == upper {
                let m = dual.add_var(lower, (f64::NEG_INFINITY, f64::INFINITY));
                by_column[j].push((m, 1.0));
                bound_duals.push((Some(m), None));
                continue;
            }
            let m_l = if lower.is_finite() {
                let m = dual.add_var(lower, (0.0, f64::INFINITY));
                by_column[j].push((m, 1.0));
                Some(m)
            } else {
                None
            };
            let m_u = if upper.is_finite() {
                let m = dual.add_var(-upper, (0.0, f64::INFINITY));
                by_column[j].push((m, -1.0));
                Some(m)
            } else {
                None
            };
            bound_duals.push((m_l, m_u));
        }
        for (j, terms) in by_column.into_iter().enumerate() {
            dual.add_constraint(terms, ComparisonOp::Eq, sign * problem.objective[j]);
        }

        let dual_solution = match dual.solve() {
            Ok(solution) => solution,
            Err(err) => {
                tracing::warn!(
                    component = "solver",
                    operation = "lp_dual",
                    status = "failed",
                    error = %err,
                    "Dual program failed after an optimal primal"
                );
                return Ok(LpSolution {
                    status: LpStatus::Failed(format!("dual solve: {err}")),
                    objective,
                    primal: values,
                    duals: vec![f64::NAN; rows.len()],
                    reduced_costs: vec![f64::NAN; n],
                });
            }
        };

        let value = |v: &Option<Variable>| v.map(|v| *dual_solution.var_value(v)).unwrap_or(0.0);
        let duals = row_duals.iter().map(|y| -sign * value(y)).collect();
        let reduced_costs = bound_duals
            .iter()
            .map(|(m_l, m_u)| sign * (value(m_l) - value(m_u)))
            .collect();

        Ok(LpSolution {
            status: LpStatus::Optimal,
            objective,
            primal: values,
            duals,
            reduced_costs,
        })
    }
}
