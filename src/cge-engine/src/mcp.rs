// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Mixed complementarity models.
//!
//! A model is a list of equation/variable pairs.  For every index tuple the
//! normalised equation value `F` (`lhs - rhs` for `>=` and `=`, `rhs - lhs`
//! for `<=`) is complementary to the paired variable within its bounds.
//! Pairs whose variable instance is fixed are left out of the square
//! system; the variable keeps its level and the equation is not enforced.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::common::{Ident, Key, Result, format_key};
use crate::compiler::{Columns, GroundRelation};
use crate::datamodel::{DataModel, EqnState};
use crate::expr::Sense;
use crate::solver::{
    ComplementaritySolver, McpFunction, SolveLimits, SolveStatus, natural_residual,
};
use crate::{calib_err, model_err, solve_err};

/// An equation matched with the variable it is complementary to.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Pair {
    pub equation: Ident,
    pub variable: Ident,
}

/// Collects pairs for a fixed list of equations and validates the match
/// when the model is built.
pub struct McpBuilder<'a> {
    data: &'a DataModel,
    name: Ident,
    equations: Vec<Ident>,
    pairs: Vec<Pair>,
}

impl<'a> McpBuilder<'a> {
    pub fn new(data: &'a DataModel, name: &str, equations: &[&str]) -> Self {
        McpBuilder {
            data,
            name: name.to_owned(),
            equations: equations.iter().map(|e| (*e).to_owned()).collect(),
            pairs: vec![],
        }
    }

    pub fn pair(mut self, equation: &str, variable: &str) -> Self {
        self.pairs.push(Pair {
            equation: equation.to_owned(),
            variable: variable.to_owned(),
        });
        self
    }

    /// Check that the pairs partition the model's equations and the
    /// variables they reference, with matching domains.
    pub fn build(self) -> Result<ComplementarityModel> {
        let data = self.data;
        let mut equations = BTreeSet::new();
        for eq in self.equations.iter() {
            if data.equation(eq).is_err() {
                return model_err!(UndefinedSymbol, format!("equation '{eq}' is not defined"));
            }
            if !equations.insert(eq.clone()) {
                return model_err!(DuplicateMatch, format!("equation '{eq}' listed twice"));
            }
        }

        let mut matched_eqs = BTreeSet::new();
        let mut matched_vars = BTreeSet::new();
        for pair in self.pairs.iter() {
            let Ok(eq) = data.equation(&pair.equation) else {
                return model_err!(
                    UndefinedSymbol,
                    format!("equation '{}' is not defined", pair.equation)
                );
            };
            let Ok(var) = data.variable(&pair.variable) else {
                return model_err!(
                    UndefinedSymbol,
                    format!("variable '{}' is not defined", pair.variable)
                );
            };
            if !equations.contains(&pair.equation) {
                return model_err!(
                    UnmatchedEquation,
                    format!("'{}' is matched but not part of '{}'", pair.equation, self.name)
                );
            }
            if !matched_eqs.insert(pair.equation.clone()) {
                return model_err!(
                    DuplicateMatch,
                    format!("equation '{}' is matched more than once", pair.equation)
                );
            }
            if !matched_vars.insert(pair.variable.clone()) {
                return model_err!(
                    DuplicateMatch,
                    format!("variable '{}' is matched more than once", pair.variable)
                );
            }
            if eq.domain != var.domain {
                return model_err!(
                    MismatchedDomains,
                    format!(
                        "{} over {:?} cannot be matched with {} over {:?}",
                        pair.equation, eq.domain, pair.variable, var.domain
                    )
                );
            }
        }

        if let Some(eq) = equations.difference(&matched_eqs).next() {
            return model_err!(
                UnmatchedEquation,
                format!("equation '{eq}' of '{}' has no matching variable", self.name)
            );
        }
        for eq in equations.iter() {
            for var in data.equation(eq)?.relation.level_references() {
                if !matched_vars.contains(&var) {
                    return model_err!(
                        UnmatchedVariable,
                        format!("variable '{var}' used in '{eq}' is not matched")
                    );
                }
            }
        }

        tracing::debug!(
            component = "mcp",
            operation = "build",
            status = "success",
            model = %self.name,
            pairs = self.pairs.len(),
            "Built complementarity model"
        );
        Ok(ComplementarityModel {
            name: self.name,
            pairs: self.pairs,
            last: None,
        })
    }
}

/// Levels of every matched variable instance, for restarting a solve from a
/// known point.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct StartPoint {
    levels: Vec<(Ident, Key, f64)>,
}

impl StartPoint {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level(&self, variable: &str, key: &[String]) -> Option<f64> {
        self.levels
            .iter()
            .find(|(v, k, _)| v == variable && k.as_slice() == key)
            .map(|(_, _, l)| *l)
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct SolveOptions {
    pub iteration_limit: usize,
    /// Evaluate at the starting point without taking any step.
    pub evaluate_only: bool,
    pub time_limit: Option<Duration>,
    pub tolerance: f64,
    /// Start from these levels instead of the current ones.
    pub start: Option<StartPoint>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            iteration_limit: 1000,
            evaluate_only: false,
            time_limit: None,
            tolerance: 1e-7,
            start: None,
        }
    }
}

impl SolveOptions {
    pub fn with_iteration_limit(iteration_limit: usize) -> Self {
        SolveOptions {
            iteration_limit,
            ..Default::default()
        }
    }

    pub fn evaluate_only() -> Self {
        SolveOptions {
            evaluate_only: true,
            ..Default::default()
        }
    }
}

/// Pair instance with the largest natural residual.
#[derive(Clone, PartialEq, Debug)]
pub struct Worst {
    pub equation: Ident,
    pub key: Key,
    pub residual: f64,
}

#[derive(Clone, PartialEq, Debug)]
pub struct SolveResult {
    pub status: SolveStatus,
    pub iterations: usize,
    pub residual: f64,
    pub worst: Option<Worst>,
}

impl SolveResult {
    /// Convert a non-optimal termination into a `SolveNonOptimal` error.
    pub fn into_result(self) -> Result<SolveResult> {
        if self.status.is_solved() {
            return Ok(self);
        }
        let summary = format!("{} iterations, residual {:e}", self.iterations, self.residual);
        match self.status {
            SolveStatus::Solved => Ok(self),
            SolveStatus::IterationLimit => solve_err!(IterationLimit, summary),
            SolveStatus::TimeLimit => solve_err!(TimeLimit, summary),
            SolveStatus::Failed(reason) => {
                solve_err!(SolverFailure, format!("{reason} ({summary})"))
            }
        }
    }
}

/// The square system handed to a [`ComplementaritySolver`].
struct System {
    rows: Vec<GroundRelation>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

fn orient(sense: Sense, level: f64) -> f64 {
    match sense {
        Sense::Geq | Sense::Eq => level,
        Sense::Leq => -level,
    }
}

impl McpFunction for System {
    fn dim(&self) -> usize {
        self.rows.len()
    }

    fn lower(&self) -> &[f64] {
        &self.lower
    }

    fn upper(&self) -> &[f64] {
        &self.upper
    }

    fn evaluate(&self, x: &[f64], out: &mut [f64]) -> Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            out[i] = orient(row.sense, row.level(x)?);
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ComplementarityModel {
    pub name: Ident,
    pairs: Vec<Pair>,
    last: Option<SolveResult>,
}

impl ComplementarityModel {
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn last_solve(&self) -> Option<&SolveResult> {
        self.last.as_ref()
    }

    pub fn current_point(&self, data: &DataModel) -> Result<StartPoint> {
        let mut levels = vec![];
        for pair in self.pairs.iter() {
            let var = data.variable(&pair.variable)?;
            for key in data.domain_tuples(&var.domain)? {
                let level = var.level(&key);
                levels.push((pair.variable.clone(), key, level));
            }
        }
        Ok(StartPoint { levels })
    }

    /// Solve from the current levels (or `options.start`) and write the
    /// result back.  Levels and marginals are updated even when the solver
    /// stops short, so the caller can inspect where it ended up.
    pub fn solve(
        &mut self,
        data: &mut DataModel,
        solver: &dyn ComplementaritySolver,
        options: &SolveOptions,
    ) -> Result<SolveResult> {
        if let Some(start) = &options.start {
            let mut by_var: HashMap<&str, Vec<(Key, f64)>> = HashMap::new();
            for (var, key, level) in start.levels.iter() {
                by_var.entry(var).or_default().push((key.clone(), *level));
            }
            for (var, records) in by_var {
                data.write_levels(var, records)?;
            }
        }

        let mut columns = Columns::new();
        let mut lower = vec![];
        let mut upper = vec![];
        let mut start = vec![];
        // (pair index, key, column if the pair is part of the square system)
        let mut instances: Vec<(usize, Key, Option<usize>)> = vec![];
        for (p, pair) in self.pairs.iter().enumerate() {
            let var = data.variable(&pair.variable)?;
            for key in data.domain_tuples(&var.domain)? {
                let state = var.state(&key);
                if state.lower > state.upper {
                    return model_err!(
                        InvalidBounds,
                        format!(
                            "{}{}: lower bound {} exceeds upper bound {}",
                            pair.variable,
                            format_key(&key),
                            state.lower,
                            state.upper
                        )
                    );
                }
                if state.fixed || state.lower == state.upper {
                    instances.push((p, key, None));
                    continue;
                }
                let column = columns.insert(&pair.variable, key.clone());
                let level = if state.in_bounds() {
                    state.level
                } else {
                    let level = state.level.max(state.lower).min(state.upper);
                    tracing::warn!(
                        component = "mcp",
                        operation = "solve",
                        model = %self.name,
                        variable = %pair.variable,
                        key = %format_key(&key),
                        level = state.level,
                        start = level,
                        "Starting level outside its bounds; moved to the nearest bound"
                    );
                    level
                };
                lower.push(state.lower);
                upper.push(state.upper);
                start.push(level);
                instances.push((p, key, Some(column)));
            }
        }

        let mut rows = Vec::with_capacity(columns.len());
        let mut dropped = vec![];
        for (p, key, column) in instances.iter() {
            let equation = data.equation(&self.pairs[*p].equation)?;
            let ground = data.ground_equation(equation, key, Some(&columns))?;
            match column {
                Some(_) => rows.push(ground),
                None => dropped.push(ground),
            }
        }
        let system = System { rows, lower, upper };

        let limits = SolveLimits {
            iteration_limit: if options.evaluate_only {
                0
            } else {
                options.iteration_limit
            },
            time_limit: options.time_limit,
            tolerance: options.tolerance,
        };
        let solution = solver.solve(&system, &start, &limits)?;

        let mut worst: Option<Worst> = None;
        let mut dropped = dropped.into_iter();
        for (p, key, column) in instances.into_iter() {
            let pair = &self.pairs[p];
            let (level, f) = match column {
                Some(j) => {
                    let (x, f) = (solution.levels[j], solution.marginals[j]);
                    let residual = natural_residual(x, f, system.lower[j], system.upper[j]);
                    if worst.as_ref().is_none_or(|w| residual > w.residual) {
                        worst = Some(Worst {
                            equation: pair.equation.clone(),
                            key: key.clone(),
                            residual,
                        });
                    }
                    (x, f)
                }
                None => {
                    let level = data.variable(&pair.variable)?.level(&key);
                    let f = match dropped.next() {
                        Some(ground) => orient(ground.sense, ground.level(&solution.levels)?),
                        None => 0.0,
                    };
                    (level, f)
                }
            };
            let sense = data.equation(&pair.equation)?.relation.sense;
            data.write_var_solution(&pair.variable, &key, level, f)?;
            data.equation_mut(&pair.equation)?.set_state(
                key,
                EqnState {
                    level: orient(sense, f),
                    marginal: level,
                },
            );
        }

        let result = SolveResult {
            status: solution.status.clone(),
            iterations: solution.iterations,
            residual: solution.residual,
            worst,
        };
        if result.status.is_solved() {
            tracing::info!(
                component = "mcp",
                operation = "solve",
                status = "success",
                model = %self.name,
                iterations = result.iterations,
                residual = result.residual,
                "Complementarity model solved"
            );
        } else {
            tracing::warn!(
                component = "mcp",
                operation = "solve",
                status = ?result.status,
                model = %self.name,
                iterations = result.iterations,
                residual = result.residual,
                "Complementarity model not solved"
            );
        }
        self.last = Some(result.clone());
        Ok(result)
    }

    /// Evaluate at the current levels without iterating and fail unless
    /// every pair is complementary to within `tolerance`.
    pub fn replication_check(
        &mut self,
        data: &mut DataModel,
        solver: &dyn ComplementaritySolver,
        tolerance: f64,
    ) -> Result<SolveResult> {
        let options = SolveOptions {
            tolerance,
            ..SolveOptions::evaluate_only()
        };
        let result = self.solve(data, solver, &options)?;
        if result.residual > tolerance {
            let at = match &result.worst {
                Some(w) => format!("{}{}", w.equation, format_key(&w.key)),
                None => "?".to_owned(),
            };
            return calib_err!(
                ReplicationFailed,
                format!("benchmark residual {:e} at {at}", result.residual)
            );
        }
        tracing::info!(
            component = "mcp",
            operation = "replication_check",
            status = "success",
            model = %self.name,
            residual = result.residual,
            "Benchmark replicated"
        );
        Ok(result)
    }
}
