// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Calibration: solve a linear program over the data model and turn its
//! primal levels and multipliers into benchmark parameters.
//!
//! Rows are reported in `lhs - rhs >= 0` form and the stored equation
//! marginal is `-d objective / d rhs` of that form.  For a cost
//! minimisation every binding inequality therefore carries a non-positive
//! marginal, which [`Backfill::ShadowPrice`] negates into a price or rent.

use std::collections::BTreeSet;

use crate::calib_err;
use crate::common::{Ident, Key, Result};
use crate::compiler::{Binding, Columns};
use crate::datamodel::{DataModel, EqnState};
use crate::expr::Expr;
use crate::model_err;
use crate::solver::{LinearProgramSolver, LpProblem, LpRow, LpStatus, Objective};

/// Outcome of the most recent LP solve.
#[derive(Clone, PartialEq, Debug)]
pub struct LpReport {
    pub status: LpStatus,
    pub objective: f64,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LpModel {
    pub name: Ident,
    pub sense: Objective,
    objective: Expr,
    equations: Vec<Ident>,
    last: Option<LpReport>,
}

impl LpModel {
    /// An LP over the named equations.  The objective must be a scalar
    /// expression linear in the variables it references.
    pub fn new(
        data: &DataModel,
        name: &str,
        equations: &[&str],
        sense: Objective,
        objective: Expr,
    ) -> Result<Self> {
        for eq in equations.iter() {
            data.equation(eq)?;
        }
        if !objective.free_indices().is_empty() {
            return model_err!(
                UnboundIndex,
                format!("objective of '{name}' is indexed over {:?}", objective.free_indices())
            );
        }
        data.check_expr(&objective, &mut vec![])?;
        Ok(LpModel {
            name: name.to_owned(),
            sense,
            objective,
            equations: equations.iter().map(|e| (*e).to_owned()).collect(),
            last: None,
        })
    }

    pub fn last_solve(&self) -> Option<&LpReport> {
        self.last.as_ref()
    }

    fn variables(&self, data: &DataModel) -> Result<BTreeSet<Ident>> {
        let mut names = BTreeSet::new();
        self.objective.level_references(&mut names);
        for eq in self.equations.iter() {
            names.extend(data.equation(eq)?.relation.level_references());
        }
        Ok(names)
    }

    /// Assemble, solve, and write levels and marginals back into `data`.
    /// Anything short of an optimum is a calibration error.
    pub fn solve(
        &mut self,
        data: &mut DataModel,
        solver: &dyn LinearProgramSolver,
    ) -> Result<LpReport> {
        let mut columns = Columns::new();
        let mut lower = vec![];
        let mut upper = vec![];
        for name in self.variables(data)? {
            let var = data.variable(&name)?;
            for key in data.domain_tuples(&var.domain)? {
                let state = var.state(&key);
                let (l, u) = if state.fixed {
                    (state.level, state.level)
                } else {
                    (state.lower, state.upper)
                };
                columns.insert(&name, key);
                lower.push(l);
                upper.push(u);
            }
        }
        let n = columns.len();

        let objective = data
            .ground(&self.objective, &mut Binding::new(), Some(&columns))?
            .linearize()?;
        let mut costs = vec![0.0; n];
        for (j, c) in objective.coeffs.iter() {
            costs[*j] = *c;
        }

        let mut rows = vec![];
        let mut instances: Vec<(Ident, Key)> = vec![];
        for eq_name in self.equations.iter() {
            let equation = data.equation(eq_name)?;
            for key in data.domain_tuples(&equation.domain)? {
                let ground = data.ground_equation(equation, &key, Some(&columns))?;
                let body = ground.lhs.linearize()?;
                let rhs = ground.rhs.linearize()?;
                let mut coeffs = body.coeffs.clone();
                for (j, c) in rhs.coeffs.iter() {
                    *coeffs.entry(*j).or_insert(0.0) -= c;
                }
                rows.push(LpRow {
                    coeffs: coeffs.into_iter().filter(|(_, c)| *c != 0.0).collect(),
                    sense: ground.sense,
                    rhs: rhs.constant - body.constant,
                });
                instances.push((eq_name.clone(), key));
            }
        }

        let problem = LpProblem {
            sense: self.sense,
            objective: costs,
            objective_constant: objective.constant,
            lower,
            upper,
            rows,
        };
        let solution = solver.solve(&problem)?;
        let report = LpReport {
            status: solution.status.clone(),
            objective: solution.objective,
            rows: problem.rows.len(),
            columns: n,
        };
        self.last = Some(report.clone());

        match solution.status {
            LpStatus::Optimal => {}
            LpStatus::Infeasible => {
                tracing::error!(
                    component = "calibrate",
                    model = %self.name,
                    status = "infeasible",
                    "LP failed"
                );
                return calib_err!(Infeasible, format!("'{}' is infeasible", self.name));
            }
            LpStatus::Unbounded => {
                tracing::error!(
                    component = "calibrate",
                    model = %self.name,
                    status = "unbounded",
                    "LP failed"
                );
                return calib_err!(Unbounded, format!("'{}' is unbounded", self.name));
            }
            LpStatus::Failed(ref reason) => {
                tracing::error!(
                    component = "calibrate",
                    model = %self.name,
                    status = "failed",
                    reason = %reason,
                    "LP failed"
                );
                return calib_err!(SolverFailure, format!("'{}': {reason}", self.name));
            }
        }

        for (j, (name, key)) in columns.entries().iter().enumerate() {
            data.write_var_solution(name, key, solution.primal[j], solution.reduced_costs[j])?;
        }
        for (k, (name, key)) in instances.into_iter().enumerate() {
            let row = &problem.rows[k];
            let body: f64 = row.coeffs.iter().map(|(j, c)| c * solution.primal[*j]).sum();
            let state = EqnState {
                level: body - row.rhs,
                marginal: solution.duals[k],
            };
            data.equation_mut(&name)?.set_state(key, state);
        }

        tracing::info!(
            component = "calibrate",
            operation = "solve_lp",
            status = "success",
            model = %self.name,
            objective = solution.objective,
            rows = report.rows,
            columns = report.columns,
            "Calibration LP solved"
        );
        Ok(report)
    }
}

/// How a benchmark parameter is recovered from the solved LP.
#[derive(Clone, PartialEq, Debug)]
pub enum Backfill {
    /// `parameter[k] = variable.l[k]`
    Level { parameter: Ident, variable: Ident },
    /// `parameter[k] = -equation.m[k]`
    ShadowPrice { parameter: Ident, equation: Ident },
    /// `parameter[indices] = expr`, evaluated at the LP optimum.
    Assign {
        parameter: Ident,
        indices: Vec<Ident>,
        expr: Expr,
    },
}

impl Backfill {
    pub fn level(parameter: &str, variable: &str) -> Self {
        Backfill::Level {
            parameter: parameter.to_owned(),
            variable: variable.to_owned(),
        }
    }

    pub fn shadow_price(parameter: &str, equation: &str) -> Self {
        Backfill::ShadowPrice {
            parameter: parameter.to_owned(),
            equation: equation.to_owned(),
        }
    }

    pub fn assign(parameter: &str, indices: &[&str], expr: Expr) -> Self {
        Backfill::Assign {
            parameter: parameter.to_owned(),
            indices: indices.iter().map(|i| (*i).to_owned()).collect(),
            expr,
        }
    }

    pub fn parameter(&self) -> &str {
        match self {
            Backfill::Level { parameter, .. }
            | Backfill::ShadowPrice { parameter, .. }
            | Backfill::Assign { parameter, .. } => parameter,
        }
    }

    fn apply(&self, data: &mut DataModel) -> Result<()> {
        match self {
            Backfill::Level {
                parameter,
                variable,
            } => {
                let var = data.variable(variable)?;
                check_same_domain(data, parameter, &var.domain)?;
                let records = data
                    .domain_tuples(&var.domain)?
                    .into_iter()
                    .map(|k| {
                        let level = var.level(&k);
                        (k, level)
                    })
                    .collect();
                data.write_parameter(parameter, records, true)
            }
            Backfill::ShadowPrice {
                parameter,
                equation,
            } => {
                let eq = data.equation(equation)?;
                check_same_domain(data, parameter, &eq.domain)?;
                let records = data
                    .domain_tuples(&eq.domain)?
                    .into_iter()
                    .map(|k| {
                        let price = -eq.state(&k).marginal;
                        // avoid storing -0.0 for slack rows
                        (k, if price == 0.0 { 0.0 } else { price })
                    })
                    .collect();
                data.write_parameter(parameter, records, true)
            }
            Backfill::Assign {
                parameter,
                indices,
                expr,
            } => {
                let indices: Vec<&str> = indices.iter().map(|i| i.as_str()).collect();
                data.assign_parameter(parameter, &indices, expr)
            }
        }
    }
}

fn check_same_domain(data: &DataModel, parameter: &str, domain: &[Ident]) -> Result<()> {
    let declared = &data.parameter(parameter)?.domain;
    if declared != domain {
        return model_err!(
            MismatchedDomains,
            format!("{parameter} is declared over {declared:?}, source over {domain:?}")
        );
    }
    Ok(())
}

#[derive(Clone, PartialEq, Debug)]
pub struct CalibrationReport {
    pub lp: LpReport,
    /// Parameters written, in order.
    pub parameters: Vec<Ident>,
}

/// An LP followed by the back-fill steps that derive benchmark
/// parameters from its solution.
#[derive(Clone, PartialEq, Debug)]
pub struct Calibration {
    pub lp: LpModel,
    backfills: Vec<Backfill>,
}

impl Calibration {
    pub fn new(lp: LpModel) -> Self {
        Calibration { lp, backfills: vec![] }
    }

    pub fn backfill(mut self, step: Backfill) -> Self {
        self.backfills.push(step);
        self
    }

    /// Solve the LP and apply every back-fill in order.  Nothing is
    /// back-filled unless the LP reached an optimum.
    pub fn run(
        &mut self,
        data: &mut DataModel,
        solver: &dyn LinearProgramSolver,
    ) -> Result<CalibrationReport> {
        let lp = self.lp.solve(data, solver)?;
        let mut parameters = vec![];
        for step in self.backfills.iter() {
            step.apply(data)?;
            let param = data.parameter(step.parameter())?;
            tracing::debug!(
                component = "calibrate",
                operation = "backfill",
                parameter = step.parameter(),
                records = param.records().count(),
                "Back-filled benchmark parameter"
            );
            parameters.push(step.parameter().to_owned());
        }
        Ok(CalibrationReport { lp, parameters })
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::common::{ErrorCode, ErrorKind};
    use crate::datamodel::VarKind;
    use crate::expr::*;
    use crate::solver::MicroLpSolver;

    fn plants() -> DataModel {
        let mut data = DataModel::new();
        data.define_set("i", &["p1", "p2", "p3"]).unwrap();
        data.define_parameter("cost", &["i"], &[(["p1"], 112.0), (["p2"], 100.0), (["p3"], 132.0)])
            .unwrap();
        data.define_parameter("ylim", &["i"], &[(["p1"], 60.0), (["p2"], 45.0), (["p3"], 50.0)])
            .unwrap();
        data.define_scalar("dbar", 100.0).unwrap();
        data.define_scalar("pbar", 0.0).unwrap();
        data.define_parameter::<[&str; 1], &str>("ybar", &["i"], &[]).unwrap();
        data.define_parameter::<[&str; 1], &str>("rbar", &["i"], &[]).unwrap();
        data.define_variable("Y", &["i"], VarKind::Positive).unwrap();
        data.define_equation("demand", &[], sum(&["i"], var("Y", &["i"])).geq(scalar("dbar")))
            .unwrap();
        data.define_equation("capacity", &["i"], var("Y", &["i"]).leq(param("ylim", &["i"])))
            .unwrap();
        data
    }

    fn calibration(data: &DataModel) -> Calibration {
        let objective = sum(&["i"], param("cost", &["i"]).times(var("Y", &["i"])));
        let equations = ["demand", "capacity"];
        let lp =
            LpModel::new(data, "mincost", &equations, Objective::Minimize, objective).unwrap();
        Calibration::new(lp)
            .backfill(Backfill::shadow_price("pbar", "demand"))
            .backfill(Backfill::level("ybar", "Y"))
            .backfill(Backfill::shadow_price("rbar", "capacity"))
    }

    #[test]
    fn test_calibration() {
        let mut data = plants();
        let mut calibration = calibration(&data);
        let report = calibration.run(&mut data, &MicroLpSolver::new()).unwrap();
        assert_eq!(LpStatus::Optimal, report.lp.status);
        assert_eq!(vec!["pbar", "ybar", "rbar"], report.parameters);

        let pbar = data.scalar("pbar").unwrap();
        assert!(approx_eq!(f64, 112.0, pbar, epsilon = 1e-6));
        // the raw multiplier stays on the equation
        let raw = data.equation("demand").unwrap().state(&[]).marginal;
        assert!(approx_eq!(f64, -pbar, raw, epsilon = 1e-9));

        assert!(approx_eq!(f64, 55.0, data.param_value("ybar", &["p1"]).unwrap(), epsilon = 1e-6));
        assert!(approx_eq!(f64, 12.0, data.param_value("rbar", &["p2"]).unwrap(), epsilon = 1e-6));
        assert!(approx_eq!(f64, 0.0, data.param_value("rbar", &["p1"]).unwrap(), epsilon = 1e-6));

        // slack on the capacity row of p3
        let slack = data.equation("capacity").unwrap().state(&["p3".to_owned()]).level;
        assert!(approx_eq!(f64, -50.0, slack, epsilon = 1e-6));
    }

    #[test]
    fn test_infeasible_calibration() {
        let mut data = plants();
        data.set_parameter::<&str>("dbar", &[], 1000.0).unwrap();
        let mut calibration = calibration(&data);
        let err = calibration.run(&mut data, &MicroLpSolver::new()).unwrap_err();
        assert_eq!(ErrorKind::Calibration, err.kind);
        assert_eq!(ErrorCode::Infeasible, err.code);
        // nothing back-filled
        assert_eq!(0.0, data.scalar("pbar").unwrap());
        assert_eq!(
            Some(LpStatus::Infeasible),
            calibration.lp.last_solve().map(|r| r.status.clone())
        );
    }

    #[test]
    fn test_unbounded_calibration() {
        // without the capacity rows nothing stops production from growing
        let mut data = plants();
        let objective = sum(&["i"], param("cost", &["i"]).times(var("Y", &["i"])));
        let lp = LpModel::new(&data, "maxcost", &["demand"], Objective::Maximize, objective)
            .unwrap();
        let mut calibration =
            Calibration::new(lp).backfill(Backfill::shadow_price("pbar", "demand"));
        let err = calibration.run(&mut data, &MicroLpSolver::new()).unwrap_err();
        assert_eq!(ErrorKind::Calibration, err.kind);
        assert_eq!(ErrorCode::Unbounded, err.code);
        assert_eq!(0.0, data.scalar("pbar").unwrap());
    }

    #[test]
    fn test_nonlinear_objective() {
        let data = plants();
        let objective = sum(&["i"], var("Y", &["i"]).times(var("Y", &["i"])));
        let mut lp =
            LpModel::new(&data, "bad", &["demand"], Objective::Minimize, objective).unwrap();
        let mut data = data;
        let err = lp.solve(&mut data, &MicroLpSolver::new()).unwrap_err();
        assert_eq!(ErrorKind::ModelDefinition, err.kind);
        assert_eq!(ErrorCode::NonlinearLp, err.code);
    }
}
