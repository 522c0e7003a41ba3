// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Semismooth Newton method for box-constrained complementarity problems.
//!
//! Each pair `(x_i, F_i)` is rewritten as a scalar equation `Phi_i = 0`
//! using the Fischer-Burmeister function
//! `phi(a, b) = a + b - sqrt(a^2 + b^2)`, which vanishes exactly when
//! `a >= 0`, `b >= 0` and `a * b = 0`:
//!
//! | bounds        | `Phi_i`                                |
//! |---------------|----------------------------------------|
//! | `l` and `u`   | `phi(x - l, -phi(u - x, -F))`          |
//! | `l` only      | `phi(x - l, F)`                        |
//! | `u` only      | `-phi(u - x, -F)`                      |
//! | neither       | `F`                                    |
//! | `l == u`      | `x - l`                                |
//!
//! Steps solve `J_Phi d = -Phi` with a forward-difference Jacobian of `F`,
//! followed by a projected Armijo search on `|Phi|^2 / 2`.  The linear
//! system goes through an LU factorisation with partial pivoting; a singular
//! `J_Phi` falls back to the minimum-norm least-squares step from an SVD.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use super::{ComplementaritySolver, McpFunction, McpSolution, SolveLimits, SolveStatus};
use super::natural_residual;
use crate::common::Result;

#[derive(Clone, PartialEq, Debug)]
pub struct NewtonConfig {
    /// Give up when the merit gradient is smaller than this while the
    /// residual is still above the requested tolerance.
    pub tolerance: f64,
    /// Relative step of the forward-difference Jacobian.
    pub fd_step: f64,
    /// Sufficient-decrease constant of the line search.
    pub armijo: f64,
    /// Smallest step length tried before falling back to steepest descent.
    pub min_step: f64,
    /// Singular values below this fraction of the largest are treated as
    /// zero in the least-squares step.
    pub rank_cutoff: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        NewtonConfig {
            tolerance: 1e-12,
            fd_step: 1e-7,
            armijo: 1e-4,
            min_step: 1e-10,
            rank_cutoff: 1e-12,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct NewtonSolver {
    pub config: NewtonConfig,
}

impl NewtonSolver {
    pub fn new() -> Self {
        Default::default()
    }
}

/// Generalised gradient of `phi` at `(a, b)`.
fn fb(a: f64, b: f64) -> (f64, f64, f64) {
    let r = (a * a + b * b).sqrt();
    if r < 1e-14 {
        let g = 1.0 - std::f64::consts::FRAC_1_SQRT_2;
        return (0.0, g, g);
    }
    (a + b - r, 1.0 - a / r, 1.0 - b / r)
}

/// `Phi_i` together with its partial derivatives in `x_i` and `F_i`.
fn reformulate(x: f64, f: f64, lower: f64, upper: f64) -> (f64, f64, f64) {
    let has_lower = lower.is_finite();
    let has_upper = upper.is_finite();
    if has_lower && has_upper && lower == upper {
        return (x - lower, 1.0, 0.0);
    }
    match (has_lower, has_upper) {
        (true, true) => {
            let (inner, ia, ib) = fb(upper - x, -f);
            let (outer, oa, ob) = fb(x - lower, -inner);
            (outer, oa + ob * ia, ob * ib)
        }
        (true, false) => {
            let (value, da, db) = fb(x - lower, f);
            (value, da, db)
        }
        (false, true) => {
            let (value, da, db) = fb(upper - x, -f);
            (-value, da, db)
        }
        (false, false) => (f, 0.0, 1.0),
    }
}

fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for i in 0..x.len() {
        if x[i] < lower[i] {
            x[i] = lower[i];
        }
        if x[i] > upper[i] {
            x[i] = upper[i];
        }
    }
}

fn all_finite(d: &DVector<f64>) -> bool {
    d.iter().all(|v| v.is_finite())
}

/// Solve `jac d = -phi`, or take the least-squares step when `jac` is
/// singular.
fn newton_direction(jac: &DMatrix<f64>, phi: &DVector<f64>, cutoff: f64) -> Option<DVector<f64>> {
    let rhs = phi.map(|v| -v);
    if let Some(d) = jac.clone().lu().solve(&rhs) {
        if all_finite(&d) {
            return Some(d);
        }
    }
    let svd = jac.clone().svd(true, true);
    let eps = cutoff * svd.singular_values.max();
    svd.solve(&rhs, eps).ok().filter(all_finite)
}

/// Current iterate with everything derived from it.
struct Point {
    x: Vec<f64>,
    f: Vec<f64>,
    phi: DVector<f64>,
    merit: f64,
    residual: f64,
}

struct State<'a> {
    problem: &'a dyn McpFunction,
    config: &'a NewtonConfig,
}

impl State<'_> {
    /// Evaluate at `x`, or `None` when `F` is undefined or not finite there.
    fn point(&self, x: Vec<f64>) -> Option<Point> {
        let n = x.len();
        let mut f = vec![0.0; n];
        self.problem.evaluate(&x, &mut f).ok()?;
        if f.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let (lower, upper) = (self.problem.lower(), self.problem.upper());
        let mut residual: f64 = 0.0;
        let phi = DVector::from_fn(n, |i, _| {
            residual = residual.max(natural_residual(x[i], f[i], lower[i], upper[i]));
            reformulate(x[i], f[i], lower[i], upper[i]).0
        });
        let merit = 0.5 * phi.norm_squared();
        Some(Point {
            x,
            f,
            phi,
            merit,
            residual,
        })
    }

    /// Forward-difference Jacobian of `F`, stepping backwards where a
    /// forward step would leave the box.
    fn jacobian_f(&self, p: &Point) -> Option<DMatrix<f64>> {
        let n = p.x.len();
        let upper = self.problem.upper();
        let mut jac = DMatrix::zeros(n, n);
        let mut shifted = vec![0.0; n];
        for j in 0..n {
            let mut h = self.config.fd_step * p.x[j].abs().max(1.0);
            if p.x[j] + h > upper[j] {
                h = -h;
            }
            let mut x = p.x.clone();
            x[j] += h;
            self.problem.evaluate(&x, &mut shifted).ok()?;
            for i in 0..n {
                jac[(i, j)] = (shifted[i] - p.f[i]) / h;
            }
        }
        Some(jac)
    }

    /// Chain `J_F` through the reformulation: row `i` is scaled by
    /// `dPhi_i/dF_i` and `dPhi_i/dx_i` lands on the diagonal.
    fn jacobian_phi(&self, p: &Point, mut jac: DMatrix<f64>) -> DMatrix<f64> {
        let (lower, upper) = (self.problem.lower(), self.problem.upper());
        for i in 0..p.x.len() {
            let (_, dx, df) = reformulate(p.x[i], p.f[i], lower[i], upper[i]);
            jac.row_mut(i).scale_mut(df);
            jac[(i, i)] += dx;
        }
        jac
    }

    /// Backtrack from `base` along `d`, projecting each trial into the box.
    fn line_search(&self, base: &Point, d: &DVector<f64>, slope: f64) -> Option<Point> {
        let (lower, upper) = (self.problem.lower(), self.problem.upper());
        let mut t = 1.0;
        while t >= self.config.min_step {
            let mut x: Vec<f64> = base.x.iter().zip(d.iter()).map(|(x, d)| x + t * d).collect();
            project(&mut x, lower, upper);
            if let Some(trial) = self.point(x) {
                if trial.merit <= base.merit + self.config.armijo * t * slope {
                    return Some(trial);
                }
            }
            t *= 0.5;
        }
        None
    }
}

fn finish(p: Point, status: SolveStatus, iterations: usize) -> McpSolution {
    McpSolution {
        status,
        iterations,
        levels: p.x,
        marginals: p.f,
        residual: p.residual,
    }
}

impl ComplementaritySolver for NewtonSolver {
    fn solve(
        &self,
        problem: &dyn McpFunction,
        start: &[f64],
        limits: &SolveLimits,
    ) -> Result<McpSolution> {
        let started = Instant::now();
        let state = State {
            problem,
            config: &self.config,
        };

        let mut x = start.to_vec();
        project(&mut x, problem.lower(), problem.upper());
        let mut f = vec![0.0; x.len()];
        // surface evaluation errors at the starting point to the caller
        problem.evaluate(&x, &mut f)?;
        let Some(mut current) = state.point(x) else {
            let x = start.to_vec();
            return Ok(McpSolution {
                status: SolveStatus::Failed("F is not finite at the starting point".to_owned()),
                iterations: 0,
                marginals: f,
                residual: f64::INFINITY,
                levels: x,
            });
        };

        for iteration in 0..limits.iteration_limit {
            if current.residual <= limits.tolerance {
                return Ok(finish(current, SolveStatus::Solved, iteration));
            }
            if let Some(limit) = limits.time_limit {
                if started.elapsed() >= limit {
                    return Ok(finish(current, SolveStatus::TimeLimit, iteration));
                }
            }

            let Some(jf) = state.jacobian_f(&current) else {
                let reason = "F is undefined near the current point".to_owned();
                return Ok(finish(current, SolveStatus::Failed(reason), iteration));
            };
            let jac = state.jacobian_phi(&current, jf);
            let gradient = jac.tr_mul(&current.phi);
            let gnorm = gradient.norm();
            if gnorm <= self.config.tolerance {
                let reason = format!("stationary point of the merit function (|grad| = {gnorm:e})");
                return Ok(finish(current, SolveStatus::Failed(reason), iteration));
            }

            let mut next = None;
            if let Some(d) = newton_direction(&jac, &current.phi, self.config.rank_cutoff) {
                let slope = gradient.dot(&d);
                if slope < 0.0 {
                    next = state.line_search(&current, &d, slope);
                }
            }
            if next.is_none() {
                let d = gradient.map(|g| -g);
                next = state.line_search(&current, &d, -gnorm * gnorm);
            }

            match next {
                Some(point) => current = point,
                None => {
                    let reason = "line search failed".to_owned();
                    return Ok(finish(current, SolveStatus::Failed(reason), iteration));
                }
            }
            tracing::debug!(
                component = "solver",
                operation = "newton_step",
                iteration = iteration + 1,
                residual = current.residual,
                merit = current.merit,
                "Newton iteration"
            );
        }

        let iterations = limits.iteration_limit;
        let status = if current.residual <= limits.tolerance {
            SolveStatus::Solved
        } else {
            SolveStatus::IterationLimit
        };
        Ok(finish(current, status, iterations))
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::common::ErrorCode;
    use crate::eval_err;

    /// `F(x) = M x + q` over `[lower, upper]`.
    struct Linear {
        m: Vec<Vec<f64>>,
        q: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    }

    impl McpFunction for Linear {
        fn dim(&self) -> usize {
            self.q.len()
        }
        fn lower(&self) -> &[f64] {
            &self.lower
        }
        fn upper(&self) -> &[f64] {
            &self.upper
        }
        fn evaluate(&self, x: &[f64], out: &mut [f64]) -> Result<()> {
            for (i, row) in self.m.iter().enumerate() {
                out[i] = self.q[i] + row.iter().zip(x).map(|(a, x)| a * x).sum::<f64>();
            }
            Ok(())
        }
    }

    #[test]
    fn test_fb_function() {
        assert_eq!(0.0, fb(0.0, 3.0).0);
        assert_eq!(0.0, fb(2.0, 0.0).0);
        assert!(fb(-1.0, 1.0).0 < 0.0);
        assert!(fb(1.0, 1.0).0 > 0.0);
        // box with both bounds: x at the upper bound with F < 0 is complementary
        assert!(reformulate(5.0, -2.0, 0.0, 5.0).0.abs() < 1e-12);
        assert!(reformulate(0.0, 2.0, 0.0, 5.0).0.abs() < 1e-12);
        assert!(reformulate(2.0, 0.0, 0.0, 5.0).0.abs() < 1e-12);
        assert!(reformulate(2.0, 1.0, 0.0, 5.0).0.abs() > 0.1);
    }

    #[test]
    fn test_linear_complementarity() {
        // F = [2 1; 1 2] x + [-5, 1], x >= 0: x = (2.5, 0), F = (0, 3.5)
        let problem = Linear {
            m: vec![vec![2.0, 1.0], vec![1.0, 2.0]],
            q: vec![-5.0, 1.0],
            lower: vec![0.0, 0.0],
            upper: vec![f64::INFINITY, f64::INFINITY],
        };
        let solution = NewtonSolver::new()
            .solve(&problem, &[1.0, 1.0], &SolveLimits::default())
            .unwrap();
        assert_eq!(SolveStatus::Solved, solution.status);
        assert!(approx_eq!(f64, 2.5, solution.levels[0], epsilon = 1e-6));
        assert!(approx_eq!(f64, 0.0, solution.levels[1], epsilon = 1e-6));
        assert!(approx_eq!(f64, 3.5, solution.marginals[1], epsilon = 1e-5));
    }

    #[test]
    fn test_upper_bound_and_free() {
        // x0 in [0, 1] wants to be 3; x1 free solves x1 - x0 = 0
        let problem = Linear {
            m: vec![vec![1.0, 0.0], vec![-1.0, 1.0]],
            q: vec![-3.0, 0.0],
            lower: vec![0.0, f64::NEG_INFINITY],
            upper: vec![1.0, f64::INFINITY],
        };
        let solution = NewtonSolver::new()
            .solve(&problem, &[0.5, 0.0], &SolveLimits::default())
            .unwrap();
        assert!(solution.status.is_solved());
        assert!(approx_eq!(f64, 1.0, solution.levels[0], epsilon = 1e-6));
        assert!(approx_eq!(f64, 1.0, solution.levels[1], epsilon = 1e-6));
    }

    #[test]
    fn test_zero_iterations() {
        let problem = Linear {
            m: vec![vec![1.0]],
            q: vec![-2.0],
            lower: vec![0.0],
            upper: vec![f64::INFINITY],
        };
        let limits = SolveLimits {
            iteration_limit: 0,
            ..Default::default()
        };
        let solver = NewtonSolver::new();
        let at_solution = solver.solve(&problem, &[2.0], &limits).unwrap();
        assert_eq!(SolveStatus::Solved, at_solution.status);
        assert_eq!(0, at_solution.iterations);

        let elsewhere = solver.solve(&problem, &[1.0], &limits).unwrap();
        assert_eq!(SolveStatus::IterationLimit, elsewhere.status);
        assert_eq!(vec![1.0], elsewhere.levels);
        assert!(approx_eq!(f64, 1.0, elsewhere.residual, epsilon = 1e-12));
    }

    #[test]
    fn test_badly_scaled_rows() {
        // rows nine and five orders of magnitude away from one; x = (1, 1)
        let free = f64::NEG_INFINITY;
        let problem = Linear {
            m: vec![vec![1e9, 0.0], vec![0.0, 1e-5]],
            q: vec![-1e9, -1e-5],
            lower: vec![free, free],
            upper: vec![f64::INFINITY, f64::INFINITY],
        };
        let limits = SolveLimits {
            tolerance: 1e-6,
            ..Default::default()
        };
        let solution = NewtonSolver::new().solve(&problem, &[0.0, 0.0], &limits).unwrap();
        assert_eq!(SolveStatus::Solved, solution.status);
        assert!(solution.iterations < 10);
        assert!(approx_eq!(f64, 1.0, solution.levels[0], epsilon = 1e-9));
        assert!(approx_eq!(f64, 1.0, solution.levels[1], epsilon = 1e-6));
    }

    #[test]
    fn test_time_limit() {
        let problem = Linear {
            m: vec![vec![1.0]],
            q: vec![-2.0],
            lower: vec![0.0],
            upper: vec![f64::INFINITY],
        };
        let limits = SolveLimits {
            time_limit: Some(std::time::Duration::ZERO),
            ..Default::default()
        };
        let solution = NewtonSolver::new().solve(&problem, &[1.0], &limits).unwrap();
        assert_eq!(SolveStatus::TimeLimit, solution.status);
        assert_eq!(0, solution.iterations);
        assert_eq!(vec![1.0], solution.levels);
    }

    struct Undefined;

    impl McpFunction for Undefined {
        fn dim(&self) -> usize {
            1
        }
        fn lower(&self) -> &[f64] {
            &[0.0]
        }
        fn upper(&self) -> &[f64] {
            &[f64::INFINITY]
        }
        fn evaluate(&self, _x: &[f64], _out: &mut [f64]) -> Result<()> {
            eval_err!(DivisionByZero, "test".to_owned())
        }
    }

    #[test]
    fn test_start_point_error() {
        let err = NewtonSolver::new()
            .solve(&Undefined, &[1.0], &SolveLimits::default())
            .unwrap_err();
        assert_eq!(ErrorCode::DivisionByZero, err.code);
    }
}
