// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Grounding of indexed expressions.
//!
//! An [`Expr`] is checked once against the [`DataModel`] when an equation
//! is declared, then grounded per index tuple into a [`Ground`] tree in
//! which parameters and non-column variables have been replaced by their
//! current values.  Solvers work exclusively on ground trees.

use std::collections::{BTreeMap, HashMap};

use smallvec::SmallVec;

use crate::common::{Ident, Key, Label, Result, format_key};
use crate::datamodel::{DataModel, Equation};
use crate::expr::{BinaryOp, Cond, EqnAttr, Expr, Index, Relation, Sense, UnaryOp, VarAttr};
use crate::{data_err, eval_err, model_err};

/// Values of the index names currently under control.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Binding {
    entries: SmallVec<[(Ident, Label); 4]>,
}

impl Binding {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_key(indices: &[Ident], key: &[Label]) -> Self {
        Binding {
            entries: indices.iter().cloned().zip(key.iter().cloned()).collect(),
        }
    }

    pub fn with<S: AsRef<str>>(mut self, index: &str, label: S) -> Self {
        self.push(index, label.as_ref());
        self
    }

    pub fn get(&self, index: &str) -> Option<&Label> {
        self.entries
            .iter()
            .rev()
            .find(|(name, _)| name == index)
            .map(|(_, label)| label)
    }

    fn push(&mut self, index: &str, label: &str) {
        self.entries.push((index.to_owned(), label.to_owned()));
    }

    fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn names(&self) -> Vec<Ident> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }
}

/// Variable instances that are unknowns of the problem being built.  Any
/// level reference outside this map grounds to the variable's current level.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Columns {
    index: HashMap<Ident, HashMap<Key, usize>>,
    entries: Vec<(Ident, Key)>,
}

impl Columns {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, name: &str, key: Key) -> usize {
        let next = self.entries.len();
        let slots = self.index.entry(name.to_owned()).or_default();
        if let Some(&existing) = slots.get(&key) {
            return existing;
        }
        slots.insert(key.clone(), next);
        self.entries.push((name.to_owned(), key));
        next
    }

    pub fn get(&self, name: &str, key: &[Label]) -> Option<usize> {
        self.index.get(name)?.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Ident, Key)] {
        &self.entries
    }
}

/// An expression with every index resolved and every non-column symbol
/// replaced by its value.
#[derive(Clone, PartialEq, Debug)]
pub enum Ground {
    Const(f64),
    Col(usize),
    Op1(UnaryOp, Box<Ground>),
    Op2(BinaryOp, Box<Ground>, Box<Ground>),
    Sum(Vec<Ground>),
}

fn apply2(op: BinaryOp, l: f64, r: f64) -> Result<f64> {
    let value = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return eval_err!(DivisionByZero, format!("{l} / 0"));
            }
            l / r
        }
    };
    Ok(value)
}

impl Ground {
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Ground::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn eval(&self, x: &[f64]) -> Result<f64> {
        match self {
            Ground::Const(v) => Ok(*v),
            Ground::Col(j) => Ok(x[*j]),
            Ground::Op1(UnaryOp::Negative, e) => Ok(-e.eval(x)?),
            Ground::Op2(op, l, r) => apply2(*op, l.eval(x)?, r.eval(x)?),
            Ground::Sum(terms) => {
                let mut total = 0.0;
                for term in terms.iter() {
                    total += term.eval(x)?;
                }
                Ok(total)
            }
        }
    }

    /// Extract `constant + sum(coeff * x)`, failing on anything that is not
    /// linear in the columns.
    pub fn linearize(&self) -> Result<Affine> {
        match self {
            Ground::Const(v) => Ok(Affine::constant(*v)),
            Ground::Col(j) => {
                let mut affine = Affine::constant(0.0);
                affine.coeffs.insert(*j, 1.0);
                Ok(affine)
            }
            Ground::Op1(UnaryOp::Negative, e) => Ok(e.linearize()?.scale(-1.0)),
            Ground::Op2(op, l, r) => {
                let l = l.linearize()?;
                let r = r.linearize()?;
                match op {
                    BinaryOp::Add => Ok(l.add(&r, 1.0)),
                    BinaryOp::Sub => Ok(l.add(&r, -1.0)),
                    BinaryOp::Mul if l.is_constant() => Ok(r.scale(l.constant)),
                    BinaryOp::Mul if r.is_constant() => Ok(l.scale(r.constant)),
                    BinaryOp::Div if r.is_constant() => {
                        if r.constant == 0.0 {
                            return eval_err!(DivisionByZero, "linear term / 0".to_owned());
                        }
                        Ok(l.scale(1.0 / r.constant))
                    }
                    _ => model_err!(
                        NonlinearLp,
                        "product or quotient of decision variables".to_owned()
                    ),
                }
            }
            Ground::Sum(terms) => {
                let mut total = Affine::constant(0.0);
                for term in terms.iter() {
                    total = total.add(&term.linearize()?, 1.0);
                }
                Ok(total)
            }
        }
    }

    fn op1(op: UnaryOp, e: Ground) -> Ground {
        match e {
            Ground::Const(v) => Ground::Const(-v),
            e => Ground::Op1(op, Box::new(e)),
        }
    }

    fn op2(op: BinaryOp, l: Ground, r: Ground) -> Result<Ground> {
        match (&l, &r) {
            (Ground::Const(a), Ground::Const(b)) => Ok(Ground::Const(apply2(op, *a, *b)?)),
            (_, Ground::Const(b)) if op == BinaryOp::Div && *b == 0.0 => {
                eval_err!(DivisionByZero, "division by a zero-valued parameter".to_owned())
            }
            _ => Ok(Ground::Op2(op, Box::new(l), Box::new(r))),
        }
    }
}

/// A linear form over problem columns.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Affine {
    pub constant: f64,
    pub coeffs: BTreeMap<usize, f64>,
}

impl Affine {
    fn constant(value: f64) -> Self {
        Affine {
            constant: value,
            coeffs: BTreeMap::new(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.values().all(|c| *c == 0.0)
    }

    fn scale(mut self, factor: f64) -> Self {
        self.constant *= factor;
        for c in self.coeffs.values_mut() {
            *c *= factor;
        }
        self
    }

    fn add(mut self, other: &Affine, sign: f64) -> Self {
        self.constant += sign * other.constant;
        for (j, c) in other.coeffs.iter() {
            *self.coeffs.entry(*j).or_insert(0.0) += sign * c;
        }
        self
    }
}

/// One grounded instance of an equation.
#[derive(Clone, PartialEq, Debug)]
pub struct GroundRelation {
    pub lhs: Ground,
    pub sense: Sense,
    pub rhs: Ground,
}

impl GroundRelation {
    /// `lhs - rhs`
    pub fn level(&self, x: &[f64]) -> Result<f64> {
        Ok(self.lhs.eval(x)? - self.rhs.eval(x)?)
    }
}

fn resolve(index: &Index, binding: &Binding) -> Result<Label> {
    match index {
        Index::Elem(label) => Ok(label.clone()),
        Index::Var(name) => match binding.get(name) {
            Some(label) => Ok(label.clone()),
            None => model_err!(UnboundIndex, format!("index '{name}' is not controlled")),
        },
    }
}

fn resolve_key(idx: &[Index], binding: &Binding) -> Result<Key> {
    idx.iter().map(|i| resolve(i, binding)).collect()
}

impl DataModel {
    /// Check that every reference in `expr` names an existing symbol with
    /// the right arity, and that each position is addressed by an index
    /// over the declared set or by a member of it.
    pub(crate) fn check_expr(&self, expr: &Expr, scope: &mut Vec<Ident>) -> Result<()> {
        match expr {
            Expr::Const(_) => Ok(()),
            Expr::Param(name, idx) => {
                let domain = &self.parameter(name)?.domain;
                self.check_indices(name, domain, idx, scope)
            }
            Expr::Var(name, idx, _) => {
                let domain = &self.variable(name)?.domain;
                self.check_indices(name, domain, idx, scope)
            }
            Expr::Eqn(name, idx, _) => {
                let domain = &self.equation(name)?.domain;
                self.check_indices(name, domain, idx, scope)
            }
            Expr::Op1(_, e) => self.check_expr(e, scope),
            Expr::Op2(_, l, r) => {
                self.check_expr(l, scope)?;
                self.check_expr(r, scope)
            }
            Expr::Sum(over, filter, body) => {
                let depth = scope.len();
                for index in over.iter() {
                    self.index_set_name(index)?;
                    if scope.contains(index) {
                        return model_err!(
                            Generic,
                            format!("sum over '{index}' which is already controlled")
                        );
                    }
                    scope.push(index.clone());
                }
                if let Some(filter) = filter {
                    self.check_cond(filter, scope)?;
                }
                self.check_expr(body, scope)?;
                scope.truncate(depth);
                Ok(())
            }
        }
    }

    fn check_cond(&self, cond: &Cond, scope: &mut Vec<Ident>) -> Result<()> {
        match cond {
            Cond::In(relation, idx) => {
                let set = self.set(relation)?;
                let domain = if set.is_relation() {
                    set.domain.clone()
                } else {
                    vec![set.name.clone()]
                };
                self.check_indices(relation, &domain, idx, scope)
            }
            Cond::NonZero(e) => self.check_expr(e, scope),
            Cond::Not(c) => self.check_cond(c, scope),
            Cond::And(a, b) | Cond::Or(a, b) => {
                self.check_cond(a, scope)?;
                self.check_cond(b, scope)
            }
        }
    }

    fn check_indices(
        &self,
        name: &str,
        domain: &[Ident],
        idx: &[Index],
        scope: &[Ident],
    ) -> Result<()> {
        if domain.len() != idx.len() {
            return data_err!(
                ArityMismatch,
                format!(
                    "'{name}' has {} domain sets but is referenced with {} indices",
                    domain.len(),
                    idx.len()
                )
            );
        }
        for (set, index) in domain.iter().zip(idx.iter()) {
            match index {
                Index::Elem(label) => {
                    if !self.set(set)?.contains_label(label) {
                        return data_err!(
                            NotInDomain,
                            format!("{name}: '{label}' is not in set '{set}'")
                        );
                    }
                }
                Index::Var(index) => {
                    if !scope.contains(index) {
                        return model_err!(
                            UnboundIndex,
                            format!("index '{index}' in reference to '{name}' is not controlled")
                        );
                    }
                    let over = self.index_set_name(index)?;
                    if over != set {
                        return model_err!(
                            MismatchedDomains,
                            format!(
                                "{name}: index '{index}' ranges over '{over}', expected '{set}'"
                            )
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate an equation body against its declared indices.  Each side
    /// is either scalar or carries exactly the other side's free indices,
    /// and together they must cover the declaration.
    pub(crate) fn check_relation(
        &self,
        name: &str,
        indices: &[Ident],
        relation: &Relation,
    ) -> Result<()> {
        let mut scope = indices.to_vec();
        self.check_expr(&relation.lhs, &mut scope)?;
        self.check_expr(&relation.rhs, &mut scope)?;

        let lhs = relation.lhs.free_indices();
        let rhs = relation.rhs.free_indices();
        if !lhs.is_empty() && !rhs.is_empty() && lhs != rhs {
            return model_err!(
                MismatchedDomains,
                format!("{name}: sides are indexed over {lhs:?} and {rhs:?}")
            );
        }
        let used: std::collections::BTreeSet<_> = lhs.union(&rhs).cloned().collect();
        let declared: std::collections::BTreeSet<_> = indices.iter().cloned().collect();
        if used != declared || declared.len() != indices.len() {
            return model_err!(
                MismatchedDomains,
                format!("{name}: declared over {indices:?} but the body uses {used:?}")
            );
        }
        Ok(())
    }

    fn cond_holds(&self, cond: &Cond, binding: &mut Binding) -> Result<bool> {
        match cond {
            Cond::In(relation, idx) => {
                let key = resolve_key(idx, binding)?;
                Ok(self.set(relation)?.contains(&key))
            }
            Cond::NonZero(e) => {
                let value = self.ground(e, binding, None)?;
                match value.as_const() {
                    Some(v) => Ok(v != 0.0),
                    None => model_err!(Generic, "non-constant filter".to_owned()),
                }
            }
            Cond::Not(c) => Ok(!self.cond_holds(c, binding)?),
            Cond::And(a, b) => Ok(self.cond_holds(a, binding)? && self.cond_holds(b, binding)?),
            Cond::Or(a, b) => Ok(self.cond_holds(a, binding)? || self.cond_holds(b, binding)?),
        }
    }

    /// Ground `expr` under `binding`.  With `columns`, level references to
    /// listed variable instances become problem columns.
    pub fn ground(
        &self,
        expr: &Expr,
        binding: &mut Binding,
        columns: Option<&Columns>,
    ) -> Result<Ground> {
        let ground = match expr {
            Expr::Const(v) => Ground::Const(*v),
            Expr::Param(name, idx) => {
                let key = resolve_key(idx, binding)?;
                Ground::Const(self.parameter(name)?.get(&key))
            }
            Expr::Var(name, idx, attr) => {
                let key = resolve_key(idx, binding)?;
                let column = match attr {
                    VarAttr::Level => columns.and_then(|c| c.get(name, &key)),
                    _ => None,
                };
                match column {
                    Some(j) => Ground::Col(j),
                    None => {
                        let state = self.variable(name)?.state(&key);
                        Ground::Const(match attr {
                            VarAttr::Level => state.level,
                            VarAttr::Marginal => state.marginal,
                            VarAttr::Lower => state.lower,
                            VarAttr::Upper => state.upper,
                        })
                    }
                }
            }
            Expr::Eqn(name, idx, attr) => {
                let key = resolve_key(idx, binding)?;
                let state = self.equation(name)?.state(&key);
                Ground::Const(match attr {
                    EqnAttr::Level => state.level,
                    EqnAttr::Marginal => state.marginal,
                })
            }
            Expr::Op1(op, e) => Ground::op1(*op, self.ground(e, binding, columns)?),
            Expr::Op2(op, l, r) => {
                let l = self.ground(l, binding, columns)?;
                let r = self.ground(r, binding, columns)?;
                Ground::op2(*op, l, r)?
            }
            Expr::Sum(over, filter, body) => {
                let sets = over
                    .iter()
                    .map(|i| self.index_set_name(i).map(|s| s.to_owned()))
                    .collect::<Result<Vec<_>>>()?;
                let depth = binding.len();
                let mut constant = 0.0;
                let mut terms = vec![];
                for tuple in self.domain_tuples(&sets)? {
                    for (index, label) in over.iter().zip(tuple.iter()) {
                        binding.push(index, label);
                    }
                    let include = match filter {
                        Some(filter) => self.cond_holds(filter, binding)?,
                        None => true,
                    };
                    if include {
                        match self.ground(body, binding, columns)? {
                            Ground::Const(v) => constant += v,
                            term => terms.push(term),
                        }
                    }
                    binding.truncate(depth);
                }
                if terms.is_empty() {
                    Ground::Const(constant)
                } else {
                    if constant != 0.0 {
                        terms.push(Ground::Const(constant));
                    }
                    Ground::Sum(terms)
                }
            }
        };
        Ok(ground)
    }

    /// Ground one instance of an equation.
    pub fn ground_equation(
        &self,
        equation: &Equation,
        key: &[Label],
        columns: Option<&Columns>,
    ) -> Result<GroundRelation> {
        let mut binding = Binding::from_key(&equation.indices, key);
        let relation = &equation.relation;
        let lhs = self.ground(&relation.lhs, &mut binding, columns);
        let rhs = self.ground(&relation.rhs, &mut binding, columns);
        let annotate = |mut err: crate::common::Error| {
            err.details = Some(format!(
                "{}{}: {}",
                equation.name,
                format_key(key),
                err.details.unwrap_or_default()
            ));
            err
        };
        Ok(GroundRelation {
            lhs: lhs.map_err(annotate)?,
            sense: relation.sense,
            rhs: rhs.map_err(annotate)?,
        })
    }

    /// Evaluate a scalar expression at the current state of the data model.
    pub fn evaluate(&self, expr: &Expr) -> Result<f64> {
        self.evaluate_at(expr, &Binding::new())
    }

    /// Evaluate an expression whose free indices are all fixed by `binding`.
    pub fn evaluate_at(&self, expr: &Expr, binding: &Binding) -> Result<f64> {
        let mut scope = binding.names();
        self.check_expr(expr, &mut scope)?;
        let mut binding = binding.clone();
        match self.ground(expr, &mut binding, None)?.as_const() {
            Some(v) => Ok(v),
            None => eval_err!(Generic, "expression did not reduce to a value".to_owned()),
        }
    }

    fn evaluate_over(
        &self,
        target: &str,
        target_domain: &[Ident],
        indices: &[&str],
        expr: &Expr,
    ) -> Result<Vec<(Key, f64)>> {
        let indices: Vec<Ident> = indices.iter().map(|i| (*i).to_owned()).collect();
        let sets = indices
            .iter()
            .map(|i| self.index_set_name(i).map(|s| s.to_owned()))
            .collect::<Result<Vec<_>>>()?;
        if sets != target_domain {
            return model_err!(
                MismatchedDomains,
                format!("{target} is declared over {target_domain:?}, assigned over {sets:?}")
            );
        }
        let mut scope = indices.clone();
        self.check_expr(expr, &mut scope)?;

        let mut records = vec![];
        for key in self.domain_tuples(&sets)? {
            let mut binding = Binding::from_key(&indices, &key);
            let ground = self.ground(expr, &mut binding, None).map_err(|mut err| {
                let details = err.details.take().unwrap_or_default();
                err.details = Some(format!("{target}{}: {details}", format_key(&key)));
                err
            })?;
            let value = match ground.as_const() {
                Some(v) => v,
                None => return eval_err!(Generic, format!("{target}{}", format_key(&key))),
            };
            if !value.is_finite() {
                return eval_err!(NonFinite, format!("{target}{} = {value}", format_key(&key)));
            }
            records.push((key, value));
        }
        Ok(records)
    }

    /// `name[indices] = expr` for every tuple of the domain.  All values are
    /// computed before the parameter is replaced.
    pub fn assign_parameter(&mut self, name: &str, indices: &[&str], expr: &Expr) -> Result<()> {
        let domain = self.parameter(name)?.domain.clone();
        let records = self.evaluate_over(name, &domain, indices, expr)?;
        tracing::debug!(
            component = "datamodel",
            operation = "assign_parameter",
            parameter = name,
            records = records.len(),
            "Assigned parameter"
        );
        let records = records.into_iter().filter(|(_, v)| *v != 0.0).collect();
        self.write_parameter(name, records, true)
    }

    /// `name.l[indices] = expr` for every tuple of the domain.
    pub fn assign_level(&mut self, name: &str, indices: &[&str], expr: &Expr) -> Result<()> {
        let domain = self.variable(name)?.domain.clone();
        let records = self.evaluate_over(name, &domain, indices, expr)?;
        self.write_levels(name, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, ErrorKind, key};
    use crate::datamodel::VarKind;
    use crate::expr::*;

    fn regions() -> DataModel {
        let mut data = DataModel::new();
        data.define_set("r", &["A", "B"]).unwrap();
        data.define_alias("rr", "r").unwrap();
        data.define_parameter(
            "flow",
            &["r", "rr"],
            &[(["A", "A"], 800.0), (["A", "B"], 200.0), (["B", "A"], 400.0), (["B", "B"], 1800.0)],
        )
        .unwrap();
        data.define_parameter("zero", &["r"], &[(["A"], 1.0)]).unwrap();
        data
    }

    #[test]
    fn test_column_sums() {
        let data = regions();
        let demand = sum(&["rr"], param("flow", &["rr", "r"]));
        let a = data.evaluate_at(&demand, &Binding::new().with("r", "A")).unwrap();
        let b = data.evaluate_at(&demand, &Binding::new().with("r", "B")).unwrap();
        assert_eq!(1200.0, a);
        assert_eq!(2000.0, b);
    }

    #[test]
    fn test_assign_parameter() {
        let mut data = regions();
        data.define_parameter::<[&str; 1], &str>("total", &["r"], &[]).unwrap();
        data.assign_parameter("total", &["r"], &sum(&["rr"], param("flow", &["r", "rr"])))
            .unwrap();
        assert_eq!(1000.0, data.param_value("total", &["A"]).unwrap());
        assert_eq!(2200.0, data.param_value("total", &["B"]).unwrap());

        let err = data
            .assign_parameter("total", &["rr"], &num(1.0).divide(param("zero", &["rr"])))
            .unwrap_err();
        assert_eq!(ErrorKind::Evaluation, err.kind);
        assert_eq!(ErrorCode::DivisionByZero, err.code);
        // untouched after the failed assignment
        assert_eq!(1000.0, data.param_value("total", &["A"]).unwrap());
    }

    #[test]
    fn test_filtered_sums() {
        let mut data = regions();
        data.define_relation("route", &["r", "rr"], &[["A", "B"], ["B", "A"]])
            .unwrap();

        // shipments that stay home
        let home = sum_where(
            &["rr"],
            member("route", &["r", "rr"]).not(),
            param("flow", &["r", "rr"]),
        );
        assert_eq!(800.0, data.evaluate_at(&home, &Binding::new().with("r", "A")).unwrap());
        assert_eq!(1800.0, data.evaluate_at(&home, &Binding::new().with("r", "B")).unwrap());

        // cross-border routes, or anything leaving a region where zero[r] is set
        let either = sum_where(
            &["r", "rr"],
            member("route", &["r", "rr"]).or(nonzero(param("zero", &["r"]))),
            param("flow", &["r", "rr"]),
        );
        assert_eq!(1400.0, data.evaluate(&either).unwrap());

        let both = sum_where(
            &["r", "rr"],
            member("route", &["r", "rr"]).and(nonzero(param("zero", &["r"]))),
            param("flow", &["r", "rr"]),
        );
        assert_eq!(200.0, data.evaluate(&both).unwrap());

        let unset = sum_where(
            &["rr"],
            nonzero(param("zero", &["rr"])).not(),
            param("flow", &["r", "rr"]),
        );
        assert_eq!(1800.0, data.evaluate_at(&unset, &Binding::new().with("r", "B")).unwrap());
    }

    #[test]
    fn test_reference_checks() {
        let data = regions();
        let err = data.evaluate(&param("flow", &["r"])).unwrap_err();
        assert_eq!(ErrorCode::ArityMismatch, err.code);

        let err = data.evaluate(&param("flow", &["r", "rr"])).unwrap_err();
        assert_eq!(ErrorCode::UnboundIndex, err.code);

        let err = data
            .evaluate(&param_at("flow", vec![el("A"), el("C")]))
            .unwrap_err();
        assert_eq!(ErrorKind::Domain, err.kind);
        assert_eq!(ErrorCode::NotInDomain, err.code);

        let err = data.evaluate(&scalar("missing")).unwrap_err();
        assert_eq!(ErrorCode::DoesNotExist, err.code);

        assert_eq!(400.0, data.evaluate(&param_at("flow", vec![el("B"), el("A")])).unwrap());
    }

    #[test]
    fn test_equation_domains() {
        let mut data = regions();
        data.define_variable("X", &["r", "rr"], VarKind::Positive).unwrap();
        data.define_variable("P", &["r"], VarKind::Positive).unwrap();

        // broadcasting a scalar side is fine
        data.define_equation("ok", &["r", "rr"], var("X", &["r", "rr"]).geq(num(1.0)))
            .unwrap();

        let err = data
            .define_equation("bad", &["r", "rr"], var("X", &["r", "rr"]).geq(var("P", &["r"])))
            .unwrap_err();
        assert_eq!(ErrorKind::ModelDefinition, err.kind);
        assert_eq!(ErrorCode::MismatchedDomains, err.code);

        let err = data
            .define_equation("unused", &["r", "rr"], var("P", &["r"]).geq(num(0.0)))
            .unwrap_err();
        assert_eq!(ErrorCode::MismatchedDomains, err.code);
    }

    #[test]
    fn test_linearize() {
        let mut data = regions();
        data.define_variable("X", &["r"], VarKind::Positive).unwrap();
        let mut columns = Columns::new();
        columns.insert("X", key(&["A"]));
        columns.insert("X", key(&["B"]));

        let cost = sum(&["r"], param("zero", &["r"]).plus(num(2.0)).times(var("X", &["r"])))
            .divide(num(2.0));
        let ground = data.ground(&cost, &mut Binding::new(), Some(&columns)).unwrap();
        let affine = ground.linearize().unwrap();
        assert_eq!(0.0, affine.constant);
        assert_eq!(Some(&1.5), affine.coeffs.get(&0));
        assert_eq!(Some(&1.0), affine.coeffs.get(&1));
        assert_eq!(3.5, ground.eval(&[1.0, 2.0]).unwrap());

        let square = var_at("X", vec![el("A")]).times(var_at("X", vec![el("B")]));
        let ground = data.ground(&square, &mut Binding::new(), Some(&columns)).unwrap();
        let err = ground.linearize().unwrap_err();
        assert_eq!(ErrorCode::NonlinearLp, err.code);
    }

    #[test]
    fn test_runtime_division() {
        let mut data = regions();
        data.define_variable("X", &[], VarKind::Free).unwrap();
        let mut columns = Columns::new();
        columns.insert("X", Key::new());
        let ground = data
            .ground(&num(1.0).divide(var("X", &[])), &mut Binding::new(), Some(&columns))
            .unwrap();
        assert_eq!(0.5, ground.eval(&[2.0]).unwrap());
        let err = ground.eval(&[0.0]).unwrap_err();
        assert_eq!(ErrorCode::DivisionByZero, err.code);
    }
}
