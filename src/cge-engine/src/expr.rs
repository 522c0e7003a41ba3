// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Immutable indexed expression trees.
//!
//! Expressions are plain values assembled with the free functions in this
//! module (`param`, `var`, `sum_where`, ...) and the combinator methods on
//! [`Expr`].  Nothing here touches a [`crate::datamodel::DataModel`]; symbol
//! resolution and index checking happen in [`crate::compiler`].

use std::collections::BTreeSet;

use crate::common::{Ident, Label};

/// One position of a symbol reference: either an index name bound by an
/// enclosing equation domain or `Sum`, or a literal set element.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Index {
    Var(Ident),
    Elem(Label),
}

pub fn ix(name: &str) -> Index {
    Index::Var(name.to_owned())
}

pub fn el(label: &str) -> Index {
    Index::Elem(label.to_owned())
}

fn indices(names: &[&str]) -> Vec<Index> {
    names.iter().map(|n| ix(n)).collect()
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VarAttr {
    Level,
    Marginal,
    Lower,
    Upper,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EqnAttr {
    Level,
    Marginal,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Negative,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Filter applied to the iterations of a `Sum`.
#[derive(Clone, PartialEq, Debug)]
pub enum Cond {
    /// The indexed tuple is a member of the named relation.
    In(Ident, Vec<Index>),
    NonZero(Box<Expr>),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

impl Cond {
    pub fn and(self, other: Cond) -> Cond {
        Cond::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Cond) -> Cond {
        Cond::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Cond {
        Cond::Not(Box::new(self))
    }

    fn free_indices(&self, bound: &mut Vec<Ident>, out: &mut BTreeSet<Ident>) {
        match self {
            Cond::In(_, idx) => collect_indices(idx, bound, out),
            Cond::NonZero(e) => e.collect_free(bound, out),
            Cond::Not(c) => c.free_indices(bound, out),
            Cond::And(a, b) | Cond::Or(a, b) => {
                a.free_indices(bound, out);
                b.free_indices(bound, out);
            }
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Const(f64),
    Param(Ident, Vec<Index>),
    Var(Ident, Vec<Index>, VarAttr),
    Eqn(Ident, Vec<Index>, EqnAttr),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
    /// Sum over the listed indices, optionally filtered.
    Sum(Vec<Ident>, Option<Cond>, Box<Expr>),
}

pub fn num(value: f64) -> Expr {
    Expr::Const(value)
}

pub fn param(name: &str, idx: &[&str]) -> Expr {
    Expr::Param(name.to_owned(), indices(idx))
}

pub fn param_at(name: &str, idx: Vec<Index>) -> Expr {
    Expr::Param(name.to_owned(), idx)
}

pub fn scalar(name: &str) -> Expr {
    Expr::Param(name.to_owned(), vec![])
}

/// The level of a variable.
pub fn var(name: &str, idx: &[&str]) -> Expr {
    Expr::Var(name.to_owned(), indices(idx), VarAttr::Level)
}

pub fn var_at(name: &str, idx: Vec<Index>) -> Expr {
    Expr::Var(name.to_owned(), idx, VarAttr::Level)
}

pub fn var_attr(name: &str, idx: &[&str], attr: VarAttr) -> Expr {
    Expr::Var(name.to_owned(), indices(idx), attr)
}

pub fn marginal(name: &str, idx: &[&str]) -> Expr {
    var_attr(name, idx, VarAttr::Marginal)
}

pub fn eqn_level(name: &str, idx: &[&str]) -> Expr {
    Expr::Eqn(name.to_owned(), indices(idx), EqnAttr::Level)
}

pub fn eqn_marginal(name: &str, idx: &[&str]) -> Expr {
    Expr::Eqn(name.to_owned(), indices(idx), EqnAttr::Marginal)
}

pub fn sum(over: &[&str], body: Expr) -> Expr {
    Expr::Sum(over.iter().map(|s| (*s).to_owned()).collect(), None, Box::new(body))
}

pub fn sum_where(over: &[&str], filter: Cond, body: Expr) -> Expr {
    Expr::Sum(
        over.iter().map(|s| (*s).to_owned()).collect(),
        Some(filter),
        Box::new(body),
    )
}

/// `(idx...) in relation`
pub fn member(relation: &str, idx: &[&str]) -> Cond {
    Cond::In(relation.to_owned(), indices(idx))
}

pub fn nonzero(expr: Expr) -> Cond {
    Cond::NonZero(Box::new(expr))
}

impl Expr {
    fn op2(self, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Op2(op, Box::new(self), Box::new(rhs))
    }

    pub fn plus(self, rhs: Expr) -> Expr {
        self.op2(BinaryOp::Add, rhs)
    }

    pub fn minus(self, rhs: Expr) -> Expr {
        self.op2(BinaryOp::Sub, rhs)
    }

    pub fn times(self, rhs: Expr) -> Expr {
        self.op2(BinaryOp::Mul, rhs)
    }

    pub fn divide(self, rhs: Expr) -> Expr {
        self.op2(BinaryOp::Div, rhs)
    }

    pub fn negate(self) -> Expr {
        Expr::Op1(UnaryOp::Negative, Box::new(self))
    }

    pub fn geq(self, rhs: Expr) -> Relation {
        Relation::new(self, Sense::Geq, rhs)
    }

    pub fn leq(self, rhs: Expr) -> Relation {
        Relation::new(self, Sense::Leq, rhs)
    }

    pub fn equals(self, rhs: Expr) -> Relation {
        Relation::new(self, Sense::Eq, rhs)
    }

    /// Index names referenced but not bound by an enclosing `Sum`.
    pub fn free_indices(&self) -> BTreeSet<Ident> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut vec![], &mut out);
        out
    }

    fn collect_free(&self, bound: &mut Vec<Ident>, out: &mut BTreeSet<Ident>) {
        match self {
            Expr::Const(_) => {}
            Expr::Param(_, idx) | Expr::Var(_, idx, _) | Expr::Eqn(_, idx, _) => {
                collect_indices(idx, bound, out)
            }
            Expr::Op1(_, e) => e.collect_free(bound, out),
            Expr::Op2(_, l, r) => {
                l.collect_free(bound, out);
                r.collect_free(bound, out);
            }
            Expr::Sum(over, filter, body) => {
                let depth = bound.len();
                bound.extend(over.iter().cloned());
                if let Some(filter) = filter {
                    filter.free_indices(bound, out);
                }
                body.collect_free(bound, out);
                bound.truncate(depth);
            }
        }
    }

    /// Names of variables whose level this expression reads.
    pub fn level_references(&self, out: &mut BTreeSet<Ident>) {
        match self {
            Expr::Var(name, _, VarAttr::Level) => {
                out.insert(name.clone());
            }
            Expr::Const(_) | Expr::Param(..) | Expr::Var(..) | Expr::Eqn(..) => {}
            Expr::Op1(_, e) => e.level_references(out),
            Expr::Op2(_, l, r) => {
                l.level_references(out);
                r.level_references(out);
            }
            Expr::Sum(_, _, body) => body.level_references(out),
        }
    }
}

fn collect_indices(idx: &[Index], bound: &[Ident], out: &mut BTreeSet<Ident>) {
    for index in idx.iter() {
        if let Index::Var(name) = index {
            if !bound.contains(name) {
                out.insert(name.clone());
            }
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Sense {
    Geq,
    Leq,
    Eq,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Relation {
    pub lhs: Expr,
    pub sense: Sense,
    pub rhs: Expr,
}

impl Relation {
    pub fn new(lhs: Expr, sense: Sense, rhs: Expr) -> Self {
        Relation { lhs, sense, rhs }
    }

    pub fn level_references(&self) -> BTreeSet<Ident> {
        let mut out = BTreeSet::new();
        self.lhs.level_references(&mut out);
        self.rhs.level_references(&mut out);
        out
    }
}
