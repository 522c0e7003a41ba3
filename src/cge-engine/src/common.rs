// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use smallvec::SmallVec;

/// Name of a set, parameter, variable, equation or index.
pub type Ident = String;

/// One element of a set.
pub type Label = String;

/// A tuple of set elements addressing one entry of an indexed symbol.
/// Scalars use the empty key.
pub type Key = SmallVec<[Label; 3]>;

pub fn key<S: AsRef<str>>(labels: &[S]) -> Key {
    labels.iter().map(|l| l.as_ref().to_owned()).collect()
}

pub fn format_key(key: &[Label]) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("[{}]", key.join(","))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    DuplicateSymbol,
    DuplicateElement,
    NotInDomain,
    ArityMismatch,
    UnboundIndex,
    DivisionByZero,
    NonFinite,
    MismatchedDomains,
    UndefinedSymbol,
    UnmatchedEquation,
    UnmatchedVariable,
    DuplicateMatch,
    InvalidBounds,
    NonlinearLp,
    Infeasible,
    Unbounded,
    SolverFailure,
    IterationLimit,
    TimeLimit,
    ReplicationFailed,
    BadTable,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            DuplicateSymbol => "duplicate_symbol",
            DuplicateElement => "duplicate_element",
            NotInDomain => "not_in_domain",
            ArityMismatch => "arity_mismatch",
            UnboundIndex => "unbound_index",
            DivisionByZero => "division_by_zero",
            NonFinite => "non_finite",
            MismatchedDomains => "mismatched_domains",
            UndefinedSymbol => "undefined_symbol",
            UnmatchedEquation => "unmatched_equation",
            UnmatchedVariable => "unmatched_variable",
            DuplicateMatch => "duplicate_match",
            InvalidBounds => "invalid_bounds",
            NonlinearLp => "nonlinear_lp",
            Infeasible => "infeasible",
            Unbounded => "unbounded",
            SolverFailure => "solver_failure",
            IterationLimit => "iteration_limit",
            TimeLimit => "time_limit",
            ReplicationFailed => "replication_failed",
            BadTable => "bad_table",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An index tuple outside its declared domain, or an unknown symbol.
    Domain,
    /// Numeric faults while evaluating an expression.
    Evaluation,
    /// Incomplete or inconsistent model structure; raised at build time.
    ModelDefinition,
    /// The calibration LP did not reach an optimum.
    Calibration,
    /// A complementarity solve ended without a solution.
    Solve,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    /// True for the only error class the scenario runner recovers from.
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::Solve
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Domain => "DomainError",
            ErrorKind::Evaluation => match self.code {
                ErrorCode::DivisionByZero => "DivisionByZeroError",
                _ => "EvaluationError",
            },
            ErrorKind::ModelDefinition => "ModelDefinitionError",
            ErrorKind::Calibration => "CalibrationError",
            ErrorKind::Solve => "SolveNonOptimal",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! data_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Domain, ErrorCode::$code, Some($str)))
    }};
}

#[macro_export]
macro_rules! eval_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Evaluation, ErrorCode::$code, Some($str)))
    }};
}

#[macro_export]
macro_rules! model_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::ModelDefinition,
            ErrorCode::$code,
            Some($str),
        ))
    }};
}

#[macro_export]
macro_rules! calib_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Calibration,
            ErrorCode::$code,
            Some($str),
        ))
    }};
}

#[macro_export]
macro_rules! solve_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Solve, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Solve, ErrorCode::$code, None))
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::new(
            ErrorKind::Domain,
            ErrorCode::NotInDomain,
            Some("vbar[wood]".to_owned()),
        );
        assert_eq!("DomainError{not_in_domain: vbar[wood]}", format!("{err}"));

        let err = Error::new(ErrorKind::Evaluation, ErrorCode::DivisionByZero, None);
        assert_eq!("DivisionByZeroError{division_by_zero}", format!("{err}"));

        let err = Error::new(ErrorKind::Solve, ErrorCode::IterationLimit, None);
        assert!(err.is_recoverable());
        let err = Error::new(ErrorKind::Calibration, ErrorCode::Infeasible, None);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_format_key() {
        assert_eq!("", format_key(&key::<&str>(&[])));
        assert_eq!("[a,b]", format_key(&key(&["a", "b"])));
    }
}
