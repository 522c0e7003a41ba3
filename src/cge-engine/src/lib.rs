// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;
pub mod datamodel;
pub mod expr;
pub mod compiler;
pub mod table;

pub mod solver;
pub mod calibrate;
pub mod mcp;
pub mod scenario;

pub mod models;

pub use self::calibrate::{Backfill, Calibration, CalibrationReport, LpModel};
pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Key, Result};
pub use self::datamodel::{DataModel, Selector, VarKind};
pub use self::mcp::{ComplementarityModel, McpBuilder, SolveOptions, SolveResult};
pub use self::scenario::{
    BatchReport, Isolation, Mutation, ResultRecord, ResultSchema, Scenario, ScenarioRunner,
};
pub use self::solver::{MicroLpSolver, NewtonSolver, SolveStatus};
