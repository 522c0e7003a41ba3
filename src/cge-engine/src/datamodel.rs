// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The indexed data model: sets, relations, parameters, variables and
//! equations, all owned by a single [`DataModel`] and addressed by name.
//!
//! Parameters are sparse: a domain-valid key that was never written reads
//! as `0.0`.  Every write is validated against the declared domain before
//! anything is stored, so a failing bulk write leaves the symbol untouched.

use std::collections::{HashMap, HashSet};

use crate::common::{Ident, Key, Label, Result, format_key};
use crate::expr::Relation;
use crate::{data_err, model_err};

/// An ordered collection of distinct tuples.  Primitive sets hold
/// one-element tuples; relations hold tuples over two or more parent sets.
#[derive(Clone, PartialEq, Debug)]
pub struct Set {
    pub name: Ident,
    /// Parent sets of a relation; empty for a primitive set.
    pub domain: Vec<Ident>,
    elements: Vec<Key>,
    members: HashSet<Key>,
}

impl Set {
    pub fn arity(&self) -> usize {
        if self.domain.is_empty() {
            1
        } else {
            self.domain.len()
        }
    }

    pub fn is_relation(&self) -> bool {
        !self.domain.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Key] {
        &self.elements
    }

    /// Labels of a primitive set, in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.elements.iter().map(|e| &e[0])
    }

    pub fn contains(&self, tuple: &[Label]) -> bool {
        self.members.contains(tuple)
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.members.contains(&Key::from_iter([label.to_owned()]))
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Parameter {
    pub name: Ident,
    pub domain: Vec<Ident>,
    values: HashMap<Key, f64>,
}

impl Parameter {
    /// Value at `key`, with the sparse default of zero.  The key is assumed
    /// to have been validated by the caller.
    pub fn get(&self, key: &[Label]) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    pub fn records(&self) -> impl Iterator<Item = (&Key, &f64)> {
        self.values.iter()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VarKind {
    Free,
    Positive,
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct VarState {
    pub level: f64,
    pub marginal: f64,
    pub lower: f64,
    pub upper: f64,
    pub fixed: bool,
}

impl VarState {
    fn initial(kind: VarKind) -> Self {
        let lower = match kind {
            VarKind::Free => f64::NEG_INFINITY,
            VarKind::Positive => 0.0,
        };
        VarState {
            level: 0.0,
            marginal: 0.0,
            lower,
            upper: f64::INFINITY,
            fixed: false,
        }
    }

    pub fn in_bounds(&self) -> bool {
        self.lower <= self.level && self.level <= self.upper
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Variable {
    pub name: Ident,
    pub domain: Vec<Ident>,
    pub kind: VarKind,
    states: HashMap<Key, VarState>,
}

impl Variable {
    pub fn state(&self, key: &[Label]) -> VarState {
        self.states
            .get(key)
            .copied()
            .unwrap_or_else(|| VarState::initial(self.kind))
    }

    pub fn level(&self, key: &[Label]) -> f64 {
        self.state(key).level
    }

    fn state_mut(&mut self, key: &Key) -> &mut VarState {
        let kind = self.kind;
        self.states
            .entry(key.clone())
            .or_insert_with(|| VarState::initial(kind))
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct EqnState {
    /// `lhs - rhs` at the most recent evaluation.
    pub level: f64,
    pub marginal: f64,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Equation {
    pub name: Ident,
    /// Index names the equation is declared over.
    pub indices: Vec<Ident>,
    /// The sets those indices range over.
    pub domain: Vec<Ident>,
    pub relation: Relation,
    states: HashMap<Key, EqnState>,
}

impl Equation {
    pub fn state(&self, key: &[Label]) -> EqnState {
        self.states.get(key).copied().unwrap_or_default()
    }

    pub(crate) fn set_state(&mut self, key: Key, state: EqnState) {
        self.states.insert(key, state);
    }
}

/// Which keys of a symbol an operation applies to.
#[derive(Clone, PartialEq, Debug)]
pub enum Selector {
    All,
    Key(Key),
}

impl Selector {
    pub fn key<S: AsRef<str>>(labels: &[S]) -> Self {
        Selector::Key(crate::common::key(labels))
    }

    pub fn scalar() -> Self {
        Selector::Key(Key::new())
    }
}

/// Prior values of specific parameter and variable keys, captured so a set
/// of mutations can be rolled back.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Snapshot {
    parameters: Vec<(Ident, Key, Option<f64>)>,
    variables: Vec<(Ident, Key, Option<VarState>)>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.variables.is_empty()
    }
}

#[derive(Clone, PartialEq, Debug)]
enum SymbolKind {
    Set,
    Alias,
    Parameter,
    Variable,
    Equation,
}

/// Owner of every symbol in a run.  Models refer to symbols by name and
/// read or write them through this type.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DataModel {
    sets: HashMap<Ident, Set>,
    /// index name -> set name; every set is also an index over itself
    indices: HashMap<Ident, Ident>,
    parameters: HashMap<Ident, Parameter>,
    variables: HashMap<Ident, Variable>,
    equations: HashMap<Ident, Equation>,
    symbols: HashMap<Ident, SymbolKind>,
}

impl DataModel {
    pub fn new() -> Self {
        Default::default()
    }

    fn declare(&mut self, name: &str, kind: SymbolKind) -> Result<()> {
        if name.is_empty() {
            return model_err!(Generic, "symbol names must be non-empty".to_owned());
        }
        if let Some(existing) = self.symbols.get(name) {
            return model_err!(
                DuplicateSymbol,
                format!("'{name}' is already declared as a {existing:?}")
            );
        }
        self.symbols.insert(name.to_owned(), kind);
        Ok(())
    }

    pub fn define_set<S: AsRef<str>>(&mut self, name: &str, elements: &[S]) -> Result<()> {
        let mut set = Set {
            name: name.to_owned(),
            domain: vec![],
            elements: Vec::with_capacity(elements.len()),
            members: HashSet::with_capacity(elements.len()),
        };
        for element in elements.iter() {
            let tuple = Key::from_iter([element.as_ref().to_owned()]);
            if !set.members.insert(tuple.clone()) {
                return data_err!(
                    DuplicateElement,
                    format!("'{}' appears twice in set '{name}'", element.as_ref())
                );
            }
            set.elements.push(tuple);
        }

        self.declare(name, SymbolKind::Set)?;
        tracing::debug!(
            component = "datamodel",
            operation = "define_set",
            set = name,
            size = set.len(),
            "Defined set"
        );
        self.indices.insert(name.to_owned(), name.to_owned());
        self.sets.insert(name.to_owned(), set);
        Ok(())
    }

    /// Declare `name` as an additional index ranging over `set`.
    pub fn define_alias(&mut self, name: &str, set: &str) -> Result<()> {
        let target = self.set(set)?;
        if target.is_relation() {
            return data_err!(
                ArityMismatch,
                format!("alias '{name}' must range over a primitive set, '{set}' is a relation")
            );
        }
        self.declare(name, SymbolKind::Alias)?;
        self.indices.insert(name.to_owned(), set.to_owned());
        Ok(())
    }

    pub fn define_relation<T, S>(&mut self, name: &str, domain: &[&str], tuples: &[T]) -> Result<()>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        if domain.len() < 2 {
            return data_err!(
                ArityMismatch,
                format!("relation '{name}' needs at least two parent sets")
            );
        }
        let domain = self.resolve_domain(name, domain)?;

        let mut set = Set {
            name: name.to_owned(),
            domain: domain.clone(),
            elements: Vec::with_capacity(tuples.len()),
            members: HashSet::with_capacity(tuples.len()),
        };
        for tuple in tuples.iter() {
            let tuple: Key = tuple.as_ref().iter().map(|l| l.as_ref().to_owned()).collect();
            self.validate_key(name, &domain, &tuple)?;
            if !set.members.insert(tuple.clone()) {
                return data_err!(
                    DuplicateElement,
                    format!("{} appears twice in relation '{name}'", format_key(&tuple))
                );
            }
            set.elements.push(tuple);
        }

        self.declare(name, SymbolKind::Set)?;
        tracing::debug!(
            component = "datamodel",
            operation = "define_relation",
            relation = name,
            size = set.len(),
            "Defined relation"
        );
        self.sets.insert(name.to_owned(), set);
        Ok(())
    }

    pub fn define_parameter<T, S>(
        &mut self,
        name: &str,
        domain: &[&str],
        records: &[(T, f64)],
    ) -> Result<()>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        let domain = self.resolve_domain(name, domain)?;

        let mut values = HashMap::with_capacity(records.len());
        for (tuple, value) in records.iter() {
            let tuple: Key = tuple.as_ref().iter().map(|l| l.as_ref().to_owned()).collect();
            self.validate_key(name, &domain, &tuple)?;
            values.insert(tuple, *value);
        }

        self.declare(name, SymbolKind::Parameter)?;
        tracing::debug!(
            component = "datamodel",
            operation = "define_parameter",
            parameter = name,
            records = values.len(),
            "Defined parameter"
        );
        self.parameters.insert(
            name.to_owned(),
            Parameter {
                name: name.to_owned(),
                domain,
                values,
            },
        );
        Ok(())
    }

    pub fn define_scalar(&mut self, name: &str, value: f64) -> Result<()> {
        let records: [([&str; 0], f64); 1] = [([], value)];
        self.define_parameter(name, &[], &records)
    }

    pub fn define_variable(&mut self, name: &str, domain: &[&str], kind: VarKind) -> Result<()> {
        let domain = self.resolve_domain(name, domain)?;
        self.declare(name, SymbolKind::Variable)?;
        tracing::debug!(
            component = "datamodel",
            operation = "define_variable",
            variable = name,
            kind = ?kind,
            "Defined variable"
        );
        self.variables.insert(
            name.to_owned(),
            Variable {
                name: name.to_owned(),
                domain,
                kind,
                states: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Declare an equation over the given index names.  The relation's free
    /// indices must exactly cover `indices`; see [`crate::compiler`].
    pub fn define_equation(
        &mut self,
        name: &str,
        indices: &[&str],
        relation: Relation,
    ) -> Result<()> {
        let indices: Vec<Ident> = indices.iter().map(|d| (*d).to_owned()).collect();
        let domain = indices
            .iter()
            .map(|index| self.index_set_name(index).map(|s| s.to_owned()))
            .collect::<Result<Vec<_>>>()?;
        self.check_relation(name, &indices, &relation)?;

        self.declare(name, SymbolKind::Equation)?;
        tracing::debug!(
            component = "datamodel",
            operation = "define_equation",
            equation = name,
            sense = ?relation.sense,
            "Defined equation"
        );
        self.equations.insert(
            name.to_owned(),
            Equation {
                name: name.to_owned(),
                indices,
                domain,
                relation,
                states: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Map the domain names of a declaration to set names.  Aliases stand
    /// for the set they range over; relations are not valid domains.
    fn resolve_domain(&self, name: &str, domain: &[&str]) -> Result<Vec<Ident>> {
        domain
            .iter()
            .map(|d| {
                if self.sets.get(*d).is_some_and(|s| s.is_relation()) {
                    return data_err!(
                        ArityMismatch,
                        format!("'{name}' is declared over relation '{d}'")
                    );
                }
                self.index_set_name(d).map(|s| s.to_owned())
            })
            .collect()
    }

    /// Check that `key` is a member of the Cartesian product of `domain`.
    pub fn validate_key(&self, name: &str, domain: &[Ident], key: &[Label]) -> Result<()> {
        if domain.len() != key.len() {
            return data_err!(
                ArityMismatch,
                format!(
                    "'{name}' has {} domain sets but was addressed with {}",
                    domain.len(),
                    format_key(key)
                )
            );
        }
        for (set, label) in domain.iter().zip(key.iter()) {
            if !self.set(set)?.contains_label(label) {
                return data_err!(
                    NotInDomain,
                    format!("{name}{}: '{label}' is not in set '{set}'", format_key(key))
                );
            }
        }
        Ok(())
    }

    /// Every tuple of the Cartesian product of `domain`, in set order.
    pub fn domain_tuples(&self, domain: &[Ident]) -> Result<Vec<Key>> {
        let mut tuples = vec![Key::new()];
        for set in domain.iter() {
            let set = self.set(set)?;
            let mut next = Vec::with_capacity(tuples.len() * set.len());
            for prefix in tuples.iter() {
                for label in set.labels() {
                    let mut tuple = prefix.clone();
                    tuple.push(label.clone());
                    next.push(tuple);
                }
            }
            tuples = next;
        }
        Ok(tuples)
    }

    pub fn set(&self, name: &str) -> Result<&Set> {
        match self.sets.get(name) {
            Some(set) => Ok(set),
            None => data_err!(DoesNotExist, format!("set '{name}'")),
        }
    }

    /// Name of the set an index ranges over.
    pub fn index_set_name(&self, index: &str) -> Result<&str> {
        match self.indices.get(index) {
            Some(set) => Ok(set.as_str()),
            None => data_err!(DoesNotExist, format!("index '{index}'")),
        }
    }

    pub fn parameter(&self, name: &str) -> Result<&Parameter> {
        match self.parameters.get(name) {
            Some(p) => Ok(p),
            None => data_err!(DoesNotExist, format!("parameter '{name}'")),
        }
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        match self.variables.get(name) {
            Some(v) => Ok(v),
            None => data_err!(DoesNotExist, format!("variable '{name}'")),
        }
    }

    pub fn equation(&self, name: &str) -> Result<&Equation> {
        match self.equations.get(name) {
            Some(e) => Ok(e),
            None => data_err!(DoesNotExist, format!("equation '{name}'")),
        }
    }

    pub(crate) fn variable_mut(&mut self, name: &str) -> Result<&mut Variable> {
        match self.variables.get_mut(name) {
            Some(v) => Ok(v),
            None => data_err!(DoesNotExist, format!("variable '{name}'")),
        }
    }

    pub(crate) fn equation_mut(&mut self, name: &str) -> Result<&mut Equation> {
        match self.equations.get_mut(name) {
            Some(e) => Ok(e),
            None => data_err!(DoesNotExist, format!("equation '{name}'")),
        }
    }

    /// Read a parameter value; keys inside the domain that were never
    /// written read as zero.
    pub fn param_value<S: AsRef<str>>(&self, name: &str, key: &[S]) -> Result<f64> {
        let param = self.parameter(name)?;
        let key = crate::common::key(key);
        self.validate_key(name, &param.domain, &key)?;
        Ok(param.get(&key))
    }

    pub fn scalar(&self, name: &str) -> Result<f64> {
        self.param_value::<&str>(name, &[])
    }

    pub fn set_parameter<S: AsRef<str>>(
        &mut self,
        name: &str,
        key: &[S],
        value: f64,
    ) -> Result<()> {
        let key = crate::common::key(key);
        self.write_parameter(name, vec![(key, value)], false)
    }

    /// Write a batch of records.  With `replace` the previous contents are
    /// discarded.  Nothing is written unless every key is valid.
    pub(crate) fn write_parameter(
        &mut self,
        name: &str,
        records: Vec<(Key, f64)>,
        replace: bool,
    ) -> Result<()> {
        let domain = self.parameter(name)?.domain.clone();
        for (key, _) in records.iter() {
            self.validate_key(name, &domain, key)?;
        }
        let Some(param) = self.parameters.get_mut(name) else {
            return data_err!(DoesNotExist, format!("parameter '{name}'"));
        };
        if replace {
            param.values.clear();
        }
        param.values.extend(records);
        Ok(())
    }

    fn selected_keys(&self, name: &str, domain: &[Ident], selector: &Selector) -> Result<Vec<Key>> {
        match selector {
            Selector::All => self.domain_tuples(domain),
            Selector::Key(key) => {
                self.validate_key(name, domain, key)?;
                Ok(vec![key.clone()])
            }
        }
    }

    pub fn set_parameter_at(&mut self, name: &str, selector: &Selector, value: f64) -> Result<()> {
        let domain = self.parameter(name)?.domain.clone();
        let keys = self.selected_keys(name, &domain, selector)?;
        self.write_parameter(name, keys.into_iter().map(|k| (k, value)).collect(), false)
    }

    pub fn scale_parameter(&mut self, name: &str, selector: &Selector, factor: f64) -> Result<()> {
        let param = self.parameter(name)?;
        let keys = self.selected_keys(name, &param.domain, selector)?;
        let records = keys
            .into_iter()
            .map(|k| {
                let value = param.get(&k) * factor;
                (k, value)
            })
            .collect();
        self.write_parameter(name, records, false)
    }

    fn update_variable<F>(&mut self, name: &str, selector: &Selector, mut update: F) -> Result<()>
    where
        F: FnMut(&mut VarState),
    {
        let domain = self.variable(name)?.domain.clone();
        let keys = self.selected_keys(name, &domain, selector)?;
        let var = self.variable_mut(name)?;
        for key in keys.iter() {
            update(var.state_mut(key));
        }
        Ok(())
    }

    pub fn set_level(&mut self, name: &str, selector: &Selector, level: f64) -> Result<()> {
        self.update_variable(name, selector, |state| state.level = level)
    }

    /// Set bounds and clear the fixed flag.  The level is left alone; the
    /// bound invariant is enforced at solve time.
    pub fn set_bounds(
        &mut self,
        name: &str,
        selector: &Selector,
        lower: f64,
        upper: f64,
    ) -> Result<()> {
        if lower > upper {
            return model_err!(
                InvalidBounds,
                format!("{name}: lower bound {lower} exceeds upper bound {upper}")
            );
        }
        self.update_variable(name, selector, |state| {
            state.lower = lower;
            state.upper = upper;
            state.fixed = false;
        })
    }

    pub fn fix(&mut self, name: &str, selector: &Selector, value: f64) -> Result<()> {
        self.update_variable(name, selector, |state| {
            state.level = value;
            state.lower = value;
            state.upper = value;
            state.fixed = true;
        })
    }

    /// Release a fixed variable back to the default bounds of its kind.
    pub fn unfix(&mut self, name: &str, selector: &Selector) -> Result<()> {
        let kind = self.variable(name)?.kind;
        self.update_variable(name, selector, |state| {
            let initial = VarState::initial(kind);
            state.lower = initial.lower;
            state.upper = initial.upper;
            state.fixed = false;
        })
    }

    pub(crate) fn write_levels(&mut self, name: &str, records: Vec<(Key, f64)>) -> Result<()> {
        let var = self.variable(name)?;
        for (key, _) in records.iter() {
            self.validate_key(name, &var.domain, key)?;
        }
        let var = self.variable_mut(name)?;
        for (key, level) in records.iter() {
            var.state_mut(key).level = *level;
        }
        Ok(())
    }

    pub(crate) fn write_var_solution(
        &mut self,
        name: &str,
        key: &Key,
        level: f64,
        marginal: f64,
    ) -> Result<()> {
        let state = self.variable_mut(name)?.state_mut(key);
        state.level = level;
        state.marginal = marginal;
        Ok(())
    }

    /// Capture the current values of the selected parameter keys.
    pub fn snapshot_parameter(
        &self,
        snapshot: &mut Snapshot,
        name: &str,
        selector: &Selector,
    ) -> Result<()> {
        let param = self.parameter(name)?;
        for key in self.selected_keys(name, &param.domain, selector)? {
            let prior = param.values.get(&key).copied();
            snapshot.parameters.push((name.to_owned(), key, prior));
        }
        Ok(())
    }

    /// Capture the current state of the selected variable keys.
    pub fn snapshot_variable(
        &self,
        snapshot: &mut Snapshot,
        name: &str,
        selector: &Selector,
    ) -> Result<()> {
        let var = self.variable(name)?;
        for key in self.selected_keys(name, &var.domain, selector)? {
            let prior = var.states.get(&key).copied();
            snapshot.variables.push((name.to_owned(), key, prior));
        }
        Ok(())
    }

    /// Put every captured key back the way it was.  Entries are replayed in
    /// reverse so the oldest capture of a key wins.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        for (name, key, prior) in snapshot.parameters.into_iter().rev() {
            let Some(param) = self.parameters.get_mut(&name) else {
                return data_err!(DoesNotExist, format!("parameter '{name}'"));
            };
            match prior {
                Some(value) => param.values.insert(key, value),
                None => param.values.remove(&key),
            };
        }
        for (name, key, prior) in snapshot.variables.into_iter().rev() {
            let var = self.variable_mut(&name)?;
            match prior {
                Some(state) => var.states.insert(key, state),
                None => var.states.remove(&key),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, ErrorKind, key};

    fn plants() -> DataModel {
        let mut data = DataModel::new();
        data.define_set("i", &["p1", "p2", "p3"]).unwrap();
        data.define_set("t", &["bof", "eaf"]).unwrap();
        data.define_relation("it", &["i", "t"], &[["p1", "bof"], ["p2", "eaf"], ["p3", "bof"]])
            .unwrap();
        data
    }

    #[test]
    fn test_sparse_default() {
        let mut data = plants();
        data.define_parameter("ylim", &["i"], &[(["p1"], 10.0)]).unwrap();
        assert_eq!(10.0, data.param_value("ylim", &["p1"]).unwrap());
        assert_eq!(0.0, data.param_value("ylim", &["p2"]).unwrap());
    }

    #[test]
    fn test_out_of_domain_write() {
        let mut data = plants();
        let err = data
            .define_parameter("ylim", &["i"], &[(["p1"], 10.0), (["p9"], 1.0)])
            .unwrap_err();
        assert_eq!(ErrorKind::Domain, err.kind);
        assert_eq!(ErrorCode::NotInDomain, err.code);
        // nothing was declared
        assert!(data.parameter("ylim").is_err());

        data.define_parameter("ylim", &["i"], &[(["p1"], 10.0)]).unwrap();
        let err = data.set_parameter("ylim", &["p1", "bof"], 3.0).unwrap_err();
        assert_eq!(ErrorCode::ArityMismatch, err.code);
        assert_eq!(10.0, data.param_value("ylim", &["p1"]).unwrap());
    }

    #[test]
    fn test_bulk_write_is_atomic() {
        let mut data = plants();
        data.define_parameter("ylim", &["i"], &[(["p1"], 10.0)]).unwrap();
        let err = data.write_parameter(
            "ylim",
            vec![(key(&["p2"]), 5.0), (key(&["nope"]), 1.0)],
            false,
        );
        assert!(err.is_err());
        assert_eq!(0.0, data.param_value("ylim", &["p2"]).unwrap());
    }

    #[test]
    fn test_relation_membership() {
        let data = plants();
        let it = data.set("it").unwrap();
        assert!(it.is_relation());
        assert_eq!(2, it.arity());
        assert!(it.contains(&key(&["p2", "eaf"])));
        assert!(!it.contains(&key(&["p2", "bof"])));

        let mut data = plants();
        let err = data
            .define_relation("bad", &["i", "t"], &[["p1", "dri"]])
            .unwrap_err();
        assert_eq!(ErrorCode::NotInDomain, err.code);
    }

    #[test]
    fn test_duplicates() {
        let mut data = DataModel::new();
        let err = data.define_set("i", &["a", "a"]).unwrap_err();
        assert_eq!(ErrorCode::DuplicateElement, err.code);
        data.define_set("i", &["a"]).unwrap();
        let err = data.define_scalar("i", 1.0).unwrap_err();
        assert_eq!(ErrorCode::DuplicateSymbol, err.code);
    }

    #[test]
    fn test_domain_tuples() {
        let data = plants();
        let tuples = data
            .domain_tuples(&["i".to_owned(), "t".to_owned()])
            .unwrap();
        assert_eq!(6, tuples.len());
        assert_eq!(key(&["p1", "bof"]), tuples[0]);
        assert_eq!(key(&["p3", "eaf"]), tuples[5]);
        assert_eq!(vec![Key::new()], data.domain_tuples(&[]).unwrap());
    }

    #[test]
    fn test_fix_and_unfix() {
        let mut data = plants();
        data.define_variable("Y", &["i"], VarKind::Positive).unwrap();
        data.define_variable("W", &[], VarKind::Positive).unwrap();

        data.fix("W", &Selector::scalar(), 10.0).unwrap();
        let w = data.variable("W").unwrap().state(&[]);
        assert!(w.fixed);
        assert_eq!((10.0, 10.0, 10.0), (w.level, w.lower, w.upper));

        data.unfix("W", &Selector::All).unwrap();
        let w = data.variable("W").unwrap().state(&[]);
        assert!(!w.fixed);
        assert_eq!(0.0, w.lower);
        assert_eq!(f64::INFINITY, w.upper);
        assert_eq!(10.0, w.level);

        let err = data.set_level("Y", &Selector::key(&["p7"]), 1.0).unwrap_err();
        assert_eq!(ErrorCode::NotInDomain, err.code);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut data = plants();
        data.define_parameter("tau", &["i"], &[(["p1"], 1.0)]).unwrap();
        data.define_variable("W", &[], VarKind::Positive).unwrap();

        let mut snapshot = Snapshot::default();
        data.snapshot_parameter(&mut snapshot, "tau", &Selector::All).unwrap();
        data.snapshot_variable(&mut snapshot, "W", &Selector::All).unwrap();

        data.scale_parameter("tau", &Selector::All, 3.0).unwrap();
        data.set_parameter("tau", &["p2"], 4.0).unwrap();
        data.fix("W", &Selector::All, 10.0).unwrap();

        data.restore(snapshot).unwrap();
        assert_eq!(1.0, data.param_value("tau", &["p1"]).unwrap());
        assert_eq!(0.0, data.param_value("tau", &["p2"]).unwrap());
        assert!(data.parameter("tau").unwrap().records().all(|(k, _)| k[0] == "p1"));
        assert!(!data.variable("W").unwrap().state(&[]).fixed);
    }
}
