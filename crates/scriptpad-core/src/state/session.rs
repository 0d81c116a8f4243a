//! Immutable session snapshot.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::script::Type;
use crate::script::Value;
use crate::script::bound::Function;

/// An active `using` directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Import {
    /// `using N;`
    Namespace(String),
    /// `using static N.T;`
    Static(String),
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Import::Namespace(name) => write!(f, "using {name};"),
            Import::Static(name) => write!(f, "using static {name};"),
        }
    }
}

/// A session variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub value: Value,
}

/// Accumulated context of every successful submission so far.
///
/// A snapshot is never mutated after it is built; the engine replaces it as
/// a whole when a submission succeeds. Redeclared variables and functions
/// keep their old slots (code compiled against them still uses them) but
/// name lookups see only the newest declaration.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub(crate) variables: Vec<Variable>,
    pub(crate) variable_names: FxHashMap<String, usize>,
    pub(crate) functions: Vec<Arc<Function>>,
    pub(crate) function_names: FxHashMap<String, usize>,
    pub(crate) imports: Vec<Import>,
    pub(crate) references: Vec<String>,
    pub(crate) return_value: Option<Value>,
    pub(crate) submissions: u64,
}

impl SessionState {
    /// Look up the visible variable called `name`.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variable_names
            .get(name)
            .and_then(|&slot| self.variables.get(slot))
    }

    /// Visible variables in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .enumerate()
            .filter(|(slot, v)| self.variable_names.get(&v.name) == Some(slot))
            .map(|(_, v)| v)
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.variables.len()
    }

    pub(crate) fn values(&self) -> Vec<Value> {
        self.variables.iter().map(|v| v.value.clone()).collect()
    }

    pub(crate) fn function_table(&self) -> &[Arc<Function>] {
        &self.functions
    }

    /// Names of visible functions in declaration order.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(slot, f)| self.function_names.get(&f.name) == Some(slot))
            .map(|(_, f)| f.name.as_str())
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Value of the most recent submission, if it produced one.
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Number of successful submissions that built this state.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }
}

impl PartialEq for SessionState {
    fn eq(&self, other: &Self) -> bool {
        self.variables == other.variables
            && self.variable_names == other.variable_names
            && self.functions.len() == other.functions.len()
            && self
                .functions
                .iter()
                .zip(&other.functions)
                .all(|(a, b)| Arc::ptr_eq(a, b))
            && self.imports == other.imports
            && self.references == other.references
            && self.return_value == other.return_value
            && self.submissions == other.submissions
    }
}

/// Builds the successor of a state from the results of one submission.
#[derive(Debug)]
pub(crate) struct StateBuilder {
    state: SessionState,
}

impl StateBuilder {
    pub(crate) fn from_prior(prior: Option<&SessionState>) -> Self {
        Self {
            state: prior.cloned().unwrap_or_default(),
        }
    }

    pub(crate) fn references(mut self, references: Vec<String>) -> Self {
        self.state.references = references;
        self
    }

    pub(crate) fn imports(mut self, imports: Vec<Import>) -> Self {
        self.state.imports = imports;
        self
    }

    /// Store the final slot values; `declared` names the slots added by the
    /// submission, which follow the prior slots.
    pub(crate) fn variables(mut self, values: Vec<Value>, declared: Vec<(String, Type)>) -> Self {
        let prior = self.state.variables.len();
        for (variable, value) in self.state.variables.iter_mut().zip(&values) {
            variable.value = value.clone();
        }
        for (offset, ((name, ty), value)) in declared
            .into_iter()
            .zip(values.into_iter().skip(prior))
            .enumerate()
        {
            self.state.variable_names.insert(name.clone(), prior + offset);
            self.state.variables.push(Variable { name, ty, value });
        }
        self
    }

    pub(crate) fn functions(mut self, functions: Vec<Arc<Function>>) -> Self {
        for function in functions {
            self.state
                .function_names
                .insert(function.name.clone(), self.state.functions.len());
            self.state.functions.push(function);
        }
        self
    }

    pub(crate) fn return_value(mut self, value: Option<Value>) -> Self {
        self.state.return_value = value;
        self
    }

    pub(crate) fn build(mut self) -> SessionState {
        self.state.submissions += 1;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(vars: &[(&str, Value)]) -> SessionState {
        let declared = vars
            .iter()
            .map(|(name, _)| (name.to_string(), Type::Object))
            .collect();
        let values = vars.iter().map(|(_, v)| v.clone()).collect();
        StateBuilder::from_prior(None)
            .variables(values, declared)
            .build()
    }

    #[test]
    fn test_redeclared_variable_shadows_old_slot() {
        let first = state_with(&[("x", Value::Int(1))]);
        let second = StateBuilder::from_prior(Some(&first))
            .variables(
                vec![Value::Int(1), Value::str("new")],
                vec![("x".to_string(), Type::String)],
            )
            .build();

        assert_eq!(second.variable("x").unwrap().value, Value::str("new"));
        assert_eq!(second.variables().count(), 1);
        assert_eq!(second.slot_count(), 2);
        assert_eq!(second.submissions(), 2);
    }

    #[test]
    fn test_prior_state_is_untouched() {
        let first = state_with(&[("x", Value::Int(1))]);
        let _second = StateBuilder::from_prior(Some(&first))
            .variables(vec![Value::Int(7)], Vec::new())
            .build();
        assert_eq!(first.variable("x").unwrap().value, Value::Int(1));
    }

    #[test]
    fn test_import_display() {
        assert_eq!(Import::Namespace("System".into()).to_string(), "using System;");
        assert_eq!(
            Import::Static("Pad.Api.Host".into()).to_string(),
            "using static Pad.Api.Host;"
        );
    }
}
