//! Symbolic-value bookkeeping.
//!
//! The constraint solver and the symbolic engine live outside this crate
//! (see [`crate::engine::Engine`]); what the orchestrator and the corpus
//! bridge own is the *seed assignment* that accompanies a symbolic
//! transaction, and a lightweight representation of a transaction field
//! that may be either a concrete word or a named symbolic variable.

use crate::types::EVMU256;
use std::collections::HashMap;

/// A 256-bit word that is either known concretely, or backed by a named
/// symbolic variable whose concrete seed lives in a [`VarContext`].
///
/// Mirrors the role of `maat::Value`/`Cst` in the source tool: the engine is
/// the only thing that ever reasons about the symbolic constraint itself,
/// this crate only carries the variable's name and its current seed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Concrete(EVMU256),
    Symbolic(String),
}

impl Value {
    pub fn concrete(v: impl Into<EVMU256>) -> Self {
        Value::Concrete(v.into())
    }

    pub fn symbolic(name: impl Into<String>) -> Self {
        Value::Symbolic(name.into())
    }

    /// Resolve this value against `ctx`, as the engine would when
    /// concretizing a symbolic field (e.g. `out_tx.sender.as_uint(ctx)`).
    ///
    /// Panics if this is a symbolic value with no matching seed in `ctx`;
    /// that would mean the bridge built an `AbstractTx` without seeding one
    /// of its own variables, which is a bridge bug, not a runtime condition.
    pub fn as_uint(&self, ctx: &VarContext) -> EVMU256 {
        match self {
            Value::Concrete(v) => *v,
            Value::Symbolic(name) => *ctx
                .get(name)
                .unwrap_or_else(|| panic!("no seed value for symbolic variable `{name}`")),
        }
    }
}

impl From<EVMU256> for Value {
    fn from(v: EVMU256) -> Self {
        Value::Concrete(v)
    }
}

/// A name -> concrete-seed mapping for symbolic variables.
///
/// Corresponds to `maat::VarContext`: a sequence of `AbstractTx` each carry
/// their own `ctx`, and `EVMRuntime::new` merges it into the engine's
/// variable context before running.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VarContext {
    vars: HashMap<String, EVMU256>,
}

impl VarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&EVMU256> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: EVMU256) {
        self.vars.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EVMU256)> {
        self.vars.iter()
    }

    /// Merge `other`'s entries into `self`, as `engine.vars.update_from(ctx)`
    /// does in the source tool. Entries in `other` win on conflict.
    pub fn update_from(&mut self, other: &VarContext) {
        for (k, v) in other.vars.iter() {
            self.vars.insert(k.clone(), *v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
