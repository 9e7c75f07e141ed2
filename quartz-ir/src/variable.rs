//! Side tables for variables and scopes. The tree refers to both through
//! typed handles carried in `VarRef` nodes.

use crate::num::DataType;
use quartz_utils::{impl_index, GetName, Id};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct VarId(u32);
impl_index!(VarId);

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct ScopeId(u32);
impl_index!(ScopeId);

/// A declared variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Id,
    pub dtype: DataType,
    /// Declared with `genvar`; only these may index a generate-loop.
    pub genvar: bool,
    /// Set once the variable has served as a loop index, so later passes
    /// suppress unused-variable diagnostics for it.
    pub used_loop_idx: bool,
}

impl Variable {
    pub fn new<S: Into<Id>>(name: S, dtype: DataType) -> Self {
        Variable {
            name: name.into(),
            dtype,
            genvar: false,
            used_loop_idx: false,
        }
    }

    pub fn genvar<S: Into<Id>>(name: S) -> Self {
        Variable {
            name: name.into(),
            dtype: DataType::int(),
            genvar: true,
            used_loop_idx: false,
        }
    }
}

impl GetName for Variable {
    fn name(&self) -> Id {
        self.name
    }
}

/// An elaborated scope instance.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: Id,
}

impl GetName for Scope {
    fn name(&self) -> Id {
        self.name
    }
}
