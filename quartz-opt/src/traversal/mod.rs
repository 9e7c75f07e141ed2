//! Helpers for traversing and rewriting design trees
mod action;
mod construct;
mod diagnostics;
mod visitor;

pub use action::{Action, VisResult};
pub use construct::{ConstructVisitor, Named, ParseVal, PassOpt};
pub use diagnostics::{DiagnosticContext, DiagnosticPass};
pub use visitor::{visit, visit_chain, Visitor};
