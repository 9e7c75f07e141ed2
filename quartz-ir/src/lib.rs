//! In-memory representation of a Quartz design.
//!
//! The design is a tree of [`Node`] records stored in an [`Ast`] arena and
//! addressed through stable [`NodeId`] handles. Parent, sibling, and child
//! links are handles rather than owning pointers, so passes can unlink,
//! relink, and clone subtrees in place without invalidating the handles
//! they still hold.

mod ast;
mod builder;
mod context;
mod node;
mod num;
mod printer;
mod variable;

pub use ast::{Ast, Node, NodeId};
pub use builder::Builder;
pub use context::Context;
pub use node::{encode_number, BinOp, NodeKind, UnaryOp};
pub use num::{DataType, Num};
pub use printer::Printer;
pub use quartz_utils::{GetName, Id};
pub use variable::{Scope, ScopeId, VarId, Variable};
