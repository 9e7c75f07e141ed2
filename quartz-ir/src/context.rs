//! The top-level object passes run on.

use crate::ast::{Ast, NodeId};
use crate::node::NodeKind;
use quartz_utils::GPosIdx;

/// An elaborated design together with the knobs passes read.
pub struct Context {
    /// The design tree and its variable/scope tables.
    pub ast: Ast,
    /// The netlist root node.
    pub root: NodeId,
    /// Extra options provided on the command line, interpreted by
    /// individual passes (`-x pass:opt=val`).
    pub extra_opts: Vec<String>,
}

impl Context {
    pub fn new() -> Self {
        let mut ast = Ast::new();
        let root = ast.add(NodeKind::Netlist, GPosIdx::UNKNOWN);
        Context {
            ast,
            root,
            extra_opts: Vec::new(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
