//! Indented tree dumps for debugging and test failure output. Printing
//! never mutates the arena.

use crate::ast::{Ast, NodeId};
use crate::node::NodeKind;
use std::fmt::Write;

pub struct Printer;

impl Printer {
    /// Render the chain starting at `head` as an indented listing.
    pub fn tree_string(ast: &Ast, head: NodeId) -> String {
        let mut buf = String::new();
        Self::write_chain(ast, Some(head), 0, &mut buf);
        buf
    }

    fn write_chain(
        ast: &Ast,
        head: Option<NodeId>,
        indent: usize,
        buf: &mut String,
    ) {
        for n in ast.iter_chain(head) {
            Self::write_node(ast, n, indent, buf);
        }
    }

    fn write_node(ast: &Ast, n: NodeId, indent: usize, buf: &mut String) {
        for _ in 0..indent {
            buf.push_str("  ");
        }
        match ast.kind(n) {
            NodeKind::Netlist => buf.push_str("netlist"),
            NodeKind::Begin { name, generate } => {
                write!(buf, "begin \"{}\"", name).unwrap();
                if *generate {
                    buf.push_str(" (generate)");
                }
            }
            NodeKind::While => buf.push_str("while"),
            NodeKind::GenFor => buf.push_str("genfor"),
            NodeKind::For => buf.push_str("for"),
            NodeKind::If => buf.push_str("if"),
            NodeKind::Assign => buf.push_str("assign"),
            NodeKind::VarRef { var, lvalue, .. } => {
                write!(
                    buf,
                    "varref {}{}",
                    ast.var(*var).name,
                    if *lvalue { " (lv)" } else { "" }
                )
                .unwrap();
            }
            NodeKind::Const(num) => write!(buf, "const {}", num).unwrap(),
            NodeKind::Unary(op) => write!(buf, "unary {}", op).unwrap(),
            NodeKind::Binary(op) => write!(buf, "binary {}", op).unwrap(),
        }
        buf.push('\n');
        for slot in 0..4 {
            Self::write_chain(ast, ast.op(n, slot), indent + 1, buf);
        }
    }
}
