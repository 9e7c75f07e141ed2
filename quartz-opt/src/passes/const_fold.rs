//! In-place constant folding.
//!
//! Other passes consume this through [`fold_in_place`], which normalizes a
//! subtree before they inspect its shape. The subtree root may be replaced;
//! callers must re-fetch any handle they held into it.

use crate::analysis::sym_eval::{eval_binary, eval_unary};
use crate::traversal::{Action, Named, VisResult, Visitor};
use quartz_ir::{Ast, NodeId, NodeKind};

/// Rewrites expressions whose operands are literal into literal nodes.
#[derive(Default)]
pub struct ConstFold;

impl Named for ConstFold {
    fn name() -> &'static str {
        "const-fold"
    }

    fn description() -> &'static str {
        "fold constant expressions in place"
    }
}

impl Visitor for ConstFold {
    fn finish_unary(&mut self, ast: &mut Ast, node: NodeId) -> VisResult {
        Ok(match folded(ast, node) {
            Some(new) => Action::Change(new),
            None => Action::Continue,
        })
    }

    fn finish_binary(&mut self, ast: &mut Ast, node: NodeId) -> VisResult {
        Ok(match folded(ast, node) {
            Some(new) => Action::Change(new),
            None => Action::Continue,
        })
    }
}

/// Fold `node`'s subtree bottom-up, editing the tree in place. Returns the
/// handle of the possibly-replaced subtree root.
pub fn fold_in_place(ast: &mut Ast, node: NodeId) -> NodeId {
    for slot in 0..4 {
        let mut cur = ast.op(node, slot);
        while let Some(c) = cur {
            cur = ast.next(c);
            fold_in_place(ast, c);
        }
    }
    match folded(ast, node) {
        Some(new) => {
            ast.replace_with(node, new);
            ast.defer_delete(node);
            new
        }
        None => node,
    }
}

/// The detached replacement for `node`, when it folds.
fn folded(ast: &mut Ast, node: NodeId) -> Option<NodeId> {
    let num = match ast.kind(node) {
        NodeKind::Binary(op) => {
            let op = *op;
            let l = literal(ast, ast.op(node, 0)?)?;
            let r = literal(ast, ast.op(node, 1)?)?;
            eval_binary(op, l, r)?
        }
        NodeKind::Unary(op) => {
            let op = *op;
            let a = literal(ast, ast.op(node, 0)?)?;
            eval_unary(op, a)
        }
        _ => return None,
    };
    let pos = ast.pos(node);
    Some(ast.add(NodeKind::Const(num), pos))
}

fn literal(ast: &Ast, node: NodeId) -> Option<&quartz_ir::Num> {
    match ast.kind(node) {
        NodeKind::Const(num) => Some(num),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::Visitor;
    use quartz_ir::{BinOp, Builder, Context, DataType, UnaryOp};

    #[test]
    fn folds_nested_arithmetic() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let one = b.int(1);
        let two = b.int(2);
        let three = b.int(3);
        let sum = b.binary(BinOp::Add, one, two);
        let prod = b.binary(BinOp::Mul, sum, three);
        let blk = b.begin("blk", false, vec![prod]);

        let new = fold_in_place(&mut ast, prod);
        assert_ne!(new, prod);
        assert_eq!(ast.op(blk, 0), Some(new));
        match ast.kind(new) {
            NodeKind::Const(num) => assert_eq!(num.to_i64(), 9),
            k => panic!("expected a constant, got {}", k.tag()),
        }
    }

    #[test]
    fn leaves_variable_expressions_alone() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let i = b.add_var("i", DataType::int());
        let ir = b.rvalue(i, None);
        let three = b.int(3);
        let cond = b.binary(BinOp::Lt, ir, three);
        let blk = b.begin("blk", false, vec![cond]);

        let new = fold_in_place(&mut ast, cond);
        assert_eq!(new, cond);
        assert_eq!(ast.op(blk, 0), Some(cond));
        assert!(matches!(ast.kind(cond), NodeKind::Binary(BinOp::Lt)));
    }

    #[test]
    fn folds_unary_below_a_statement() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let x = b.add_var("x", DataType::logic(8));
        let five = b.konst(5, DataType::logic(8));
        let neg = b.unary(UnaryOp::Neg, five);
        let stmt = b.assign_var(x, None, neg);
        let blk = b.begin("blk", false, vec![stmt]);

        fold_in_place(&mut ast, stmt);
        let rhs = ast.op(stmt, 0).unwrap();
        match ast.kind(rhs) {
            NodeKind::Const(num) => assert_eq!(num.to_i64(), 0xfb),
            k => panic!("expected a constant, got {}", k.tag()),
        }
        assert_eq!(ast.op(blk, 0), Some(stmt));
    }

    #[test]
    fn pass_folds_the_whole_tree() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let x = b.add_var("x", DataType::int());
        let two = b.int(2);
        let three = b.int(3);
        let sum = b.binary(BinOp::Add, two, three);
        let stmt = b.assign_var(x, None, sum);
        let blk = b.begin("blk", false, vec![stmt]);
        b.push_stmt(root, blk);

        ConstFold::do_pass_default(&mut ctx).unwrap();
        let rhs = ctx.ast.op(stmt, 0).unwrap();
        match ctx.ast.kind(rhs) {
            NodeKind::Const(num) => assert_eq!(num.to_i64(), 5),
            k => panic!("expected a constant, got {}", k.tag()),
        }
    }
}
