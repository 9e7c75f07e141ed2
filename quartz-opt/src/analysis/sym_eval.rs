//! Symbolic evaluation of expression trees.
//!
//! The evaluator has two modes. *Check* mode vets a tree for evaluability
//! without computing anything: variable references are acceptable because
//! the caller will substitute constants for them before asking for values.
//! *Parameter-emulate* mode computes the tree's value; by then every leaf
//! must be a constant, and a surviving variable reference makes the tree
//! non-optimizable.
//!
//! Callers are expected to hand in clones of live trees and to queue those
//! clones for deferred deletion afterwards.

use quartz_ir::{Ast, BinOp, DataType, NodeId, NodeKind, Num, UnaryOp};
use std::collections::HashMap;

pub struct SymEval {
    emulate: bool,
    optimizable: bool,
    why_not: Option<&'static str>,
    results: HashMap<NodeId, Num>,
}

impl SymEval {
    pub fn new() -> Self {
        SymEval {
            emulate: false,
            optimizable: true,
            why_not: None,
            results: HashMap::new(),
        }
    }

    /// Check whether `root` could be evaluated once its variable references
    /// are bound. No value is computed.
    pub fn main_check_tree(&mut self, ast: &Ast, root: NodeId) {
        self.emulate = false;
        self.eval(ast, root);
    }

    /// Fully evaluate `root`. The result is retrievable through
    /// [`SymEval::fetch_num`] keyed by the root handle.
    pub fn main_param_emulate(&mut self, ast: &Ast, root: NodeId) {
        self.emulate = true;
        if let Some(num) = self.eval(ast, root) {
            self.results.insert(root, num);
        }
    }

    pub fn optimizable(&self) -> bool {
        self.optimizable
    }

    /// Why the last tree was rejected, if it was.
    pub fn why_not(&self) -> Option<&'static str> {
        self.why_not
    }

    /// The computed value of an evaluated tree, or `None` when evaluation
    /// produced no number.
    pub fn fetch_num(&self, node: NodeId) -> Option<&Num> {
        self.results.get(&node)
    }

    fn clear_optimizable(&mut self, why: &'static str) {
        if self.optimizable {
            self.optimizable = false;
            self.why_not = Some(why);
            log::trace!("not optimizable: {}", why);
        }
    }

    fn eval(&mut self, ast: &Ast, node: NodeId) -> Option<Num> {
        match ast.kind(node) {
            NodeKind::Const(num) => Some(num.clone()),
            NodeKind::VarRef { .. } => {
                if self.emulate {
                    self.clear_optimizable(
                        "variable reference without a bound constant",
                    );
                }
                None
            }
            NodeKind::Unary(op) => {
                let op = *op;
                let expr = ast.op(node, 0)?;
                let a = self.eval(ast, expr)?;
                Some(eval_unary(op, &a))
            }
            NodeKind::Binary(op) => {
                let op = *op;
                let lhs = ast.op(node, 0)?;
                let rhs = ast.op(node, 1)?;
                let l = self.eval(ast, lhs);
                let r = self.eval(ast, rhs);
                let (l, r) = (l?, r?);
                match eval_binary(op, &l, &r) {
                    Some(num) => Some(num),
                    None => {
                        self.clear_optimizable("division by zero");
                        None
                    }
                }
            }
            _ => {
                self.clear_optimizable("unsupported construct in expression");
                None
            }
        }
    }
}

impl Default for SymEval {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine two constants. `None` only for division by zero; everything else
/// folds to a masked value. Width and signedness follow the usual
/// self-determined rules: arithmetic takes the wider operand's width and is
/// signed only when both sides are, comparisons produce a single unsigned
/// bit, and shifts keep the left operand's type.
pub(crate) fn eval_binary(op: BinOp, l: &Num, r: &Num) -> Option<Num> {
    let signed = l.dtype().signed && r.dtype().signed;
    let width = l.width().max(r.width());
    let dtype = DataType::new(width, signed);
    let (a, b) = if signed {
        (l.signed_value(), r.signed_value())
    } else {
        (l.value().clone(), r.value().clone())
    };
    let bit = |v: bool| Num::new(v as i64, DataType::BIT);
    Some(match op {
        BinOp::Add => Num::new(a + b, dtype),
        BinOp::Sub => Num::new(a - b, dtype),
        BinOp::Mul => Num::new(a * b, dtype),
        BinOp::Div => {
            if r.is_zero() {
                return None;
            }
            Num::new(a / b, dtype)
        }
        BinOp::Lt => bit(a < b),
        BinOp::Lte => bit(a <= b),
        BinOp::Gt => bit(a > b),
        BinOp::Gte => bit(a >= b),
        BinOp::Eq => bit(a == b),
        BinOp::Neq => bit(a != b),
        BinOp::Shl => shift(l, r, true),
        BinOp::Shr => shift(l, r, false),
        BinOp::And => Num::new(l.value() & r.value(), dtype),
        BinOp::Or => Num::new(l.value() | r.value(), dtype),
        BinOp::Xor => Num::new(l.value() ^ r.value(), dtype),
    })
}

/// Logical shift; shifting past the width leaves nothing behind.
fn shift(l: &Num, r: &Num, left: bool) -> Num {
    let dtype = l.dtype();
    let amount = usize::try_from(r.value()).unwrap_or(usize::MAX);
    if amount >= dtype.width as usize {
        return Num::new(0, dtype);
    }
    if left {
        Num::new(l.value() << amount, dtype)
    } else {
        Num::new(l.value() >> amount, dtype)
    }
}

pub(crate) fn eval_unary(op: UnaryOp, a: &Num) -> Num {
    let dtype = a.dtype();
    match op {
        UnaryOp::Neg => Num::new(-a.signed_value(), dtype),
        UnaryOp::Not => {
            let ones = (ibig::IBig::from(1u8) << dtype.width as usize)
                - ibig::IBig::from(1u8);
            Num::new(a.value() ^ ones, dtype)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_ir::{Builder, DataType};

    #[test]
    fn emulates_constant_arithmetic() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let two = b.int(2);
        let three = b.int(3);
        let five = b.int(5);
        let sum = b.binary(BinOp::Add, two, three);
        let prod = b.binary(BinOp::Mul, sum, five);

        let mut sim = SymEval::new();
        sim.main_param_emulate(&ast, prod);
        assert!(sim.optimizable());
        assert_eq!(sim.fetch_num(prod).unwrap().to_i64(), 25);
    }

    #[test]
    fn check_mode_tolerates_variable_references() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let i = b.add_var("i", DataType::int());
        let ir = b.rvalue(i, None);
        let three = b.int(3);
        let cond = b.binary(BinOp::Lt, ir, three);

        let mut sim = SymEval::new();
        sim.main_check_tree(&ast, cond);
        assert!(sim.optimizable());
    }

    #[test]
    fn emulate_rejects_unbound_references() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let i = b.add_var("i", DataType::int());
        let ir = b.rvalue(i, None);
        let three = b.int(3);
        let cond = b.binary(BinOp::Lt, ir, three);

        let mut sim = SymEval::new();
        sim.main_param_emulate(&ast, cond);
        assert!(!sim.optimizable());
        assert!(sim.fetch_num(cond).is_none());
    }

    #[test]
    fn statements_are_not_expressions() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let stmt = b.assign_var(x, None, zero);

        let mut sim = SymEval::new();
        sim.main_check_tree(&ast, stmt);
        assert!(!sim.optimizable());
    }

    #[test]
    fn division_by_zero_is_rejected() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let one = b.int(1);
        let zero = b.int(0);
        let div = b.binary(BinOp::Div, one, zero);

        let mut sim = SymEval::new();
        sim.main_param_emulate(&ast, div);
        assert!(!sim.optimizable());
    }

    #[test]
    fn comparisons_are_single_bits() {
        let lt = eval_binary(
            BinOp::Lt,
            &Num::new(-1, DataType::int()),
            &Num::new(1, DataType::int()),
        )
        .unwrap();
        assert!(lt.is_one());
        assert_eq!(lt.width(), 1);

        // unsigned comparison once either side is unsigned
        let lt = eval_binary(
            BinOp::Lt,
            &Num::new(-1, DataType::int()),
            &Num::new(1, DataType::logic(32)),
        )
        .unwrap();
        assert!(lt.is_zero());
    }

    #[test]
    fn shifts_saturate_at_width() {
        let n = Num::new(1, DataType::logic(8));
        let sh = Num::new(200, DataType::logic(8));
        assert!(eval_binary(BinOp::Shl, &n, &sh).unwrap().is_zero());
    }
}
