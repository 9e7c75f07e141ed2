//! Convenience API to construct statements and expressions. Elaboration and
//! the test suites use this instead of wiring arena slots by hand.

use crate::ast::{Ast, NodeId};
use crate::node::{BinOp, NodeKind, UnaryOp};
use crate::num::{DataType, Num};
use crate::variable::{ScopeId, VarId, Variable};
use quartz_utils::GPosIdx;

/// Builds nodes into an [`Ast`] at a fixed source position.
pub struct Builder<'a> {
    pub ast: &'a mut Ast,
    pos: GPosIdx,
}

impl<'a> Builder<'a> {
    pub fn new(ast: &'a mut Ast) -> Self {
        Builder {
            ast,
            pos: GPosIdx::UNKNOWN,
        }
    }

    /// Use `pos` for every node built from here on.
    pub fn at(mut self, pos: GPosIdx) -> Self {
        self.pos = pos;
        self
    }

    pub fn add_var<S: ToString>(&mut self, name: S, dtype: DataType) -> VarId {
        self.ast.add_var(Variable::new(name.to_string(), dtype))
    }

    pub fn add_genvar<S: ToString>(&mut self, name: S) -> VarId {
        self.ast.add_var(Variable::genvar(name.to_string()))
    }

    pub fn konst(&mut self, value: i64, dtype: DataType) -> NodeId {
        self.ast
            .add(NodeKind::Const(Num::new(value, dtype)), self.pos)
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.konst(value, DataType::int())
    }

    pub fn rvalue(&mut self, var: VarId, scope: Option<ScopeId>) -> NodeId {
        self.ast.add(
            NodeKind::VarRef {
                var,
                scope,
                lvalue: false,
            },
            self.pos,
        )
    }

    pub fn lvalue(&mut self, var: VarId, scope: Option<ScopeId>) -> NodeId {
        self.ast.add(
            NodeKind::VarRef {
                var,
                scope,
                lvalue: true,
            },
            self.pos,
        )
    }

    /// `lhs = rhs`. Slot order follows the tree convention: rhs first.
    pub fn assign(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        let n = self.ast.add(NodeKind::Assign, self.pos);
        self.ast.set_op(n, 0, rhs);
        self.ast.set_op(n, 1, lhs);
        n
    }

    /// `var = rhs` with a fresh lvalue reference.
    pub fn assign_var(
        &mut self,
        var: VarId,
        scope: Option<ScopeId>,
        rhs: NodeId,
    ) -> NodeId {
        let lhs = self.lvalue(var, scope);
        self.assign(lhs, rhs)
    }

    pub fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let n = self.ast.add(NodeKind::Binary(op), self.pos);
        self.ast.set_op(n, 0, lhs);
        self.ast.set_op(n, 1, rhs);
        n
    }

    pub fn unary(&mut self, op: UnaryOp, expr: NodeId) -> NodeId {
        let n = self.ast.add(NodeKind::Unary(op), self.pos);
        self.ast.set_op(n, 0, expr);
        n
    }

    pub fn if_stmt(
        &mut self,
        cond: NodeId,
        then: Option<NodeId>,
        els: Option<NodeId>,
    ) -> NodeId {
        let n = self.ast.add(NodeKind::If, self.pos);
        self.ast.set_op(n, 0, cond);
        if let Some(t) = then {
            self.ast.set_op(n, 1, t);
        }
        if let Some(e) = els {
            self.ast.set_op(n, 2, e);
        }
        n
    }

    /// Chain statements into a sibling list; returns the head.
    pub fn stmts(&mut self, stmts: Vec<NodeId>) -> Option<NodeId> {
        let mut head: Option<NodeId> = None;
        for s in stmts {
            head = self.ast.add_next_opt(head, Some(s));
        }
        head
    }

    pub fn begin<S: ToString>(
        &mut self,
        name: S,
        generate: bool,
        stmts: Vec<NodeId>,
    ) -> NodeId {
        let n = self.ast.add(
            NodeKind::Begin {
                name: name.to_string().into(),
                generate,
            },
            self.pos,
        );
        if let Some(head) = self.stmts(stmts) {
            self.ast.set_op(n, 0, head);
        }
        n
    }

    /// Append a statement to a `Begin` or `Netlist` statement list.
    pub fn push_stmt(&mut self, block: NodeId, stmt: NodeId) {
        match self.ast.op(block, 0) {
            Some(head) => self.ast.add_next(head, stmt),
            None => self.ast.set_op(block, 0, stmt),
        }
    }

    pub fn while_stmt(
        &mut self,
        preconds: Option<NodeId>,
        cond: NodeId,
        body: Option<NodeId>,
        incs: Option<NodeId>,
    ) -> NodeId {
        let n = self.ast.add(NodeKind::While, self.pos);
        if let Some(p) = preconds {
            self.ast.set_op(n, 0, p);
        }
        self.ast.set_op(n, 1, cond);
        if let Some(b) = body {
            self.ast.set_op(n, 2, b);
        }
        if let Some(i) = incs {
            self.ast.set_op(n, 3, i);
        }
        n
    }

    pub fn gen_for(
        &mut self,
        init: NodeId,
        cond: NodeId,
        inc: NodeId,
        body: Option<NodeId>,
    ) -> NodeId {
        let n = self.ast.add(NodeKind::GenFor, self.pos);
        self.ast.set_op(n, 0, init);
        self.ast.set_op(n, 1, cond);
        self.ast.set_op(n, 2, inc);
        if let Some(b) = body {
            self.ast.set_op(n, 3, b);
        }
        n
    }

    pub fn for_stmt(
        &mut self,
        init: NodeId,
        cond: NodeId,
        inc: NodeId,
        body: Option<NodeId>,
    ) -> NodeId {
        let n = self.ast.add(NodeKind::For, self.pos);
        self.ast.set_op(n, 0, init);
        self.ast.set_op(n, 1, cond);
        self.ast.set_op(n, 2, inc);
        if let Some(b) = body {
            self.ast.set_op(n, 3, b);
        }
        n
    }
}
