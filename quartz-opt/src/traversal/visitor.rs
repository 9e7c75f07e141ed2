//! Implements a visitor for design trees. Passes implement [`Visitor`] and
//! are invoked on a [`Context`] through [`Visitor::do_pass`].

use super::action::{Action, VisResult};
use super::construct::{ConstructVisitor, Named};
use quartz_ir::{Ast, Context, NodeId, NodeKind};
use quartz_utils::QuartzResult;

/// The visiting interface for a design tree. Contains two kinds of hooks:
/// `start_*` runs before a node's children are visited, `finish_*` after.
/// A pass usually overrides one or two hooks and relies on the default
/// child recursion for the rest. Leaf tags get a single hook.
pub trait Visitor {
    /// Executed before the traversal begins.
    fn start(&mut self, _ctx: &mut Context) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed after the traversal ends.
    fn finish(&mut self, _ctx: &mut Context) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_begin(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_begin(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_if(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_if(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_while(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_while(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_gen_for(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_gen_for(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_for(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_for(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_assign(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_assign(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_unary(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_unary(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_binary(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    fn finish_binary(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed at a `VarRef` node.
    fn var_ref(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed at a `Const` node.
    fn constant(&mut self, _ast: &mut Ast, _node: NodeId) -> VisResult {
        Ok(Action::Continue)
    }

    /// Run the visitor over the context's tree, then flush the
    /// deferred-delete queue the traversal filled.
    fn do_pass(&mut self, ctx: &mut Context) -> QuartzResult<()>
    where
        Self: Sized + ConstructVisitor + Named,
    {
        let root = ctx.root;
        self.start(ctx)?
            .and_then(|| visit(self, &mut ctx.ast, root))?
            .pop()
            .and_then(|| self.finish(ctx))?;
        ctx.ast.flush_deferred();
        Ok(())
    }

    /// Build the pass from the context and call [Visitor::do_pass] with it.
    fn do_pass_default(ctx: &mut Context) -> QuartzResult<Self>
    where
        Self: ConstructVisitor + Sized + Named,
    {
        let mut visitor = Self::from(ctx)?;
        visitor.do_pass(ctx)?;
        Ok(visitor)
    }
}

/// Visit a single node, ignoring its sibling tail.
pub fn visit(
    visitor: &mut dyn Visitor,
    ast: &mut Ast,
    node: NodeId,
) -> VisResult {
    visit_node(visitor, ast, node)
}

/// Visit every node of a sibling chain.
pub fn visit_chain(
    visitor: &mut dyn Visitor,
    ast: &mut Ast,
    head: Option<NodeId>,
) -> VisResult {
    let mut cur = head;
    while let Some(n) = cur {
        // Capture the tail first: the visitor may replace or unlink `n`,
        // but the node that followed it stays in place.
        let next = ast.next(n);
        if let Action::Stop = visit_node(visitor, ast, n)? {
            return Ok(Action::Stop);
        }
        cur = next;
    }
    Ok(Action::Continue)
}

fn visit_node(
    visitor: &mut dyn Visitor,
    ast: &mut Ast,
    node: NodeId,
) -> VisResult {
    let start = match ast.kind(node) {
        NodeKind::Netlist => Action::Continue,
        NodeKind::Begin { .. } => visitor.start_begin(ast, node)?,
        NodeKind::If => visitor.start_if(ast, node)?,
        NodeKind::While => visitor.start_while(ast, node)?,
        NodeKind::GenFor => visitor.start_gen_for(ast, node)?,
        NodeKind::For => visitor.start_for(ast, node)?,
        NodeKind::Assign => visitor.start_assign(ast, node)?,
        NodeKind::Unary(_) => visitor.start_unary(ast, node)?,
        NodeKind::Binary(_) => visitor.start_binary(ast, node)?,
        NodeKind::VarRef { .. } => {
            return Ok(visitor.var_ref(ast, node)?.apply_change(ast, node));
        }
        NodeKind::Const(_) => {
            return Ok(visitor.constant(ast, node)?.apply_change(ast, node));
        }
    };

    match start {
        Action::Stop => return Ok(Action::Stop),
        Action::Change(_) => return Ok(start.apply_change(ast, node)),
        Action::Continue => {
            for slot in 0..4 {
                let child = ast.op(node, slot);
                if let Action::Stop = visit_chain(visitor, ast, child)? {
                    return Ok(Action::Stop);
                }
            }
        }
        Action::SkipChildren => {}
    }

    let finish = match ast.kind(node) {
        NodeKind::Netlist => Action::Continue,
        NodeKind::Begin { .. } => visitor.finish_begin(ast, node)?,
        NodeKind::If => visitor.finish_if(ast, node)?,
        NodeKind::While => visitor.finish_while(ast, node)?,
        NodeKind::GenFor => visitor.finish_gen_for(ast, node)?,
        NodeKind::For => visitor.finish_for(ast, node)?,
        NodeKind::Assign => visitor.finish_assign(ast, node)?,
        NodeKind::Unary(_) => visitor.finish_unary(ast, node)?,
        NodeKind::Binary(_) => visitor.finish_binary(ast, node)?,
        NodeKind::VarRef { .. } | NodeKind::Const(_) => {
            unreachable!("leaf tags return before the child traversal")
        }
    };
    Ok(finish.apply_change(ast, node).pop())
}
