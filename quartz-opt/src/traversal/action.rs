//! Actions control the traversal of design trees.
use quartz_ir::{Ast, NodeId};
use quartz_utils::QuartzResult;

/// Result of performing a visit.
pub type VisResult = QuartzResult<Action>;

/// A visit action.
pub enum Action {
    /// Continue the traversal.
    Continue,
    /// Globally abort the traversal.
    Stop,
    /// Skip this node's children but continue with its siblings.
    SkipChildren,
    /// Replace the current node with a detached chain. When returned from a
    /// `start_*` hook, none of the newly created nodes are visited.
    Change(NodeId),
}

impl Action {
    /// Sequence actions that return a [VisResult]: run `next` if `self` is
    /// `Continue`, pass anything else through.
    pub fn and_then<F>(self, mut next: F) -> VisResult
    where
        F: FnMut() -> VisResult,
    {
        match self {
            Action::Continue => next(),
            x => Ok(x),
        }
    }

    /// Convert a [Action::SkipChildren] into a [Action::Continue] once the
    /// child traversal it suppressed is behind us.
    pub fn pop(self) -> Action {
        match self {
            Action::SkipChildren => Action::Continue,
            x => x,
        }
    }

    /// Apply a [Action::Change] to the tree: the replacement chain is
    /// spliced where `node` sat and `node` goes on the deferred-delete
    /// queue. All other actions pass through unchanged.
    pub fn apply_change(self, ast: &mut Ast, node: NodeId) -> Action {
        match self {
            Action::Change(new) => {
                ast.replace_with(node, new);
                ast.defer_delete(node);
                Action::Continue
            }
            x => x,
        }
    }
}
