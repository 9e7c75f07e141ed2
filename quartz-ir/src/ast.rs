//! The node arena and the tree-editing protocol.
//!
//! Every node is reachable from exactly one owner: either a parent's child
//! slot or a previous sibling's `next` link. Editing follows a strict
//! unlink/relink discipline: a node must be detached before it is linked
//! somewhere else, and a detached node must end up either relinked or on the
//! deferred-delete queue before the editing pass returns. The queue is
//! flushed by the pass driver, at which point freed slots return to the
//! arena's free list.

use crate::node::NodeKind;
use crate::variable::{Scope, ScopeId, VarId, Variable};
use quartz_utils::{impl_index, GPosIdx, IndexedMap};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct NodeId(u32);
impl_index!(NodeId);

/// A single tree node. `back` points at the previous sibling, or at the
/// owning parent when the node heads a child-slot chain.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    pos: GPosIdx,
    back: Option<NodeId>,
    next: Option<NodeId>,
    ops: [Option<NodeId>; 4],
}

/// Arena holding the design tree plus the variable and scope tables.
#[derive(Debug, Default, Clone)]
pub struct Ast {
    nodes: IndexedMap<NodeId, Node>,
    vars: IndexedMap<VarId, Variable>,
    scopes: IndexedMap<ScopeId, Scope>,
    /// Reusable slots left behind by freed nodes.
    free: Vec<NodeId>,
    /// Detached subtrees awaiting [`Ast::flush_deferred`].
    trash: Vec<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new detached node.
    pub fn add(&mut self, kind: NodeKind, pos: GPosIdx) -> NodeId {
        let node = Node {
            kind,
            pos,
            back: None,
            next: None,
            ops: [None; 4],
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => self.nodes.push(node),
        }
    }

    pub fn kind(&self, n: NodeId) -> &NodeKind {
        &self.nodes[n].kind
    }

    pub fn kind_mut(&mut self, n: NodeId) -> &mut NodeKind {
        &mut self.nodes[n].kind
    }

    pub fn pos(&self, n: NodeId) -> GPosIdx {
        self.nodes[n].pos
    }

    pub fn back(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n].back
    }

    pub fn next(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n].next
    }

    /// Content of a child slot (0-based).
    pub fn op(&self, n: NodeId, slot: usize) -> Option<NodeId> {
        self.nodes[n].ops[slot]
    }

    /// A node with no `back` link is owned by the editing pass, not the tree.
    pub fn is_detached(&self, n: NodeId) -> bool {
        self.nodes[n].back.is_none()
    }

    /// True when `n`'s `back` link is a previous sibling rather than the
    /// owning parent.
    pub fn has_prev_sibling(&self, n: NodeId) -> bool {
        match self.nodes[n].back {
            Some(b) => self.nodes[b].next == Some(n),
            None => false,
        }
    }

    // ========= variable / scope tables =========

    pub fn add_var(&mut self, var: Variable) -> VarId {
        self.vars.push(var)
    }

    pub fn var(&self, v: VarId) -> &Variable {
        &self.vars[v]
    }

    pub fn var_mut(&mut self, v: VarId) -> &mut Variable {
        &mut self.vars[v]
    }

    pub fn add_scope(&mut self, scope: Scope) -> ScopeId {
        self.scopes.push(scope)
    }

    pub fn scope(&self, s: ScopeId) -> &Scope {
        &self.scopes[s]
    }

    // ========= linking =========

    /// Link a detached chain under a child slot. The slot must be empty.
    pub fn set_op(&mut self, parent: NodeId, slot: usize, head: NodeId) {
        debug_assert!(
            self.nodes[parent].ops[slot].is_none(),
            "child slot already occupied"
        );
        debug_assert!(self.is_detached(head), "linking an attached node");
        self.nodes[parent].ops[slot] = Some(head);
        self.nodes[head].back = Some(parent);
    }

    /// Append the detached chain `new` after the tail of `node`'s chain.
    pub fn add_next(&mut self, node: NodeId, new: NodeId) {
        debug_assert!(self.is_detached(new), "appending an attached node");
        let tail = self.tail_of(node);
        self.nodes[tail].next = Some(new);
        self.nodes[new].back = Some(tail);
    }

    /// Chain-append that tolerates absent operands; returns the head of the
    /// combined chain.
    pub fn add_next_opt(
        &mut self,
        head: Option<NodeId>,
        new: Option<NodeId>,
    ) -> Option<NodeId> {
        match (head, new) {
            (Some(h), Some(n)) => {
                self.add_next(h, n);
                Some(h)
            }
            (Some(h), None) => Some(h),
            (None, n) => n,
        }
    }

    /// Remove `n` alone from the tree; its former `next` heals into its
    /// place. Returns `n`, now detached and single.
    pub fn unlink(&mut self, n: NodeId) -> NodeId {
        let back = self.nodes[n].back;
        let next = self.nodes[n].next;
        let Some(b) = back else {
            debug_assert!(next.is_none(), "unlink of a detached chain head");
            return n;
        };
        if self.nodes[b].next == Some(n) {
            self.nodes[b].next = next;
        } else {
            let slot = self.slot_of(b, n);
            self.nodes[b].ops[slot] = next;
        }
        if let Some(nx) = next {
            self.nodes[nx].back = back;
        }
        self.nodes[n].back = None;
        self.nodes[n].next = None;
        n
    }

    /// Detach `n` together with its entire sibling tail. Returns `n`.
    pub fn unlink_with_next(&mut self, n: NodeId) -> NodeId {
        let Some(b) = self.nodes[n].back else {
            return n;
        };
        if self.nodes[b].next == Some(n) {
            self.nodes[b].next = None;
        } else {
            let slot = self.slot_of(b, n);
            self.nodes[b].ops[slot] = None;
        }
        self.nodes[n].back = None;
        n
    }

    /// Splice the detached chain `new_head` into the place `old` occupies.
    /// `old`'s former `next` reattaches after the new chain's tail; `old`
    /// comes out detached and single.
    pub fn replace_with(&mut self, old: NodeId, new_head: NodeId) {
        debug_assert!(self.is_detached(new_head), "replacement must be detached");
        let back = self.nodes[old].back;
        let next = self.nodes[old].next;
        let Some(b) = back else {
            unreachable!("replace_with target is not linked into the tree");
        };
        if self.nodes[b].next == Some(old) {
            self.nodes[b].next = Some(new_head);
        } else {
            let slot = self.slot_of(b, old);
            self.nodes[b].ops[slot] = Some(new_head);
        }
        self.nodes[new_head].back = Some(b);
        let tail = self.tail_of(new_head);
        self.nodes[tail].next = next;
        if let Some(nx) = next {
            self.nodes[nx].back = Some(tail);
        }
        self.nodes[old].back = None;
        self.nodes[old].next = None;
    }

    /// Deep-copy a subtree. Children are always cloned; the sibling tail is
    /// cloned as well iff `with_next` is set. The copy is detached.
    pub fn clone_tree(&mut self, n: NodeId, with_next: bool) -> NodeId {
        let head = self.clone_node(n);
        if with_next {
            let mut src = self.nodes[n].next;
            let mut prev = head;
            while let Some(s) = src {
                let c = self.clone_node(s);
                self.nodes[prev].next = Some(c);
                self.nodes[c].back = Some(prev);
                prev = c;
                src = self.nodes[s].next;
            }
        }
        head
    }

    fn clone_node(&mut self, n: NodeId) -> NodeId {
        let kind = self.nodes[n].kind.clone();
        let pos = self.nodes[n].pos;
        let ops = self.nodes[n].ops;
        let c = self.add(kind, pos);
        for (slot, child) in ops.iter().enumerate() {
            if let Some(ch) = child {
                let cc = self.clone_tree(*ch, true);
                self.nodes[c].ops[slot] = Some(cc);
                self.nodes[cc].back = Some(c);
            }
        }
        c
    }

    // ========= deferred deletion =========

    /// Queue a detached subtree (with its sibling tail, if any) for
    /// reclamation at the next [`Ast::flush_deferred`].
    pub fn defer_delete(&mut self, n: NodeId) {
        debug_assert!(
            self.is_detached(n),
            "deferred-delete of a node still on the tree"
        );
        self.trash.push(n);
    }

    /// Reclaim every queued subtree into the free list. Handles into freed
    /// subtrees are invalid after this returns.
    pub fn flush_deferred(&mut self) {
        let mut stack = std::mem::take(&mut self.trash);
        while let Some(n) = stack.pop() {
            for slot in 0..4 {
                if let Some(ch) = self.nodes[n].ops[slot] {
                    stack.push(ch);
                }
            }
            if let Some(nx) = self.nodes[n].next {
                stack.push(nx);
            }
            self.nodes[n].back = None;
            self.nodes[n].next = None;
            self.nodes[n].ops = [None; 4];
            self.free.push(n);
        }
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    // ========= iteration =========

    /// Iterate a sibling chain starting at `head`.
    pub fn iter_chain(&self, head: Option<NodeId>) -> ChainIter<'_> {
        ChainIter { ast: self, cur: head }
    }

    pub fn chain_len(&self, head: Option<NodeId>) -> usize {
        self.iter_chain(head).count()
    }

    /// Last node of the chain containing `n`.
    pub fn tail_of(&self, n: NodeId) -> NodeId {
        let mut cur = n;
        while let Some(nx) = self.nodes[cur].next {
            cur = nx;
        }
        cur
    }

    fn slot_of(&self, parent: NodeId, child: NodeId) -> usize {
        self.nodes[parent]
            .ops
            .iter()
            .position(|&o| o == Some(child))
            .unwrap_or_else(|| {
                unreachable!("back link does not match any child slot")
            })
    }
}

/// Iterator over a sibling chain.
pub struct ChainIter<'a> {
    ast: &'a Ast,
    cur: Option<NodeId>,
}

impl Iterator for ChainIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let n = self.cur?;
        self.cur = self.ast.next(n);
        Some(n)
    }
}
