//! Unroll bounded loops by symbolically executing their headers.
//!
//! The pass serves two callers. Elaboration calls
//! [`UnrollLoops::unroll_gen`] on each generate-for before scopes are
//! created; those loops must unroll, and failures are user errors reported
//! at the loop. After scope elaboration the whole netlist goes through
//! [`UnrollLoops::unroll_all`], which unrolls procedural while-loops on a
//! best-effort basis and leaves anything it cannot prove bounded for the
//! later jump-lowering pass.
//!
//! A loop is expanded only after the header recognizer accepts its shape,
//! the mutation check proves the body never assigns an induction variable,
//! and (outside generate mode) the trip-count estimator bounds it within
//! the configured cap. Soft failures leave the tree untouched.

use crate::analysis::SymEval;
use crate::pass_manager::PassResult;
use crate::passes::const_fold;
use crate::stats::Statistics;
use crate::traversal::{
    self, Action, ConstructVisitor, DiagnosticContext, DiagnosticPass, Named,
    ParseVal, PassOpt, VisResult, Visitor,
};
use quartz_ir::{
    encode_number, Ast, Context, DataType, NodeId, NodeKind, Num, ScopeId,
    VarId,
};
use quartz_utils::{Error, QuartzResult};
use std::collections::HashSet;
use std::thread::{self, ThreadId};

/// One induction variable of the loop currently being unrolled. For
/// `for (i = 0; ...; i = i + 1, k = i * 2)` the table holds `i` and `k`.
#[derive(Debug)]
struct VarState {
    var: VarId,
    scope: Option<ScopeId>,
    /// Current symbolic value; absent until the init pre-step seeds it.
    value: Option<Num>,
    /// Detached constant node mirroring `value`, cloned into iteration
    /// bodies at each substitution site.
    konst: Option<NodeId>,
}

#[derive(Debug)]
pub struct UnrollLoops {
    /// Expanding a single generate-for under the elaboration contract.
    generate: bool,
    /// Name prefix for per-iteration generate blocks.
    begin_name: String,
    /// Induction variables in source order. Lookups are linear; headers
    /// carry one to four of these.
    for_vars: Vec<VarState>,
    /// Increment-list roots whose canonical self-assignments must not
    /// count as body mutations.
    ignore_incs: HashSet<NodeId>,
    unroll_count: u64,
    unroll_stmts: u64,
    stat_loops: u64,
    stat_iters: u64,
    stats: Statistics,
    diag: DiagnosticContext,
    /// The pass is strictly single-threaded.
    owner: ThreadId,
}

impl Named for UnrollLoops {
    fn name() -> &'static str {
        "unroll-loops"
    }

    fn description() -> &'static str {
        "unroll bounded generate and procedural loops"
    }

    fn opts() -> Vec<PassOpt> {
        vec![
            PassOpt::new(
                "unroll-count",
                "maximum trip count of loops to unroll; generate loops get 16x",
                ParseVal::Num(64),
                PassOpt::parse_num,
            ),
            PassOpt::new(
                "unroll-stmts",
                "maximum number of tree nodes in an unrolled body",
                ParseVal::Num(30000),
                PassOpt::parse_num,
            ),
        ]
    }
}

impl ConstructVisitor for UnrollLoops {
    fn from(ctx: &Context) -> QuartzResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(UnrollLoops {
            generate: false,
            begin_name: String::new(),
            for_vars: Vec::new(),
            ignore_incs: HashSet::new(),
            unroll_count: opts["unroll-count"].pos_num().unwrap_or(64),
            unroll_stmts: opts["unroll-stmts"].pos_num().unwrap_or(30000),
            stat_loops: 0,
            stat_iters: 0,
            stats: Statistics::default(),
            diag: DiagnosticContext::default(),
            owner: thread::current().id(),
        })
    }

    fn clear_data(&mut self) {
        self.for_vars.clear();
        self.ignore_incs.clear();
    }
}

impl DiagnosticPass for UnrollLoops {
    fn diagnostics(&self) -> &DiagnosticContext {
        &self.diag
    }
}

impl UnrollLoops {
    /// Mandatory elaboration-time unrolling of a single generate-for.
    /// Iterations come back wrapped in generate blocks named after
    /// `begin_name` and the index value. Failures are user errors at the
    /// loop's source location; the tree below other loops is untouched.
    pub fn unroll_gen(
        ctx: &mut Context,
        node: NodeId,
        begin_name: &str,
    ) -> PassResult<Self> {
        let mut pass = <Self as ConstructVisitor>::from(ctx)?;
        pass.generate = true;
        pass.begin_name = begin_name.to_string();
        debug_assert_eq!(pass.owner, thread::current().id());
        let res = traversal::visit(&mut pass, &mut ctx.ast, node);
        ctx.ast.flush_deferred();
        res?;
        pass.flush_stats();
        if pass.diag.has_errors() {
            let errors: Vec<Error> =
                pass.diag.errors_iter().cloned().collect();
            Err(errors.into())
        } else {
            Ok(pass)
        }
    }

    /// Best-effort unrolling of every procedural loop below the netlist
    /// root. Loops that cannot be unrolled stay in place and are counted
    /// under a labeled give-up reason. Returns the finished pass so callers
    /// can inspect [`UnrollLoops::stats`].
    pub fn unroll_all(ctx: &mut Context) -> QuartzResult<Self> {
        let mut pass = <Self as ConstructVisitor>::from(ctx)?;
        pass.do_pass(ctx)?;
        Ok(pass)
    }

    /// Counters accumulated by this pass instance.
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    fn unroll_limit(&self) -> u64 {
        if self.generate {
            self.unroll_count * 16
        } else {
            self.unroll_count
        }
    }

    fn find_variable(
        &self,
        var: VarId,
        scope: Option<ScopeId>,
    ) -> Option<usize> {
        self.for_vars
            .iter()
            .position(|s| s.var == var && s.scope == scope)
    }

    /// Record a soft failure: count it, and promote it to a user error
    /// under the mandatory generate contract.
    fn cant_unroll(
        &mut self,
        ast: &Ast,
        node: NodeId,
        reason: &str,
    ) -> QuartzResult<bool> {
        if self.generate {
            self.diag.err(
                Error::papercut(format!(
                    "Unsupported: can't unroll generate for; {}",
                    reason
                ))
                .with_pos(ast.pos(node)),
            );
        }
        log::debug!("   can't unroll: {}", reason);
        self.stats.add_sum(format!("Unrolling gave up, {}", reason), 1);
        Ok(false)
    }

    fn flush_stats(&mut self) {
        self.stats.add_sum(
            "Optimizations, Unrolled Loops",
            std::mem::take(&mut self.stat_loops),
        );
        self.stats.add_sum(
            "Optimizations, Unrolled Iterations",
            std::mem::take(&mut self.stat_iters),
        );
        self.stats.report();
    }

    // ===== body-size estimate =====

    /// Count nodes below `head` (following both children and siblings) and
    /// report whether the count exceeds `limit`. Short-circuits on the way
    /// so rejection stays cheap for huge bodies.
    fn body_size_over(
        &self,
        ast: &Ast,
        head: Option<NodeId>,
        size: &mut u64,
        limit: u64,
    ) -> bool {
        let Some(n) = head else {
            return false;
        };
        *size += 1;
        if *size > limit {
            return true;
        }
        for slot in 0..4 {
            if self.body_size_over(ast, ast.op(n, slot), size, limit) {
                return true;
            }
        }
        self.body_size_over(ast, ast.next(n), size, limit)
    }

    // ===== evaluator frontends =====

    /// Ask the evaluator whether `node` could be computed once induction
    /// variables are bound. The evaluator may rewrite what it is fed, so it
    /// gets a clone.
    fn can_simulate(&self, ast: &mut Ast, node: NodeId) -> bool {
        let clone = ast.clone_tree(node, false);
        let mut sim = SymEval::new();
        sim.main_check_tree(ast, clone);
        ast.defer_delete(clone);
        sim.optimizable()
    }

    /// Compute the value of an expression under the current
    /// induction-variable bindings. `dtype` is the cast applied to the
    /// result, normally the type of the assignment target.
    fn simulate_tree(
        &self,
        ast: &mut Ast,
        node: NodeId,
        dtype: Option<DataType>,
    ) -> Option<Num> {
        let clone = ast.clone_tree(node, false);
        if !self.for_vars.is_empty() {
            self.substitute_refs(ast, Some(clone));
        }
        let mut sim = SymEval::new();
        sim.main_param_emulate(ast, clone);
        let result = if !sim.optimizable() {
            log::debug!(
                "unable to simulate: {}",
                sim.why_not().unwrap_or("unknown")
            );
            None
        } else {
            match sim.fetch_num(clone) {
                Some(res) => Some(match dtype {
                    Some(dt) => res.cast(dt),
                    None => res.clone(),
                }),
                None => {
                    log::debug!("no number returned from simulation");
                    None
                }
            }
        };
        ast.defer_delete(clone);
        result
    }

    // ===== the CHECK walk =====

    /// Walk a subtree looking for assignments to induction variables,
    /// skipping the recorded increment roots whose self-assignments are
    /// canonical.
    fn check_walk(&self, ast: &Ast, head: Option<NodeId>, hit: &mut bool) {
        for n in ast.iter_chain(head) {
            if self.ignore_incs.contains(&n) {
                continue;
            }
            if let NodeKind::VarRef {
                var,
                scope,
                lvalue: true,
            } = ast.kind(n)
            {
                if self.find_variable(*var, *scope).is_some() {
                    log::debug!(
                        "   induction variable assigned inside loop: {}",
                        ast.var(*var).name
                    );
                    *hit = true;
                }
            }
            for slot in 0..4 {
                self.check_walk(ast, ast.op(n, slot), hit);
            }
        }
    }

    // ===== the REPLACE walk =====

    /// Substitute every rvalue reference to an induction variable with its
    /// current constant. Only ever applied to detached clones, except when
    /// the evaluator is fed a clone whose live original stays pristine.
    fn substitute_refs(&self, ast: &mut Ast, head: Option<NodeId>) {
        let mut cur = head;
        while let Some(n) = cur {
            cur = ast.next(n);
            if let NodeKind::VarRef {
                var,
                scope,
                lvalue: false,
            } = *ast.kind(n)
            {
                if let Some(idx) = self.find_variable(var, scope) {
                    if let Some(konst) = self.for_vars[idx].konst {
                        // A reference has no children, so the constant can
                        // take its place without relinking.
                        let NodeKind::Const(num) = ast.kind(konst).clone()
                        else {
                            unreachable!(
                                "induction record holds a non-constant node"
                            )
                        };
                        *ast.kind_mut(n) = NodeKind::Const(num);
                        continue;
                    }
                }
            }
            for slot in 0..4 {
                let child = ast.op(n, slot);
                self.substitute_refs(ast, child);
            }
        }
    }

    // ===== header seeding and stepping =====

    /// Seed every induction-variable record from its init assignment,
    /// evaluated under the bindings accumulated so far (later inits may
    /// reference earlier indices).
    fn seed_inits(&mut self, ast: &mut Ast, inits: &[NodeId]) -> bool {
        for &init in inits {
            let Some(rhs) = ast.op(init, 0) else {
                return false;
            };
            let Some((var, scope)) = assigned_variable(ast, init) else {
                return false;
            };
            let dtype = ast.var(var).dtype;
            let Some(value) = self.simulate_tree(ast, rhs, Some(dtype)) else {
                return false;
            };
            let konst =
                ast.add(NodeKind::Const(value.clone()), ast.pos(init));
            let Some(idx) = self.find_variable(var, scope) else {
                unreachable!("init variable missing from induction table")
            };
            let state = &mut self.for_vars[idx];
            let old = state.konst.replace(konst);
            state.value = Some(value);
            if let Some(old) = old {
                ast.defer_delete(old);
            }
        }
        true
    }

    /// Evaluate one increment assignment's right-hand side and step the
    /// variable's record forward, width-preserving.
    fn apply_increment(&mut self, ast: &mut Ast, inc: NodeId) -> bool {
        let Some(rhs) = ast.op(inc, 0) else {
            return false;
        };
        let Some((var, scope)) = assigned_variable(ast, inc) else {
            return false;
        };
        let dtype = ast.var(var).dtype;
        let Some(new_value) = self.simulate_tree(ast, rhs, Some(dtype)) else {
            return false;
        };
        let Some(idx) = self.find_variable(var, scope) else {
            unreachable!("increment variable missing from induction table")
        };
        let old = {
            let state = &mut self.for_vars[idx];
            match &mut state.value {
                Some(v) => v.assign(&new_value),
                None => state.value = Some(new_value),
            }
            state.konst.take()
        };
        if let Some(old) = old {
            ast.defer_delete(old);
        }
        let Some(num) = self.for_vars[idx].value.clone() else {
            unreachable!("induction value vanished mid-step")
        };
        let konst = ast.add(NodeKind::Const(num), ast.pos(inc));
        self.for_vars[idx].konst = Some(konst);
        true
    }

    // ===== trip-count estimate =====

    /// Symbolically execute the header to count iterations. `None` means
    /// the loop could not be proven bounded within the cap.
    fn count_loops(
        &mut self,
        ast: &mut Ast,
        inits: &[NodeId],
        cond: NodeId,
        incs: &[NodeId],
    ) -> Option<u64> {
        if !self.seed_inits(ast, inits) {
            return None;
        }
        let max = self.unroll_limit();
        let mut count = 0u64;
        loop {
            let res = self.simulate_tree(ast, cond, None)?;
            if !res.is_one() {
                break;
            }
            count += 1;
            for &inc in incs {
                if !self.apply_increment(ast, inc) {
                    return None;
                }
            }
            if count > max {
                return None;
            }
        }
        Some(count)
    }

    // ===== the full check chain =====

    /// Validate the decomposed header, prove the body safe, bound the trip
    /// count, and expand. Releases the induction table on every exit so a
    /// give-up cannot leak records into the next loop's check.
    #[allow(clippy::too_many_arguments)]
    fn for_unroll_check(
        &mut self,
        ast: &mut Ast,
        node: NodeId,
        inits: Vec<NodeId>,
        preconds: Option<NodeId>,
        cond: NodeId,
        incs: Option<NodeId>,
        body: Option<NodeId>,
    ) -> QuartzResult<bool> {
        let result = self.for_unroll_check_inner(
            ast, node, &inits, preconds, cond, incs, body,
        );
        for state in std::mem::take(&mut self.for_vars) {
            if let Some(konst) = state.konst {
                ast.defer_delete(konst);
            }
        }
        self.ignore_incs.clear();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn for_unroll_check_inner(
        &mut self,
        ast: &mut Ast,
        node: NodeId,
        inits: &[NodeId],
        preconds: Option<NodeId>,
        cond: NodeId,
        incs: Option<NodeId>,
        body: Option<NodeId>,
    ) -> QuartzResult<bool> {
        log::debug!(" FOR check {}", ast.kind(node).tag());

        // Initial value check: every init element must assign a simple
        // variable.
        for &init in inits {
            if !matches!(ast.kind(init), NodeKind::Assign) {
                return self.cant_unroll(
                    ast,
                    node,
                    "Invalid initial assignment",
                );
            }
            let Some((var, scope)) = assigned_variable(ast, init) else {
                return self.cant_unroll(
                    ast,
                    node,
                    "Not an initial assignment to simple variable",
                );
            };
            self.for_vars.push(VarState {
                var,
                scope,
                value: None,
                konst: None,
            });
        }

        // The condition must be a single expression.
        if ast.next(cond).is_some() {
            return Err(Error::pass_assumption(
                Self::name(),
                "conditional shouldn't be a list",
            )
            .with_pos(ast.pos(cond)));
        }

        // Assignment-of-next-value check; left-hand identities merge into
        // the induction table.
        let inc_list: Vec<NodeId> = ast.iter_chain(incs).collect();
        for &inc in &inc_list {
            if !matches!(ast.kind(inc), NodeKind::Assign) {
                return self.cant_unroll(
                    ast,
                    node,
                    "no increment assignment",
                );
            }
            self.ignore_incs.insert(inc);
            let Some((var, scope)) = assigned_variable(ast, inc) else {
                return self.cant_unroll(
                    ast,
                    node,
                    "no increment assignment",
                );
            };
            if self.find_variable(var, scope).is_none() {
                self.for_vars.push(VarState {
                    var,
                    scope,
                    value: None,
                    konst: None,
                });
            }
        }

        // Only the first init is required to fold to a constant; later
        // inits may legitimately reference earlier induction variables.
        if let Some(&first) = inits.first() {
            let Some(rhs) = ast.op(first, 0) else {
                return self.cant_unroll(
                    ast,
                    node,
                    "non-constant initializer",
                );
            };
            if !matches!(ast.kind(rhs), NodeKind::Const(_)) {
                return self.cant_unroll(
                    ast,
                    node,
                    "non-constant initializer",
                );
            }
        }

        // Generate loops take exactly one index, and it must be a genvar.
        if matches!(ast.kind(node), NodeKind::GenFor) {
            let first_var = self.for_vars[0].var;
            if !ast.var(first_var).genvar {
                self.diag.err(
                    Error::papercut(format!(
                        "Non-genvar used in generate for: {}",
                        ast.var(first_var).name
                    ))
                    .with_pos(ast.pos(node)),
                );
            }
        }
        if self.generate {
            if let Some(&first) = inits.first() {
                if let Some(rhs) = ast.op(first, 0) {
                    const_fold::fold_in_place(ast, rhs);
                }
            }
        }

        // Now make sure nothing inside the loop assigns to an induction
        // variable.
        let mut hit = false;
        self.check_walk(ast, preconds, &mut hit);
        self.check_walk(ast, body, &mut hit);
        self.check_walk(ast, incs, &mut hit);
        if hit {
            return self.cant_unroll(
                ast,
                node,
                "genvar assigned *inside* loop",
            );
        }

        let mut loops = 0u64;
        if !self.generate {
            for &inc in &inc_list {
                let Some(rhs) = ast.op(inc, 0) else {
                    return self.cant_unroll(
                        ast,
                        node,
                        "no increment assignment",
                    );
                };
                if !self.can_simulate(ast, rhs) {
                    return self.cant_unroll(
                        ast,
                        node,
                        "Unable to simulate increment",
                    );
                }
            }
            if !self.can_simulate(ast, cond) {
                return self.cant_unroll(
                    ast,
                    node,
                    "Unable to simulate condition",
                );
            }
            match self.count_loops(ast, inits, cond, &inc_list) {
                Some(l) => loops = l,
                None => {
                    return self.cant_unroll(
                        ast,
                        node,
                        "Unable to simulate loop",
                    );
                }
            }
        }

        // Size check: bigger loops tolerate fewer statements per
        // iteration. Generate loops have no trip estimate and keep the
        // whole budget.
        let mut body_limit = self.unroll_stmts;
        if loops > 0 {
            body_limit = std::cmp::max(1, self.unroll_stmts / loops);
        }
        let mut body_size = 0u64;
        if self.body_size_over(ast, preconds, &mut body_size, body_limit)
            || self.body_size_over(ast, body, &mut body_size, body_limit)
            || self.body_size_over(ast, incs, &mut body_size, body_limit)
        {
            return self.cant_unroll(ast, node, "too many statements");
        }

        if !self.for_unroller(ast, node, inits, cond, preconds, incs, body)? {
            return self.cant_unroll(ast, node, "Unable to unroll loop");
        }
        Ok(true)
    }

    // ===== the expander =====

    /// Clone and substitute the loop contents once per iteration, stepping
    /// the induction state forward, then replace the loop node with the
    /// accumulated sequence.
    #[allow(clippy::too_many_arguments)]
    fn for_unroller(
        &mut self,
        ast: &mut Ast,
        node: NodeId,
        inits: &[NodeId],
        cond: NodeId,
        preconds: Option<NodeId>,
        incs: Option<NodeId>,
        body: Option<NodeId>,
    ) -> QuartzResult<bool> {
        log::debug!("unrolling {}", ast.kind(node).tag());
        // Re-seed: the trip-count estimator's final state was discarded.
        if !self.seed_inits(ast, inits) {
            return Ok(false);
        }

        // Init assignments are not emitted; constant propagation of the
        // index makes them redundant.
        for &init in inits {
            ast.unlink(init);
        }
        if let Some(p) = preconds {
            ast.unlink_with_next(p);
        }
        let mut body_head = body;
        if let Some(b) = body {
            ast.unlink_with_next(b);
        }
        let gen_for = matches!(ast.kind(node), NodeKind::GenFor);
        let mut incs_detached = false;
        if !gen_for {
            if let Some(i) = incs {
                // The increment may sit at the tail of the just-detached
                // body chain; splitting it off can empty the body.
                if body_head == Some(i) {
                    body_head = None;
                }
                ast.unlink_with_next(i);
                incs_detached = true;
            }
        }
        let stmts = ast.add_next_opt(preconds, body_head);

        // Loop indices count as used even though every read becomes a
        // constant.
        for state in &self.for_vars {
            ast.var_mut(state.var).used_loop_idx = true;
        }

        let mut newbody: Option<NodeId> = None;
        self.stat_loops += 1;
        if let Some(stmts) = stmts {
            let mut times = 0u64;
            loop {
                let Some(res) = self.simulate_tree(ast, cond, None) else {
                    // The estimator already simulated this header; failing
                    // now is an internal inconsistency.
                    return Err(Error::pass_assumption(
                        Self::name(),
                        "loop unrolling failed",
                    )
                    .with_pos(ast.pos(node)));
                };
                if !res.is_one() {
                    break;
                }

                let head = ast.clone_tree(stmts, true);
                let iter_pos = ast.pos(head);
                self.substitute_refs(ast, Some(head));
                let mut oneloop = Some(head);
                // This iteration's index value, read before the increments
                // advance it: it names the generate block below.
                let gen_index = if self.generate {
                    let Some(value) = self.for_vars[0].value.as_ref() else {
                        unreachable!("generate index was never seeded")
                    };
                    Some(value.to_i64())
                } else {
                    None
                };
                if let Some(i) = incs {
                    let inc_clone = ast.clone_tree(i, true);
                    self.substitute_refs(ast, Some(inc_clone));
                    let inc_elems: Vec<NodeId> =
                        ast.iter_chain(Some(inc_clone)).collect();
                    for inc in inc_elems {
                        if !self.apply_increment(ast, inc) {
                            return Err(Error::pass_assumption(
                                Self::name(),
                                "loop unrolling failed",
                            )
                            .with_pos(ast.pos(node)));
                        }
                    }
                    if gen_for {
                        // The index is dead once substituted; generate
                        // loops never emit their increments.
                        ast.defer_delete(inc_clone);
                    } else {
                        oneloop =
                            ast.add_next_opt(oneloop, Some(inc_clone));
                    }
                }
                if let Some(ix) = gen_index {
                    let name = format!(
                        "{}__BRA__{}__KET__",
                        self.begin_name,
                        encode_number(ix)
                    );
                    let begin = ast.add(
                        NodeKind::Begin {
                            name: name.into(),
                            generate: true,
                        },
                        iter_pos,
                    );
                    if let Some(ol) = oneloop {
                        ast.set_op(begin, 0, ol);
                    }
                    oneloop = Some(begin);
                }
                newbody = ast.add_next_opt(newbody, oneloop);

                self.stat_iters += 1;
                times += 1;
                if times > self.unroll_limit() * 3 {
                    return Err(Error::pass_assumption(
                        Self::name(),
                        format!(
                            "Loop unrolling took too long; probably this is \
                             an infinite loop, or set unroll-count above {}",
                            self.unroll_limit()
                        ),
                    )
                    .with_pos(ast.pos(node)));
                }
            }
        }

        // Swap the loop for its expansion.
        match newbody {
            Some(nb) => ast.replace_with(node, nb),
            None => {
                ast.unlink(node);
            }
        }
        if let Some(s) = stmts {
            ast.defer_delete(s);
        }
        for &init in inits {
            ast.defer_delete(init);
        }
        if incs_detached {
            if let Some(i) = incs {
                ast.defer_delete(i);
            }
        }
        Ok(true)
    }

    // ===== per-variant drivers =====

    /// Optimization-time handling of a procedural while-loop.
    fn try_unroll_while(
        &mut self,
        ast: &mut Ast,
        node: NodeId,
    ) -> QuartzResult<bool> {
        // Constify before the header check, as folding may change what is
        // underneath.
        let preconds = ast.op(node, 0);
        fold_chain(ast, preconds);
        if let Some(c) = ast.op(node, 1) {
            const_fold::fold_in_place(ast, c);
        }

        // The init list is whatever statements precede the loop in its
        // enclosing statement list. A loop heading its list has none.
        let mut inits = Vec::new();
        {
            let mut first = node;
            while ast.has_prev_sibling(first) {
                let Some(prev) = ast.back(first) else {
                    break;
                };
                first = prev;
            }
            let mut cur = Some(first);
            while let Some(c) = cur {
                if c == node {
                    break;
                }
                let next = ast.next(c);
                inits.push(const_fold::fold_in_place(ast, c));
                cur = next;
            }
        }

        // Increments: the dedicated slot when present, otherwise the tail
        // statement of the body, re-identified after folding rewrites it.
        let inc_slot = ast.op(node, 3);
        fold_chain(ast, inc_slot);
        let incs = match ast.op(node, 3) {
            Some(i) => Some(i),
            None => {
                let tail = ast.iter_chain(ast.op(node, 2)).last();
                if let Some(tail) = tail {
                    const_fold::fold_in_place(ast, tail);
                }
                ast.iter_chain(ast.op(node, 2)).last()
            }
        };

        let preconds = ast.op(node, 0);
        let Some(cond) = ast.op(node, 1) else {
            return Err(Error::pass_assumption(
                Self::name(),
                "while loop has no condition",
            )
            .with_pos(ast.pos(node)));
        };
        let body = ast.op(node, 2);
        self.for_unroll_check(ast, node, inits, preconds, cond, incs, body)
    }

    /// Elaboration-time handling of a generate-for.
    fn expand_gen_for(
        &mut self,
        ast: &mut Ast,
        node: NodeId,
    ) -> QuartzResult<()> {
        // Constify the header pieces; each may be replaced in place.
        let inits = ast.op(node, 0);
        fold_chain(ast, inits);
        if let Some(c) = ast.op(node, 1) {
            const_fold::fold_in_place(ast, c);
        }
        let incs = ast.op(node, 2);
        fold_chain(ast, incs);

        let Some(cond) = ast.op(node, 1) else {
            return Err(Error::pass_assumption(
                Self::name(),
                "generate for has no condition",
            )
            .with_pos(ast.pos(node)));
        };
        let zero_trip =
            matches!(ast.kind(cond), NodeKind::Const(num) if num.is_zero());
        if zero_trip {
            // Zero-trip generate loops simply vanish: the index is a
            // synthetic parameter, so no pre-state needs to survive.
            ast.unlink(node);
            ast.defer_delete(node);
            return Ok(());
        }

        // A generate header considers exactly one init assignment.
        let body = ast.op(node, 3);
        let incs = ast.op(node, 2);
        let did = match ast.op(node, 0) {
            Some(init) => self.for_unroll_check(
                ast,
                node,
                vec![init],
                None,
                cond,
                incs,
                body,
            )?,
            None => {
                self.cant_unroll(ast, node, "Invalid initial assignment")?
            }
        };
        if did {
            ast.defer_delete(node);
        } else {
            self.diag.err(
                Error::papercut(
                    "For loop doesn't have genvar index, or is malformed",
                )
                .with_pos(ast.pos(node)),
            );
        }
        Ok(())
    }
}

impl Visitor for UnrollLoops {
    fn start(&mut self, _ctx: &mut Context) -> VisResult {
        debug_assert_eq!(
            self.owner,
            thread::current().id(),
            "unroll pass crossed threads"
        );
        Ok(Action::Continue)
    }

    fn finish(&mut self, _ctx: &mut Context) -> VisResult {
        debug_assert_eq!(
            self.owner,
            thread::current().id(),
            "unroll pass crossed threads"
        );
        self.flush_stats();
        Ok(Action::Continue)
    }

    fn finish_while(&mut self, ast: &mut Ast, node: NodeId) -> VisResult {
        // Children are already visited, so nested loops below this one are
        // unrolled by the time its own header is examined.
        if self.try_unroll_while(ast, node)? {
            ast.defer_delete(node);
        }
        Ok(Action::Continue)
    }

    fn start_gen_for(&mut self, ast: &mut Ast, node: NodeId) -> VisResult {
        if !self.generate {
            // The elaborator drives generate loops one at a time; at
            // optimization time we only traverse through them.
            return Ok(Action::Continue);
        }
        self.expand_gen_for(ast, node)?;
        Ok(Action::SkipChildren)
    }

    fn start_for(&mut self, ast: &mut Ast, node: NodeId) -> VisResult {
        if self.generate {
            Ok(Action::Continue)
        } else {
            Err(Error::pass_assumption(
                Self::name(),
                "procedural for-loop should have been rewritten to a while \
                 before unrolling",
            )
            .with_pos(ast.pos(node)))
        }
    }
}

/// Fold every statement of a sibling chain in place.
fn fold_chain(ast: &mut Ast, head: Option<NodeId>) {
    let mut cur = head;
    while let Some(c) = cur {
        cur = ast.next(c);
        const_fold::fold_in_place(ast, c);
    }
}

/// The variable identity a simple assignment writes, if its left-hand side
/// is a plain reference.
fn assigned_variable(
    ast: &Ast,
    assign: NodeId,
) -> Option<(VarId, Option<ScopeId>)> {
    let lhs = ast.op(assign, 1)?;
    match *ast.kind(lhs) {
        NodeKind::VarRef { var, scope, .. } => Some((var, scope)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_ir::{BinOp, Builder, Printer};

    /// Number of loop nodes anywhere below `head`'s chain.
    fn loop_count(ast: &Ast, head: Option<NodeId>) -> usize {
        let mut count = 0;
        for n in ast.iter_chain(head) {
            if matches!(
                ast.kind(n),
                NodeKind::While | NodeKind::GenFor | NodeKind::For
            ) {
                count += 1;
            }
            for slot in 0..4 {
                count += loop_count(ast, ast.op(n, slot));
            }
        }
        count
    }

    /// True when an rvalue reference to `var` survives below `head`.
    fn reads_var(ast: &Ast, head: Option<NodeId>, var: VarId) -> bool {
        for n in ast.iter_chain(head) {
            if let NodeKind::VarRef {
                var: v,
                lvalue: false,
                ..
            } = ast.kind(n)
            {
                if *v == var {
                    return true;
                }
            }
            for slot in 0..4 {
                if reads_var(ast, ast.op(n, slot), var) {
                    return true;
                }
            }
        }
        false
    }

    /// The constant an assignment's right-hand side carries.
    fn rhs_value(ast: &Ast, assign: NodeId) -> i64 {
        let rhs = ast.op(assign, 0).unwrap();
        match ast.kind(rhs) {
            NodeKind::Const(num) => num.to_i64(),
            k => panic!("expected a constant rhs, got {}", k.tag()),
        }
    }

    /// `i = 0; while (i < bound) { x = x + i; i = i + 1; }` inside a block
    /// appended to the netlist.
    fn counted_loop(ctx: &mut Context, bound: i64) -> (NodeId, VarId, VarId) {
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let xr = b.rvalue(x, None);
        let ir = b.rvalue(i, None);
        let sum = b.binary(BinOp::Add, xr, ir);
        let body = b.assign_var(x, None, sum);
        let ir = b.rvalue(i, None);
        let bound = b.int(bound);
        let cond = b.binary(BinOp::Lt, ir, bound);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let w = b.while_stmt(None, cond, Some(body), Some(inc));
        let blk = b.begin("always", false, vec![init, w]);
        b.push_stmt(root, blk);
        (blk, i, x)
    }

    #[test]
    fn unrolls_a_trivial_counted_loop() {
        let mut ctx = Context::new();
        let (blk, i, _) = counted_loop(&mut ctx, 3);

        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Loops"),
            1
        );
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Iterations"),
            3
        );

        // Three copies of body-then-increment; the init is not emitted.
        let stmts: Vec<_> = ctx.ast.iter_chain(ctx.ast.op(blk, 0)).collect();
        assert_eq!(
            stmts.len(),
            6,
            "unexpected expansion:\n{}",
            Printer::tree_string(&ctx.ast, blk)
        );
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 0);
        assert!(!reads_var(&ctx.ast, Some(blk), i));

        // The k-th body copy reads i as the constant k.
        for (k, &stmt) in stmts.iter().step_by(2).enumerate() {
            let rhs = ctx.ast.op(stmt, 0).unwrap();
            assert!(matches!(
                ctx.ast.kind(rhs),
                NodeKind::Binary(BinOp::Add)
            ));
            let addend = ctx.ast.op(rhs, 1).unwrap();
            match ctx.ast.kind(addend) {
                NodeKind::Const(num) => assert_eq!(num.to_i64(), k as i64),
                k => panic!("expected a substituted constant, got {}", k.tag()),
            }
        }
    }

    #[test]
    fn gives_up_on_a_non_constant_bound() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let n = b.add_var("n", DataType::int());
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let ir = b.rvalue(i, None);
        let body = b.assign_var(x, None, ir);
        let ir = b.rvalue(i, None);
        let nr = b.rvalue(n, None);
        let cond = b.binary(BinOp::Lt, ir, nr);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let w = b.while_stmt(None, cond, Some(body), Some(inc));
        let blk = b.begin("always", false, vec![init, w]);
        b.push_stmt(root, blk);

        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Loops"),
            0
        );
        assert_eq!(
            pass.stats()
                .sum_named("Unrolling gave up, Unable to simulate loop"),
            1
        );
        // The loop is left intact: init and while, in place.
        let stmts: Vec<_> = ctx.ast.iter_chain(ctx.ast.op(blk, 0)).collect();
        assert_eq!(stmts.len(), 2);
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 1);
    }

    #[test]
    fn expands_generate_iterations_into_named_blocks() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_genvar("i");
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let ir = b.rvalue(i, None);
        let two = b.int(2);
        let cond = b.binary(BinOp::Lt, ir, two);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let ir = b.rvalue(i, None);
        let body = b.assign_var(x, None, ir);
        let gf = b.gen_for(init, cond, inc, Some(body));
        b.push_stmt(root, gf);

        let pass = UnrollLoops::unroll_gen(&mut ctx, gf, "g").unwrap();
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Iterations"),
            2
        );

        let blocks: Vec<_> =
            ctx.ast.iter_chain(ctx.ast.op(root, 0)).collect();
        assert_eq!(blocks.len(), 2);
        for (k, &block) in blocks.iter().enumerate() {
            match ctx.ast.kind(block) {
                NodeKind::Begin { name, generate } => {
                    assert!(*generate);
                    let expected = format!("g__BRA__{}__KET__", k);
                    assert_eq!(name.as_ref(), expected.as_str());
                }
                other => panic!("expected a begin, got {}", other.tag()),
            }
            // Exactly the substituted body; generate loops never emit
            // their increments.
            let inner: Vec<_> =
                ctx.ast.iter_chain(ctx.ast.op(block, 0)).collect();
            assert_eq!(inner.len(), 1);
            assert_eq!(rhs_value(&ctx.ast, inner[0]), k as i64);
        }
        assert_eq!(loop_count(&ctx.ast, Some(root)), 0);
    }

    #[test]
    fn zero_trip_generate_loop_vanishes() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_genvar("i");
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let cond = b.konst(0, DataType::BIT);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let ir = b.rvalue(i, None);
        let body = b.assign_var(x, None, ir);
        let gf = b.gen_for(init, cond, inc, Some(body));
        b.push_stmt(root, gf);

        let pass = UnrollLoops::unroll_gen(&mut ctx, gf, "g").unwrap();
        assert_eq!(ctx.ast.op(root, 0), None);
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Loops"),
            0
        );
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Iterations"),
            0
        );
    }

    #[test]
    fn threads_multiple_induction_variables() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let j = b.add_var("j", DataType::int());
        let y = b.add_var("y", DataType::int());
        // i = 0; j = i + 1
        let zero = b.int(0);
        let init_i = b.assign_var(i, None, zero);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let sum = b.binary(BinOp::Add, ir, one);
        let init_j = b.assign_var(j, None, sum);
        // while (i < 3) { y = j; } with i++, j = j * 2
        let ir = b.rvalue(i, None);
        let three = b.int(3);
        let cond = b.binary(BinOp::Lt, ir, three);
        let jr = b.rvalue(j, None);
        let body = b.assign_var(y, None, jr);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next_i = b.binary(BinOp::Add, ir, one);
        let inc_i = b.assign_var(i, None, next_i);
        let jr = b.rvalue(j, None);
        let two = b.int(2);
        let next_j = b.binary(BinOp::Mul, jr, two);
        let inc_j = b.assign_var(j, None, next_j);
        let incs = b.stmts(vec![inc_i, inc_j]).unwrap();
        let w = b.while_stmt(None, cond, Some(body), Some(incs));
        let blk = b.begin("always", false, vec![init_i, init_j, w]);
        b.push_stmt(root, blk);

        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Iterations"),
            3
        );

        // Each iteration emits body, then both increments; inits are gone.
        let stmts: Vec<_> = ctx.ast.iter_chain(ctx.ast.op(blk, 0)).collect();
        assert_eq!(
            stmts.len(),
            9,
            "unexpected expansion:\n{}",
            Printer::tree_string(&ctx.ast, blk)
        );
        // The k-th body copy sees the k-th value pair: j = 1, 2, 4.
        assert_eq!(rhs_value(&ctx.ast, stmts[0]), 1);
        assert_eq!(rhs_value(&ctx.ast, stmts[3]), 2);
        assert_eq!(rhs_value(&ctx.ast, stmts[6]), 4);
    }

    #[test]
    fn caps_runaway_trip_counts() {
        let mut ctx = Context::new();
        let (blk, _, _) = counted_loop(&mut ctx, 1_000_000);

        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats()
                .sum_named("Unrolling gave up, Unable to simulate loop"),
            1
        );
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Loops"),
            0
        );
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 1);
    }

    #[test]
    fn rejects_body_assignment_to_the_index() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        // the offending write hides inside a conditional
        let xr = b.rvalue(x, None);
        let xr2 = b.rvalue(x, None);
        let write = b.assign_var(i, None, xr);
        let body = b.if_stmt(xr2, Some(write), None);
        let ir = b.rvalue(i, None);
        let three = b.int(3);
        let cond = b.binary(BinOp::Lt, ir, three);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let w = b.while_stmt(None, cond, Some(body), Some(inc));
        let blk = b.begin("always", false, vec![init, w]);
        b.push_stmt(root, blk);

        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats()
                .sum_named("Unrolling gave up, genvar assigned *inside* loop"),
            1
        );
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 1);
    }

    #[test]
    fn respects_the_statement_budget() {
        let mut ctx = Context::new();
        ctx.extra_opts = vec!["unroll-loops:unroll-stmts=2".to_string()];
        let (blk, _, _) = counted_loop(&mut ctx, 3);

        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats()
                .sum_named("Unrolling gave up, too many statements"),
            1
        );
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 1);
    }

    #[test]
    fn loop_heading_its_block_has_no_inits() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let x = b.add_var("x", DataType::int());
        let ir = b.rvalue(i, None);
        let body = b.assign_var(x, None, ir);
        let ir = b.rvalue(i, None);
        let three = b.int(3);
        let cond = b.binary(BinOp::Lt, ir, three);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let w = b.while_stmt(None, cond, Some(body), Some(inc));
        let blk = b.begin("always", false, vec![w]);
        b.push_stmt(root, blk);

        // No preceding siblings means an empty init list; the index is
        // never seeded, so the condition cannot be simulated.
        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats()
                .sum_named("Unrolling gave up, Unable to simulate loop"),
            1
        );
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 1);
    }

    #[test]
    fn preconditions_replicate_per_iteration() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let p = b.add_var("p", DataType::int());
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let one = b.int(1);
        let precond = b.assign_var(p, None, one);
        let ir = b.rvalue(i, None);
        let body = b.assign_var(x, None, ir);
        let ir = b.rvalue(i, None);
        let two = b.int(2);
        let cond = b.binary(BinOp::Lt, ir, two);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let w = b.while_stmt(Some(precond), cond, Some(body), Some(inc));
        let blk = b.begin("always", false, vec![init, w]);
        b.push_stmt(root, blk);

        UnrollLoops::unroll_all(&mut ctx).unwrap();
        // precondition + body + increment, twice
        let stmts: Vec<_> = ctx.ast.iter_chain(ctx.ast.op(blk, 0)).collect();
        assert_eq!(
            stmts.len(),
            6,
            "unexpected expansion:\n{}",
            Printer::tree_string(&ctx.ast, blk)
        );
    }

    #[test]
    fn unrolls_nested_loops_bottom_up() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let j = b.add_var("j", DataType::int());
        let x = b.add_var("x", DataType::int());
        // inner: j = 0; while (j < 2) { x = x + j; } with j = j + 1
        let zero = b.int(0);
        let init_j = b.assign_var(j, None, zero);
        let xr = b.rvalue(x, None);
        let jr = b.rvalue(j, None);
        let sum = b.binary(BinOp::Add, xr, jr);
        let inner_body = b.assign_var(x, None, sum);
        let jr = b.rvalue(j, None);
        let two = b.int(2);
        let inner_cond = b.binary(BinOp::Lt, jr, two);
        let jr = b.rvalue(j, None);
        let one = b.int(1);
        let next_j = b.binary(BinOp::Add, jr, one);
        let inc_j = b.assign_var(j, None, next_j);
        let inner =
            b.while_stmt(None, inner_cond, Some(inner_body), Some(inc_j));
        // outer: i = 0; while (i < 2) { <inner> } with i = i + 1
        let outer_body = b.stmts(vec![init_j, inner]).unwrap();
        let zero = b.int(0);
        let init_i = b.assign_var(i, None, zero);
        let ir = b.rvalue(i, None);
        let two = b.int(2);
        let outer_cond = b.binary(BinOp::Lt, ir, two);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next_i = b.binary(BinOp::Add, ir, one);
        let inc_i = b.assign_var(i, None, next_i);
        let outer =
            b.while_stmt(None, outer_cond, Some(outer_body), Some(inc_i));
        let blk = b.begin("always", false, vec![init_i, outer]);
        b.push_stmt(root, blk);

        let pass = UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Loops"),
            2
        );
        assert_eq!(
            pass.stats().sum_named("Optimizations, Unrolled Iterations"),
            4
        );
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 0);
    }

    #[test]
    fn failing_unroll_is_idempotent() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let n = b.add_var("n", DataType::int());
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let ir = b.rvalue(i, None);
        let body = b.assign_var(x, None, ir);
        let ir = b.rvalue(i, None);
        let nr = b.rvalue(n, None);
        let cond = b.binary(BinOp::Lt, ir, nr);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let w = b.while_stmt(None, cond, Some(body), Some(inc));
        let blk = b.begin("always", false, vec![init, w]);
        b.push_stmt(root, blk);

        UnrollLoops::unroll_all(&mut ctx).unwrap();
        let after_first = Printer::tree_string(&ctx.ast, blk);
        let second = UnrollLoops::unroll_all(&mut ctx).unwrap();
        let after_second = Printer::tree_string(&ctx.ast, blk);
        assert_eq!(after_first, after_second);
        assert_eq!(
            second
                .stats()
                .sum_named("Unrolling gave up, Unable to simulate loop"),
            1
        );
    }

    #[test]
    fn scoped_references_are_other_identities() {
        use quartz_ir::Scope;
        let mut ctx = Context::new();
        let root = ctx.root;
        let inst = ctx.ast.add_scope(Scope { name: "inst".into() });
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        // The body reads `i` resolved through another scope: a different
        // variable identity, so it must survive substitution.
        let scoped = b.rvalue(i, Some(inst));
        let body = b.assign_var(x, None, scoped);
        let ir = b.rvalue(i, None);
        let two = b.int(2);
        let cond = b.binary(BinOp::Lt, ir, two);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let w = b.while_stmt(None, cond, Some(body), Some(inc));
        let blk = b.begin("always", false, vec![init, w]);
        b.push_stmt(root, blk);

        UnrollLoops::unroll_all(&mut ctx).unwrap();
        assert_eq!(loop_count(&ctx.ast, Some(blk)), 0);
        // The scoped reads survive as references.
        assert!(reads_var(&ctx.ast, Some(blk), i));
    }

    #[test]
    fn procedural_for_is_an_internal_error() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let ir = b.rvalue(i, None);
        let two = b.int(2);
        let cond = b.binary(BinOp::Lt, ir, two);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let f = b.for_stmt(init, cond, inc, None);
        b.push_stmt(root, f);

        assert!(UnrollLoops::unroll_all(&mut ctx).is_err());
    }

    #[test]
    fn generate_index_must_be_a_genvar() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let i = b.add_var("i", DataType::int());
        let x = b.add_var("x", DataType::int());
        let zero = b.int(0);
        let init = b.assign_var(i, None, zero);
        let ir = b.rvalue(i, None);
        let two = b.int(2);
        let cond = b.binary(BinOp::Lt, ir, two);
        let ir = b.rvalue(i, None);
        let one = b.int(1);
        let next = b.binary(BinOp::Add, ir, one);
        let inc = b.assign_var(i, None, next);
        let ir = b.rvalue(i, None);
        let body = b.assign_var(x, None, ir);
        let gf = b.gen_for(init, cond, inc, Some(body));
        b.push_stmt(root, gf);

        let err = UnrollLoops::unroll_gen(&mut ctx, gf, "g").unwrap_err();
        assert!(err
            .errors()
            .iter()
            .any(|e| e.message().contains("Non-genvar used in generate for")));
    }

    #[test]
    fn malformed_generate_loop_reports_user_errors() {
        let mut ctx = Context::new();
        let root = ctx.root;
        let mut b = Builder::new(&mut ctx.ast);
        let x = b.add_var("x", DataType::int());
        // the init slot holds a block instead of an assignment
        let init = b.begin("oops", false, vec![]);
        let cond = b.konst(1, DataType::BIT);
        let zero = b.int(0);
        let inc = b.assign_var(x, None, zero);
        let zero = b.int(0);
        let body = b.assign_var(x, None, zero);
        let gf = b.gen_for(init, cond, inc, Some(body));
        b.push_stmt(root, gf);

        let err = UnrollLoops::unroll_gen(&mut ctx, gf, "g").unwrap_err();
        assert!(err.errors().iter().any(|e| {
            e.message().contains("can't unroll generate for")
        }));
        assert!(err.errors().iter().any(|e| {
            e.message().contains("doesn't have genvar index")
        }));
        assert_eq!(loop_count(&ctx.ast, Some(root)), 1);
    }
}
