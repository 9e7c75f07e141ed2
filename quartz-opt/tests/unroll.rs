//! End-to-end: register the folder and the unroller with the pass manager
//! and run them the way the compiler driver would.

use quartz_ir::{BinOp, Builder, Context, DataType, NodeKind};
use quartz_opt::pass_manager::PassManager;
use quartz_opt::passes::{ConstFold, UnrollLoops};

#[test]
fn fold_then_unroll_plan() {
    let mut ctx = Context::new();
    let root = ctx.root;
    let mut b = Builder::new(&mut ctx.ast);
    let i = b.add_var("i", DataType::int());
    let x = b.add_var("x", DataType::int());
    // i = 0; while (i < 1 + 2) { x = x + i; } with i = i + 1
    let zero = b.int(0);
    let init = b.assign_var(i, None, zero);
    let xr = b.rvalue(x, None);
    let ir = b.rvalue(i, None);
    let sum = b.binary(BinOp::Add, xr, ir);
    let body = b.assign_var(x, None, sum);
    let one = b.int(1);
    let two = b.int(2);
    let bound = b.binary(BinOp::Add, one, two);
    let ir = b.rvalue(i, None);
    let cond = b.binary(BinOp::Lt, ir, bound);
    let ir = b.rvalue(i, None);
    let one = b.int(1);
    let next = b.binary(BinOp::Add, ir, one);
    let inc = b.assign_var(i, None, next);
    let w = b.while_stmt(None, cond, Some(body), Some(inc));
    let blk = b.begin("always", false, vec![init, w]);
    b.push_stmt(root, blk);

    let mut pm = PassManager::default();
    pm.register_pass::<ConstFold>().unwrap();
    pm.register_diagnostic::<UnrollLoops>().unwrap();

    pm.execute_plan(
        &mut ctx,
        &["const-fold".to_string(), "unroll-loops".to_string()],
    )
    .unwrap();

    // Three iterations of body-then-increment; no loop remains.
    let stmts: Vec<_> = ctx.ast.iter_chain(ctx.ast.op(blk, 0)).collect();
    assert_eq!(stmts.len(), 6);
    assert!(stmts
        .iter()
        .all(|&s| matches!(ctx.ast.kind(s), NodeKind::Assign)));
}

#[test]
fn unknown_pass_names_are_rejected() {
    let mut ctx = Context::new();
    let mut pm = PassManager::default();
    pm.register_pass::<ConstFold>().unwrap();
    assert!(pm
        .execute_plan(&mut ctx, &["no-such-pass".to_string()])
        .is_err());
}

#[test]
fn pass_help_lists_options() {
    let mut pm = PassManager::default();
    pm.register_diagnostic::<UnrollLoops>().unwrap();
    let help = pm.specific_help("unroll-loops").unwrap();
    assert!(help.contains("unroll-count"));
    assert!(help.contains("unroll-stmts"));
    assert!(pm.complete_help().contains("unroll-loops"));
}
