//! End-to-end exercise of the optimization core: cost the callee, inline
//! it, then combine the caller to a fixed point — the same sequencing an
//! optimization driver uses.

use sable_ir::{
    Builder, BuiltinOp, FuncId, FunctionSig, InstId, InstKind, Module, Param, TypeId, TypeKind,
};
use sable_opt::{
    combine_function, function_cost, inline_function, CombineOptions, InlineKind,
    COST_NOT_INLINABLE,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn class(m: &mut Module, name: &str) -> TypeId {
    m.types.intern(TypeKind::Ref {
        name: name.into(),
        superclass: None,
    })
}

/// A multi-block callee whose entry carries a redundant release/retain
/// pair:
///
/// ```text
/// g(flag, obj):
///   entry: release_value obj; retain_value obj; cond_br flag, bb1, bb2
///   bb1:   return 1
///   bb2:   return 2
/// ```
///
/// Shaped so inlining takes the general path and the combiner has cleanup
/// to do afterwards.
fn build_callee(m: &mut Module, c: TypeId) -> FuncId {
    let i1 = m.types.int1();
    let i64t = m.types.int(64);
    let g = m.add_function(FunctionSig::new(
        "g",
        vec![Param::owned(i1), Param::guaranteed(c)],
        i64t,
    ));
    let (func, types, literals) = m.builder_parts(g);
    let entry = func.entry_block();
    let flag = func.block(entry).args()[0];
    let obj = func.block(entry).args()[1];
    let then_block = func.append_block();
    let else_block = func.append_block();
    let mut b = Builder::new(func, types, literals);
    b.set_insertion_point(entry, 0);
    b.release_value(obj);
    b.retain_value(obj);
    b.cond_branch(flag, then_block, &[], else_block, &[]);
    b.set_insertion_point(then_block, 0);
    let one = b.int_literal(i64t, 1);
    let one_v = b.func().single_result(one);
    b.ret(one_v);
    b.set_insertion_point(else_block, 0);
    let two = b.int_literal(i64t, 2);
    let two_v = b.func().single_result(two);
    b.ret(two_v);
    g
}

/// Caller: `return g(flag, obj)`.
fn build_caller(m: &mut Module, g: FuncId, c: TypeId) -> (FuncId, InstId) {
    let i1 = m.types.int1();
    let i64t = m.types.int(64);
    let thin = m.types.thin_function();
    let f = m.add_function(FunctionSig::new(
        "f",
        vec![Param::owned(i1), Param::guaranteed(c)],
        i64t,
    ));
    let (func, types, literals) = m.builder_parts(f);
    let entry = func.entry_block();
    let flag = func.block(entry).args()[0];
    let obj = func.block(entry).args()[1];
    let mut b = Builder::new(func, types, literals);
    b.set_insertion_point(entry, 0);
    let fr = b.function_ref(g, thin);
    let fr_v = b.func().single_result(fr);
    let call = b.apply(fr_v, &[flag, obj], i64t);
    let call_v = b.func().single_result(call);
    b.ret(call_v);
    (f, call)
}

#[test]
fn cost_then_inline_then_combine() {
    init_logging();
    let mut m = Module::new();
    let c = class(&mut m, "C");
    let g = build_callee(&mut m, c);
    let (f, call) = build_caller(&mut m, g, c);

    // The driver's profitability question: the callee is small and not
    // self-recursive, so it is inlinable under any reasonable threshold.
    let cost = function_cost(&m, g, 20);
    assert_ne!(cost, COST_NOT_INLINABLE);
    assert!(cost <= 20);

    let args: Vec<_> = m.func(f).inst(call).operands()[1..].to_vec();
    assert!(inline_function(
        &mut m,
        f,
        call,
        g,
        &args,
        InlineKind::Performance
    ));

    // The spliced body still carries the callee's redundant ownership
    // pair; the combiner erases it.
    assert!(combine_function(&mut m, f, &CombineOptions::default()).unwrap());

    let func = m.func(f);
    assert!(func.is_erased(call));
    // entry + two cloned blocks + continuation.
    assert_eq!(func.block_order().len(), 4);
    for inst in func.inst_ids_in_order() {
        assert!(
            !matches!(
                func.inst(inst).kind,
                InstKind::Apply
                    | InstKind::RetainValue
                    | InstKind::ReleaseValue
                    | InstKind::StrongRetain
                    | InstKind::StrongRelease
            ),
            "call and ownership pair should be gone, found {:?}",
            func.inst(inst).kind
        );
    }

    // Combining again finds nothing: the pipeline is idempotent at its
    // fixed point.
    assert!(!combine_function(&mut m, f, &CombineOptions::default()).unwrap());
}

#[test]
fn recursive_callee_is_rejected_by_cost_and_inliner() {
    init_logging();
    let mut m = Module::new();
    let i64t = m.types.int(64);
    let thin = m.types.thin_function();
    let f = m.add_function(FunctionSig::new("fact", vec![Param::owned(i64t)], i64t));
    let (func, types, literals) = m.builder_parts(f);
    let entry = func.entry_block();
    let x = func.block(entry).args()[0];
    let mut b = Builder::new(func, types, literals);
    b.set_insertion_point(entry, 0);
    let fr = b.function_ref(f, thin);
    let fr_v = b.func().single_result(fr);
    let call = b.apply(fr_v, &[x], i64t);
    let call_v = b.func().single_result(call);
    b.ret(call_v);

    assert_eq!(function_cost(&m, f, 100), COST_NOT_INLINABLE);
    assert!(!inline_function(
        &mut m,
        f,
        call,
        f,
        &[x],
        InlineKind::Performance
    ));
    assert!(!m.func(f).is_erased(call));
}

#[test]
fn combiner_folds_branch_on_negated_condition_after_inlining() {
    init_logging();
    let mut m = Module::new();
    let i1 = m.types.int1();
    let i64t = m.types.int(64);

    // Callee returning `xor(flag, true)` — the negation the caller will
    // branch on.
    let negate = m.add_function(FunctionSig::new("negate", vec![Param::owned(i1)], i1));
    {
        let (func, types, literals) = m.builder_parts(negate);
        let entry = func.entry_block();
        let flag = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let one = b.int_literal(i1, 1);
        let one_v = b.func().single_result(one);
        let x = b.builtin(BuiltinOp::Xor, &[flag, one_v], i1);
        let x_v = b.func().single_result(x);
        b.ret(x_v);
    }

    let thin = m.types.thin_function();
    let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i1)], i64t));
    let (func, types, literals) = m.builder_parts(f);
    let entry = func.entry_block();
    let flag = func.block(entry).args()[0];
    let block_a = func.append_block();
    let block_b = func.append_block();
    let mut b = Builder::new(func, types, literals);
    b.set_insertion_point(entry, 0);
    let fr = b.function_ref(negate, thin);
    let fr_v = b.func().single_result(fr);
    let call = b.apply(fr_v, &[flag], i1);
    let call_v = b.func().single_result(call);
    b.cond_branch(call_v, block_a, &[], block_b, &[]);
    b.set_insertion_point(block_a, 0);
    let one = b.int_literal(i64t, 1);
    let one_v = b.func().single_result(one);
    b.ret(one_v);
    b.set_insertion_point(block_b, 0);
    let two = b.int_literal(i64t, 2);
    let two_v = b.func().single_result(two);
    b.ret(two_v);

    // Fast-path inline, then let the combiner canonicalize the branch.
    assert!(inline_function(
        &mut m,
        f,
        call,
        negate,
        &[flag],
        InlineKind::Performance
    ));
    assert!(combine_function(&mut m, f, &CombineOptions::default()).unwrap());

    let func = m.func(f);
    match func.inst(func.terminator(func.entry_block())).kind {
        InstKind::CondBranch {
            true_target,
            false_target,
            ..
        } => {
            // Branching on the un-negated flag swaps the successors.
            assert_eq!(true_target, block_b);
            assert_eq!(false_target, block_a);
        }
        ref other => panic!("expected cond_branch, got {other:?}"),
    }
    assert_eq!(
        func.inst(func.terminator(func.entry_block())).operand(0),
        flag
    );
}
