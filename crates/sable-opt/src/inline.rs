//! Function inlining: splice a callee's control-flow graph into a call
//! site, performing exactly one level of inlining.
//!
//! ## Algorithm
//!
//! The callee's entry-block arguments are bound to the caller-supplied
//! argument values through a substitution map, and the entry block's
//! non-terminator instructions are cloned at the call site. If the entry
//! block ends in a return, that is the whole splice (fast path). Otherwise
//! the caller's block is split after the call into a continuation block
//! that receives the call's former result as a new block argument, the
//! remaining callee blocks are cloned in depth-first preorder (so every
//! definition is mapped before its uses), and each cloned `return` becomes
//! a branch to the continuation carrying the substituted return value.
//!
//! Provenance: under [`InlineKind::Mandatory`] every cloned instruction
//! inherits the call site's scope and location verbatim and `debug_value`
//! instructions are dropped; under [`InlineKind::Performance`] each callee
//! scope is cloned into a fresh scope whose `inlined_call_site` points at
//! the call, so inlined code remains distinguishable from native code.

use log::debug;
use sable_ir::{
    BlockId, Builder, CallingConv, DebugScope, FuncId, Function, InstId, InstKind, Module,
    ScopeId, ValueId,
};
use std::collections::HashMap;

/// Inlining mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    /// Semantics-mandated inlining: must preserve debuggability, so cloned
    /// code keeps the call site's provenance; foreign-convention callees
    /// are rejected.
    Mandatory,
    /// Optimization-driven inlining: permissive about conventions, and
    /// records a nested provenance scope per inlined instruction.
    Performance,
}

/// Inline `callee` into `caller` at `call`, binding the callee's entry
/// arguments to `args`.
///
/// Returns `false` without touching the graph when a legality check fails:
/// self-recursive expansion, a foreign callee outside [`InlineKind::Performance`],
/// or an argument-count mismatch against the callee's entry block.
pub fn inline_function(
    module: &mut Module,
    caller: FuncId,
    call: InstId,
    callee: FuncId,
    args: &[ValueId],
    kind: InlineKind,
) -> bool {
    // Do not attempt to inline a call into its own parent function.
    if caller == callee {
        debug!("inline: refusing self-recursive expansion of {}", callee);
        return false;
    }
    if module.func(callee).convention == CallingConv::Foreign && kind != InlineKind::Performance {
        debug!(
            "inline: refusing foreign-convention callee {} outside performance mode",
            module.func(callee).name
        );
        return false;
    }
    {
        let callee_fn = module.func(callee);
        let entry_args = callee_fn.block(callee_fn.entry_block()).args().len();
        if entry_args != args.len() {
            debug!(
                "inline: argument count mismatch for {} (expected {}, got {})",
                callee_fn.name,
                entry_args,
                args.len()
            );
            return false;
        }
    }
    debug_assert!(
        module.func(caller).inst(call).kind == InstKind::Apply,
        "inline target must be an apply instruction"
    );

    let (call_loc, call_scope) = {
        let i = module.func(caller).inst(call);
        (i.loc, i.scope)
    };

    // Every cloned instruction is located at the call site; in performance
    // mode a fresh scope parented at the call keeps it distinguishable.
    let call_site_scope = match kind {
        InlineKind::Mandatory => call_scope,
        InlineKind::Performance => module.create_scope(DebugScope {
            loc: call_loc,
            parent: Some(call_scope),
            inlined_call_site: module.scope(call_scope).inlined_call_site,
            func: caller,
        }),
    };

    // Keep the callee definition alive while cloned provenance points into
    // it.
    module.mark_function_inlined(callee);

    // The callee body is snapshotted so the module (scopes, uniquing
    // tables) stays freely mutable while the caller is rebuilt.
    let callee_fn = module.func(callee).clone();
    let mut caller_fn = module.take_function(caller);

    // Scope substitution map for performance mode, one entry per distinct
    // callee scope, scoped to this one inlining operation.
    let mut scope_map: HashMap<ScopeId, ScopeId> = HashMap::new();
    if kind == InlineKind::Performance {
        for inst in callee_fn.inst_ids_in_order() {
            let original = callee_fn.inst(inst).scope;
            scope_map.entry(original).or_insert_with(|| {
                let orig = module.scope(original);
                let (loc, parent) = (orig.loc, orig.parent);
                module.create_scope(DebugScope {
                    loc,
                    parent,
                    inlined_call_site: Some(call_site_scope),
                    func: callee,
                })
            });
        }
    }

    let mut cloner = Cloner {
        kind,
        call_loc,
        call_site_scope,
        scope_map,
        value_map: HashMap::new(),
        block_map: HashMap::new(),
    };

    // Bind the callee's formals to the supplied arguments.
    let callee_entry = callee_fn.entry_block();
    for (&formal, &actual) in callee_fn.block(callee_entry).args().iter().zip(args) {
        cloner.value_map.insert(formal, actual);
    }

    let call_block = caller_fn.inst(call).block();
    let call_index = caller_fn.index_in_block(call);

    // Clone the entry block's body right after the call.
    let entry_insts: Vec<InstId> = callee_fn.block(callee_entry).insts().to_vec();
    let (entry_body, entry_term) = entry_insts.split_at(entry_insts.len() - 1);
    let mut cursor = call_index + 1;
    {
        let (types, literals) = module.intern_tables();
        let mut b = Builder::new(&mut caller_fn, types, literals);
        b.set_insertion_point(call_block, cursor);
        for &inst in entry_body {
            cloner.clone_instruction(&mut b, &callee_fn, inst);
        }
        cursor = b.insertion_point().expect("cursor set above").1;
    }

    // Fast path: a single-block callee needs no CFG surgery at all.
    let entry_term = entry_term[0];
    if callee_fn.inst(entry_term).kind == InstKind::Return {
        let returned = cloner.map_value(callee_fn.inst(entry_term).operand(0));
        let call_result = caller_fn.single_result(call);
        caller_fn.replace_all_uses(call_result, returned);
        caller_fn.erase_instruction(call);
        module.put_function(caller, caller_fn);
        debug!(
            "inline: fast path spliced {} into {}",
            callee_fn.name, module.func(caller).name
        );
        return true;
    }

    // General path. Map every remaining callee block (depth-first preorder
    // from the entry, so definitions are visited before their dominated
    // uses) to a fresh caller block carrying the same arguments. New blocks
    // go right after the caller's block so the inlined body reads in call
    // order.
    let order = dfs_preorder(&callee_fn);
    let mut insert_at = caller_fn.block_position(call_block) + 1;
    for &cb in order.iter().skip(1) {
        let nb = caller_fn.create_block_at(insert_at);
        insert_at += 1;
        cloner.block_map.insert(cb, nb);
        for &arg in callee_fn.block(cb).args() {
            let ty = callee_fn.value_type(arg);
            let mapped = caller_fn.add_block_arg(nb, ty);
            cloner.value_map.insert(arg, mapped);
        }
    }

    // Split off the continuation, introduce the block argument standing in
    // for the call's result, and retire the call.
    let continuation = caller_fn.split_block(call_block, cursor, insert_at);
    let call_result = caller_fn.single_result(call);
    let result_ty = caller_fn.value_type(call_result);
    let cont_arg = caller_fn.add_block_arg(continuation, result_ty);
    caller_fn.replace_all_uses(call_result, cont_arg);
    caller_fn.erase_instruction(call);

    {
        let (types, literals) = module.intern_tables();
        let mut b = Builder::new(&mut caller_fn, types, literals);

        // Bodies first: a terminator may read values defined anywhere in
        // the callee, so all bodies are cloned before any terminator.
        for &cb in order.iter().skip(1) {
            let nb = cloner.block_map[&cb];
            b.set_insertion_point(nb, 0);
            let insts = callee_fn.block(cb).insts();
            for &inst in &insts[..insts.len() - 1] {
                cloner.clone_instruction(&mut b, &callee_fn, inst);
            }
        }

        // The entry terminator closes the caller's (now tail-less) block.
        b.set_insertion_at_end(call_block);
        cloner.clone_terminator(&mut b, &callee_fn, entry_term, continuation);
        for &cb in order.iter().skip(1) {
            let nb = cloner.block_map[&cb];
            b.set_insertion_at_end(nb);
            let term = callee_fn.terminator(cb);
            cloner.clone_terminator(&mut b, &callee_fn, term, continuation);
        }
    }

    module.put_function(caller, caller_fn);
    debug!(
        "inline: spliced {} blocks of {} into {}",
        order.len(),
        callee_fn.name,
        module.func(caller).name
    );
    true
}

// ── Cloning state ────────────────────────────────────────────────────────────

struct Cloner {
    kind: InlineKind,
    call_loc: sable_ir::SourceLoc,
    call_site_scope: ScopeId,
    scope_map: HashMap<ScopeId, ScopeId>,
    value_map: HashMap<ValueId, ValueId>,
    block_map: HashMap<BlockId, BlockId>,
}

impl Cloner {
    fn map_value(&self, v: ValueId) -> ValueId {
        *self
            .value_map
            .get(&v)
            .expect("callee operand not dominated by its definition")
    }

    fn map_block(&self, b: BlockId) -> BlockId {
        *self
            .block_map
            .get(&b)
            .expect("branch to the callee entry block")
    }

    fn scope_for(&self, original: ScopeId) -> ScopeId {
        match self.kind {
            InlineKind::Mandatory => self.call_site_scope,
            InlineKind::Performance => self.scope_map[&original],
        }
    }

    /// Clone one non-terminator instruction at the builder's cursor,
    /// rewriting operands through the substitution map and extending the
    /// map with the clone's result.
    fn clone_instruction(&mut self, b: &mut Builder<'_>, callee: &Function, inst: InstId) {
        let original = callee.inst(inst);
        debug_assert!(!original.kind.is_terminator());
        // Inlining that must preserve the caller's debuggability drops the
        // callee's debug annotations, like a nodebug function.
        if self.kind == InlineKind::Mandatory && original.kind == InstKind::DebugValue {
            return;
        }
        let operands: Vec<ValueId> = original.operands().iter().map(|&v| self.map_value(v)).collect();
        let result_ty = original.result().map(|r| callee.value_type(r));
        b.set_source(self.call_loc, self.scope_for(original.scope));
        let clone = b.emit_raw(original.kind, operands, result_ty);
        if let Some(r) = original.result() {
            self.value_map.insert(r, b.func().single_result(clone));
        }
    }

    /// Clone a terminator: returns become branches to the continuation
    /// carrying the substituted return value; everything else clones
    /// structurally with targets remapped.
    fn clone_terminator(
        &mut self,
        b: &mut Builder<'_>,
        callee: &Function,
        term: InstId,
        continuation: BlockId,
    ) {
        let original = callee.inst(term);
        b.set_source(self.call_loc, self.scope_for(original.scope));
        match original.kind {
            InstKind::Return => {
                let value = self.map_value(original.operand(0));
                b.branch(continuation, &[value]);
            }
            InstKind::Branch { target } => {
                let args: Vec<ValueId> =
                    original.operands().iter().map(|&v| self.map_value(v)).collect();
                b.branch(self.map_block(target), &args);
            }
            InstKind::CondBranch {
                true_target,
                false_target,
                true_args,
            } => {
                let mapped: Vec<ValueId> =
                    original.operands().iter().map(|&v| self.map_value(v)).collect();
                let t_args = &mapped[1..1 + true_args];
                let f_args = &mapped[1 + true_args..];
                b.cond_branch(
                    mapped[0],
                    self.map_block(true_target),
                    t_args,
                    self.map_block(false_target),
                    f_args,
                );
            }
            InstKind::Unreachable => {
                b.unreachable();
            }
            ref other => unreachable!("{other:?} is not a terminator"),
        }
    }
}

/// Callee blocks in depth-first preorder from the entry. Preorder visits a
/// block's dominators before the block itself, which is what lets the
/// cloner map each definition before any of its uses.
fn dfs_preorder(func: &Function) -> Vec<BlockId> {
    let mut order = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![func.entry_block()];
    while let Some(block) = stack.pop() {
        if !seen.insert(block) {
            continue;
        }
        order.push(block);
        let succs = func.successors(block);
        for &s in succs.iter().rev() {
            stack.push(s);
        }
    }
    order
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sable_ir::{BuiltinOp, FunctionSig, Param, SourceLoc, TypeId};

    /// Callee computing `xor(a, b)` in its entry block; fast-path shape.
    fn single_block_callee(m: &mut Module, i64t: TypeId) -> FuncId {
        let g = m.add_function(FunctionSig::new(
            "g",
            vec![Param::owned(i64t), Param::owned(i64t)],
            i64t,
        ));
        let (func, types, literals) = m.builder_parts(g);
        let entry = func.entry_block();
        let a = func.block(entry).args()[0];
        let b_arg = func.block(entry).args()[1];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let x = b.builtin(BuiltinOp::Xor, &[a, b_arg], i64t);
        let x_v = b.func().single_result(x);
        b.ret(x_v);
        g
    }

    /// Caller with `r = apply g(p, q); return r`. Returns the call id.
    fn caller_of(m: &mut Module, g: FuncId, i64t: TypeId) -> (FuncId, InstId) {
        let thin = m.types.thin_function();
        let f = m.add_function(FunctionSig::new(
            "f",
            vec![Param::owned(i64t), Param::owned(i64t)],
            i64t,
        ));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let p = func.block(entry).args()[0];
        let q = func.block(entry).args()[1];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        b.set_source(SourceLoc(7), b.func().scope);
        let fr = b.function_ref(g, thin);
        let fr_v = b.func().single_result(fr);
        let call = b.apply(fr_v, &[p, q], i64t);
        let call_v = b.func().single_result(call);
        b.ret(call_v);
        (f, call)
    }

    fn call_args(m: &Module, f: FuncId, call: InstId) -> Vec<ValueId> {
        m.func(f).inst(call).operands()[1..].to_vec()
    }

    #[test]
    fn fast_path_splices_single_block_callee() {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        let g = single_block_callee(&mut m, i64t);
        let (f, call) = caller_of(&mut m, g, i64t);
        let args = call_args(&m, f, call);

        assert!(inline_function(
            &mut m,
            f,
            call,
            g,
            &args,
            InlineKind::Performance
        ));

        let func = m.func(f);
        assert!(func.is_erased(call));
        assert_eq!(func.block_order().len(), 1, "no CFG surgery on the fast path");
        let entry = func.entry_block();
        let returned = func.inst(func.terminator(entry)).operand(0);
        let xor = func.defining_inst(returned).unwrap();
        assert!(matches!(
            func.inst(xor).kind,
            InstKind::Builtin {
                op: BuiltinOp::Xor
            }
        ));
        // Operands read the caller-supplied arguments directly.
        assert_eq!(func.inst(xor).operands(), &args[..]);
    }

    #[test]
    fn general_path_splices_cfg_through_a_continuation() {
        let mut m = Module::new();
        let i1 = m.types.int1();
        let i64t = m.types.int(64);

        // g(c): if c { return 1 } else { return 2 }
        let g = m.add_function(FunctionSig::new("g", vec![Param::owned(i1)], i64t));
        let (func, types, literals) = m.builder_parts(g);
        let entry = func.entry_block();
        let c = func.block(entry).args()[0];
        let then_block = func.append_block();
        let else_block = func.append_block();
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        b.cond_branch(c, then_block, &[], else_block, &[]);
        b.set_insertion_point(then_block, 0);
        let one = b.int_literal(i64t, 1);
        let one_v = b.func().single_result(one);
        b.ret(one_v);
        b.set_insertion_point(else_block, 0);
        let two = b.int_literal(i64t, 2);
        let two_v = b.func().single_result(two);
        b.ret(two_v);

        // f(c): return g(c)
        let thin = m.types.thin_function();
        let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i1)], i64t));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let cond = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let fr = b.function_ref(g, thin);
        let fr_v = b.func().single_result(fr);
        let call = b.apply(fr_v, &[cond], i64t);
        let call_v = b.func().single_result(call);
        b.ret(call_v);

        assert!(inline_function(
            &mut m,
            f,
            call,
            g,
            &[cond],
            InlineKind::Performance
        ));

        let func = m.func(f);
        assert!(func.is_erased(call));
        // entry, cloned then, cloned else, continuation.
        assert_eq!(func.block_order().len(), 4);
        let entry = func.entry_block();

        let InstKind::CondBranch {
            true_target,
            false_target,
            ..
        } = func.inst(func.terminator(entry)).kind
        else {
            panic!("caller entry must end in the cloned conditional branch");
        };
        assert_eq!(func.inst(func.terminator(entry)).operand(0), cond);

        // Both cloned returns became branches to the continuation, carrying
        // the substituted return value.
        let continuation = match func.inst(func.terminator(true_target)).kind {
            InstKind::Branch { target } => target,
            ref other => panic!("cloned return must become a branch, got {other:?}"),
        };
        assert!(matches!(
            func.inst(func.terminator(false_target)).kind,
            InstKind::Branch { target } if target == continuation
        ));
        let then_value = func.inst(func.terminator(true_target)).operand(0);
        assert!(matches!(
            func.inst(func.defining_inst(then_value).unwrap()).kind,
            InstKind::IntLiteral(1)
        ));

        // The continuation's sole argument stands in for the call's result
        // everywhere it was read.
        assert_eq!(func.block(continuation).args().len(), 1);
        let cont_arg = func.block(continuation).args()[0];
        assert_eq!(
            func.inst(func.terminator(continuation)).kind,
            InstKind::Return
        );
        assert_eq!(func.inst(func.terminator(continuation)).operand(0), cont_arg);
        // Layout: caller block, cloned blocks, continuation.
        assert_eq!(func.block_position(continuation), 3);
    }

    #[test]
    fn self_recursive_expansion_is_rejected() {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        let thin = m.types.thin_function();
        let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i64t)], i64t));
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

        assert!(!inline_function(
            &mut m,
            f,
            call,
            f,
            &[x],
            InlineKind::Performance
        ));
        assert!(!m.func(f).is_erased(call), "rejection leaves the graph alone");
    }

    #[test]
    fn argument_count_mismatch_is_rejected() {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        let g = single_block_callee(&mut m, i64t);
        let (f, call) = caller_of(&mut m, g, i64t);
        let args = call_args(&m, f, call);

        assert!(!inline_function(
            &mut m,
            f,
            call,
            g,
            &args[..1],
            InlineKind::Performance
        ));
        assert!(!m.func(f).is_erased(call));
    }

    #[test]
    fn foreign_callee_needs_performance_mode() {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        let mut sig = FunctionSig::new("ext", vec![Param::owned(i64t), Param::owned(i64t)], i64t);
        sig.convention = CallingConv::Foreign;
        let g = m.add_function(sig);
        {
            let (func, types, literals) = m.builder_parts(g);
            let entry = func.entry_block();
            let a = func.block(entry).args()[0];
            let mut b = Builder::new(func, types, literals);
            b.set_insertion_point(entry, 0);
            b.ret(a);
        }
        let (f, call) = caller_of(&mut m, g, i64t);
        let args = call_args(&m, f, call);

        assert!(!inline_function(
            &mut m,
            f,
            call,
            g,
            &args,
            InlineKind::Mandatory
        ));
        assert!(!m.func(f).is_erased(call));
        assert!(inline_function(
            &mut m,
            f,
            call,
            g,
            &args,
            InlineKind::Performance
        ));
    }

    #[test]
    fn mandatory_mode_drops_debug_values_and_inherits_provenance() {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        let g = m.add_function(FunctionSig::new("g", vec![Param::owned(i64t)], i64t));
        {
            let (func, types, literals) = m.builder_parts(g);
            let entry = func.entry_block();
            let a = func.block(entry).args()[0];
            let mut b = Builder::new(func, types, literals);
            b.set_insertion_point(entry, 0);
            b.debug_value(a);
            let x = b.builtin(BuiltinOp::Xor, &[a, a], i64t);
            let x_v = b.func().single_result(x);
            b.ret(x_v);
        }
        let (f, call) = caller_of(&mut m, g, i64t);
        let args = call_args(&m, f, call);
        let call_scope = m.func(f).inst(call).scope;

        assert!(inline_function(
            &mut m,
            f,
            call,
            g,
            &args,
            InlineKind::Mandatory
        ));

        let func = m.func(f);
        assert!(func
            .inst_ids_in_order()
            .iter()
            .all(|&i| func.inst(i).kind != InstKind::DebugValue));
        let entry = func.entry_block();
        let returned = func.inst(func.terminator(entry)).operand(0);
        let cloned = func.defining_inst(returned).unwrap();
        assert_eq!(func.inst(cloned).scope, call_scope);
        assert_eq!(func.inst(cloned).loc, SourceLoc(7));
    }

    #[test]
    fn performance_mode_records_an_inline_scope() {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        let g = single_block_callee(&mut m, i64t);
        let (f, call) = caller_of(&mut m, g, i64t);
        let args = call_args(&m, f, call);
        let call_scope = m.func(f).inst(call).scope;

        assert!(inline_function(
            &mut m,
            f,
            call,
            g,
            &args,
            InlineKind::Performance
        ));

        let func = m.func(f);
        let entry = func.entry_block();
        let returned = func.inst(func.terminator(entry)).operand(0);
        let cloned = func.defining_inst(returned).unwrap();
        let scope = func.inst(cloned).scope;
        assert_ne!(scope, call_scope, "inlined code is distinguishable");
        let call_site = m
            .scope(scope)
            .inlined_call_site
            .expect("inline scope records its call site");
        assert_eq!(m.scope(call_site).parent, Some(call_scope));
        assert_eq!(m.scope(scope).func, g);
    }

    #[test]
    fn inlining_marks_the_callee_as_referenced() {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        let g = single_block_callee(&mut m, i64t);
        let (f, call) = caller_of(&mut m, g, i64t);
        let args = call_args(&m, f, call);

        assert_eq!(m.inlined_ref_count(g), 0);
        assert!(inline_function(
            &mut m,
            f,
            call,
            g,
            &args,
            InlineKind::Performance
        ));
        assert_eq!(m.inlined_ref_count(g), 1);
    }
}
