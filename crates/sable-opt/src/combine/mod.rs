//! The instruction combiner: worklist-driven fixed-point peephole rewriting.
//!
//! ## Algorithm
//!
//! 1. Seed a set-backed worklist with every instruction in program order.
//! 2. Pop an instruction; skip it if a prior rewrite erased it.
//! 3. Dispatch on its kind to a rewrite rule. Rules are total over the kind
//!    set: kinds without a rule fall through to no-change, which is not an
//!    error.
//! 4. On any change, re-queue the users of the affected values and any newly
//!    built instructions; they may now simplify further.
//! 5. Stop when the worklist drains. Re-seed and repeat until a whole round
//!    makes no change, bounded by [`CombineOptions::max_rounds`].
//!
//! Rules either fully commit a rewrite or leave the graph untouched; a rule
//! never partially mutates and then bails. Rules are also required to
//! strictly simplify, so the fixed point terminates; the round budget is a
//! backstop, not the termination argument.

mod calls;
mod casts;
mod memory;
mod refcount;
mod scalar;

use anyhow::{bail, Result};
use log::{debug, trace};
use sable_ir::{
    Builder, FuncId, Function, InstId, InstKind, Module, TypeTable, ValueId,
};
use std::collections::{HashSet, VecDeque};

// ── Options ──────────────────────────────────────────────────────────────────

/// Combiner configuration, passed by value from the driving pass manager.
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Upper bound on full worklist rounds per function.
    pub max_rounds: usize,
    /// Erase `cond_fail` assertions outright (runtime overflow and bounds
    /// checks), regardless of their condition.
    pub remove_assertions: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        CombineOptions {
            max_rounds: 8,
            remove_assertions: false,
        }
    }
}

// ── Rule outcome ─────────────────────────────────────────────────────────────

/// What a rewrite rule did.
///
/// The worklist consequences differ per variant, which is why in-place
/// mutation is not conflated with replacement: replacement re-queues the new
/// instruction and retires the old id, while in-place mutation re-queues the
/// same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Precondition not met; the graph is untouched.
    NoChange,
    /// A newly built instruction whose result replaces the visited
    /// instruction's result; the combiner erases the old instruction.
    Replaced(InstId),
    /// The rule rewired the visited instruction's operands in place.
    MutatedInPlace,
    /// The rule erased the visited instruction (and possibly others) itself,
    /// through the combiner's erase helper.
    Erased,
}

// ── Worklist ─────────────────────────────────────────────────────────────────

/// Queue with membership testing so an instruction is never enqueued twice.
#[derive(Debug, Default)]
struct Worklist {
    queue: VecDeque<InstId>,
    members: HashSet<InstId>,
}

impl Worklist {
    fn add(&mut self, id: InstId) {
        if self.members.insert(id) {
            self.queue.push_back(id);
        }
    }

    fn pop(&mut self) -> Option<InstId> {
        let id = self.queue.pop_front()?;
        self.members.remove(&id);
        Some(id)
    }
}

// ── Combiner ─────────────────────────────────────────────────────────────────

/// Rewrites one function to a fixed point.
///
/// The function under combination is moved out of the module for the
/// duration of the run so the module's shared tables (types, literals, other
/// functions' signatures) stay reachable while the body is mutated.
pub struct Combiner<'m> {
    module: &'m mut Module,
    func_id: FuncId,
    pub(crate) func: Function,
    pub(crate) options: CombineOptions,
    worklist: Worklist,
    changed: bool,
}

/// Run the combiner on `func` until no rule applies. Returns whether
/// anything changed.
pub fn combine_function(
    module: &mut Module,
    func: FuncId,
    options: &CombineOptions,
) -> Result<bool> {
    // The worklist engine assumes every block is properly terminated.
    for &b in module.func(func).block_order() {
        let block = module.func(func).block(b);
        match block.insts().last() {
            Some(&last) if module.func(func).inst(last).kind.is_terminator() => {}
            _ => bail!(
                "IR invariant violated: {} in {} has no terminator",
                b,
                module.func(func).name
            ),
        }
    }

    let body = module.take_function(func);
    let mut cx = Combiner {
        module,
        func_id: func,
        func: body,
        options: options.clone(),
        worklist: Worklist::default(),
        changed: false,
    };
    let changed = cx.run();
    let Combiner {
        module, func_id, func, ..
    } = cx;
    module.put_function(func_id, func);
    Ok(changed)
}

impl<'m> Combiner<'m> {
    fn run(&mut self) -> bool {
        let mut any_changed = false;
        for round in 0..self.options.max_rounds {
            self.changed = false;
            for inst in self.func.inst_ids_in_order() {
                self.worklist.add(inst);
            }
            let mut steps = 0usize;
            while let Some(inst) = self.worklist.pop() {
                if self.func.is_erased(inst) {
                    continue;
                }
                let rewrite = self.visit(inst);
                self.apply_rewrite(inst, rewrite);
                steps += 1;
            }
            debug!(
                "combine: {} round {} processed {} instructions, changed={}",
                self.func.name, round, steps, self.changed
            );
            any_changed |= self.changed;
            if !self.changed {
                break;
            }
        }
        any_changed
    }

    fn apply_rewrite(&mut self, inst: InstId, rewrite: Rewrite) {
        match rewrite {
            Rewrite::NoChange => {}
            Rewrite::Replaced(new) => {
                trace!("combine: replaced {inst} with {new}");
                if let Some(old_result) = self.func.inst(inst).result() {
                    let new_result = self.func.single_result(new);
                    let users = self.func.replace_all_uses(old_result, new_result);
                    for u in users {
                        self.worklist.add(u);
                    }
                }
                self.erase_from_function(inst);
                self.worklist.add(new);
                self.changed = true;
            }
            Rewrite::MutatedInPlace => {
                trace!("combine: mutated {inst} in place");
                self.worklist.add(inst);
                if let Some(r) = self.func.inst(inst).result() {
                    for u in self.func.users_of(r) {
                        self.worklist.add(u);
                    }
                }
                self.changed = true;
            }
            Rewrite::Erased => {
                self.changed = true;
            }
        }
    }

    /// Rule dispatch: a total function from instruction kind to rule.
    ///
    /// Adding an instruction kind forces a decision here; kinds without a
    /// rewrite are listed explicitly rather than hidden behind a wildcard.
    fn visit(&mut self, inst: InstId) -> Rewrite {
        match self.func.inst(inst).kind {
            InstKind::StructExtract { .. } => casts::visit_struct_extract(self, inst),
            InstKind::UncheckedEnumData { .. } => casts::visit_unchecked_enum_data(self, inst),
            InstKind::RefBitCast => casts::visit_ref_bit_cast(self, inst),
            InstKind::TrivialBitCast => casts::visit_trivial_bit_cast(self, inst),
            InstKind::Upcast => casts::visit_upcast(self, inst),
            InstKind::RefCast => casts::visit_ref_cast(self, inst),
            InstKind::RefToRawPointer => casts::visit_ref_to_raw_pointer(self, inst),
            InstKind::RawPointerToRef => casts::visit_raw_pointer_to_ref(self, inst),
            InstKind::PointerToAddress => casts::visit_pointer_to_address(self, inst),
            InstKind::AddrCast => casts::visit_addr_cast(self, inst),

            InstKind::Load => memory::visit_load(self, inst),
            InstKind::InjectEnumAddr { .. } => memory::visit_inject_enum_addr(self, inst),
            InstKind::UncheckedTakeEnumDataAddr { .. } => {
                memory::visit_unchecked_take_enum_data_addr(self, inst)
            }

            InstKind::RetainValue => refcount::visit_retain_value(self, inst),
            InstKind::ReleaseValue => refcount::visit_release_value(self, inst),
            InstKind::StrongRetain => refcount::visit_strong_retain(self, inst),
            InstKind::StrongRelease => refcount::visit_strong_release(self, inst),

            InstKind::Apply => calls::visit_apply(self, inst),
            InstKind::PartialApply => calls::visit_partial_apply(self, inst),

            InstKind::Builtin { .. } => scalar::visit_builtin(self, inst),
            InstKind::CondFail => scalar::visit_cond_fail(self, inst),
            InstKind::EnumIsTag { .. } => scalar::visit_enum_is_tag(self, inst),
            InstKind::TupleExtract { .. } => scalar::visit_tuple_extract(self, inst),
            InstKind::CondBranch { .. } => scalar::visit_cond_branch(self, inst),

            // No rewrite for these kinds.
            InstKind::IntLiteral(..)
            | InstKind::StringLiteral { .. }
            | InstKind::FunctionRef(..)
            | InstKind::Metatype
            | InstKind::ValueMetatype
            | InstKind::Struct
            | InstKind::StructElementAddr { .. }
            | InstKind::Tuple
            | InstKind::TupleElementAddr { .. }
            | InstKind::Enum { .. }
            | InstKind::InitEnumDataAddr { .. }
            | InstKind::AllocStack
            | InstKind::DeallocStack
            | InstKind::AllocRef
            | InstKind::DeallocRef
            | InstKind::Store
            | InstKind::DestroyAddr
            | InstKind::IndexAddr
            | InstKind::IndexRawPointer
            | InstKind::AddressToPointer
            | InstKind::ThinToThickFunction
            | InstKind::FixLifetime
            | InstKind::DebugValue
            | InstKind::ClassMethod
            | InstKind::WitnessMethod
            | InstKind::Branch { .. }
            | InstKind::Return
            | InstKind::Unreachable => Rewrite::NoChange,
        }
    }

    // ── Services for rules ───────────────────────────────────────────────

    pub(crate) fn types(&self) -> &TypeTable {
        &self.module.types
    }

    /// Signature lookup that works even when the callee is the function
    /// currently moved out of the module (a self-call).
    pub(crate) fn callee_fn(&self, id: FuncId) -> &Function {
        if id == self.func_id {
            &self.func
        } else {
            self.module.func(id)
        }
    }

    pub(crate) fn literal_bytes(&self, id: sable_ir::LiteralId) -> &[u8] {
        self.module.literals().bytes(id)
    }

    /// Builder positioned immediately before `inst`, stamping new
    /// instructions with `inst`'s location and scope.
    pub(crate) fn builder_before(&mut self, inst: InstId) -> Builder<'_> {
        let (loc, scope) = {
            let i = self.func.inst(inst);
            (i.loc, i.scope)
        };
        let (types, literals) = self.module.intern_tables();
        let mut b = Builder::new(&mut self.func, types, literals);
        b.set_insertion_before(inst);
        b.set_source(loc, scope);
        b
    }

    /// Queue freshly built instructions (a builder's tracking list).
    pub(crate) fn queue(&mut self, insts: Vec<InstId>) {
        for i in insts {
            self.worklist.add(i);
        }
    }

    /// Erase an instruction and queue its operands' definitions, which may
    /// have just lost their last use.
    pub(crate) fn erase_from_function(&mut self, inst: InstId) {
        let operands: Vec<ValueId> = self.func.inst(inst).operands().to_vec();
        self.func.erase_instruction(inst);
        for v in operands {
            if let Some(def) = self.func.defining_inst(v) {
                if !self.func.is_erased(def) {
                    self.worklist.add(def);
                }
            }
        }
        self.changed = true;
    }

    /// Rewrite all uses of `inst`'s result to `new`, queueing the affected
    /// users.
    pub(crate) fn replace_inst_uses_with(&mut self, inst: InstId, new: ValueId) {
        let old = self.func.single_result(inst);
        let users = self.func.replace_all_uses(old, new);
        for u in users {
            self.worklist.add(u);
        }
        self.changed = true;
    }
}

// ── Pattern helpers shared by the rule modules ───────────────────────────────

/// The instruction defining `v`, when it has not been erased.
pub(crate) fn def_inst(func: &Function, v: ValueId) -> Option<InstId> {
    func.defining_inst(v).filter(|&i| !func.is_erased(i))
}

/// The kind of the instruction defining `v`.
pub(crate) fn def_kind<'f>(func: &'f Function, v: ValueId) -> Option<&'f InstKind> {
    def_inst(func, v).map(|i| &func.inst(i).kind)
}

/// The function statically referenced by `v`, if its definition is a
/// `function_ref`.
pub(crate) fn as_function_ref(func: &Function, v: ValueId) -> Option<FuncId> {
    match def_kind(func, v) {
        Some(&InstKind::FunctionRef(f)) => Some(f),
        _ => None,
    }
}

/// The constant integer held by `v`, if its definition is an `int_literal`.
pub(crate) fn as_int_literal(func: &Function, v: ValueId) -> Option<i64> {
    match def_kind(func, v) {
        Some(&InstKind::IntLiteral(n)) => Some(n),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sable_ir::{Builder, FunctionSig, Param, TypeKind};

    /// Use lists and operand slots must agree exactly after any amount of
    /// rewriting.
    fn assert_use_lists_consistent(func: &Function) {
        for inst in func.inst_ids_in_order() {
            for (slot, &op) in func.inst(inst).operands().iter().enumerate() {
                let hits = func
                    .value(op)
                    .uses()
                    .iter()
                    .filter(|u| u.user == inst && u.operand == slot)
                    .count();
                assert_eq!(hits, 1, "operand slot {slot} of {inst} out of sync");
            }
        }
        let mut values = Vec::new();
        for &block in func.block_order() {
            values.extend(func.block(block).args().iter().copied());
        }
        for inst in func.inst_ids_in_order() {
            values.extend(func.inst(inst).result());
        }
        for v in values {
            for u in func.value(v).uses() {
                assert!(!func.is_erased(u.user), "use edge into erased {}", u.user);
                assert_eq!(func.inst(u.user).operand(u.operand), v);
            }
        }
    }

    #[test]
    fn missing_terminator_is_an_ir_invariant_error() {
        let mut m = sable_ir::Module::new();
        let unit = m.types.unit();
        let f = m.add_function(FunctionSig::new("broken", vec![], unit));
        let err = combine_function(&mut m, f, &CombineOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no terminator"));
    }

    #[test]
    fn combining_reaches_a_fixed_point_and_is_idempotent() {
        let mut m = sable_ir::Module::new();
        let c = m.types.intern(TypeKind::Ref {
            name: "C".into(),
            superclass: None,
        });
        let unit = m.types.unit();
        let f = m.add_function(FunctionSig::new("f", vec![Param::guaranteed(c)], unit));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        b.release_value(arg);
        b.retain_value(arg);
        let u = b.tuple(unit, &[]);
        let u_v = b.func().single_result(u);
        b.ret(u_v);

        assert!(combine_function(&mut m, f, &CombineOptions::default()).unwrap());
        let kinds_after_first: Vec<InstKind> = {
            let func = m.func(f);
            func.inst_ids_in_order()
                .iter()
                .map(|&i| func.inst(i).kind)
                .collect()
        };

        // A second run finds nothing left to do and changes nothing.
        assert!(!combine_function(&mut m, f, &CombineOptions::default()).unwrap());
        let func = m.func(f);
        let kinds_after_second: Vec<InstKind> = func
            .inst_ids_in_order()
            .iter()
            .map(|&i| func.inst(i).kind)
            .collect();
        assert_eq!(kinds_after_first, kinds_after_second);
    }

    #[test]
    fn long_cast_chains_terminate_and_keep_use_lists_consistent() {
        let mut m = sable_ir::Module::new();
        let i64t = m.types.int(64);
        let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i64t)], i64t));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let mut value = arg;
        for width in [32u8, 16, 8, 16, 32, 64] {
            let ty = b.types().int(width);
            let cast = b.trivial_bit_cast(value, ty);
            value = b.func().single_result(cast);
        }
        b.ret(value);

        assert!(combine_function(&mut m, f, &CombineOptions::default()).unwrap());

        let func = m.func(f);
        assert_use_lists_consistent(func);
        // The returned value reads one cast straight from the argument.
        let returned = func.inst(func.terminator(func.entry_block())).operand(0);
        let def = func.defining_inst(returned).unwrap();
        assert_eq!(func.inst(def).kind, InstKind::TrivialBitCast);
        assert_eq!(func.inst(def).operand(0), arg);
    }

    #[test]
    fn worklist_engine_leaves_untouched_functions_alone() {
        let mut m = sable_ir::Module::new();
        let i64t = m.types.int(64);
        let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i64t)], i64t));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        b.ret(arg);

        assert!(!combine_function(&mut m, f, &CombineOptions::default()).unwrap());
    }
}
