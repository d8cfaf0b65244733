//! The SSA instruction graph: values, uses, instructions, basic blocks, and
//! functions.
//!
//! Every entity lives in an arena owned by its [`Function`] and is addressed
//! by a stable index id. Operand slots store the [`ValueId`] of their
//! definition, and every value keeps an explicit use list, so
//! replace-all-uses and is-dead are O(uses) and erasing an instruction can
//! never leave a dangling reference behind.
//!
//! Instructions are created through the [`crate::builder::Builder`], never
//! directly, and destroyed through [`Function::erase_instruction`], which
//! asserts that no uses remain. Erased instructions leave a tombstoned arena
//! slot; ids are never reused within a function.

use crate::types::TypeId;
use log::trace;
use std::fmt;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Unique identifier for an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Unique identifier for an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// Unique identifier for a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Unique identifier for a function within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Unique identifier for a debug scope within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Unique identifier for an interned string-literal payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiteralId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst_{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block_{}", self.0)
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func_{}", self.0)
    }
}

/// Source-location tag carried by every instruction. Opaque to the
/// optimizer; only threaded through for provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLoc(pub u32);

impl SourceLoc {
    pub const UNKNOWN: SourceLoc = SourceLoc(u32::MAX);
}

// ── Signature attributes ─────────────────────────────────────────────────────

/// Ownership convention of one formal argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgConvention {
    /// Callee takes ownership and must eventually release.
    DirectOwned,
    /// Callee only observes the value for the duration of the call.
    DirectGuaranteed,
    /// Passed behind an address.
    Indirect,
}

impl ArgConvention {
    pub fn is_consumed(&self) -> bool {
        matches!(self, ArgConvention::DirectOwned)
    }

    pub fn is_indirect(&self) -> bool {
        matches!(self, ArgConvention::Indirect)
    }
}

/// Side-effect classification of a function, supplied by upstream analysis.
///
/// The derived ordering matters: `effects < ReadWrite` is how "free of write
/// effects" is tested everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EffectsKind {
    ReadNone,
    ReadOnly,
    ReadWrite,
}

/// Calling convention of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConv {
    Native,
    /// Externally-defined convention; only inlinable in permissive mode.
    Foreign,
}

/// One formal parameter: type plus ownership convention.
#[derive(Debug, Clone)]
pub struct Param {
    pub ty: TypeId,
    pub convention: ArgConvention,
}

impl Param {
    pub fn owned(ty: TypeId) -> Self {
        Param {
            ty,
            convention: ArgConvention::DirectOwned,
        }
    }

    pub fn guaranteed(ty: TypeId) -> Self {
        Param {
            ty,
            convention: ArgConvention::DirectGuaranteed,
        }
    }
}

/// Everything needed to declare a function before its body exists.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeId,
    pub effects: EffectsKind,
    pub convention: CallingConv,
    /// Always inline regardless of size; costs zero in the inline cost model.
    pub transparent: bool,
    /// Well-known-operation tag (e.g. `string.concat`), supplied upstream.
    pub semantics: Option<String>,
}

impl FunctionSig {
    pub fn new(name: &str, params: Vec<Param>, ret: TypeId) -> Self {
        FunctionSig {
            name: name.to_string(),
            params,
            ret,
            effects: EffectsKind::ReadWrite,
            convention: CallingConv::Native,
            transparent: false,
            semantics: None,
        }
    }
}

// ── Instruction kinds ────────────────────────────────────────────────────────

/// Encoding of a string literal's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrEncoding {
    Utf8,
    Utf16,
}

/// Intrinsic operations folded by the combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOp {
    IcmpEq,
    IcmpNe,
    Sub,
    Xor,
    /// Signed multiply reporting overflow; produces `(result, flag)`.
    SMulOver,
    Strideof,
    StrideofNonZero,
    PtrToInt,
    CanBeClass,
}

/// The closed set of instruction kinds.
///
/// Terminators are instructions too (`Branch`, `CondBranch`, `Return`,
/// `Unreachable`), always last in their block. Block targets live in the
/// kind; value operands live in the instruction's uniform operand list so
/// use-list bookkeeping never depends on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    // Literals and references.
    IntLiteral(i64),
    StringLiteral {
        literal: LiteralId,
        encoding: StrEncoding,
    },
    FunctionRef(FuncId),
    Metatype,
    ValueMetatype,

    // Aggregates.
    Struct,
    StructExtract { field: usize },
    StructElementAddr { field: usize },
    Tuple,
    TupleExtract { index: usize },
    TupleElementAddr { index: usize },
    Enum { case: usize },
    EnumIsTag { case: usize },
    UncheckedEnumData { case: usize },
    InitEnumDataAddr { case: usize },
    InjectEnumAddr { case: usize },
    UncheckedTakeEnumDataAddr { case: usize },

    // Memory.
    AllocStack,
    DeallocStack,
    AllocRef,
    DeallocRef,
    Load,
    Store,
    DestroyAddr,
    IndexAddr,
    IndexRawPointer,

    // Reinterpreting and converting casts.
    Upcast,
    RefCast,
    RefBitCast,
    TrivialBitCast,
    AddrCast,
    RefToRawPointer,
    RawPointerToRef,
    AddressToPointer,
    PointerToAddress,
    ThinToThickFunction,

    // Ownership bookkeeping.
    RetainValue,
    ReleaseValue,
    StrongRetain,
    StrongRelease,
    FixLifetime,
    DebugValue,

    // Calls and dispatch.
    Apply,
    PartialApply,
    Builtin { op: BuiltinOp },
    ClassMethod,
    WitnessMethod,
    CondFail,

    // Terminators.
    Branch {
        target: BlockId,
    },
    CondBranch {
        true_target: BlockId,
        false_target: BlockId,
        /// Operand layout is `[condition, true args.., false args..]`;
        /// this is the number of true args.
        true_args: usize,
    },
    Return,
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Branch { .. }
                | InstKind::CondBranch { .. }
                | InstKind::Return
                | InstKind::Unreachable
        )
    }

    /// Successor block ids of a terminator kind (empty for non-terminators).
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Branch { target } => vec![*target],
            InstKind::CondBranch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            _ => vec![],
        }
    }
}

// ── Graph nodes ──────────────────────────────────────────────────────────────

/// What defines a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Result of an instruction.
    Inst(InstId),
    /// Argument of a basic block (the entry block's arguments are the
    /// function's formals).
    BlockArg { block: BlockId, index: u32 },
}

/// One use edge: operand slot `operand` of instruction `user` reads the
/// value owning this entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Use {
    pub user: InstId,
    pub operand: usize,
}

/// An SSA value: a static type, its definition, and its use list.
#[derive(Debug, Clone)]
pub struct Value {
    pub ty: TypeId,
    pub def: ValueDef,
    uses: Vec<Use>,
}

impl Value {
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn use_empty(&self) -> bool {
        self.uses.is_empty()
    }

    pub fn has_one_use(&self) -> bool {
        self.uses.len() == 1
    }
}

/// A kind-tagged instruction with uniform operand storage.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstKind,
    operands: Vec<ValueId>,
    result: Option<ValueId>,
    pub loc: SourceLoc,
    pub scope: ScopeId,
    block: BlockId,
}

impl Instruction {
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    pub fn operand(&self, i: usize) -> ValueId {
        self.operands[i]
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn result(&self) -> Option<ValueId> {
        self.result
    }

    pub fn block(&self) -> BlockId {
        self.block
    }
}

/// A basic block: argument values plus an ordered instruction list ending in
/// a terminator.
#[derive(Debug, Clone, Default)]
pub struct Block {
    args: Vec<ValueId>,
    insts: Vec<InstId>,
}

impl Block {
    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }
}

// ── Function ─────────────────────────────────────────────────────────────────

/// A function: blocks in layout order (first is the entry), the value and
/// instruction arenas, and the signature attributes the optimizer keys on.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret_ty: TypeId,
    pub effects: EffectsKind,
    pub convention: CallingConv,
    /// Ownership conventions, aligned with the entry block's arguments.
    pub param_conventions: Vec<ArgConvention>,
    pub transparent: bool,
    pub semantics: Option<String>,
    pub scope: ScopeId,

    layout: Vec<BlockId>,
    blocks: Vec<Block>,
    insts: Vec<Option<Instruction>>,
    values: Vec<Value>,
}

impl Default for Function {
    /// Placeholder used when a function is temporarily moved out of its
    /// module for mutation.
    fn default() -> Self {
        Function {
            name: String::new(),
            ret_ty: TypeId(0),
            effects: EffectsKind::ReadWrite,
            convention: CallingConv::Native,
            param_conventions: Vec::new(),
            transparent: false,
            semantics: None,
            scope: ScopeId(0),
            layout: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl Function {
    /// Create a function with an empty entry block holding one argument per
    /// formal parameter.
    pub fn with_signature(sig: FunctionSig, scope: ScopeId) -> Self {
        let mut f = Function {
            name: sig.name,
            ret_ty: sig.ret,
            effects: sig.effects,
            convention: sig.convention,
            param_conventions: sig.params.iter().map(|p| p.convention).collect(),
            transparent: sig.transparent,
            semantics: sig.semantics,
            scope,
            layout: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
        };
        let entry = f.create_block_at(0);
        for p in &sig.params {
            f.add_block_arg(entry, p.ty);
        }
        f
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn entry_block(&self) -> BlockId {
        self.layout[0]
    }

    /// Block ids in layout order.
    pub fn block_order(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    pub fn value_type(&self, id: ValueId) -> TypeId {
        self.values[id.0 as usize].ty
    }

    /// Panics when the instruction has been erased.
    pub fn inst(&self, id: InstId) -> &Instruction {
        self.insts[id.0 as usize]
            .as_ref()
            .expect("access to erased instruction")
    }

    pub fn is_erased(&self, id: InstId) -> bool {
        self.insts[id.0 as usize].is_none()
    }

    /// The instruction's single result value; panics when it has none.
    pub fn single_result(&self, id: InstId) -> ValueId {
        self.inst(id)
            .result()
            .expect("instruction has no result value")
    }

    /// The instruction defining `value`, or `None` for block arguments.
    pub fn defining_inst(&self, value: ValueId) -> Option<InstId> {
        match self.value(value).def {
            ValueDef::Inst(i) => Some(i),
            ValueDef::BlockArg { .. } => None,
        }
    }

    /// Instructions reading `value`, in use-list order (may repeat when one
    /// instruction reads the value through several operands).
    pub fn users_of(&self, value: ValueId) -> Vec<InstId> {
        self.value(value).uses.iter().map(|u| u.user).collect()
    }

    /// The terminator of `block`; panics when the block is empty.
    pub fn terminator(&self, block: BlockId) -> InstId {
        *self
            .block(block)
            .insts()
            .last()
            .expect("block has no terminator")
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.inst(self.terminator(block)).kind.successors()
    }

    /// Position of `inst` within its block's instruction list.
    pub fn index_in_block(&self, inst: InstId) -> usize {
        let block = self.inst(inst).block();
        self.block(block)
            .insts()
            .iter()
            .position(|&i| i == inst)
            .expect("instruction not linked into its block")
    }

    /// The instruction immediately preceding `inst` in the same block.
    pub fn prev_inst(&self, inst: InstId) -> Option<InstId> {
        let block = self.inst(inst).block();
        let idx = self.index_in_block(inst);
        if idx == 0 {
            None
        } else {
            Some(self.block(block).insts()[idx - 1])
        }
    }

    /// Every live instruction, in program order (layout order of blocks,
    /// position order within a block).
    pub fn inst_ids_in_order(&self) -> Vec<InstId> {
        self.layout
            .iter()
            .flat_map(|&b| self.block(b).insts().iter().copied())
            .collect()
    }

    pub fn block_position(&self, block: BlockId) -> usize {
        self.layout
            .iter()
            .position(|&b| b == block)
            .expect("block not in layout")
    }

    // ── Graph construction (used by the Builder and the inliner) ─────────

    pub(crate) fn new_value(&mut self, ty: TypeId, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value {
            ty,
            def,
            uses: Vec::new(),
        });
        id
    }

    /// Create an empty block and insert it at `layout_pos` in layout order.
    pub fn create_block_at(&mut self, layout_pos: usize) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        self.layout.insert(layout_pos, id);
        id
    }

    /// Append a block at the end of the layout.
    pub fn append_block(&mut self) -> BlockId {
        self.create_block_at(self.layout.len())
    }

    pub fn add_block_arg(&mut self, block: BlockId, ty: TypeId) -> ValueId {
        let index = self.blocks[block.0 as usize].args.len() as u32;
        let v = self.new_value(ty, ValueDef::BlockArg { block, index });
        self.blocks[block.0 as usize].args.push(v);
        v
    }

    pub(crate) fn insert_instruction(
        &mut self,
        block: BlockId,
        index: usize,
        kind: InstKind,
        operands: Vec<ValueId>,
        result_ty: Option<TypeId>,
        loc: SourceLoc,
        scope: ScopeId,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        let result = result_ty.map(|ty| self.new_value(ty, ValueDef::Inst(id)));
        for (i, &op) in operands.iter().enumerate() {
            self.values[op.0 as usize].uses.push(Use {
                user: id,
                operand: i,
            });
        }
        self.insts.push(Some(Instruction {
            kind,
            operands,
            result,
            loc,
            scope,
            block,
        }));
        self.blocks[block.0 as usize].insts.insert(index, id);
        id
    }

    // ── Graph mutation ───────────────────────────────────────────────────

    /// Redirect operand slot `idx` of `inst` to `new`, maintaining use lists.
    pub fn set_operand(&mut self, inst: InstId, idx: usize, new: ValueId) {
        let old = self.inst(inst).operand(idx);
        if old == new {
            return;
        }
        self.values[old.0 as usize]
            .uses
            .retain(|u| !(u.user == inst && u.operand == idx));
        self.insts[inst.0 as usize].as_mut().unwrap().operands[idx] = new;
        self.values[new.0 as usize].uses.push(Use {
            user: inst,
            operand: idx,
        });
    }

    /// Rewrite every use of `old` to read `new` instead. Returns the
    /// affected user instructions.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> Vec<InstId> {
        debug_assert_ne!(old, new, "replacing a value with itself");
        let uses = std::mem::take(&mut self.values[old.0 as usize].uses);
        let mut users: Vec<InstId> = Vec::with_capacity(uses.len());
        for u in &uses {
            self.insts[u.user.0 as usize].as_mut().unwrap().operands[u.operand] = new;
            users.push(u.user);
        }
        self.values[new.0 as usize].uses.extend(uses);
        users.dedup();
        trace!("replaced uses of {old} with {new} ({} users)", users.len());
        users
    }

    /// Unlink and destroy an instruction.
    ///
    /// The instruction's result must be dead; callers replace remaining uses
    /// first. Operand use lists and block membership are cleaned up here.
    pub fn erase_instruction(&mut self, id: InstId) {
        let inst = self.insts[id.0 as usize]
            .take()
            .expect("erasing already-erased instruction");
        if let Some(r) = inst.result {
            debug_assert!(
                self.values[r.0 as usize].uses.is_empty(),
                "erasing instruction whose result still has uses"
            );
        }
        for &op in &inst.operands {
            self.values[op.0 as usize].uses.retain(|u| u.user != id);
        }
        let block = &mut self.blocks[inst.block.0 as usize];
        if let Some(pos) = block.insts.iter().position(|&i| i == id) {
            block.insts.remove(pos);
        }
        trace!("erased {id}");
    }

    /// Split `block` at instruction index `at`: everything from `at` onward
    /// (including the terminator) moves into a new block inserted at
    /// `layout_pos`. The original block is left without a terminator; the
    /// caller is responsible for giving it one.
    pub fn split_block(&mut self, block: BlockId, at: usize, layout_pos: usize) -> BlockId {
        let tail = self.blocks[block.0 as usize].insts.split_off(at);
        let new = self.create_block_at(layout_pos);
        for &i in &tail {
            self.insts[i.0 as usize].as_mut().unwrap().block = new;
        }
        self.blocks[new.0 as usize].insts = tail;
        new
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::module::Module;

    fn test_module() -> (Module, TypeId) {
        let mut m = Module::new();
        let i64t = m.types.int(64);
        (m, i64t)
    }

    #[test]
    fn uses_are_tracked_per_operand_slot() {
        let (mut m, i64t) = test_module();
        let f = m.add_function(FunctionSig::new(
            "f",
            vec![Param::owned(i64t)],
            i64t,
        ));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let sub = b.builtin(BuiltinOp::Sub, &[arg, arg], i64t);
        let func = m.func(f);
        // Both operand slots of the builtin read `arg`.
        assert_eq!(func.value(arg).uses().len(), 2);
        assert_eq!(func.users_of(arg), vec![sub, sub]);
    }

    #[test]
    fn replace_all_uses_moves_use_list() {
        let (mut m, i64t) = test_module();
        let f = m.add_function(FunctionSig::new(
            "f",
            vec![Param::owned(i64t), Param::owned(i64t)],
            i64t,
        ));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let (a, b_arg) = (func.block(entry).args()[0], func.block(entry).args()[1]);
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let add = b.builtin(BuiltinOp::Xor, &[a, a], i64t);

        let func = m.func_mut(f);
        let users = func.replace_all_uses(a, b_arg);
        assert_eq!(users, vec![add]);
        assert!(func.value(a).use_empty());
        assert_eq!(func.value(b_arg).uses().len(), 2);
        assert_eq!(func.inst(add).operands(), &[b_arg, b_arg]);
    }

    #[test]
    fn erase_instruction_unlinks_operand_uses() {
        let (mut m, i64t) = test_module();
        let f = m.add_function(FunctionSig::new(
            "f",
            vec![Param::owned(i64t)],
            i64t,
        ));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let dead = b.builtin(BuiltinOp::Xor, &[arg, arg], i64t);

        let func = m.func_mut(f);
        func.erase_instruction(dead);
        assert!(func.is_erased(dead));
        assert!(func.value(arg).use_empty());
        assert!(func.block(entry).insts().is_empty());
    }

    #[test]
    #[should_panic(expected = "erasing already-erased instruction")]
    fn double_erase_panics() {
        let (mut m, i64t) = test_module();
        let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i64t)], i64t));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let dead = b.fix_lifetime(arg);
        let func = m.func_mut(f);
        func.erase_instruction(dead);
        func.erase_instruction(dead);
    }

    #[test]
    fn split_block_moves_tail_and_fixes_membership() {
        let (mut m, i64t) = test_module();
        let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i64t)], i64t));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let first = b.fix_lifetime(arg);
        let second = b.fix_lifetime(arg);
        b.ret(arg);

        let func = m.func_mut(f);
        let cont = func.split_block(entry, 1, 1);
        assert_eq!(func.block(entry).insts(), &[first]);
        assert_eq!(func.block(cont).insts().len(), 2);
        assert_eq!(func.inst(second).block(), cont);
        assert_eq!(func.block_order(), &[entry, cont]);
    }

    #[test]
    fn prev_inst_is_block_local() {
        let (mut m, i64t) = test_module();
        let f = m.add_function(FunctionSig::new("f", vec![Param::owned(i64t)], i64t));
        let (func, types, literals) = m.builder_parts(f);
        let entry = func.entry_block();
        let arg = func.block(entry).args()[0];
        let mut b = Builder::new(func, types, literals);
        b.set_insertion_point(entry, 0);
        let first = b.fix_lifetime(arg);
        let second = b.fix_lifetime(arg);

        let func = m.func(f);
        assert_eq!(func.prev_inst(second), Some(first));
        assert_eq!(func.prev_inst(first), None);
    }

    #[test]
    fn terminator_kind_successors() {
        let k = InstKind::CondBranch {
            true_target: BlockId(1),
            false_target: BlockId(2),
            true_args: 0,
        };
        assert!(k.is_terminator());
        assert_eq!(k.successors(), vec![BlockId(1), BlockId(2)]);
        assert_eq!(InstKind::Return.successors(), vec![]);
        assert!(!InstKind::Load.is_terminator());
    }
}
