//! Instruction builder — an insertion cursor over one function.
//!
//! The builder is pure mechanism: it creates instructions at the cursor,
//! wires their operands and results into the graph, and records every
//! created instruction so a driving pass can seed its worklist with them.
//! All policy (what to build, what to erase) lives in the passes.
//!
//! Construction goes through [`crate::module::Module::builder_parts`], which
//! hands the builder the module's shared uniquing tables by reference; the
//! builder never owns module state.

use crate::func::{
    BlockId, BuiltinOp, FuncId, Function, InstId, InstKind, ScopeId, SourceLoc, StrEncoding,
    ValueId,
};
use crate::module::LiteralInterner;
use crate::types::{TypeId, TypeTable};

/// Insertion cursor plus construction services for one function.
pub struct Builder<'a> {
    func: &'a mut Function,
    types: &'a mut TypeTable,
    literals: &'a mut LiteralInterner,
    point: Option<(BlockId, usize)>,
    loc: SourceLoc,
    scope: ScopeId,
    created: Vec<InstId>,
}

impl<'a> Builder<'a> {
    pub fn new(
        func: &'a mut Function,
        types: &'a mut TypeTable,
        literals: &'a mut LiteralInterner,
    ) -> Self {
        let scope = func.scope;
        Builder {
            func,
            types,
            literals,
            point: None,
            loc: SourceLoc::UNKNOWN,
            scope,
            created: Vec::new(),
        }
    }

    // ── Cursor and provenance state ──────────────────────────────────────

    /// Place the cursor so the next instruction lands at `index` in `block`.
    pub fn set_insertion_point(&mut self, block: BlockId, index: usize) {
        self.point = Some((block, index));
    }

    /// Place the cursor immediately before an existing instruction.
    pub fn set_insertion_before(&mut self, inst: InstId) {
        let block = self.func.inst(inst).block();
        let index = self.func.index_in_block(inst);
        self.point = Some((block, index));
    }

    /// Place the cursor at the end of `block`.
    pub fn set_insertion_at_end(&mut self, block: BlockId) {
        let index = self.func.block(block).insts().len();
        self.point = Some((block, index));
    }

    pub fn insertion_point(&self) -> Option<(BlockId, usize)> {
        self.point
    }

    /// Set the source location and debug scope stamped onto subsequently
    /// built instructions.
    pub fn set_source(&mut self, loc: SourceLoc, scope: ScopeId) {
        self.loc = loc;
        self.scope = scope;
    }

    pub fn func(&self) -> &Function {
        &*self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }

    pub fn types(&mut self) -> &mut TypeTable {
        self.types
    }

    /// Drain the list of instructions created since the last call.
    pub fn take_created(&mut self) -> Vec<InstId> {
        std::mem::take(&mut self.created)
    }

    // ── Core emission ────────────────────────────────────────────────────

    fn emit(
        &mut self,
        kind: InstKind,
        operands: Vec<ValueId>,
        result_ty: Option<TypeId>,
    ) -> InstId {
        let (block, index) = self
            .point
            .expect("builder has no insertion point");
        let id = self
            .func
            .insert_instruction(block, index, kind, operands, result_ty, self.loc, self.scope);
        self.point = Some((block, index + 1));
        self.created.push(id);
        id
    }

    /// Emit an instruction from an explicit kind, operand list, and result
    /// type.
    ///
    /// This is the raw entry point used by cloning passes (the inliner);
    /// everything else should prefer the typed constructors below.
    pub fn emit_raw(
        &mut self,
        kind: InstKind,
        operands: Vec<ValueId>,
        result_ty: Option<TypeId>,
    ) -> InstId {
        self.emit(kind, operands, result_ty)
    }

    // ── Literals and references ──────────────────────────────────────────

    pub fn int_literal(&mut self, ty: TypeId, value: i64) -> InstId {
        self.emit(InstKind::IntLiteral(value), vec![], Some(ty))
    }

    /// Interns `bytes` in the module's uniquing table.
    pub fn string_literal(&mut self, ty: TypeId, bytes: &[u8], encoding: StrEncoding) -> InstId {
        let literal = self.literals.intern(bytes);
        self.emit(InstKind::StringLiteral { literal, encoding }, vec![], Some(ty))
    }

    pub fn function_ref(&mut self, func: FuncId, ty: TypeId) -> InstId {
        self.emit(InstKind::FunctionRef(func), vec![], Some(ty))
    }

    pub fn metatype(&mut self, ty: TypeId) -> InstId {
        self.emit(InstKind::Metatype, vec![], Some(ty))
    }

    pub fn value_metatype(&mut self, ty: TypeId, operand: ValueId) -> InstId {
        self.emit(InstKind::ValueMetatype, vec![operand], Some(ty))
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    pub fn struct_value(&mut self, ty: TypeId, fields: &[ValueId]) -> InstId {
        self.emit(InstKind::Struct, fields.to_vec(), Some(ty))
    }

    pub fn struct_extract(&mut self, operand: ValueId, field: usize, ty: TypeId) -> InstId {
        self.emit(InstKind::StructExtract { field }, vec![operand], Some(ty))
    }

    pub fn struct_element_addr(&mut self, operand: ValueId, field: usize, ty: TypeId) -> InstId {
        self.emit(InstKind::StructElementAddr { field }, vec![operand], Some(ty))
    }

    pub fn tuple(&mut self, ty: TypeId, elems: &[ValueId]) -> InstId {
        self.emit(InstKind::Tuple, elems.to_vec(), Some(ty))
    }

    pub fn tuple_extract(&mut self, operand: ValueId, index: usize, ty: TypeId) -> InstId {
        self.emit(InstKind::TupleExtract { index }, vec![operand], Some(ty))
    }

    pub fn tuple_element_addr(&mut self, operand: ValueId, index: usize, ty: TypeId) -> InstId {
        self.emit(InstKind::TupleElementAddr { index }, vec![operand], Some(ty))
    }

    pub fn enum_value(&mut self, ty: TypeId, case: usize, payload: Option<ValueId>) -> InstId {
        let operands = payload.into_iter().collect();
        self.emit(InstKind::Enum { case }, operands, Some(ty))
    }

    pub fn enum_is_tag(&mut self, ty: TypeId, operand: ValueId, case: usize) -> InstId {
        self.emit(InstKind::EnumIsTag { case }, vec![operand], Some(ty))
    }

    pub fn unchecked_enum_data(&mut self, operand: ValueId, case: usize, ty: TypeId) -> InstId {
        self.emit(InstKind::UncheckedEnumData { case }, vec![operand], Some(ty))
    }

    pub fn init_enum_data_addr(&mut self, operand: ValueId, case: usize, ty: TypeId) -> InstId {
        self.emit(InstKind::InitEnumDataAddr { case }, vec![operand], Some(ty))
    }

    pub fn inject_enum_addr(&mut self, operand: ValueId, case: usize) -> InstId {
        self.emit(InstKind::InjectEnumAddr { case }, vec![operand], None)
    }

    pub fn unchecked_take_enum_data_addr(
        &mut self,
        operand: ValueId,
        case: usize,
        ty: TypeId,
    ) -> InstId {
        self.emit(
            InstKind::UncheckedTakeEnumDataAddr { case },
            vec![operand],
            Some(ty),
        )
    }

    // ── Memory ───────────────────────────────────────────────────────────

    pub fn alloc_stack(&mut self, pointee: TypeId) -> InstId {
        let ty = self.types.address_of(pointee);
        self.emit(InstKind::AllocStack, vec![], Some(ty))
    }

    pub fn dealloc_stack(&mut self, addr: ValueId) -> InstId {
        self.emit(InstKind::DeallocStack, vec![addr], None)
    }

    pub fn alloc_ref(&mut self, ty: TypeId) -> InstId {
        self.emit(InstKind::AllocRef, vec![], Some(ty))
    }

    pub fn dealloc_ref(&mut self, operand: ValueId) -> InstId {
        self.emit(InstKind::DeallocRef, vec![operand], None)
    }

    /// Result type is the pointee of the address operand.
    pub fn load(&mut self, addr: ValueId) -> InstId {
        let addr_ty = self.func.value_type(addr);
        let pointee = self
            .types
            .pointee(addr_ty)
            .expect("load from a non-address value");
        self.emit(InstKind::Load, vec![addr], Some(pointee))
    }

    pub fn store(&mut self, value: ValueId, addr: ValueId) -> InstId {
        self.emit(InstKind::Store, vec![value, addr], None)
    }

    pub fn destroy_addr(&mut self, addr: ValueId) -> InstId {
        self.emit(InstKind::DestroyAddr, vec![addr], None)
    }

    pub fn index_addr(&mut self, base: ValueId, index: ValueId) -> InstId {
        let ty = self.func.value_type(base);
        self.emit(InstKind::IndexAddr, vec![base, index], Some(ty))
    }

    pub fn index_raw_pointer(&mut self, base: ValueId, offset: ValueId) -> InstId {
        let ty = self.func.value_type(base);
        self.emit(InstKind::IndexRawPointer, vec![base, offset], Some(ty))
    }

    // ── Casts ────────────────────────────────────────────────────────────

    pub fn upcast(&mut self, operand: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::Upcast, vec![operand], Some(ty))
    }

    pub fn ref_cast(&mut self, operand: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::RefCast, vec![operand], Some(ty))
    }

    pub fn ref_bit_cast(&mut self, operand: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::RefBitCast, vec![operand], Some(ty))
    }

    pub fn trivial_bit_cast(&mut self, operand: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::TrivialBitCast, vec![operand], Some(ty))
    }

    pub fn addr_cast(&mut self, operand: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::AddrCast, vec![operand], Some(ty))
    }

    pub fn ref_to_raw_pointer(&mut self, operand: ValueId) -> InstId {
        let ty = self.types.raw_pointer();
        self.emit(InstKind::RefToRawPointer, vec![operand], Some(ty))
    }

    pub fn raw_pointer_to_ref(&mut self, operand: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::RawPointerToRef, vec![operand], Some(ty))
    }

    pub fn address_to_pointer(&mut self, operand: ValueId) -> InstId {
        let ty = self.types.raw_pointer();
        self.emit(InstKind::AddressToPointer, vec![operand], Some(ty))
    }

    pub fn pointer_to_address(&mut self, operand: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::PointerToAddress, vec![operand], Some(ty))
    }

    pub fn thin_to_thick_function(&mut self, operand: ValueId) -> InstId {
        let ty = self.types.thick_function();
        self.emit(InstKind::ThinToThickFunction, vec![operand], Some(ty))
    }

    // ── Ownership operations ─────────────────────────────────────────────

    pub fn retain_value(&mut self, operand: ValueId) -> InstId {
        self.emit(InstKind::RetainValue, vec![operand], None)
    }

    pub fn release_value(&mut self, operand: ValueId) -> InstId {
        self.emit(InstKind::ReleaseValue, vec![operand], None)
    }

    pub fn strong_retain(&mut self, operand: ValueId) -> InstId {
        self.emit(InstKind::StrongRetain, vec![operand], None)
    }

    pub fn strong_release(&mut self, operand: ValueId) -> InstId {
        self.emit(InstKind::StrongRelease, vec![operand], None)
    }

    pub fn fix_lifetime(&mut self, operand: ValueId) -> InstId {
        self.emit(InstKind::FixLifetime, vec![operand], None)
    }

    pub fn debug_value(&mut self, operand: ValueId) -> InstId {
        self.emit(InstKind::DebugValue, vec![operand], None)
    }

    // ── Calls and dispatch ───────────────────────────────────────────────

    /// Operand layout is `[callee, args..]`.
    pub fn apply(&mut self, callee: ValueId, args: &[ValueId], result_ty: TypeId) -> InstId {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(args);
        self.emit(InstKind::Apply, operands, Some(result_ty))
    }

    /// Operand layout is `[callee, captured..]`; the result is a thick
    /// function value.
    pub fn partial_apply(&mut self, callee: ValueId, captured: &[ValueId]) -> InstId {
        let ty = self.types.thick_function();
        let mut operands = Vec::with_capacity(captured.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(captured);
        self.emit(InstKind::PartialApply, operands, Some(ty))
    }

    pub fn builtin(&mut self, op: BuiltinOp, args: &[ValueId], result_ty: TypeId) -> InstId {
        self.emit(InstKind::Builtin { op }, args.to_vec(), Some(result_ty))
    }

    pub fn class_method(&mut self, object: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::ClassMethod, vec![object], Some(ty))
    }

    pub fn witness_method(&mut self, object: ValueId, ty: TypeId) -> InstId {
        self.emit(InstKind::WitnessMethod, vec![object], Some(ty))
    }

    pub fn cond_fail(&mut self, condition: ValueId) -> InstId {
        self.emit(InstKind::CondFail, vec![condition], None)
    }

    // ── Terminators ──────────────────────────────────────────────────────

    pub fn branch(&mut self, target: BlockId, args: &[ValueId]) -> InstId {
        self.emit(InstKind::Branch { target }, args.to_vec(), None)
    }

    pub fn cond_branch(
        &mut self,
        condition: ValueId,
        true_target: BlockId,
        true_args: &[ValueId],
        false_target: BlockId,
        false_args: &[ValueId],
    ) -> InstId {
        let mut operands = Vec::with_capacity(1 + true_args.len() + false_args.len());
        operands.push(condition);
        operands.extend_from_slice(true_args);
        operands.extend_from_slice(false_args);
        self.emit(
            InstKind::CondBranch {
                true_target,
                false_target,
                true_args: true_args.len(),
            },
            operands,
            None,
        )
    }

    pub fn ret(&mut self, value: ValueId) -> InstId {
        self.emit(InstKind::Return, vec![value], None)
    }

    pub fn unreachable(&mut self) -> InstId {
        self.emit(InstKind::Unreachable, vec![], None)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
