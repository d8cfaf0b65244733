//! The inline cost model: a total mapping from instruction kind to a small
//! ordinal cost category, and a per-function aggregate with early cutoff.
//!
//! The per-instruction mapping is an exhaustive match so that adding an
//! instruction kind without classifying it is a compile error, not a
//! runtime one.

use log::{debug, log_enabled, Level};
use sable_ir::{FuncId, InstId, InstKind, MetatypeRepr, Module, TypeKind};

/// Sentinel returned by [`function_cost`] for functions that must never be
/// inlined.
pub const COST_NOT_INLINABLE: u32 = u32::MAX;

/// Cost category of a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineCost {
    /// No runtime cost: pure bookkeeping, reinterpretation, or aggregate
    /// shuffling that lowers to nothing.
    Free,
    /// Anything that executes: memory traffic, refcounting, dispatch,
    /// conditional control flow.
    Expensive,
    /// Inlining the surrounding function would expand a directly
    /// self-recursive call forever.
    CannotBeInlined,
}

/// Classify one instruction of `func` (identified as `func_id` within the
/// module) for inlining purposes.
pub fn instruction_cost(module: &Module, func_id: FuncId, inst: InstId) -> InlineCost {
    let func = module.func(func_id);
    match func.inst(inst).kind {
        // Literals, references, and debug bookkeeping lower to nothing.
        InstKind::IntLiteral(..)
        | InstKind::StringLiteral { .. }
        | InstKind::FunctionRef(..)
        | InstKind::DebugValue
        | InstKind::FixLifetime => InlineCost::Free,

        // Typed element addressing is pointer arithmetic folded into the
        // consumer.
        InstKind::StructElementAddr { .. }
        | InstKind::TupleElementAddr { .. } => InlineCost::Free,

        // Aggregates are exploded during lowering; construction and
        // destructuring are no-ops.
        InstKind::Struct
        | InstKind::Tuple
        | InstKind::StructExtract { .. }
        | InstKind::TupleExtract { .. } => InlineCost::Free,

        // Reinterpreting casts assert a representation, they do not change
        // bits.
        InstKind::Upcast
        | InstKind::RefCast
        | InstKind::RefBitCast
        | InstKind::TrivialBitCast
        | InstKind::AddrCast
        | InstKind::RefToRawPointer
        | InstKind::RawPointerToRef
        | InstKind::AddressToPointer
        | InstKind::PointerToAddress
        | InstKind::ThinToThickFunction => InlineCost::Free,

        // Thin metatypes are statically known; thick ones may require
        // runtime instantiation.
        InstKind::Metatype => {
            let result = func.single_result(inst);
            match module.types.kind(func.value_type(result)) {
                &TypeKind::Metatype {
                    repr: MetatypeRepr::Thin,
                    ..
                } => InlineCost::Free,
                _ => InlineCost::Expensive,
            }
        }

        // Unconditional control-flow transfer costs nothing after layout.
        InstKind::Branch { .. } | InstKind::Return | InstKind::Unreachable => InlineCost::Free,

        // A direct call back into the function being costed can never be
        // inlined away.
        InstKind::Apply => {
            let callee_value = func.inst(inst).operand(0);
            if let Some(def) = func.defining_inst(callee_value) {
                if let InstKind::FunctionRef(callee) = func.inst(def).kind {
                    if callee == func_id {
                        return InlineCost::CannotBeInlined;
                    }
                }
            }
            InlineCost::Expensive
        }

        // Everything else executes.
        InstKind::ValueMetatype
        | InstKind::Enum { .. }
        | InstKind::EnumIsTag { .. }
        | InstKind::UncheckedEnumData { .. }
        | InstKind::InitEnumDataAddr { .. }
        | InstKind::InjectEnumAddr { .. }
        | InstKind::UncheckedTakeEnumDataAddr { .. }
        | InstKind::AllocStack
        | InstKind::DeallocStack
        | InstKind::AllocRef
        | InstKind::DeallocRef
        | InstKind::Load
        | InstKind::Store
        | InstKind::DestroyAddr
        | InstKind::IndexAddr
        | InstKind::IndexRawPointer
        | InstKind::RetainValue
        | InstKind::ReleaseValue
        | InstKind::StrongRetain
        | InstKind::StrongRelease
        | InstKind::PartialApply
        | InstKind::Builtin { .. }
        | InstKind::ClassMethod
        | InstKind::WitnessMethod
        | InstKind::CondFail
        | InstKind::CondBranch { .. } => InlineCost::Expensive,
    }
}

/// Aggregate cost of a function, or [`COST_NOT_INLINABLE`].
///
/// Sums instruction costs in program order and returns the partial sum as
/// soon as it exceeds `cutoff` — an optimization only, so with debug
/// logging enabled the full sum is still computed and reported. A function
/// marked always-inline costs zero regardless of size.
pub fn function_cost(module: &Module, func: FuncId, cutoff: u32) -> u32 {
    let f = module.func(func);
    debug!("cost: calculating cost for {}", f.name);
    if f.transparent {
        return 0;
    }

    let mut cost: u32 = 0;
    for &block in f.block_order() {
        for &inst in f.block(block).insts() {
            match instruction_cost(module, func, inst) {
                InlineCost::CannotBeInlined => return COST_NOT_INLINABLE,
                InlineCost::Free => {}
                InlineCost::Expensive => cost += 1,
            }
            // In the verbose mode we keep counting for the report; the
            // cutoff is purely a shortcut.
            if !log_enabled!(Level::Debug) && cost > cutoff {
                return cost;
            }
        }
    }
    debug!("cost: found cost {cost} for {}", f.name);
    cost
}

// ── Tests ────────────────────────────────────────────────────────────────────
