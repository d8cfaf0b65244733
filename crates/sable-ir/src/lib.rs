//! sable-ir — the SSA intermediate representation underlying the sable
//! mid-level optimizer.
//!
//! This crate is the data model only: types, values, instructions, basic
//! blocks, functions, the module container, and the insertion-cursor
//! [`builder::Builder`]. It enforces the graph invariants (use lists in
//! sync with operand slots, one terminator per block, erase-only-when-dead)
//! and carries no optimization policy; the rewrites live in `sable-opt`.

pub mod builder;
pub mod func;
pub mod module;
pub mod types;

pub use builder::Builder;
pub use func::{
    ArgConvention, Block, BlockId, BuiltinOp, CallingConv, EffectsKind, FuncId, Function,
    FunctionSig, InstId, InstKind, Instruction, LiteralId, Param, ScopeId, SourceLoc, StrEncoding,
    Use, Value, ValueDef, ValueId,
};
pub use module::{DebugScope, LiteralInterner, Module};
pub use types::{EnumCase, MetatypeRepr, TypeId, TypeKind, TypeTable};
