//! Scalar and control-flow folds: intrinsic comparisons and arithmetic,
//! assertion removal, tag queries, overflow-flag folding, and conditional
//! branch canonicalization.

use super::{as_int_literal, def_inst, Combiner, Rewrite};
use sable_ir::{BuiltinOp, InstId, InstKind, TypeKind, ValueId};

// ── Zero-ness tracking ───────────────────────────────────────────────────────

/// What we statically know about a value being zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IsZero {
    Zero,
    NotZero,
    Unknown,
}

fn zero_kind(cx: &Combiner, v: ValueId) -> IsZero {
    match super::def_kind(&cx.func, v) {
        Some(&InstKind::IntLiteral(n)) => {
            if n == 0 {
                IsZero::Zero
            } else {
                IsZero::NotZero
            }
        }
        // A fresh allocation is never the null reference.
        Some(&InstKind::AllocRef) => IsZero::NotZero,
        _ => IsZero::Unknown,
    }
}

// ── Builtin folding ──────────────────────────────────────────────────────────

pub(super) fn visit_builtin(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let InstKind::Builtin { op } = cx.func.inst(inst).kind else {
        unreachable!("dispatched on kind");
    };
    match op {
        BuiltinOp::IcmpEq => fold_compare_eq(cx, inst, false),
        BuiltinOp::IcmpNe => fold_compare_eq(cx, inst, true),
        BuiltinOp::Sub => fold_sub(cx, inst),
        BuiltinOp::SMulOver => canonicalize_stride_mul(cx, inst),
        BuiltinOp::CanBeClass => fold_can_be_class(cx, inst),
        BuiltinOp::Xor
        | BuiltinOp::Strideof
        | BuiltinOp::StrideofNonZero
        | BuiltinOp::PtrToInt => Rewrite::NoChange,
    }
}

/// Equality of two operands with statically known zero-ness folds to a
/// literal; two known non-zero pointers stay unknown relative to each other.
fn fold_compare_eq(cx: &mut Combiner, inst: InstId, negate: bool) -> Rewrite {
    debug_assert_eq!(
        cx.func.inst(inst).num_operands(),
        2,
        "icmp builtin takes exactly two operands"
    );
    let lhs = zero_kind(cx, cx.func.inst(inst).operand(0));
    let rhs = zero_kind(cx, cx.func.inst(inst).operand(1));
    if lhs == IsZero::Unknown || rhs == IsZero::Unknown {
        return Rewrite::NoChange;
    }
    if lhs == IsZero::NotZero && rhs == IsZero::NotZero {
        return Rewrite::NoChange;
    }
    let equal = (lhs == rhs) ^ negate;
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.int_literal(result_ty, equal as i64);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

/// `sub(x, x)` → `0`, and pointer-difference recovery:
/// `sub(ptr_to_int(index_raw_pointer(v, x)), ptr_to_int(v))` → `x`.
fn fold_sub(cx: &mut Combiner, inst: InstId) -> Rewrite {
    debug_assert_eq!(
        cx.func.inst(inst).num_operands(),
        2,
        "sub builtin takes exactly two operands"
    );
    let lhs = cx.func.inst(inst).operand(0);
    let rhs = cx.func.inst(inst).operand(1);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));

    if lhs == rhs {
        let mut b = cx.builder_before(inst);
        let new = b.int_literal(result_ty, 0);
        let created = b.take_created();
        cx.queue(created);
        return Rewrite::Replaced(new);
    }

    // Both sides ptr_to_int, left over an index_raw_pointer of the same
    // base: the difference is the byte offset.
    let (Some(l_def), Some(r_def)) = (def_inst(&cx.func, lhs), def_inst(&cx.func, rhs)) else {
        return Rewrite::NoChange;
    };
    let l_is_p2i = matches!(
        cx.func.inst(l_def).kind,
        InstKind::Builtin {
            op: BuiltinOp::PtrToInt
        }
    );
    let r_is_p2i = matches!(
        cx.func.inst(r_def).kind,
        InstKind::Builtin {
            op: BuiltinOp::PtrToInt
        }
    );
    if !l_is_p2i || !r_is_p2i {
        return Rewrite::NoChange;
    }
    let Some(index_raw) = def_inst(&cx.func, cx.func.inst(l_def).operand(0)) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(index_raw).kind != InstKind::IndexRawPointer {
        return Rewrite::NoChange;
    }
    let base = cx.func.inst(index_raw).operand(0);
    let offset = cx.func.inst(index_raw).operand(1);
    if base != cx.func.inst(r_def).operand(0) || cx.func.value_type(offset) != result_ty {
        return Rewrite::NoChange;
    }
    cx.replace_inst_uses_with(inst, offset);
    cx.erase_from_function(inst);
    Rewrite::Erased
}

/// Canonicalize stride multiplications so the stride is always the second
/// operand.
fn canonicalize_stride_mul(cx: &mut Combiner, inst: InstId) -> Rewrite {
    debug_assert_eq!(
        cx.func.inst(inst).num_operands(),
        2,
        "smul_over builtin takes exactly two operands"
    );
    let lhs = cx.func.inst(inst).operand(0);
    let rhs = cx.func.inst(inst).operand(1);
    let is_stride = |cx: &Combiner, v: ValueId| {
        matches!(
            super::def_kind(&cx.func, v),
            Some(&InstKind::Builtin {
                op: BuiltinOp::Strideof
            }) | Some(&InstKind::Builtin {
                op: BuiltinOp::StrideofNonZero
            })
        )
    };
    if !is_stride(cx, lhs) || is_stride(cx, rhs) {
        return Rewrite::NoChange;
    }
    cx.func.set_operand(inst, 0, rhs);
    cx.func.set_operand(inst, 1, lhs);
    Rewrite::MutatedInPlace
}

/// Fold the can-be-class type query when the answer is statically known.
fn fold_can_be_class(cx: &mut Combiner, inst: InstId) -> Rewrite {
    debug_assert_eq!(
        cx.func.inst(inst).num_operands(),
        1,
        "can_be_class builtin takes exactly one operand"
    );
    let meta = cx.func.inst(inst).operand(0);
    let &TypeKind::Metatype { instance, .. } = cx.types().kind(cx.func.value_type(meta)) else {
        return Rewrite::NoChange;
    };
    let answer = match cx.types().kind(instance) {
        TypeKind::Ref { .. } => Some(1),
        // Archetypes may be bound to a class; no static answer.
        TypeKind::Generic { .. } => None,
        _ => Some(0),
    };
    let Some(answer) = answer else {
        return Rewrite::NoChange;
    };
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.int_literal(result_ty, answer);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

// ── Assertions ───────────────────────────────────────────────────────────────

/// `cond_fail` on a literal false condition never fires; under
/// `remove_assertions` every runtime assert is dropped.
pub(super) fn visit_cond_fail(cx: &mut Combiner, inst: InstId) -> Rewrite {
    if cx.options.remove_assertions {
        cx.erase_from_function(inst);
        return Rewrite::Erased;
    }
    if as_int_literal(&cx.func, cx.func.inst(inst).operand(0)) == Some(0) {
        cx.erase_from_function(inst);
        return Rewrite::Erased;
    }
    Rewrite::NoChange
}

// ── Tag queries ──────────────────────────────────────────────────────────────

/// `enum_is_tag(enum #c′, #c)` folds to whether the tags match.
pub(super) fn visit_enum_is_tag(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let InstKind::EnumIsTag { case } = cx.func.inst(inst).kind else {
        unreachable!("dispatched on kind");
    };
    let operand = cx.func.inst(inst).operand(0);
    let Some(&InstKind::Enum { case: actual }) = super::def_kind(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.int_literal(result_ty, (actual == case) as i64);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

/// The overflow flag of an overflow-reporting multiply folds to 0 when the
/// operation provably cannot overflow.
pub(super) fn visit_tuple_extract(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let InstKind::TupleExtract { index } = cx.func.inst(inst).kind else {
        unreachable!("dispatched on kind");
    };
    if index != 1 {
        return Rewrite::NoChange;
    }
    let operand = cx.func.inst(inst).operand(0);
    let Some(def) = def_inst(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    if !matches!(
        cx.func.inst(def).kind,
        InstKind::Builtin {
            op: BuiltinOp::SMulOver
        }
    ) {
        return Rewrite::NoChange;
    }
    let lhs = as_int_literal(&cx.func, cx.func.inst(def).operand(0));
    let rhs = as_int_literal(&cx.func, cx.func.inst(def).operand(1));
    let cannot_overflow = match (lhs, rhs) {
        (Some(a), Some(b)) => a.checked_mul(b).is_some(),
        _ => false,
    };
    if !cannot_overflow {
        return Rewrite::NoChange;
    }
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.int_literal(result_ty, 0);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

// ── Branch canonicalization ──────────────────────────────────────────────────

/// `cond_br(xor(c, 1), T(a..), F(b..))` → `cond_br(c, F(b..), T(a..))`:
/// branch on the original condition with the successors swapped.
pub(super) fn visit_cond_branch(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let InstKind::CondBranch {
        true_target,
        false_target,
        true_args,
    } = cx.func.inst(inst).kind
    else {
        unreachable!("dispatched on kind");
    };
    let condition = cx.func.inst(inst).operand(0);
    let Some(xor) = def_inst(&cx.func, condition) else {
        return Rewrite::NoChange;
    };
    if !matches!(
        cx.func.inst(xor).kind,
        InstKind::Builtin { op: BuiltinOp::Xor }
    ) {
        return Rewrite::NoChange;
    }
    debug_assert_eq!(
        cx.func.inst(xor).num_operands(),
        2,
        "xor builtin takes exactly two operands"
    );
    if as_int_literal(&cx.func, cx.func.inst(xor).operand(1)) != Some(1) {
        return Rewrite::NoChange;
    }

    let inner = cx.func.inst(xor).operand(0);
    let operands = cx.func.inst(inst).operands().to_vec();
    let t_args: Vec<ValueId> = operands[1..1 + true_args].to_vec();
    let f_args: Vec<ValueId> = operands[1 + true_args..].to_vec();

    let mut b = cx.builder_before(inst);
    let new = b.cond_branch(inner, false_target, &f_args, true_target, &t_args);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

// ── Tests ────────────────────────────────────────────────────────────────────
