//! Reference-count rewrites: specializing generic retain/release to the
//! strong form, erasing ownership traffic on trivial values, narrowing enum
//! ownership to the payload, and erasing adjacent release/retain pairs.
//!
//! The pair elimination is deliberately block-local: a decrement immediately
//! followed by an increment of the same value in the same block is a
//! provable no-op pair even when the matching operations live in other
//! blocks. Cross-block pairs are out of scope here.

use super::{def_inst, Combiner, Rewrite};
use sable_ir::{InstId, InstKind};

/// `retain_value` specialization.
pub(super) fn visit_retain_value(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let operand_ty = cx.func.value_type(operand);

    // Retain of an enum with no payload or a trivial payload is a no-op;
    // with a nontrivial payload it narrows to the payload.
    if let Some(enum_inst) = def_inst(&cx.func, operand) {
        if let InstKind::Enum { .. } = cx.func.inst(enum_inst).kind {
            match payload_operand(cx, enum_inst) {
                PayloadClass::NoneOrTrivial => {
                    cx.erase_from_function(inst);
                    return Rewrite::Erased;
                }
                PayloadClass::Nontrivial(payload) => {
                    let mut b = cx.builder_before(inst);
                    let new = b.retain_value(payload);
                    let created = b.take_created();
                    cx.queue(created);
                    return Rewrite::Replaced(new);
                }
            }
        }
    }

    if cx.types().has_reference_semantics(operand_ty) {
        let mut b = cx.builder_before(inst);
        let new = b.strong_retain(operand);
        let created = b.take_created();
        cx.queue(created);
        return Rewrite::Replaced(new);
    }

    if cx.types().is_trivial(operand_ty) {
        cx.erase_from_function(inst);
        return Rewrite::Erased;
    }

    // release_value %v immediately before retain_value %v is a provable
    // no-op pair at block-local granularity.
    erase_release_retain_pair(cx, inst, InstKind::ReleaseValue)
}

/// `release_value` specialization; mirror image of the retain rule, minus
/// the pair peephole (the pair is keyed on the increment).
pub(super) fn visit_release_value(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let operand_ty = cx.func.value_type(operand);

    if let Some(enum_inst) = def_inst(&cx.func, operand) {
        if let InstKind::Enum { .. } = cx.func.inst(enum_inst).kind {
            match payload_operand(cx, enum_inst) {
                PayloadClass::NoneOrTrivial => {
                    cx.erase_from_function(inst);
                    return Rewrite::Erased;
                }
                PayloadClass::Nontrivial(payload) => {
                    let mut b = cx.builder_before(inst);
                    let new = b.release_value(payload);
                    let created = b.take_created();
                    cx.queue(created);
                    return Rewrite::Replaced(new);
                }
            }
        }
    }

    if cx.types().has_reference_semantics(operand_ty) {
        let mut b = cx.builder_before(inst);
        let new = b.strong_release(operand);
        let created = b.take_created();
        cx.queue(created);
        return Rewrite::Replaced(new);
    }

    if cx.types().is_trivial(operand_ty) {
        cx.erase_from_function(inst);
        return Rewrite::Erased;
    }

    Rewrite::NoChange
}

/// `strong_retain`: no-op on context-free function values, and the adjacent
/// release/retain pair peephole.
pub(super) fn visit_strong_retain(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    if let Some(def) = def_inst(&cx.func, operand) {
        if cx.func.inst(def).kind == InstKind::ThinToThickFunction {
            cx.erase_from_function(inst);
            return Rewrite::Erased;
        }
    }
    erase_release_retain_pair(cx, inst, InstKind::StrongRelease)
}

/// `strong_release` of a context-free function value is a no-op.
pub(super) fn visit_strong_release(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    if let Some(def) = def_inst(&cx.func, operand) {
        if cx.func.inst(def).kind == InstKind::ThinToThickFunction {
            cx.erase_from_function(inst);
            return Rewrite::Erased;
        }
    }
    Rewrite::NoChange
}

// ── Helpers ──────────────────────────────────────────────────────────────────

enum PayloadClass {
    NoneOrTrivial,
    Nontrivial(sable_ir::ValueId),
}

/// Classify the payload of an `enum` instruction for ownership purposes.
fn payload_operand(cx: &Combiner, enum_inst: InstId) -> PayloadClass {
    match cx.func.inst(enum_inst).operands() {
        [] => PayloadClass::NoneOrTrivial,
        [payload] => {
            let ty = cx.func.value_type(*payload);
            if cx.types().is_trivial(ty) {
                PayloadClass::NoneOrTrivial
            } else {
                PayloadClass::Nontrivial(*payload)
            }
        }
        other => unreachable!("enum instruction with {} operands", other.len()),
    }
}

/// If the instruction immediately preceding `retain` in the same block is a
/// decrement of kind `release_kind` on the same value, erase both.
fn erase_release_retain_pair(
    cx: &mut Combiner,
    retain: InstId,
    release_kind: InstKind,
) -> Rewrite {
    let Some(prev) = cx.func.prev_inst(retain) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(prev).kind != release_kind {
        return Rewrite::NoChange;
    }
    if cx.func.inst(prev).operand(0) != cx.func.inst(retain).operand(0) {
        return Rewrite::NoChange;
    }
    cx.erase_from_function(prev);
    cx.erase_from_function(retain);
    Rewrite::Erased
}

// ── Tests ────────────────────────────────────────────────────────────────────
