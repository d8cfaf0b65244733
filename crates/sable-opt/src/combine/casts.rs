//! Cast rewrites: layout-compatible bitcast fusion, redundant-cast
//! collapsing, and cast/projection round-trip elimination.
//!
//! The fusion rules exploit layout compatibility: a single-field struct (or
//! the first payload-bearing case of an enum) occupies the same memory as
//! its field, so extracting through a reinterpreting bitcast can reinterpret
//! the pre-cast value directly. Neither rule fires when the source type
//! carries archetypes (size unknown) or is trivial (no representation to
//! preserve).

use super::{def_inst, Combiner, Rewrite};
use sable_ir::{InstId, InstKind};

// ── Layout-compatible bitcast fusion ─────────────────────────────────────────

/// `struct_extract(ref_bit_cast X→Y, #field)` → `ref_bit_cast X→field`
/// when `Y` is a struct with exactly one stored field.
pub(super) fn visit_struct_extract(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let operand_ty = cx.func.value_type(operand);
    if cx.types().has_archetype(operand_ty) || cx.types().is_trivial(operand_ty) {
        return Rewrite::NoChange;
    }

    let Some(cast) = def_inst(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(cast).kind != InstKind::RefBitCast {
        return Rewrite::NoChange;
    }

    // Layout compatibility requires the struct to have exactly one stored
    // field.
    if cx.types().single_stored_field(operand_ty).is_none() {
        return Rewrite::NoChange;
    }

    let source = cx.func.inst(cast).operand(0);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.ref_bit_cast(source, result_ty);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

/// `unchecked_enum_data(ref_bit_cast X→Y, #case)` → `ref_bit_cast X→payload`
/// when `#case` is the first payload-bearing case of the enum `Y`.
pub(super) fn visit_unchecked_enum_data(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let InstKind::UncheckedEnumData { case } = cx.func.inst(inst).kind else {
        unreachable!("dispatched on kind");
    };
    let operand = cx.func.inst(inst).operand(0);
    let operand_ty = cx.func.value_type(operand);
    if cx.types().has_archetype(operand_ty) || cx.types().is_trivial(operand_ty) {
        return Rewrite::NoChange;
    }

    let Some(cast) = def_inst(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(cast).kind != InstKind::RefBitCast {
        return Rewrite::NoChange;
    }

    // Only the first payload-bearing case is layout compatible with the
    // whole enum.
    if cx.types().first_payloaded_case(operand_ty) != Some(case) {
        return Rewrite::NoChange;
    }

    let source = cx.func.inst(cast).operand(0);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.ref_bit_cast(source, result_ty);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

// ── Redundant-cast collapsing ────────────────────────────────────────────────

/// `ref_bit_cast Y→Z (ref_bit_cast X→Y x)` → `ref_bit_cast X→Z x`
pub(super) fn visit_ref_bit_cast(cx: &mut Combiner, inst: InstId) -> Rewrite {
    collapse_through(cx, inst, &[InstKind::RefBitCast], InstKind::RefBitCast)
}

/// `trivial_bit_cast` collapses through both trivial and ref bitcasts; the
/// final cast stays trivial because its target type is.
pub(super) fn visit_trivial_bit_cast(cx: &mut Combiner, inst: InstId) -> Rewrite {
    collapse_through(
        cx,
        inst,
        &[InstKind::TrivialBitCast, InstKind::RefBitCast],
        InstKind::TrivialBitCast,
    )
}

/// `upcast(upcast x)` rewires to `x` in place; the inner cast is erased
/// when it just lost its last use.
pub(super) fn visit_upcast(cx: &mut Combiner, inst: InstId) -> Rewrite {
    rewire_through(cx, inst, InstKind::Upcast)
}

/// Chains of `ref_cast` (and `ref_cast` of `upcast`) collapse; a
/// `ref_cast` whose target is a supertype of its operand canonicalizes
/// to `upcast`.
pub(super) fn visit_ref_cast(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));

    if let Some(def) = def_inst(&cx.func, operand) {
        if matches!(
            cx.func.inst(def).kind,
            InstKind::RefCast | InstKind::Upcast
        ) {
            let source = cx.func.inst(def).operand(0);
            let mut b = cx.builder_before(inst);
            let new = b.ref_cast(source, result_ty);
            let created = b.take_created();
            cx.queue(created);
            return Rewrite::Replaced(new);
        }
    }

    let operand_ty = cx.func.value_type(operand);
    if result_ty != operand_ty && cx.types().is_superclass_of(result_ty, operand_ty) {
        let mut b = cx.builder_before(inst);
        let new = b.upcast(operand, result_ty);
        let created = b.take_created();
        cx.queue(created);
        return Rewrite::Replaced(new);
    }

    Rewrite::NoChange
}

/// `ref_to_raw_pointer(ref_cast x)` reads through the cast: the raw bits
/// are the same either way.
pub(super) fn visit_ref_to_raw_pointer(cx: &mut Combiner, inst: InstId) -> Rewrite {
    rewire_through(cx, inst, InstKind::RefCast)
}

/// `raw_pointer_to_ref(ref_to_raw_pointer x) X→Z` → `ref_cast x X→Z`
pub(super) fn visit_raw_pointer_to_ref(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let Some(def) = def_inst(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(def).kind != InstKind::RefToRawPointer {
        return Rewrite::NoChange;
    }
    let source = cx.func.inst(def).operand(0);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.ref_cast(source, result_ty);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

/// `pointer_to_address(address_to_pointer x)` → `addr_cast x`: the
/// round trip through a raw pointer asserts layout compatibility.
pub(super) fn visit_pointer_to_address(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let Some(def) = def_inst(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(def).kind != InstKind::AddressToPointer {
        return Rewrite::NoChange;
    }
    let source = cx.func.inst(def).operand(0);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.addr_cast(source, result_ty);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

/// Address-cast collapsing and the all-loads rewrite.
pub(super) fn visit_addr_cast(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let result = cx.func.single_result(inst);
    let result_ty = cx.func.value_type(result);

    // (addr_cast (addr_cast x X→Y) Y→Z) → (addr_cast x X→Z)
    if let Some(def) = def_inst(&cx.func, operand) {
        if cx.func.inst(def).kind == InstKind::AddrCast {
            let source = cx.func.inst(def).operand(0);
            let mut b = cx.builder_before(inst);
            let new = b.addr_cast(source, result_ty);
            let created = b.take_created();
            cx.queue(created);
            return Rewrite::Replaced(new);
        }
    }

    let operand_ty = cx.func.value_type(operand);
    let (Some(out_pointee), Some(in_pointee)) = (
        cx.types().pointee(result_ty),
        cx.types().pointee(operand_ty),
    ) else {
        return Rewrite::NoChange;
    };

    // Address cast up a class hierarchy is just an upcast.
    if result_ty != operand_ty && cx.types().is_superclass_of(out_pointee, in_pointee) {
        let mut b = cx.builder_before(inst);
        let new = b.upcast(operand, result_ty);
        let created = b.take_created();
        cx.queue(created);
        return Rewrite::Replaced(new);
    }

    // If every user is a load, load the original type instead and bitcast
    // each loaded value. Dead casts are left to dead-code elimination.
    if cx.func.value(result).use_empty() {
        return Rewrite::NoChange;
    }
    if !cx.types().is_loadable(in_pointee) || !cx.types().is_loadable(out_pointee) {
        return Rewrite::NoChange;
    }
    let in_trivial = cx.types().is_trivial(in_pointee);
    let out_trivial = cx.types().is_trivial(out_pointee);
    // Never launder a trivial representation into a reference-counted one.
    if in_trivial && !out_trivial {
        return Rewrite::NoChange;
    }
    // Structs may differ in size; refuse struct-to-struct reinterpretation.
    let in_is_struct = matches!(cx.types().kind(in_pointee), sable_ir::TypeKind::Struct { .. });
    let out_is_struct = matches!(cx.types().kind(out_pointee), sable_ir::TypeKind::Struct { .. });
    if in_is_struct && out_is_struct {
        return Rewrite::NoChange;
    }

    let users = cx.func.users_of(result);
    if !users
        .iter()
        .all(|&u| cx.func.inst(u).kind == InstKind::Load)
    {
        return Rewrite::NoChange;
    }

    for load in users {
        let mut b = cx.builder_before(load);
        let new_load = b.load(operand);
        let loaded = b.func().single_result(new_load);
        let cast = if out_trivial {
            b.trivial_bit_cast(loaded, out_pointee)
        } else {
            b.ref_bit_cast(loaded, out_pointee)
        };
        let cast_result = b.func().single_result(cast);
        let created = b.take_created();
        cx.queue(created);
        cx.replace_inst_uses_with(load, cast_result);
        cx.erase_from_function(load);
    }
    cx.erase_from_function(inst);
    Rewrite::Erased
}

// ── Shared rewrite shapes ────────────────────────────────────────────────────

/// Replace `inst` with a single cast of kind `out` reading through an inner
/// cast whose kind is in `through`.
fn collapse_through(
    cx: &mut Combiner,
    inst: InstId,
    through: &[InstKind],
    out: InstKind,
) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let Some(def) = def_inst(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    if !through.contains(&cx.func.inst(def).kind) {
        return Rewrite::NoChange;
    }
    let source = cx.func.inst(def).operand(0);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut b = cx.builder_before(inst);
    let new = b.emit_raw(out, vec![source], Some(result_ty));
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

/// Rewire `inst`'s operand through an inner cast of kind `through`,
/// erasing the inner cast once it is dead.
fn rewire_through(cx: &mut Combiner, inst: InstId, through: InstKind) -> Rewrite {
    let operand = cx.func.inst(inst).operand(0);
    let Some(def) = def_inst(&cx.func, operand) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(def).kind != through {
        return Rewrite::NoChange;
    }
    let source = cx.func.inst(def).operand(0);
    cx.func.set_operand(inst, 0, source);
    if let Some(r) = cx.func.inst(def).result() {
        if cx.func.value(r).use_empty() {
            cx.erase_from_function(def);
        }
    }
    Rewrite::MutatedInPlace
}

// ── Tests ────────────────────────────────────────────────────────────────────
