//! Memory rewrites: load canonicalization into per-field loads, promotion
//! of enum-address projections to value form, and materialization of the
//! store-then-tag idiom into a single tagged value.
//!
//! Several of these rules deliberately leave dead scratch (allocations,
//! casts, stores) behind; reclaiming it is the job of the dead-code and
//! dead-store passes that run after the combiner, which keeps each rewrite
//! here local and cheap.

use super::{def_inst, Combiner, Rewrite};
use sable_ir::{InstId, InstKind};

/// Load rewrites.
///
/// `load(upcast x)` becomes `upcast(load x)`, exposing the underlying
/// object to further rewrites. A load whose only consumers are field or
/// element extractions becomes one `element_addr + load` per *distinct*
/// field (sorted and deduplicated), which exposes per-field optimization
/// and feeds the later promotion to registers.
pub(super) fn visit_load(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let addr = cx.func.inst(inst).operand(0);
    let result = cx.func.single_result(inst);
    let result_ty = cx.func.value_type(result);

    // (load (upcast %x)) -> (upcast (load %x))
    if let Some(def) = def_inst(&cx.func, addr) {
        if cx.func.inst(def).kind == InstKind::Upcast {
            let source = cx.func.inst(def).operand(0);
            let mut b = cx.builder_before(inst);
            let new_load = b.load(source);
            let loaded = b.func().single_result(new_load);
            let new = b.upcast(loaded, result_ty);
            let created = b.take_created();
            cx.queue(created);
            return Rewrite::Replaced(new);
        }
    }

    // Canonicalize a fully-projected load into per-field loads. Every user
    // must be a field or element extraction.
    #[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
    enum ProjKind {
        Field(usize),
        Elem(usize),
    }
    let mut projections: Vec<(ProjKind, InstId)> = Vec::new();
    for user in cx.func.users_of(result) {
        match cx.func.inst(user).kind {
            InstKind::StructExtract { field } => projections.push((ProjKind::Field(field), user)),
            InstKind::TupleExtract { index } => projections.push((ProjKind::Elem(index), user)),
            _ => return Rewrite::NoChange,
        }
    }

    // A load nobody reads is simply erased.
    if projections.is_empty() {
        cx.erase_from_function(inst);
        return Rewrite::Erased;
    }

    projections.sort();

    let mut last: Option<(ProjKind, sable_ir::ValueId)> = None;
    for (proj, user) in projections {
        // Same field as the previous projection: reuse its load.
        if let Some((last_proj, last_loaded)) = last {
            if last_proj == proj {
                cx.replace_inst_uses_with(user, last_loaded);
                cx.erase_from_function(user);
                continue;
            }
        }
        let field_ty = cx.func.value_type(cx.func.single_result(user));
        let mut b = cx.builder_before(inst);
        let addr_ty = b.types().address_of(field_ty);
        let elem_addr = match proj {
            ProjKind::Field(i) => b.struct_element_addr(addr, i, addr_ty),
            ProjKind::Elem(i) => b.tuple_element_addr(addr, i, addr_ty),
        };
        let elem_addr_val = b.func().single_result(elem_addr);
        let new_load = b.load(elem_addr_val);
        let loaded = b.func().single_result(new_load);
        let created = b.take_created();
        cx.queue(created);
        cx.replace_inst_uses_with(user, loaded);
        cx.erase_from_function(user);
        last = Some((proj, loaded));
    }

    cx.erase_from_function(inst);
    Rewrite::Erased
}

/// Materialize the "initialize payload in place, then tag the storage"
/// idiom into a single `enum` + `store`.
///
/// ```text
/// %a = init_enum_data_addr %alloc, #case      %e = enum #case, %payload
/// store %payload to %a                   →    store %e to %alloc
/// inject_enum_addr %alloc, #case
/// ```
///
/// The no-payload form needs no preceding store and becomes `enum` +
/// `store` directly. Cleanup of the now-dead scratch allocation is left to
/// a later dead-store/dead-alloc pass.
pub(super) fn visit_inject_enum_addr(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let InstKind::InjectEnumAddr { case } = cx.func.inst(inst).kind else {
        unreachable!("dispatched on kind");
    };
    let addr = cx.func.inst(inst).operand(0);
    let addr_ty = cx.func.value_type(addr);
    let enum_ty = cx
        .types()
        .pointee(addr_ty)
        .expect("inject_enum_addr operand must be an address");
    if !cx.types().is_loadable(enum_ty) {
        return Rewrite::NoChange;
    }

    if cx.types().case_payload(enum_ty, case).is_none() {
        let mut b = cx.builder_before(inst);
        let e = b.enum_value(enum_ty, case, None);
        let ev = b.func().single_result(e);
        b.store(ev, addr);
        let created = b.take_created();
        cx.queue(created);
        cx.erase_from_function(inst);
        return Rewrite::Erased;
    }

    // Payload case: require the store of the payload to sit immediately
    // before us, through an init_enum_data_addr of the same allocation with
    // no other user. The adjacency requirement avoids reasoning about
    // intervening writes.
    let Some(store) = cx.func.prev_inst(inst) else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(store).kind != InstKind::Store {
        return Rewrite::NoChange;
    }
    let payload = cx.func.inst(store).operand(0);
    let dest = cx.func.inst(store).operand(1);
    let Some(init) = def_inst(&cx.func, dest) else {
        return Rewrite::NoChange;
    };
    let InstKind::InitEnumDataAddr { case: init_case } = cx.func.inst(init).kind else {
        return Rewrite::NoChange;
    };
    if cx.func.inst(init).operand(0) != addr || !cx.func.value(dest).has_one_use() {
        return Rewrite::NoChange;
    }

    let mut b = cx.builder_before(inst);
    let e = b.enum_value(enum_ty, init_case, Some(payload));
    let ev = b.func().single_result(e);
    b.store(ev, addr);
    let created = b.take_created();
    cx.queue(created);
    cx.erase_from_function(store);
    cx.erase_from_function(init);
    cx.erase_from_function(inst);
    Rewrite::Erased
}

/// `load(unchecked_take_enum_data_addr x)` → `unchecked_enum_data(load x)`
/// when every user of the projection is a load.
pub(super) fn visit_unchecked_take_enum_data_addr(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let InstKind::UncheckedTakeEnumDataAddr { case } = cx.func.inst(inst).kind else {
        unreachable!("dispatched on kind");
    };
    let result = cx.func.single_result(inst);
    if cx.func.value(result).use_empty() {
        return Rewrite::NoChange;
    }

    let enum_addr = cx.func.inst(inst).operand(0);
    let enum_ty = cx
        .types()
        .pointee(cx.func.value_type(enum_addr))
        .expect("unchecked_take_enum_data_addr operand must be an address");
    // An address-only enum may still have a loadable payload; the whole
    // enum load below requires the enum itself to be loadable.
    if !cx.types().is_loadable(enum_ty) {
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
        let payload_ty = cx.func.value_type(cx.func.single_result(load));
        let mut b = cx.builder_before(load);
        let whole = b.load(enum_addr);
        let whole_val = b.func().single_result(whole);
        let data = b.unchecked_enum_data(whole_val, case, payload_ty);
        let data_val = b.func().single_result(data);
        let created = b.take_created();
        cx.queue(created);
        cx.replace_inst_uses_with(load, data_val);
        cx.erase_from_function(load);
    }
    cx.erase_from_function(inst);
    Rewrite::Erased
}

// ── Tests ────────────────────────────────────────────────────────────────────
