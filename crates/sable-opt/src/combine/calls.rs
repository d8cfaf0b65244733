//! Call-site rewrites: closure fusion, dead effect-free call elimination,
//! string-literal concatenation folding, and function-value unwrapping.

use super::{as_function_ref, as_int_literal, def_inst, Combiner, Rewrite};
use log::debug;
use sable_ir::{EffectsKind, FuncId, Function, InstId, InstKind, StrEncoding, ValueId};

// ── apply ────────────────────────────────────────────────────────────────────

pub(super) fn visit_apply(cx: &mut Combiner, inst: InstId) -> Rewrite {
    let callee_value = cx.func.inst(inst).operand(0);

    // apply(partial_apply(x..))(y..) → apply(y.., x..)
    if let Some(pa) = def_inst(&cx.func, callee_value) {
        if cx.func.inst(pa).kind == InstKind::PartialApply {
            return fuse_partial_apply(cx, inst, pa);
        }
    }

    if let Some(callee) = as_function_ref(&cx.func, callee_value) {
        if cx.callee_fn(callee).effects < EffectsKind::ReadWrite {
            // A call without write effects whose entire transitive user set
            // is reference-count bookkeeping does nothing observable.
            if let Some(rewrite) = erase_dead_readonly_apply(cx, inst, callee) {
                return rewrite;
            }
            if let Some(rewrite) = fold_string_concat(cx, inst, callee) {
                return rewrite;
            }
        }
    }

    // apply(thin_to_thick_function f)(..) → apply f(..)
    if let Some(ttf) = def_inst(&cx.func, callee_value) {
        if cx.func.inst(ttf).kind == InstKind::ThinToThickFunction {
            let thin = cx.func.inst(ttf).operand(0);
            let args: Vec<ValueId> = cx.func.inst(inst).operands()[1..].to_vec();
            let result_ty = cx.func.value_type(cx.func.single_result(inst));
            let mut b = cx.builder_before(inst);
            let new = b.apply(thin, &args, result_ty);
            let created = b.take_created();
            cx.queue(created);
            return Rewrite::Replaced(new);
        }
    }

    Rewrite::NoChange
}

/// Fuse a closure-capture call into its sole consuming call:
/// the fused direct call takes the apply's arguments followed by the
/// captured ones. Captured arguments whose convention consumes them are
/// retained (this call transfers an ownership the capture site never
/// supplied), and the closure value itself is released since the original
/// apply consumed it.
fn fuse_partial_apply(cx: &mut Combiner, inst: InstId, pa: InstId) -> Rewrite {
    let pa_callee_value = cx.func.inst(pa).operand(0);
    let Some(callee) = as_function_ref(&cx.func, pa_callee_value) else {
        return Rewrite::NoChange;
    };

    let apply_args: Vec<ValueId> = cx.func.inst(inst).operands()[1..].to_vec();
    let captured: Vec<ValueId> = cx.func.inst(pa).operands()[1..].to_vec();
    let params = cx.callee_fn(callee).param_conventions.clone();
    debug_assert!(
        captured.len() <= params.len(),
        "more captured arguments than the callee has parameters"
    );
    let delta = params.len() - captured.len();

    let pa_result = cx.func.single_result(pa);
    let result_ty = cx.func.value_type(cx.func.single_result(inst));
    let mut args = apply_args;
    args.extend_from_slice(&captured);

    let mut b = cx.builder_before(inst);
    for (i, &arg) in captured.iter().enumerate() {
        let convention = params[delta + i];
        if convention.is_consumed() && !convention.is_indirect() {
            b.retain_value(arg);
        }
    }
    let new = b.apply(pa_callee_value, &args, result_ty);
    // The original apply consumed the closure; compensate before it dies.
    b.strong_release(pa_result);
    let created = b.take_created();
    cx.queue(created);
    Rewrite::Replaced(new)
}

/// Collect the transitive users of `inst` that are all reference-count
/// operations or debug annotations, looking through field extractions.
/// Returns `None` when any other kind of user is found.
fn collect_rc_users(func: &Function, inst: InstId, out: &mut Vec<InstId>) -> bool {
    out.push(inst);
    if let Some(result) = func.inst(inst).result() {
        for user in func.users_of(result) {
            match func.inst(user).kind {
                InstKind::RetainValue
                | InstKind::ReleaseValue
                | InstKind::StrongRetain
                | InstKind::StrongRelease
                | InstKind::DebugValue => out.push(user),
                InstKind::StructExtract { .. } => {
                    if !collect_rc_users(func, user, out) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
    true
}

/// Delete a call to a function free of write effects when nothing real
/// consumes its result, releasing any argument the callee's signature
/// consumes so the deletion does not leak that ownership.
fn erase_dead_readonly_apply(
    cx: &mut Combiner,
    inst: InstId,
    callee: FuncId,
) -> Option<Rewrite> {
    let mut users = Vec::new();
    if !collect_rc_users(&cx.func, inst, &mut users) {
        return None;
    }

    let args: Vec<ValueId> = cx.func.inst(inst).operands()[1..].to_vec();
    let params = cx.callee_fn(callee).param_conventions.clone();
    debug_assert_eq!(
        args.len(),
        params.len(),
        "call argument count does not match the callee signature"
    );

    let mut b = cx.builder_before(inst);
    for (&arg, convention) in args.iter().zip(&params) {
        if convention.is_consumed() && !convention.is_indirect() {
            b.release_value(arg);
        }
    }
    let created = b.take_created();
    cx.queue(created);

    debug!(
        "combine: erasing dead read-only call to {} and {} dependent refcount ops",
        cx.callee_fn(callee).name,
        users.len() - 1
    );
    for &user in users.iter().rev() {
        cx.erase_from_function(user);
    }
    Some(Rewrite::Erased)
}

// ── String-literal concatenation ─────────────────────────────────────────────

/// One operand of a concatenation: the literal-construction call and the
/// pieces of it the fold reuses.
struct ConcatOperand {
    callee_value: ValueId,
    bytes: Vec<u8>,
    encoding: StrEncoding,
    units: usize,
    literal_ty: sable_ir::TypeId,
    len_operand: ValueId,
    ascii_operand: Option<ValueId>,
    metatype_operand: ValueId,
}

fn extract_concat_operand(cx: &Combiner, value: ValueId) -> Option<ConcatOperand> {
    let apply = def_inst(&cx.func, value)?;
    if cx.func.inst(apply).kind != InstKind::Apply {
        return None;
    }
    let callee_value = cx.func.inst(apply).operand(0);
    let callee = as_function_ref(&cx.func, callee_value)?;
    let f = cx.callee_fn(callee);
    if f.effects >= EffectsKind::ReadWrite {
        return None;
    }

    // make_utf8(literal, byte_count, is_ascii, type)
    // make_utf16(literal, unit_count, type)
    let num_args = cx.func.inst(apply).num_operands() - 1;
    let (len_operand, ascii_operand, metatype_operand) = match f.semantics.as_deref() {
        Some("string.makeUTF8") if num_args == 4 => (
            cx.func.inst(apply).operand(2),
            Some(cx.func.inst(apply).operand(3)),
            cx.func.inst(apply).operand(4),
        ),
        Some("string.makeUTF16") if num_args == 3 => (
            cx.func.inst(apply).operand(2),
            None,
            cx.func.inst(apply).operand(3),
        ),
        _ => return None,
    };

    let lit = def_inst(&cx.func, cx.func.inst(apply).operand(1))?;
    let InstKind::StringLiteral { literal, encoding } = cx.func.inst(lit).kind else {
        return None;
    };
    let bytes = cx.literal_bytes(literal).to_vec();
    let units = match encoding {
        StrEncoding::Utf8 => bytes.len(),
        StrEncoding::Utf16 => bytes.len() / 2,
    };
    debug_assert_eq!(
        as_int_literal(&cx.func, len_operand),
        Some(units as i64),
        "reported string length disagrees with the literal's content"
    );

    Some(ConcatOperand {
        callee_value,
        bytes,
        encoding,
        units,
        literal_ty: cx.func.value_type(cx.func.inst(apply).operand(1)),
        len_operand,
        ascii_operand,
        metatype_operand,
    })
}

/// Re-encode a UTF-8 payload as little-endian UTF-16 code units.
fn promote_to_utf16(bytes: &[u8]) -> Option<Vec<u8>> {
    let s = std::str::from_utf8(bytes).ok()?;
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Some(out)
}

/// Fold a concatenation of two statically-known literals into one literal
/// at the matching encoding, with length and ASCII flags recomputed from
/// the concatenated content.
fn fold_string_concat(cx: &mut Combiner, inst: InstId, callee: FuncId) -> Option<Rewrite> {
    if cx.callee_fn(callee).semantics.as_deref() != Some("string.concat") {
        return None;
    }
    if cx.func.inst(inst).num_operands() != 3 {
        return None;
    }

    let mut left = extract_concat_operand(cx, cx.func.inst(inst).operand(1))?;
    let mut right = extract_concat_operand(cx, cx.func.inst(inst).operand(2))?;

    // Mixed encodings: promote the UTF-8 side to UTF-16 first, and build
    // the result with the UTF-16 side's construction function.
    let (convert, encoding) = match (left.encoding, right.encoding) {
        (l, r) if l == r => (&left, l),
        (StrEncoding::Utf8, StrEncoding::Utf16) => {
            left.bytes = promote_to_utf16(&left.bytes)?;
            left.encoding = StrEncoding::Utf16;
            left.units = left.bytes.len() / 2;
            (&right, StrEncoding::Utf16)
        }
        (StrEncoding::Utf16, StrEncoding::Utf8) => {
            right.bytes = promote_to_utf16(&right.bytes)?;
            right.encoding = StrEncoding::Utf16;
            right.units = right.bytes.len() / 2;
            (&left, StrEncoding::Utf16)
        }
        _ => unreachable!("equal encodings handled above"),
    };

    let mut bytes = left.bytes.clone();
    bytes.extend_from_slice(&right.bytes);
    let units = left.units + right.units;
    // Recomputed from the concatenated content, not copied from the
    // operands' flags.
    let is_ascii = bytes.iter().all(|&b| b < 0x80);

    let callee_value = convert.callee_value;
    let len_ty = cx.func.value_type(convert.len_operand);
    let metatype_operand = convert.metatype_operand;
    let ascii_ty = convert
        .ascii_operand
        .map(|a| cx.func.value_type(a));
    let lit_ty = convert.literal_ty;
    let result_ty = cx.func.value_type(cx.func.single_result(inst));

    let mut b = cx.builder_before(inst);
    let new_lit = b.string_literal(lit_ty, &bytes, encoding);
    let new_lit_val = b.func().single_result(new_lit);
    let new_len = b.int_literal(len_ty, units as i64);
    let new_len_val = b.func().single_result(new_len);
    let mut args = vec![new_lit_val, new_len_val];
    if encoding == StrEncoding::Utf8 {
        let ascii_ty = ascii_ty.expect("make_utf8 carries an ascii flag");
        let flag = b.int_literal(ascii_ty, is_ascii as i64);
        args.push(b.func().single_result(flag));
    }
    args.push(metatype_operand);
    let new = b.apply(callee_value, &args, result_ty);
    let created = b.take_created();
    cx.queue(created);
    Some(Rewrite::Replaced(new))
}

// ── partial_apply ────────────────────────────────────────────────────────────

pub(super) fn visit_partial_apply(cx: &mut Combiner, inst: InstId) -> Rewrite {
    // A capture of nothing is just a representation change.
    if cx.func.inst(inst).num_operands() == 1 {
        let callee_value = cx.func.inst(inst).operand(0);
        let mut b = cx.builder_before(inst);
        let new = b.thin_to_thick_function(callee_value);
        let created = b.take_created();
        cx.queue(created);
        return Rewrite::Replaced(new);
    }

    // Dead closure: the only user is the release that ends its lifetime.
    // Destroy the captures the closure owned, then delete both.
    let result = cx.func.single_result(inst);
    if !cx.func.value(result).has_one_use() {
        return Rewrite::NoChange;
    }
    let release = cx.func.users_of(result)[0];
    if cx.func.inst(release).kind != InstKind::StrongRelease {
        return Rewrite::NoChange;
    }
    let Some(callee) = as_function_ref(&cx.func, cx.func.inst(inst).operand(0)) else {
        return Rewrite::NoChange;
    };

    let captured: Vec<ValueId> = cx.func.inst(inst).operands()[1..].to_vec();
    let params = cx.callee_fn(callee).param_conventions.clone();
    debug_assert!(
        captured.len() <= params.len(),
        "more captured arguments than the callee has parameters"
    );
    let delta = params.len() - captured.len();

    // The captures' lifetime ends where the closure's did.
    let mut b = cx.builder_before(release);
    for (i, &arg) in captured.iter().enumerate() {
        let convention = params[delta + i];
        if convention.is_consumed() && !convention.is_indirect() {
            b.release_value(arg);
        }
    }
    let created = b.take_created();
    cx.queue(created);
    cx.erase_from_function(release);
    cx.erase_from_function(inst);
    Rewrite::Erased
}

// ── Tests ────────────────────────────────────────────────────────────────────
