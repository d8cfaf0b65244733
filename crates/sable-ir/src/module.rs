//! Module-level containers: the function list, the debug-scope arena, and
//! the string-literal uniquing table.
//!
//! The uniquing table is a scoped service with the lifetime of the
//! optimization run. It is handed to the [`crate::builder::Builder`] by
//! reference at construction time; nothing here is process-global.

use crate::func::{FuncId, Function, FunctionSig, LiteralId, ScopeId, SourceLoc};
use crate::types::TypeTable;
use std::collections::HashMap;

// ── Debug scopes ─────────────────────────────────────────────────────────────

/// A node in the provenance tree attached to instructions and functions.
///
/// Carries no optimization semantics; the inliner rewrites it so that
/// inlined code remains attributable to its original source construct.
#[derive(Debug, Clone)]
pub struct DebugScope {
    pub loc: SourceLoc,
    pub parent: Option<ScopeId>,
    /// For scopes created by inlining: the scope of the call site the code
    /// was inlined through.
    pub inlined_call_site: Option<ScopeId>,
    /// The function this scope originally belonged to.
    pub func: FuncId,
}

// ── String-literal interner ──────────────────────────────────────────────────

/// Uniquing table for string-literal payloads.
///
/// Structurally identical payloads share one [`LiteralId`]; UTF-16 payloads
/// are stored as little-endian code units.
#[derive(Debug, Default)]
pub struct LiteralInterner {
    data: Vec<Box<[u8]>>,
    interned: HashMap<Box<[u8]>, LiteralId>,
}

impl LiteralInterner {
    pub fn intern(&mut self, bytes: &[u8]) -> LiteralId {
        if let Some(&id) = self.interned.get(bytes) {
            return id;
        }
        let id = LiteralId(self.data.len() as u32);
        let boxed: Box<[u8]> = bytes.into();
        self.data.push(boxed.clone());
        self.interned.insert(boxed, id);
        id
    }

    pub fn bytes(&self, id: LiteralId) -> &[u8] {
        &self.data[id.0 as usize]
    }
}

// ── Module ───────────────────────────────────────────────────────────────────

/// A module: the functions under optimization plus the shared tables they
/// draw on.
#[derive(Debug, Default)]
pub struct Module {
    pub types: TypeTable,
    functions: Vec<Function>,
    scopes: Vec<DebugScope>,
    literals: LiteralInterner,
    /// How many times each function has been referenced by an inlining
    /// operation; keeps the definition alive for provenance emission.
    inlined: HashMap<FuncId, u32>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a function: creates its root debug scope and an entry block
    /// with one argument per formal parameter.
    pub fn add_function(&mut self, sig: FunctionSig) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        let scope = self.create_scope(DebugScope {
            loc: SourceLoc::UNKNOWN,
            parent: None,
            inlined_call_site: None,
            func: id,
        });
        self.functions.push(Function::with_signature(sig, scope));
        id
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len() as u32).map(FuncId)
    }

    /// Temporarily move a function out of the module, leaving a placeholder.
    /// Pair with [`Module::put_function`].
    pub fn take_function(&mut self, id: FuncId) -> Function {
        std::mem::take(&mut self.functions[id.0 as usize])
    }

    pub fn put_function(&mut self, id: FuncId, f: Function) {
        self.functions[id.0 as usize] = f;
    }

    /// Split borrow for constructing a [`crate::builder::Builder`] over one
    /// function while keeping the shared tables reachable.
    pub fn builder_parts(
        &mut self,
        id: FuncId,
    ) -> (&mut Function, &mut TypeTable, &mut LiteralInterner) {
        (
            &mut self.functions[id.0 as usize],
            &mut self.types,
            &mut self.literals,
        )
    }

    /// Split borrow of just the uniquing tables, for passes that hold one
    /// function outside the module (via [`Module::take_function`]) while
    /// building into it.
    pub fn intern_tables(&mut self) -> (&mut TypeTable, &mut LiteralInterner) {
        (&mut self.types, &mut self.literals)
    }

    // ── Debug scopes ─────────────────────────────────────────────────────

    pub fn create_scope(&mut self, scope: DebugScope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn scope(&self, id: ScopeId) -> &DebugScope {
        &self.scopes[id.0 as usize]
    }

    // ── Literals ─────────────────────────────────────────────────────────

    pub fn literals(&self) -> &LiteralInterner {
        &self.literals
    }

    pub fn literals_mut(&mut self) -> &mut LiteralInterner {
        &mut self.literals
    }

    // ── Inlining reference marker ────────────────────────────────────────

    /// Mark `id` as referenced by an inlining operation so its definition
    /// is not disposed while provenance still points into it.
    pub fn mark_function_inlined(&mut self, id: FuncId) {
        *self.inlined.entry(id).or_insert(0) += 1;
    }

    pub fn inlined_ref_count(&self, id: FuncId) -> u32 {
        self.inlined.get(&id).copied().unwrap_or(0)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
