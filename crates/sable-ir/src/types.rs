//! IR type system.
//!
//! Types are interned in a [`TypeTable`] and referenced by [`TypeId`]. The
//! table owns every structural query the optimizer needs: triviality (does a
//! value of this type own any runtime resources?), reference semantics,
//! archetype (unresolved generic parameter) detection, and the layout
//! queries used by the bitcast-fusion rewrites.

use std::collections::HashMap;
use std::fmt;

/// Unique identifier for an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ty{}", self.0)
    }
}

/// Representation of a metatype value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetatypeRepr {
    /// No runtime representation; the type is statically known.
    Thin,
    /// Carried at runtime; may require instantiation.
    Thick,
}

/// One case of an enum type, with an optional payload type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumCase {
    pub name: String,
    pub payload: Option<TypeId>,
}

/// Structural description of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Fixed-width integer. `bits == 1` doubles as the boolean type.
    Int { bits: u8 },
    /// Untyped pointer (string literal storage, bridged pointers).
    RawPointer,
    /// Heap reference with class identity and an optional superclass.
    Ref {
        name: String,
        superclass: Option<TypeId>,
    },
    /// Nominal struct with named, ordered stored fields.
    Struct {
        name: String,
        fields: Vec<(String, TypeId)>,
    },
    /// Nominal enum (tagged union).
    Enum { name: String, cases: Vec<EnumCase> },
    /// Anonymous product of element types.
    Tuple { elems: Vec<TypeId> },
    /// Function value. Thick functions carry a retained context.
    Function { thick: bool },
    /// Metatype of `instance`.
    Metatype {
        instance: TypeId,
        repr: MetatypeRepr,
    },
    /// Address of a value of the pointee type (`$*T`).
    Address { pointee: TypeId },
    /// Unresolved generic parameter (archetype).
    Generic { name: String },
}

/// Interning table for types.
///
/// Structurally identical types always share one `TypeId`, so type equality
/// is id equality everywhere in the optimizer.
#[derive(Debug, Default)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    interned: HashMap<TypeKind, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning the existing id for structurally identical
    /// types.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.0 as usize]
    }

    // ── Common constructors ──────────────────────────────────────────────

    pub fn int(&mut self, bits: u8) -> TypeId {
        self.intern(TypeKind::Int { bits })
    }

    /// The 1-bit integer used for booleans and overflow flags.
    pub fn int1(&mut self) -> TypeId {
        self.int(1)
    }

    pub fn raw_pointer(&mut self) -> TypeId {
        self.intern(TypeKind::RawPointer)
    }

    pub fn address_of(&mut self, pointee: TypeId) -> TypeId {
        self.intern(TypeKind::Address { pointee })
    }

    pub fn tuple(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Tuple { elems })
    }

    /// The empty tuple, used as the result type of functions that return
    /// nothing interesting.
    pub fn unit(&mut self) -> TypeId {
        self.tuple(Vec::new())
    }

    pub fn thin_function(&mut self) -> TypeId {
        self.intern(TypeKind::Function { thick: false })
    }

    pub fn thick_function(&mut self) -> TypeId {
        self.intern(TypeKind::Function { thick: true })
    }

    pub fn metatype(&mut self, instance: TypeId, repr: MetatypeRepr) -> TypeId {
        self.intern(TypeKind::Metatype { instance, repr })
    }

    // ── Structural queries ───────────────────────────────────────────────

    /// Whether this is an address type, and if so of what.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Address { pointee } => Some(*pointee),
            _ => None,
        }
    }

    pub fn is_address(&self, id: TypeId) -> bool {
        self.pointee(id).is_some()
    }

    /// A trivial type owns no runtime resources: destroying or copying a
    /// value of the type is a no-op at runtime.
    pub fn is_trivial(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TypeKind::Int { .. } | TypeKind::RawPointer | TypeKind::Metatype { .. } => true,
            TypeKind::Address { .. } => true,
            TypeKind::Function { thick } => !thick,
            TypeKind::Ref { .. } | TypeKind::Generic { .. } => false,
            TypeKind::Struct { fields, .. } => {
                fields.iter().all(|(_, ty)| self.is_trivial(*ty))
            }
            TypeKind::Enum { cases, .. } => cases
                .iter()
                .all(|c| c.payload.map_or(true, |p| self.is_trivial(p))),
            TypeKind::Tuple { elems } => elems.iter().all(|e| self.is_trivial(*e)),
        }
    }

    /// Whether a value of this type is itself a single retained reference.
    pub fn has_reference_semantics(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Ref { .. } | TypeKind::Function { thick: true }
        )
    }

    /// Whether the type mentions any unresolved generic parameter.
    pub fn has_archetype(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TypeKind::Generic { .. } => true,
            TypeKind::Int { .. }
            | TypeKind::RawPointer
            | TypeKind::Ref { .. }
            | TypeKind::Function { .. } => false,
            TypeKind::Struct { fields, .. } => {
                fields.iter().any(|(_, ty)| self.has_archetype(*ty))
            }
            TypeKind::Enum { cases, .. } => cases
                .iter()
                .any(|c| c.payload.is_some_and(|p| self.has_archetype(p))),
            TypeKind::Tuple { elems } => elems.iter().any(|e| self.has_archetype(*e)),
            TypeKind::Metatype { instance, .. } => self.has_archetype(*instance),
            TypeKind::Address { pointee } => self.has_archetype(*pointee),
        }
    }

    /// A type is loadable when its size is statically known; anything
    /// mentioning an archetype must stay behind an address.
    pub fn is_loadable(&self, id: TypeId) -> bool {
        !self.has_archetype(id)
    }

    /// For a struct with exactly one stored field, return that field's type.
    pub fn single_stored_field(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Struct { fields, .. } if fields.len() == 1 => Some(fields[0].1),
            _ => None,
        }
    }

    /// Field type of a struct by index.
    pub fn struct_field(&self, id: TypeId, field: usize) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Struct { fields, .. } => fields.get(field).map(|(_, ty)| *ty),
            _ => None,
        }
    }

    /// Element type of a tuple by index.
    pub fn tuple_elem(&self, id: TypeId, index: usize) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Tuple { elems } => elems.get(index).copied(),
            _ => None,
        }
    }

    /// Index of the first enum case that carries a payload.
    pub fn first_payloaded_case(&self, id: TypeId) -> Option<usize> {
        match self.kind(id) {
            TypeKind::Enum { cases, .. } => cases.iter().position(|c| c.payload.is_some()),
            _ => None,
        }
    }

    /// Payload type of an enum case, if any.
    pub fn case_payload(&self, id: TypeId, case: usize) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Enum { cases, .. } => cases.get(case).and_then(|c| c.payload),
            _ => None,
        }
    }

    /// Whether `ancestor` appears on `descendant`'s superclass chain
    /// (a class is not its own superclass).
    pub fn is_superclass_of(&self, ancestor: TypeId, descendant: TypeId) -> bool {
        let mut cur = match self.kind(descendant) {
            TypeKind::Ref { superclass, .. } => *superclass,
            _ => None,
        };
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = match self.kind(id) {
                TypeKind::Ref { superclass, .. } => *superclass,
                _ => None,
            };
        }
        false
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
