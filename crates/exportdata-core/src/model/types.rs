//! The type graph.
//!
//! Types live in a [`TypeArena`] and refer to each other by [`TypeId`]. A
//! reference is valid as soon as the slot is allocated, before the referent
//! is filled in, which is how mutually recursive named types are expressed.
//!
//! The first [`BasicKind::ALL`]`.len()` slots of every arena hold the
//! predeclared types in a fixed order, so `TypeId`s of predeclared types are
//! the same in every namespace.

use super::position::Position;

/// Index of a type node in a [`TypeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Returns the arena index of this type
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Predeclared types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,
    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedComplex,
    UntypedString,
    UntypedNil,
    Error,
}

impl BasicKind {
    /// All predeclared types, in wire order
    pub const ALL: [BasicKind; 26] = [
        BasicKind::Bool,
        BasicKind::Int,
        BasicKind::Int8,
        BasicKind::Int16,
        BasicKind::Int32,
        BasicKind::Int64,
        BasicKind::Uint,
        BasicKind::Uint8,
        BasicKind::Uint16,
        BasicKind::Uint32,
        BasicKind::Uint64,
        BasicKind::Uintptr,
        BasicKind::Float32,
        BasicKind::Float64,
        BasicKind::Complex64,
        BasicKind::Complex128,
        BasicKind::String,
        BasicKind::UnsafePointer,
        BasicKind::UntypedBool,
        BasicKind::UntypedInt,
        BasicKind::UntypedRune,
        BasicKind::UntypedFloat,
        BasicKind::UntypedComplex,
        BasicKind::UntypedString,
        BasicKind::UntypedNil,
        BasicKind::Error,
    ];

    /// Source spelling of the type
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::UnsafePointer => "unsafe.Pointer",
            BasicKind::UntypedBool => "untyped bool",
            BasicKind::UntypedInt => "untyped int",
            BasicKind::UntypedRune => "untyped rune",
            BasicKind::UntypedFloat => "untyped float",
            BasicKind::UntypedComplex => "untyped complex",
            BasicKind::UntypedString => "untyped string",
            BasicKind::UntypedNil => "untyped nil",
            BasicKind::Error => "error",
        }
    }

    /// Position of this kind in [`BasicKind::ALL`]
    pub fn wire_index(self) -> usize {
        self as usize
    }
}

/// Channel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    /// `chan T`
    Both,
    /// `chan<- T`
    Send,
    /// `<-chan T`
    Recv,
}

impl ChanDir {
    /// Wire byte of this direction
    pub fn to_byte(self) -> u8 {
        match self {
            ChanDir::Both => 0,
            ChanDir::Send => 1,
            ChanDir::Recv => 2,
        }
    }

    /// Parses a wire byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ChanDir::Both),
            1 => Some(ChanDir::Send),
            2 => Some(ChanDir::Recv),
            _ => None,
        }
    }
}

/// A named parameter or result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name, empty if unnamed
    pub name: String,
    /// Parameter type
    pub ty: TypeId,
}

impl Param {
    /// Creates a parameter
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    /// Parameters in order
    pub params: Vec<Param>,
    /// Results in order
    pub results: Vec<Param>,
    /// True if the last parameter is `...T` (its type is then a slice)
    pub variadic: bool,
}

/// Struct field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name (the type name for embedded fields)
    pub name: String,
    /// Field type
    pub ty: TypeId,
    /// True for embedded fields
    pub embedded: bool,
    /// Raw struct tag, empty if none
    pub tag: String,
}

impl Field {
    /// Creates a plain, untagged field
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: false,
            tag: String::new(),
        }
    }
}

/// Method of an interface type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMethod {
    /// Method name
    pub name: String,
    /// Signature type (always a [`TypeKind::Signature`])
    pub sig: TypeId,
}

/// Method declared on a named type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Method name
    pub name: String,
    /// Signature type (always a [`TypeKind::Signature`])
    pub sig: TypeId,
    /// True for `func (*T) M()` receivers
    pub pointer_receiver: bool,
    /// Declaration position
    pub pos: Option<Position>,
}

/// A named (defined) type.
///
/// `underlying` is `None` while the node is a placeholder: it has been
/// declared, so other types can point at it, but its definition has not been
/// read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedType {
    /// Import path of the unit declaring the type
    pub unit: String,
    /// Type name
    pub name: String,
    /// Underlying type once defined
    pub underlying: Option<TypeId>,
    /// Declared methods in declaration order
    pub methods: Vec<Method>,
}

impl NamedType {
    /// Creates a placeholder named type with no definition yet
    pub fn placeholder(unit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            name: name.into(),
            underlying: None,
            methods: Vec::new(),
        }
    }

    /// Returns true until the underlying type has been set
    pub fn is_placeholder(&self) -> bool {
        self.underlying.is_none()
    }
}

/// A node of the type graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Predeclared type
    Basic(BasicKind),
    /// Named type, possibly still a placeholder
    Named(NamedType),
    /// `*T`
    Pointer(TypeId),
    /// `[]T`
    Slice(TypeId),
    /// `[N]T`
    Array {
        /// Element count
        len: u64,
        /// Element type
        elem: TypeId,
    },
    /// `map[K]V`
    Map {
        /// Key type
        key: TypeId,
        /// Value type
        value: TypeId,
    },
    /// `chan T` in one of three directions
    Chan {
        /// Direction
        dir: ChanDir,
        /// Element type
        elem: TypeId,
    },
    /// Function signature
    Signature(Signature),
    /// Struct type
    Struct {
        /// Fields in declaration order
        fields: Vec<Field>,
    },
    /// Interface type
    Interface {
        /// Explicitly declared methods
        methods: Vec<InterfaceMethod>,
        /// Embedded interface types
        embedded: Vec<TypeId>,
    },
}

impl TypeKind {
    /// Returns the named type if this node is one
    pub fn as_named(&self) -> Option<&NamedType> {
        match self {
            TypeKind::Named(named) => Some(named),
            _ => None,
        }
    }

    /// Returns the signature if this node is one
    pub fn as_signature(&self) -> Option<&Signature> {
        match self {
            TypeKind::Signature(sig) => Some(sig),
            _ => None,
        }
    }
}

/// Arena holding every type node of a namespace
#[derive(Debug, Clone)]
pub struct TypeArena {
    nodes: Vec<TypeKind>,
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeArena {
    /// Creates an arena pre-populated with the predeclared types
    pub fn new() -> Self {
        Self {
            nodes: BasicKind::ALL.iter().map(|&k| TypeKind::Basic(k)).collect(),
        }
    }

    /// Number of predeclared slots at the start of every arena
    pub const fn predeclared_count() -> usize {
        BasicKind::ALL.len()
    }

    /// Returns the id of a predeclared type
    pub fn basic(&self, kind: BasicKind) -> TypeId {
        TypeId(kind.wire_index() as u32)
    }

    /// Returns the predeclared type at wire index `index`
    pub fn predeclared(&self, index: usize) -> Option<TypeId> {
        (index < Self::predeclared_count()).then_some(TypeId(index as u32))
    }

    /// Returns true if `id` is one of the predeclared slots
    pub fn is_predeclared(&self, id: TypeId) -> bool {
        id.index() < Self::predeclared_count()
    }

    /// Allocates a new node
    pub fn alloc(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(kind);
        id
    }

    /// Returns the node for `id`
    pub fn get(&self, id: TypeId) -> Option<&TypeKind> {
        self.nodes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: TypeId) -> Option<&mut TypeKind> {
        self.nodes.get_mut(id.index())
    }

    /// Returns the named type at `id`, if `id` is a named type
    pub fn named(&self, id: TypeId) -> Option<&NamedType> {
        self.get(id).and_then(TypeKind::as_named)
    }

    /// Total number of nodes including predeclared ones
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the predeclared types are always present
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocates `*elem`
    pub fn pointer(&mut self, elem: TypeId) -> TypeId {
        self.alloc(TypeKind::Pointer(elem))
    }

    /// Allocates `[]elem`
    pub fn slice(&mut self, elem: TypeId) -> TypeId {
        self.alloc(TypeKind::Slice(elem))
    }

    /// Allocates a signature
    pub fn signature(&mut self, params: Vec<Param>, results: Vec<Param>, variadic: bool) -> TypeId {
        self.alloc(TypeKind::Signature(Signature {
            params,
            results,
            variadic,
        }))
    }

    /// Allocates a struct
    pub fn struct_type(&mut self, fields: Vec<Field>) -> TypeId {
        self.alloc(TypeKind::Struct { fields })
    }

    /// Ids of all named types that are still placeholders
    pub fn placeholders(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, node)| match node {
            TypeKind::Named(named) if named.is_placeholder() => Some(TypeId(i as u32)),
            _ => None,
        })
    }
}
