//! In-memory model of decoded export data.
//!
//! A [`Namespace`] owns every [`Unit`] known to a session together with the
//! [`TypeArena`] their members point into. The namespace is created and kept
//! by the caller; the decoder only mutates it. It carries no locking: at most
//! one decode may run against a given namespace at a time, which `&mut`
//! borrows already enforce within a thread.

mod constant;
mod position;
mod types;

pub use constant::{ConstValue, Integer, Rational};
pub use position::{DisplayPosition, FileId, Position, PositionTable};
pub use types::{
    BasicKind, ChanDir, Field, InterfaceMethod, Method, NamedType, Param, Signature, TypeArena,
    TypeId, TypeKind,
};

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Returns true if `name` is visible outside its unit (starts with an upper-case letter)
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// What a member is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    /// `const Name T = value`
    Const {
        /// Declared (possibly untyped) type
        ty: TypeId,
        /// Exact value
        value: ConstValue,
    },
    /// `func Name(...)`
    Func {
        /// Signature type
        sig: TypeId,
    },
    /// `type Name ...`
    TypeName {
        /// The named type node
        ty: TypeId,
    },
    /// `type Name = T`
    Alias {
        /// Aliased type
        target: TypeId,
    },
    /// `var Name T`
    Var {
        /// Variable type
        ty: TypeId,
    },
}

/// A named entity of a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    name: String,
    kind: MemberKind,
    pos: Option<Position>,
}

impl Member {
    /// Creates a member without a position
    pub fn new(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pos: None,
        }
    }

    /// Sets the declaration position
    pub fn with_pos(mut self, pos: Position) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Member name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member kind
    pub fn kind(&self) -> &MemberKind {
        &self.kind
    }

    /// Declaration position, if recorded
    pub fn pos(&self) -> Option<Position> {
        self.pos
    }

    /// Returns true if the member is visible outside its unit
    pub fn is_exported(&self) -> bool {
        is_exported(&self.name)
    }

    /// The type the member is declared with
    pub fn ty(&self) -> TypeId {
        match &self.kind {
            MemberKind::Const { ty, .. } | MemberKind::TypeName { ty } | MemberKind::Var { ty } => {
                *ty
            }
            MemberKind::Func { sig } => *sig,
            MemberKind::Alias { target } => *target,
        }
    }
}

/// A compiled program unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    path: String,
    name: String,
    complete: bool,
    imports: Vec<String>,
    members: BTreeMap<String, Member>,
}

impl Unit {
    fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            complete: false,
            imports: Vec::new(),
            members: BTreeMap::new(),
        }
    }

    /// Import path, the namespace key
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared unit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once every member has been populated
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Import paths of the units this unit's export data references
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// Members ordered by name
    pub fn members(&self) -> impl Iterator<Item = &Member> + '_ {
        self.members.values()
    }

    /// Looks up a member by name
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the unit has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Caller-owned map from import path to [`Unit`], plus the shared type arena
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    units: HashMap<String, Unit>,
    types: TypeArena,
}

impl Namespace {
    /// Creates an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the unit stored under `path`
    pub fn unit(&self, path: &str) -> Option<&Unit> {
        self.units.get(path)
    }

    /// Returns true if a unit (complete or not) exists under `path`
    pub fn contains(&self, path: &str) -> bool {
        self.units.contains_key(path)
    }

    /// All units, sorted by import path
    pub fn units(&self) -> Vec<&Unit> {
        let mut units: Vec<_> = self.units.values().collect();
        units.sort_by(|a, b| a.path.cmp(&b.path));
        units
    }

    /// Removes a unit, e.g. to discard one left incomplete by a failed decode
    pub fn remove(&mut self, path: &str) -> Option<Unit> {
        self.units.remove(path)
    }

    /// The type arena
    pub fn types(&self) -> &TypeArena {
        &self.types
    }

    /// The type arena, for building graphs to encode
    pub fn types_mut(&mut self) -> &mut TypeArena {
        &mut self.types
    }

    /// Shorthand for the id of a predeclared type
    pub fn basic(&self, kind: BasicKind) -> TypeId {
        self.types.basic(kind)
    }

    /// Ensures a unit exists under `path` and returns it.
    ///
    /// An existing unit keeps its state. It is an error if it was declared
    /// with a different name.
    pub fn declare_unit(&mut self, path: &str, name: &str) -> Result<&Unit> {
        let unit = self
            .units
            .entry(path.to_string())
            .or_insert_with(|| Unit::new(path, name));
        if unit.name.is_empty() {
            unit.name = name.to_string();
        } else if !name.is_empty() && unit.name != name {
            return Err(Error::consistency(
                path,
                format!("unit is named '{}', export data says '{}'", unit.name, name),
            ));
        }
        Ok(unit)
    }

    /// Adds a member to an incomplete unit
    pub fn insert_member(&mut self, path: &str, member: Member) -> Result<()> {
        let unit = self.incomplete_unit_mut(path)?;
        if unit.members.contains_key(member.name()) {
            return Err(Error::consistency(
                path,
                format!("member '{}' is already declared", member.name()),
            ));
        }
        unit.members.insert(member.name.clone(), member);
        Ok(())
    }

    /// Declares a new named type in an incomplete unit.
    ///
    /// The returned type is a placeholder until [`Namespace::define_named`]
    /// sets its underlying type, so it can already be referenced by the types
    /// that make up its own definition.
    pub fn declare_named(&mut self, path: &str, name: &str, pos: Option<Position>) -> Result<TypeId> {
        let unit = self
            .units
            .get_mut(path)
            .ok_or_else(|| Error::consistency(path, "unit has not been declared"))?;
        if unit.complete {
            return Err(Error::consistency(path, "unit is complete and immutable"));
        }
        if unit.members.contains_key(name) {
            return Err(Error::consistency(
                path,
                format!("member '{name}' is already declared"),
            ));
        }
        let ty = self
            .types
            .alloc(TypeKind::Named(NamedType::placeholder(path, name)));
        let mut member = Member::new(name, MemberKind::TypeName { ty });
        member.pos = pos;
        unit.members.insert(name.to_string(), member);
        Ok(ty)
    }

    /// Sets the underlying type and methods of a placeholder named type
    pub fn define_named(&mut self, named: TypeId, underlying: TypeId, methods: Vec<Method>) -> Result<()> {
        let unit_path = match self.types.named(named) {
            Some(n) => n.unit.clone(),
            None => {
                return Err(Error::internal(format!(
                    "type {} is not a named type",
                    named.index()
                )))
            }
        };
        if self.units.get(&unit_path).is_some_and(|u| u.complete) {
            return Err(Error::consistency(unit_path, "unit is complete and immutable"));
        }
        if let Some(TypeKind::Named(n)) = self.types.get_mut(named) {
            n.underlying = Some(underlying);
            n.methods = methods;
        }
        Ok(())
    }

    /// Records the units `path` depends on
    pub fn set_imports(&mut self, path: &str, imports: Vec<String>) -> Result<()> {
        self.incomplete_unit_mut(path)?.imports = imports;
        Ok(())
    }

    /// Marks a unit complete; it is immutable from then on
    pub fn mark_complete(&mut self, path: &str) -> Result<()> {
        let unit = self
            .units
            .get_mut(path)
            .ok_or_else(|| Error::consistency(path, "unit has not been declared"))?;
        unit.complete = true;
        Ok(())
    }

    /// Resolves a named type by unit and name, declaring a placeholder if the
    /// unit is still incomplete and does not know it yet.
    pub(crate) fn resolve_named(
        &mut self,
        path: &str,
        name: &str,
        pos: Option<Position>,
    ) -> Result<TypeId> {
        let unit = self
            .units
            .get(path)
            .ok_or_else(|| Error::consistency(path, "unit has not been declared"))?;
        match unit.members.get(name).map(Member::kind) {
            Some(MemberKind::TypeName { ty }) => Ok(*ty),
            Some(_) => Err(Error::consistency(
                path,
                format!("'{name}' is declared but is not a type"),
            )),
            None if unit.complete => Err(Error::consistency(
                path,
                format!("complete unit does not declare type '{name}'"),
            )),
            None => self.declare_named(path, name, pos),
        }
    }

    /// Inserts or replaces a non-type member of an incomplete unit
    pub(crate) fn put_member(&mut self, path: &str, member: Member) -> Result<()> {
        let unit = self.incomplete_unit_mut(path)?;
        unit.members.insert(member.name.clone(), member);
        Ok(())
    }

    /// Drops the imports and non-type members of an incomplete unit.
    ///
    /// Type names stay: other units may already hold their identity.
    pub(crate) fn clear_values(&mut self, path: &str) -> Result<()> {
        let unit = self.incomplete_unit_mut(path)?;
        unit.imports.clear();
        unit.members
            .retain(|_, m| matches!(m.kind, MemberKind::TypeName { .. }));
        Ok(())
    }

    /// First type name of `path` whose underlying type is still unknown
    pub(crate) fn undefined_type_name(&self, path: &str) -> Option<&str> {
        let unit = self.units.get(path)?;
        unit.members.values().find_map(|m| match m.kind {
            MemberKind::TypeName { ty }
                if self.types.named(ty).is_some_and(NamedType::is_placeholder) =>
            {
                Some(m.name.as_str())
            }
            _ => None,
        })
    }

    fn incomplete_unit_mut(&mut self, path: &str) -> Result<&mut Unit> {
        let unit = self
            .units
            .get_mut(path)
            .ok_or_else(|| Error::consistency(path, "unit has not been declared"))?;
        if unit.complete {
            return Err(Error::consistency(path, "unit is complete and immutable"));
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exported() {
        assert!(is_exported("Add"));
        assert!(is_exported("Ärger"));
        assert!(!is_exported("add"));
        assert!(!is_exported("_X"));
        assert!(!is_exported(""));
    }

    #[test]
    fn test_declare_unit_name_mismatch() {
        let mut ns = Namespace::new();
        ns.declare_unit("a/b", "b").unwrap();
        assert!(ns.declare_unit("a/b", "b").is_ok());
        assert!(ns.declare_unit("a/b", "").is_ok());
        let err = ns.declare_unit("a/b", "c").unwrap_err();
        assert!(matches!(err, Error::Consistency { .. }));
    }

    #[test]
    fn test_complete_unit_is_immutable() {
        let mut ns = Namespace::new();
        ns.declare_unit("p", "p").unwrap();
        let int = ns.basic(BasicKind::Int);
        ns.insert_member("p", Member::new("V", MemberKind::Var { ty: int }))
            .unwrap();
        ns.mark_complete("p").unwrap();

        assert!(ns
            .insert_member("p", Member::new("W", MemberKind::Var { ty: int }))
            .is_err());
        assert!(ns.declare_named("p", "T", None).is_err());
        assert!(ns.resolve_named("p", "T", None).is_err());
        assert!(ns.resolve_named("p", "V", None).is_err());
    }

    #[test]
    fn test_resolve_named_shares_identity() {
        let mut ns = Namespace::new();
        ns.declare_unit("p", "p").unwrap();
        let a = ns.resolve_named("p", "T", None).unwrap();
        let b = ns.resolve_named("p", "T", None).unwrap();
        assert_eq!(a, b);
        assert!(ns.types().named(a).unwrap().is_placeholder());

        let int = ns.basic(BasicKind::Int);
        ns.define_named(a, int, Vec::new()).unwrap();
        assert_eq!(ns.types().named(a).unwrap().underlying, Some(int));

        ns.mark_complete("p").unwrap();
        assert_eq!(ns.resolve_named("p", "T", None).unwrap(), a);
        assert!(ns.define_named(a, int, Vec::new()).is_err());
    }
}
