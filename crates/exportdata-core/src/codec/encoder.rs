//! Section encoder.
//!
//! Encoding runs in two passes. The first walks the unit's members (in name
//! order) and collects every named type, structural type, unit and file they
//! reach, assigning indices in first-seen order. Structural types are
//! collected post-order, so each one only refers to named declarations or to
//! structural entries written before it. The second pass writes the body,
//! interning strings as they are written, and finally prepends the tag and
//! the string table.

use super::wire::{const_kind, member_tag, type_tag, Writer};
use super::{FormatVersion, INDEXED_TAG};
use crate::error::{Error, Result};
use crate::model::{
    ConstValue, FileId, MemberKind, Namespace, Position, PositionTable, Rational, TypeId, TypeKind,
    Unit,
};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub(crate) struct Encoder<'a> {
    ns: &'a Namespace,
    unit: &'a Unit,
    positions: &'a PositionTable,
    version: FormatVersion,

    strings: Vec<&'a str>,
    string_index: HashMap<&'a str, u64>,
    files: Vec<FileId>,
    file_index: HashMap<FileId, u64>,
    /// Imported units; local unit reference = index + 1
    units: Vec<&'a str>,
    named: Vec<TypeId>,
    named_index: HashMap<TypeId, u64>,
    structural: Vec<TypeId>,
    structural_index: HashMap<TypeId, u64>,
    visiting: HashSet<TypeId>,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(
        ns: &'a Namespace,
        path: &str,
        positions: &'a PositionTable,
        version: FormatVersion,
    ) -> Result<Self> {
        let unit = ns
            .unit(path)
            .ok_or_else(|| Error::consistency(path, "unit is not in the namespace"))?;
        if !unit.is_complete() {
            return Err(Error::consistency(path, "only complete units can be encoded"));
        }
        Ok(Self {
            ns,
            unit,
            positions,
            version,
            strings: Vec::new(),
            string_index: HashMap::new(),
            files: Vec::new(),
            file_index: HashMap::new(),
            units: Vec::new(),
            named: Vec::new(),
            named_index: HashMap::new(),
            structural: Vec::new(),
            structural_index: HashMap::new(),
            visiting: HashSet::new(),
        })
    }

    pub(crate) fn run(mut self) -> Result<Bytes> {
        self.collect()?;

        let mut body = Writer::new();
        self.write_body(&mut body)?;

        let mut out = Writer::new();
        out.u8(INDEXED_TAG);
        out.uvarint(self.version.number());
        out.uvarint(self.strings.len() as u64);
        for s in &self.strings {
            out.len_prefixed(s.as_bytes());
        }
        let header = out.len();
        let body = body.freeze();
        out.bytes(&body);

        debug!(
            "encoded '{}' ({}): {} bytes ({} header + strings, {} body), {} named, {} structural types",
            self.unit.path(),
            self.version,
            out.len(),
            header,
            body.len(),
            self.named.len(),
            self.structural.len()
        );
        Ok(out.freeze())
    }

    // ---------------------------------------------------------------------
    // Collection
    // ---------------------------------------------------------------------

    fn collect(&mut self) -> Result<()> {
        let ns = self.ns;
        let unit = self.unit;
        for path in unit.imports() {
            self.add_unit(path)?;
        }

        for member in unit.members() {
            self.add_pos(member.pos());
            match member.kind() {
                MemberKind::TypeName { ty } => {
                    if ns.types().named(*ty).is_none() {
                        return Err(Error::consistency(
                            unit.path(),
                            format!("type member '{}' does not refer to a named type", member.name()),
                        ));
                    }
                    self.visit(*ty)?;
                }
                MemberKind::Alias { .. } if !self.version.has_aliases() => {
                    return Err(Error::consistency(
                        unit.path(),
                        format!("alias '{}' cannot be written in {}", member.name(), self.version),
                    ));
                }
                kind => {
                    if let MemberKind::Func { sig } = kind {
                        self.expect_signature(*sig)?;
                    }
                    self.visit(member.ty())?;
                }
            }
        }

        // Named definitions can reach further named types; `named` grows
        // while this loop runs.
        let mut next = 0;
        while next < self.named.len() {
            let id = self.named[next];
            next += 1;
            let named = ns
                .types()
                .named(id)
                .ok_or_else(|| Error::internal("named index refers to a non-named type"))?;
            let underlying = named.underlying.ok_or_else(|| {
                Error::consistency(
                    named.unit.as_str(),
                    format!("named type '{}' has no underlying type", named.name),
                )
            })?;
            self.visit(underlying)?;
            for method in &named.methods {
                self.add_pos(method.pos);
                self.expect_signature(method.sig)?;
                self.visit(method.sig)?;
            }
        }
        Ok(())
    }

    fn add_unit(&mut self, path: &'a str) -> Result<()> {
        if path == self.unit.path() || self.units.contains(&path) {
            return Ok(());
        }
        if !self.ns.contains(path) {
            return Err(Error::consistency(
                path,
                format!("referenced by '{}' but missing from the namespace", self.unit.path()),
            ));
        }
        self.units.push(path);
        Ok(())
    }

    fn add_pos(&mut self, pos: Option<Position>) {
        if let Some(pos) = pos {
            if !self.file_index.contains_key(&pos.file) {
                self.file_index.insert(pos.file, self.files.len() as u64);
                self.files.push(pos.file);
            }
        }
    }

    fn expect_signature(&self, id: TypeId) -> Result<()> {
        match self.ns.types().get(id) {
            Some(TypeKind::Signature(_)) => Ok(()),
            _ => Err(Error::consistency(
                self.unit.path(),
                format!("type {} is used as a signature but is not one", id.index()),
            )),
        }
    }

    fn visit(&mut self, id: TypeId) -> Result<()> {
        let ns = self.ns;
        let types = ns.types();
        if types.is_predeclared(id)
            || self.named_index.contains_key(&id)
            || self.structural_index.contains_key(&id)
        {
            return Ok(());
        }
        let kind = types.get(id).ok_or_else(|| {
            Error::consistency(self.unit.path(), format!("dangling type reference {}", id.index()))
        })?;

        if let TypeKind::Named(named) = kind {
            self.add_unit(&named.unit)?;
            let pos = ns
                .unit(&named.unit)
                .and_then(|u| u.member(&named.name))
                .and_then(|m| m.pos());
            self.add_pos(pos);
            self.named_index.insert(id, self.named.len() as u64);
            self.named.push(id);
            return Ok(());
        }

        if !self.visiting.insert(id) {
            return Err(Error::consistency(
                self.unit.path(),
                "type cycle does not pass through a named type",
            ));
        }
        match kind {
            TypeKind::Basic(_) | TypeKind::Named(_) => {}
            TypeKind::Pointer(elem) | TypeKind::Slice(elem) => self.visit(*elem)?,
            TypeKind::Array { elem, .. } | TypeKind::Chan { elem, .. } => self.visit(*elem)?,
            TypeKind::Map { key, value } => {
                self.visit(*key)?;
                self.visit(*value)?;
            }
            TypeKind::Signature(sig) => {
                for p in sig.params.iter().chain(&sig.results) {
                    self.visit(p.ty)?;
                }
            }
            TypeKind::Struct { fields } => {
                for f in fields {
                    self.visit(f.ty)?;
                }
            }
            TypeKind::Interface { methods, embedded } => {
                for e in embedded {
                    self.visit(*e)?;
                }
                for m in methods {
                    self.expect_signature(m.sig)?;
                    self.visit(m.sig)?;
                }
            }
        }
        self.visiting.remove(&id);
        self.structural_index.insert(id, self.structural.len() as u64);
        self.structural.push(id);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------------

    fn string(&mut self, w: &mut Writer, s: &'a str) {
        let index = match self.string_index.get(s) {
            Some(&i) => i,
            None => {
                let i = self.strings.len() as u64;
                self.strings.push(s);
                self.string_index.insert(s, i);
                i
            }
        };
        w.uvarint(index);
    }

    fn type_ref(&self, w: &mut Writer, id: TypeId) -> Result<()> {
        let predeclared = crate::model::TypeArena::predeclared_count() as u64;
        let raw = if self.ns.types().is_predeclared(id) {
            id.index() as u64
        } else if let Some(&i) = self.named_index.get(&id) {
            predeclared + i
        } else if let Some(&i) = self.structural_index.get(&id) {
            predeclared + self.named.len() as u64 + i
        } else {
            return Err(Error::internal(format!(
                "type {} was not collected before writing",
                id.index()
            )));
        };
        w.uvarint(raw);
        Ok(())
    }

    fn pos(&self, w: &mut Writer, pos: Option<Position>) -> Result<()> {
        let Some(pos) = pos else {
            w.uvarint(0);
            return Ok(());
        };
        let index = self
            .file_index
            .get(&pos.file)
            .ok_or_else(|| Error::internal("position file was not collected"))?;
        w.uvarint(index + 1);
        w.uvarint(u64::from(pos.line));
        if self.version.has_columns() {
            w.uvarint(u64::from(pos.column));
        }
        Ok(())
    }

    fn write_body(&mut self, w: &mut Writer) -> Result<()> {
        let ns = self.ns;
        let unit = self.unit;
        let positions = self.positions;

        self.string(w, unit.name());

        w.uvarint(self.files.len() as u64);
        for i in 0..self.files.len() {
            let file = self.files[i];
            let name = positions.file_name(file).ok_or_else(|| {
                Error::consistency(
                    unit.path(),
                    format!("file {} is not in the position table", file.index()),
                )
            })?;
            self.string(w, name);
        }

        w.uvarint(self.units.len() as u64);
        for i in 0..self.units.len() {
            let path = self.units[i];
            let name = ns.unit(path).map(Unit::name).unwrap_or_default();
            self.string(w, path);
            self.string(w, name);
        }

        w.uvarint(self.named.len() as u64);
        w.uvarint(self.structural.len() as u64);

        for i in 0..self.named.len() {
            let named = ns
                .types()
                .named(self.named[i])
                .ok_or_else(|| Error::internal("named index refers to a non-named type"))?;
            let unit_ref = if named.unit == unit.path() {
                0
            } else {
                self.units
                    .iter()
                    .position(|&u| u == named.unit)
                    .map(|p| p as u64 + 1)
                    .ok_or_else(|| Error::internal("named type unit was not collected"))?
            };
            w.uvarint(unit_ref);
            self.string(w, &named.name);
            let pos = ns
                .unit(&named.unit)
                .and_then(|u| u.member(&named.name))
                .and_then(|m| m.pos());
            self.pos(w, pos)?;
        }

        for i in 0..self.structural.len() {
            let id = self.structural[i];
            let kind = ns
                .types()
                .get(id)
                .ok_or_else(|| Error::internal("structural index refers to a missing type"))?;
            self.structural_type(w, kind)?;
        }

        for i in 0..self.named.len() {
            let named = ns
                .types()
                .named(self.named[i])
                .ok_or_else(|| Error::internal("named index refers to a non-named type"))?;
            let underlying = named
                .underlying
                .ok_or_else(|| Error::internal("named type lost its underlying type"))?;
            self.type_ref(w, underlying)?;
            w.uvarint(named.methods.len() as u64);
            for method in &named.methods {
                self.string(w, &method.name);
                self.type_ref(w, method.sig)?;
                w.bool(method.pointer_receiver);
                self.pos(w, method.pos)?;
            }
        }

        let members: Vec<_> = unit
            .members()
            .filter(|m| !matches!(m.kind(), MemberKind::TypeName { .. }))
            .collect();
        w.uvarint(members.len() as u64);
        for member in members {
            let (tag, ty) = match member.kind() {
                MemberKind::Const { ty, .. } => (member_tag::CONST, *ty),
                MemberKind::Func { sig } => (member_tag::FUNC, *sig),
                MemberKind::Var { ty } => (member_tag::VAR, *ty),
                MemberKind::Alias { target } => (member_tag::ALIAS, *target),
                MemberKind::TypeName { .. } => continue,
            };
            w.u8(tag);
            self.string(w, member.name());
            self.pos(w, member.pos())?;
            self.type_ref(w, ty)?;
            if let MemberKind::Const { value, .. } = member.kind() {
                self.const_value(w, value);
            }
        }
        Ok(())
    }

    fn structural_type(&mut self, w: &mut Writer, kind: &'a TypeKind) -> Result<()> {
        match kind {
            TypeKind::Basic(_) | TypeKind::Named(_) => {
                return Err(Error::internal("non-structural type in structural table"))
            }
            TypeKind::Pointer(elem) => {
                w.u8(type_tag::POINTER);
                self.type_ref(w, *elem)?;
            }
            TypeKind::Slice(elem) => {
                w.u8(type_tag::SLICE);
                self.type_ref(w, *elem)?;
            }
            TypeKind::Array { len, elem } => {
                w.u8(type_tag::ARRAY);
                w.uvarint(*len);
                self.type_ref(w, *elem)?;
            }
            TypeKind::Map { key, value } => {
                w.u8(type_tag::MAP);
                self.type_ref(w, *key)?;
                self.type_ref(w, *value)?;
            }
            TypeKind::Chan { dir, elem } => {
                w.u8(type_tag::CHAN);
                w.u8(dir.to_byte());
                self.type_ref(w, *elem)?;
            }
            TypeKind::Signature(sig) => {
                w.u8(type_tag::SIGNATURE);
                for list in [&sig.params, &sig.results] {
                    w.uvarint(list.len() as u64);
                    for p in list {
                        self.string(w, &p.name);
                        self.type_ref(w, p.ty)?;
                    }
                }
                w.bool(sig.variadic);
            }
            TypeKind::Struct { fields } => {
                w.u8(type_tag::STRUCT);
                w.uvarint(fields.len() as u64);
                for f in fields {
                    self.string(w, &f.name);
                    self.type_ref(w, f.ty)?;
                    w.bool(f.embedded);
                    self.string(w, &f.tag);
                }
            }
            TypeKind::Interface { methods, embedded } => {
                w.u8(type_tag::INTERFACE);
                w.uvarint(embedded.len() as u64);
                for e in embedded {
                    self.type_ref(w, *e)?;
                }
                w.uvarint(methods.len() as u64);
                for m in methods {
                    self.string(w, &m.name);
                    self.type_ref(w, m.sig)?;
                }
            }
        }
        Ok(())
    }

    fn const_value(&mut self, w: &mut Writer, value: &'a ConstValue) {
        match value {
            ConstValue::Bool(b) => {
                w.u8(const_kind::BOOL);
                w.bool(*b);
            }
            ConstValue::String(s) => {
                w.u8(const_kind::STRING);
                self.string(w, s);
            }
            ConstValue::Int(i) => {
                w.u8(const_kind::INT);
                w.mpint(i);
            }
            ConstValue::Float(r) => {
                w.u8(const_kind::FLOAT);
                rational(w, r);
            }
            ConstValue::Complex { re, im } => {
                w.u8(const_kind::COMPLEX);
                rational(w, re);
                rational(w, im);
            }
        }
    }
}

fn rational(w: &mut Writer, r: &Rational) {
    w.mpint(r.numerator());
    w.mpint(r.denominator());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BasicKind, Field, Member};

    fn unit_with_var(ty: impl FnOnce(&mut Namespace) -> TypeId) -> Namespace {
        let mut ns = Namespace::new();
        ns.declare_unit("p", "p").unwrap();
        let ty = ty(&mut ns);
        ns.insert_member("p", Member::new("V", MemberKind::Var { ty }))
            .unwrap();
        ns.mark_complete("p").unwrap();
        ns
    }

    fn encode(ns: &Namespace) -> Result<Bytes> {
        Encoder::new(ns, "p", &PositionTable::new(), FormatVersion::CURRENT)?.run()
    }

    #[test]
    fn test_refuses_incomplete_and_missing_units() {
        let mut ns = Namespace::new();
        ns.declare_unit("p", "p").unwrap();
        assert!(matches!(encode(&ns), Err(Error::Consistency { .. })));

        let ns = Namespace::new();
        assert!(matches!(encode(&ns), Err(Error::Consistency { .. })));
    }

    #[test]
    fn test_refuses_undefined_named_type() {
        let ns = unit_with_var(|ns| {
            ns.declare_unit("q", "q").unwrap();
            ns.declare_named("q", "T", None).unwrap()
        });
        match encode(&ns).unwrap_err() {
            Error::Consistency { path, details } => {
                assert_eq!(path, "q");
                assert!(details.contains("no underlying type"), "{details}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_refuses_unnamed_cycle() {
        let ns = unit_with_var(|ns| {
            let int = ns.basic(BasicKind::Int);
            let s = ns.types_mut().struct_type(vec![Field::new("X", int)]);
            let p = ns.types_mut().pointer(s);
            // struct{X *struct{...}} pointing back at itself
            if let Some(TypeKind::Struct { fields }) = ns.types_mut().get_mut(s) {
                fields[0].ty = p;
            }
            p
        });
        match encode(&ns).unwrap_err() {
            Error::Consistency { details, .. } => {
                assert!(details.contains("cycle"), "{details}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_structural_types_are_shared_by_id() {
        let ns = unit_with_var(|ns| {
            let int = ns.basic(BasicKind::Int);
            let slice = ns.types_mut().slice(int);
            ns.types_mut().alloc(TypeKind::Map {
                key: slice,
                value: slice,
            })
        });
        let data = encode(&ns).unwrap();
        // 0 named, 2 structural: []int, then a map referring to it twice
        let predeclared = crate::model::TypeArena::predeclared_count() as u8;
        let types = [0, 2, type_tag::SLICE, BasicKind::Int.wire_index() as u8];
        let start = data
            .windows(types.len())
            .position(|w| w == types)
            .expect("type table");
        assert_eq!(
            &data[start + types.len()..start + types.len() + 3],
            &[type_tag::MAP, predeclared, predeclared]
        );
    }
}
