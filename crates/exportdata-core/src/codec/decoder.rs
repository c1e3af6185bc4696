//! Single-pass section decoder.

use super::wire::{const_kind, member_tag, type_tag, Reader};
use super::FormatVersion;
use crate::error::{Error, Result};
use crate::model::{
    ChanDir, ConstValue, Field, FileId, InterfaceMethod, Member, MemberKind, Method, Namespace,
    Param, Position, PositionTable, Rational, Signature, TypeArena, TypeId, TypeKind,
};
use std::collections::HashSet;
use tracing::{debug, trace};

pub(crate) struct Decoder<'d, 's> {
    r: Reader<'d>,
    version: FormatVersion,
    positions: &'s mut PositionTable,
    ns: &'s mut Namespace,
    path: &'s str,
    strings: Vec<&'d str>,
    files: Vec<FileId>,
    /// Local unit references; index 0 is the target unit
    units: Vec<String>,
    named: Vec<TypeId>,
    structural: Vec<TypeId>,
}

impl<'d, 's> Decoder<'d, 's> {
    pub(crate) fn new(
        data: &'d [u8],
        body: usize,
        version: FormatVersion,
        positions: &'s mut PositionTable,
        ns: &'s mut Namespace,
        path: &'s str,
    ) -> Result<Self> {
        let mut r = Reader::new(data);
        r.bytes(body, "version tag")?;
        Ok(Self {
            r,
            version,
            positions,
            ns,
            path,
            strings: Vec::new(),
            files: Vec::new(),
            units: Vec::new(),
            named: Vec::new(),
            structural: Vec::new(),
        })
    }

    pub(crate) fn run(mut self) -> Result<()> {
        debug!("decoding '{}' ({})", self.path, self.version);

        self.read_strings()?;

        let name = self.string("unit name")?;
        self.ns.declare_unit(self.path, name)?;
        self.ns.clear_values(self.path)?;
        self.units.push(self.path.to_string());

        self.read_files()?;
        self.read_imports()?;
        self.read_types()?;
        self.read_members()?;

        if let Some(id) = self.named.iter().copied().find(|&id| {
            self.ns
                .types()
                .named(id)
                .is_some_and(|n| n.is_placeholder())
        }) {
            let name = self.ns.types().named(id).map(|n| n.name.clone()).unwrap_or_default();
            return Err(self.r.error(format!("named type '{name}' was never defined")));
        }
        // left over from an earlier attempt on this unit and absent from this stream
        if let Some(name) = self.ns.undefined_type_name(self.path) {
            return Err(self.r.error(format!("named type '{name}' was never defined")));
        }

        self.ns.mark_complete(self.path)?;
        debug!(
            "decoded '{}': {} strings, {} files, {} imports, {} named, {} structural types",
            self.path,
            self.strings.len(),
            self.files.len(),
            self.units.len() - 1,
            self.named.len(),
            self.structural.len()
        );
        Ok(())
    }

    fn read_strings(&mut self) -> Result<()> {
        let n = self.r.count("string table")?;
        self.strings.reserve(n);
        for _ in 0..n {
            let offset = self.r.offset();
            let len = self.r.count("string length")?;
            let bytes = self.r.bytes(len, "string")?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| Error::format(offset, format!("string is not valid UTF-8: {e}")))?;
            self.strings.push(s);
        }
        trace!("read {} strings", n);
        Ok(())
    }

    fn string(&mut self, what: &str) -> Result<&'d str> {
        let offset = self.r.offset();
        let index = self.r.uvarint(what)?;
        self.strings
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::format(offset, format!("{what}: string index {index} out of range")))
    }

    fn read_files(&mut self) -> Result<()> {
        let n = self.r.count("file table")?;
        for _ in 0..n {
            let name = self.string("file name")?;
            self.files.push(self.positions.add_file(name));
        }
        Ok(())
    }

    fn pos(&mut self) -> Result<Option<Position>> {
        let offset = self.r.offset();
        let file = self.r.uvarint("position file")?;
        if file == 0 {
            return Ok(None);
        }
        let file = self
            .files
            .get(file as usize - 1)
            .copied()
            .ok_or_else(|| Error::format(offset, format!("file index {} out of range", file - 1)))?;
        let line = self.r.u32("line")?;
        let column = if self.version.has_columns() {
            self.r.u32("column")?
        } else {
            0
        };
        Ok(Some(Position::new(file, line, column)))
    }

    fn read_imports(&mut self) -> Result<()> {
        let n = self.r.count("import list")?;
        let mut imports = Vec::with_capacity(n);
        for _ in 0..n {
            let path = self.string("import path")?;
            let name = self.string("import name")?;
            if path == self.path {
                return Err(Error::consistency(self.path, "unit lists itself as an import"));
            }
            if self.units.iter().any(|u| u == path) {
                return Err(self.r.error(format!("import '{path}' listed twice")));
            }
            self.ns.declare_unit(path, name)?;
            trace!("import '{}' ({})", path, name);
            self.units.push(path.to_string());
            imports.push(path.to_string());
        }
        self.ns.set_imports(self.path, imports)
    }

    fn read_types(&mut self) -> Result<()> {
        let n_named = self.r.count("named type count")?;
        let n_structural = self.r.count("structural type count")?;

        for _ in 0..n_named {
            let offset = self.r.offset();
            let unit_ref = self.r.uvarint("unit reference")?;
            let unit = self
                .units
                .get(unit_ref as usize)
                .cloned()
                .ok_or_else(|| Error::format(offset, format!("unit reference {unit_ref} out of range")))?;
            let name = self.string("type name")?;
            let pos = self.pos()?;
            let id = self.ns.resolve_named(&unit, name, pos)?;
            self.named.push(id);
        }

        for _ in 0..n_structural {
            let kind = self.structural_type()?;
            let id = self.ns.types_mut().alloc(kind);
            self.structural.push(id);
        }

        for i in 0..n_named {
            let id = self.named[i];
            let offset = self.r.offset();
            let underlying = self.type_ref()?;
            if underlying == id {
                return Err(Error::format(offset, "named type is its own underlying type"));
            }
            let n = self.r.count("method list")?;
            let mut methods = Vec::with_capacity(n);
            for _ in 0..n {
                let name = self.string("method name")?.to_string();
                let sig = self.signature_ref()?;
                let pointer_receiver = self.r.bool("receiver kind")?;
                let pos = self.pos()?;
                methods.push(Method {
                    name,
                    sig,
                    pointer_receiver,
                    pos,
                });
            }

            // First definition wins: a type filled by an earlier decode keeps
            // its node and this copy is dropped.
            if self.ns.types().named(id).is_some_and(|n| n.is_placeholder()) {
                self.ns.define_named(id, underlying, methods)?;
            }
        }
        trace!("read {} named and {} structural types", n_named, n_structural);
        Ok(())
    }

    fn type_ref(&mut self) -> Result<TypeId> {
        let offset = self.r.offset();
        let raw = self.r.uvarint("type reference")?;
        let predeclared = TypeArena::predeclared_count() as u64;
        if raw < predeclared {
            return self
                .ns
                .types()
                .predeclared(raw as usize)
                .ok_or_else(|| Error::internal("predeclared type missing from arena"));
        }
        let local = (raw - predeclared) as usize;
        if let Some(&id) = self.named.get(local) {
            return Ok(id);
        }
        self.structural
            .get(local - self.named.len())
            .copied()
            .ok_or_else(|| {
                Error::format(
                    offset,
                    format!("reference to type {local} before its definition"),
                )
            })
    }

    fn signature_ref(&mut self) -> Result<TypeId> {
        let offset = self.r.offset();
        let id = self.type_ref()?;
        match self.ns.types().get(id) {
            Some(TypeKind::Signature(_)) => Ok(id),
            _ => Err(Error::format(offset, "expected a signature type")),
        }
    }

    fn params(&mut self) -> Result<Vec<Param>> {
        let n = self.r.count("parameter list")?;
        let mut params = Vec::with_capacity(n);
        for _ in 0..n {
            let name = self.string("parameter name")?.to_string();
            let ty = self.type_ref()?;
            params.push(Param { name, ty });
        }
        Ok(params)
    }

    fn structural_type(&mut self) -> Result<TypeKind> {
        let offset = self.r.offset();
        let tag = self.r.u8("type tag")?;
        let kind = match tag {
            type_tag::POINTER => TypeKind::Pointer(self.type_ref()?),
            type_tag::SLICE => TypeKind::Slice(self.type_ref()?),
            type_tag::ARRAY => {
                let len = self.r.uvarint("array length")?;
                TypeKind::Array {
                    len,
                    elem: self.type_ref()?,
                }
            }
            type_tag::MAP => {
                let key = self.type_ref()?;
                TypeKind::Map {
                    key,
                    value: self.type_ref()?,
                }
            }
            type_tag::CHAN => {
                let b = self.r.u8("channel direction")?;
                let dir = ChanDir::from_byte(b)
                    .ok_or_else(|| self.r.error(format!("invalid channel direction {b}")))?;
                TypeKind::Chan {
                    dir,
                    elem: self.type_ref()?,
                }
            }
            type_tag::SIGNATURE => {
                let params = self.params()?;
                let results = self.params()?;
                let variadic = self.r.bool("variadic flag")?;
                if variadic && params.is_empty() {
                    return Err(Error::format(offset, "variadic signature without parameters"));
                }
                TypeKind::Signature(Signature {
                    params,
                    results,
                    variadic,
                })
            }
            type_tag::STRUCT => {
                let n = self.r.count("field list")?;
                let mut fields = Vec::with_capacity(n);
                for _ in 0..n {
                    let name = self.string("field name")?.to_string();
                    let ty = self.type_ref()?;
                    let embedded = self.r.bool("embedded flag")?;
                    let tag = self.string("field tag")?.to_string();
                    fields.push(Field {
                        name,
                        ty,
                        embedded,
                        tag,
                    });
                }
                TypeKind::Struct { fields }
            }
            type_tag::INTERFACE => {
                let n = self.r.count("embedded interface list")?;
                let mut embedded = Vec::with_capacity(n);
                for _ in 0..n {
                    embedded.push(self.type_ref()?);
                }
                let n = self.r.count("interface method list")?;
                let mut methods = Vec::with_capacity(n);
                for _ in 0..n {
                    let name = self.string("method name")?.to_string();
                    let sig = self.signature_ref()?;
                    methods.push(InterfaceMethod { name, sig });
                }
                TypeKind::Interface { methods, embedded }
            }
            other => return Err(Error::format(offset, format!("unknown type tag {other}"))),
        };
        Ok(kind)
    }

    fn read_members(&mut self) -> Result<()> {
        let n = self.r.count("member list")?;
        let mut seen = HashSet::with_capacity(n);
        for _ in 0..n {
            let offset = self.r.offset();
            let tag = self.r.u8("member tag")?;
            let name = self.string("member name")?;
            if !seen.insert(name) {
                return Err(Error::format(offset, format!("member '{name}' listed twice")));
            }
            if self
                .ns
                .unit(self.path)
                .and_then(|u| u.member(name))
                .is_some_and(|m| matches!(m.kind(), MemberKind::TypeName { .. }))
            {
                return Err(Error::format(offset, format!("member '{name}' collides with a type")));
            }
            let pos = self.pos()?;

            let kind = match tag {
                member_tag::CONST => {
                    let ty = self.type_ref()?;
                    let value = self.const_value()?;
                    MemberKind::Const { ty, value }
                }
                member_tag::FUNC => MemberKind::Func {
                    sig: self.signature_ref()?,
                },
                member_tag::VAR => MemberKind::Var {
                    ty: self.type_ref()?,
                },
                member_tag::ALIAS if self.version.has_aliases() => MemberKind::Alias {
                    target: self.type_ref()?,
                },
                other => {
                    return Err(Error::format(
                        offset,
                        format!("unknown member tag '{}' in {}", other.escape_ascii(), self.version),
                    ))
                }
            };

            let mut member = Member::new(name, kind);
            if let Some(pos) = pos {
                member = member.with_pos(pos);
            }
            self.ns.put_member(self.path, member)?;
        }
        trace!("read {} members", n);
        Ok(())
    }

    fn const_value(&mut self) -> Result<ConstValue> {
        let offset = self.r.offset();
        let kind = self.r.u8("constant kind")?;
        let value = match kind {
            const_kind::BOOL => ConstValue::Bool(self.r.bool("boolean constant")?),
            const_kind::STRING => ConstValue::String(self.string("string constant")?.to_string()),
            const_kind::INT => ConstValue::Int(self.r.mpint("integer constant")?),
            const_kind::FLOAT => ConstValue::Float(self.rational()?),
            const_kind::COMPLEX => {
                let re = self.rational()?;
                let im = self.rational()?;
                ConstValue::Complex { re, im }
            }
            other => return Err(Error::format(offset, format!("unknown constant kind {other}"))),
        };
        Ok(value)
    }

    fn rational(&mut self) -> Result<Rational> {
        let offset = self.r.offset();
        let num = self.r.mpint("numerator")?;
        let den = self.r.mpint("denominator")?;
        Rational::new(num, den)
            .ok_or_else(|| Error::format(offset, "denominator must be positive"))
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{decode_bytes, encode};
    use crate::error::Error;
    use crate::model::{BasicKind, Field, Member, MemberKind, Namespace, PositionTable};

    /// Section header for a unit "p" with the given extra strings
    fn header(strings: &[&str]) -> Vec<u8> {
        let mut data = vec![b'i', 2, strings.len() as u8 + 1, 1, b'p'];
        for s in strings {
            data.push(s.len() as u8);
            data.extend_from_slice(s.as_bytes());
        }
        data.push(0); // unit name "p"
        data.push(0); // no files
        data
    }

    #[test]
    fn test_self_import_is_consistency_error() {
        let mut data = header(&[]);
        data.extend_from_slice(&[1, 0, 0]); // import "p" named "p"
        let mut ns = Namespace::new();
        let err = decode_bytes(&data, &mut PositionTable::new(), &mut ns, "p").unwrap_err();
        assert!(matches!(err, Error::Consistency { .. }), "{err}");
    }

    #[test]
    fn test_import_name_mismatch() {
        let mut data = header(&["q", "other"]);
        data.extend_from_slice(&[1, 1, 2]); // import "q" named "other"
        data.extend_from_slice(&[0, 0, 0]); // no types, no members

        let mut ns = Namespace::new();
        ns.declare_unit("q", "q").unwrap();
        let err = decode_bytes(&data, &mut PositionTable::new(), &mut ns, "p").unwrap_err();
        assert!(matches!(err, Error::Consistency { .. }), "{err}");
    }

    #[test]
    fn test_type_from_complete_unit_must_exist() {
        let mut data = header(&["q", "T"]);
        data.extend_from_slice(&[1, 1, 1]); // import "q" named "q"
        data.extend_from_slice(&[1, 0]); // 1 named, 0 structural
        data.extend_from_slice(&[1, 2, 0]); // q.T, no position

        let mut ns = Namespace::new();
        ns.declare_unit("q", "q").unwrap();
        ns.mark_complete("q").unwrap();
        match decode_bytes(&data, &mut PositionTable::new(), &mut ns, "p").unwrap_err() {
            Error::Consistency { path, .. } => assert_eq!(path, "q"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ns.unit("p").unwrap().is_complete());
    }

    #[test]
    fn test_type_name_must_not_be_a_value() {
        let mut data = header(&["q", "T"]);
        data.extend_from_slice(&[1, 1, 1]);
        data.extend_from_slice(&[1, 0]);
        data.extend_from_slice(&[1, 2, 0]);

        let mut ns = Namespace::new();
        ns.declare_unit("q", "q").unwrap();
        let int = ns.basic(BasicKind::Int);
        ns.insert_member("q", Member::new("T", MemberKind::Var { ty: int }))
            .unwrap();
        let err = decode_bytes(&data, &mut PositionTable::new(), &mut ns, "p").unwrap_err();
        assert!(matches!(err, Error::Consistency { .. }), "{err}");
    }

    #[test]
    fn test_redecode_after_failure() {
        let mut src = Namespace::new();
        src.declare_unit("p", "p").unwrap();
        let int = src.basic(BasicKind::Int);
        src.insert_member("p", Member::new("A", MemberKind::Var { ty: int }))
            .unwrap();
        src.insert_member("p", Member::new("B", MemberKind::Var { ty: int }))
            .unwrap();
        src.mark_complete("p").unwrap();
        let data = encode(&src, "p", &PositionTable::new()).unwrap();

        let mut ns = Namespace::new();
        let mut positions = PositionTable::new();
        assert!(decode_bytes(&data[..data.len() - 1], &mut positions, &mut ns, "p").is_err());
        let partial = ns.unit("p").unwrap();
        assert!(!partial.is_complete());
        assert_eq!(partial.len(), 1);

        let unit = decode_bytes(&data, &mut positions, &mut ns, "p").unwrap();
        assert!(unit.is_complete());
        assert_eq!(unit.len(), 2);
    }

    /// Complete unit "p" holding one `var` of type int per name
    fn vars(names: &[&str]) -> bytes::Bytes {
        let mut src = Namespace::new();
        src.declare_unit("p", "p").unwrap();
        let int = src.basic(BasicKind::Int);
        for name in names {
            src.insert_member("p", Member::new(*name, MemberKind::Var { ty: int }))
                .unwrap();
        }
        src.mark_complete("p").unwrap();
        encode(&src, "p", &PositionTable::new()).unwrap()
    }

    #[test]
    fn test_redecode_drops_members_of_failed_attempt() {
        let first = vars(&["A", "Z"]);
        let second = vars(&["Z"]);

        let mut ns = Namespace::new();
        let mut positions = PositionTable::new();
        assert!(decode_bytes(&first[..first.len() - 1], &mut positions, &mut ns, "p").is_err());
        assert!(ns.unit("p").unwrap().member("A").is_some());

        let unit = decode_bytes(&second, &mut positions, &mut ns, "p").unwrap();
        let names: Vec<&str> = unit.members().map(Member::name).collect();
        assert_eq!(names, ["Z"]);
        assert_eq!(encode(&ns, "p", &positions).unwrap(), second);
    }

    #[test]
    fn test_redecode_rejects_stale_type_placeholder() {
        // type Old struct { X int }; var V int
        let mut src = Namespace::new();
        src.declare_unit("p", "p").unwrap();
        let int = src.basic(BasicKind::Int);
        let old = src.declare_named("p", "Old", None).unwrap();
        let body = src.types_mut().struct_type(vec![Field::new("X", int)]);
        src.define_named(old, body, Vec::new()).unwrap();
        src.insert_member("p", Member::new("V", MemberKind::Var { ty: int }))
            .unwrap();
        src.mark_complete("p").unwrap();
        let first = encode(&src, "p", &PositionTable::new()).unwrap();
        let second = vars(&["W"]);

        let mut stale_cuts = 0;
        for cut in 0..first.len() {
            let mut ns = Namespace::new();
            let mut positions = PositionTable::new();
            assert!(decode_bytes(&first[..cut], &mut positions, &mut ns, "p").is_err());
            let Some(MemberKind::TypeName { ty }) =
                ns.unit("p").and_then(|u| u.member("Old")).map(Member::kind)
            else {
                continue;
            };
            if !ns.types().named(*ty).unwrap().is_placeholder() {
                continue;
            }
            stale_cuts += 1;

            let err = decode_bytes(&second, &mut positions, &mut ns, "p").unwrap_err();
            assert!(matches!(err, Error::Format { .. }), "cut at {cut}: {err}");
            assert!(!ns.unit("p").unwrap().is_complete(), "cut at {cut}");
        }
        assert!(stale_cuts > 0);
    }

    #[test]
    fn test_oversized_count_is_rejected() {
        let mut data = vec![b'i', 2];
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]); // huge string count
        let mut ns = Namespace::new();
        let err = decode_bytes(&data, &mut PositionTable::new(), &mut ns, "p").unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err}");
        assert!(ns.unit("p").is_none());
    }
}
