//! Diagnostic listings of decoded units.
//!
//! [`UnitPrinter`] renders one declaration per line, with type expressions
//! produced by [`TypeFormatter`]:
//!
//! ```text
//! unit geom "x/geom"
//! import "fmt"
//!
//! func Add(a int, b int) int
//! type Point struct{X int; Y int}
//!     func (Point) String() string
//! ```
//!
//! ## Extensibility
//!
//! The [`UnitVisitor`] trait receives the same declarations the printer
//! does and can be driven with [`walk_unit`].

mod visitor;

use crate::model::{
    ChanDir, ConstValue, Member, Method, NamedType, Namespace, Position, PositionTable, Signature,
    TypeArena, TypeId, TypeKind, Unit,
};
use std::fmt::{self, Write as FmtWrite};

pub use visitor::{walk_unit, NullVisitor, StatsVisitor, UnitVisitor};

/// Configuration for [`UnitPrinter`]
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Indentation of method lines (default: 4 spaces)
    pub indent_str: String,
    /// Append declaration positions as trailing comments
    pub show_positions: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            indent_str: "    ".to_string(),
            show_positions: false,
        }
    }
}

impl PrinterConfig {
    /// Creates a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether positions are printed
    pub fn show_positions(mut self, show: bool) -> Self {
        self.show_positions = show;
        self
    }
}

/// Renders type expressions.
///
/// Named types of the unit given to [`relative_to`](Self::relative_to) print
/// bare; all others are qualified with their unit path.
#[derive(Debug, Clone, Copy)]
pub struct TypeFormatter<'a> {
    types: &'a TypeArena,
    relative_to: Option<&'a str>,
}

impl<'a> TypeFormatter<'a> {
    /// Creates a formatter qualifying every named type
    pub fn new(types: &'a TypeArena) -> Self {
        Self {
            types,
            relative_to: None,
        }
    }

    /// Leaves named types of `unit` unqualified
    pub fn relative_to(mut self, unit: &'a str) -> Self {
        self.relative_to = Some(unit);
        self
    }

    /// Returns the type expression for `id`
    pub fn format(&self, id: TypeId) -> String {
        let mut out = String::new();
        // writing into a String never fails
        let _ = self.write(&mut out, id);
        out
    }

    /// Writes the type expression for `id`
    pub fn write<W: FmtWrite + ?Sized>(&self, out: &mut W, id: TypeId) -> fmt::Result {
        let Some(kind) = self.types.get(id) else {
            return out.write_str("<invalid>");
        };

        match kind {
            TypeKind::Basic(basic) => out.write_str(basic.name()),
            TypeKind::Named(named) => self.write_name(out, named),
            TypeKind::Pointer(elem) => {
                out.write_char('*')?;
                self.write(out, *elem)
            }
            TypeKind::Slice(elem) => {
                out.write_str("[]")?;
                self.write(out, *elem)
            }
            TypeKind::Array { len, elem } => {
                write!(out, "[{len}]")?;
                self.write(out, *elem)
            }
            TypeKind::Map { key, value } => {
                out.write_str("map[")?;
                self.write(out, *key)?;
                out.write_char(']')?;
                self.write(out, *value)
            }
            TypeKind::Chan { dir, elem } => {
                out.write_str(match dir {
                    ChanDir::Both => "chan ",
                    ChanDir::Send => "chan<- ",
                    ChanDir::Recv => "<-chan ",
                })?;
                self.write(out, *elem)
            }
            TypeKind::Signature(sig) => {
                out.write_str("func")?;
                self.write_signature(out, sig)
            }
            TypeKind::Struct { fields } => {
                out.write_str("struct{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.write_str("; ")?;
                    }
                    if !field.embedded {
                        write!(out, "{} ", field.name)?;
                    }
                    self.write(out, field.ty)?;
                    if !field.tag.is_empty() {
                        write!(out, " {:?}", field.tag)?;
                    }
                }
                out.write_char('}')
            }
            TypeKind::Interface { methods, embedded } => {
                out.write_str("interface{")?;
                let mut first = true;
                for method in methods {
                    if !first {
                        out.write_str("; ")?;
                    }
                    first = false;
                    out.write_str(&method.name)?;
                    self.write_signature_of(out, method.sig)?;
                }
                for ty in embedded {
                    if !first {
                        out.write_str("; ")?;
                    }
                    first = false;
                    self.write(out, *ty)?;
                }
                out.write_char('}')
            }
        }
    }

    /// Writes a parameter list and results, without the `func` keyword
    pub fn write_signature<W: FmtWrite + ?Sized>(&self, out: &mut W, sig: &Signature) -> fmt::Result {
        out.write_char('(')?;
        for (i, param) in sig.params.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            if !param.name.is_empty() {
                write!(out, "{} ", param.name)?;
            }
            let last = i + 1 == sig.params.len();
            match self.types.get(param.ty) {
                Some(TypeKind::Slice(elem)) if sig.variadic && last => {
                    out.write_str("...")?;
                    self.write(out, *elem)?;
                }
                _ => self.write(out, param.ty)?,
            }
        }
        out.write_char(')')?;

        match sig.results.as_slice() {
            [] => Ok(()),
            [only] if only.name.is_empty() => {
                out.write_char(' ')?;
                self.write(out, only.ty)
            }
            results => {
                out.write_str(" (")?;
                for (i, result) in results.iter().enumerate() {
                    if i > 0 {
                        out.write_str(", ")?;
                    }
                    if !result.name.is_empty() {
                        write!(out, "{} ", result.name)?;
                    }
                    self.write(out, result.ty)?;
                }
                out.write_char(')')
            }
        }
    }

    fn write_signature_of<W: FmtWrite + ?Sized>(&self, out: &mut W, id: TypeId) -> fmt::Result {
        match self.types.get(id).and_then(TypeKind::as_signature) {
            Some(sig) => self.write_signature(out, sig),
            None => out.write_str("<invalid>"),
        }
    }

    fn write_name<W: FmtWrite + ?Sized>(&self, out: &mut W, named: &NamedType) -> fmt::Result {
        if self.relative_to != Some(named.unit.as_str()) {
            write!(out, "{}.", named.unit)?;
        }
        out.write_str(&named.name)
    }
}

/// Renders a unit as a declaration listing
#[derive(Debug, Clone, Default)]
pub struct UnitPrinter {
    config: PrinterConfig,
}

impl UnitPrinter {
    /// Creates a printer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a printer with custom configuration
    pub fn with_config(config: PrinterConfig) -> Self {
        Self { config }
    }

    /// Renders `unit` into a string
    pub fn render(&self, namespace: &Namespace, positions: &PositionTable, unit: &Unit) -> String {
        let mut output = String::new();
        // writing into a String never fails
        let _ = self.write_to(&mut output, namespace, positions, unit);
        output
    }

    /// Writes the listing for `unit` to `out`
    pub fn write_to(
        &self,
        out: &mut impl FmtWrite,
        namespace: &Namespace,
        positions: &PositionTable,
        unit: &Unit,
    ) -> fmt::Result {
        let mut printer = DefaultPrinter {
            out,
            config: &self.config,
            positions,
            types: TypeFormatter::new(namespace.types()).relative_to(unit.path()),
        };
        walk_unit(namespace, unit, &mut printer)
    }
}

/// The visitor behind [`UnitPrinter`]
struct DefaultPrinter<'a, W: FmtWrite> {
    out: &'a mut W,
    config: &'a PrinterConfig,
    positions: &'a PositionTable,
    types: TypeFormatter<'a>,
}

impl<W: FmtWrite> DefaultPrinter<'_, W> {
    fn end_line(&mut self, pos: Option<Position>) -> fmt::Result {
        if let (true, Some(pos)) = (self.config.show_positions, pos) {
            write!(self.out, "  // {}", self.positions.display(pos))?;
        }
        writeln!(self.out)
    }
}

impl<W: FmtWrite> UnitVisitor for DefaultPrinter<'_, W> {
    fn visit_unit(&mut self, unit: &Unit) -> fmt::Result {
        writeln!(self.out, "unit {} {:?}", unit.name(), unit.path())?;
        if !unit.is_complete() {
            writeln!(self.out, "// incomplete")?;
        }
        for import in unit.imports() {
            writeln!(self.out, "import {import:?}")?;
        }
        if !unit.is_empty() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn visit_const(&mut self, member: &Member, ty: TypeId, value: &ConstValue) -> fmt::Result {
        write!(self.out, "const {} ", member.name())?;
        self.types.write(self.out, ty)?;
        write!(self.out, " = {value}")?;
        self.end_line(member.pos())
    }

    fn visit_func(&mut self, member: &Member, sig: &Signature) -> fmt::Result {
        write!(self.out, "func {}", member.name())?;
        self.types.write_signature(self.out, sig)?;
        self.end_line(member.pos())
    }

    fn visit_type(&mut self, member: &Member, named: &NamedType) -> fmt::Result {
        write!(self.out, "type {} ", member.name())?;
        match named.underlying {
            Some(underlying) => self.types.write(self.out, underlying)?,
            None => self.out.write_str("<undefined>")?,
        }
        self.end_line(member.pos())
    }

    fn visit_method(&mut self, named: &NamedType, method: &Method) -> fmt::Result {
        let star = if method.pointer_receiver { "*" } else { "" };
        write!(
            self.out,
            "{}func ({}{}) {}",
            self.config.indent_str, star, named.name, method.name
        )?;
        self.types.write_signature_of(self.out, method.sig)?;
        self.end_line(method.pos)
    }

    fn visit_alias(&mut self, member: &Member, target: TypeId) -> fmt::Result {
        write!(self.out, "type {} = ", member.name())?;
        self.types.write(self.out, target)?;
        self.end_line(member.pos())
    }

    fn visit_var(&mut self, member: &Member, ty: TypeId) -> fmt::Result {
        write!(self.out, "var {} ", member.name())?;
        self.types.write(self.out, ty)?;
        self.end_line(member.pos())
    }
}
