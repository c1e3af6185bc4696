//! Walking the members of a decoded unit.
//!
//! [`walk_unit`] calls one [`UnitVisitor`] method per member, in member name
//! order, and one per method of every named type.

use crate::model::{
    ConstValue, Member, MemberKind, Method, NamedType, Namespace, Signature, TypeId, Unit,
};
use std::fmt::Result;

/// Callbacks for the declarations of a unit.
///
/// Every method defaults to doing nothing, so implementors only override
/// what they care about.
///
/// # Example
///
/// ```
/// use exportdata_core::describe::UnitVisitor;
/// use exportdata_core::model::{Member, Signature};
///
/// struct FuncNames(Vec<String>);
///
/// impl UnitVisitor for FuncNames {
///     fn visit_func(&mut self, member: &Member, _sig: &Signature) -> std::fmt::Result {
///         self.0.push(member.name().to_string());
///         Ok(())
///     }
/// }
/// ```
pub trait UnitVisitor {
    /// Called once before any member
    fn visit_unit(&mut self, unit: &Unit) -> Result {
        let _ = unit;
        Ok(())
    }

    /// A constant
    fn visit_const(&mut self, member: &Member, ty: TypeId, value: &ConstValue) -> Result {
        let _ = (member, ty, value);
        Ok(())
    }

    /// A function
    fn visit_func(&mut self, member: &Member, sig: &Signature) -> Result {
        let _ = (member, sig);
        Ok(())
    }

    /// A named type declaration; its methods follow as [`visit_method`](Self::visit_method)
    fn visit_type(&mut self, member: &Member, named: &NamedType) -> Result {
        let _ = (member, named);
        Ok(())
    }

    /// A method of the named type last passed to [`visit_type`](Self::visit_type)
    fn visit_method(&mut self, named: &NamedType, method: &Method) -> Result {
        let _ = (named, method);
        Ok(())
    }

    /// An alias declaration
    fn visit_alias(&mut self, member: &Member, target: TypeId) -> Result {
        let _ = (member, target);
        Ok(())
    }

    /// A variable
    fn visit_var(&mut self, member: &Member, ty: TypeId) -> Result {
        let _ = (member, ty);
        Ok(())
    }
}

/// A visitor that ignores everything
pub struct NullVisitor;

impl UnitVisitor for NullVisitor {}

/// A visitor that counts declarations
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsVisitor {
    /// Number of constants
    pub const_count: usize,
    /// Number of functions
    pub func_count: usize,
    /// Number of named types
    pub type_count: usize,
    /// Number of methods across all named types
    pub method_count: usize,
    /// Number of aliases
    pub alias_count: usize,
    /// Number of variables
    pub var_count: usize,
    /// Number of exported members
    pub exported_count: usize,
}

impl StatsVisitor {
    /// Total number of members
    pub fn member_count(&self) -> usize {
        self.const_count + self.func_count + self.type_count + self.alias_count + self.var_count
    }

    fn member(&mut self, member: &Member) {
        if member.is_exported() {
            self.exported_count += 1;
        }
    }
}

impl UnitVisitor for StatsVisitor {
    fn visit_const(&mut self, member: &Member, _ty: TypeId, _value: &ConstValue) -> Result {
        self.member(member);
        self.const_count += 1;
        Ok(())
    }

    fn visit_func(&mut self, member: &Member, _sig: &Signature) -> Result {
        self.member(member);
        self.func_count += 1;
        Ok(())
    }

    fn visit_type(&mut self, member: &Member, _named: &NamedType) -> Result {
        self.member(member);
        self.type_count += 1;
        Ok(())
    }

    fn visit_method(&mut self, _named: &NamedType, _method: &Method) -> Result {
        self.method_count += 1;
        Ok(())
    }

    fn visit_alias(&mut self, member: &Member, _target: TypeId) -> Result {
        self.member(member);
        self.alias_count += 1;
        Ok(())
    }

    fn visit_var(&mut self, member: &Member, _ty: TypeId) -> Result {
        self.member(member);
        self.var_count += 1;
        Ok(())
    }
}

/// Feeds every declaration of `unit` to `visitor`.
///
/// Members whose type node is missing from the namespace, or is not the
/// expected kind, are skipped.
pub fn walk_unit<V: UnitVisitor + ?Sized>(
    namespace: &Namespace,
    unit: &Unit,
    visitor: &mut V,
) -> Result {
    let types = namespace.types();
    visitor.visit_unit(unit)?;

    for member in unit.members() {
        match member.kind() {
            MemberKind::Const { ty, value } => visitor.visit_const(member, *ty, value)?,
            MemberKind::Func { sig } => {
                if let Some(sig) = types.get(*sig).and_then(|t| t.as_signature()) {
                    visitor.visit_func(member, sig)?;
                }
            }
            MemberKind::TypeName { ty } => {
                if let Some(named) = types.named(*ty) {
                    visitor.visit_type(member, named)?;
                    for method in &named.methods {
                        visitor.visit_method(named, method)?;
                    }
                }
            }
            MemberKind::Alias { target } => visitor.visit_alias(member, *target)?,
            MemberKind::Var { ty } => visitor.visit_var(member, *ty)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BasicKind, Integer, Method, Param};

    fn sample() -> Namespace {
        let mut ns = Namespace::new();
        ns.declare_unit("demo", "demo").unwrap();
        let int = ns.basic(BasicKind::Int);
        let untyped = ns.basic(BasicKind::UntypedInt);

        let counter = ns.declare_named("demo", "Counter", None).unwrap();
        let ptr = ns.types_mut().pointer(counter);
        let incr = ns.types_mut().signature(Vec::new(), Vec::new(), false);
        let get = ns
            .types_mut()
            .signature(Vec::new(), vec![Param::new("", int)], false);
        ns.define_named(
            counter,
            int,
            vec![
                Method {
                    name: "Get".into(),
                    sig: get,
                    pointer_receiver: false,
                    pos: None,
                },
                Method {
                    name: "Incr".into(),
                    sig: incr,
                    pointer_receiver: true,
                    pos: None,
                },
            ],
        )
        .unwrap();

        let new = ns
            .types_mut()
            .signature(Vec::new(), vec![Param::new("", ptr)], false);
        let members = [
            Member::new("New", MemberKind::Func { sig: new }),
            Member::new(
                "Max",
                MemberKind::Const {
                    ty: untyped,
                    value: ConstValue::Int(Integer::from(10i64)),
                },
            ),
            Member::new("count", MemberKind::Var { ty: int }),
            Member::new("Number", MemberKind::Alias { target: int }),
        ];
        for member in members {
            ns.insert_member("demo", member).unwrap();
        }
        ns.mark_complete("demo").unwrap();
        ns
    }

    #[test]
    fn test_null_visitor() {
        let ns = sample();
        let unit = ns.unit("demo").unwrap();
        assert!(walk_unit(&ns, unit, &mut NullVisitor).is_ok());
    }

    #[test]
    fn test_stats_visitor() {
        let ns = sample();
        let unit = ns.unit("demo").unwrap();
        let mut stats = StatsVisitor::default();
        walk_unit(&ns, unit, &mut stats).unwrap();

        assert_eq!(stats.const_count, 1);
        assert_eq!(stats.func_count, 1);
        assert_eq!(stats.type_count, 1);
        assert_eq!(stats.method_count, 2);
        assert_eq!(stats.alias_count, 1);
        assert_eq!(stats.var_count, 1);
        assert_eq!(stats.member_count(), 5);
        assert_eq!(stats.exported_count, 4);
    }

    #[test]
    fn test_walk_order_is_by_name() {
        struct Names(Vec<String>);
        impl UnitVisitor for Names {
            fn visit_func(&mut self, member: &Member, _sig: &Signature) -> Result {
                self.0.push(member.name().to_string());
                Ok(())
            }
            fn visit_type(&mut self, member: &Member, _named: &NamedType) -> Result {
                self.0.push(member.name().to_string());
                Ok(())
            }
            fn visit_method(&mut self, named: &NamedType, method: &Method) -> Result {
                self.0.push(format!("{}.{}", named.name, method.name));
                Ok(())
            }
        }

        let ns = sample();
        let mut names = Names(Vec::new());
        walk_unit(&ns, ns.unit("demo").unwrap(), &mut names).unwrap();
        assert_eq!(names.0, ["Counter", "Counter.Get", "Counter.Incr", "New"]);
    }
}
