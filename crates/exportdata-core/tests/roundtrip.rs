//! Encode/decode behaviour over whole unit graphs.

use exportdata_core::codec::{decode_bytes, encode};
use exportdata_core::model::{
    BasicKind, ConstValue, Field, Integer, Method, Param, Rational, TypeKind,
};
use exportdata_core::{Member, MemberKind, Namespace, PositionTable, TypeId, UnitPrinter};
use pretty_assertions::assert_eq;

/// `func Add(a, b int) int` and `type Point struct { X, Y int }`
fn geom(ns: &mut Namespace, positions: &mut PositionTable) {
    ns.declare_unit("x/geom", "geom").unwrap();
    let int = ns.basic(BasicKind::Int);

    let point = ns
        .declare_named("x/geom", "Point", Some(positions.position("geom.go", 3, 6)))
        .unwrap();
    let body = ns
        .types_mut()
        .struct_type(vec![Field::new("X", int), Field::new("Y", int)]);
    ns.define_named(point, body, Vec::new()).unwrap();

    let add = ns.types_mut().signature(
        vec![Param::new("a", int), Param::new("b", int)],
        vec![Param::new("", int)],
        false,
    );
    ns.insert_member(
        "x/geom",
        Member::new("Add", MemberKind::Func { sig: add })
            .with_pos(positions.position("geom.go", 8, 6)),
    )
    .unwrap();
    ns.mark_complete("x/geom").unwrap();
}

fn decode_fresh(data: &[u8], path: &str) -> (Namespace, PositionTable) {
    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    decode_bytes(data, &mut positions, &mut ns, path).unwrap();
    (ns, positions)
}

fn listing(ns: &Namespace, positions: &PositionTable, path: &str) -> String {
    let config = exportdata_core::PrinterConfig::new().show_positions(true);
    UnitPrinter::with_config(config).render(ns, positions, ns.unit(path).unwrap())
}

#[test]
fn test_add_and_point() {
    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    geom(&mut ns, &mut positions);
    let data = encode(&ns, "x/geom", &positions).unwrap();

    let (ns2, positions2) = decode_fresh(&data, "x/geom");
    let unit = ns2.unit("x/geom").unwrap();
    assert!(unit.is_complete());
    assert_eq!(unit.name(), "geom");
    assert_eq!(
        unit.members().map(Member::name).collect::<Vec<_>>(),
        ["Add", "Point"]
    );

    let types = ns2.types();
    let int = ns2.basic(BasicKind::Int);

    let add = types
        .get(unit.member("Add").unwrap().ty())
        .and_then(TypeKind::as_signature)
        .unwrap();
    assert_eq!(
        add.params.iter().map(|p| (p.name.as_str(), p.ty)).collect::<Vec<_>>(),
        [("a", int), ("b", int)]
    );
    assert_eq!(add.results.len(), 1);
    assert_eq!(add.results[0].ty, int);
    assert!(!add.variadic);

    let point = types.named(unit.member("Point").unwrap().ty()).unwrap();
    let Some(TypeKind::Struct { fields }) = point.underlying.and_then(|id| types.get(id)) else {
        panic!("Point is not a struct");
    };
    assert_eq!(
        fields.iter().map(|f| (f.name.as_str(), f.ty)).collect::<Vec<_>>(),
        [("X", int), ("Y", int)]
    );

    assert_eq!(types.placeholders().count(), 0);
    assert_eq!(
        listing(&ns, &positions, "x/geom"),
        listing(&ns2, &positions2, "x/geom")
    );
}

#[test]
fn test_encoding_is_reproducible() {
    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    geom(&mut ns, &mut positions);

    let first = encode(&ns, "x/geom", &positions).unwrap();
    assert_eq!(first, encode(&ns, "x/geom", &positions).unwrap());

    let (ns2, positions2) = decode_fresh(&first, "x/geom");
    let second = encode(&ns2, "x/geom", &positions2).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_named_identity_is_shared() {
    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    geom(&mut ns, &mut positions);

    let point = ns.unit("x/geom").unwrap().member("Point").unwrap().ty();
    let ptr = ns.types_mut().pointer(point);
    let origin = ns.types_mut().signature(Vec::new(), vec![Param::new("", point)], false);
    // a second unit with two members reaching Point by different routes
    ns.declare_unit("x/draw", "draw").unwrap();
    ns.set_imports("x/draw", vec!["x/geom".into()]).unwrap();
    ns.insert_member("x/draw", Member::new("Cursor", MemberKind::Var { ty: ptr }))
        .unwrap();
    ns.insert_member("x/draw", Member::new("Origin", MemberKind::Func { sig: origin }))
        .unwrap();
    ns.mark_complete("x/draw").unwrap();

    let geom_data = encode(&ns, "x/geom", &positions).unwrap();
    let draw_data = encode(&ns, "x/draw", &positions).unwrap();

    // dependent first: x/geom is forward-declared and its Point filled in
    let mut ns2 = Namespace::new();
    let mut positions2 = PositionTable::new();
    let draw = decode_bytes(&draw_data, &mut positions2, &mut ns2, "x/draw").unwrap();
    assert_eq!(draw.imports(), ["x/geom"]);
    let cursor = draw.member("Cursor").unwrap().ty();
    let origin = draw.member("Origin").unwrap().ty();
    assert!(!ns2.unit("x/geom").unwrap().is_complete());

    let types = ns2.types();
    let Some(&TypeKind::Pointer(via_cursor)) = types.get(cursor) else {
        panic!("Cursor is not a pointer");
    };
    let via_origin = types.get(origin).and_then(TypeKind::as_signature).unwrap().results[0].ty;
    assert_eq!(via_cursor, via_origin);

    // decoding the dependency afterwards keeps the node
    let geom = decode_bytes(&geom_data, &mut positions2, &mut ns2, "x/geom").unwrap();
    assert!(geom.is_complete());
    assert_eq!(geom.member("Point").unwrap().ty(), via_cursor);
    assert_eq!(ns2.types().placeholders().count(), 0);
}

#[test]
fn test_mutually_recursive_structs() {
    let mut ns = Namespace::new();
    let positions = PositionTable::new();
    ns.declare_unit("x/graph", "graph").unwrap();
    let a = ns.declare_named("x/graph", "A", None).unwrap();
    let b = ns.declare_named("x/graph", "B", None).unwrap();
    let to_b = ns.types_mut().pointer(b);
    let to_a = ns.types_mut().pointer(a);
    let a_body = ns.types_mut().struct_type(vec![Field::new("B", to_b)]);
    let b_body = ns.types_mut().struct_type(vec![Field::new("A", to_a)]);
    ns.define_named(a, a_body, Vec::new()).unwrap();
    ns.define_named(b, b_body, Vec::new()).unwrap();
    ns.mark_complete("x/graph").unwrap();

    let data = encode(&ns, "x/graph", &positions).unwrap();
    let (ns2, _) = decode_fresh(&data, "x/graph");
    let unit = ns2.unit("x/graph").unwrap();
    let types = ns2.types();

    let field_target = |named: TypeId| -> TypeId {
        let body = types.named(named).unwrap().underlying.unwrap();
        let Some(TypeKind::Struct { fields }) = types.get(body) else {
            panic!("not a struct");
        };
        let Some(&TypeKind::Pointer(target)) = types.get(fields[0].ty) else {
            panic!("not a pointer");
        };
        target
    };

    let a2 = unit.member("A").unwrap().ty();
    let b2 = unit.member("B").unwrap().ty();
    assert_eq!(field_target(a2), b2);
    assert_eq!(field_target(b2), a2);
    assert_eq!(types.placeholders().count(), 0);
}

#[test]
fn test_every_member_kind() {
    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    ns.declare_unit("x/kitchen", "kitchen").unwrap();

    let int = ns.basic(BasicKind::Int);
    let string = ns.basic(BasicKind::String);
    let err = ns.basic(BasicKind::Error);

    let reader = ns
        .declare_named("x/kitchen", "Reader", Some(positions.position("k.go", 1, 6)))
        .unwrap();
    let byte = ns.basic(BasicKind::Uint8);
    let bytes = ns.types_mut().slice(byte);
    let read_sig = ns.types_mut().signature(
        vec![Param::new("p", bytes)],
        vec![Param::new("n", int), Param::new("err", err)],
        false,
    );
    let iface = ns.types_mut().alloc(TypeKind::Interface {
        methods: vec![exportdata_core::model::InterfaceMethod {
            name: "Read".into(),
            sig: read_sig,
        }],
        embedded: Vec::new(),
    });
    ns.define_named(reader, iface, Vec::new()).unwrap();

    let counter = ns.declare_named("x/kitchen", "Counter", None).unwrap();
    let incr = ns.types_mut().signature(Vec::new(), Vec::new(), false);
    ns.define_named(
        counter,
        int,
        vec![Method {
            name: "Incr".into(),
            sig: incr,
            pointer_receiver: true,
            pos: Some(positions.position("k.go", 9, 1)),
        }],
    )
    .unwrap();

    let map = ns.types_mut().alloc(TypeKind::Map {
        key: string,
        value: counter,
    });
    let chan = ns.types_mut().alloc(TypeKind::Chan {
        dir: exportdata_core::model::ChanDir::Send,
        elem: reader,
    });
    let array = ns.types_mut().alloc(TypeKind::Array { len: 3, elem: chan });
    let strings = ns.types_mut().slice(string);
    let printf = ns.types_mut().signature(
        vec![Param::new("format", string), Param::new("args", strings)],
        Vec::new(),
        true,
    );

    let big = Integer::from_parts(false, vec![1; 20]);
    let third = Rational::new(Integer::from(1i64), Integer::from(3i64)).unwrap();
    let members = [
        Member::new(
            "Big",
            MemberKind::Const {
                ty: ns.basic(BasicKind::UntypedInt),
                value: ConstValue::Int(big),
            },
        ),
        Member::new(
            "Third",
            MemberKind::Const {
                ty: ns.basic(BasicKind::UntypedFloat),
                value: ConstValue::Float(third.clone()),
            },
        ),
        Member::new(
            "I",
            MemberKind::Const {
                ty: ns.basic(BasicKind::UntypedComplex),
                value: ConstValue::Complex {
                    re: Rational::integer(Integer::zero()),
                    im: third,
                },
            },
        ),
        Member::new(
            "Greeting",
            MemberKind::Const {
                ty: string,
                value: ConstValue::String("héllo".into()),
            },
        ),
        Member::new(
            "Debug",
            MemberKind::Const {
                ty: ns.basic(BasicKind::Bool),
                value: ConstValue::Bool(true),
            },
        ),
        Member::new("Registry", MemberKind::Var { ty: map }),
        Member::new("pipes", MemberKind::Var { ty: array }),
        Member::new("Printf", MemberKind::Func { sig: printf })
            .with_pos(positions.position("print.go", 20, 6)),
        Member::new("Text", MemberKind::Alias { target: string }),
    ];
    for member in members {
        ns.insert_member("x/kitchen", member).unwrap();
    }
    ns.mark_complete("x/kitchen").unwrap();

    let data = encode(&ns, "x/kitchen", &positions).unwrap();
    let (ns2, positions2) = decode_fresh(&data, "x/kitchen");

    assert_eq!(
        listing(&ns, &positions, "x/kitchen"),
        listing(&ns2, &positions2, "x/kitchen")
    );

    let unit = ns2.unit("x/kitchen").unwrap();
    match unit.member("Big").unwrap().kind() {
        MemberKind::Const {
            value: ConstValue::Int(v),
            ..
        } => assert_eq!(v.magnitude(), &[1; 20]),
        other => panic!("unexpected member {other:?}"),
    }
    let counter = ns2.types().named(unit.member("Counter").unwrap().ty()).unwrap();
    assert_eq!(counter.methods.len(), 1);
    assert!(counter.methods[0].pointer_receiver);
    assert_eq!(
        positions2.display(counter.methods[0].pos.unwrap()).to_string(),
        "k.go:9:1"
    );
}
