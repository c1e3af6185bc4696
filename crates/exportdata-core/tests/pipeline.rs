//! Locator, section extractor and decoder working together, plus the
//! failure modes callers are expected to handle.

use exportdata_core::codec::{decode, decode_bytes, encode};
use exportdata_core::model::{BasicKind, Field, Param};
use exportdata_core::section::{write_archive, write_object};
use exportdata_core::{
    open_section, Error, Importer, Member, MemberKind, Namespace, PositionTable, SearchPath,
    SectionKind,
};
use pretty_assertions::assert_eq;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tempfile::TempDir;

/// `lib/shape` with `type Rect struct { W, H int }` and `func Area(r Rect) int`
fn shape_section() -> Vec<u8> {
    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    ns.declare_unit("lib/shape", "shape").unwrap();
    let int = ns.basic(BasicKind::Int);
    let rect = ns
        .declare_named("lib/shape", "Rect", Some(positions.position("shape.go", 4, 6)))
        .unwrap();
    let body = ns
        .types_mut()
        .struct_type(vec![Field::new("W", int), Field::new("H", int)]);
    ns.define_named(rect, body, Vec::new()).unwrap();
    let area = ns
        .types_mut()
        .signature(vec![Param::new("r", rect)], vec![Param::new("", int)], false);
    ns.insert_member("lib/shape", Member::new("Area", MemberKind::Func { sig: area }))
        .unwrap();
    ns.mark_complete("lib/shape").unwrap();
    encode(&ns, "lib/shape", &positions).unwrap().to_vec()
}

fn write_file(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_find_open_decode_archive() {
    let root = TempDir::new().unwrap();
    let mut archive = Vec::new();
    write_archive(&mut archive, "linux amd64", &shape_section()).unwrap();
    write_file(&root.path().join("lib/shape.a"), &archive);

    let search = SearchPath::new().with_root(root.path());
    let found = search.find("lib/shape", None).unwrap();
    assert_eq!(found.canonical_path, "lib/shape");

    let section = open_section(BufReader::new(File::open(&found.file).unwrap())).unwrap();
    assert!(matches!(section.kind(), SectionKind::Bounded { .. }));

    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    let unit = decode(section, &mut positions, &mut ns, &found.canonical_path).unwrap();
    assert_eq!(
        unit.members().map(Member::name).collect::<Vec<_>>(),
        ["Area", "Rect"]
    );
}

#[test]
fn test_object_file_with_trailing_data() {
    let root = TempDir::new().unwrap();
    let mut object = Vec::new();
    write_object(&mut object, "linux amd64", &shape_section()).unwrap();
    object.extend_from_slice(&[0xCC; 256]); // object code after the end marker
    write_file(&root.path().join("lib/shape.o"), &object);

    let mut importer = Importer::new(SearchPath::new().with_root(root.path()));
    let unit = importer.import("lib/shape", None).unwrap();
    assert!(unit.is_complete());
    assert_eq!(unit.len(), 2);
}

#[test]
fn test_vendored_import_through_importer() {
    let root = TempDir::new().unwrap();
    let mut archive = Vec::new();
    write_archive(&mut archive, "linux amd64", &shape_section()).unwrap();
    write_file(&root.path().join("app/vendor/lib/shape.a"), &archive);

    let origin = root.path().join("app/cmd");
    let mut importer = Importer::new(SearchPath::new().with_root(root.path()));

    // the file records "lib/shape", the vendored path is what gets decoded
    let unit = importer.import("lib/shape", Some(&origin)).unwrap();
    assert_eq!(unit.path(), "app/vendor/lib/shape");
    assert!(importer.namespace().unit("lib/shape").is_none());
}

#[test]
fn test_locator_absence() {
    let root = TempDir::new().unwrap();
    let search = SearchPath::new().with_root(root.path());
    assert_eq!(search.find("no/such/unit", None), None);

    let mut importer = Importer::new(search);
    match importer.import("no/such/unit", None) {
        Err(Error::NotFound { import_path }) => assert_eq!(import_path, "no/such/unit"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_unsupported_version_is_distinguishable() {
    let mut data = shape_section();
    data[1] = 7;

    let mut ns = Namespace::new();
    let err = decode_bytes(&data, &mut PositionTable::new(), &mut ns, "lib/shape").unwrap_err();
    match &err {
        Error::UnsupportedVersion { unit, tag } => {
            assert_eq!(unit.as_deref(), Some("lib/shape"));
            assert_eq!(tag, b"i7");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_unsupported_version());
    assert!(ns.unit("lib/shape").is_none());

    // retired formats are rejected the same way
    data[0] = b'c';
    let err = decode_bytes(&data, &mut PositionTable::new(), &mut ns, "lib/shape").unwrap_err();
    assert!(err.is_unsupported_version());
}

#[test]
fn test_truncation_never_completes_a_unit() {
    let data = shape_section();
    for cut in 0..data.len() {
        let mut ns = Namespace::new();
        let mut positions = PositionTable::new();
        let err = decode_bytes(&data[..cut], &mut positions, &mut ns, "lib/shape").unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "cut at {cut}: {err}");
        assert!(
            ns.unit("lib/shape").map_or(true, |u| !u.is_complete()),
            "cut at {cut} left a complete unit"
        );
    }
}

#[test]
fn test_decode_over_complete_unit() {
    let data = shape_section();
    let mut ns = Namespace::new();
    let mut positions = PositionTable::new();
    decode_bytes(&data, &mut positions, &mut ns, "lib/shape").unwrap();
    let before = ns.unit("lib/shape").unwrap().clone();
    let types_before = ns.types().len();

    let err = decode_bytes(&data, &mut positions, &mut ns, "lib/shape").unwrap_err();
    assert!(matches!(err, Error::Consistency { .. }), "{err}");
    assert_eq!(ns.unit("lib/shape").unwrap(), &before);
    assert_eq!(ns.types().len(), types_before);
}

#[test]
fn test_textual_export_data_is_unsupported() {
    let file = b"go object linux amd64\n\n$$\npackage shape\n$$\n";
    let err = open_section(&file[..]).unwrap_err();
    assert!(err.is_unsupported_version(), "{err}");
}
