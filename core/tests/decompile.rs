//! End-to-end runs over synthetic artifacts.

mod common;

use std::fs;

use declass::apk::{process_apk, process_dex};
use declass::jar::{process_class_file, process_jar};
use declass::task::TaskKind;
use declass_dex::Dex;

use common::{build_class_file, build_dex, build_zip, scratch_dir, FixtureClass};

const RETURN_VOID: &[u16] = &[0x000e];

#[test]
fn class_def_names_match_the_fixture() {
    let bytes = build_dex(&[
        FixtureClass::new("La;"),
        FixtureClass::new("Lb/C;"),
        FixtureClass::new("Lb/C$D;"),
    ]);
    let dex = Dex::parse(bytes).unwrap();

    let names: Vec<String> = dex
        .class_defs
        .iter()
        .map(|c| c.descriptor(&dex).unwrap().into_owned())
        .collect();
    assert_eq!(names, ["La;", "Lb/C;", "Lb/C$D;"]);
}

#[test]
fn empty_void_method_elides_to_empty_body() {
    let dir = scratch_dir("empty-body");
    let dex_path = dir.join("input.dex");
    fs::write(
        &dex_path,
        build_dex(&[FixtureClass::new("La;").method("m", 1, RETURN_VOID)]),
    )
    .unwrap();

    let out = dir.join("out");
    let summary = process_dex(&dex_path, &out, TaskKind::Decompile, 2).unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.done, 1);

    let text = fs::read_to_string(out.join("a.java")).unwrap();
    assert!(text.contains("class a"), "{text}");
    assert!(text.contains("m() { }"), "{text}");
}

#[test]
fn smali_mode_emits_golden_body() {
    let dir = scratch_dir("smali-golden");
    let dex_path = dir.join("input.dex");
    fs::write(
        &dex_path,
        build_dex(&[FixtureClass::new("La;").method("m", 1, RETURN_VOID)]),
    )
    .unwrap();

    let out = dir.join("out");
    process_dex(&dex_path, &out, TaskKind::Smali, 1).unwrap();

    let text = fs::read_to_string(out.join("a.smali")).unwrap();
    assert!(
        text.contains(".method public static m()V\n    .registers 1\n    return-void\n.end method"),
        "{text}"
    );
}

#[test]
fn inner_classes_render_inside_their_declaring_file() {
    let dir = scratch_dir("inner-inline");
    let dex_path = dir.join("input.dex");
    fs::write(
        &dex_path,
        build_dex(&[
            FixtureClass::new("Lp/B;").method("m", 1, RETURN_VOID),
            FixtureClass::new("Lp/B$C;").method("n", 1, RETURN_VOID),
            FixtureClass::new("Lp/B$1;").method("o", 1, RETURN_VOID),
        ]),
    )
    .unwrap();

    let out = dir.join("out");
    let summary = process_dex(&dex_path, &out, TaskKind::Decompile, 2).unwrap();
    // only the top-level class is scheduled
    assert_eq!(summary.added, 1);
    assert_eq!(summary.done, 1);

    assert!(out.join("p/B.java").exists());
    assert!(!out.join("p/B$C.java").exists());
    assert!(!out.join("p/B$1.java").exists());

    let text = fs::read_to_string(out.join("p/B.java")).unwrap();
    assert!(text.contains("class C"), "{text}");
}

#[test]
fn smali_mode_schedules_every_class() {
    let dir = scratch_dir("smali-all");
    let dex_path = dir.join("input.dex");
    fs::write(
        &dex_path,
        build_dex(&[
            FixtureClass::new("Lp/B;").method("m", 1, RETURN_VOID),
            FixtureClass::new("Lp/B$C;").method("n", 1, RETURN_VOID),
        ]),
    )
    .unwrap();

    let out = dir.join("out");
    let summary = process_dex(&dex_path, &out, TaskKind::Smali, 2).unwrap();
    assert_eq!(summary.added, 2);
    assert_eq!(summary.done, 2);
    assert!(out.join("p/B.smali").exists());
    assert!(out.join("p/B$C.smali").exists());
}

#[test]
fn apk_accounting_spans_all_dex_entries() {
    let dex_one = build_dex(&[
        FixtureClass::new("La/A;").method("m", 1, RETURN_VOID),
        FixtureClass::new("La/A$1;").method("m", 1, RETURN_VOID),
        FixtureClass::new("La/B;").method("m", 1, RETURN_VOID),
    ]);
    let dex_two = build_dex(&[
        FixtureClass::new("Lb/C;").method("m", 1, RETURN_VOID),
        FixtureClass::new("Lb/D;").method("m", 1, RETURN_VOID),
    ]);
    let apk = build_zip(&[
        ("classes.dex", dex_one.as_slice()),
        ("classes2.dex", dex_two.as_slice()),
        ("resources.arsc", b"not code"),
    ]);

    let dir = scratch_dir("apk-accounting");
    let apk_path = dir.join("input.apk");
    fs::write(&apk_path, apk).unwrap();

    let out = dir.join("out");
    let summary = process_apk(&apk_path, &out, TaskKind::Decompile, 8).unwrap();
    // the anonymous class is folded into its declaring class's task
    assert_eq!(summary.added, 4);
    assert_eq!(summary.done, 4);

    for file in ["a/A.java", "a/B.java", "b/C.java", "b/D.java"] {
        assert!(out.join(file).exists(), "missing {file}");
    }
}

#[test]
fn big_endian_dex_fails_before_any_output() {
    let mut bytes = build_dex(&[FixtureClass::new("La;")]);
    bytes[40..44].copy_from_slice(&0x78563412u32.to_le_bytes());

    let dir = scratch_dir("big-endian");
    let dex_path = dir.join("input.dex");
    fs::write(&dex_path, bytes).unwrap();

    let out = dir.join("out");
    assert!(process_dex(&dex_path, &out, TaskKind::Decompile, 1).is_err());
    assert!(!out.exists());
}

#[test]
fn unknown_opcode_degrades_one_method_to_a_stub() {
    // 0x73 is an unused opcode value
    let dir = scratch_dir("lifter-fallback");
    let dex_path = dir.join("input.dex");
    fs::write(
        &dex_path,
        build_dex(&[FixtureClass::new("La;")
            .method("bad", 1, &[0x0073, 0x000e])
            .method("good", 1, RETURN_VOID)]),
    )
    .unwrap();

    let out = dir.join("out");
    let summary = process_dex(&dex_path, &out, TaskKind::Decompile, 1).unwrap();
    assert_eq!(summary.done, 1);

    let text = fs::read_to_string(out.join("a.java")).unwrap();
    assert!(text.contains("can't decompile"), "{text}");
    assert!(text.contains("good() { }"), "{text}");
}

#[test]
fn jar_entries_decompile_independently() {
    let class_a = build_class_file("p/A", &[("m", &[0xb1])]);
    let class_b = build_class_file("q/B", &[("m", &[0xb1])]);
    let jar = build_zip(&[
        ("p/A.class", class_a.as_slice()),
        ("q/B.class", class_b.as_slice()),
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
    ]);

    let dir = scratch_dir("jar");
    let jar_path = dir.join("input.jar");
    fs::write(&jar_path, jar).unwrap();

    let out = dir.join("out");
    let summary = process_jar(&jar_path, &out, 100).unwrap();
    assert_eq!(summary.added, 2);
    assert_eq!(summary.done, 2);

    let text = fs::read_to_string(out.join("p/A.java")).unwrap();
    assert!(text.contains("package p;"), "{text}");
    assert!(text.contains("m() { }"), "{text}");
    assert!(out.join("q/B.java").exists());
}

#[test]
fn single_class_file_decompiles_without_a_pool() {
    let dir = scratch_dir("single-class");
    let class_path = dir.join("A.class");
    fs::write(&class_path, build_class_file("p/A", &[("m", &[0xb1])])).unwrap();

    let out = dir.join("out");
    process_class_file(&class_path, &out).unwrap();

    let text = fs::read_to_string(out.join("p/A.java")).unwrap();
    assert!(text.contains("class A"), "{text}");
}

#[test]
fn arithmetic_folds_and_branches_structure() {
    // static int-ish: const/4 v0, 2; const/4 v1, 3; add-int v0, v0, v1;
    // if-eqz v0, :ret; const/4 v0, 1; :ret return-void
    let units: &[u16] = &[
        0x2012, // const/4 v0, 2
        0x3112, // const/4 v1, 3
        0x0090, 0x0100, // add-int v0, v0, v1
        0x0038, 0x0003, // if-eqz v0, +3
        0x1012, // const/4 v0, 1
        0x000e, // return-void
    ];
    let dir = scratch_dir("folding");
    let dex_path = dir.join("input.dex");
    fs::write(
        &dex_path,
        build_dex(&[FixtureClass::new("La;").method("m", 2, units)]),
    )
    .unwrap();

    let out = dir.join("out");
    process_dex(&dex_path, &out, TaskKind::Decompile, 1).unwrap();

    let text = fs::read_to_string(out.join("a.java")).unwrap();
    // 2 + 3 folds to 5 before the branch reads it
    assert!(text.contains("v0 = 5;"), "{text}");
    assert!(text.contains("if ("), "{text}");
}
