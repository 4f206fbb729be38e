//! Binary cache round-trip and corruption handling.

mod common;

use camino::Utf8Path;
use catalyst::error::BuildError;
use catalyst::{cache, manifest};
use common::TempCwd;
use serial_test::serial;
use std::fs;

/// Parse a manifest (with a depfile present) and snapshot it.
fn parsed_sandbox() -> catalyst::graph::Builder {
    fs::write("a.o.d", "a.o: a.c inc/foo.h\n").expect("depfile");
    fs::write(
        "catalyst.build",
        "DEF|cc|gcc\nDEF|cflags|-O2 -Wall\ncc|a.c|a.o\nld|a.o|app\n",
    )
    .expect("manifest");
    manifest::parse_text(Utf8Path::new("catalyst.build")).expect("parse")
}

#[test]
#[serial]
fn round_trip_preserves_everything() {
    let _cwd = TempCwd::enter();
    let original = parsed_sandbox();
    cache::write(&original).expect("emit snapshot");
    let loaded = cache::load().expect("load snapshot");

    assert_eq!(loaded.definitions(), original.definitions());

    let (old, new) = (original.graph(), loaded.graph());
    assert_eq!(new.nodes().len(), old.nodes().len());
    for (before, after) in old.nodes().iter().zip(new.nodes()) {
        assert_eq!(after.path, before.path);
        assert_eq!(after.out_edges, before.out_edges);
        assert_eq!(after.step_id, before.step_id);
    }
    assert_eq!(new.steps(), old.steps());
}

#[test]
#[serial]
fn absent_depfile_stays_absent_through_the_round_trip() {
    let _cwd = TempCwd::enter();
    fs::write("catalyst.build", "ld|a.o|app\n").expect("manifest");
    let original = manifest::parse_text(Utf8Path::new("catalyst.build")).expect("parse");
    assert!(original.graph().steps()[0].depfile_inputs.is_none());

    cache::write(&original).expect("emit snapshot");
    let loaded = cache::load().expect("load snapshot");
    assert!(loaded.graph().steps()[0].depfile_inputs.is_none());
}

#[test]
#[serial]
fn empty_depfile_stays_present_but_empty() {
    let _cwd = TempCwd::enter();
    fs::write("a.o.d", "").expect("empty depfile");
    fs::write("catalyst.build", "cc|a.c|a.o\n").expect("manifest");
    let original = manifest::parse_text(Utf8Path::new("catalyst.build")).expect("parse");
    assert_eq!(original.graph().steps()[0].depfile_inputs.as_deref(), Some(&[][..]));

    cache::write(&original).expect("emit snapshot");
    let loaded = cache::load().expect("load snapshot");
    assert_eq!(loaded.graph().steps()[0].depfile_inputs.as_deref(), Some(&[][..]));
}

#[test]
#[serial]
fn mismatched_magic_is_rejected() {
    let _cwd = TempCwd::enter();
    let builder = parsed_sandbox();
    cache::write(&builder).expect("emit snapshot");

    let mut bytes = fs::read(".catalyst.bin").expect("read snapshot");
    bytes[0] ^= 0xff;
    fs::write(".catalyst.bin", bytes).expect("corrupt snapshot");

    assert!(matches!(
        cache::load(),
        Err(BuildError::BinaryCacheInvalid(_))
    ));
}

#[test]
#[serial]
fn truncated_snapshot_is_rejected() {
    let _cwd = TempCwd::enter();
    let builder = parsed_sandbox();
    cache::write(&builder).expect("emit snapshot");

    let bytes = fs::read(".catalyst.bin").expect("read snapshot");
    fs::write(".catalyst.bin", &bytes[..bytes.len() / 2]).expect("truncate snapshot");

    assert!(matches!(
        cache::load(),
        Err(BuildError::BinaryCacheInvalid(_))
    ));
}

#[test]
#[serial]
fn missing_snapshot_is_rejected() {
    let _cwd = TempCwd::enter();
    assert!(matches!(
        cache::load(),
        Err(BuildError::BinaryCacheInvalid(_))
    ));
}

#[test]
#[serial]
fn freshness_requires_a_strictly_newer_snapshot() {
    let _cwd = TempCwd::enter();
    let builder = parsed_sandbox();
    cache::write(&builder).expect("emit snapshot");

    // Pin both files to the same instant: a tie is not fresh.
    let stamp = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
    for name in ["catalyst.build", ".catalyst.bin"] {
        fs::File::options()
            .write(true)
            .open(name)
            .expect("open")
            .set_modified(stamp)
            .expect("set mtime");
    }
    assert!(!cache::is_fresh(Utf8Path::new("catalyst.build")));

    fs::File::options()
        .write(true)
        .open(".catalyst.bin")
        .expect("open")
        .set_modified(stamp + std::time::Duration::from_secs(5))
        .expect("set mtime");
    assert!(cache::is_fresh(Utf8Path::new("catalyst.build")));
}

#[test]
#[serial]
fn missing_snapshot_is_never_fresh() {
    let _cwd = TempCwd::enter();
    fs::write("catalyst.build", "").expect("manifest");
    assert!(!cache::is_fresh(Utf8Path::new("catalyst.build")));
}
