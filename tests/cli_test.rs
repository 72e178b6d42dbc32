use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

type STDRESULT = Result<(), Box<dyn std::error::Error>>;

fn archive_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    dir.path().join("store.bin")
}

#[test]
fn init_creates_a_fresh_archive() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    Command::cargo_bin("archivefs")?.arg("init").arg(&path).assert().success();
    assert!(path.exists());
    Ok(())
}

#[test]
fn add_then_get_round_trips_literal_content() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    Command::cargo_bin("archivefs")?.arg("init").arg(&path).assert().success();
    Command::cargo_bin("archivefs")?
        .arg("add")
        .arg(&path)
        .arg("greeting.txt")
        .arg("hello, archive")
        .assert()
        .success();
    Command::cargo_bin("archivefs")?
        .arg("get")
        .arg(&path)
        .arg("greeting.txt")
        .assert()
        .success()
        .stdout("hello, archive");
    Ok(())
}

#[test]
fn addfile_reads_content_from_a_source_path() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    let src = dir.path().join("input.bin");
    std::fs::write(&src, b"binary payload \x00\x01\x02")?;

    Command::cargo_bin("archivefs")?.arg("init").arg(&path).assert().success();
    Command::cargo_bin("archivefs")?
        .arg("addfile")
        .arg(&path)
        .arg("input.bin")
        .arg(&src)
        .assert()
        .success();
    Command::cargo_bin("archivefs")?
        .arg("get")
        .arg(&path)
        .arg("input.bin")
        .assert()
        .success()
        .stdout(predicate::eq(b"binary payload \x00\x01\x02".as_slice()));
    Ok(())
}

#[test]
fn list_reports_every_entry_with_sizes() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    Command::cargo_bin("archivefs")?.arg("init").arg(&path).assert().success();
    Command::cargo_bin("archivefs")?.arg("add").arg(&path).arg("b").arg("xx").assert().success();
    Command::cargo_bin("archivefs")?.arg("add").arg(&path).arg("a").arg("y").assert().success();

    Command::cargo_bin("archivefs")?
        .arg("list")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("a\t1\t").and(predicate::str::contains("b\t2\t")));
    Ok(())
}

#[test]
fn duplicate_name_exits_with_code_two() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    Command::cargo_bin("archivefs")?.arg("init").arg(&path).assert().success();
    Command::cargo_bin("archivefs")?.arg("add").arg(&path).arg("dup").arg("first").assert().success();
    Command::cargo_bin("archivefs")?.arg("add").arg(&path).arg("dup").arg("second").assert().code(2);
    Ok(())
}

#[test]
fn missing_name_exits_with_code_three() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    Command::cargo_bin("archivefs")?.arg("init").arg(&path).assert().success();
    Command::cargo_bin("archivefs")?.arg("get").arg(&path).arg("ghost").assert().code(3);
    Ok(())
}

#[test]
fn bad_magic_exits_with_code_four() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    std::fs::write(&path, b"not an archive at all, just junk bytes")?;
    Command::cargo_bin("archivefs")?.arg("list").arg(&path).assert().code(4);
    Ok(())
}

#[test]
fn name_too_long_exits_with_code_six() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let path = archive_path(&dir);
    Command::cargo_bin("archivefs")?.arg("init").arg(&path).assert().success();
    let long_name = "n".repeat(100);
    Command::cargo_bin("archivefs")?.arg("add").arg(&path).arg(&long_name).arg("x").assert().code(6);
    Ok(())
}
