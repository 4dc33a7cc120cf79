//! CLI smoke tests for the ms binary

use assert_cmd::Command;
use predicates::prelude::*;

fn ms(db: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("ms").expect("ms binary");
    cmd.arg("--db").arg(db);
    cmd
}

#[test]
fn test_keywords_add_list_delete() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memory.sqlite");

    ms(&db)
        .args(["keywords", "add", "Press And Hold"])
        .assert()
        .success()
        .stdout(predicate::str::contains("press and hold"));

    ms(&db)
        .args(["keywords", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("press and hold"))
        // defaults are seeded alongside
        .stdout(predicate::str::contains("captcha"));

    ms(&db)
        .args(["keywords", "delete", "press and hold"])
        .assert()
        .success();

    ms(&db)
        .args(["keywords", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("press and hold").not());
}

#[test]
fn test_search_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memory.sqlite");

    ms(&db)
        .args(["search", "anything"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no matches"));
}

#[test]
fn test_show_missing_record() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memory.sqlite");

    ms(&db)
        .args(["show", "nope"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no record"));
}
