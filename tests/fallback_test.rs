use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn checkout(db_path: &std::path::Path) -> Command {
    let mut cmd = Command::new(cargo_bin!("payment-core"));
    cmd.arg("checkout")
        .arg("--catalog")
        .arg("tests/fixtures/products.csv")
        .args(["--cart-id", "1", "--buyer-id", "1", "--product-ids", "1", "--seed", "s"])
        .arg("--db-path")
        .arg(db_path);
    cmd
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();

    checkout(&dir.path().join("some_db"))
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled",
        ));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();

    checkout(&dir.path().join("test_db"))
        .assert()
        .success()
        .stderr(predicate::str::contains("Falling back").not());
}
