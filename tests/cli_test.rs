use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_cli_checkout_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("checkout")
        .arg("--catalog")
        .arg("tests/fixtures/products.csv")
        .arg("--cart-id")
        .arg("1")
        .arg("--buyer-id")
        .arg("1")
        .arg("--product-ids")
        .arg("1,2,3")
        .arg("--seed")
        .arg("cart-1");

    let output = cmd.output()?;
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(result["amount"], "60000");
    assert_eq!(
        result["order_name"],
        "Mechanical Keyboard, Wireless Mouse, USB-C Hub"
    );
    assert_eq!(result["order_id"].as_str().map(str::len), Some(36));

    Ok(())
}

#[test]
fn test_cli_checkout_skips_malformed_rows() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "id, seller_id, name, amount").unwrap();
    writeln!(csv, "1, 1, Lamp, 15000").unwrap();
    writeln!(csv, "2, 1, Broken, -5").unwrap();

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("checkout")
        .arg("--catalog")
        .arg(csv.path())
        .args(["--cart-id", "1", "--buyer-id", "1", "--product-ids", "1", "--seed", "s"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("15000"))
        .stderr(predicate::str::contains("Skipping malformed catalog row"));
}

#[test]
fn test_cli_checkout_unknown_product_fails() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("checkout")
        .arg("--catalog")
        .arg("tests/fixtures/products.csv")
        .args(["--cart-id", "1", "--buyer-id", "1", "--product-ids", "1,99", "--seed", "s"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("not found in the catalog"));
}

#[test]
fn test_cli_confirm_unknown_order_fails() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("confirm")
        .args(["--order-id", "missing", "--payment-key", "pk", "--amount", "1000"])
        .arg("--psp-url")
        .arg("http://127.0.0.1:9");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_cli_recover_with_nothing_pending() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("recover").arg("--psp-url").arg("http://127.0.0.1:9");

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["candidates"], 0);
}
