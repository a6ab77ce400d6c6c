#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_finalized_order_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("orderpay_db");

    // First run: seed everything and finalize O1 through the webhook.
    let mut scenario1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        scenario1,
        r#"{{"type":"seed_tenant","tenant":{{"id":"t-1","name":"Cafe Centro","slug":"cafe-centro","secrets_encrypted":false,"legacy_access_token":"APP_USR-1","fulfillment":"on_payment"}}}}"#
    )
    .unwrap();
    writeln!(
        scenario1,
        r#"{{"type":"seed_order","order":{{"id":"O1","tenant_id":"t-1","order_number":1,"status":"pending","payment_status":"pending","total_amount":"1000","is_paid":false,"stock_deducted":false,"customer_email":"client@example.com","lines":[]}}}}"#
    )
    .unwrap();
    writeln!(
        scenario1,
        r#"{{"type":"seed_provider_payment","payment":{{"id":"P1","status":"approved","external_reference":"O1","transaction_amount":"1000"}}}}"#
    )
    .unwrap();
    writeln!(
        scenario1,
        r#"{{"type":"webhook","tenant_id":"t-1","payload":{{"data":{{"id":"P1"}}}}}}"#
    )
    .unwrap();

    let output1 = Command::new(cargo_bin!("orderpay"))
        .arg(scenario1.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("failed to execute first run");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains(r#""is_paid":true"#));

    // Second run over the same database: the poll short-circuits on the
    // recovered paid order without any provider payment registered.
    let mut scenario2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(scenario2, r#"{{"type":"poll","order_id":"O1"}}"#).unwrap();

    let output2 = Command::new(cargo_bin!("orderpay"))
        .arg(scenario2.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("failed to execute second run");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains(r#""status":"approved""#));
    assert!(stdout2.contains(r#""is_paid":true"#));
}
