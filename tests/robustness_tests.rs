use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::NamedTempFile;

mod common;

#[test]
fn test_malformed_rows_are_skipped() {
    let file = NamedTempFile::new().unwrap();
    let mut wtr = csv::Writer::from_path(file.path()).unwrap();
    wtr.write_record(common::HEADER).unwrap();

    wtr.write_record(["register", "1", "A", "100", "", "", "", ""]).unwrap();
    // unknown operation
    wtr.write_record(["refund", "1", "", "1.0", "", "", "", ""]).unwrap();
    // text in amount field
    wtr.write_record(["apply_payment", "1", "", "ten", "", "", "", ""]).unwrap();
    // missing debtor
    wtr.write_record(["register", "2", "", "100", "", "", "", ""]).unwrap();
    // non-positive amount
    wtr.write_record(["apply_payment", "1", "", "-5", "", "", "", ""]).unwrap();
    // valid payment
    wtr.write_record(["apply_payment", "1", "", "40", "", "", "", ""]).unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("alacak360"));
    cmd.arg("process").arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading request"))
        .stderr(predicate::str::contains("Error processing request"))
        .stdout(predicate::str::contains("1,A,TRY,100,60,40,OPEN,,1,2"))
        .stdout(predicate::str::contains("\n2,").not());
}

#[test]
fn test_overpayment_and_unknown_case() {
    let file = NamedTempFile::new().unwrap();
    let mut wtr = csv::Writer::from_path(file.path()).unwrap();
    wtr.write_record(common::HEADER).unwrap();
    wtr.write_record(["register", "B", "B", "100", "", "", "", ""]).unwrap();
    wtr.write_record(["apply_payment", "B", "", "150", "", "", "", ""]).unwrap();
    wtr.write_record(["begin_collection", "ZZZ", "", "", "", "", "", ""]).unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("alacak360"));
    cmd.arg("process").arg(file.path()).env_remove("RUST_LOG");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("exceeds outstanding balance"))
        .stderr(predicate::str::contains("Case not found: ZZZ"))
        .stdout(predicate::str::contains("B,B,TRY,100,100,0,OPEN,,0,1"));

    // one log line per rejected row
    let output = cmd.output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("exceeds outstanding balance").count(), 1);
    assert_eq!(stderr.matches("Case not found: ZZZ").count(), 1);
}

#[test]
fn test_dashboard_beyond_decimal_range_reports_error() {
    let file = NamedTempFile::new().unwrap();
    let mut wtr = csv::Writer::from_path(file.path()).unwrap();
    wtr.write_record(common::HEADER).unwrap();
    for case in ["A", "B"] {
        wtr.write_record(["register", case, case, "50000000000000000000000000000", "", "", "", ""])
            .unwrap();
    }
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("alacak360"));
    cmd.arg("process").arg(file.path()).arg("--report").arg("dashboard");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("exceeds the representable decimal range"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn test_missing_input_file_fails() {
    let mut cmd = Command::new(cargo_bin!("alacak360"));
    cmd.arg("process").arg("does/not/exist.csv");
    cmd.assert().failure();
}
