//! Runs the `trackme` binary against scratch files.

use std::path::Path;
use std::process::{Command, Output};

fn trackme(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_trackme"))
        .current_dir(dir)
        .args(["--config", "absent.toml", "--log-level", "error"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_convert_then_dump() {
    let dir = tempfile::tempdir().unwrap();
    let text = "16\t0\t0\t0\t0\n1\t1000\t0.1\t0.2\t9.8\n\n2\t1010\t-1.5\t0\t3\n32\t0\t0\t0\t0\n";
    std::fs::write(dir.path().join("walk.txt"), text).unwrap();

    let converted = trackme(dir.path(), &["convert", "walk.txt", "walk.sns"]);
    assert!(converted.status.success(), "{converted:?}");
    let bytes = std::fs::read(dir.path().join("walk.sns")).unwrap();
    assert_eq!(bytes.len(), 4 * 25);

    let dumped = trackme(dir.path(), &["dump", "walk.sns"]);
    assert!(dumped.status.success(), "{dumped:?}");
    let stdout = String::from_utf8(dumped.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "16\t0\t0\t0\t0",
            "1\t1000\t0.1\t0.2\t9.8",
            "2\t1010\t-1.5\t0\t3",
            "32\t0\t0\t0\t0",
        ]
    );
}

#[test]
fn test_convert_reports_bad_line() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.txt"), "16\t0\t0\t0\t0\n1\t1000\tx\t0\t0\n").unwrap();

    let output = trackme(dir.path(), &["convert", "bad.txt", "bad.sns"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("bad.txt:2"), "{stderr}");
    assert!(!dir.path().join("bad.sns").exists());
}

#[test]
fn test_record_synthetic_session() {
    let dir = tempfile::tempdir().unwrap();
    let output = trackme(
        dir.path(),
        &[
            "record",
            "--output",
            "out",
            "--name",
            "run.sns",
            "--samples",
            "20",
            "--seed",
            "9",
        ],
    );
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8(output.stdout).unwrap();
    // 3 configured sources by default: 20 samples plus Start and Stop.
    assert!(stdout.contains("Recorded 22 events"), "{stdout}");

    let bytes = std::fs::read(dir.path().join("out").join("run.sns")).unwrap();
    assert_eq!(bytes.len(), 22 * 25);
}
