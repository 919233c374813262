use std::fs;

use assert_cmd::Command;
use pretty_assertions::assert_eq;

const INPUT: &str = "\
# cpu readings
cpu,region=us-west,host=serverA value=1.0,count=2 1000000000

mem,host=serverA free=100 2000000000
";

fn lp() -> Command {
    let mut cmd = Command::cargo_bin("lp").unwrap();
    cmd.env_remove("LOG_FILTER")
        .env_remove("LP_PRECISION")
        .env_remove("LP_OUTPUT_PRECISION");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().clone();
    String::from_utf8(output.stdout).unwrap()
}

fn stderr_of_failure(cmd: &mut Command) -> String {
    let output = cmd.assert().failure().get_output().clone();
    String::from_utf8(output.stderr).unwrap()
}

#[test]
fn canonicalizes_stdin() {
    let input = "cpu,host=a,region=b value=1 10\nmem,zone=z,app=x free=2.5,used=1 20\n";
    let out = stdout_of(lp().arg("parse").write_stdin(input));
    assert_eq!(
        out,
        "cpu,host=a,region=b value=1 10\nmem,app=x,zone=z free=2.5,used=1 20\n"
    );
}

#[test]
fn reads_file_and_converts_precision() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.lp");
    fs::write(&path, "cpu value=1 1500\n").unwrap();

    let out = stdout_of(
        lp().args(["parse", "--precision", "ms", "--output-precision", "s"])
            .arg(&path),
    );
    assert_eq!(out, "cpu value=1 1\n");

    let out = stdout_of(lp().args(["parse", "--precision", "ms"]).arg(&path));
    assert_eq!(out, "cpu value=1 1500\n");
}

#[test]
fn series_keys() {
    let out = stdout_of(
        lp().args(["parse", "--keys"])
            .write_stdin("cpu,b=2,a=1 value=1 1\nweather\\ report,city=New\\ York temp=3 2\n"),
    );
    assert_eq!(out, "cpu,a=1,b=2\nweather\\ report,city=New\\ York\n");
}

#[test]
fn default_time_fills_missing_timestamps() {
    let out = stdout_of(
        lp().args([
            "parse",
            "--default-time",
            "1970-01-01T00:00:01Z",
            "--output-precision",
            "s",
        ])
        .write_stdin("cpu value=1\ncpu value=2 5000000000\n"),
    );
    assert_eq!(out, "cpu value=1 1\ncpu value=2 5\n");
}

#[test]
fn skips_comments_and_blank_lines() {
    let out = stdout_of(lp().args(["parse", "--keys"]).write_stdin(INPUT));
    assert_eq!(out, "cpu,host=serverA,region=us-west\nmem,host=serverA\n");
}

#[test]
fn rejected_line_fails() {
    let stderr = stderr_of_failure(
        lp().arg("parse")
            .write_stdin("cpu value=1 1\ncpu,host=a\ncpu value=2 2\n"),
    );
    assert!(
        stderr.contains("Parse command failed: 1 line(s) rejected"),
        "unexpected stderr: {stderr}"
    );
    assert!(stderr.contains("unable to parse 'cpu,host=a': missing fields"), "{stderr}");
}

#[test]
fn accept_partial() {
    let output = lp()
        .args(["parse", "--accept-partial"])
        .write_stdin("cpu value=1 1\ncpu,host=a\n")
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "cpu value=1 1\n");
    assert!(String::from_utf8(output.stderr).unwrap().contains("1 line(s) rejected"));
}

#[test]
fn accept_partial_needs_one_point() {
    let stderr = stderr_of_failure(
        lp().args(["parse", "--accept-partial"])
            .write_stdin("cpu,host=a\n"),
    );
    assert!(stderr.contains("Parse command failed"), "{stderr}");
}

#[test]
fn empty_input_succeeds() {
    let out = stdout_of(lp().arg("parse").write_stdin("\n# nothing\n"));
    assert_eq!(out, "");
}

#[test]
fn missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.lp");
    let stderr = stderr_of_failure(lp().arg("parse").arg(&path));
    assert!(stderr.contains("unable to read"), "{stderr}");
}

#[test]
fn unknown_precision() {
    lp().args(["parse", "--precision", "d"])
        .write_stdin("cpu value=1 1\n")
        .assert()
        .failure();
}

#[test]
fn dotenv_supplies_flags() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".env"), "LP_OUTPUT_PRECISION=s\n").unwrap();

    let out = stdout_of(
        lp().current_dir(dir.path())
            .arg("parse")
            .write_stdin("cpu value=1 3000000000\n"),
    );
    assert_eq!(out, "cpu value=1 3\n");
}
