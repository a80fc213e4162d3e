//! End-to-end tests driving the compiled `fax` binary: file mode, the
//! three propagated exit codes, and the too-many-arguments usage error.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fax_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fax"))
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn running_a_script_prints_its_output_and_exits_zero() {
    fax_bin()
        .arg(fixture("hello.fax"))
        .assert()
        .success()
        .stdout(predicate::str::diff("hello, fax\n"));
}

#[test]
fn classes_and_methods_work_end_to_end() {
    fax_bin()
        .arg(fixture("classes.fax"))
        .assert()
        .success()
        .stdout(predicate::str::diff("hello, world\n"));
}

#[test]
fn a_compile_error_exits_65_and_reports_on_stderr() {
    fax_bin()
        .arg(fixture("compile_error.fax"))
        .assert()
        .code(65)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn a_runtime_error_exits_70_and_reports_on_stderr() {
    fax_bin()
        .arg(fixture("runtime_error.fax"))
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Operands must be two numbers or two strings."));
}

#[test]
fn a_missing_file_exits_74() {
    fax_bin()
        .arg(fixture("does_not_exist.fax"))
        .assert()
        .code(74)
        .stderr(predicate::str::contains("Could not read file"));
}

#[test]
fn more_than_one_path_argument_is_a_usage_error() {
    fax_bin()
        .arg(fixture("hello.fax"))
        .arg(fixture("classes.fax"))
        .assert()
        .code(64)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn gc_stress_flag_does_not_change_program_output() {
    fax_bin()
        .arg("--stress-gc")
        .arg(fixture("classes.fax"))
        .assert()
        .success()
        .stdout(predicate::str::diff("hello, world\n"));
}

/// The stack-overflow stress scenario, driven through the real binary
/// against a script written to a scratch file rather than a checked-in
/// fixture, since the recursion depth has no fixed "interesting" value
/// worth committing to the repo.
#[test]
fn unbounded_recursion_exits_70_with_a_stack_overflow_message() {
    let dir = tempfile::tempdir().expect("failed to create scratch dir");
    let script = dir.path().join("overflow.fax");
    std::fs::write(&script, "fun recurse() { return recurse(); } recurse();\n")
        .expect("failed to write scratch script");

    fax_bin()
        .arg(&script)
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Stack overflow."));
}
