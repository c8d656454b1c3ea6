use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn student_registers_records_and_removes_a_grade() {
    let workspace = TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );

    let registered = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.registerPasscode",
        json!({ "userId": "alice01", "name": "Alice", "passcode": "abcd" }),
    );
    assert_eq!(
        registered.pointer("/principal/id").and_then(|v| v.as_str()),
        Some("alice01")
    );

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.add",
        json!({ "term": "t1", "test": "midterm", "subject": "math", "score": 80 }),
    );
    let grade_id = added
        .pointer("/record/id")
        .and_then(|v| v.as_str())
        .expect("record id")
        .to_string();

    let summary = request_ok(&mut stdin, &mut reader, "4", "grades.summary", json!({}));
    assert_eq!(summary.pointer("/summary/count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(summary.pointer("/summary/average").and_then(|v| v.as_f64()), Some(80.0));
    assert_eq!(summary.pointer("/summary/max").and_then(|v| v.as_i64()), Some(80));
    assert_eq!(summary.pointer("/summary/min").and_then(|v| v.as_i64()), Some(80));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.delete",
        json!({ "gradeId": grade_id }),
    );
    assert_eq!(deleted.get("deleted").and_then(|v| v.as_bool()), Some(true));

    let listed = request_ok(&mut stdin, &mut reader, "6", "grades.list", json!({}));
    assert_eq!(listed.get("count").and_then(|v| v.as_u64()), Some(0));
    let empty = request_ok(&mut stdin, &mut reader, "7", "grades.summary", json!({}));
    assert_eq!(empty.pointer("/summary/count").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(empty.pointer("/summary/average").and_then(|v| v.as_f64()), Some(0.0));
}

#[test]
fn teacher_reviews_the_class_and_drills_into_a_student() {
    let workspace = TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.registerPasscode",
        json!({ "userId": "alice01", "name": "Alice", "passcode": "abcd" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.add",
        json!({ "term": "t1", "test": "midterm", "subject": "math", "score": 80 }),
    );
    request_ok(&mut stdin, &mut reader, "4", "auth.logout", json!({}));

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.teacherLogin",
        json!({ "name": "teacher_admin", "passcode": "123456" }),
    );

    let roster = request_ok(&mut stdin, &mut reader, "6", "roster.list", json!({}));
    let students = roster.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].get("id").and_then(|v| v.as_str()), Some("alice01"));
    assert_eq!(students[0].get("latestScore").and_then(|v| v.as_i64()), Some(80));

    let drilled = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grades.list",
        json!({ "studentId": "alice01" }),
    );
    assert_eq!(drilled.get("count").and_then(|v| v.as_u64()), Some(1));
    let record = &drilled.get("records").and_then(|v| v.as_array()).expect("records")[0];
    assert_eq!(record.get("subject").and_then(|v| v.as_str()), Some("math"));
    assert_eq!(record.get("score").and_then(|v| v.as_i64()), Some(80));

    let aggregate = request_ok(&mut stdin, &mut reader, "8", "roster.aggregate", json!({}));
    assert_eq!(aggregate.get("count").and_then(|v| v.as_u64()), Some(1));
    let tagged = &aggregate.get("records").and_then(|v| v.as_array()).expect("records")[0];
    assert_eq!(tagged.get("studentName").and_then(|v| v.as_str()), Some("Alice"));

    request_ok(&mut stdin, &mut reader, "9", "auth.logout", json!({}));
    let current = request_ok(&mut stdin, &mut reader, "10", "session.current", json!({}));
    assert!(current.get("principal").map_or(true, |v| v.is_null()));
}

#[test]
fn unknown_methods_are_reported_not_fatal() {
    let workspace = TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );

    let value = request(&mut stdin, &mut reader, "2", "grades.export", json!({}));
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    // The daemon keeps serving afterwards.
    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
}
