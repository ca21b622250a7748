#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
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

/// Sends one request and returns the full response envelope.
pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

/// Sends one request, asserts success and returns `result`.
pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Error code of a failed envelope.
pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

/// A running sidecar with an open workspace and auto-numbered request ids.
pub struct Session {
    pub workspace: PathBuf,
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Session {
    pub fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            workspace,
            child,
            stdin,
            reader,
            next_id: 0,
        };
        let path = s.workspace.to_string_lossy().to_string();
        s.ok("workspace.select", json!({ "path": path }));
        s
    }

    fn bump(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    pub fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.bump();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.bump();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn class(&mut self, student: &str, name: &str, credit_hours: f64, done: bool) -> String {
        let r = self.ok(
            "classes.create",
            json!({
                "studentId": student,
                "name": name,
                "creditHours": credit_hours,
                "isCompleted": done
            }),
        );
        r["classId"].as_str().expect("classId").to_string()
    }

    pub fn category(&mut self, class_id: &str, name: &str, weight: f64) -> String {
        let r = self.ok(
            "categories.create",
            json!({ "classId": class_id, "name": name, "weight": weight }),
        );
        r["categoryId"].as_str().expect("categoryId").to_string()
    }

    /// Creates an assignment and, when `earned` is given, grades it.
    pub fn assignment(
        &mut self,
        class_id: &str,
        category_id: &str,
        points_possible: f64,
        earned: Option<f64>,
    ) -> String {
        let r = self.ok(
            "assignments.create",
            json!({
                "classId": class_id,
                "categoryId": category_id,
                "name": "Work",
                "pointsPossible": points_possible
            }),
        );
        let id = r["assignmentId"].as_str().expect("assignmentId").to_string();
        if let Some(points) = earned {
            self.ok(
                "grades.set",
                json!({ "assignmentId": id, "pointsEarned": points }),
            );
        }
        id
    }

    pub fn close(self) {
        let Session {
            workspace,
            mut child,
            stdin,
            ..
        } = self;
        drop(stdin);
        let _ = child.wait();
        let _ = std::fs::remove_dir_all(workspace);
    }
}

pub fn class_grade<'a>(
    gpa: &'a serde_json::Value,
    class_id: &str,
) -> Option<&'a serde_json::Value> {
    gpa.get("classGrades")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.iter().find(|g| g["classId"].as_str() == Some(class_id)))
}
