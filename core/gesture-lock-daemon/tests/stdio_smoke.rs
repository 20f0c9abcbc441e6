use chrono::Utc;
use gesture_lock_protocol::{AuthenticationRequest, VerdictNotice};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const BANK: &str = "com.example.bank";
const ZIGZAG: &str = r#"{"strokes":[[[0,0],[10,10],[20,0],[30,10]]]}"#;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn gesture_lock(root: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_gesture-lock"));
    command
        .arg("--root")
        .arg(root)
        .env_remove("RUST_LOG")
        .stderr(Stdio::null());
    command
}

fn enroll(root: &Path, gesture: &Path) {
    let status = gesture_lock(root)
        .args(["enroll", "--package", BANK, "--gesture"])
        .arg(gesture)
        .stdout(Stdio::null())
        .status()
        .expect("Failed to run enroll");
    assert!(status.success());
}

fn write_fixture(dir: &Path) -> PathBuf {
    let gesture = dir.join("zigzag.json");
    fs_err::write(&gesture, ZIGZAG).expect("Failed to write gesture");
    gesture
}

fn append_foreground(root: &Path, timestamp_ms: i64) {
    let mut journal = fs_err::OpenOptions::new()
        .create(true)
        .append(true)
        .open(root.join("events.jsonl"))
        .expect("Failed to open journal");
    writeln!(
        journal,
        "{{\"package\":\"{}\",\"kind\":\"foreground\",\"timestamp_ms\":{}}}",
        BANK, timestamp_ms
    )
    .expect("Failed to append journal");
}

fn spawn_line_reader(stdout: ChildStdout) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[test]
fn autostart_exit_code_tracks_saved_gestures() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let root = temp.path().join("store");

    let skip = gesture_lock(&root)
        .arg("autostart")
        .stdout(Stdio::null())
        .status()
        .expect("Failed to run autostart");
    assert!(!skip.success());

    enroll(&root, &write_fixture(temp.path()));
    let start = gesture_lock(&root)
        .arg("autostart")
        .stdout(Stdio::null())
        .status()
        .expect("Failed to run autostart");
    assert!(start.success());
}

#[test]
fn run_challenges_foreground_app_and_scores_submission() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let root = temp.path().join("store");
    let gesture = write_fixture(temp.path());
    for _ in 0..3 {
        enroll(&root, &gesture);
    }

    let now_ms = Utc::now().timestamp_millis();
    fs_err::write(
        root.join("events.jsonl"),
        format!(
            "{{\"package\":\"{}\",\"kind\":\"foreground\",\"timestamp_ms\":{}}}\n",
            BANK, now_ms
        ),
    )
    .expect("Failed to write journal");

    let child = gesture_lock(&root)
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn gesture-lock run");
    let mut guard = DaemonGuard { child };
    let lines = spawn_line_reader(guard.child.stdout.take().expect("stdout"));

    let request_line = lines
        .recv_timeout(Duration::from_secs(5))
        .expect("Timed out waiting for authentication request");
    let request: AuthenticationRequest =
        serde_json::from_str(&request_line).expect("Failed to parse request");
    assert_eq!(request.package, BANK);
    assert_eq!(request.label, BANK);

    let mut stdin = guard.child.stdin.take().expect("stdin");
    writeln!(
        stdin,
        r#"{{"protocol_version":1,"package":"{}","strokes":[[[0,0],[10,10],[20,0],[30,10]]]}}"#,
        BANK
    )
    .expect("Failed to write submission");
    stdin.flush().expect("Failed to flush submission");

    // A repeat challenge may land first if a cycle passes the reopen window.
    let notice = loop {
        let line = lines
            .recv_timeout(Duration::from_secs(5))
            .expect("Timed out waiting for verdict");
        if let Ok(notice) = serde_json::from_str::<VerdictNotice>(&line) {
            break notice;
        }
    };
    assert_eq!(notice.package, BANK);
    assert!(notice.accepted);

    // Closing stdin stops the monitor.
    drop(stdin);
    let status = guard.child.wait().expect("Failed to wait for daemon");
    assert!(status.success());
    assert!(fs_err::read_to_string(root.join("monitor.json"))
        .expect("monitor flags")
        .contains("\"monitoring_started\":true"));
}

#[test]
fn removing_protection_while_running_stops_challenges() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let root = temp.path().join("store");
    let gesture = write_fixture(temp.path());
    for _ in 0..3 {
        enroll(&root, &gesture);
    }
    append_foreground(&root, Utc::now().timestamp_millis());

    let child = gesture_lock(&root)
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn gesture-lock run");
    let mut guard = DaemonGuard { child };
    let lines = spawn_line_reader(guard.child.stdout.take().expect("stdout"));
    lines
        .recv_timeout(Duration::from_secs(5))
        .expect("Timed out waiting for first authentication request");

    let removed = gesture_lock(&root)
        .args(["remove", "--package", BANK])
        .stdout(Stdio::null())
        .status()
        .expect("Failed to run remove");
    assert!(removed.success());

    // Let at least one cycle pick up the change, then ignore anything raced before it.
    thread::sleep(Duration::from_millis(1_500));
    while lines.try_recv().is_ok() {}

    // Past the reopen window, so only protection can suppress a challenge.
    append_foreground(&root, Utc::now().timestamp_millis());
    let late = lines.recv_timeout(Duration::from_millis(3_000));
    assert!(
        late.is_err(),
        "unexpected challenge after removal: {:?}",
        late
    );

    drop(guard.child.stdin.take());
    let status = guard.child.wait().expect("Failed to wait for daemon");
    assert!(status.success());
}
