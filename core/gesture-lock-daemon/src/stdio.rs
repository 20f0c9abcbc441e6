//! Line-protocol adapters between the monitor and the challenge UI.
//!
//! Requests go out on stdout as [`AuthenticationRequest`] lines. The UI answers
//! with [`GestureSubmission`] lines on stdin; each is scored and acknowledged
//! with a [`VerdictNotice`].

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

use gesture_lock_core::{AuthRequest, AuthenticationHandler, Authenticator, GestureSample, LockError};
use gesture_lock_protocol::{
    parse_submission, AuthenticationRequest, VerdictNotice, MAX_LINE_BYTES,
};

use crate::lines::{read_bounded_line, BoundedLine};

/// Serialises whole JSON lines onto a shared writer.
#[derive(Clone)]
pub struct LineWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LineWriter {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), String> {
        let mut line = serde_json::to_string(message)
            .map_err(|err| format!("Failed to serialize message: {}", err))?;
        line.push('\n');
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|err| format!("Failed to write message: {}", err))
    }
}

/// Emits authentication requests as protocol lines.
pub struct StdoutAuthenticator {
    out: LineWriter,
}

impl StdoutAuthenticator {
    pub fn new(out: LineWriter) -> Self {
        Self { out }
    }
}

impl Authenticator for StdoutAuthenticator {
    fn request_authentication(&self, request: &AuthRequest) {
        let message =
            AuthenticationRequest::new(&request.package, &request.label, Utc::now().to_rfc3339());
        if let Err(err) = self.out.send(&message) {
            warn!(package = %request.package, error = %err, "Failed to emit authentication request");
        }
    }
}

/// Reads submissions until EOF or until the monitor goes away.
/// Returns the number of submissions scored.
pub fn serve_submissions<R: BufRead>(
    mut reader: R,
    handler: &AuthenticationHandler,
    out: &LineWriter,
) -> usize {
    let mut scored = 0;
    let mut buffer = Vec::new();
    loop {
        let line = match read_bounded_line(&mut reader, MAX_LINE_BYTES, &mut buffer) {
            Ok(None) => break,
            Ok(Some(BoundedLine::Text(line))) => line,
            Ok(Some(BoundedLine::TooLong)) => {
                warn!(max_bytes = MAX_LINE_BYTES, "Dropped oversized submission line");
                continue;
            }
            Ok(Some(BoundedLine::NotUtf8)) => {
                warn!("Dropped submission line that is not UTF-8");
                continue;
            }
            Err(err) => {
                warn!(error = %err, "Failed to read submission line");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let submission = match parse_submission(&line) {
            Ok(submission) => submission,
            Err(err) => {
                warn!(code = %err.code, message = %err.message, "Rejected submission line");
                continue;
            }
        };
        let sample = match GestureSample::from_pairs(&submission.strokes) {
            Ok(sample) => sample,
            Err(err) => {
                warn!(package = %submission.package, error = %err, "Unusable gesture");
                continue;
            }
        };

        match handler.submit(&submission.package, &sample) {
            Ok(verdict) => {
                scored += 1;
                debug!(
                    package = %verdict.package,
                    accepted = verdict.accepted,
                    score = ?verdict.score,
                    "Submission scored"
                );
                let notice = VerdictNotice::new(&verdict.package, verdict.accepted, verdict.score);
                if let Err(err) = out.send(&notice) {
                    warn!(error = %err, "Failed to emit verdict notice");
                }
            }
            Err(LockError::MonitorStopped) => {
                error!("Monitor stopped; no longer accepting submissions");
                break;
            }
            Err(err) => warn!(package = %submission.package, error = %err, "Submission failed"),
        }
    }
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use gesture_lock_core::auth::monitor_channel;
    use gesture_lock_core::{GestureVerifier, MonitorMessage, Point, ResampledPathMatcher, TemplateStore};
    use std::io::Cursor;
    use std::sync::mpsc::Receiver;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("buf").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().expect("buf").clone())
                .expect("utf8")
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn handler() -> (AuthenticationHandler, Receiver<MonitorMessage>) {
        let templates = Arc::new(TemplateStore::in_memory(1));
        let sample = GestureSample::new(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 0.0),
        ]])
        .expect("sample");
        templates.add_template("bank", sample).expect("add");
        let verifier = Arc::new(GestureVerifier::new(
            Box::new(ResampledPathMatcher::default()),
            2.0,
        ));
        let (handle, inbox) = monitor_channel();
        (AuthenticationHandler::new(templates, verifier, handle), inbox)
    }

    #[test]
    fn authenticator_writes_request_line() {
        let buf = SharedBuf::default();
        let authenticator = StdoutAuthenticator::new(LineWriter::new(Box::new(buf.clone())));
        authenticator.request_authentication(&AuthRequest {
            package: "bank".to_string(),
            label: "Bank".to_string(),
        });

        let lines = buf.lines();
        assert_eq!(lines.len(), 1);
        let request: AuthenticationRequest = serde_json::from_str(&lines[0]).expect("request");
        assert_eq!(request.package, "bank");
        assert_eq!(request.label, "Bank");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn submissions_are_scored_and_acknowledged() {
        let (handler, inbox) = handler();
        let buf = SharedBuf::default();
        let input = concat!(
            r#"{"protocol_version":1,"package":"bank","strokes":[[[0,0],[10,10],[20,0]]]}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"protocol_version":1,"package":"bank","strokes":[[[0,0],[0,30]]]}"#,
            "\n",
        );

        let scored = serve_submissions(
            Cursor::new(input),
            &handler,
            &LineWriter::new(Box::new(buf.clone())),
        );
        assert_eq!(scored, 2);

        let notices: Vec<VerdictNotice> = buf
            .lines()
            .iter()
            .map(|line| serde_json::from_str(line).expect("notice"))
            .collect();
        assert!(notices[0].accepted);
        assert!(!notices[1].accepted);

        let posted: Vec<MonitorMessage> = inbox.try_iter().collect();
        assert_eq!(posted.len(), 2);
    }

    #[test]
    fn oversized_submission_is_dropped_and_next_one_scored() {
        let (handler, inbox) = handler();
        let buf = SharedBuf::default();
        let mut input = "x".repeat(MAX_LINE_BYTES + 1024);
        input.push('\n');
        input.push_str(
            r#"{"protocol_version":1,"package":"bank","strokes":[[[0,0],[10,10],[20,0]]]}"#,
        );
        input.push('\n');

        let scored = serve_submissions(
            Cursor::new(input),
            &handler,
            &LineWriter::new(Box::new(buf.clone())),
        );

        assert_eq!(scored, 1);
        let lines = buf.lines();
        assert_eq!(lines.len(), 1);
        let notice: VerdictNotice = serde_json::from_str(&lines[0]).expect("notice");
        assert!(notice.accepted);
        assert_eq!(inbox.try_iter().count(), 1);
    }

    #[test]
    fn serving_stops_when_monitor_is_gone() {
        let (handler, inbox) = handler();
        drop(inbox);
        let input = concat!(
            r#"{"protocol_version":1,"package":"bank","strokes":[[[0,0],[10,10],[20,0]]]}"#,
            "\n",
            r#"{"protocol_version":1,"package":"bank","strokes":[[[0,0],[10,10],[20,0]]]}"#,
            "\n",
        );
        let buf = SharedBuf::default();
        let scored = serve_submissions(
            Cursor::new(input),
            &handler,
            &LineWriter::new(Box::new(buf.clone())),
        );
        assert_eq!(scored, 0);
        assert!(buf.lines().is_empty());
    }
}
