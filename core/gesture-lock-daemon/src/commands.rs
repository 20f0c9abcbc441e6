//! Subcommand implementations. Each writes human-readable output to `out`
//! and returns `Err(String)` for failures that should exit non-zero.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use fs_err as fs;
use tracing::{debug, info, warn};

use gesture_lock_core::{
    decide, load_config, resolve_display_label, should_autostart, AuthenticationHandler,
    GestureSample, GestureVerifier, JsonFileBackend, LockConfig, Monitor, MonitorDeps,
    MonitorFlags, MonitorSettings, ResampledPathMatcher, SessionStore, StaticEnvironment,
    StorageConfig, SystemClock, TemplateStore,
};
use gesture_lock_protocol::parse_gesture_file;

use crate::journal::JournalEventSource;
use crate::stdio::{serve_submissions, LineWriter, StdoutAuthenticator};

const TOP_SCORES: usize = 5;

pub struct Context {
    pub storage: StorageConfig,
    pub config: LockConfig,
}

impl Context {
    pub fn load(storage: StorageConfig) -> Result<Self, String> {
        let config = load_config(&storage.config_file()).map_err(String::from)?;
        Ok(Self { storage, config })
    }

    fn open_templates(&self) -> Result<TemplateStore, String> {
        let backend = JsonFileBackend::new(
            self.storage.templates_file(),
            self.storage.enrolled_file(),
        );
        TemplateStore::open(Box::new(backend), self.config.min_samples).map_err(String::from)
    }

    fn environment(&self) -> StaticEnvironment {
        StaticEnvironment::new(
            self.config.self_package.clone(),
            self.config.home_package.clone(),
            self.config.labels.clone(),
        )
    }

    fn verifier(&self) -> GestureVerifier {
        GestureVerifier::new(
            Box::new(ResampledPathMatcher::default()),
            self.config.match_threshold,
        )
    }

    fn load_flags(&self) -> MonitorFlags {
        MonitorFlags::load(&self.storage.monitor_flags_file()).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to read monitor flags; using defaults");
            MonitorFlags::default()
        })
    }
}

fn read_gesture(path: &Path) -> Result<GestureSample, String> {
    let content = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let file = parse_gesture_file(&content).map_err(|err| err.to_string())?;
    GestureSample::from_pairs(&file.strokes).map_err(String::from)
}

fn write_out(out: &mut dyn Write, text: std::fmt::Arguments<'_>) -> Result<(), String> {
    out.write_fmt(text)
        .map_err(|err| format!("Failed to write output: {}", err))
}

/// Runs the monitor until the submission stream on stdin closes.
pub fn run(ctx: &Context) -> Result<(), String> {
    let templates = Arc::new(ctx.open_templates()?);

    let mut flags = ctx.load_flags();
    flags.monitoring_started = true;
    if let Err(err) = flags.save(&ctx.storage.monitor_flags_file()) {
        warn!(error = %err, "Failed to persist monitoring flag");
    }

    let out = LineWriter::stdout();
    let deps = MonitorDeps {
        sessions: Arc::new(SessionStore::new()),
        templates: Arc::clone(&templates),
        environment: Arc::new(ctx.environment()),
        authenticator: Arc::new(StdoutAuthenticator::new(out.clone())),
        clock: Arc::new(SystemClock),
    };
    let source = JournalEventSource::new(ctx.storage.events_journal());
    let (mut monitor, handle) = Monitor::new(source, deps, MonitorSettings::from(&ctx.config));

    let protected = templates.protected_packages().len();
    let handler = AuthenticationHandler::new(templates, Arc::new(ctx.verifier()), handle.clone());
    thread::Builder::new()
        .name("submissions".to_string())
        .spawn(move || {
            let scored = serve_submissions(io::stdin().lock(), &handler, &out);
            info!(scored, "Submission stream closed; stopping monitor");
            // Without a UI on the other end nobody can answer a challenge.
            if let Err(err) = handle.shutdown() {
                debug!(error = %err, "Monitor already stopped");
            }
        })
        .map_err(|err| format!("Failed to spawn submission listener: {}", err))?;

    info!(
        protected,
        journal = %ctx.storage.events_journal().display(),
        "gesture-lock monitor starting"
    );
    monitor.run();
    Ok(())
}

pub fn enroll(
    ctx: &Context,
    package: &str,
    gesture: &Path,
    out: &mut dyn Write,
) -> Result<(), String> {
    let sample = read_gesture(gesture)?;
    let templates = ctx.open_templates()?;
    templates
        .add_template(package, sample)
        .map_err(String::from)?;

    let progress = templates.enrollment_progress(package);
    if progress.is_complete() {
        write_out(
            out,
            format_args!(
                "{}: {} samples, protected\n",
                package, progress.samples
            ),
        )
    } else {
        write_out(
            out,
            format_args!(
                "{}: {}/{} samples, {} more needed\n",
                package, progress.samples, progress.required, progress.remaining
            ),
        )
    }
}

pub fn remove(ctx: &Context, package: &str, out: &mut dyn Write) -> Result<(), String> {
    let templates = ctx.open_templates()?;
    match templates.remove_all_templates(package) {
        Ok(()) => write_out(out, format_args!("{}: protection removed\n", package)),
        Err(err) => {
            warn!(package = %package, error = %err, "Samples could not be purged");
            write_out(
                out,
                format_args!(
                    "{}: protection removed, but stored samples could not be deleted ({})\n",
                    package, err
                ),
            )
        }
    }
}

pub fn status(ctx: &Context, out: &mut dyn Write) -> Result<(), String> {
    let templates = ctx.open_templates()?;
    let flags = ctx.load_flags();
    let environment = ctx.environment();

    write_out(
        out,
        format_args!(
            "monitoring started: {}\nautostart: {}\n",
            flags.monitoring_started,
            should_autostart(&flags, &templates)
        ),
    )?;

    let packages: Vec<String> = templates.with_library(|library| library.keys().cloned().collect());
    if packages.is_empty() {
        return write_out(out, format_args!("no gestures saved\n"));
    }
    for package in packages {
        let progress = templates.enrollment_progress(&package);
        let state = if templates.is_protected(&package) {
            "protected"
        } else if templates.is_enrolled(&package) {
            "enrolling"
        } else {
            "inactive"
        };
        let label = resolve_display_label(&environment, &package);
        write_out(
            out,
            format_args!(
                "{} ({}) {} {}/{}\n",
                package, label, state, progress.samples, progress.required
            ),
        )?;
    }
    Ok(())
}

/// Prints the best raw scores and the verdict. Returns whether it was accepted.
pub fn verify(
    ctx: &Context,
    package: &str,
    gesture: &Path,
    out: &mut dyn Write,
) -> Result<bool, String> {
    let candidate = read_gesture(gesture)?;
    let templates = ctx.open_templates()?;
    let verifier = ctx.verifier();

    let results = verifier.score_all(&templates, &candidate);
    for result in results.iter().take(TOP_SCORES) {
        write_out(
            out,
            format_args!("{:>10.4}  {}\n", result.score, result.candidate_owner),
        )?;
    }
    let verdict = decide(&results, package, verifier.threshold());
    let best = verdict
        .score()
        .map(|score| format!("{:.4}", score))
        .unwrap_or_else(|| "none".to_string());
    write_out(
        out,
        format_args!(
            "{}: {} (best {}, threshold {})\n",
            package,
            if verdict.is_accept() { "accept" } else { "reject" },
            best,
            verifier.threshold()
        ),
    )?;
    Ok(verdict.is_accept())
}

pub fn autostart(ctx: &Context, out: &mut dyn Write) -> Result<bool, String> {
    let templates = ctx.open_templates()?;
    let start = should_autostart(&ctx.load_flags(), &templates);
    write_out(out, format_args!("{}\n", if start { "start" } else { "skip" }))?;
    Ok(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZIGZAG: &str = r#"{"strokes":[[[0,0],[10,10],[20,0],[30,10]]]}"#;
    const LINE: &str = r#"{"strokes":[[[0,0],[0,40]]]}"#;

    fn context() -> (tempfile::TempDir, Context) {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let ctx = Context::load(StorageConfig::with_root(temp_dir.path().to_path_buf()))
            .expect("context");
        (temp_dir, ctx)
    }

    fn gesture_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("write gesture");
        path
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn enroll_reports_progress_until_protected() {
        let (dir, ctx) = context();
        let gesture = gesture_file(dir.path(), "zigzag.json", ZIGZAG);

        let mut out = Vec::new();
        enroll(&ctx, "bank", &gesture, &mut out).expect("enroll 1");
        enroll(&ctx, "bank", &gesture, &mut out).expect("enroll 2");
        enroll(&ctx, "bank", &gesture, &mut out).expect("enroll 3");

        let text = output(out);
        assert!(text.contains("bank: 1/3 samples, 2 more needed"));
        assert!(text.contains("bank: 3 samples, protected"));
    }

    #[test]
    fn enroll_rejects_invalid_gesture_file() {
        let (dir, ctx) = context();
        let gesture = gesture_file(dir.path(), "bad.json", r#"{"strokes":[[[0,0]]]}"#);
        let err = enroll(&ctx, "bank", &gesture, &mut Vec::new()).expect_err("single point");
        assert!(err.contains("invalid_gesture"));
    }

    #[test]
    fn verify_accepts_matching_and_rejects_other() {
        let (dir, ctx) = context();
        let zigzag = gesture_file(dir.path(), "zigzag.json", ZIGZAG);
        let line = gesture_file(dir.path(), "line.json", LINE);
        enroll(&ctx, "bank", &zigzag, &mut Vec::new()).expect("enroll");

        let mut out = Vec::new();
        assert!(verify(&ctx, "bank", &zigzag, &mut out).expect("verify"));
        assert!(output(out).contains("bank: accept"));

        assert!(!verify(&ctx, "bank", &line, &mut Vec::new()).expect("verify"));
        assert!(!verify(&ctx, "mail", &zigzag, &mut Vec::new()).expect("verify"));
    }

    #[test]
    fn remove_then_status_shows_no_gestures() {
        let (dir, ctx) = context();
        let gesture = gesture_file(dir.path(), "zigzag.json", ZIGZAG);
        enroll(&ctx, "bank", &gesture, &mut Vec::new()).expect("enroll");

        let mut out = Vec::new();
        status(&ctx, &mut out).expect("status");
        assert!(output(out).contains("bank (bank) enrolling 1/3"));

        remove(&ctx, "bank", &mut Vec::new()).expect("remove");
        let mut out = Vec::new();
        status(&ctx, &mut out).expect("status");
        assert!(output(out).contains("no gestures saved"));
    }

    #[test]
    fn autostart_follows_saved_gestures_and_flag() {
        let (dir, ctx) = context();
        assert!(!autostart(&ctx, &mut Vec::new()).expect("autostart"));

        MonitorFlags {
            monitoring_started: true,
        }
        .save(&ctx.storage.monitor_flags_file())
        .expect("save flags");
        assert!(autostart(&ctx, &mut Vec::new()).expect("autostart"));

        fs::remove_file(ctx.storage.monitor_flags_file()).expect("remove flags");
        let gesture = gesture_file(dir.path(), "zigzag.json", ZIGZAG);
        enroll(&ctx, "bank", &gesture, &mut Vec::new()).expect("enroll");
        assert!(autostart(&ctx, &mut Vec::new()).expect("autostart"));
    }
}
