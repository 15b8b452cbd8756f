use std::{fs, path::Path};

use assert_cmd::Command;
use tempfile::TempDir;

fn ffmiddleman(dir: &TempDir) -> Command {
    let mut command = Command::cargo_bin("ffmiddleman").expect("binary is built");
    command
        .current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .arg("--config-file")
        .arg(dir.path().join("ffmiddleman.json"))
        .arg("--logs")
        .arg(dir.path().join("logs").join("ffmiddleman.log"))
        .write_stdin("");
    command
}

fn output_text(output: &std::process::Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn help_lists_the_commands() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = ffmiddleman(&dir).arg("--help").output().expect("runs");

    assert!(output.status.success());
    let text = output_text(&output);
    assert!(text.contains("run"));
    assert!(text.contains("defaults"));
}

#[test]
fn defaults_show_prints_empty_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = ffmiddleman(&dir).args(["defaults", "show"]).output().expect("runs");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"action\""));
    assert!(stdout.contains("\"naming\""));
}

#[test]
fn missing_input_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = ffmiddleman(&dir).args(["run", "nope.mkv"]).output().expect("runs");

    assert!(!output.status.success());
    assert!(output_text(&output).contains("does not exist"));
}

#[test]
fn missing_encoder_is_reported_before_anything_runs() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("clip.mkv"), b"").expect("write source");

    let output = ffmiddleman(&dir)
        .args(["run", "--suffix", "_out", "--ffmpeg", "ffmiddleman-surely-missing-tool", "clip.mkv"])
        .output()
        .expect("runs");

    assert!(!output.status.success());
    assert!(output_text(&output).contains("was not found"));
    assert!(!dir.path().join("ffmiddleman.json").exists());
}

#[cfg(unix)]
mod fake_tools {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Writes an executable shell script into `dir`.
    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        path.to_string_lossy().into_owned()
    }

    /// Reports some progress and creates its last argument.
    const ENCODER: &str = "for last; do :; done\nprintf 'frame=1 time=00:00:01.00\\r' >&2\n: > \
                           \"$last\"";
    const PROBER: &str = "echo duration=2.000000";

    #[test]
    fn batch_runs_and_saves_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("a.mkv"), b"").expect("write source");
        fs::write(dir.path().join("b.mkv"), b"").expect("write source");
        let ffmpeg = script(dir.path(), "fake-ffmpeg", ENCODER);
        let ffprobe = script(dir.path(), "fake-ffprobe", PROBER);

        let output = ffmiddleman(&dir)
            .args(["run", "--suffix", ".processed", "--format", "mp4", "--crf", "20"])
            .args(["--ffmpeg", &ffmpeg, "--ffprobe", &ffprobe, "a.mkv", "b.mkv"])
            .output()
            .expect("runs");

        assert!(output.status.success(), "{}", output_text(&output));
        assert!(dir.path().join("a.processed.mp4").exists());
        assert!(dir.path().join("b.processed.mp4").exists());
        assert!(String::from_utf8_lossy(&output.stdout).contains("2 succeeded"));

        let saved = fs::read_to_string(dir.path().join("ffmiddleman.json")).expect("saved");
        assert!(saved.contains("\"suffix\": \".processed\""));
        assert!(saved.contains("\"crf\": 20"));
    }

    #[test]
    fn existing_output_is_skipped() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("a.mkv"), b"").expect("write source");
        fs::write(dir.path().join("a_out.mkv"), b"keep").expect("write destination");
        let ffmpeg = script(dir.path(), "fake-ffmpeg", "exit 1");
        let ffprobe = script(dir.path(), "fake-ffprobe", PROBER);

        let output = ffmiddleman(&dir)
            .args(["run", "--suffix", "_out", "--on-collision", "skip", "--no-save"])
            .args(["--ffmpeg", &ffmpeg, "--ffprobe", &ffprobe, "a.mkv"])
            .output()
            .expect("runs");

        assert!(output.status.success(), "{}", output_text(&output));
        assert!(String::from_utf8_lossy(&output.stdout).contains("skipped"));
        assert_eq!(fs::read(dir.path().join("a_out.mkv")).expect("kept"), b"keep");
        assert!(!dir.path().join("ffmiddleman.json").exists());
    }

    #[test]
    fn failing_job_fails_the_run_but_not_the_batch() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("bad.mkv"), b"").expect("write source");
        fs::write(dir.path().join("good.mkv"), b"").expect("write source");
        let ffmpeg = script(
            dir.path(),
            "fake-ffmpeg",
            "case \"$2\" in bad.mkv) echo 'bad.mkv: Invalid data' >&2; exit 1;; esac\n\
             for last; do :; done\n: > \"$last\"",
        );
        let ffprobe = script(dir.path(), "fake-ffprobe", PROBER);

        let output = ffmiddleman(&dir)
            .args(["run", "--prefix", "x_", "--no-save"])
            .args(["--ffmpeg", &ffmpeg, "--ffprobe", &ffprobe, "bad.mkv", "good.mkv"])
            .output()
            .expect("runs");

        assert!(!output.status.success());
        let text = output_text(&output);
        assert!(text.contains("1 of 2 job(s) failed"), "{}", text);
        assert!(text.contains("Invalid data"), "{}", text);
        assert!(dir.path().join("x_good.mkv").exists());
    }
}
