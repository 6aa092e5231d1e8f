//! End-to-end tests for the `lean` CLI binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Isolated lean home, cache, profile script and a directory-backed remote.
struct TestContext {
    temp_dir: TempDir,
    lean_home: PathBuf,
    cache_dir: PathBuf,
    remote_dir: PathBuf,
    project_dir: PathBuf,
    profile_script: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let root = temp_dir.path();
        let ctx = Self {
            lean_home: root.join(".lean"),
            cache_dir: root.join("cache"),
            remote_dir: root.join("remote"),
            project_dir: root.join("project"),
            profile_script: root.join("lean_paths.sh"),
            temp_dir,
        };
        for dir in [&ctx.lean_home, &ctx.remote_dir, &ctx.project_dir] {
            std::fs::create_dir_all(dir).expect("failed to create dir");
        }
        ctx
    }

    fn lean_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lean"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("LEAN_HOME", &self.lean_home);
        cmd.env("LEAN_CACHE_DIR", &self.cache_dir);
        cmd.env("LEAN_REMOTE_URL", format!("file://{}", self.remote_dir.display()));
        cmd.env("LEAN_TOOLCHAIN", "GCC12.3.0");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.lean_cmd().args(args).output().expect("failed to run lean")
    }

    /// Pin the host to the fixture OS directory and redirect PATH exports.
    fn configure_host(&self) {
        let script = self.profile_script.display().to_string();
        for (key, value) in [
            ("host.os_name", "testos"),
            ("host.os_version", "1.0"),
            ("path.profile_script", script.as_str()),
        ] {
            let output = self.run(&["config", "set", key, value]);
            assert!(output.status.success(), "config set {key} failed");
        }
    }

    fn publish(&self, relative: &str, entries: &[(&str, &str)]) {
        let path = self.remote_dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn publish_zlib(&self) {
        self.publish(
            "testos-1.0/GCC12.3.0/zlib/stable/zlib@1.3.zip",
            &[("include/zlib.h", "#define ZLIB 1\n"), ("bin/zpipe", "#!/bin/sh\n")],
        );
    }

    fn write_manifest(&self, name: &str, contents: &str) {
        std::fs::write(self.project_dir.join(name), contents).unwrap();
    }

    fn installed(&self, dir_name: &str) -> PathBuf {
        self.cache_dir.join(dir_name)
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// The summary row starting with `label`, without color codes.
fn summary_row(text: &str, label: &str) -> Option<String> {
    text.lines().map(strip_ansi).find(|l| {
        l.trim_start()
            .strip_prefix(label)
            .is_some_and(|rest| rest.starts_with(' '))
    })
}

fn strip_ansi(line: &str) -> String {
    let mut out = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn project_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Usage:"));
    assert!(text.contains("sync"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("lean "));
}

#[test]
fn test_config_set_then_get() {
    let ctx = TestContext::new();
    let output = ctx.run(&["config", "set", "remote.key", "/keys/id_ed25519"]);
    assert!(output.status.success());
    assert!(ctx.lean_home.join("config.toml").exists());

    let output = ctx.run(&["config", "get", "remote.key"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "/keys/id_ed25519");

    let output = ctx.run(&["config", "list"]);
    let text = stdout(&output);
    assert!(text.contains("remote.url"));
    assert!(text.contains("toolchain.default"));
    assert!(text.contains("GCC12.3.0"), "environment override is listed");
}

#[test]
fn test_config_rejects_unknown_key() {
    let ctx = TestContext::new();
    let output = ctx.run(&["config", "get", "remote.password"]);
    assert!(!output.status.success());
}

#[test]
fn test_remote_listing() {
    let ctx = TestContext::new();
    ctx.configure_host();
    ctx.publish_zlib();
    ctx.publish(
        "testos-1.0/GCC12.3.0/curl/common/curl@8.0.zip",
        &[("curl-8.0/include/curl.h", ""), ("curl-8.0/lib/libcurl.a", "")],
    );

    let output = ctx.run(&["remote"]);
    assert!(output.status.success(), "{}", stdout(&output));
    let text = stdout(&output);
    let zlib = text.lines().find(|l| l.contains("zlib")).expect("zlib row");
    assert!(zlib.contains("1.3"));
    assert!(zlib.contains("stable"));
    assert!(text.lines().any(|l| l.contains("curl") && l.contains("common")));

    let output = ctx.run(&["remote", "zl"]);
    let text = stdout(&output);
    assert!(text.contains("zlib"));
    assert!(!text.contains("curl"));
}

#[test]
fn test_sync_installs_and_registers_bin() {
    let ctx = TestContext::new();
    ctx.configure_host();
    ctx.publish_zlib();
    ctx.write_manifest("app.manifest", "[GCC12.3.0]\nzlib\n");

    let output = ctx.run(&["--root", &project_arg(&ctx.project_dir), "sync"]);
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(stdout(&output).contains("RESULT"));

    let installed = ctx.installed("zlib@1.3@GCC12.3.0");
    assert!(installed.join("include/zlib.h").exists());
    assert!(installed.join("bin/zpipe").exists());

    let script = std::fs::read_to_string(&ctx.profile_script).unwrap();
    assert!(script.contains("zlib@1.3@GCC12.3.0/bin"));
}

#[test]
fn test_sync_reports_unknown_package() {
    let ctx = TestContext::new();
    ctx.configure_host();
    ctx.publish_zlib();
    ctx.write_manifest("app.manifest", "[GCC12.3.0]\nzlib\nghost\n");

    let output = ctx.run(&["--root", &project_arg(&ctx.project_dir), "sync", "-m", "app.manifest"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("ghost: not found on remote"));
    assert!(ctx.installed("zlib@1.3@GCC12.3.0").exists());
}

#[test]
fn test_status_after_sync() {
    let ctx = TestContext::new();
    ctx.configure_host();
    ctx.publish_zlib();
    ctx.write_manifest("app.manifest", "[GCC12.3.0]\nzlib\n");
    let root = project_arg(&ctx.project_dir);

    let before = ctx.run(&["--root", &root, "status", "--obj-name", "app"]);
    assert!(before.status.success());
    let text = stdout(&before);
    assert!(text.lines().any(|l| l.contains("zlib") && l.contains("missing")));
    assert!(!ctx.installed("zlib@1.3@GCC12.3.0").exists(), "status is read-only");

    assert!(ctx.run(&["--root", &root, "sync"]).status.success());

    let after = ctx.run(&["--root", &root, "status", "--obj-name", "app"]);
    assert!(after.status.success());
    assert!(
        stdout(&after)
            .lines()
            .any(|l| l.contains("zlib@1.3@GCC12.3.0") && l.contains("satisfied"))
    );
}

#[test]
fn test_fetch_single_package() {
    let ctx = TestContext::new();
    ctx.configure_host();
    ctx.publish_zlib();

    let output = ctx.run(&["fetch", "zlib==1.3"]);
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(ctx.installed("zlib@1.3@GCC12.3.0").join("include/zlib.h").exists());

    let output = ctx.run(&["fetch", "zlib==9.9"]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_os_directory_is_fatal() {
    let ctx = TestContext::new();
    ctx.configure_host();
    ctx.publish(
        "otheros-5.0/GCC12.3.0/zlib/stable/zlib@1.3.zip",
        &[("include/zlib.h", ""), ("lib/libz.a", "")],
    );

    let output = ctx.run(&["remote"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No remote directory matches"));
}

#[test]
fn test_sync_summary_lists_each_category() {
    let ctx = TestContext::new();
    ctx.configure_host();
    ctx.publish_zlib();
    let broken = ctx.remote_dir.join("testos-1.0/GCC12.3.0/broken/stable/broken@1.0.zip");
    std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
    std::fs::write(&broken, b"not a zip").unwrap();
    ctx.write_manifest("app.manifest", "[GCC12.3.0]\nzlib\nbroken\nghost\n");

    let output = ctx.run(&["--root", &project_arg(&ctx.project_dir), "sync"]);
    assert!(!output.status.success());
    let text = stdout(&output);

    let row = |label: &str| summary_row(&text, label).unwrap_or_else(|| panic!("no {label} row:\n{text}"));
    let unresolved = row("unresolved");
    assert!(unresolved.contains(" 1 ") && unresolved.contains("ghost"));
    let missing = row("missing");
    assert!(missing.contains(" 2 "));
    assert!(missing.contains("zlib@1.3@GCC12.3.0") && missing.contains("broken@1.0@GCC12.3.0"));
    assert!(row("stale").trim_end().ends_with(" 0"));
    let updated = row("updated");
    assert!(updated.contains("zlib@1.3@GCC12.3.0") && !updated.contains("broken"));
    assert!(row("fetch-failed").trim_end().ends_with(" 0"));
    let extract_failed = row("extract-failed");
    assert!(extract_failed.contains(" 1 ") && extract_failed.contains("broken@1.0@GCC12.3.0"));
}
