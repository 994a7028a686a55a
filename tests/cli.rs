//! The `depbuild` binary, run the way a host build script would

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const MANIFEST: &str = r#"
[settings]
root = "deps"
install_root = "prefix"

[[locate]]
name = "libx"
header = "x.h"
library = "x"
required = true

[[locate]]
name = "optional-zlib"
header = "zlib.h"
"#;

fn depbuild(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_depbuild"))
        .current_dir(dir)
        .args(args)
        .env_remove("DEPBUILD_ROOT")
        .env_remove("DEPBUILD_INSTALL_ROOT")
        .output()
        .unwrap()
}

fn installed_libx() -> TempDir {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path().join("prefix");
    std::fs::create_dir_all(prefix.join("include")).unwrap();
    std::fs::create_dir_all(prefix.join("lib")).unwrap();
    std::fs::write(prefix.join("include/x.h"), "int x(void);\n").unwrap();
    std::fs::write(prefix.join("lib/libx.a"), "!<arch>\n").unwrap();
    std::fs::write(dir.path().join("depbuild.toml"), MANIFEST).unwrap();
    dir
}

#[test]
fn test_locate_stdout_is_json_with_absolute_paths() {
    let dir = installed_libx();
    let out = depbuild(dir.path(), &["locate", "depbuild.toml"]);
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);

    let prefix = std::fs::canonicalize(dir.path()).unwrap().join("prefix");
    let libx = &entries[0];
    assert_eq!(libx["name"], "libx");
    assert_eq!(libx["found"], true);

    let include = Path::new(libx["interface"]["include_dirs"][0].as_str().unwrap());
    let library = Path::new(libx["interface"]["link_libraries"][0].as_str().unwrap());
    assert!(include.is_absolute());
    assert!(library.is_absolute());
    assert_eq!(std::fs::canonicalize(include).unwrap(), prefix.join("include"));
    assert_eq!(std::fs::canonicalize(library).unwrap(), prefix.join("lib/libx.a"));

    assert_eq!(entries[1]["found"], false);
    // The optional miss is reported, just not on stdout
    assert!(String::from_utf8_lossy(&out.stderr).contains("optional-zlib"));
}

#[test]
fn test_locate_missing_required_fails_with_empty_stdout() {
    let dir = installed_libx();
    std::fs::remove_file(dir.path().join("prefix/lib/libx.a")).unwrap();

    let out = depbuild(dir.path(), &["locate", "depbuild.toml"]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("libx"));
}

#[test]
fn test_status_reports_where_a_rerun_resumes() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("depbuild.toml"),
        r#"
[settings]
root = "deps"

[[package]]
name = "libx"
url = "https://example.com/libx-1.0.tar.gz"

[[package]]
name = "liby"
url = "https://example.com/liby-1.0.tar.gz"
"#,
    )
    .unwrap();
    let stamps = dir.path().join("deps/libx");
    std::fs::create_dir_all(&stamps).unwrap();
    for stamp in ["download.stamp", "source.stamp", "config.stamp"] {
        std::fs::write(stamps.join(stamp), "0\n").unwrap();
    }

    let out = depbuild(dir.path(), &["status"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("libx: resumes after configured"), "{stdout}");
    assert!(stdout.contains("liby: not started"), "{stdout}");
}
