//! Test fixtures: source archives and shell-based stage commands

#![allow(dead_code)]

use levitate_depbuild::{Declaration, PackageDescriptor, PipelineContext};
use sha2::Digest;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch root, install prefix and a directory for fixtures.
pub struct TestEnv {
    pub dir: TempDir,
    pub root: PathBuf,
    pub prefix: PathBuf,
    pub fixtures: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("deps");
        let prefix = dir.path().join("install root");
        let fixtures = dir.path().join("fixtures");
        std::fs::create_dir_all(&fixtures).unwrap();
        Self {
            dir,
            root,
            prefix,
            fixtures,
        }
    }

    pub fn context(&self) -> PipelineContext {
        PipelineContext::new(&self.root, &self.prefix)
    }

    /// File every stage command appends its name to.
    pub fn runs_log(&self) -> PathBuf {
        self.fixtures.join("runs.log")
    }

    pub fn runs(&self) -> Vec<String> {
        std::fs::read_to_string(self.runs_log())
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn stamp(&self, name: &str, stamp: &str) -> PathBuf {
        self.package_dir(name).join(stamp)
    }

    /// Write a `.tar.gz` fixture and return its `file://` URL.
    pub fn archive(&self, file_name: &str, entries: &[(&str, &str)]) -> String {
        let path = self.fixtures.join(file_name);
        write_tar_gz(&path, entries);
        format!("file://{}", path.display())
    }
}

pub fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

pub fn sha256_digest(url: &str) -> String {
    let path = url.trim_start_matches("file://");
    let bytes = std::fs::read(path).unwrap();
    format!("SHA256={}", hex::encode(sha2::Sha256::digest(bytes)))
}

/// `sh -c` override that records `label` in the runs log, then runs `script`.
/// The install prefix is available to the script as `$1`.
pub fn shell(env: &TestEnv, label: &str, script: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "echo {} >> '{}' && {}",
            label,
            env.runs_log().display(),
            script
        ),
        "sh".to_string(),
        "<INSTALL_DIR>".to_string(),
    ]
}

/// The libx fixture: a wrapped source tree whose install step copies a
/// static library into `<prefix>/lib`.
pub fn libx(env: &TestEnv) -> Declaration {
    let url = env.archive(
        "libx-1.0.tar.gz",
        &[
            ("libx-1.0/CMakeLists.txt", "project(libx C)\n"),
            ("libx-1.0/libx.a", "!<arch>\n"),
            ("libx-1.0/include/x.h", "int x(void);\n"),
        ],
    );
    Declaration {
        name: "libx".to_string(),
        digest: Some(sha256_digest(&url)),
        url: Some(url),
        configure: Some(shell(env, "configure", "test -f ../src/CMakeLists.txt")),
        build: Some(shell(env, "build", "cp ../src/libx.a .")),
        install: Some(shell(
            env,
            "install",
            "mkdir -p \"$1/lib\" \"$1/include\" && cp libx.a \"$1/lib/\" && cp ../src/include/x.h \"$1/include/\"",
        )),
        ..Default::default()
    }
}

pub fn descriptor(decl: Declaration) -> PackageDescriptor {
    PackageDescriptor::from_declaration(decl).unwrap()
}
