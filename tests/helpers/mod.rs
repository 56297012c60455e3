#![allow(dead_code)]

use gitgate::Config;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// An allowed root with one initialized repository inside it
pub struct Workspace {
    _temp_dir: TempDir,
    pub base: PathBuf,
    pub root: PathBuf,
    pub repo: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().canonicalize().unwrap();
        let root = base.join("projects");
        let repo = root.join("app");
        fs::create_dir_all(&repo).unwrap();
        init_repo(&repo);

        Self {
            _temp_dir: temp_dir,
            base,
            root,
            repo,
        }
    }

    /// Config for machine "home", requester 42, and the given subcommands
    pub fn config(&self, commands: &[&str]) -> Config {
        Config::new("home", [&self.root], [42_i64], commands.iter().copied())
    }

    pub fn repo_str(&self) -> &str {
        self.repo.to_str().unwrap()
    }

    /// Another directory under the root, optionally made a repository
    pub fn add_dir(&self, name: &str, repository: bool) -> PathBuf {
        let path = self.root.join(name);
        fs::create_dir_all(&path).unwrap();
        if repository {
            init_repo(&path);
        }
        path
    }
}

/// Helper to create a test git repository
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().canonicalize().unwrap();
    init_repo(&repo_path);
    (temp_dir, repo_path)
}

fn init_repo(repo_path: &Path) {
    Command::new("git")
        .args(["init"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to init git repo");

    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to set git user.name");

    Command::new("git")
        .args(["config", "user.email", "test@example.com"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to set git user.email");
}

/// Helper to create a commit
pub fn create_commit(repo_path: &Path, file: &str, content: &str, message: &str) {
    fs::write(repo_path.join(file), content).expect("Failed to write file");

    Command::new("git")
        .args(["add", file])
        .current_dir(repo_path)
        .output()
        .expect("Failed to add file");

    Command::new("git")
        .args(["commit", "-m", message])
        .current_dir(repo_path)
        .output()
        .expect("Failed to commit");
}

/// Write an executable `/bin/sh` script that stands in for the git binary
#[cfg(unix)]
pub fn write_fake_git(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-git");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
