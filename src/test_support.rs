//! Helpers shared by unit tests: local bare remotes, quick commits,
//! unresponsive servers and scoped environment variables.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use git2::{Oid, Repository};

use crate::config::BackupConfig;
use crate::git::{Staging, commit_all};

/// Create an empty bare repository at `<dir>/remote.git`.
pub fn bare_remote(dir: &Path) -> PathBuf {
    let path = dir.join("remote.git");
    Repository::init_bare(&path).unwrap();
    path
}

/// Write `name` into the working tree, stage it and commit everything.
pub fn commit_file(repo: &Repository, name: &str, content: &str) -> Oid {
    let root = repo.workdir().unwrap().to_path_buf();
    fs::write(root.join(name), content).unwrap();
    let mut staging = Staging::open(repo).unwrap();
    staging.add(Path::new(name)).unwrap();
    staging.write().unwrap();
    commit_all(repo, "tester", "tester@example.com", "test").unwrap()
}

/// URL of an HTTP server that accepts connections and never answers.
///
/// The accepted sockets are kept open for the life of the test process.
pub fn silent_remote() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut held = Vec::new();
        for conn in listener.incoming().flatten() {
            held.push(conn);
        }
    });
    format!("http://{}/remote.git", addr)
}

/// Run `f` on its own thread and fail the test if it has not returned
/// within `limit`.
pub fn within<T, F>(limit: Duration, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    match rx.recv_timeout(limit) {
        Ok(v) => v,
        Err(mpsc::RecvTimeoutError::Timeout) => panic!("still blocked after {:?}", limit),
        Err(mpsc::RecvTimeoutError::Disconnected) => panic!("worker thread panicked"),
    }
}

/// An enabled configuration mirroring into `local` from the bare repo `remote`.
pub fn enabled_config(remote: &Path, local: &Path) -> BackupConfig {
    BackupConfig {
        enabled: true,
        author_name: "lb-api".into(),
        author_email: "lb-api@example.com".into(),
        remote_url: remote.to_string_lossy().into_owned(),
        local_repo_path: local.to_path_buf(),
        remote_username: "lb-api".into(),
        remote_credential: "token".into(),
        network_timeout_secs: 30,
    }
}

/// Sets environment variables for the lifetime of the guard and restores
/// the previous values on drop. Callers must be `#[serial]`.
pub struct EnvGuard(Vec<(&'static str, Option<OsString>)>);

impl EnvGuard {
    pub fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
        let saved = vars.iter().map(|(k, _)| (*k, env::var_os(k))).collect();
        for (k, v) in vars {
            restore(k, v.map(OsString::from));
        }
        EnvGuard(saved)
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (k, v) in self.0.drain(..) {
            restore(k, v);
        }
    }
}

fn restore(key: &str, value: Option<OsString>) {
    // SAFETY: every test that touches the environment runs under #[serial].
    unsafe {
        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }
}
