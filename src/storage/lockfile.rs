//! Output Lock - one chart writer per output directory, across processes.
//!
//! The lock file sits beside the directory it guards (`static/images` is
//! guarded by `static/.images.airsight.lock`), so the static file server never
//! publishes it. It holds the holder's PID and appears atomically: the PID is
//! written to a private staging file which is then hard-linked into place.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOCK_SUFFIX: &str = ".airsight.lock";
const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{} is being written by process {pid}", dir.display())]
    Held { dir: PathBuf, pid: u32 },
    #[error("lock for {} changed hands {ACQUIRE_ATTEMPTS} times while acquiring", dir.display())]
    Contended { dir: PathBuf },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Exclusive claim on an output directory. Released on drop.
#[derive(Debug)]
pub struct OutputLock {
    path: PathBuf,
}

impl OutputLock {
    /// Lock file guarding `output_dir`, in its parent directory.
    pub fn path_for(output_dir: &Path) -> PathBuf {
        let dir_name = output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let parent = output_dir.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{dir_name}{LOCK_SUFFIX}"))
    }

    pub async fn acquire(output_dir: &Path) -> Result<Self, LockError> {
        let path = Self::path_for(output_dir);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let pid = std::process::id();
        let mut staging = OsString::from(path.as_os_str());
        staging.push(format!(".{pid}.{}", Uuid::new_v4().simple()));
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, format!("{pid}\n"))
            .await
            .map_err(|e| io_error(&staging, e))?;

        let linked = link_into_place(&staging, &path, output_dir).await;
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            warn!(path = %staging.display(), error = %e, "Failed to remove lock staging file");
        }
        linked?;

        debug!(path = %path.display(), pid, "Output lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Output lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to release output lock"),
        }
    }
}

enum Holder {
    Live(u32),
    /// Dead process or unreadable PID.
    Stale(Option<u32>),
    /// Released between our link attempt and the read.
    Gone,
}

async fn link_into_place(staging: &Path, path: &Path, output_dir: &Path) -> Result<(), LockError> {
    for _ in 0..ACQUIRE_ATTEMPTS {
        match tokio::fs::hard_link(staging, path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_error(path, e)),
        }
        match current_holder(path).await? {
            Holder::Live(pid) => {
                return Err(LockError::Held {
                    dir: output_dir.to_path_buf(),
                    pid,
                })
            }
            Holder::Gone => {}
            Holder::Stale(pid) => {
                info!(path = %path.display(), stale_pid = ?pid, "Reclaiming stale output lock");
                match tokio::fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(io_error(path, e)),
                }
            }
        }
    }
    Err(LockError::Contended {
        dir: output_dir.to_path_buf(),
    })
}

async fn current_holder(path: &Path) -> Result<Holder, LockError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Holder::Gone),
        Err(e) => return Err(io_error(path, e)),
    };
    Ok(match contents.trim().parse::<u32>() {
        Ok(pid) if is_alive(pid).await => Holder::Live(pid),
        Ok(pid) => Holder::Stale(Some(pid)),
        Err(_) => Holder::Stale(None),
    })
}

async fn is_alive(pid: u32) -> bool {
    pid == std::process::id() || process_alive(pid).await
}

#[cfg(target_os = "linux")]
async fn process_alive(pid: u32) -> bool {
    // A recycled PID running another program counts as stale
    tokio::fs::read(format!("/proc/{pid}/cmdline"))
        .await
        .is_ok_and(|cmdline| String::from_utf8_lossy(&cmdline).contains("airsight"))
}

#[cfg(all(unix, not(target_os = "linux")))]
async fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks that the process exists.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
async fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_lives_beside_the_output_dir() {
        let path = OutputLock::path_for(Path::new("/srv/static/images"));
        assert_eq!(path, Path::new("/srv/static/.images.airsight.lock"));
        assert!(!path.starts_with("/srv/static/images"));
    }

    #[tokio::test]
    async fn test_acquire_writes_pid_and_no_staging_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("images");
        let lock = OutputLock::acquire(&out).await.unwrap();

        let pid: u32 = std::fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the lock file should remain");
    }

    #[tokio::test]
    async fn test_second_acquire_is_refused() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("images");
        let _held = OutputLock::acquire(&out).await.unwrap();
        match OutputLock::acquire(&out).await {
            Err(LockError::Held { pid, dir }) => {
                assert_eq!(pid, std::process::id());
                assert_eq!(dir, out);
            }
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_lock_is_reclaimed() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("images");
        for leftover in ["999999999\n", "garbage"] {
            std::fs::write(OutputLock::path_for(&out), leftover).unwrap();
            let lock = OutputLock::acquire(&out).await.unwrap();
            let contents = std::fs::read_to_string(lock.path()).unwrap();
            assert_eq!(contents.trim(), std::process::id().to_string());
        }
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("images");
        let path = {
            let lock = OutputLock::acquire(&out).await.unwrap();
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
        assert!(OutputLock::acquire(&out).await.is_ok());
    }
}
