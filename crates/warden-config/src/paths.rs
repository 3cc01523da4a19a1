//! On-disk layout resolution (§6 "Persisted layout"). Grounded on
//! `kimberlite-config::Paths`'s XDG-discovery shape, narrowed to paths and
//! process-level settings only: unlike the teacher's whole-document
//! `config`-crate overlay, plan content is never merged here — that's
//! `warden-plan`'s per-field replace/merge combinator (§4.1).

use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{ConfigError, ConfigResult};

const STATE_FILE_NAME: &str = ".warden.state";
const SOCKET_FILE_NAME: &str = ".warden.socket";
const LAYERS_DIR_NAME: &str = "layers";
const IDENTITY_FILE_NAME: &str = "identity";

/// The resolved configuration directory and the fixed paths derived from
/// it (§6 "Persisted layout").
#[derive(Debug, Clone)]
pub struct Paths {
    dir: PathBuf,
    socket: PathBuf,
}

impl Paths {
    /// `WARDEN_DIR` wins outright; otherwise the platform config dir
    /// (`~/.config/warden` on Linux, via `directories`).
    pub fn resolve() -> ConfigResult<Self> {
        let dir = match env::var_os("WARDEN_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "warden")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or(ConfigError::NoDefaultDir)?,
        };
        Ok(Self::with_dir(dir))
    }

    /// Build directly from an explicit directory, bypassing env/XDG
    /// discovery (tests, and any future `--dir` CLI flag).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let socket = match env::var_os("WARDEN_SOCKET") {
            Some(path) => PathBuf::from(path),
            None => dir.join(SOCKET_FILE_NAME),
        };
        Self { dir, socket }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_file(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    pub fn layers_dir(&self) -> PathBuf {
        self.dir.join(LAYERS_DIR_NAME)
    }

    pub fn identity_file(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILE_NAME)
    }

    /// `WARDEN_PERSIST=never` disables snapshot persistence entirely (§6).
    pub fn persist_enabled() -> bool {
        env::var("WARDEN_PERSIST").ok().as_deref() != Some("never")
    }

    /// Selects the log formatter (§B.1): compact human-readable by
    /// default, JSON lines when `WARDEN_VERBOSE` is set.
    pub fn verbose() -> bool {
        env::var_os("WARDEN_VERBOSE").is_some()
    }

    /// systemd watchdog interval in microseconds, when running under one
    /// (§6 `WATCHDOG_USEC`).
    pub fn watchdog_usec() -> Option<u64> {
        env::var("WATCHDOG_USEC").ok().and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_dir_derives_every_persisted_path_under_it() {
        let paths = Paths::with_dir("/tmp/warden-test-dir");
        assert_eq!(paths.state_file(), Path::new("/tmp/warden-test-dir/.warden.state"));
        assert_eq!(paths.layers_dir(), Path::new("/tmp/warden-test-dir/layers"));
        assert_eq!(paths.identity_file(), Path::new("/tmp/warden-test-dir/identity"));
        if env::var_os("WARDEN_SOCKET").is_none() {
            assert_eq!(paths.socket_path(), Path::new("/tmp/warden-test-dir/.warden.socket"));
        }
    }
}
