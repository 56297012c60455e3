use super::settings::{Config, ConfigError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Holder for the current config snapshot
///
/// Readers take an `Arc<Config>` and keep it for the whole request, so a
/// reload in the middle of a dispatch never changes the policy that dispatch
/// is evaluated against. Reloads replace the whole `Arc`.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<Config>>,
    source: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            source: None,
        }
    }

    /// Load the initial snapshot from a file and remember it for reloads
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::load(path.as_ref())?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            source: Some(path.as_ref().to_path_buf()),
        })
    }

    /// The snapshot in effect right now
    pub fn snapshot(&self) -> Arc<Config> {
        // A poisoned lock still holds a complete Arc; writers never leave it torn.
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Swap in a new snapshot
    pub fn replace(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        let next = Arc::new(config);

        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }

    /// Re-read the file this store was opened from
    ///
    /// On any error the previous snapshot stays in effect.
    pub fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        let Some(path) = &self.source else {
            return Ok(self.snapshot());
        };

        let config = Config::load(path)?;
        self.replace(config)?;
        info!(path = %path.display(), "configuration reloaded");
        Ok(self.snapshot())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(machine: &str) -> Config {
        Config::new(machine, ["/srv"], [1_i64], ["status"])
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let store = ConfigStore::new(config("home"));
        let before = store.snapshot();

        store.replace(config("office")).unwrap();

        assert_eq!(before.machine_name, "home");
        assert_eq!(store.snapshot().machine_name, "office");
    }

    #[test]
    fn test_replace_rejects_invalid_config() {
        let store = ConfigStore::new(config("home"));
        assert!(store.replace(config("")).is_err());
        assert_eq!(store.snapshot().machine_name, "home");
    }

    #[test]
    fn test_reload_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gitgate.toml");
        let write = |machine: &str| {
            fs::write(
                &path,
                format!(
                    "machine_name = \"{}\"\nallowed_paths = [\"/srv\"]\nallowed_user_ids = [1]\nallowed_git_commands = [\"status\"]\n",
                    machine
                ),
            )
            .unwrap();
        };

        write("home");
        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.source(), Some(path.as_path()));

        write("laptop");
        let reloaded = store.reload().unwrap();
        assert_eq!(reloaded.machine_name, "laptop");
    }

    #[test]
    fn test_failed_reload_keeps_previous() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gitgate.toml");
        fs::write(
            &path,
            "machine_name = \"home\"\nallowed_paths = [\"/srv\"]\nallowed_user_ids = [1]\nallowed_git_commands = [\"status\"]\n",
        )
        .unwrap();

        let store = ConfigStore::open(&path).unwrap();
        fs::write(&path, "machine_name = ").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().machine_name, "home");
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = Arc::new(ConfigStore::new(config("a")));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snap = store.snapshot();
                        assert!(snap.machine_name == "a" || snap.machine_name == "b");
                        assert_eq!(snap.allowed_paths.len(), 1);
                    }
                })
            })
            .collect();

        for i in 0..100 {
            let name = if i % 2 == 0 { "b" } else { "a" };
            store.replace(config(name)).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
