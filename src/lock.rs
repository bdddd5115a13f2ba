use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Guards against two bot processes polling the same token.
/// The lock file holds the owner's pid and is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => io::Error::new(
                    e.kind(),
                    format!(
                        "{} exists, another instance is running (remove it if not)",
                        path.display()
                    ),
                ),
                _ => e,
            })?;
        write!(file, "{}", std::process::id())?;
        Ok(Self { path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to remove lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let path = std::env::temp_dir().join(format!("dept-tasks-bot-{}.lock", std::process::id()));
        let _ = fs::remove_file(&path);

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), std::process::id().to_string());

        let err = InstanceLock::acquire(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        drop(lock);
        assert!(!path.exists());
        drop(InstanceLock::acquire(&path).unwrap());
    }
}
