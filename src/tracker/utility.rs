//! General utility functions.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Name of the folder holding settings and logs
const TRACKER_FOLDER: &str = ".pricetracker";

/// Resolve `(base, tracker)` directories.
///
/// A tracker folder in the working directory wins over the one in the home directory.
fn get_tracker_dir(temp_name: &str) -> (PathBuf, PathBuf) {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let temp_path = cwd.join(temp_name);

    if temp_path.exists() {
        return (cwd, temp_path);
    }

    let home_path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let temp_path = home_path.join(temp_name);

    if !temp_path.exists() {
        let _ = fs::create_dir_all(&temp_path);
    }

    (home_path, temp_path)
}

/// Tracker directory
pub static TRACKER_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    let (_, tracker_dir) = get_tracker_dir(TRACKER_FOLDER);
    tracker_dir
});

/// Get path for a file in the tracker directory
pub fn get_file_path(filename: &str) -> PathBuf {
    TRACKER_DIR.join(filename)
}

/// Get path for a folder in the tracker directory, creating it if needed
pub fn get_folder_path(folder_name: &str) -> PathBuf {
    ensure_folder(&TRACKER_DIR.join(folder_name))
}

fn ensure_folder(folder_path: &Path) -> PathBuf {
    if !folder_path.exists() {
        let _ = fs::create_dir_all(folder_path);
    }
    folder_path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_folder_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("log").join("daily");

        let path = ensure_folder(&nested);
        assert!(path.is_dir());
        assert_eq!(path, nested);
    }

    #[test]
    fn test_file_path_inside_tracker_dir() {
        let path = get_file_path("tracker_setting.json");
        assert!(path.starts_with(&*TRACKER_DIR));
        assert!(path.ends_with("tracker_setting.json"));
    }
}
