use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("intervalz"))
        } else {
            ProjectDirs::from("", "", "intervalz").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn library_path() -> PathBuf {
        Self::in_state_dir("library.db")
    }

    pub fn journal_path() -> PathBuf {
        Self::in_state_dir("journal.db")
    }

    pub fn log_path() -> PathBuf {
        Self::in_state_dir("intervalz.log")
    }

    fn in_state_dir(file: &str) -> PathBuf {
        Self::state_dir()
            .map(|dir| dir.join(file))
            .unwrap_or_else(|| PathBuf::from(format!("intervalz_{}", file)))
    }
}
