//! Wizard progress remembered between runs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use looptracks_ble_controller::WizardProgress;
use serde::{Deserialize, Serialize};

/// `$LOOPTRACKS_HOME`, defaulting to `~/.looptracks`
pub fn looptracks_home() -> io::Result<PathBuf> {
    let home = match std::env::var("LOOPTRACKS_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?
            .join(".looptracks"),
    };

    fs::create_dir_all(&home)?;
    Ok(home)
}

pub fn settings_path() -> io::Result<PathBuf> {
    Ok(looptracks_home()?.join("settings.json"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub wifi_done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_system: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<String>,
}

impl Settings {
    /// Load settings, or defaults if the file does not exist yet
    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, data)
    }

    /// Tokens that no longer parse are treated as not set
    pub fn progress(&self) -> WizardProgress {
        WizardProgress {
            wifi_done: self.wifi_done,
            train_system: self.train_system.as_deref().and_then(|s| s.parse().ok()),
            colors: self.colors.iter().filter_map(|s| s.parse().ok()).collect(),
        }
    }

    pub fn from_progress(progress: &WizardProgress) -> Self {
        Self {
            wifi_done: progress.wifi_done,
            train_system: progress.train_system.map(|t| t.to_string()),
            colors: progress.colors.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looptracks_proto::{LineColor, TransitSystem};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("looptracks-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join("settings.json")
    }

    #[test]
    fn missing_file_is_default() {
        let path = scratch("missing");
        let _ = fs::remove_file(&path);
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn saved_progress_is_restored() {
        let path = scratch("saved");
        let progress = WizardProgress {
            wifi_done: true,
            train_system: Some(TransitSystem::Mbta),
            colors: vec![LineColor::Green2, LineColor::Red],
        };

        Settings::from_progress(&progress).save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();

        assert_eq!(loaded.train_system.as_deref(), Some("mbta"));
        assert_eq!(loaded.colors, vec!["green2", "red"]);
        assert_eq!(loaded.progress(), progress);
    }

    #[test]
    fn unknown_tokens_are_dropped() {
        let settings: Settings =
            serde_json::from_str(r#"{"train_system": "bart", "colors": ["purple", "blue"]}"#)
                .unwrap();
        let progress = settings.progress();

        assert!(!progress.wifi_done);
        assert_eq!(progress.train_system, None);
        assert_eq!(progress.colors, vec![LineColor::Blue]);
    }
}
