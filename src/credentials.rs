// Saved sign-in state: the endpoint, who we are, and the opaque session
// token the auth endpoint issued. The token is stored as-is; it is already
// opaque to this client and is attached verbatim to every API call.

use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub server: String,
    pub user_id: String,
    pub username: String,
    pub token: String,
}

static CONFIG_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Point credential storage somewhere else. First call wins; used by tests.
pub fn set_config_path_override(path: PathBuf) {
    let _ = CONFIG_PATH_OVERRIDE.set(path);
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("could not determine config directory"))?
        .join("parley");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn get_config_path() -> Result<PathBuf> {
    if let Some(path) = CONFIG_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("credentials.json"))
}

pub fn save_credentials(credentials: &Credentials) -> Result<()> {
    let file = File::create(get_config_path()?)?;
    serde_json::to_writer_pretty(file, credentials)?;

    info!("credentials saved for {}", credentials.username);
    Ok(())
}

pub fn load_credentials() -> Result<Option<Credentials>> {
    let path = get_config_path()?;
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)?;
    let credentials: Credentials = serde_json::from_str(&contents)?;
    info!(
        "loaded credentials for {} from {}",
        credentials.username,
        path.display()
    );

    Ok(Some(credentials))
}

/// Sign out: forget the stored session.
pub fn clear_credentials() -> Result<()> {
    let path = get_config_path()?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        set_config_path_override(dir.path().join("credentials.json"));

        assert!(load_credentials().unwrap().is_none());

        let creds = Credentials {
            server: "http://127.0.0.1:5000".to_string(),
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            token: "tok-123".to_string(),
        };
        save_credentials(&creds).unwrap();

        let loaded = load_credentials().unwrap().expect("credentials saved");
        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.token, "tok-123");

        clear_credentials().unwrap();
        assert!(load_credentials().unwrap().is_none());
    }
}
