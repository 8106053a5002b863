use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::schema::CaptureConfig;
use crate::error::{CaptureError, Result};

/// Имя файла конфигурации.
const CONFIG_FILE_NAME: &str = "config.json";

/// Имя бэкапа поврежденного конфига.
const CONFIG_BACKUP_NAME: &str = "config.json.bak";

/// Каталог приложения внутри OS config dir.
const APP_DIR_NAME: &str = "voicecapture";

/// Возвращает путь к каталогу конфигурации.
///
/// Windows: `%APPDATA%/voicecapture/`
/// macOS: `~/Library/Application Support/voicecapture/`
/// Linux: `~/.config/voicecapture/`
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| {
        CaptureError::Config("failed to determine OS config directory".to_string())
    })?;
    Ok(base.join(APP_DIR_NAME))
}

/// Загружает конфиг из дефолтного каталога.
pub fn load_config() -> Result<CaptureConfig> {
    load_config_from(&config_dir()?)
}

/// Сохраняет конфиг в дефолтный каталог.
pub fn save_config(config: &CaptureConfig) -> Result<()> {
    save_config_to(&config_dir()?, config)
}

/// Загружает конфиг из JSON-файла в `dir`.
///
/// - Если файл не существует - возвращает дефолтный конфиг и сохраняет его.
/// - Если файл поврежден - логирует, создает бэкап, возвращает дефолтный.
pub fn load_config_from(dir: &Path) -> Result<CaptureConfig> {
    let path = dir.join(CONFIG_FILE_NAME);

    if !path.exists() {
        info!("Config file not found, creating default at {:?}", path);
        let config = CaptureConfig::default();
        save_config_to(dir, &config)?;
        return Ok(config);
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        CaptureError::Config(format!("failed to read config file {:?}: {}", path, e))
    })?;

    match serde_json::from_str::<CaptureConfig>(&content) {
        Ok(config) => {
            info!("Config loaded from {:?}", path);
            Ok(config)
        }
        Err(e) => {
            warn!(
                "Config file corrupted: {}. Backing up and using defaults.",
                e
            );
            let backup_path = dir.join(CONFIG_BACKUP_NAME);
            if let Err(backup_err) = fs::copy(&path, &backup_path) {
                warn!("Failed to create config backup: {}", backup_err);
            }
            let config = CaptureConfig::default();
            save_config_to(dir, &config)?;
            Ok(config)
        }
    }
}

/// Сохраняет конфиг в JSON-файл в `dir`.
///
/// Создает каталог при необходимости. Запись атомарная:
/// временный файл + переименование.
pub fn save_config_to(dir: &Path, config: &CaptureConfig) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        CaptureError::Config(format!("failed to create config directory {:?}: {}", dir, e))
    })?;

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| CaptureError::Config(format!("failed to serialize config: {}", e)))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let tmp_path = dir.join("config.json.tmp");
    fs::write(&tmp_path, &json).map_err(|e| {
        CaptureError::Config(format!(
            "failed to write temp config file {:?}: {}",
            tmp_path, e
        ))
    })?;

    fs::rename(&tmp_path, &path).map_err(|e| {
        CaptureError::Config(format!("failed to rename temp config to {:?}: {}", path, e))
    })?;

    info!("Config saved to {:?}", path);
    Ok(())
}
