use serde::{Deserialize, Serialize};

use crate::audio::microphone::DeviceSpec;
use crate::listen::ListenConfig;

/// Основная структура конфигурации захвата.
///
/// Хранится в JSON-файле в config dir пользователя. Настройки
/// устройства передаются в конструктор `Microphone` явно.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Версия схемы конфига (для будущих миграций)
    pub config_version: u32,

    /// Имя устройства захвата; `None` - дефолтное устройство хоста
    pub input_device: Option<String>,

    /// Захватывать системный вывод (loopback) вместо микрофона
    pub capture_speaker: bool,

    /// Частота дискретизации; `None` - нативная частота устройства
    pub sample_rate: Option<u32>,

    /// Размер чтения в кадрах
    pub chunk_size: usize,

    /// Настройки детекции фраз
    pub listen: ListenConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            config_version: 1,
            input_device: None,
            capture_speaker: false,
            sample_rate: None,
            chunk_size: 1024,
            listen: ListenConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Конфигурация устройства для `Microphone::new`.
    pub fn device_spec(&self) -> DeviceSpec {
        DeviceSpec {
            device_name: self.input_device.clone(),
            capture_speaker: self.capture_speaker,
            sample_rate: self.sample_rate,
            chunk_size: self.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_should_have_expected_values() {
        // Given / When
        let config = CaptureConfig::default();

        // Then
        assert_eq!(config.config_version, 1);
        assert_eq!(config.input_device, None);
        assert!(!config.capture_speaker);
        assert_eq!(config.sample_rate, None);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.listen, ListenConfig::default());
    }

    #[test]
    fn config_should_roundtrip_json_serialization() {
        // Given
        let config = CaptureConfig {
            input_device: Some("USB Microphone".to_string()),
            sample_rate: Some(16_000),
            ..Default::default()
        };

        // When
        let json = serde_json::to_string_pretty(&config).expect("serialize");
        let restored: CaptureConfig = serde_json::from_str(&json).expect("deserialize");

        // Then
        assert_eq!(restored, config);
    }

    #[test]
    fn device_spec_should_mirror_device_fields() {
        // Given
        let config = CaptureConfig {
            input_device: Some("Loopback".to_string()),
            capture_speaker: true,
            sample_rate: Some(44_100),
            chunk_size: 2048,
            ..Default::default()
        };

        // When
        let spec = config.device_spec();

        // Then
        assert_eq!(spec.device_name.as_deref(), Some("Loopback"));
        assert!(spec.capture_speaker);
        assert_eq!(spec.sample_rate, Some(44_100));
        assert_eq!(spec.chunk_size, 2048);
    }
}
