pub mod clip;
pub mod listener;

use serde::{Deserialize, Serialize};

use crate::audio::SourceError;

/// Ошибки модуля прослушивания.
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("listening timed out while waiting for phrase to start")]
    WaitTimeout,

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, ListenError>;

/// Настройки детекции фраз по энергии сигнала.
///
/// Дефолты подобраны под типичную речь у микрофона.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Минимальная энергия (RMS), считающаяся речью
    pub energy_threshold: f64,

    /// Подстраивать порог под фоновый шум автоматически
    pub dynamic_energy_threshold: bool,

    /// Демпфирование подстройки порога (за секунду)
    pub dynamic_energy_damping: f64,

    /// Множитель целевой энергии при подстройке
    pub dynamic_energy_ratio: f64,

    /// Секунды тишины, завершающие фразу
    pub pause_threshold_sec: f64,

    /// Минимальная длительность речи, считающаяся фразой
    pub phrase_threshold_sec: f64,

    /// Сколько тишины оставлять по краям фразы
    pub non_speaking_duration_sec: f64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            energy_threshold: 300.0,
            dynamic_energy_threshold: true,
            dynamic_energy_damping: 0.15,
            dynamic_energy_ratio: 1.5,
            pause_threshold_sec: 0.8,
            phrase_threshold_sec: 0.3,
            non_speaking_duration_sec: 0.5,
        }
    }
}
