//! Захваченный фрагмент аудио.

use crate::audio::wav::write_wav;

/// Неизменяемый фрагмент mono little-endian PCM.
///
/// Хранит данные вместе с форматом, чтобы потребитель мог
/// сериализовать или передать их дальше без источника.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    data: Vec<u8>,
    sample_rate: u32,
    sample_width: u16,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, sample_rate: u32, sample_width: u16) -> AudioClip {
        AudioClip {
            data,
            sample_rate,
            sample_width,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_width(&self) -> u16 {
        self.sample_width
    }

    /// Сырые PCM-байты фрагмента.
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw_data(self) -> Vec<u8> {
        self.data
    }

    /// Фрагмент, сериализованный в готовый WAV-файл.
    pub fn wav_data(&self) -> Vec<u8> {
        write_wav(&self.data, self.sample_rate, self.sample_width, 1)
    }

    /// Длительность фрагмента в секундах.
    pub fn duration_secs(&self) -> f64 {
        let frames = self.data.len() / usize::from(self.sample_width).max(1);
        frames as f64 / f64::from(self.sample_rate.max(1))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
