pub mod aiff;
pub mod file;
pub mod flac;
pub mod microphone;
mod probe;
pub mod source;
pub mod transform;
pub mod wav;

use std::io::{Read, Seek};

/// Формат нормализованного потока источника.
///
/// Описывает данные, которые возвращает `read`: mono, little-endian,
/// `sample_width` байт на сэмпл.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub sample_width: u16,
}

/// Источник байтов аудио-контейнера: файл, буфер или caller-reader.
///
/// Перемотка нужна каскаду проб форматов: каждая стратегия начинает
/// чтение с нулевой позиции.
pub trait ByteSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ByteSource for T {}

/// Ошибки аудио-источников.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("audio file could not be read as PCM WAV, AIFF/AIFF-C, or native FLAC; check that the file is not corrupted or in another format")]
    UnsupportedFormat,

    #[error("audio must be mono or stereo, got {channels} channels")]
    UnsupportedChannelLayout { channels: u16 },

    #[error("external FLAC decode failed: {0}")]
    ExternalDecode(String),

    #[error("audio source is already open")]
    AlreadyOpen,

    #[error("audio source is not open")]
    NotOpen,

    #[error("audio source stream was already consumed and cannot be reopened")]
    NotRewindable,

    #[error("no audio input device found")]
    NoInputDevice,

    #[error("invalid capture configuration: {0}")]
    InvalidConfiguration(String),

    #[error("audio capture failed: {0}")]
    CaptureFailed(String),

    #[error("audio i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Читает в `buf` столько байт, сколько доступно до EOF.
///
/// Возвращает число прочитанных байт; короткий результат означает
/// конец потока, а не ошибку.
pub(crate) fn read_fully(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
