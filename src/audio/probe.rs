//! Каскад проб формата: WAV -> AIFF -> FLAC через внешний декодер.
//!
//! Стратегии пробуются по порядку, побеждает первая успешная.
//! Промежуточные ошибки стратегий наружу не выходят: вызывающий
//! получает либо читатель, либо терминальную ошибку формата.

use std::io::{Cursor, Read, Seek, SeekFrom};

use super::aiff::{AiffHeader, AiffReader};
use super::flac;
use super::wav::{WavHeader, WavReader};
use super::{ByteSource, Result, SourceError};

/// Читатель PCM-кадров, выбранный каскадом.
pub(crate) enum PcmReader {
    Wav(WavReader),
    Aiff(AiffReader),
}

impl PcmReader {
    pub(crate) fn channels(&self) -> u16 {
        match self {
            PcmReader::Wav(r) => r.channels(),
            PcmReader::Aiff(r) => r.channels(),
        }
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        match self {
            PcmReader::Wav(r) => r.sample_rate(),
            PcmReader::Aiff(r) => r.sample_rate(),
        }
    }

    pub(crate) fn sample_width(&self) -> u16 {
        match self {
            PcmReader::Wav(r) => r.sample_width(),
            PcmReader::Aiff(r) => r.sample_width(),
        }
    }

    pub(crate) fn frame_count(&self) -> u64 {
        match self {
            PcmReader::Wav(r) => r.frame_count(),
            PcmReader::Aiff(r) => r.frame_count(),
        }
    }

    pub(crate) fn read_frames(&mut self, max_frames: u64) -> std::io::Result<Vec<u8>> {
        match self {
            PcmReader::Wav(r) => r.read_frames(max_frames),
            PcmReader::Aiff(r) => r.read_frames(max_frames),
        }
    }
}

/// Результат успешной пробы.
pub(crate) struct ProbeResult {
    pub reader: PcmReader,
    pub little_endian: bool,
}

/// Пробует входные байты всеми поддержанными декодерами по порядку.
///
/// После успешного открытия проверяет число каналов: допустимы
/// только mono и stereo.
pub(crate) fn probe(mut input: Box<dyn ByteSource>) -> Result<ProbeResult> {
    // 1. Несжатый little-endian PCM (WAV)
    input.seek(SeekFrom::Start(0))?;
    match WavHeader::parse(&mut *input) {
        Ok(header) => {
            let reader = WavReader::from_parts(input, header)?;
            return validate(ProbeResult {
                reader: PcmReader::Wav(reader),
                little_endian: true,
            });
        }
        Err(e) => log_strategy_miss("WAV", &e.to_string()),
    }

    // 2. Несжатый big-endian PCM (AIFF/AIFF-C)
    input.seek(SeekFrom::Start(0))?;
    match AiffHeader::parse(&mut *input) {
        Ok(header) => {
            let reader = AiffReader::from_parts(input, header)?;
            return validate(ProbeResult {
                reader: PcmReader::Aiff(reader),
                little_endian: false,
            });
        }
        Err(e) => log_strategy_miss("AIFF", &e.to_string()),
    }

    // 3. FLAC: полный ввод декодируется внешним декодером в AIFF
    input.seek(SeekFrom::Start(0))?;
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let decoded = flac::decode_to_aiff(raw)?;
    let mut cursor: Box<dyn ByteSource> = Box::new(Cursor::new(decoded));
    match AiffHeader::parse(&mut *cursor) {
        Ok(header) => {
            let reader = AiffReader::from_parts(cursor, header)?;
            validate(ProbeResult {
                reader: PcmReader::Aiff(reader),
                little_endian: false,
            })
        }
        Err(e) => {
            log_strategy_miss("decoded FLAC", &e.to_string());
            Err(SourceError::UnsupportedFormat)
        }
    }
}

fn validate(result: ProbeResult) -> Result<ProbeResult> {
    let channels = result.reader.channels();
    if !(1..=2).contains(&channels) {
        return Err(SourceError::UnsupportedChannelLayout { channels });
    }
    tracing::debug!(
        channels,
        sample_rate = result.reader.sample_rate(),
        sample_width = result.reader.sample_width(),
        little_endian = result.little_endian,
        "audio format probed"
    );
    Ok(result)
}

fn log_strategy_miss(strategy: &str, error: &str) {
    tracing::debug!(strategy, error, "format strategy did not match");
}
