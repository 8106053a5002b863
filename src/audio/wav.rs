//! Чтение и запись RIFF/WAVE-контейнеров с несжатым little-endian PCM.
//!
//! Поддерживается только WAVE_FORMAT_PCM; расширенные и сжатые
//! варианты отклоняются на этапе разбора заголовка.

use std::io::{Read, Seek, SeekFrom};

use super::{read_fully, ByteSource};

/// PCM-тег в chunk-е `fmt `.
const WAVE_FORMAT_PCM: u16 = 1;

/// Ошибки разбора WAV-контейнера.
#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("not a RIFF/WAVE file")]
    NotWave,

    #[error("unsupported WAV encoding: format tag {0}")]
    UnsupportedEncoding(u16),

    #[error("malformed WAV container: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WavError>;

/// Разобранный заголовок WAV: формат PCM-данных и позиция data-chunk-а.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    /// Байт на сэмпл одного канала.
    pub sample_width: u16,
    pub frame_count: u64,
    pub data_start: u64,
}

impl WavHeader {
    /// Разбирает заголовок с текущей позиции (ожидается начало файла).
    pub(crate) fn parse(input: &mut dyn ByteSource) -> Result<WavHeader> {
        let mut riff = [0u8; 12];
        input.read_exact(&mut riff).map_err(|_| WavError::NotWave)?;
        if &riff[..4] != b"RIFF" || &riff[8..] != b"WAVE" {
            return Err(WavError::NotWave);
        }

        let mut fmt: Option<(u16, u32, u16, u16)> = None;
        loop {
            let mut chunk_header = [0u8; 8];
            input
                .read_exact(&mut chunk_header)
                .map_err(|_| WavError::Malformed("missing fmt or data chunk"))?;
            let chunk_id = &chunk_header[..4];
            let chunk_size = u32::from_le_bytes([
                chunk_header[4],
                chunk_header[5],
                chunk_header[6],
                chunk_header[7],
            ]);

            match chunk_id {
                b"fmt " => {
                    if chunk_size < 16 {
                        return Err(WavError::Malformed("fmt chunk too short"));
                    }
                    let mut body = [0u8; 16];
                    input.read_exact(&mut body)?;
                    let format_tag = u16::from_le_bytes([body[0], body[1]]);
                    if format_tag != WAVE_FORMAT_PCM {
                        return Err(WavError::UnsupportedEncoding(format_tag));
                    }
                    let channels = u16::from_le_bytes([body[2], body[3]]);
                    let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                    let block_align = u16::from_le_bytes([body[12], body[13]]);
                    let bits_per_sample = u16::from_le_bytes([body[14], body[15]]);
                    if channels == 0 {
                        return Err(WavError::Malformed("zero channel count"));
                    }
                    if sample_rate == 0 {
                        return Err(WavError::Malformed("zero sample rate"));
                    }
                    if bits_per_sample == 0 || bits_per_sample % 8 != 0 {
                        return Err(WavError::Malformed("sample size is not a whole byte count"));
                    }
                    let sample_width = bits_per_sample / 8;
                    if sample_width > 4 {
                        return Err(WavError::Malformed("sample width above 4 bytes"));
                    }
                    if block_align != channels * sample_width {
                        return Err(WavError::Malformed("block align does not match format"));
                    }
                    if chunk_size > 16 {
                        skip(input, padded(chunk_size) as i64 - 16)?;
                    }
                    fmt = Some((channels, sample_rate, sample_width, block_align));
                }
                b"data" => {
                    let (channels, sample_rate, sample_width, block_align) =
                        fmt.ok_or(WavError::Malformed("data chunk before fmt chunk"))?;
                    let data_start = input.stream_position()?;
                    return Ok(WavHeader {
                        channels,
                        sample_rate,
                        sample_width,
                        frame_count: u64::from(chunk_size) / u64::from(block_align),
                        data_start,
                    });
                }
                _ => skip(input, padded(chunk_size) as i64)?,
            }
        }
    }

    pub(crate) fn frame_size(&self) -> usize {
        usize::from(self.channels) * usize::from(self.sample_width)
    }
}

/// Chunk-и RIFF выравниваются на четную границу.
fn padded(size: u32) -> u64 {
    u64::from(size) + u64::from(size & 1)
}

fn skip(input: &mut dyn ByteSource, bytes: i64) -> Result<()> {
    input.seek(SeekFrom::Current(bytes))?;
    Ok(())
}

/// Потоковый читатель PCM-кадров из WAV-файла.
///
/// Кадры читаются с текущей позиции; курсор двигается только вперед.
pub struct WavReader {
    input: Box<dyn ByteSource>,
    header: WavHeader,
    frames_read: u64,
}

impl WavReader {
    /// Открывает читатель: разбирает заголовок и встает на начало данных.
    pub fn open(mut input: Box<dyn ByteSource>) -> Result<WavReader> {
        let header = WavHeader::parse(&mut *input)?;
        WavReader::from_parts(input, header).map_err(WavError::Io)
    }

    /// Собирает читатель из уже разобранного заголовка.
    pub(crate) fn from_parts(
        mut input: Box<dyn ByteSource>,
        header: WavHeader,
    ) -> std::io::Result<WavReader> {
        input.seek(SeekFrom::Start(header.data_start))?;
        Ok(WavReader {
            input,
            header,
            frames_read: 0,
        })
    }

    pub fn channels(&self) -> u16 {
        self.header.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    pub fn sample_width(&self) -> u16 {
        self.header.sample_width
    }

    pub fn frame_count(&self) -> u64 {
        self.header.frame_count
    }

    /// Читает до `max_frames` кадров сырых little-endian байт.
    ///
    /// Короткий (вплоть до пустого) буфер означает конец данных.
    pub fn read_frames(&mut self, max_frames: u64) -> std::io::Result<Vec<u8>> {
        let frame_size = self.header.frame_size();
        let remaining = self.header.frame_count.saturating_sub(self.frames_read);
        let wanted = remaining.min(max_frames) as usize;
        let mut buf = vec![0u8; wanted * frame_size];
        let got = read_fully(&mut self.input, &mut buf)?;
        let whole = got - got % frame_size.max(1);
        buf.truncate(whole);
        self.frames_read += (whole / frame_size.max(1)) as u64;
        Ok(buf)
    }
}

/// Сериализует PCM-буфер в готовый WAV-файл.
///
/// Заголовок собирается вручную, little-endian, по канонической
/// 44-байтовой форме.
pub fn write_wav(data: &[u8], sample_rate: u32, sample_width: u16, channels: u16) -> Vec<u8> {
    let block_align = sample_width * channels;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = data.len() as u32;

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&(sample_width * 8).to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader_over(bytes: Vec<u8>) -> Result<WavReader> {
        WavReader::open(Box::new(Cursor::new(bytes)))
    }

    #[test]
    fn reader_should_parse_own_writer_output() {
        // Given: 1 секунда mono 16kHz 16-bit
        let data = vec![0u8; 32_000];
        let wav = write_wav(&data, 16_000, 2, 1);

        // When
        let reader = reader_over(wav).expect("parse");

        // Then
        assert_eq!(reader.channels(), 1);
        assert_eq!(reader.sample_rate(), 16_000);
        assert_eq!(reader.sample_width(), 2);
        assert_eq!(reader.frame_count(), 16_000);
    }

    #[test]
    fn reader_should_return_frames_then_empty() {
        // Given
        let data: Vec<u8> = (0..20).collect();
        let wav = write_wav(&data, 8_000, 2, 1);
        let mut reader = reader_over(wav).unwrap();

        // When
        let first = reader.read_frames(6).unwrap();
        let rest = reader.read_frames(100).unwrap();
        let tail = reader.read_frames(100).unwrap();

        // Then
        assert_eq!(first, (0..12).collect::<Vec<u8>>());
        assert_eq!(rest, (12..20).collect::<Vec<u8>>());
        assert!(tail.is_empty());
    }

    #[test]
    fn parse_should_reject_unknown_magic() {
        // Given: произвольный блоб с 4-байтовой сигнатурой
        let blob = b"BLOB0123456789abcdef".to_vec();

        // When
        let result = reader_over(blob);

        // Then
        assert!(matches!(result, Err(WavError::NotWave)));
    }

    #[test]
    fn parse_should_reject_non_pcm_encoding() {
        // Given: IEEE float tag вместо PCM
        let mut wav = write_wav(&[0u8; 8], 8_000, 2, 1);
        wav[20] = 3;

        // When
        let result = reader_over(wav);

        // Then
        assert!(matches!(result, Err(WavError::UnsupportedEncoding(3))));
    }

    #[test]
    fn parse_should_reject_truncated_header() {
        // Given
        let wav = write_wav(&[0u8; 8], 8_000, 2, 1);
        let cut = wav[..20].to_vec();

        // When
        let result = reader_over(cut);

        // Then
        assert!(result.is_err());
    }

    #[test]
    fn parse_should_skip_foreign_chunks_before_data() {
        // Given: LIST-chunk между fmt и data
        let data = vec![1u8, 2, 3, 4];
        let canonical = write_wav(&data, 8_000, 2, 1);
        let mut wav = canonical[..36].to_vec();
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(b"INFO");
        wav.extend_from_slice(&canonical[36..]);
        let riff_size = (wav.len() - 8) as u32;
        wav[4..8].copy_from_slice(&riff_size.to_le_bytes());

        // When
        let mut reader = reader_over(wav).expect("parse");

        // Then
        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.read_frames(2).unwrap(), data);
    }

    #[test]
    fn writer_should_emit_canonical_header_fields() {
        // Given / When
        let wav = write_wav(&[0u8; 100], 44_100, 2, 2);

        // Then
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 2); // channels
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 44_100);
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 4); // block align
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16); // bits
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 100);
    }
}
