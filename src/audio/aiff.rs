//! Чтение AIFF и AIFF-C контейнеров с несжатым big-endian PCM.
//!
//! AIFF-C принимается только с компрессией `NONE`. Частота
//! дискретизации хранится как 80-битный extended float (IEEE 754).

use std::io::{Read, Seek, SeekFrom};

use super::{read_fully, ByteSource};

/// Ошибки разбора AIFF-контейнера.
#[derive(Debug, thiserror::Error)]
pub enum AiffError {
    #[error("not an AIFF/AIFF-C file")]
    NotAiff,

    #[error("unsupported AIFF-C compression: {0}")]
    UnsupportedCompression(String),

    #[error("malformed AIFF container: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AiffError>;

/// Разобранный заголовок AIFF: формат PCM-данных и позиция звука.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AiffHeader {
    pub channels: u16,
    pub sample_rate: u32,
    /// Байт на сэмпл одного канала (биты COMM, округленные вверх).
    pub sample_width: u16,
    pub frame_count: u64,
    pub data_start: u64,
}

impl AiffHeader {
    /// Разбирает заголовок с текущей позиции (ожидается начало файла).
    pub(crate) fn parse(input: &mut dyn ByteSource) -> Result<AiffHeader> {
        let mut form = [0u8; 12];
        input.read_exact(&mut form).map_err(|_| AiffError::NotAiff)?;
        if &form[..4] != b"FORM" {
            return Err(AiffError::NotAiff);
        }
        let is_aifc = match &form[8..12] {
            b"AIFF" => false,
            b"AIFC" => true,
            _ => return Err(AiffError::NotAiff),
        };

        let mut common: Option<(u16, u64, u16, u32)> = None;
        let mut data_start: Option<u64> = None;
        loop {
            let mut chunk_header = [0u8; 8];
            if input.read_exact(&mut chunk_header).is_err() {
                break;
            }
            let chunk_id = &chunk_header[..4];
            let chunk_size = u32::from_be_bytes([
                chunk_header[4],
                chunk_header[5],
                chunk_header[6],
                chunk_header[7],
            ]);

            match chunk_id {
                b"COMM" => {
                    let needed = if is_aifc { 22 } else { 18 };
                    if chunk_size < needed {
                        return Err(AiffError::Malformed("COMM chunk too short"));
                    }
                    let mut body = vec![0u8; chunk_size as usize];
                    input.read_exact(&mut body)?;
                    let channels = u16::from_be_bytes([body[0], body[1]]);
                    let frame_count = u64::from(u32::from_be_bytes([
                        body[2], body[3], body[4], body[5],
                    ]));
                    let sample_size_bits = u16::from_be_bytes([body[6], body[7]]);
                    let mut rate_bytes = [0u8; 10];
                    rate_bytes.copy_from_slice(&body[8..18]);
                    let sample_rate = read_be_f80(&rate_bytes)?;
                    if is_aifc {
                        let compression = &body[18..22];
                        if compression != b"NONE" {
                            return Err(AiffError::UnsupportedCompression(
                                String::from_utf8_lossy(compression).into_owned(),
                            ));
                        }
                    }
                    if channels == 0 {
                        return Err(AiffError::Malformed("zero channel count"));
                    }
                    if sample_rate == 0 {
                        return Err(AiffError::Malformed("zero sample rate"));
                    }
                    if sample_size_bits == 0 || sample_size_bits > 32 {
                        return Err(AiffError::Malformed("sample size outside 1..=32 bits"));
                    }
                    let sample_width = sample_size_bits.div_ceil(8);
                    common = Some((channels, frame_count, sample_width, sample_rate));
                    if chunk_size % 2 == 1 {
                        input.seek(SeekFrom::Current(1))?;
                    }
                }
                b"SSND" => {
                    if chunk_size < 8 {
                        return Err(AiffError::Malformed("SSND chunk too short"));
                    }
                    let mut ssnd_header = [0u8; 8];
                    input.read_exact(&mut ssnd_header)?;
                    let offset = u32::from_be_bytes([
                        ssnd_header[0],
                        ssnd_header[1],
                        ssnd_header[2],
                        ssnd_header[3],
                    ]);
                    let pos = input.stream_position()?;
                    data_start = Some(pos + u64::from(offset));
                    // SSND может идти раньше COMM: проматываем и ищем дальше
                    input.seek(SeekFrom::Current(
                        i64::from(chunk_size) - 8 + i64::from(chunk_size & 1),
                    ))?;
                }
                _ => {
                    input.seek(SeekFrom::Current(
                        i64::from(chunk_size) + i64::from(chunk_size & 1),
                    ))?;
                }
            }

            if let (Some((channels, frame_count, sample_width, sample_rate)), Some(start)) =
                (common, data_start)
            {
                return Ok(AiffHeader {
                    channels,
                    sample_rate,
                    sample_width,
                    frame_count,
                    data_start: start,
                });
            }
        }
        Err(AiffError::Malformed("missing COMM or SSND chunk"))
    }

    pub(crate) fn frame_size(&self) -> usize {
        usize::from(self.channels) * usize::from(self.sample_width)
    }
}

/// Разбирает IEEE 754 80-битный extended float в частоту (Гц).
///
/// Схема: знак (1 бит) | смещенная экспонента (15 бит) | мантисса
/// (64 бита с явным целым битом).
fn read_be_f80(bytes: &[u8; 10]) -> Result<u32> {
    let se = u16::from_be_bytes([bytes[0], bytes[1]]);
    let significand = u64::from_be_bytes([
        bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9],
    ]);
    let sign = se >> 15;
    let biased_exp = se & 0x7FFF;

    if sign == 1 {
        return Err(AiffError::Malformed("negative sample rate"));
    }
    // Ноль и денормализованные значения схлопываются в ноль
    if biased_exp == 0 {
        return Ok(0);
    }
    if biased_exp == 0x7FFF {
        return Err(AiffError::Malformed("sample rate is infinity or NaN"));
    }

    let shift = i32::from(biased_exp) - 16383 - 63;
    let value = if shift >= 0 {
        significand
            .checked_shl(shift as u32)
            .ok_or(AiffError::Malformed("sample rate out of range"))?
    } else {
        significand >> shift.unsigned_abs().min(63)
    };
    u32::try_from(value).map_err(|_| AiffError::Malformed("sample rate out of range"))
}

/// Потоковый читатель PCM-кадров из AIFF-файла.
///
/// Возвращает сырые big-endian байты; нормализацию порядка байт
/// выполняет вызывающий поток чтения.
pub struct AiffReader {
    input: Box<dyn ByteSource>,
    header: AiffHeader,
    frames_read: u64,
}

impl AiffReader {
    /// Открывает читатель: разбирает заголовок и встает на начало данных.
    pub fn open(mut input: Box<dyn ByteSource>) -> Result<AiffReader> {
        let header = AiffHeader::parse(&mut *input)?;
        AiffReader::from_parts(input, header).map_err(AiffError::Io)
    }

    /// Собирает читатель из уже разобранного заголовка.
    pub(crate) fn from_parts(
        mut input: Box<dyn ByteSource>,
        header: AiffHeader,
    ) -> std::io::Result<AiffReader> {
        input.seek(SeekFrom::Start(header.data_start))?;
        Ok(AiffReader {
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

    /// Читает до `max_frames` кадров сырых big-endian байт.
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

/// Кодирует целую частоту в 80-битный extended float.
#[cfg(test)]
pub(crate) fn write_be_f80(rate: u32) -> [u8; 10] {
    if rate == 0 {
        return [0u8; 10];
    }
    let value = u64::from(rate);
    let zeros = value.leading_zeros();
    let exponent = 16383 + (63 - zeros) as u16;
    let significand = value << zeros;
    let mut out = [0u8; 10];
    out[..2].copy_from_slice(&exponent.to_be_bytes());
    out[2..].copy_from_slice(&significand.to_be_bytes());
    out
}

/// Собирает минимальный AIFF/AIFF-C файл с заданными PCM-данными.
///
/// Используется тестами этого и соседних модулей.
#[cfg(test)]
pub(crate) fn build_aiff(
    data: &[u8],
    sample_rate: u32,
    sample_width: u16,
    channels: u16,
    compression: Option<&[u8; 4]>,
) -> Vec<u8> {
    let frame_size = usize::from(channels) * usize::from(sample_width);
    let frame_count = (data.len() / frame_size.max(1)) as u32;

    let mut comm = Vec::new();
    comm.extend_from_slice(&channels.to_be_bytes());
    comm.extend_from_slice(&frame_count.to_be_bytes());
    comm.extend_from_slice(&(sample_width * 8).to_be_bytes());
    comm.extend_from_slice(&write_be_f80(sample_rate));
    if let Some(kind) = compression {
        comm.extend_from_slice(kind);
        comm.extend_from_slice(&[4, b'n', b'o', b'n', b'e', 0]); // pascal-строка имени
    }

    let mut body = Vec::new();
    body.extend_from_slice(if compression.is_some() { b"AIFC" } else { b"AIFF" });
    body.extend_from_slice(b"COMM");
    body.extend_from_slice(&(comm.len() as u32).to_be_bytes());
    body.extend_from_slice(&comm);
    if comm.len() % 2 == 1 {
        body.push(0);
    }
    body.extend_from_slice(b"SSND");
    body.extend_from_slice(&((data.len() + 8) as u32).to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes()); // offset
    body.extend_from_slice(&0u32.to_be_bytes()); // block size
    body.extend_from_slice(data);

    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(b"FORM");
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader_over(bytes: Vec<u8>) -> Result<AiffReader> {
        AiffReader::open(Box::new(Cursor::new(bytes)))
    }

    #[test]
    fn reader_should_parse_minimal_aiff() {
        // Given: 4 кадра mono 16-bit
        let data = [0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04];
        let aiff = build_aiff(&data, 16_000, 2, 1, None);

        // When
        let mut reader = reader_over(aiff).expect("parse");

        // Then
        assert_eq!(reader.channels(), 1);
        assert_eq!(reader.sample_rate(), 16_000);
        assert_eq!(reader.sample_width(), 2);
        assert_eq!(reader.frame_count(), 4);
        assert_eq!(reader.read_frames(10).unwrap(), data);
    }

    #[test]
    fn reader_should_accept_aifc_with_none_compression() {
        // Given
        let aiff = build_aiff(&[0u8; 4], 8_000, 2, 1, Some(b"NONE"));

        // When
        let reader = reader_over(aiff);

        // Then
        assert!(reader.is_ok());
    }

    #[test]
    fn reader_should_reject_aifc_with_other_compression() {
        // Given
        let aiff = build_aiff(&[0u8; 4], 8_000, 2, 1, Some(b"sowt"));

        // When
        let result = reader_over(aiff);

        // Then
        assert!(matches!(result, Err(AiffError::UnsupportedCompression(c)) if c == "sowt"));
    }

    #[test]
    fn reader_should_reject_unknown_magic() {
        // Given
        let result = reader_over(b"BLOB0123456789abcdef".to_vec());

        // Then
        assert!(matches!(result, Err(AiffError::NotAiff)));
    }

    #[test]
    fn f80_should_decode_known_rates() {
        // Given: канонические значения из реальных файлов
        let rate_16k = [0x40, 0x0C, 0xFA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let rate_44k = [0x40, 0x0E, 0xAC, 0x44, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

        // When / Then
        assert_eq!(read_be_f80(&rate_16k).unwrap(), 16_000);
        assert_eq!(read_be_f80(&rate_44k).unwrap(), 44_100);
    }

    #[test]
    fn f80_should_roundtrip_through_writer() {
        // Given
        for rate in [8_000u32, 16_000, 22_050, 44_100, 48_000, 96_000] {
            // When
            let decoded = read_be_f80(&write_be_f80(rate)).unwrap();

            // Then
            assert_eq!(decoded, rate);
        }
    }

    #[test]
    fn f80_should_reject_nan_and_negative() {
        // Given
        let nan = [0x7F, 0xFF, 0x80, 0, 0, 0, 0, 0, 0, 0];
        let negative = [0xC0, 0x0C, 0xFA, 0, 0, 0, 0, 0, 0, 0];

        // When / Then
        assert!(read_be_f80(&nan).is_err());
        assert!(read_be_f80(&negative).is_err());
    }

    #[test]
    fn reader_should_handle_24_bit_samples() {
        // Given: 2 кадра mono 24-bit big-endian
        let data = [0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C];
        let aiff = build_aiff(&data, 16_000, 3, 1, None);

        // When
        let mut reader = reader_over(aiff).expect("parse");

        // Then
        assert_eq!(reader.sample_width(), 3);
        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.read_frames(2).unwrap(), data);
    }
}
