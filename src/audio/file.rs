//! Файловый аудио-источник: WAV, AIFF/AIFF-C или FLAC.
//!
//! Формат определяется каскадом проб при входе в скоуп. Чтение отдает
//! нормализованный поток: mono, little-endian, с расширением 24-битных
//! сэмплов до 32 бит.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use super::probe::{self, PcmReader};
use super::source::AudioSource;
use super::transform;
use super::{Result, SourceError, SourceFormat};

/// Размер чтения по умолчанию для файловых источников (кадры).
const DEFAULT_CHUNK: usize = 4096;

/// Вход файлового источника и правила владения им.
enum FileInput {
    /// Путь: файл открывается и закрывается самим источником,
    /// каждый вход в скоуп получает свежий дескриптор.
    Path(PathBuf),
    /// Буфер в памяти: перематывается на каждом входе в скоуп.
    Bytes(Arc<[u8]>),
    /// Одноразовый caller-поток: выкачивается при первом входе,
    /// повторный вход невозможен.
    Stream(Option<Box<dyn Read + Send>>),
}

/// Метаданные, вычисленные при входе в скоуп.
///
/// Сбрасываются при выходе; вне скоупа источник метаданных не имеет.
#[derive(Debug, Clone, Copy)]
pub struct SourceMetadata {
    pub sample_rate: u32,
    /// Байт на сэмпл нормализованного потока (3-байтовые контейнеры
    /// представляются как 4).
    pub sample_width: u16,
    pub frame_count: u64,
    pub duration_secs: f64,
    /// true для WAV, false для AIFF и декодированного FLAC.
    pub little_endian: bool,
    /// Активна эмуляция 24-битных сэмплов через расширение до 32 бит.
    pub widened_24_to_32: bool,
}

/// Аудио-источник поверх файла или байтового потока.
///
/// Скоуп: `open` пробует формат и строит поток чтения, `close`
/// освобождает читатель и сбрасывает метаданные. Источник по пути
/// можно открывать повторно; одноразовый поток - нет.
pub struct FileSource {
    input: FileInput,
    chunk_size: usize,
    stream: Option<FrameStream>,
    metadata: Option<SourceMetadata>,
}

impl FileSource {
    /// Создает источник по пути к файлу на диске.
    pub fn from_path(path: impl Into<PathBuf>) -> FileSource {
        FileSource::new(FileInput::Path(path.into()))
    }

    /// Создает источник поверх байтов контейнера в памяти.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> FileSource {
        FileSource::new(FileInput::Bytes(Arc::from(data.into())))
    }

    /// Создает источник поверх уже открытого читателя.
    ///
    /// Поток выкачивается целиком при первом `open` и не может быть
    /// открыт повторно после `close`.
    pub fn from_stream(reader: impl Read + Send + 'static) -> FileSource {
        FileSource::new(FileInput::Stream(Some(Box::new(reader))))
    }

    fn new(input: FileInput) -> FileSource {
        FileSource {
            input,
            chunk_size: DEFAULT_CHUNK,
            stream: None,
            metadata: None,
        }
    }

    /// Метаданные текущего скоупа; `None` вне скоупа.
    pub fn metadata(&self) -> Option<&SourceMetadata> {
        self.metadata.as_ref()
    }

    /// Число кадров источника; ошибка вне скоупа.
    pub fn frame_count(&self) -> Result<u64> {
        self.metadata
            .as_ref()
            .map(|m| m.frame_count)
            .ok_or(SourceError::NotOpen)
    }

    /// Длительность в секундах; ошибка вне скоупа.
    pub fn duration_secs(&self) -> Result<f64> {
        self.metadata
            .as_ref()
            .map(|m| m.duration_secs)
            .ok_or(SourceError::NotOpen)
    }

    /// Определенный пробой порядок байт контейнера.
    pub fn is_little_endian(&self) -> Result<bool> {
        self.metadata
            .as_ref()
            .map(|m| m.little_endian)
            .ok_or(SourceError::NotOpen)
    }

    fn probe_input(&mut self) -> Result<probe::ProbeResult> {
        let reader: Box<dyn super::ByteSource> = match &mut self.input {
            FileInput::Path(path) => Box::new(File::open(&*path)?),
            FileInput::Bytes(data) => Box::new(Cursor::new(Arc::clone(data))),
            FileInput::Stream(slot) => {
                let mut stream = slot.take().ok_or(SourceError::NotRewindable)?;
                let mut buffered = Vec::new();
                stream.read_to_end(&mut buffered)?;
                Box::new(Cursor::new(buffered))
            }
        };
        probe::probe(reader)
    }
}

impl AudioSource for FileSource {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(SourceError::AlreadyOpen);
        }

        let probed = self.probe_input()?;
        let container_width = probed.reader.sample_width();
        let widened = container_width == 3;
        let sample_width = if widened { 4 } else { container_width };
        let sample_rate = probed.reader.sample_rate();
        let frame_count = probed.reader.frame_count();

        self.metadata = Some(SourceMetadata {
            sample_rate,
            sample_width,
            frame_count,
            duration_secs: frame_count as f64 / f64::from(sample_rate),
            little_endian: probed.little_endian,
            widened_24_to_32: widened,
        });
        self.stream = Some(FrameStream::new(
            probed.reader,
            probed.little_endian,
            widened,
        ));

        tracing::debug!(
            sample_rate,
            sample_width,
            frame_count,
            little_endian = probed.little_endian,
            widened_24_to_32 = widened,
            "file source opened"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Идемпотентно: повторный выход из скоупа не считается ошибкой
        if self.stream.take().is_some() {
            tracing::debug!("file source closed");
        }
        self.metadata = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn format(&self) -> Result<SourceFormat> {
        self.metadata
            .as_ref()
            .map(|m| SourceFormat {
                sample_rate: m.sample_rate,
                sample_width: m.sample_width,
            })
            .ok_or(SourceError::NotOpen)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn read(&mut self, frames: usize) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(SourceError::NotOpen)?;
        stream.read(frames as u64)
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        // Освобождение гарантировано на любом пути выхода
        let _ = self.close();
    }
}

/// Поток нормализованных кадров поверх выбранного читателя.
///
/// Эксклюзивно владеет читателем; курсор двигается только вперед.
struct FrameStream {
    reader: PcmReader,
    little_endian: bool,
    widened_24_to_32: bool,
}

impl FrameStream {
    fn new(reader: PcmReader, little_endian: bool, widened_24_to_32: bool) -> FrameStream {
        FrameStream {
            reader,
            little_endian,
            widened_24_to_32,
        }
    }

    /// Читает до `frames` кадров и нормализует их.
    ///
    /// Порядок преобразований фиксирован: byteswap для big-endian,
    /// затем расширение 24->32, затем сведение стерео в моно.
    fn read(&mut self, frames: u64) -> Result<Vec<u8>> {
        let mut buf = self.reader.read_frames(frames)?;
        let mut width = usize::from(self.reader.sample_width());

        if !self.little_endian {
            transform::byteswap(&mut buf, width);
        }
        if self.widened_24_to_32 {
            buf = transform::widen_24_to_32(&buf);
            width = 4;
        }
        if self.reader.channels() == 2 {
            buf = transform::downmix_stereo(&buf, width);
        }
        Ok(buf)
    }
}
