//! Захват аудио с живого устройства через cpal.
//!
//! Источник реализует тот же контракт, что и файловый: mono 16-bit
//! little-endian PCM на объявленной частоте. Выбор устройства и
//! частоты - явная конфигурация, без глобальных дефолтов.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};

use super::source::AudioSource;
use super::{Result, SourceError, SourceFormat};

/// Байт на сэмпл живого источника: 16-bit int.
const SAMPLE_WIDTH: u16 = 2;

/// Размер чтения по умолчанию для живых источников (кадры).
const DEFAULT_CHUNK: usize = 1024;

/// Явная конфигурация живого устройства.
///
/// `device_name == None` означает дефолтное устройство хоста;
/// `sample_rate == None` - нативная частота устройства.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub device_name: Option<String>,
    /// Захватывать системный вывод (loopback) вместо микрофона.
    pub capture_speaker: bool,
    pub sample_rate: Option<u32>,
    pub chunk_size: usize,
}

impl Default for DeviceSpec {
    fn default() -> Self {
        DeviceSpec {
            device_name: None,
            capture_speaker: false,
            sample_rate: None,
            chunk_size: DEFAULT_CHUNK,
        }
    }
}

/// Возвращает имена доступных устройств захвата.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| SourceError::CaptureFailed(e.to_string()))?;
    let mut names = Vec::new();
    for device in devices {
        if let Ok(description) = device.description() {
            names.push(description.name().to_string());
        }
    }
    Ok(names)
}

/// Общий буфер между callback-потоком cpal и читателем.
struct SharedBuffer {
    samples: Mutex<VecDeque<f32>>,
    available: Condvar,
    capturing: AtomicBool,
}

impl SharedBuffer {
    fn new() -> SharedBuffer {
        SharedBuffer {
            samples: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            capturing: AtomicBool::new(false),
        }
    }

    /// Складывает кадр устройства, сведенный в моно усреднением каналов.
    fn ingest<T: Copy>(&self, data: &[T], channels: usize, convert: impl Fn(T) -> f32) {
        if !self.capturing.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut buf) = self.samples.lock() {
            for frame in data.chunks(channels.max(1)) {
                let sum: f32 = frame.iter().map(|&s| convert(s)).sum();
                buf.push_back(sum / frame.len() as f32);
            }
            self.available.notify_all();
        }
    }

    /// Блокирующе забирает до `count` сэмплов.
    ///
    /// Ждет, пока наберется полный объем или захват не остановится;
    /// после остановки возвращает остаток (возможно, пустой).
    fn take_blocking(&self, count: usize) -> Vec<f32> {
        let mut buf = self.samples.lock().expect("capture buffer mutex poisoned");
        loop {
            if buf.len() >= count || !self.capturing.load(Ordering::SeqCst) {
                let take = buf.len().min(count);
                return buf.drain(..take).collect();
            }
            buf = self
                .available
                .wait(buf)
                .expect("capture buffer mutex poisoned");
        }
    }

    fn clear(&self) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.clear();
        }
    }
}

/// Живой аудио-источник: микрофон или loopback системного вывода.
pub struct Microphone {
    device: cpal::Device,
    capture_speaker: bool,
    declared_rate: u32,
    device_rate: u32,
    chunk_size: usize,
    stream: Option<Stream>,
    shared: Arc<SharedBuffer>,
}

impl Microphone {
    /// Создает источник по явной конфигурации устройства.
    ///
    /// Устройство и его нативная частота проверяются сразу; сам
    /// stream открывается только при входе в скоуп.
    pub fn new(spec: &DeviceSpec) -> Result<Microphone> {
        let host = cpal::default_host();
        let device = match &spec.device_name {
            Some(name) => {
                let devices: Vec<cpal::Device> = if spec.capture_speaker {
                    host.output_devices()
                        .map_err(|e| SourceError::CaptureFailed(e.to_string()))?
                        .collect()
                } else {
                    host.input_devices()
                        .map_err(|e| SourceError::CaptureFailed(e.to_string()))?
                        .collect()
                };
                devices
                    .into_iter()
                    .find(|d| {
                        d.description()
                            .map(|desc| desc.name() == name.as_str())
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| {
                        SourceError::InvalidConfiguration(format!(
                            "audio device '{name}' not found"
                        ))
                    })?
            }
            None if spec.capture_speaker => host
                .default_output_device()
                .ok_or(SourceError::NoInputDevice)?,
            None => host
                .default_input_device()
                .ok_or(SourceError::NoInputDevice)?,
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_string())
            .unwrap_or_else(|_| String::from("unknown"));

        let config = default_config(&device, spec.capture_speaker)?;
        let device_rate = config.sample_rate();
        if device_rate == 0 {
            return Err(SourceError::InvalidConfiguration(format!(
                "device '{device_name}' reported zero sample rate"
            )));
        }
        let declared_rate = match spec.sample_rate {
            Some(0) => {
                return Err(SourceError::InvalidConfiguration(
                    "requested sample rate must be positive".to_string(),
                ));
            }
            Some(rate) => rate,
            None => device_rate,
        };
        if spec.chunk_size == 0 {
            return Err(SourceError::InvalidConfiguration(
                "chunk size must be positive".to_string(),
            ));
        }

        tracing::info!(
            device = device_name,
            device_rate,
            declared_rate,
            loopback = spec.capture_speaker,
            "audio capture device selected"
        );

        Ok(Microphone {
            device,
            capture_speaker: spec.capture_speaker,
            declared_rate,
            device_rate,
            chunk_size: spec.chunk_size,
            stream: None,
            shared: Arc::new(SharedBuffer::new()),
        })
    }

    fn build_stream(&self) -> Result<Stream> {
        let config = default_config(&self.device, self.capture_speaker)?;
        let channels = usize::from(config.channels());
        let sample_format = config.sample_format();

        let err_callback = |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio stream error");
        };

        let stream = match sample_format {
            SampleFormat::F32 => {
                let shared = Arc::clone(&self.shared);
                self.device
                    .build_input_stream(
                        &config.into(),
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            shared.ingest(data, channels, |s| s);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| SourceError::CaptureFailed(e.to_string()))?
            }
            SampleFormat::I16 => {
                let shared = Arc::clone(&self.shared);
                self.device
                    .build_input_stream(
                        &config.into(),
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            shared.ingest(data, channels, |s| f32::from(s) / 32_768.0);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| SourceError::CaptureFailed(e.to_string()))?
            }
            SampleFormat::U16 => {
                let shared = Arc::clone(&self.shared);
                self.device
                    .build_input_stream(
                        &config.into(),
                        move |data: &[u16], _: &cpal::InputCallbackInfo| {
                            shared.ingest(data, channels, |s| {
                                (f32::from(s) / f32::from(u16::MAX)) * 2.0 - 1.0
                            });
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| SourceError::CaptureFailed(e.to_string()))?
            }
            other => {
                return Err(SourceError::CaptureFailed(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        };
        Ok(stream)
    }
}

impl AudioSource for Microphone {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(SourceError::AlreadyOpen);
        }

        self.shared.clear();
        self.shared.capturing.store(true, Ordering::SeqCst);
        let stream = match self.build_stream() {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.capturing.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        if let Err(e) = stream.play() {
            self.shared.capturing.store(false, Ordering::SeqCst);
            return Err(SourceError::CaptureFailed(e.to_string()));
        }
        self.stream = Some(stream);

        tracing::info!(
            sample_rate = self.declared_rate,
            chunk_size = self.chunk_size,
            "audio capture started"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Идемпотентно; сначала гасим флаг, чтобы разбудить читателей
        self.shared.capturing.store(false, Ordering::SeqCst);
        self.shared.available.notify_all();
        if self.stream.take().is_some() {
            tracing::info!("audio capture stopped");
        }
        self.shared.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Формат известен с момента конструирования: устройство всегда
    /// отдает mono 16-bit на объявленной частоте.
    fn format(&self) -> Result<SourceFormat> {
        Ok(SourceFormat {
            sample_rate: self.declared_rate,
            sample_width: SAMPLE_WIDTH,
        })
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn read(&mut self, frames: usize) -> Result<Vec<u8>> {
        if self.stream.is_none() {
            return Err(SourceError::NotOpen);
        }

        let needed = if self.device_rate == self.declared_rate {
            frames
        } else {
            let ratio = f64::from(self.device_rate) / f64::from(self.declared_rate);
            (frames as f64 * ratio).ceil() as usize
        };
        let captured = self.shared.take_blocking(needed);
        let mono = if self.device_rate == self.declared_rate {
            captured
        } else {
            resample(&captured, self.device_rate, self.declared_rate)
        };

        let mut out = Vec::with_capacity(frames * usize::from(SAMPLE_WIDTH));
        for sample in mono.iter().take(frames) {
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        Ok(out)
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn default_config(
    device: &cpal::Device,
    capture_speaker: bool,
) -> Result<cpal::SupportedStreamConfig> {
    let config = if capture_speaker {
        device.default_output_config()
    } else {
        device.default_input_config()
    };
    config.map_err(|e| SourceError::CaptureFailed(e.to_string()))
}

/// Ресемплинг с линейной интерполяцией.
///
/// Для детекции речи линейной интерполяции достаточно. Если частоты
/// совпадают, возвращает копию.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples[samples.len() - 1]
        };
        output.push(sample);
    }

    output
}
