//! Оркестрация записи: накопление кадров и детекция фраз по энергии.
//!
//! Работает с любым `AudioSource`; сам источник должен быть открыт
//! вызывающей стороной (кроме фонового прослушивания, которое
//! открывает источник в своем потоке).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::audio::source::AudioSource;
use crate::audio::transform;

use super::clip::AudioClip;
use super::{ListenConfig, ListenError, Result};

/// Детектор и рекордер фраз поверх аудио-источника.
///
/// Держит текущий энергетический порог; при динамической подстройке
/// порог меняется во время прослушивания.
pub struct Listener {
    config: ListenConfig,
    energy_threshold: f64,
}

impl Listener {
    /// Создает listener; бессмысленные значения конфигурации
    /// заменяются дефолтами с предупреждением в лог.
    pub fn new(config: ListenConfig) -> Listener {
        let config = sanitized(config);
        let energy_threshold = config.energy_threshold;
        Listener {
            config,
            energy_threshold,
        }
    }

    /// Текущий энергетический порог речи.
    pub fn energy_threshold(&self) -> f64 {
        self.energy_threshold
    }

    /// Записывает до `duration` секунд, начиная с `offset` от текущей
    /// позиции источника.
    ///
    /// Без `duration` читает до конца потока (для живых источников -
    /// бесконечно).
    pub fn record<S: AudioSource>(
        &self,
        source: &mut S,
        duration: Option<f64>,
        offset: Option<f64>,
    ) -> Result<AudioClip> {
        let format = source.format()?;
        let chunk = source.chunk_size();
        let seconds_per_chunk = chunk as f64 / f64::from(format.sample_rate);

        let mut data = Vec::new();
        let mut elapsed = 0.0;
        let mut offset_time = 0.0;
        let mut offset_reached = offset.is_none();
        loop {
            if let Some(skip) = offset {
                if !offset_reached {
                    offset_time += seconds_per_chunk;
                    if offset_time > skip {
                        offset_reached = true;
                    }
                }
            }

            let buf = source.read(chunk)?;
            if buf.is_empty() {
                break;
            }

            if offset_reached {
                elapsed += seconds_per_chunk;
                if let Some(limit) = duration {
                    if elapsed > limit {
                        break;
                    }
                }
                data.extend_from_slice(&buf);
            }
        }

        Ok(AudioClip::new(data, format.sample_rate, format.sample_width))
    }

    /// Калибрует энергетический порог по фоновому шуму.
    ///
    /// Слушает `duration` секунд заведомо без речи и подтягивает порог
    /// асимметричным взвешенным средним.
    pub fn adjust_for_ambient_noise<S: AudioSource>(
        &mut self,
        source: &mut S,
        duration: f64,
    ) -> Result<()> {
        let format = source.format()?;
        let chunk = source.chunk_size();
        let width = usize::from(format.sample_width);
        let seconds_per_chunk = chunk as f64 / f64::from(format.sample_rate);

        let mut elapsed = 0.0;
        loop {
            elapsed += seconds_per_chunk;
            if elapsed > duration {
                break;
            }
            let buf = source.read(chunk)?;
            let energy = transform::rms(&buf, width);
            self.absorb_ambient_energy(energy, seconds_per_chunk);
        }

        tracing::debug!(
            energy_threshold = self.energy_threshold,
            "ambient noise calibration complete"
        );
        Ok(())
    }

    /// Записывает одну фразу: ждет энергию выше порога, затем пишет
    /// до `pause_threshold_sec` тишины.
    ///
    /// `timeout` ограничивает ожидание начала фразы (`WaitTimeout`);
    /// `phrase_time_limit` обрезает слишком длинную фразу. Хвостовая
    /// тишина за пределами `non_speaking_duration_sec` отбрасывается.
    pub fn listen<S: AudioSource>(
        &mut self,
        source: &mut S,
        timeout: Option<f64>,
        phrase_time_limit: Option<f64>,
    ) -> Result<AudioClip> {
        let format = source.format()?;
        let chunk = source.chunk_size();
        let width = usize::from(format.sample_width);
        let seconds_per_chunk = chunk as f64 / f64::from(format.sample_rate);

        let pause_chunks = (self.config.pause_threshold_sec / seconds_per_chunk).ceil() as usize;
        let phrase_chunks = (self.config.phrase_threshold_sec / seconds_per_chunk).ceil() as usize;
        let non_speaking_chunks =
            (self.config.non_speaking_duration_sec / seconds_per_chunk).ceil() as usize;

        let mut elapsed = 0.0;
        let mut frames: VecDeque<Vec<u8>>;
        let mut pause_count;
        let mut end_of_stream;
        loop {
            frames = VecDeque::new();
            end_of_stream = false;

            // Копим кадры, пока фраза не начнется
            loop {
                elapsed += seconds_per_chunk;
                if let Some(limit) = timeout {
                    if elapsed > limit {
                        return Err(ListenError::WaitTimeout);
                    }
                }

                let buf = source.read(chunk)?;
                if buf.is_empty() {
                    end_of_stream = true;
                    break;
                }
                let energy = transform::rms(&buf, width);
                frames.push_back(buf);
                if frames.len() > non_speaking_chunks {
                    frames.pop_front();
                }

                if energy > self.energy_threshold {
                    break;
                }
                if self.config.dynamic_energy_threshold {
                    self.absorb_ambient_energy(energy, seconds_per_chunk);
                }
            }

            // Пишем фразу до паузы, лимита или конца потока
            pause_count = 0;
            let mut phrase_count: usize = 0;
            let phrase_start = elapsed;
            loop {
                elapsed += seconds_per_chunk;
                if let Some(limit) = phrase_time_limit {
                    if elapsed - phrase_start > limit {
                        break;
                    }
                }

                let buf = source.read(chunk)?;
                if buf.is_empty() {
                    end_of_stream = true;
                    break;
                }
                let energy = transform::rms(&buf, width);
                frames.push_back(buf);
                phrase_count += 1;

                if energy > self.energy_threshold {
                    pause_count = 0;
                } else {
                    pause_count += 1;
                }
                if pause_count > pause_chunks {
                    break;
                }
            }

            // Слишком короткая фраза (щелчок, хлопок) - слушаем дальше
            phrase_count = phrase_count.saturating_sub(pause_count);
            if phrase_count >= phrase_chunks || end_of_stream {
                break;
            }
        }

        // Отбрасываем лишнюю хвостовую тишину
        for _ in 0..pause_count.saturating_sub(non_speaking_chunks) {
            frames.pop_back();
        }
        let mut data = Vec::new();
        for frame in &frames {
            data.extend_from_slice(frame);
        }

        tracing::debug!(
            bytes = data.len(),
            energy_threshold = self.energy_threshold,
            "phrase captured"
        );
        Ok(AudioClip::new(data, format.sample_rate, format.sample_width))
    }

    /// Запускает фоновое прослушивание в отдельном потоке.
    ///
    /// Источник конструируется и открывается внутри потока (cpal-stream
    /// нельзя передавать между потоками). Каждая распознанная фраза
    /// отдается в `callback`. Возвращенная ручка останавливает поток.
    pub fn listen_in_background<S, F, C>(
        &self,
        make_source: F,
        mut callback: C,
        phrase_time_limit: Option<f64>,
    ) -> BackgroundListener
    where
        S: AudioSource + 'static,
        F: FnOnce() -> crate::audio::Result<S> + Send + 'static,
        C: FnMut(AudioClip) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let mut listener = Listener::new(self.config.clone());
        listener.energy_threshold = self.energy_threshold;

        let handle = std::thread::spawn(move || {
            let mut source = match make_source() {
                Ok(source) => source,
                Err(e) => {
                    tracing::error!(error = %e, "background source construction failed");
                    return;
                }
            };
            if let Err(e) = source.open() {
                tracing::error!(error = %e, "background source open failed");
                return;
            }

            while flag.load(Ordering::SeqCst) {
                // Слушаем по секунде, чтобы регулярно проверять флаг
                match listener.listen(&mut source, Some(1.0), phrase_time_limit) {
                    Ok(clip) => {
                        // Пустая фраза возможна только на исчерпанном источнике
                        let stream_ended = clip.is_empty();
                        if flag.load(Ordering::SeqCst) && !stream_ended {
                            callback(clip);
                        }
                        if stream_ended {
                            break;
                        }
                    }
                    Err(ListenError::WaitTimeout) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "background listen failed");
                        break;
                    }
                }
            }
            let _ = source.close();
        });

        BackgroundListener {
            running,
            handle: Some(handle),
        }
    }

    fn absorb_ambient_energy(&mut self, energy: f64, seconds_per_chunk: f64) {
        let damping = self.config.dynamic_energy_damping.powf(seconds_per_chunk);
        let target = energy * self.config.dynamic_energy_ratio;
        self.energy_threshold = self.energy_threshold * damping + target * (1.0 - damping);
    }
}

/// Заменяет бессмысленные значения конфигурации дефолтами.
fn sanitized(mut config: ListenConfig) -> ListenConfig {
    let defaults = ListenConfig::default();
    if !config.energy_threshold.is_finite() || config.energy_threshold < 0.0 {
        tracing::warn!(
            value = config.energy_threshold,
            "invalid energy threshold, using default"
        );
        config.energy_threshold = defaults.energy_threshold;
    }
    for (value, default, name) in [
        (
            &mut config.pause_threshold_sec,
            defaults.pause_threshold_sec,
            "pause_threshold_sec",
        ),
        (
            &mut config.phrase_threshold_sec,
            defaults.phrase_threshold_sec,
            "phrase_threshold_sec",
        ),
        (
            &mut config.non_speaking_duration_sec,
            defaults.non_speaking_duration_sec,
            "non_speaking_duration_sec",
        ),
    ] {
        if !value.is_finite() || *value < 0.0 {
            tracing::warn!(field = name, "invalid listen setting, using default");
            *value = default;
        }
    }
    if config.non_speaking_duration_sec > config.pause_threshold_sec {
        tracing::warn!("non-speaking duration above pause threshold, clamping");
        config.non_speaking_duration_sec = config.pause_threshold_sec;
    }
    config
}

/// Ручка фонового прослушивания.
///
/// Поток-слушатель останавливается по `stop`; если ручку просто
/// уронить, поток продолжит работать до конца процесса.
pub struct BackgroundListener {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundListener {
    /// Просит поток остановиться; с `wait_for_stop` дожидается выхода.
    pub fn stop(mut self, wait_for_stop: bool) {
        self.running.store(false, Ordering::SeqCst);
        if wait_for_stop {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Result as AudioResult, SourceError, SourceFormat};

    /// Синтетический источник: отдает заранее заданный PCM чанками.
    struct ScriptedSource {
        data: Vec<u8>,
        cursor: usize,
        open: bool,
        chunk: usize,
    }

    impl ScriptedSource {
        fn new(data: Vec<u8>, chunk: usize) -> ScriptedSource {
            ScriptedSource {
                data,
                cursor: 0,
                open: false,
                chunk,
            }
        }
    }

    impl AudioSource for ScriptedSource {
        fn open(&mut self) -> AudioResult<()> {
            if self.open {
                return Err(SourceError::AlreadyOpen);
            }
            self.open = true;
            self.cursor = 0;
            Ok(())
        }

        fn close(&mut self) -> AudioResult<()> {
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn format(&self) -> AudioResult<SourceFormat> {
            if !self.open {
                return Err(SourceError::NotOpen);
            }
            Ok(SourceFormat {
                sample_rate: 16_000,
                sample_width: 2,
            })
        }

        fn chunk_size(&self) -> usize {
            self.chunk
        }

        fn read(&mut self, frames: usize) -> AudioResult<Vec<u8>> {
            if !self.open {
                return Err(SourceError::NotOpen);
            }
            let bytes = frames * 2;
            let end = (self.cursor + bytes).min(self.data.len());
            let out = self.data[self.cursor..end].to_vec();
            self.cursor = end;
            Ok(out)
        }
    }

    fn silence(seconds: f64) -> Vec<u8> {
        vec![0u8; (seconds * 16_000.0) as usize * 2]
    }

    fn tone(seconds: f64, amplitude: i16) -> Vec<u8> {
        let frames = (seconds * 16_000.0) as usize;
        (0..frames)
            .flat_map(|i| {
                let sample = if i % 2 == 0 { amplitude } else { -amplitude };
                sample.to_le_bytes()
            })
            .collect()
    }

    fn opened(data: Vec<u8>) -> ScriptedSource {
        let mut source = ScriptedSource::new(data, 1024);
        source.open().unwrap();
        source
    }

    // --- record ---

    #[test]
    fn record_should_capture_whole_stream_without_duration() {
        // Given
        let data = tone(0.5, 1000);
        let mut source = opened(data.clone());
        let listener = Listener::new(ListenConfig::default());

        // When
        let clip = listener.record(&mut source, None, None).unwrap();

        // Then
        assert_eq!(clip.raw_data(), data.as_slice());
        assert_eq!(clip.sample_rate(), 16_000);
        assert_eq!(clip.sample_width(), 2);
    }

    #[test]
    fn record_should_stop_after_duration() {
        // Given: 2 секунды сигнала
        let mut source = opened(tone(2.0, 1000));
        let listener = Listener::new(ListenConfig::default());

        // When
        let clip = listener.record(&mut source, Some(0.5), None).unwrap();

        // Then: записано не больше ~0.5 секунды
        assert!(clip.duration_secs() <= 0.6, "{}", clip.duration_secs());
        assert!(clip.duration_secs() >= 0.4, "{}", clip.duration_secs());
    }

    #[test]
    fn record_should_skip_offset() {
        // Given: 1 секунда тона, затем 1 секунда тишины
        let mut data = tone(1.0, 1000);
        data.extend_from_slice(&silence(1.0));
        let mut source = opened(data);
        let listener = Listener::new(ListenConfig::default());

        // When: пропускаем первую секунду
        let clip = listener.record(&mut source, None, Some(1.0)).unwrap();

        // Then: остался в основном хвост тишины
        assert!(clip.duration_secs() <= 1.1);
        let max_amp = clip
            .raw_data()
            .chunks_exact(2)
            .map(|s| i16::from_le_bytes([s[0], s[1]]).unsigned_abs())
            .max()
            .unwrap_or(0);
        assert!(max_amp <= 1000);
    }

    #[test]
    fn record_should_fail_on_unopened_source() {
        // Given
        let mut source = ScriptedSource::new(Vec::new(), 1024);
        let listener = Listener::new(ListenConfig::default());

        // When
        let result = listener.record(&mut source, None, None);

        // Then
        assert!(matches!(
            result,
            Err(ListenError::Source(SourceError::NotOpen))
        ));
    }

    // --- adjust_for_ambient_noise ---

    #[test]
    fn calibration_should_raise_threshold_for_loud_ambient() {
        // Given: громкий фон
        let mut source = opened(tone(2.0, 8000));
        let mut listener = Listener::new(ListenConfig {
            energy_threshold: 300.0,
            ..Default::default()
        });

        // When
        listener.adjust_for_ambient_noise(&mut source, 1.0).unwrap();

        // Then
        assert!(listener.energy_threshold() > 300.0);
    }

    #[test]
    fn calibration_should_lower_threshold_in_silence() {
        // Given: тихий фон и завышенный порог
        let mut source = opened(silence(2.0));
        let mut listener = Listener::new(ListenConfig {
            energy_threshold: 5000.0,
            ..Default::default()
        });

        // When
        listener.adjust_for_ambient_noise(&mut source, 1.0).unwrap();

        // Then
        assert!(listener.energy_threshold() < 5000.0);
    }

    // --- listen ---

    fn phrase_config() -> ListenConfig {
        ListenConfig {
            dynamic_energy_threshold: false,
            energy_threshold: 300.0,
            ..Default::default()
        }
    }

    #[test]
    fn listen_should_capture_phrase_between_silences() {
        // Given: тишина, фраза, тишина
        let mut data = silence(1.0);
        data.extend_from_slice(&tone(1.0, 5000));
        data.extend_from_slice(&silence(2.0));
        let mut source = opened(data);
        let mut listener = Listener::new(phrase_config());

        // When
        let clip = listener.listen(&mut source, None, None).unwrap();

        // Then: фраза с небольшими полями тишины
        assert!(clip.duration_secs() >= 1.0, "{}", clip.duration_secs());
        assert!(clip.duration_secs() <= 2.5, "{}", clip.duration_secs());
        let peak = clip
            .raw_data()
            .chunks_exact(2)
            .map(|s| i16::from_le_bytes([s[0], s[1]]).unsigned_abs())
            .max()
            .unwrap();
        assert_eq!(peak, 5000);
    }

    #[test]
    fn listen_should_time_out_when_no_phrase_starts() {
        // Given: только тишина
        let mut source = opened(silence(5.0));
        let mut listener = Listener::new(phrase_config());

        // When
        let result = listener.listen(&mut source, Some(1.0), None);

        // Then
        assert!(matches!(result, Err(ListenError::WaitTimeout)));
    }

    #[test]
    fn listen_should_respect_phrase_time_limit() {
        // Given: длинная непрерывная фраза
        let mut data = silence(0.5);
        data.extend_from_slice(&tone(5.0, 5000));
        let mut source = opened(data);
        let mut listener = Listener::new(phrase_config());

        // When
        let clip = listener.listen(&mut source, None, Some(1.0)).unwrap();

        // Then
        assert!(clip.duration_secs() <= 1.6, "{}", clip.duration_secs());
    }

    #[test]
    fn listen_should_ignore_short_click() {
        // Given: щелчок короче phrase_threshold, затем настоящая фраза
        let mut data = silence(0.5);
        data.extend_from_slice(&tone(0.1, 5000)); // щелчок
        data.extend_from_slice(&silence(1.5));
        data.extend_from_slice(&tone(1.0, 5000)); // фраза
        data.extend_from_slice(&silence(2.0));
        let mut source = opened(data);
        let mut listener = Listener::new(phrase_config());

        // When
        let clip = listener.listen(&mut source, None, None).unwrap();

        // Then: записана именно длинная фраза
        assert!(clip.duration_secs() >= 1.0, "{}", clip.duration_secs());
    }

    // --- listen_in_background ---

    #[test]
    fn background_listener_should_deliver_phrase_and_stop() {
        // Given
        let mut data = silence(0.3);
        data.extend_from_slice(&tone(1.0, 5000));
        data.extend_from_slice(&silence(2.0));
        let listener = Listener::new(phrase_config());
        let clips = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&clips);

        // When
        let handle = listener.listen_in_background(
            move || Ok(ScriptedSource::new(data, 1024)),
            move |clip| sink.lock().unwrap().push(clip),
            None,
        );
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while clips.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        handle.stop(true);

        // Then
        let delivered = clips.lock().unwrap();
        assert!(!delivered.is_empty());
        assert!(delivered[0].duration_secs() >= 0.9);
    }

    // --- sanitized ---

    #[test]
    fn sanitize_should_replace_invalid_values_with_defaults() {
        // Given
        let listener = Listener::new(ListenConfig {
            energy_threshold: f64::NAN,
            pause_threshold_sec: -1.0,
            ..Default::default()
        });

        // Then
        assert!((listener.energy_threshold() - 300.0).abs() < f64::EPSILON);
        assert!((listener.config.pause_threshold_sec - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn sanitize_should_clamp_non_speaking_to_pause_threshold() {
        // Given
        let listener = Listener::new(ListenConfig {
            pause_threshold_sec: 0.4,
            non_speaking_duration_sec: 0.9,
            ..Default::default()
        });

        // Then
        assert!(
            (listener.config.non_speaking_duration_sec - 0.4).abs() < f64::EPSILON
        );
    }
}
