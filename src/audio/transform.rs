//! Побайтовые преобразования PCM-буферов.
//!
//! Чистые функции без состояния. Поток чтения применяет их в
//! фиксированном порядке: byteswap -> расширение 24->32 -> downmix.

/// Разворачивает порядок байт каждого сэмпла.
///
/// Для little-endian источников не вызывается. Неполный хвост буфера
/// (меньше одного сэмпла) остается без изменений.
pub fn byteswap(buf: &mut [u8], sample_width: usize) {
    if sample_width <= 1 {
        return;
    }
    for sample in buf.chunks_exact_mut(sample_width) {
        sample.reverse();
    }
}

/// Расширяет 24-битные little-endian сэмплы до 32-битных.
///
/// Перед тремя исходными байтами вставляется нулевой байт, то есть
/// значение умножается на 256 с сохранением знака. Усечение нулевого
/// байта восстанавливает исходные 3 байта без потерь.
pub fn widen_24_to_32(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() / 3 * 4 + 4);
    for sample in buf.chunks_exact(3) {
        out.push(0);
        out.extend_from_slice(sample);
    }
    out
}

/// Сводит стерео-буфер в моно усреднением пар interleaved-сэмплов.
///
/// Каждая пара (L, R) заменяется на (L + R) / 2 той же ширины.
pub fn downmix_stereo(buf: &[u8], sample_width: usize) -> Vec<u8> {
    let frame = sample_width * 2;
    let mut out = Vec::with_capacity(buf.len() / 2);
    for pair in buf.chunks_exact(frame) {
        let left = read_sample(&pair[..sample_width]);
        let right = read_sample(&pair[sample_width..]);
        write_sample(&mut out, (left + right) / 2, sample_width);
    }
    out
}

/// RMS-энергия буфера знаковых little-endian сэмплов.
///
/// Используется детектором речи для сравнения с порогом.
pub fn rms(buf: &[u8], sample_width: usize) -> f64 {
    if sample_width == 0 || buf.len() < sample_width {
        return 0.0;
    }
    let mut sum_sq = 0.0_f64;
    let mut count = 0_usize;
    for sample in buf.chunks_exact(sample_width) {
        let value = read_sample(sample) as f64;
        sum_sq += value * value;
        count += 1;
    }
    (sum_sq / count as f64).sqrt()
}

/// Читает знаковый little-endian сэмпл шириной 1-4 байта.
fn read_sample(bytes: &[u8]) -> i64 {
    let mut value: u64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= u64::from(b) << (8 * i);
    }
    let shift = 64 - bytes.len() * 8;
    ((value << shift) as i64) >> shift
}

/// Пишет знаковый little-endian сэмпл заданной ширины.
fn write_sample(out: &mut Vec<u8>, value: i64, sample_width: usize) {
    out.extend_from_slice(&value.to_le_bytes()[..sample_width]);
}
