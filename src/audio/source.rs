use super::{Result, SourceFormat};

/// Контракт аудио-источника: файл или живое устройство.
///
/// Жизненный цикл скоупа: `open` -> `read`* -> `close`. Повторный
/// `open` без `close` - ошибка; `close` идемпотентен и освобождает
/// ресурсы на любом пути выхода. Позволяет подменять реализацию
/// (например, синтетическим источником) в тестах.
pub trait AudioSource {
    /// Входит в скоуп: открывает устройство или пробует формат файла.
    ///
    /// При ошибке источник остается в неоткрытом состоянии.
    fn open(&mut self) -> Result<()>;

    /// Выходит из скоупа и освобождает ресурсы.
    ///
    /// Не возвращает ошибку, если источник уже закрыт.
    fn close(&mut self) -> Result<()>;

    /// Проверяет, открыт ли источник.
    fn is_open(&self) -> bool;

    /// Формат нормализованного потока (mono, little-endian).
    fn format(&self) -> Result<SourceFormat>;

    /// Рекомендуемый размер чтения в кадрах.
    fn chunk_size(&self) -> usize;

    /// Читает до `frames` кадров нормализованного PCM.
    ///
    /// Каждый вызов сдвигает курсор вперед. Буфер короче запрошенного
    /// (вплоть до пустого) означает конец потока, а не ошибку.
    fn read(&mut self, frames: usize) -> Result<Vec<u8>>;
}
