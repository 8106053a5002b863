//! Внешний FLAC-декодер: запуск `flac` как сабпроцесса.
//!
//! Сжатый контейнер декодируется в AIFF через stdin/stdout; процесс
//! полностью принадлежит одному вызову и дожидается завершения до
//! возврата.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{Result, SourceError};

/// Имя исполняемого файла декодера.
#[cfg(not(windows))]
const DECODER_BINARY: &str = "flac";
#[cfg(windows)]
const DECODER_BINARY: &str = "flac.exe";

/// Аргументы декодирования: AIFF в stdout, FLAC из stdin, без
/// какого-либо консольного вывода.
const DECODER_ARGS: [&str; 5] = [
    "--stdout",
    "--totally-silent",
    "--decode",
    "--force-aiff-format",
    "-",
];

/// Ищет исполняемый файл декодера.
///
/// Сначала рядом с собственным бинарником (бандл), затем в PATH.
pub fn locate_decoder() -> Result<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join(DECODER_BINARY);
            if bundled.is_file() {
                return Ok(bundled);
            }
        }
    }
    which::which(DECODER_BINARY).map_err(|_| {
        SourceError::ExternalDecode(format!(
            "FLAC decoder not found: install the '{DECODER_BINARY}' command-line tool"
        ))
    })
}

/// Декодирует FLAC-данные в эквивалентный AIFF-контейнер.
pub fn decode_to_aiff(flac_data: Vec<u8>) -> Result<Vec<u8>> {
    let decoder = locate_decoder()?;
    decode_to_aiff_with(&decoder, flac_data)
}

/// Декодирует через явно указанный исполняемый файл.
pub fn decode_to_aiff_with(decoder: &Path, flac_data: Vec<u8>) -> Result<Vec<u8>> {
    let mut command = Command::new(decoder);
    command
        .args(DECODER_ARGS)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    // Не показываем консольное окно декодера
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = command.spawn().map_err(|e| {
        SourceError::ExternalDecode(format!("failed to start {}: {e}", decoder.display()))
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| SourceError::ExternalDecode("decoder stdin unavailable".to_string()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SourceError::ExternalDecode("decoder stdout unavailable".to_string()))?;

    // Пишем payload в отдельном потоке, чтобы не упереться в буфер pipe-а
    let writer = std::thread::spawn(move || {
        let result = stdin.write_all(&flac_data);
        drop(stdin);
        result
    });

    let mut decoded = Vec::new();
    let read_result = stdout.read_to_end(&mut decoded);
    let write_result = writer
        .join()
        .map_err(|_| SourceError::ExternalDecode("decoder writer thread panicked".to_string()))?;
    let status = child
        .wait()
        .map_err(|e| SourceError::ExternalDecode(format!("failed to wait for decoder: {e}")))?;

    if let Err(e) = read_result {
        return Err(SourceError::ExternalDecode(format!(
            "failed to read decoder output: {e}"
        )));
    }
    // Разорванный stdin при раннем выходе декодера не считается ошибкой
    // записи: исход решает содержимое stdout
    if let Err(e) = write_result {
        tracing::debug!(error = %e, "decoder stdin closed early");
    }
    if !status.success() {
        tracing::warn!(status = %status, "FLAC decoder exited with failure status");
    }

    // Пригодность вывода решает разбор AIFF на стороне каскада проб:
    // мусор на входе дает пустой stdout и терминальную ошибку формата
    Ok(decoded)
}
