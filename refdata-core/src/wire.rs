//! Файл захвата: записанные фрагменты ответа для воспроизведения.
//!
//! Каждый кадр: `u32` LE длина + версия формата + postcard payload.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Текущая версия формата кадра
pub const WIRE_VERSION: u8 = 1;

/// Верхняя граница длины кадра: защита от мусора вместо длины
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Один записанный фрагмент ответа
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureFrameV1 {
    /// Промежуточный фрагмент
    Partial(String),
    /// Ответ целиком (без фрагментации)
    Final(String),
    /// Последний фрагмент
    FragmentEnd(String),
    /// Служебное сообщение без данных ответа
    Status(String),
}

impl CaptureFrameV1 {
    /// Текст фрагмента
    pub fn payload(&self) -> &str {
        match self {
            CaptureFrameV1::Partial(s)
            | CaptureFrameV1::Final(s)
            | CaptureFrameV1::FragmentEnd(s)
            | CaptureFrameV1::Status(s) => s,
        }
    }
}

/// Кадр: версия + postcard
pub fn encode_v1(frame: &CaptureFrameV1) -> Result<Vec<u8>, WireError> {
    let mut out = vec![WIRE_VERSION];
    out.extend_from_slice(&postcard::to_allocvec(frame)?);
    Ok(out)
}

/// Обратное к [`encode_v1`]
pub fn decode(buf: &[u8]) -> Result<CaptureFrameV1, WireError> {
    let (&ver, payload) = buf.split_first().ok_or(WireError::PacketTooShort)?;
    if ver != WIRE_VERSION {
        return Err(WireError::UnsupportedWireVersion(ver));
    }
    Ok(postcard::from_bytes(payload)?)
}

/// Делит ответ на `parts` фрагментов по границам строк.
///
/// Последний фрагмент — `FragmentEnd`, если частей больше одной, иначе `Final`.
pub fn split_response(text: &str, parts: usize) -> Vec<CaptureFrameV1> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let parts = parts.clamp(1, lines.len().max(1));
    if parts == 1 {
        return vec![CaptureFrameV1::Final(text.to_string())];
    }

    let per_part = lines.len().div_ceil(parts);
    let chunks: Vec<String> = lines.chunks(per_part).map(|c| c.concat()).collect();
    let last = chunks.len() - 1;

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == last {
                CaptureFrameV1::FragmentEnd(chunk)
            } else {
                CaptureFrameV1::Partial(chunk)
            }
        })
        .collect()
}

/// Записывает кадры в поток
pub fn write_capture<W: Write>(mut w: W, frames: &[CaptureFrameV1]) -> Result<(), WireError> {
    for frame in frames {
        let bytes = encode_v1(frame)?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        w.write_all(&len.to_le_bytes())?;
        w.write_all(&bytes)?;
    }
    w.flush()?;
    Ok(())
}

/// Читает все кадры до конца потока
pub fn read_capture<R: Read>(mut r: R) -> Result<Vec<CaptureFrameV1>, WireError> {
    let mut frames = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        match r.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(WireError::PacketTooShort);
        }
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => WireError::PacketTooShort,
            _ => WireError::Io(e),
        })?;
        frames.push(decode(&buf)?);
    }
    Ok(frames)
}
