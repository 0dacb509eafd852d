//! # refdata-core
//!
//! Типы и декодирование ответов сервиса справочных данных.
//!
//! Этот крейт содержит:
//!
//! - [`parser`] — построчный разбор файла ответа (заголовки, поля, данные)
//! - [`complex`] — декодер вложенных значений полей (таблицы, карты, списки)
//! - [`fields`] — реестр метаданных полей
//! - [`value`] — типизация сырых значений
//! - [`request`] — описание запроса и его текстовое представление
//! - [`wire`] — файл захвата фрагментов ответа (версия + бинарный payload)
//! - [`types`] — доменные типы
//! - [`error`] — типы ошибок, которые возвращают компоненты `refdata-core`
//!
//! ## Быстрый пример: разбор ответа
//!
//! ```rust
//! use refdata_core::parser::parse_lines;
//!
//! let doc = parse_lines([
//!     "START-OF-FILE",
//!     "START-OF-FIELDS",
//!     "PX_LAST",
//!     "END-OF-FIELDS",
//!     "START-OF-DATA",
//!     "IBM US Equity|0|1|100.25",
//!     "END-OF-DATA",
//!     "END-OF-FILE",
//! ])
//! .unwrap();
//!
//! let entry = doc.entry("IBM US Equity").unwrap();
//! assert_eq!(entry.return_code, 0);
//! assert_eq!(entry.field("PX_LAST"), Some("100.25"));
//! ```
//!
//! ## Пример: вложенное значение
//!
//! ```rust
//! use refdata_core::complex::{ComplexValue, ComplexValueDecoder};
//! use refdata_core::fields::lookup;
//!
//! let desc = lookup("CALL_SCHEDULE").unwrap();
//! let value = ComplexValueDecoder::new("yyyymmdd")
//!     .decode(desc, ";2;1;2;2;20240105;3;123.45;")
//!     .unwrap();
//!
//! match value {
//!     Some(ComplexValue::DatedMap(m)) => assert_eq!(m.len(), 1),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```
//!
//! ## Дизайн
//!
//! `refdata-core` задуман как “нулевая” зависимость для всех частей системы:
//! сессия, клиент, утилиты, тесты. Поэтому здесь держим только
//! чистые типы и парсинг/сериализацию, без потоков и runtime.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Построчный разбор файла ответа.
pub mod parser;

/// Декодер вложенных значений.
pub mod complex;

/// Реестр метаданных полей.
pub mod fields;

/// Типизация значений полей.
pub mod value;

/// Описание запроса.
pub mod request;

/// Доменные типы.
pub mod types;

/// Файл захвата фрагментов ответа.
pub mod wire;

/// Ошибки `refdata-core`.
pub mod error;

/// Разбор дат и времени.
pub mod dates;

/// Общие константы формата
pub mod constants;

#[cfg(test)]
mod testlog;

// --- Re-exports (публичный фасад API) ---

pub use crate::complex::{Cell, ComplexValue, ComplexValueDecoder};
pub use crate::error::{CoreError, DecodeError, FormatError, RequestError, WireError};
pub use crate::fields::{FieldKind, FieldTypeDescriptor, RowShape};
pub use crate::request::{RequestSpec, ResponseFormat};
pub use crate::types::{RecordEntry, ResponseDocument, TypedRecord, TypedResponse};
pub use crate::value::FieldValue;
