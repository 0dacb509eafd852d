use thiserror::Error;

/// Верхнеуровневый тип ошибок крейта
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ошибки структуры файла ответа
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Ошибки декодирования значений полей
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Ошибки сериализации
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Некорректный запрос
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Ошибки построения запроса
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    /// Не задано ни одного идентификатора
    #[error("request has no identifiers")]
    EmptyIdentifiers,

    /// Не задано ни одного поля
    #[error("request has no fields")]
    EmptyFields,

    /// Начало диапазона позже конца
    #[error("history range start {start} is after end {end}")]
    InvalidDateRange {
        /// начало
        start: chrono::NaiveDate,
        /// конец
        end: chrono::NaiveDate,
    },
}

/// Фатальные ошибки разбора файла ответа: документ целиком отбрасывается
#[derive(Debug, Error)]
pub enum FormatError {
    /// Ошибка чтения входного потока
    #[error("failed to read response line {line}: {source}")]
    Io {
        /// номер строки (с 1)
        line: usize,
        /// исходная ошибка
        #[source]
        source: std::io::Error,
    },

    /// Строка похожа на маркер секции, но маркер неизвестен
    #[error("unknown section marker at line {line}: {marker:?}")]
    UnknownMarker {
        /// номер строки (с 1)
        line: usize,
        /// текст маркера
        marker: String,
    },

    /// Известный маркер в недопустимом месте
    #[error("unexpected marker {marker} at line {line} while in {state} section")]
    UnexpectedMarker {
        /// номер строки (с 1)
        line: usize,
        /// текст маркера
        marker: String,
        /// секция, в которой находился парсер
        state: &'static str,
    },

    /// Заголовок со временем не подошёл ни под один формат
    #[error("unparseable timestamp in header {key} at line {line}: {value:?}")]
    InvalidTimestamp {
        /// номер строки (с 1)
        line: usize,
        /// имя заголовка
        key: String,
        /// исходное значение
        value: String,
    },
}

/// Ошибки декодирования значения поля
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Тип поля не поддерживается декодером
    #[error("field {field}: unsupported field type {kind} for this decoder")]
    UnsupportedFieldType {
        /// имя поля
        field: String,
        /// заявленный тип
        kind: String,
    },

    /// Заголовок вложенного значения (размерность/строки/колонки) не читается
    #[error("field {field}: malformed complex value header: {reason}")]
    MalformedHeader {
        /// имя поля
        field: String,
        /// что именно сломано
        reason: String,
    },

    /// Скалярное значение не соответствует типу поля
    #[error("field {field}: cannot read {raw:?} as {kind}")]
    InvalidScalar {
        /// имя поля
        field: String,
        /// ожидаемый тип
        kind: String,
        /// исходная строка
        raw: String,
    },
}

/// Ошибки сериализации
#[derive(Debug, Error)]
pub enum WireError {
    /// Пакет слишком короткий (не соотв. заявленной длине)
    #[error("packet too short")]
    PacketTooShort,

    /// Неверная версия формата
    #[error("unsupported wire version: {0}")]
    UnsupportedWireVersion(u8),

    /// Ошибка сериализации/десериализации
    #[error("postcard encode/decode error: {0}")]
    Postcard(#[from] postcard::Error),

    /// Ошибка чтения/записи файла захвата
    #[error("capture i/o error: {0}")]
    Io(#[from] std::io::Error),
}
