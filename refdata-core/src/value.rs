use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use log::{debug, warn};
use rust_decimal::Decimal;

use crate::complex::{ComplexValue, ComplexValueDecoder};
use crate::constants::{COMMENT_MARKER, DATA_DELIMITER};
use crate::dates::parse_date;
use crate::error::DecodeError;
use crate::fields::{self, FieldKind, FieldTypeDescriptor};
use crate::types::{ResponseDocument, TypedRecord, TypedResponse};

/// Декодированное значение поля
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Строка (и все неизвестные поля)
    Text(String),
    /// Десятичное число
    Decimal(Decimal),
    /// Дата
    Date(NaiveDate),
    /// Флаг
    Bool(bool),
    /// Вложенная таблица
    Complex(ComplexValue),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Decimal(d) => write!(f, "{d}"),
            FieldValue::Date(d) => write!(f, "{d}"),
            FieldValue::Bool(b) => f.write_str(if *b { "Y" } else { "N" }),
            FieldValue::Complex(ComplexValue::DatedMap(m)) => write!(f, "<{} dated values>", m.len()),
            FieldValue::Complex(ComplexValue::StringMap(m)) => write!(f, "<{} keyed values>", m.len()),
            FieldValue::Complex(ComplexValue::IntegerMap(m)) => write!(f, "<{} indexed values>", m.len()),
            FieldValue::Complex(ComplexValue::Rows(r)) => write!(f, "<{} rows>", r.len()),
        }
    }
}

/// Десятичное число, в том числе в экспоненциальной записи (`1.5E-3`)
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Декодирует сырое значение поля по его метаданным. Пустая строка — `Ok(None)`.
pub fn decode_value(
    desc: &FieldTypeDescriptor,
    raw: &str,
    date_format: &str,
) -> Result<Option<FieldValue>, DecodeError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let invalid = || DecodeError::InvalidScalar {
        field: desc.name.to_string(),
        kind: desc.kind.to_string(),
        raw: raw.to_string(),
    };

    let value = match desc.kind {
        FieldKind::Text => FieldValue::Text(raw.to_string()),
        FieldKind::Decimal => FieldValue::Decimal(parse_decimal(raw).ok_or_else(invalid)?),
        FieldKind::Date => FieldValue::Date(parse_date(raw, date_format).ok_or_else(invalid)?),
        FieldKind::Boolean => FieldValue::Bool(raw.trim() == "Y"),
        _ => match ComplexValueDecoder::new(date_format).decode(desc, raw)? {
            Some(c) => FieldValue::Complex(c),
            None => return Ok(None),
        },
    };

    Ok(Some(value))
}

/// Как [`decode_value`], но по имени поля: неизвестные поля остаются строками,
/// а скаляр, не подходящий под тип, сохраняется как строка с предупреждением.
///
/// Битый заголовок вложенного значения тоже не фатален: значение остаётся
/// строкой, остальные поля и записи не страдают. Фатален только
/// `UnsupportedFieldType` (ошибка реестра, а не данных).
pub fn decode_named(
    field: &str,
    raw: &str,
    date_format: &str,
) -> Result<Option<FieldValue>, DecodeError> {
    let Some(desc) = fields::lookup(field) else {
        debug!("field {field} is not registered; keeping text");
        return Ok((!raw.is_empty()).then(|| FieldValue::Text(raw.to_string())));
    };

    match decode_value(desc, raw, date_format) {
        Err(DecodeError::InvalidScalar { field, kind, raw }) => {
            warn!("field {field}: cannot read {raw:?} as {kind}; keeping text");
            Ok(Some(FieldValue::Text(raw)))
        }
        Err(DecodeError::MalformedHeader { field, reason }) => {
            warn!("field {field}: malformed complex value ({reason}); keeping text");
            Ok(Some(FieldValue::Text(raw.to_string())))
        }
        other => other,
    }
}

impl ResponseDocument {
    /// Типизирует все поля всех записей.
    ///
    /// Ошибки структуры вложенных значений и неподдерживаемые типы фатальны.
    pub fn to_typed(&self) -> Result<TypedResponse, DecodeError> {
        let date_format = self.date_format();
        let mut records = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let mut values = BTreeMap::new();
            for (name, raw) in &entry.values {
                if let Some(v) = decode_named(name, raw, date_format)? {
                    values.insert(name.clone(), v);
                }
            }
            records.push(TypedRecord {
                identifier: entry.identifier.clone(),
                return_code: entry.return_code,
                date: entry.date,
                values,
            });
        }

        Ok(TypedResponse { records })
    }
}

/// Ответ поэлементно: строки `IDENTIFIER|FIELD|VALUE`.
///
/// Значение может само содержать `|`, поэтому строка делится максимум на три части.
/// Записи группируются по идентификатору в порядке первого появления.
pub fn decode_elements<I, S>(lines: I, date_format: &str) -> Result<TypedResponse, DecodeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records: Vec<TypedRecord> = Vec::new();

    for (i, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.trim_start().starts_with(COMMENT_MARKER) {
            continue;
        }

        let mut parts = line.splitn(3, DATA_DELIMITER);
        let (Some(id), Some(field), Some(raw)) = (parts.next(), parts.next(), parts.next()) else {
            warn!("element {}: expected IDENTIFIER|FIELD|VALUE, skipped: {line:?}", i + 1);
            continue;
        };
        let field = field.trim().to_ascii_uppercase();

        let pos = match records.iter().position(|r| r.identifier == id) {
            Some(p) => p,
            None => {
                records.push(TypedRecord {
                    identifier: id.to_string(),
                    return_code: 0,
                    date: None,
                    values: BTreeMap::new(),
                });
                records.len() - 1
            }
        };

        if let Some(v) = decode_named(&field, raw, date_format)? {
            records[pos].values.insert(field, v);
        }
    }

    Ok(TypedResponse { records })
}
