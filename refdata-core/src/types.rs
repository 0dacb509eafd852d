use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::constants::{
    DEFAULT_DATE_FORMAT, ERROR_RETURN_CODES, HEADER_DATE_FORMAT, HEADER_PROGRAM_NAME,
    PROGRAM_GET_HISTORY,
};
use crate::value::FieldValue;

/// Разобранный файл ответа.
///
/// Создаётся парсером пустым, наполняется по секциям и после возврата
/// вызывающему больше не меняется (мутаторы доступны только внутри крейта).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseDocument {
    pub(crate) headers: HashMap<String, String>,
    pub(crate) fields: Vec<String>,
    pub(crate) entries: Vec<RecordEntry>,
    pub(crate) time_started: Option<NaiveDateTime>,
    pub(crate) time_finished: Option<NaiveDateTime>,
}

impl ResponseDocument {
    /// Значение заголовка `KEY=VALUE`
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Все заголовки (порядок не сохраняется)
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Имена полей в порядке объявления: позиции совпадают с колонками данных
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Записи в порядке появления в файле
    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    /// Первая запись с данным идентификатором
    pub fn entry(&self, identifier: &str) -> Option<&RecordEntry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    /// `TIMESTARTED`, если был
    pub fn time_started(&self) -> Option<NaiveDateTime> {
        self.time_started
    }

    /// `TIMEFINISHED`, если был
    pub fn time_finished(&self) -> Option<NaiveDateTime> {
        self.time_finished
    }

    /// Исторический режим: каждая строка данных несёт дату
    pub fn is_history(&self) -> bool {
        self.header(HEADER_PROGRAM_NAME)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(PROGRAM_GET_HISTORY))
    }

    /// Формат дат ответа в нотации поставщика (`yyyymmdd`, `mm/dd/yyyy`, ...)
    pub fn date_format(&self) -> &str {
        self.header(HEADER_DATE_FORMAT)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_DATE_FORMAT)
    }
}

/// Одна строка данных.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// Идентификатор инструмента, например `IBM US Equity`
    pub identifier: String,
    /// Код возврата: 0 — успех
    pub return_code: i32,
    /// Дата строки (только исторический режим)
    pub date: Option<NaiveDate>,
    /// Поле -> сырое строковое значение
    pub values: BTreeMap<String, String>,
}

impl RecordEntry {
    pub(crate) fn new(identifier: &str, return_code: i32) -> Self {
        Self {
            identifier: identifier.to_string(),
            return_code,
            date: None,
            values: BTreeMap::new(),
        }
    }

    /// Код возврата из набора "ошибка по идентификатору"
    pub fn is_error(&self) -> bool {
        ERROR_RETURN_CODES.contains(&self.return_code)
    }

    /// Сырое значение поля
    pub fn field(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl fmt::Display for RecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rc={}", self.identifier, self.return_code)?;
        if let Some(d) = self.date {
            write!(f, " date={d}")?;
        }
        for (k, v) in &self.values {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// Запись с типизированными значениями полей
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord {
    /// Идентификатор инструмента
    pub identifier: String,
    /// Код возврата
    pub return_code: i32,
    /// Дата строки (исторический режим)
    pub date: Option<NaiveDate>,
    /// Поле -> декодированное значение; пустые значения отсутствуют
    pub values: BTreeMap<String, FieldValue>,
}

impl fmt::Display for TypedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rc={}", self.identifier, self.return_code)?;
        if let Some(d) = self.date {
            write!(f, " date={d}")?;
        }
        for (k, v) in &self.values {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// Полностью типизированный ответ
#[derive(Debug, Clone, PartialEq)]
pub struct TypedResponse {
    /// Записи в порядке поступления
    pub records: Vec<TypedRecord>,
}

impl TypedResponse {
    /// Все записи по идентификатору (в историческом режиме их несколько)
    pub fn records_for<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a TypedRecord> {
        self.records.iter().filter(move |r| r.identifier == identifier)
    }

    /// Значение поля первой записи по идентификатору
    pub fn value(&self, identifier: &str, field: &str) -> Option<&FieldValue> {
        self.records
            .iter()
            .filter(|r| r.identifier == identifier)
            .find_map(|r| r.values.get(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identifier: &str, name: &str) -> TypedRecord {
        let mut values = BTreeMap::new();
        values.insert("NAME".to_string(), FieldValue::Text(name.to_string()));
        TypedRecord { identifier: identifier.to_string(), return_code: 0, date: None, values }
    }

    #[test]
    fn value_lookup_outlives_borrowed_identifier() {
        let resp = TypedResponse {
            records: vec![record("IBM US Equity", "first"), record("IBM US Equity", "second")],
        };

        // идентификатор из временной строки: ссылка на значение живёт дольше неё
        let found = {
            let id = String::from("IBM US Equity");
            resp.value(&id, "NAME")
        };
        assert_eq!(found, Some(&FieldValue::Text("first".into())));
        assert_eq!(resp.records_for("IBM US Equity").count(), 2);
        assert!(resp.value("AAPL US Equity", "NAME").is_none());
    }
}
