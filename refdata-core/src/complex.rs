//! Декодер вложенных значений полей.
//!
//! Формат токена:
//!
//! ```text
//! <d><dims><d><rows><d>[<cols><d>]{<code><d><value><d>}*
//! ```
//!
//! Первый символ — разделитель для всего остального токена. Пары
//! "код типа / значение" читаются слева направо и заполняют строки
//! по `cols` колонок.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use chrono::NaiveDate;
use log::{debug, error, warn};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::constants::DUPLICATE_KEY_EXEMPT;
use crate::dates::parse_date;
use crate::error::DecodeError;
use crate::fields::{FieldKind, FieldTypeDescriptor, RowShape};
use crate::value::parse_decimal;

/// Одна ячейка вложенной таблицы
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Пустое значение
    Empty,
    /// Строка
    Text(String),
    /// Число/цена
    Decimal(Decimal),
    /// Дата
    Date(NaiveDate),
    /// Флаг
    Bool(bool),
    /// Целое
    Int(i64),
}

impl Cell {
    /// Строковое значение (только для текстовых ячеек)
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Число: десятичное, целое или текст, похожий на число
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Cell::Decimal(d) => Some(*d),
            Cell::Int(i) => Some(Decimal::from(*i)),
            Cell::Text(s) => parse_decimal(s),
            _ => None,
        }
    }

    /// Дата (только для ячеек-дат)
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Целое; дробные значения отбрасывают дробную часть
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Decimal(d) => d.trunc().to_i64(),
            Cell::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `true`, если ячейка пустая
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Decimal(d) => write!(f, "{d}"),
            Cell::Date(d) => write!(f, "{d}"),
            Cell::Bool(b) => f.write_str(if *b { "Y" } else { "N" }),
            Cell::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Коды типов колонок во вложенном токене
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    /// 1 — строка
    Text,
    /// 2 — дата в формате ответа
    Date,
    /// 3 — цена
    Price,
    /// 4 — идентификатор инструмента
    Security,
    /// 5 — целое
    Integer,
    /// 6 — вещественное
    Real,
    /// 7 — месяц/год (как строка)
    MonthYear,
    /// 8 — время (как строка)
    Time,
    /// 9 — `Y`/`N`
    Boolean,
    /// 10 — длинный текст
    BulkText,
}

impl TypeCode {
    /// Код из токена; `None` для неизвестных
    pub fn from_code(code: &str) -> Option<Self> {
        let code = match code.trim().parse::<u8>() {
            Ok(c) => c,
            Err(_) => return None,
        };
        Some(match code {
            1 => TypeCode::Text,
            2 => TypeCode::Date,
            3 => TypeCode::Price,
            4 => TypeCode::Security,
            5 => TypeCode::Integer,
            6 => TypeCode::Real,
            7 => TypeCode::MonthYear,
            8 => TypeCode::Time,
            9 => TypeCode::Boolean,
            10 => TypeCode::BulkText,
            _ => return None,
        })
    }
}

/// Строка, из которой собирается элемент списка.
///
/// Одна реализация на каждую [`RowShape`]. `None` — строку прочитать нельзя.
pub trait FromRow: Sized {
    /// Собрать элемент из колонок строки
    fn from_row(row: &[Cell]) -> Option<Self>;
}

/// Элемент `DVD_HIST_ALL`:
/// объявлено | экс-дата | дата реестра | дата выплаты | сумма | частота | тип
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DividendRow {
    /// Дата объявления
    pub declared: Option<NaiveDate>,
    /// Экс-дивидендная дата
    pub ex_date: NaiveDate,
    /// Дата закрытия реестра
    pub record_date: Option<NaiveDate>,
    /// Дата выплаты
    pub pay_date: Option<NaiveDate>,
    /// Сумма на акцию
    pub amount: Decimal,
    /// Частота (`Quarter`, `Annual`, ...)
    pub frequency: Option<String>,
    /// Тип выплаты (`Regular Cash`, ...)
    pub kind: Option<String>,
}

impl FromRow for DividendRow {
    fn from_row(row: &[Cell]) -> Option<Self> {
        let text = |i: usize| row.get(i).and_then(Cell::as_text).map(str::to_string);
        let date = |i: usize| row.get(i).and_then(Cell::as_date);

        Some(Self {
            declared: date(0),
            ex_date: date(1)?,
            record_date: date(2),
            pay_date: date(3),
            amount: row.get(4)?.as_decimal()?,
            frequency: text(5),
            kind: text(6),
        })
    }
}

/// Элемент цепочки фьючерсов/опционов
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRow {
    /// Тикер
    pub ticker: String,
}

impl FromRow for SecurityRow {
    fn from_row(row: &[Cell]) -> Option<Self> {
        let ticker = row.first()?.as_text()?.trim();
        if ticker.is_empty() {
            return None;
        }
        Some(Self {
            ticker: ticker.to_string(),
        })
    }
}

/// Элемент состава индекса: тикер | вес (вес может отсутствовать)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMemberRow {
    /// Тикер
    pub ticker: String,
    /// Вес в индексе
    pub weight: Option<Decimal>,
}

impl FromRow for IndexMemberRow {
    fn from_row(row: &[Cell]) -> Option<Self> {
        let SecurityRow { ticker } = SecurityRow::from_row(row)?;
        Some(Self {
            ticker,
            weight: row.get(1).and_then(Cell::as_decimal),
        })
    }
}

/// Элемент списка любой поддерживаемой формы
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredRow {
    /// См. [`DividendRow`]
    Dividend(DividendRow),
    /// См. [`SecurityRow`]
    Security(SecurityRow),
    /// См. [`IndexMemberRow`]
    IndexMember(IndexMemberRow),
}

impl StructuredRow {
    fn read(shape: RowShape, row: &[Cell]) -> Option<Self> {
        match shape {
            RowShape::Dividend => DividendRow::from_row(row).map(StructuredRow::Dividend),
            RowShape::Security => SecurityRow::from_row(row).map(StructuredRow::Security),
            RowShape::IndexMember => IndexMemberRow::from_row(row).map(StructuredRow::IndexMember),
        }
    }
}

/// Результат декодирования вложенного значения
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplexValue {
    /// Дата -> число
    DatedMap(BTreeMap<NaiveDate, Decimal>),
    /// Строка -> ячейка
    StringMap(BTreeMap<String, Cell>),
    /// Целое -> ячейка
    IntegerMap(BTreeMap<i64, Cell>),
    /// Список структурированных строк
    Rows(Vec<StructuredRow>),
}

/// Декодер вложенных значений.
///
/// Состояния между вызовами не хранит: знает только формат дат ответа.
#[derive(Debug, Clone, Copy)]
pub struct ComplexValueDecoder<'a> {
    date_format: &'a str,
}

impl<'a> ComplexValueDecoder<'a> {
    /// `date_format` — формат дат ответа в нотации поставщика
    pub fn new(date_format: &'a str) -> Self {
        Self { date_format }
    }

    /// Декодирует `raw` согласно типу поля. Пустая строка — `Ok(None)`.
    pub fn decode(
        &self,
        desc: &FieldTypeDescriptor,
        raw: &str,
    ) -> Result<Option<ComplexValue>, DecodeError> {
        if raw.is_empty() {
            return Ok(None);
        }

        // тип проверяем до разбора: неподдерживаемый тип — всегда ошибка
        if !desc.kind.is_complex() {
            return Err(DecodeError::UnsupportedFieldType {
                field: desc.name.to_string(),
                kind: desc.kind.to_string(),
            });
        }

        let rows = self.decode_rows(desc.name, raw)?;

        let value = match desc.kind {
            FieldKind::RowList(shape) => ComplexValue::Rows(collect_rows(desc, shape, &rows)),
            FieldKind::DatedValueMap => ComplexValue::DatedMap(self.collect_dated(desc, &rows)),
            FieldKind::StringMap => ComplexValue::StringMap(collect_string_map(desc, &rows)),
            FieldKind::IntegerMap => ComplexValue::IntegerMap(collect_integer_map(desc, &rows)),
            other => {
                return Err(DecodeError::UnsupportedFieldType {
                    field: desc.name.to_string(),
                    kind: other.to_string(),
                });
            }
        };

        Ok(Some(value))
    }

    /// Разбирает токен в строки ячеек без учёта типа поля
    pub fn decode_rows(&self, field: &str, raw: &str) -> Result<Vec<Vec<Cell>>, DecodeError> {
        let malformed = |reason: String| DecodeError::MalformedHeader {
            field: field.to_string(),
            reason,
        };

        let mut chars = raw.chars();
        let delim = chars.next().ok_or_else(|| malformed("empty token".into()))?;
        let mut tokens = chars.as_str().split(delim);

        let mut header = |what: &str| -> Result<usize, DecodeError> {
            let tok = tokens
                .next()
                .ok_or_else(|| malformed(format!("missing {what}")))?;
            tok.trim()
                .parse::<usize>()
                .map_err(|_| malformed(format!("{what} is not a number: {tok:?}")))
        };

        let dims = header("dimension count")?;
        let declared_rows = header("row count")?;
        let cols = if dims > 1 { header("column count")? } else { 1 };

        if cols == 0 && declared_rows > 0 {
            return Err(malformed("zero columns with non-empty rows".into()));
        }

        // счётчики из токена не доверенные: ёмкость только по реально оставшимся парам
        let pairs_left = tokens.clone().count() / 2;
        let row_cap = cols.min(pairs_left);
        let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(declared_rows.min(pairs_left));
        let mut current: Vec<Cell> = Vec::with_capacity(row_cap);

        while let Some(code) = tokens.next() {
            let Some(value) = tokens.next() else {
                // обычный хвостовой разделитель даёт одну пустую лексему
                if !code.is_empty() {
                    warn!("field {field}: dangling type code {code:?} without value");
                }
                break;
            };

            current.push(self.read_cell(field, code, value));
            if current.len() == cols {
                rows.push(std::mem::replace(&mut current, Vec::with_capacity(row_cap)));
            }
        }

        if !current.is_empty() {
            warn!(
                "field {field}: incomplete trailing row with {} of {cols} columns dropped",
                current.len()
            );
        }
        if rows.len() != declared_rows {
            warn!(
                "field {field}: declared {declared_rows} rows, decoded {}",
                rows.len()
            );
        }

        Ok(rows)
    }

    fn read_cell(&self, field: &str, code: &str, value: &str) -> Cell {
        if value.trim().is_empty() {
            return Cell::Empty;
        }

        let Some(tc) = TypeCode::from_code(code) else {
            error!("field {field}: unknown type code {code:?}; reading {value:?} as text");
            return Cell::Text(value.to_string());
        };

        let parsed = match tc {
            TypeCode::Text
            | TypeCode::Security
            | TypeCode::MonthYear
            | TypeCode::Time
            | TypeCode::BulkText => Some(Cell::Text(value.to_string())),
            TypeCode::Date => parse_date(value, self.date_format).map(Cell::Date),
            TypeCode::Price | TypeCode::Real => parse_decimal(value).map(Cell::Decimal),
            TypeCode::Integer => value.trim().parse().ok().map(Cell::Int),
            TypeCode::Boolean => Some(Cell::Bool(value.trim() == "Y")),
        };

        parsed.unwrap_or_else(|| {
            warn!("field {field}: cannot read {value:?} as {tc:?}; keeping text");
            Cell::Text(value.to_string())
        })
    }

    fn collect_dated(
        &self,
        desc: &FieldTypeDescriptor,
        rows: &[Vec<Cell>],
    ) -> BTreeMap<NaiveDate, Decimal> {
        let mut out = BTreeMap::new();

        for (i, row) in rows.iter().enumerate() {
            let Some((key, value)) = key_value_cells(desc, i, row) else {
                continue;
            };

            let date = match key {
                Cell::Date(d) => Some(*d),
                Cell::Text(s) => parse_date(s, self.date_format),
                _ => None,
            };
            let Some(date) = date else {
                warn!("field {}: row {i}: key {key:?} is not a date; skipped", desc.name);
                continue;
            };
            let Some(amount) = value.as_decimal() else {
                warn!("field {}: row {i}: value {value:?} is not a number; skipped", desc.name);
                continue;
            };

            match out.entry(date) {
                Entry::Vacant(e) => {
                    e.insert(amount);
                }
                Entry::Occupied(_) => {
                    warn!("field {}: duplicate date {date} in row {i}; keeping first value", desc.name);
                }
            }
        }

        out
    }
}

fn key_value_cells<'r>(
    desc: &FieldTypeDescriptor,
    i: usize,
    row: &'r [Cell],
) -> Option<(&'r Cell, &'r Cell)> {
    let (k, v) = desc.key_value_indexes();
    match (row.get(k), row.get(v)) {
        (Some(key), Some(value)) => Some((key, value)),
        _ => {
            warn!(
                "field {}: row {i}: key/value index ({k}, {v}) out of bounds for {} columns; skipped",
                desc.name,
                row.len()
            );
            None
        }
    }
}

fn collect_rows(desc: &FieldTypeDescriptor, shape: RowShape, rows: &[Vec<Cell>]) -> Vec<StructuredRow> {
    rows.iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let item = StructuredRow::read(shape, row);
            if item.is_none() {
                warn!("field {}: row {i} cannot be read as {shape:?}; skipped", desc.name);
            }
            item
        })
        .collect()
}

fn collect_string_map(desc: &FieldTypeDescriptor, rows: &[Vec<Cell>]) -> BTreeMap<String, Cell> {
    let mut out = BTreeMap::new();

    for (i, row) in rows.iter().enumerate() {
        let Some((key, value)) = key_value_cells(desc, i, row) else {
            continue;
        };
        let key = key.to_string();

        match out.entry(key) {
            Entry::Vacant(e) => {
                e.insert(value.clone());
            }
            Entry::Occupied(e) => {
                if e.key() == DUPLICATE_KEY_EXEMPT {
                    debug!("field {}: repeated {DUPLICATE_KEY_EXEMPT} key in row {i}", desc.name);
                } else {
                    warn!(
                        "field {}: duplicate key {:?} in row {i}; keeping first value",
                        desc.name,
                        e.key()
                    );
                }
            }
        }
    }

    out
}

fn collect_integer_map(desc: &FieldTypeDescriptor, rows: &[Vec<Cell>]) -> BTreeMap<i64, Cell> {
    let mut out = BTreeMap::new();
    let (k, v) = desc.key_value_indexes();

    for (i, row) in rows.iter().enumerate() {
        let (key, value) = if desc.row_index_as_key {
            let Some(value) = row.get(v) else {
                warn!(
                    "field {}: row {i}: value index {v} out of bounds for {} columns; skipped",
                    desc.name,
                    row.len()
                );
                continue;
            };
            (i as i64, value)
        } else {
            let Some((key, value)) = key_value_cells(desc, i, row) else {
                continue;
            };
            let Some(key) = key.as_i64() else {
                warn!("field {}: row {i}: key column {k} is not an integer; skipped", desc.name);
                continue;
            };
            (key, value)
        };

        match out.entry(key) {
            Entry::Vacant(e) => {
                e.insert(value.clone());
            }
            Entry::Occupied(_) => {
                error!("field {}: duplicate integer key {key} in row {i}; dropped", desc.name);
            }
        }
    }

    out
}
