use std::fmt;

/// Форма строки для полей-списков: какой тип собирается из колонок
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// История дивидендов (`DVD_HIST_ALL`)
    Dividend,
    /// Одна колонка с тикером (цепочки фьючерсов/опционов)
    Security,
    /// Состав индекса с весом
    IndexMember,
}

/// Семантический тип поля
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Строка
    Text,
    /// Десятичное число
    Decimal,
    /// Календарная дата
    Date,
    /// `Y`/`N`
    Boolean,
    /// Дата -> число
    DatedValueMap,
    /// Строка -> значение
    StringMap,
    /// Целое -> значение
    IntegerMap,
    /// Список структурированных строк
    RowList(RowShape),
}

impl FieldKind {
    /// Значение поля закодировано вложенной таблицей
    pub fn is_complex(&self) -> bool {
        !matches!(
            self,
            FieldKind::Text | FieldKind::Decimal | FieldKind::Date | FieldKind::Boolean
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Decimal => f.write_str("decimal"),
            FieldKind::Date => f.write_str("date"),
            FieldKind::Boolean => f.write_str("boolean"),
            FieldKind::DatedValueMap => f.write_str("dated-value map"),
            FieldKind::StringMap => f.write_str("string-keyed map"),
            FieldKind::IntegerMap => f.write_str("integer-keyed map"),
            FieldKind::RowList(shape) => write!(f, "list of {shape:?} rows"),
        }
    }
}

/// Метаданные поля. Определяются один раз, неизменяемы.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTypeDescriptor {
    /// Имя поля
    pub name: &'static str,
    /// Тип
    pub kind: FieldKind,
    /// Явные индексы колонок ключа и значения (для карт)
    pub key_value: Option<(usize, usize)>,
    /// Ключ = порядковый номер строки (только для `IntegerMap`)
    pub row_index_as_key: bool,
}

impl FieldTypeDescriptor {
    /// Поле без явных индексов
    pub const fn plain(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            key_value: None,
            row_index_as_key: false,
        }
    }

    /// Карта с явными индексами колонок ключа и значения
    pub const fn keyed(name: &'static str, kind: FieldKind, key: usize, value: usize) -> Self {
        Self {
            name,
            kind,
            key_value: Some((key, value)),
            row_index_as_key: false,
        }
    }

    /// Целочисленная карта, где ключ — номер строки
    pub const fn indexed(name: &'static str, value: usize) -> Self {
        Self {
            name,
            kind: FieldKind::IntegerMap,
            // ключ не используется, но индекс значения берётся отсюда
            key_value: Some((0, value)),
            row_index_as_key: true,
        }
    }

    /// Индексы (ключ, значение) с учётом значений по умолчанию 0/1
    pub fn key_value_indexes(&self) -> (usize, usize) {
        self.key_value.unwrap_or((0, 1))
    }
}

use FieldKind::*;

static REGISTRY: &[FieldTypeDescriptor] = &[
    // скаляры
    FieldTypeDescriptor::plain("NAME", Text),
    FieldTypeDescriptor::plain("TICKER", Text),
    FieldTypeDescriptor::plain("CRNCY", Text),
    FieldTypeDescriptor::plain("ID_ISIN", Text),
    FieldTypeDescriptor::plain("ID_CUSIP", Text),
    FieldTypeDescriptor::plain("SECURITY_TYP", Text),
    FieldTypeDescriptor::plain("EXCH_CODE", Text),
    FieldTypeDescriptor::plain("PX_LAST", Decimal),
    FieldTypeDescriptor::plain("PX_OPEN", Decimal),
    FieldTypeDescriptor::plain("PX_HIGH", Decimal),
    FieldTypeDescriptor::plain("PX_LOW", Decimal),
    FieldTypeDescriptor::plain("PX_VOLUME", Decimal),
    FieldTypeDescriptor::plain("CPN", Decimal),
    FieldTypeDescriptor::plain("CUR_MKT_CAP", Decimal),
    FieldTypeDescriptor::plain("MATURITY", Date),
    FieldTypeDescriptor::plain("ISSUE_DT", Date),
    FieldTypeDescriptor::plain("LAST_UPDATE_DT", Date),
    FieldTypeDescriptor::plain("CALLABLE", Boolean),
    FieldTypeDescriptor::plain("IS_PERPETUAL", Boolean),
    // вложенные таблицы
    FieldTypeDescriptor::plain("CALL_SCHEDULE", DatedValueMap),
    FieldTypeDescriptor::plain("SINK_SCHEDULE", DatedValueMap),
    // дата | купон | номинал
    FieldTypeDescriptor::keyed("DES_CASH_FLOW", DatedValueMap, 0, 2),
    FieldTypeDescriptor::plain("INDX_MWEIGHT", StringMap),
    // тикер | название | сектор
    FieldTypeDescriptor::keyed("INDX_MEMBER_SECTORS", StringMap, 0, 2),
    FieldTypeDescriptor::indexed("CIE_DES_BULK", 0),
    // год | количество акций
    FieldTypeDescriptor::keyed("EQY_SH_OUT_HIST", IntegerMap, 0, 1),
    FieldTypeDescriptor::plain("DVD_HIST_ALL", RowList(RowShape::Dividend)),
    FieldTypeDescriptor::plain("FUT_CHAIN", RowList(RowShape::Security)),
    FieldTypeDescriptor::plain("OPT_CHAIN", RowList(RowShape::Security)),
    FieldTypeDescriptor::plain("INDX_MEMBERS", RowList(RowShape::IndexMember)),
];

/// Метаданные известного поля (имя без учёта регистра)
pub fn lookup(name: &str) -> Option<&'static FieldTypeDescriptor> {
    let name = name.trim();
    REGISTRY.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

/// Все известные поля
pub fn known_fields() -> &'static [FieldTypeDescriptor] {
    REGISTRY
}
