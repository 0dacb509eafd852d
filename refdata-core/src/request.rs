use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;

use crate::constants::{
    DEFAULT_DATE_FORMAT, END_OF_DATA, END_OF_FIELDS, END_OF_FILE, HEADER_DATE_FORMAT,
    HEADER_PROGRAM_NAME, PROGRAM_GET_DATA, PROGRAM_GET_HISTORY, START_OF_DATA, START_OF_FIELDS,
    START_OF_FILE,
};
use crate::error::RequestError;

/// Заголовок с диапазоном дат исторического запроса
pub const HEADER_DATE_RANGE: &str = "DATERANGE";
/// Префикс заголовков с переопределениями полей
pub const OVERRIDE_PREFIX: &str = "OVERRIDE_";

/// Как доставляется ответ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Файл ответа целиком (секции START-OF-... / END-OF-...)
    #[default]
    LineFile,
    /// Отдельные элементы `IDENTIFIER|FIELD|VALUE`
    Elements,
}

/// Диапазон дат исторического запроса (включительно)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRange {
    /// Начало
    pub start: NaiveDate,
    /// Конец
    pub end: NaiveDate,
}

/// Что запрашиваем
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSpec {
    /// Идентификаторы инструментов (порядок сохраняется)
    pub identifiers: Vec<String>,
    /// Поля (в верхнем регистре)
    pub fields: Vec<String>,
    /// Переопределения `ПОЛЕ -> значение`
    pub overrides: Vec<(String, String)>,
    /// Диапазон дат: задан — значит исторический запрос
    pub history: Option<HistoryRange>,
    /// Формат доставки ответа
    pub format: ResponseFormat,
}

impl RequestSpec {
    /// Запрос текущих значений. Пустые и повторяющиеся элементы отбрасываются.
    pub fn new<I, F>(identifiers: I, fields: F) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            identifiers: normalize(identifiers, false),
            fields: normalize(fields, true),
            ..Self::default()
        }
    }

    /// Добавить переопределение поля
    pub fn with_override(mut self, field: &str, value: &str) -> Self {
        self.overrides
            .push((field.trim().to_ascii_uppercase(), value.trim().to_string()));
        self
    }

    /// Сделать запрос историческим
    pub fn with_history(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.history = Some(HistoryRange { start, end });
        self
    }

    /// Выбрать формат доставки
    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Проверка перед отправкой
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.identifiers.is_empty() {
            return Err(RequestError::EmptyIdentifiers);
        }
        if self.fields.is_empty() {
            return Err(RequestError::EmptyFields);
        }
        if let Some(HistoryRange { start, end }) = self.history {
            if start > end {
                return Err(RequestError::InvalidDateRange { start, end });
            }
        }
        Ok(())
    }

    /// Текст запроса в том же построчном формате, что и ответ
    pub fn render(&self) -> Result<String, RequestError> {
        self.validate()?;

        let date_fmt = crate::dates::translate_date_format(DEFAULT_DATE_FORMAT);
        let program = if self.history.is_some() {
            PROGRAM_GET_HISTORY
        } else {
            PROGRAM_GET_DATA
        };

        let mut lines = vec![
            START_OF_FILE.to_string(),
            format!("{HEADER_PROGRAM_NAME}={program}"),
            format!("{HEADER_DATE_FORMAT}={DEFAULT_DATE_FORMAT}"),
        ];
        if let Some(HistoryRange { start, end }) = self.history {
            lines.push(format!(
                "{HEADER_DATE_RANGE}={}|{}",
                start.format(&date_fmt),
                end.format(&date_fmt)
            ));
        }
        for (field, value) in &self.overrides {
            lines.push(format!("{OVERRIDE_PREFIX}{field}={value}"));
        }

        lines.push(START_OF_FIELDS.to_string());
        lines.extend(self.fields.iter().cloned());
        lines.push(END_OF_FIELDS.to_string());

        lines.push(START_OF_DATA.to_string());
        lines.extend(self.identifiers.iter().cloned());
        lines.push(END_OF_DATA.to_string());
        lines.push(END_OF_FILE.to_string());

        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}

fn normalize<I>(items: I, uppercase: bool) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| {
            let s = s.as_ref().trim();
            if uppercase {
                s.to_ascii_uppercase()
            } else {
                s.to_string()
            }
        })
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Список через запятую: `"PX_LAST, NAME, ,CRNCY"`. Пустые элементы отбрасываются.
pub fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Чтение идентификаторов: по одному на строку, `#` — комментарий
pub fn read_identifiers<R: io::Read>(reader: R) -> io::Result<Vec<String>> {
    Ok(normalize(read_identifier_lines(reader)?, false))
}

/// Как [`read_identifiers`], но без удаления повторов: порядок и дубли сохраняются
pub fn read_identifier_lines<R: io::Read>(reader: R) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if let Some(id) = normalize_line(&line) {
            out.push(id);
        }
    }
    Ok(out)
}

/// Чтение идентификаторов из файла
pub fn read_identifiers_from_path(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let f = File::open(path)?;
    read_identifiers(f)
}

fn normalize_line(line: &str) -> Option<String> {
    // Поддержка inline-комментариев: "IBM US Equity # comment"
    let s = line.split('#').next().unwrap_or("").trim();
    if s.is_empty() {
        return None;
    }
    Some(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use std::io::Cursor;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_trims_dedups_and_uppercases_fields() {
        let spec = RequestSpec::new(
            [" IBM US Equity ", "", "IBM US Equity", "AAPL US Equity"],
            ["px_last", "PX_LAST", " name "],
        );
        assert_eq!(spec.identifiers, vec!["IBM US Equity", "AAPL US Equity"]);
        assert_eq!(spec.fields, vec!["PX_LAST", "NAME"]);
    }

    #[test]
    fn validate_rejects_empty_lists_and_reversed_range() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            RequestSpec::new(empty, ["PX_LAST"]).validate(),
            Err(RequestError::EmptyIdentifiers)
        ));
        assert!(matches!(
            RequestSpec::new(["IBM US Equity"], empty).validate(),
            Err(RequestError::EmptyFields)
        ));
        let reversed = RequestSpec::new(["IBM US Equity"], ["PX_LAST"])
            .with_history(ymd(2024, 2, 1), ymd(2024, 1, 1));
        assert!(matches!(
            reversed.validate(),
            Err(RequestError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn rendered_request_uses_the_response_line_format() {
        let text = RequestSpec::new(["IBM US Equity"], ["PX_LAST", "NAME"])
            .with_override("eqy_fund_crncy", "EUR")
            .with_history(ymd(2024, 1, 1), ymd(2024, 1, 31))
            .render()
            .unwrap();

        assert!(text.contains("DATERANGE=20240101|20240131\n"));
        assert!(text.contains("OVERRIDE_EQY_FUND_CRNCY=EUR\n"));

        // заголовки и поля читаются тем же парсером
        let doc = parse_str(&text).unwrap();
        assert!(doc.is_history());
        assert_eq!(doc.fields(), ["PX_LAST", "NAME"]);
    }

    #[test]
    fn parse_csv_list_filters_empty() {
        assert_eq!(parse_csv_list(" a, b ,, c "), vec!["a", "b", "c"]);
        assert!(parse_csv_list(" , ").is_empty());
    }

    #[test]
    fn read_identifiers_skips_comments_and_dedups() {
        let input = "\
IBM US Equity
# full comment
  AAPL US Equity   # inline

IBM US Equity
";
        let got = read_identifiers(Cursor::new(input)).unwrap();
        assert_eq!(got, vec!["IBM US Equity", "AAPL US Equity"]);

        let raw = read_identifier_lines(Cursor::new(input)).unwrap();
        assert_eq!(raw, vec!["IBM US Equity", "AAPL US Equity", "IBM US Equity"]);
    }

    #[test]
    fn read_identifiers_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "IBM US Equity\nMSFT US Equity\n").unwrap();

        let got = read_identifiers_from_path(&path).unwrap();
        assert_eq!(got, vec!["IBM US Equity", "MSFT US Equity"]);
    }
}
