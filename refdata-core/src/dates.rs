use chrono::{NaiveDate, NaiveDateTime};

/// Допустимые форматы `TIMESTARTED`/`TIMEFINISHED`:
/// две зоны, день месяца с пробелом или с нулём.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%a %b %e %H:%M:%S GMT %Y",
    "%a %b %d %H:%M:%S GMT %Y",
    "%a %b %e %H:%M:%S EST %Y",
    "%a %b %d %H:%M:%S EST %Y",
];

/// Парсит заголовок со временем, например `Mon Jan  1 00:00:00 GMT 2024`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
}

/// Переводит формат даты поставщика (`yyyymmdd`, `MM/dd/yyyy`, `dd-mmm-yy`)
/// в строку формата chrono.
///
/// Буквы сравниваются без учёта регистра: `mm` всегда месяц.
pub fn translate_date_format(vendor: &str) -> String {
    let chars: Vec<char> = vendor.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].to_ascii_lowercase();
        let mut run = 1;
        while i + run < chars.len() && chars[i + run].to_ascii_lowercase() == c {
            run += 1;
        }

        match (c, run) {
            ('y', 4) => out.push_str("%Y"),
            ('y', 2) => out.push_str("%y"),
            ('m', 3) => out.push_str("%b"),
            ('m', 1 | 2) => out.push_str("%m"),
            ('d', 1 | 2) => out.push_str("%d"),
            ('%', _) => {
                for _ in 0..run {
                    out.push_str("%%");
                }
            }
            _ => {
                for _ in 0..run {
                    out.push(chars[i]);
                }
            }
        }
        i += run;
    }

    out
}

/// Парсит дату по формату поставщика
pub fn parse_date(raw: &str, vendor_format: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, &translate_date_format(vendor_format)).ok()
}
