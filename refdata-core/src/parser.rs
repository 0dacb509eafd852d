//! Построчный разбор файла ответа.
//!
//! ```text
//! START-OF-FILE
//! PROGRAMNAME=getdata
//! START-OF-FIELDS
//! PX_LAST
//! END-OF-FIELDS
//! TIMESTARTED=Mon Jan  1 00:00:00 GMT 2024
//! START-OF-DATA
//! IBM US Equity|0|1|100.25|
//! END-OF-DATA
//! END-OF-FILE
//! ```

use std::io::BufRead;

use log::{debug, warn};

use crate::constants::{
    COMMENT_MARKER, DATA_DELIMITER, DATED_PREAMBLE_WIDTH, END_OF_DATA, END_OF_FIELDS,
    END_OF_FILE, HEADER_TIME_FINISHED, HEADER_TIME_STARTED, PLAIN_PREAMBLE_WIDTH,
    START_OF_DATA, START_OF_FIELDS, START_OF_FILE,
};
use crate::dates::{parse_date, parse_timestamp};
use crate::error::FormatError;
use crate::types::{RecordEntry, ResponseDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Searching,
    Headers,
    Fields,
    Data,
    Terminated,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Searching => "searching",
            State::Headers => "headers",
            State::Fields => "fields",
            State::Data => "data",
            State::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    StartOfFile,
    EndOfFile,
    StartOfFields,
    EndOfFields,
    StartOfData,
    EndOfData,
}

impl Marker {
    fn parse(line: &str) -> Option<Self> {
        Some(match line {
            START_OF_FILE => Marker::StartOfFile,
            END_OF_FILE => Marker::EndOfFile,
            START_OF_FIELDS => Marker::StartOfFields,
            END_OF_FIELDS => Marker::EndOfFields,
            START_OF_DATA => Marker::StartOfData,
            END_OF_DATA => Marker::EndOfData,
            _ => return None,
        })
    }

    fn looks_like_marker(line: &str) -> bool {
        (line.starts_with("START-OF-") || line.starts_with("END-OF-")) && !line.contains('=')
    }
}

/// Конечный автомат разбора. Документ принадлежит парсеру до [`finish`](Self::finish).
#[derive(Debug)]
pub struct LineFormatParser {
    state: State,
    doc: ResponseDocument,
    line_no: usize,
}

impl Default for LineFormatParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFormatParser {
    /// Пустой парсер в состоянии поиска
    pub fn new() -> Self {
        Self {
            state: State::Searching,
            doc: ResponseDocument::default(),
            line_no: 0,
        }
    }

    /// Встречен `END-OF-FILE`: дальнейшие строки не нужны
    pub fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }

    /// Обрабатывает одну строку
    pub fn feed(&mut self, raw: &str) -> Result<(), FormatError> {
        self.line_no += 1;
        if self.state == State::Terminated {
            return Ok(());
        }

        let line = raw.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            return Ok(());
        }

        if let Some(marker) = Marker::parse(trimmed) {
            return self.on_marker(marker, trimmed);
        }
        if Marker::looks_like_marker(trimmed) {
            return Err(FormatError::UnknownMarker {
                line: self.line_no,
                marker: trimmed.to_string(),
            });
        }

        match self.state {
            State::Searching | State::Headers => self.on_header(trimmed),
            State::Fields => {
                self.doc.fields.push(trimmed.to_string());
                Ok(())
            }
            State::Data => {
                self.on_data(line);
                Ok(())
            }
            State::Terminated => Ok(()),
        }
    }

    /// Завершает разбор и отдаёт документ
    pub fn finish(self) -> ResponseDocument {
        match self.state {
            State::Terminated | State::Searching | State::Headers => {}
            other => warn!(
                "input ended inside {} section without closing marker",
                other.name()
            ),
        }
        self.doc
    }

    fn on_marker(&mut self, marker: Marker, text: &str) -> Result<(), FormatError> {
        let next = match (self.state, marker) {
            (State::Searching | State::Headers, Marker::StartOfFile) => State::Headers,
            (State::Searching | State::Headers, Marker::StartOfFields) => State::Fields,
            (State::Searching | State::Headers, Marker::StartOfData) => State::Data,
            (State::Searching | State::Headers, Marker::EndOfFile) => State::Terminated,
            (State::Fields, Marker::EndOfFields) => State::Searching,
            (State::Data, Marker::EndOfData) => State::Searching,
            (state, _) => {
                return Err(FormatError::UnexpectedMarker {
                    line: self.line_no,
                    marker: text.to_string(),
                    state: state.name(),
                });
            }
        };

        debug!("line {}: {} -> {}", self.line_no, self.state.name(), next.name());
        self.state = next;
        Ok(())
    }

    fn on_header(&mut self, line: &str) -> Result<(), FormatError> {
        let Some((key, value)) = line.split_once('=') else {
            warn!("line {}: header without '=' skipped: {line:?}", self.line_no);
            return Ok(());
        };
        let key = key.trim();

        if key == HEADER_TIME_STARTED || key == HEADER_TIME_FINISHED {
            let ts = parse_timestamp(value).ok_or_else(|| FormatError::InvalidTimestamp {
                line: self.line_no,
                key: key.to_string(),
                value: value.to_string(),
            })?;
            if key == HEADER_TIME_STARTED {
                self.doc.time_started = Some(ts);
            } else {
                self.doc.time_finished = Some(ts);
            }
        }

        self.doc.headers.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Строка данных. Ошибки на уровне строки не фатальны: строка отбрасывается.
    fn on_data(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split(DATA_DELIMITER).collect();

        let identifier = tokens[0].trim();
        let Some(rc) = tokens.get(1).and_then(|t| t.trim().parse::<i32>().ok()) else {
            warn!("line {}: missing or bad return code, row dropped: {line:?}", self.line_no);
            return;
        };
        // tokens[2] — количество полей, только для информации

        let mut entry = RecordEntry::new(identifier, rc);
        if entry.is_error() {
            self.doc.entries.push(entry);
            return;
        }

        let history = self.doc.is_history();
        if history {
            let raw_date = tokens.get(DATED_PREAMBLE_WIDTH - 1).map_or("", |t| t.trim());
            if raw_date.is_empty() {
                self.doc.entries.push(entry);
                return;
            }
            match parse_date(raw_date, self.doc.date_format()) {
                Some(d) => entry.date = Some(d),
                None => {
                    warn!(
                        "line {}: bad date {raw_date:?} for {identifier} (format {}), row dropped",
                        self.line_no,
                        self.doc.date_format()
                    );
                    return;
                }
            }
        }

        let preamble = if history { DATED_PREAMBLE_WIDTH } else { PLAIN_PREAMBLE_WIDTH };
        let values = tokens.get(preamble..).unwrap_or_default();

        // лишние значения (обычно пустое после хвостового '|') игнорируются
        for (field, value) in self.doc.fields.iter().zip(values) {
            entry.values.insert(field.clone(), value.to_string());
        }

        self.doc.entries.push(entry);
    }
}

/// Разбирает последовательность строк
pub fn parse_lines<I, S>(lines: I) -> Result<ResponseDocument, FormatError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = LineFormatParser::new();
    for line in lines {
        parser.feed(line.as_ref())?;
        if parser.is_terminated() {
            break;
        }
    }
    Ok(parser.finish())
}

/// Разбирает ответ из буферизованного потока
pub fn parse_reader<R: BufRead>(reader: R) -> Result<ResponseDocument, FormatError> {
    let mut parser = LineFormatParser::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::Io { line: i + 1, source })?;
        parser.feed(&line)?;
        if parser.is_terminated() {
            break;
        }
    }
    Ok(parser.finish())
}

/// Разбирает ответ, целиком лежащий в строке
pub fn parse_str(text: &str) -> Result<ResponseDocument, FormatError> {
    parse_lines(text.lines())
}
