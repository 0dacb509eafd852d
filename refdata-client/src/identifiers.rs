use std::collections::HashSet;
use std::fs::File;
use std::path::PathBuf;

use log::warn;
use thiserror::Error;

use refdata_core::request::{parse_csv_list, read_identifier_lines};

use crate::cli::ReplayArgs;

/// Рыночные секторы ("yellow keys"), которыми заканчивается идентификатор
const MARKET_SECTORS: &[&str] = &[
    "Equity", "Govt", "Corp", "Index", "Curncy", "Comdty", "Mtge", "Muni", "Pfd", "M-Mkt",
];

#[derive(Debug, Error)]
pub(crate) enum IdentifiersError {
    #[error("identifiers source is missing: provide either --ids-file or --ids")]
    MissingSource,

    #[error("identifier list is empty ({source_name})")]
    Empty { source_name: String },

    #[error(
        "unrecognized identifier(s) {ids:?} in {source_name}: \
         expected \"<ticker> <market sector>\" (e.g. \"IBM US Equity\") or \"/<type>/<value>\""
    )]
    Unrecognized { source_name: String, ids: Vec<String> },

    #[error("failed to read identifiers file: {path:?}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) type Result<T> = std::result::Result<T, IdentifiersError>;

/// Идентификаторы из `--ids-file` или `--ids`: формат проверен, повторы
/// выброшены с предупреждением, порядок первого появления сохранён.
pub(crate) fn load_identifiers(args: &ReplayArgs) -> Result<Vec<String>> {
    let (raw, source_name) = if let Some(path) = &args.ids_file {
        let ids = File::open(path)
            .and_then(read_identifier_lines)
            .map_err(|source| IdentifiersError::ReadFile { path: path.clone(), source })?;
        (ids, format!("file {}", path.display()))
    } else if let Some(raw) = &args.ids {
        (parse_csv_list(raw), "--ids".to_string())
    } else {
        return Err(IdentifiersError::MissingSource);
    };

    check_identifiers(raw, &source_name)
}

fn check_identifiers(raw: Vec<String>, source_name: &str) -> Result<Vec<String>> {
    if raw.is_empty() {
        return Err(IdentifiersError::Empty { source_name: source_name.to_string() });
    }

    let bad: Vec<String> = raw.iter().filter(|id| !is_well_formed(id)).cloned().collect();
    if !bad.is_empty() {
        return Err(IdentifiersError::Unrecognized {
            source_name: source_name.to_string(),
            ids: bad,
        });
    }

    let (ids, dropped) = drop_duplicates(raw);
    for id in &dropped {
        warn!("identifier {id:?} is listed more than once in {source_name}; requesting it once");
    }
    Ok(ids)
}

/// `IBM US Equity`, `T 4 02/15/34 Govt` или `/isin/US0378331005`
fn is_well_formed(id: &str) -> bool {
    if let Some(rest) = id.strip_prefix('/') {
        return match rest.split_once('/') {
            Some((kind, value)) => {
                !kind.is_empty()
                    && kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && !value.trim().is_empty()
            }
            None => false,
        };
    }

    let mut words = id.split_whitespace();
    match words.next_back() {
        Some(sector) => {
            words.next().is_some() && MARKET_SECTORS.iter().any(|s| s.eq_ignore_ascii_case(sector))
        }
        None => false,
    }
}

/// Уникальные идентификаторы и выброшенные повторы (каждый столько раз, сколько выброшен)
fn drop_duplicates(raw: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut dropped = Vec::new();
    let mut ids = Vec::with_capacity(raw.len());
    for id in raw {
        if seen.insert(id.clone()) {
            ids.push(id);
        } else {
            dropped.push(id);
        }
    }
    (ids, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    use crate::cli::{Args, Command};

    fn replay_args(extra: &[&str]) -> ReplayArgs {
        let base = ["refdata-client", "replay", "--capture", "c.bin", "--fields", "PX_LAST"];
        let args = Args::try_parse_from(base.iter().copied().chain(extra.iter().copied())).unwrap();
        match args.command {
            Command::Replay(r) => r,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sector_and_typed_forms_are_accepted() {
        for id in ["IBM US Equity", "T 4 02/15/34 Govt", "XYZ Corp", "EUR curncy", "/isin/US0378331005"] {
            assert!(is_well_formed(id), "{id}");
        }
        for id in ["IBM", "Equity", "IBM US", "/isin/", "//x", "/isin", "/is in/X"] {
            assert!(!is_well_formed(id), "{id}");
        }
    }

    #[test]
    fn csv_list_with_unknown_sector_names_the_offenders() {
        let args = replay_args(&["--ids", "IBM US Equity, AAPL, MSFT US Stock"]);
        match load_identifiers(&args).unwrap_err() {
            IdentifiersError::Unrecognized { ids, .. } => assert_eq!(ids, ["AAPL", "MSFT US Stock"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicates_are_requested_once_in_first_seen_order() {
        let args = replay_args(&["--ids", "IBM US Equity, XYZ Corp, IBM US Equity, IBM US Equity"]);
        assert_eq!(load_identifiers(&args).unwrap(), ["IBM US Equity", "XYZ Corp"]);

        let (ids, dropped) = drop_duplicates(
            ["A Equity", "B Equity", "A Equity"].map(String::from).to_vec(),
        );
        assert_eq!(ids, ["A Equity", "B Equity"]);
        assert_eq!(dropped, ["A Equity"]);
    }

    #[test]
    fn blank_csv_is_an_error() {
        let args = replay_args(&["--ids", " , ,"]);
        assert!(matches!(load_identifiers(&args), Err(IdentifiersError::Empty { .. })));
    }

    #[test]
    fn file_with_only_comments_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# nothing here").unwrap();
        let path = f.path().to_str().unwrap().to_string();

        let err = load_identifiers(&replay_args(&["--ids-file", &path])).unwrap_err();
        assert!(matches!(err, IdentifiersError::Empty { .. }));
        assert!(err.to_string().contains(&path));
    }

    #[test]
    fn file_duplicates_are_dropped() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "T 4 02/15/34 Govt\n# again\nT 4 02/15/34 Govt  # inline\n/isin/US0378331005").unwrap();
        let path = f.path().to_str().unwrap().to_string();

        let ids = load_identifiers(&replay_args(&["--ids-file", &path])).unwrap();
        assert_eq!(ids, ["T 4 02/15/34 Govt", "/isin/US0378331005"]);
    }

    #[test]
    fn missing_file_reports_path() {
        let args = replay_args(&["--ids-file", "/definitely/not/here.txt"]);
        let err = load_identifiers(&args).unwrap_err();
        assert!(err.to_string().contains("not/here.txt"));
    }
}
