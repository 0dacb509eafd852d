//! Перехват записей `log` в тестах.
//!
//! Логгер глобальный, но буфер у каждого потока свой: тесты,
//! идущие параллельно, не видят чужих записей.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::sync::Once;

struct CaptureLogger;

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        RECORDS.with(|r| {
            r.borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

/// Выполняет `f` и возвращает её результат вместе с записями лога этого потока
pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<(Level, String)>) {
    INIT.call_once(|| {
        // другой логгер уже мог быть установлен — тогда просто ничего не поймаем
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
    });

    RECORDS.with(|r| r.borrow_mut().clear());
    let out = f();
    let records = RECORDS.with(|r| std::mem::take(&mut *r.borrow_mut()));
    (out, records)
}

/// Сколько записей уровня `level` содержат `needle`
pub(crate) fn count(records: &[(Level, String)], level: Level, needle: &str) -> usize {
    records
        .iter()
        .filter(|(l, msg)| *l == level && msg.contains(needle))
        .count()
}
