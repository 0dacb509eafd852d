use crate::config::BACK_TO_BACK_POLL_ERR_LIMIT;
use crate::pending::{DispatchOutcome, PendingRequestTable};
use crate::transport::{EventKind, Transport, TransportError};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Почему цикл диспетчеризации остановился
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Поднят флаг остановки
    #[default]
    ShutdownFlag,
    /// Пришло событие `Shutdown`
    ShutdownEvent,
    /// Транспорт сообщил о потере сессии
    SessionTerminated(String),
    /// Источник событий закрыт
    Disconnected,
    /// Слишком много ошибок опроса подряд
    PollErrors(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ShutdownFlag => f.write_str("shutdown flag"),
            StopReason::ShutdownEvent => f.write_str("shutdown event"),
            StopReason::SessionTerminated(r) => write!(f, "session terminated: {r}"),
            StopReason::Disconnected => f.write_str("event source disconnected"),
            StopReason::PollErrors(e) => write!(f, "poll errors: {e}"),
        }
    }
}

/// Счётчики цикла диспетчеризации
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Фрагментов положено в буферы
    pub delivered: usize,
    /// Запросов завершено
    pub completed: usize,
    /// Событий для незарегистрированных запросов
    pub orphaned: usize,
    /// Служебных событий
    pub status: usize,
    /// Удалено невостребованных буферов
    pub purged: usize,
    /// Запросов, сброшенных при остановке
    pub abandoned: usize,
    pub stop_reason: StopReason,
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered={} completed={} orphaned={} status={} purged={} abandoned={} stop=({})",
            self.delivered,
            self.completed,
            self.orphaned,
            self.status,
            self.purged,
            self.abandoned,
            self.stop_reason
        )
    }
}

impl DispatchStats {
    fn count(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Appended => self.delivered += 1,
            DispatchOutcome::Completed => {
                self.delivered += 1;
                self.completed += 1;
            }
            DispatchOutcome::Orphaned => {
                self.delivered += 1;
                self.orphaned += 1;
            }
            DispatchOutcome::Ignored => self.status += 1,
        }
    }
}

// опрос транспорта + раздача событий по запросам
pub fn run_dispatch_loop(
    transport: Arc<dyn Transport>,
    table: Arc<PendingRequestTable>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
    orphan_ttl: Duration,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    let mut back_to_back_err_count = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutting down dispatch loop");
            stats.stop_reason = StopReason::ShutdownFlag;
            break;
        }

        stats.purged += table.purge_orphans(orphan_ttl);

        // ждём одно событие, заодно это и есть пауза цикла
        let event = match transport.poll_event(poll_interval) {
            Ok(Some(ev)) => {
                back_to_back_err_count = 0;
                ev
            }
            Ok(None) => {
                back_to_back_err_count = 0;
                continue;
            }
            Err(TransportError::Disconnected) => {
                warn!("event source disconnected; stopping dispatch");
                stats.stop_reason = StopReason::Disconnected;
                break;
            }
            Err(e) => {
                back_to_back_err_count += 1;
                warn!("poll_event failed ({back_to_back_err_count} in a row): {e}");
                if back_to_back_err_count >= BACK_TO_BACK_POLL_ERR_LIMIT {
                    error!("giving up on event source after {back_to_back_err_count} errors");
                    stats.stop_reason = StopReason::PollErrors(e.to_string());
                    break;
                }
                continue;
            }
        };

        match event.kind {
            EventKind::Shutdown => {
                info!("shutdown event received");
                stats.stop_reason = StopReason::ShutdownEvent;
                break;
            }
            EventKind::SessionTerminated => {
                warn!("session terminated: {}", event.payload);
                stats.stop_reason = StopReason::SessionTerminated(event.payload);
                break;
            }
            _ => {
                let outcome = table.dispatch(&event);
                debug!("{:?} -> {outcome:?}", event.kind);
                stats.count(outcome);
            }
        }
    }

    // ожидающие увидят Disconnected, новые submit — закрытую сессию
    shutdown.store(true, Ordering::Relaxed);
    stats.abandoned = table.clear();
    if stats.abandoned > 0 {
        warn!("{} request(s) abandoned at dispatch stop", stats.abandoned);
    }

    stats
}
