use crate::config::CorrelationId;
use crate::transport::SessionEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PendingError {
    #[error("request already registered: {0}")]
    AlreadyRegistered(CorrelationId),
    #[error("request is not registered: {0}")]
    NotRegistered(CorrelationId),
}

/// Итог ожидания ответа
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Пришло завершающее событие; фрагменты в порядке доставки
    Completed(Vec<String>),
    /// Таймаут истёк, регистрация удалена
    TimedOut,
    /// Таблицу очистили (сессия закрыта), пока мы ждали
    Disconnected,
}

/// Что сделала таблица с событием
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Фрагмент добавлен в буфер
    Appended,
    /// Фрагмент добавлен, запрос завершён
    Completed,
    /// Запрос ещё не зарегистрирован: буфер создан заранее
    Orphaned,
    /// Событие не относится ни к одному запросу
    Ignored,
}

struct PendingRequest {
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    payloads: Vec<String>,
    completed: bool,
    // создан диспетчером до регистрации
    orphan: bool,
    created: Instant,
}

impl PendingRequest {
    fn new(orphan: bool) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        Self {
            done_tx,
            done_rx,
            payloads: Vec::new(),
            completed: false,
            orphan,
            created: Instant::now(),
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("payloads", &self.payloads.len())
            .field("completed", &self.completed)
            .field("orphan", &self.orphan)
            .finish()
    }
}

/// Запросы в полёте: id -> сигнал завершения + накопленные фрагменты.
///
/// Пишут в таблицу два потока: цикл диспетчеризации (`dispatch`)
/// и вызывающий (`register` / `await_completion`).
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    requests: Mutex<HashMap<CorrelationId, PendingRequest>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingRequest>> {
        match self.requests.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        }
    }

    /// Регистрирует запрос. Вызывать до отправки в транспорт.
    ///
    /// Если события по `id` уже пришли раньше регистрации, они сохраняются
    /// и достаются этому запросу.
    pub fn register(&self, id: CorrelationId) -> Result<(), PendingError> {
        let mut requests = self.lock();

        match requests.entry(id) {
            Entry::Vacant(e) => {
                e.insert(PendingRequest::new(false));
                Ok(())
            }
            Entry::Occupied(mut e) if e.get().orphan => {
                let req = e.get_mut();
                req.orphan = false;
                req.created = Instant::now();
                info!(
                    "request {id}: adopting {} early fragment(s), completed={}",
                    req.payloads.len(),
                    req.completed
                );
                Ok(())
            }
            Entry::Occupied(_) => Err(PendingError::AlreadyRegistered(id)),
        }
    }

    /// Кладёт событие в буфер своего запроса и сигналит о завершении
    pub fn dispatch(&self, event: &SessionEvent) -> DispatchOutcome {
        let Some(id) = event.correlation_id else {
            return DispatchOutcome::Ignored;
        };
        if !event.kind.carries_data() {
            debug!("request {id}: {:?} {:?}", event.kind, event.payload);
            return DispatchOutcome::Ignored;
        }

        let mut requests = self.lock();

        let mut orphaned = false;
        let req = requests.entry(id).or_insert_with(|| {
            warn!("event {:?} for unregistered request {id}; buffering", event.kind);
            orphaned = true;
            PendingRequest::new(true)
        });

        if req.completed {
            warn!("request {id}: {:?} after completion", event.kind);
        }
        if !event.payload.is_empty() {
            req.payloads.push(event.payload.clone());
        }

        if event.kind.is_terminal() && !req.completed {
            req.completed = true;
            // ёмкость 1 и одно завершение — место всегда есть
            let _ = req.done_tx.try_send(());
            if !orphaned {
                return DispatchOutcome::Completed;
            }
        }

        if orphaned {
            DispatchOutcome::Orphaned
        } else {
            DispatchOutcome::Appended
        }
    }

    /// Ждёт завершения не дольше `timeout`. В любом исходе запись удаляется.
    pub fn await_completion(
        &self,
        id: CorrelationId,
        timeout: Duration,
    ) -> Result<Completion, PendingError> {
        let done_rx = {
            let requests = self.lock();
            requests
                .get(&id)
                .ok_or(PendingError::NotRegistered(id))?
                .done_rx
                .clone()
        };

        let res = done_rx.recv_timeout(timeout);
        let removed = self.lock().remove(&id);

        Ok(match (res, removed) {
            (Ok(()), Some(req)) => Completion::Completed(req.payloads),
            (Ok(()), None) => Completion::Disconnected,
            (Err(RecvTimeoutError::Timeout), _) => {
                debug!("request {id}: no terminal event within {timeout:?}");
                Completion::TimedOut
            }
            (Err(RecvTimeoutError::Disconnected), _) => Completion::Disconnected,
        })
    }

    pub fn remove(&self, id: CorrelationId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Удаляет буферы, созданные до регистрации и так и не востребованные
    pub fn purge_orphans(&self, max_age: Duration) -> usize {
        let mut requests = self.lock();
        let before = requests.len();
        requests.retain(|id, req| {
            let stale = req.orphan && req.created.elapsed() >= max_age;
            if stale {
                warn!("request {id}: dropping {} unclaimed fragment(s)", req.payloads.len());
            }
            !stale
        });
        before - requests.len()
    }

    /// Сбрасывает все запросы; ожидающие получат `Completion::Disconnected`
    pub fn clear(&self) -> usize {
        let mut requests = self.lock();
        let n = requests.len();
        requests.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn register_ok_and_duplicate_fails() {
        let table = PendingRequestTable::new();

        table.register(1).expect("register should succeed");

        let err = table.register(1).unwrap_err();
        assert_eq!(err, PendingError::AlreadyRegistered(1));
    }

    #[test]
    fn remove_returns_bool() {
        let table = PendingRequestTable::new();

        // нет такого запроса
        assert!(!table.remove(42));

        table.register(42).unwrap();
        assert!(table.remove(42));

        // уже удалён
        assert!(!table.remove(42));
    }

    #[test]
    fn fragments_are_collected_in_delivery_order() {
        let table = PendingRequestTable::new();
        table.register(1).unwrap();

        assert_eq!(table.dispatch(&SessionEvent::partial(1, "a")), DispatchOutcome::Appended);
        assert_eq!(table.dispatch(&SessionEvent::partial(1, "b")), DispatchOutcome::Appended);
        assert_eq!(
            table.dispatch(&SessionEvent::fragment_end(1, "c")),
            DispatchOutcome::Completed
        );

        let got = table.await_completion(1, Duration::from_millis(200)).unwrap();
        assert_eq!(got, Completion::Completed(vec!["a".into(), "b".into(), "c".into()]));
        assert!(table.is_empty());
    }

    #[test]
    fn single_response_completes_immediately() {
        let table = PendingRequestTable::new();
        table.register(3).unwrap();
        assert_eq!(
            table.dispatch(&SessionEvent::response(3, "whole")),
            DispatchOutcome::Completed
        );
        assert_eq!(
            table.await_completion(3, Duration::from_millis(200)).unwrap(),
            Completion::Completed(vec!["whole".into()])
        );
    }

    #[test]
    fn status_and_uncorrelated_events_are_ignored() {
        let table = PendingRequestTable::new();
        table.register(1).unwrap();

        assert_eq!(
            table.dispatch(&SessionEvent::status(Some(1), "queued")),
            DispatchOutcome::Ignored
        );
        assert_eq!(
            table.dispatch(&SessionEvent::status(None, "heartbeat")),
            DispatchOutcome::Ignored
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn await_times_out_within_bound_and_removes_registration() {
        let table = PendingRequestTable::new();
        table.register(9).unwrap();
        table.dispatch(&SessionEvent::partial(9, "never finished"));

        let timeout = Duration::from_millis(100);
        let started = Instant::now();
        let got = table.await_completion(9, timeout).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(got, Completion::TimedOut);
        assert!(elapsed >= timeout, "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "blocked too long: {elapsed:?}");
        assert!(!table.contains(9));
    }

    #[test]
    fn await_unknown_request_fails() {
        let table = PendingRequestTable::new();
        assert_eq!(
            table.await_completion(5, Duration::from_millis(10)),
            Err(PendingError::NotRegistered(5))
        );
    }

    #[test]
    fn event_before_registration_is_buffered_and_replayed() {
        let table = PendingRequestTable::new();

        assert_eq!(
            table.dispatch(&SessionEvent::response(7, "early")),
            DispatchOutcome::Orphaned
        );
        assert!(table.contains(7));

        // регистрация подхватывает буфер, а не считается дублем
        table.register(7).unwrap();
        let got = table.await_completion(7, Duration::from_millis(50)).unwrap();
        assert_eq!(got, Completion::Completed(vec!["early".into()]));
    }

    #[test]
    fn unclaimed_orphans_are_purged() {
        let table = PendingRequestTable::new();
        table.register(1).unwrap();
        table.dispatch(&SessionEvent::partial(2, "stray"));

        assert_eq!(table.purge_orphans(Duration::from_secs(60)), 0);
        assert_eq!(table.purge_orphans(Duration::ZERO), 1);
        assert!(table.contains(1));
        assert!(!table.contains(2));
    }

    #[test]
    fn clear_wakes_waiter_with_disconnected() {
        let table = Arc::new(PendingRequestTable::new());
        table.register(1).unwrap();

        let waiter = {
            let table = table.clone();
            thread::spawn(move || table.await_completion(1, Duration::from_secs(5)))
        };

        // даём ожидающему взять receiver
        thread::sleep(Duration::from_millis(50));
        assert_eq!(table.clear(), 1);

        let got = waiter.join().unwrap().unwrap();
        assert_eq!(got, Completion::Disconnected);
    }

    #[test]
    fn completion_from_another_thread_wakes_waiter() {
        let table = Arc::new(PendingRequestTable::new());
        table.register(11).unwrap();

        let writer = {
            let table = table.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                table.dispatch(&SessionEvent::partial(11, "x"));
                table.dispatch(&SessionEvent::fragment_end(11, "y"));
            })
        };

        let got = table.await_completion(11, Duration::from_secs(5)).unwrap();
        writer.join().unwrap();
        assert_eq!(got, Completion::Completed(vec!["x".into(), "y".into()]));
    }
}
