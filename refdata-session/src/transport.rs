use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::debug;
use refdata_core::ResponseFormat;
use refdata_core::wire::CaptureFrameV1;
use thiserror::Error;

use crate::config::CorrelationId;

/// Ошибки транспорта (внешняя сессия поставщика)
#[derive(Debug, Error)]
pub enum TransportError {
    /// Сессию не удалось запустить
    #[error("session start refused: {0}")]
    StartRefused(String),

    /// Операция до `start`
    #[error("transport is not started")]
    NotStarted,

    /// Сервис не найден
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Запрос не ушёл
    #[error("failed to send request {id}: {reason}")]
    Send {
        /// идентификатор корреляции
        id: CorrelationId,
        /// причина
        reason: String,
    },

    /// Источник событий закрыт
    #[error("event source disconnected")]
    Disconnected,
}

/// Тип события транспорта
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Ответ целиком
    Response,
    /// Промежуточный фрагмент
    PartialResponse,
    /// Последний фрагмент
    FragmentEnd,
    /// Служебное сообщение
    Status,
    /// Транспорт потерял сессию
    SessionTerminated,
    /// Явная остановка цикла диспетчеризации
    Shutdown,
}

impl EventKind {
    /// После этого события запрос считается завершённым
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Response | EventKind::FragmentEnd)
    }

    /// Событие несёт данные ответа
    pub fn carries_data(self) -> bool {
        matches!(
            self,
            EventKind::Response | EventKind::PartialResponse | EventKind::FragmentEnd
        )
    }
}

/// Событие, доставленное транспортом
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Тип
    pub kind: EventKind,
    /// К какому запросу относится (у служебных событий может не быть)
    pub correlation_id: Option<CorrelationId>,
    /// Текст фрагмента
    pub payload: String,
}

impl SessionEvent {
    fn new(kind: EventKind, id: Option<CorrelationId>, payload: &str) -> Self {
        Self {
            kind,
            correlation_id: id,
            payload: payload.to_string(),
        }
    }

    /// Ответ целиком
    pub fn response(id: CorrelationId, payload: &str) -> Self {
        Self::new(EventKind::Response, Some(id), payload)
    }

    /// Промежуточный фрагмент
    pub fn partial(id: CorrelationId, payload: &str) -> Self {
        Self::new(EventKind::PartialResponse, Some(id), payload)
    }

    /// Последний фрагмент
    pub fn fragment_end(id: CorrelationId, payload: &str) -> Self {
        Self::new(EventKind::FragmentEnd, Some(id), payload)
    }

    /// Служебное сообщение
    pub fn status(id: Option<CorrelationId>, message: &str) -> Self {
        Self::new(EventKind::Status, id, message)
    }

    /// Сессия потеряна
    pub fn session_terminated(reason: &str) -> Self {
        Self::new(EventKind::SessionTerminated, None, reason)
    }

    /// Остановить цикл диспетчеризации
    pub fn shutdown() -> Self {
        Self::new(EventKind::Shutdown, None, "")
    }

    /// Событие из записанного кадра
    pub fn from_frame(id: CorrelationId, frame: &CaptureFrameV1) -> Self {
        match frame {
            CaptureFrameV1::Partial(p) => Self::partial(id, p),
            CaptureFrameV1::Final(p) => Self::response(id, p),
            CaptureFrameV1::FragmentEnd(p) => Self::fragment_end(id, p),
            CaptureFrameV1::Status(p) => Self::status(Some(id), p),
        }
    }
}

/// Запрос в том виде, в котором он уходит в транспорт
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    /// Сервис
    pub service: String,
    /// Ожидаемый формат ответа
    pub format: ResponseFormat,
    /// Текст запроса
    pub body: String,
}

/// Внешняя сессия: старт, открытие сервиса, отправка запроса, поток событий.
pub trait Transport: Send + Sync {
    /// Запуск сессии
    fn start(&self) -> Result<(), TransportError>;

    /// Открыть сервис по имени
    fn open_service(&self, name: &str) -> Result<(), TransportError>;

    /// Отправить запрос; ответные события придут с тем же `id`
    fn send(&self, id: CorrelationId, request: &RequestPayload) -> Result<(), TransportError>;

    /// Следующее событие; ждёт не дольше `wait`. `Ok(None)` — событий пока нет.
    fn poll_event(&self, wait: Duration) -> Result<Option<SessionEvent>, TransportError>;
}

/// Функция, которая отвечает на запрос событиями
pub type Responder = Box<dyn Fn(CorrelationId, &RequestPayload) -> Vec<SessionEvent> + Send + Sync>;

/// Транспорт внутри процесса на каналах.
///
/// События можно подкладывать через [`injector`](Self::injector),
/// отправленные запросы читать через [`requests`](Self::requests),
/// а [`with_responder`](Self::with_responder) отвечает на запросы автоматически.
pub struct ChannelTransport {
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    requests_tx: Sender<(CorrelationId, RequestPayload)>,
    requests_rx: Receiver<(CorrelationId, RequestPayload)>,
    services: HashSet<String>,
    started: AtomicBool,
    refuse_start: bool,
    responder: Option<Responder>,
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTransport {
    /// Транспорт, принимающий любой сервис
    pub fn new() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (requests_tx, requests_rx) = crossbeam_channel::unbounded();
        Self {
            events_tx,
            events_rx,
            requests_tx,
            requests_rx,
            services: HashSet::new(),
            started: AtomicBool::new(false),
            refuse_start: false,
            responder: None,
        }
    }

    /// Разрешить только перечисленные сервисы
    pub fn with_services<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = names.into_iter().map(Into::into).collect();
        self
    }

    /// Автоматически отвечать на каждый запрос
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(CorrelationId, &RequestPayload) -> Vec<SessionEvent> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    /// `start` будет завершаться ошибкой
    pub fn refusing_start(mut self) -> Self {
        self.refuse_start = true;
        self
    }

    /// Канал для подкладывания событий
    pub fn injector(&self) -> Sender<SessionEvent> {
        self.events_tx.clone()
    }

    /// Канал отправленных запросов
    pub fn requests(&self) -> Receiver<(CorrelationId, RequestPayload)> {
        self.requests_rx.clone()
    }
}

impl Transport for ChannelTransport {
    fn start(&self) -> Result<(), TransportError> {
        if self.refuse_start {
            return Err(TransportError::StartRefused("refused by configuration".into()));
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn open_service(&self, name: &str) -> Result<(), TransportError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(TransportError::NotStarted);
        }
        if !self.services.is_empty() && !self.services.contains(name) {
            return Err(TransportError::ServiceNotFound(name.to_string()));
        }
        Ok(())
    }

    fn send(&self, id: CorrelationId, request: &RequestPayload) -> Result<(), TransportError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(TransportError::NotStarted);
        }

        // свой receiver держим сами, так что канал не закроется
        let _ = self.requests_tx.send((id, request.clone()));

        if let Some(responder) = &self.responder {
            for ev in responder(id, request) {
                debug!("responder: {:?} for {id}", ev.kind);
                self.events_tx.send(ev).map_err(|e| TransportError::Send {
                    id,
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    fn poll_event(&self, wait: Duration) -> Result<Option<SessionEvent>, TransportError> {
        match self.events_rx.recv_timeout(wait) {
            Ok(ev) => Ok(Some(ev)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RequestPayload {
        RequestPayload {
            service: "//refdata/bulk".into(),
            format: ResponseFormat::LineFile,
            body: "START-OF-FILE\nEND-OF-FILE\n".into(),
        }
    }

    #[test]
    fn open_service_requires_start_and_known_name() {
        let t = ChannelTransport::new().with_services(["//refdata/bulk"]);
        assert!(matches!(
            t.open_service("//refdata/bulk"),
            Err(TransportError::NotStarted)
        ));

        t.start().unwrap();
        t.open_service("//refdata/bulk").unwrap();
        assert!(matches!(
            t.open_service("//other"),
            Err(TransportError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn refusing_start_fails() {
        let t = ChannelTransport::new().refusing_start();
        assert!(matches!(t.start(), Err(TransportError::StartRefused(_))));
    }

    #[test]
    fn responder_events_are_polled_in_order() {
        let t = ChannelTransport::new().with_responder(|id, _req| {
            vec![SessionEvent::partial(id, "a"), SessionEvent::fragment_end(id, "b")]
        });
        t.start().unwrap();
        t.send(5, &payload()).unwrap();

        let first = t.poll_event(Duration::from_millis(100)).unwrap().unwrap();
        let second = t.poll_event(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(first, SessionEvent::partial(5, "a"));
        assert_eq!(second, SessionEvent::fragment_end(5, "b"));
        assert_eq!(t.poll_event(Duration::from_millis(10)).unwrap(), None);

        let (id, req) = t.requests().try_recv().unwrap();
        assert_eq!(id, 5);
        assert_eq!(req, payload());
    }

    #[test]
    fn frames_map_to_event_kinds() {
        assert!(SessionEvent::from_frame(1, &CaptureFrameV1::Final("x".into())).kind.is_terminal());
        assert!(SessionEvent::from_frame(1, &CaptureFrameV1::FragmentEnd("x".into())).kind.is_terminal());
        assert!(!SessionEvent::from_frame(1, &CaptureFrameV1::Partial("x".into())).kind.is_terminal());
        assert!(!SessionEvent::from_frame(1, &CaptureFrameV1::Status("x".into())).kind.carries_data());
    }
}
