use crate::config::{CorrelationId, DEFAULT_DATE_FORMAT, SessionConfig};
use crate::dispatch::{DispatchStats, run_dispatch_loop};
use crate::error::SessionError;
use crate::pending::{Completion, PendingError, PendingRequestTable};
use crate::transport::{RequestPayload, Transport};
use log::{debug, info, warn};
use refdata_core::parser::parse_str;
use refdata_core::value::decode_elements;
use refdata_core::{RequestSpec, ResponseDocument, ResponseFormat, TypedResponse};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Сессия: отправляет запросы и блокирующе ждёт их ответы.
///
/// Ответы разбирает фоновый поток диспетчеризации; вызывающий ждёт
/// не дольше `SessionConfig::effective_request_timeout`. `submit` можно звать
/// из нескольких потоков одновременно.
pub struct Session {
    transport: Arc<dyn Transport>,
    table: Arc<PendingRequestTable>,
    shutdown: Arc<AtomicBool>,
    next_id: AtomicU64,
    config: SessionConfig,
    dispatch: Option<JoinHandle<DispatchStats>>,
}

impl Session {
    /// Запускает транспорт, открывает сервис и поток диспетчеризации
    pub fn start(transport: Arc<dyn Transport>, config: SessionConfig) -> Result<Self, SessionError> {
        transport.start().map_err(SessionError::TransportStart)?;
        transport
            .open_service(&config.service)
            .map_err(|source| SessionError::ServiceUnavailable {
                service: config.service.clone(),
                source,
            })?;
        info!("session started, service {}", config.service);

        let table = Arc::new(PendingRequestTable::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let dispatch = {
            let transport = transport.clone();
            let table = table.clone();
            let shutdown = shutdown.clone();
            let (poll, ttl) = (config.poll_interval, config.orphan_ttl);
            thread::Builder::new()
                .name("refdata-dispatch".into())
                .spawn(move || run_dispatch_loop(transport, table, shutdown, poll, ttl))
                .map_err(SessionError::Spawn)?
        };

        Ok(Self {
            transport,
            table,
            shutdown,
            next_id: AtomicU64::new(1),
            config,
            dispatch: Some(dispatch),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Запрос -> типизированный ответ
    pub fn submit(&self, spec: &RequestSpec) -> Result<TypedResponse, SessionError> {
        let payloads = self.exchange(spec)?;

        match spec.format {
            ResponseFormat::LineFile => Ok(parse_str(&payloads.concat())?.to_typed()?),
            ResponseFormat::Elements => {
                let text = payloads.concat();
                Ok(decode_elements(text.lines(), DEFAULT_DATE_FORMAT)?)
            }
        }
    }

    /// Запрос -> разобранный, но не типизированный документ.
    ///
    /// Только для ответов в построчном формате.
    pub fn submit_raw(&self, spec: &RequestSpec) -> Result<ResponseDocument, SessionError> {
        if spec.format != ResponseFormat::LineFile {
            return Err(SessionError::RawElementsUnsupported);
        }
        let payloads = self.exchange(spec)?;
        Ok(parse_str(&payloads.concat())?)
    }

    // регистрация -> отправка -> ожидание
    fn exchange(&self, spec: &RequestSpec) -> Result<Vec<String>, SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionTerminated);
        }

        let body = spec.render()?;
        let id: CorrelationId = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = RequestPayload {
            service: self.config.service.clone(),
            format: spec.format,
            body,
        };

        // ответ может прийти раньше, чем send вернётся
        self.table.register(id)?;
        if self.is_closed() {
            self.table.remove(id);
            return Err(SessionError::SessionTerminated);
        }

        if let Err(e) = self.transport.send(id, &payload) {
            self.table.remove(id);
            warn!("request {id}: send failed: {e}");
            return Err(e.into());
        }

        let timeout = self.config.effective_request_timeout();
        let started = Instant::now();
        let completion = match self.table.await_completion(id, timeout) {
            Ok(c) => c,
            // таблицу успели очистить при остановке
            Err(PendingError::NotRegistered(_)) if self.is_closed() => Completion::Disconnected,
            Err(e) => return Err(e.into()),
        };

        match completion {
            Completion::Completed(payloads) => {
                debug!(
                    "request {id}: {} fragment(s) in {:?}",
                    payloads.len(),
                    started.elapsed()
                );
                Ok(payloads)
            }
            Completion::TimedOut => {
                warn!("request {id}: timed out after {timeout:?}");
                Err(SessionError::RequestTimeout { id, timeout })
            }
            Completion::Disconnected => Err(SessionError::SessionTerminated),
        }
    }

    /// Сколько запросов сейчас ждут ответа
    pub fn pending(&self) -> usize {
        self.table.len()
    }

    /// Цикл диспетчеризации остановлен (или остановка запрошена)
    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Останавливает поток диспетчеризации и возвращает его счётчики
    pub fn shutdown(mut self) -> DispatchStats {
        self.stop().unwrap_or_default()
    }

    fn stop(&mut self) -> Option<DispatchStats> {
        self.shutdown.store(true, Ordering::Relaxed);
        let handle = self.dispatch.take()?;
        match handle.join() {
            Ok(stats) => {
                info!("dispatch stopped: {stats}");
                Some(stats)
            }
            Err(panic) => {
                warn!("dispatch thread panicked: {:?}", panic);
                None
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::StopReason;
    use crate::transport::{ChannelTransport, SessionEvent, TransportError};
    use refdata_core::FieldValue;
    use refdata_core::wire::split_response;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const RESPONSE: &str = "START-OF-FILE\n\
PROGRAMNAME=getdata\n\
START-OF-FIELDS\n\
PX_LAST\n\
NAME\n\
END-OF-FIELDS\n\
START-OF-DATA\n\
IBM US Equity|0|2|100.25|INTL BUSINESS MACHINES|\n\
BAD US Equity|10|0|\n\
END-OF-DATA\n\
END-OF-FILE\n";

    fn fast_config() -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(5),
            ..SessionConfig::default()
        }
        .with_request_timeout(Duration::from_secs(5))
    }

    fn spec() -> RequestSpec {
        RequestSpec::new(["IBM US Equity", "BAD US Equity"], ["PX_LAST", "NAME"])
    }

    fn fragmented(parts: usize) -> ChannelTransport {
        ChannelTransport::new().with_responder(move |id, _req| {
            split_response(RESPONSE, parts)
                .iter()
                .map(|f| SessionEvent::from_frame(id, f))
                .collect()
        })
    }

    #[test]
    fn fragmented_response_is_reassembled_and_typed() {
        let session = Session::start(Arc::new(fragmented(4)), fast_config()).unwrap();

        let resp = session.submit(&spec()).unwrap();
        assert_eq!(
            resp.value("IBM US Equity", "PX_LAST"),
            Some(&FieldValue::Decimal(dec!(100.25)))
        );
        let bad = resp.records_for("BAD US Equity").next().unwrap();
        assert_eq!(bad.return_code, 10);
        assert!(bad.values.is_empty());
        assert_eq!(session.pending(), 0);

        let stats = session.shutdown();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.stop_reason, StopReason::ShutdownFlag);
    }

    #[test]
    fn submit_raw_returns_document() {
        let session = Session::start(Arc::new(fragmented(1)), fast_config()).unwrap();
        let doc = session.submit_raw(&spec()).unwrap();
        assert_eq!(doc.fields(), ["PX_LAST", "NAME"]);
        assert_eq!(doc.entry("IBM US Equity").unwrap().field("NAME"), Some("INTL BUSINESS MACHINES"));

        assert!(matches!(
            session.submit_raw(&spec().with_format(ResponseFormat::Elements)),
            Err(SessionError::RawElementsUnsupported)
        ));
    }

    #[test]
    fn request_is_rendered_for_the_configured_service() {
        let t = fragmented(1);
        let requests = t.requests();
        let session = Session::start(Arc::new(t), fast_config().with_service("//refdata/custom")).unwrap();
        session.submit(&spec()).unwrap();

        let (id, req) = requests.try_recv().unwrap();
        assert_eq!(id, 1);
        assert_eq!(req.service, "//refdata/custom");
        assert!(req.body.contains("START-OF-FIELDS\nPX_LAST\nNAME\nEND-OF-FIELDS"));
        assert!(req.body.contains("IBM US Equity"));
    }

    #[test]
    fn element_responses_are_decoded_per_element() {
        let t = ChannelTransport::new().with_responder(|id, req| {
            assert_eq!(req.format, ResponseFormat::Elements);
            vec![SessionEvent::response(
                id,
                "IBM US Equity|PX_LAST|100.25\nIBM US Equity|CALLABLE|N\n",
            )]
        });
        let session = Session::start(Arc::new(t), fast_config()).unwrap();

        let resp = session
            .submit(&RequestSpec::new(["IBM US Equity"], ["PX_LAST", "CALLABLE"]).with_format(ResponseFormat::Elements))
            .unwrap();
        assert_eq!(
            resp.value("IBM US Equity", "PX_LAST"),
            Some(&FieldValue::Decimal(dec!(100.25)))
        );
        assert_eq!(resp.value("IBM US Equity", "CALLABLE"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn interleaved_fragments_reach_their_own_requests() {
        let t = ChannelTransport::new();
        let inject = t.injector();
        let requests = t.requests();
        let session = Arc::new(Session::start(Arc::new(t), fast_config()).unwrap());

        let submit = |ident: &'static str| {
            let session = session.clone();
            thread::spawn(move || session.submit(&RequestSpec::new([ident], ["PX_LAST"])))
        };
        let a = submit("AAA Equity");
        let b = submit("BBB Equity");

        // id -> идентификатор из текста запроса
        let mut sent = Vec::new();
        for _ in 0..2 {
            let (id, req) = requests.recv_timeout(Duration::from_secs(5)).unwrap();
            let ident = if req.body.contains("AAA Equity") { "AAA Equity" } else { "BBB Equity" };
            sent.push((id, ident));
        }

        let head = "START-OF-FILE\nSTART-OF-FIELDS\nPX_LAST\nEND-OF-FIELDS\nSTART-OF-DATA\n";
        let tail = |px: &str, ident: &str| format!("{ident}|0|1|{px}|\nEND-OF-DATA\nEND-OF-FILE\n");
        let (id0, ident0) = sent[0];
        let (id1, ident1) = sent[1];

        inject.send(SessionEvent::partial(id0, head)).unwrap();
        inject.send(SessionEvent::partial(id1, head)).unwrap();
        inject.send(SessionEvent::fragment_end(id1, &tail("2", ident1))).unwrap();
        inject.send(SessionEvent::fragment_end(id0, &tail("1", ident0))).unwrap();

        let ra = a.join().unwrap().unwrap();
        let rb = b.join().unwrap().unwrap();
        let px = |ident| if ident == ident0 { dec!(1) } else { dec!(2) };
        assert_eq!(ra.value("AAA Equity", "PX_LAST"), Some(&FieldValue::Decimal(px("AAA Equity"))));
        assert_eq!(rb.value("BBB Equity", "PX_LAST"), Some(&FieldValue::Decimal(px("BBB Equity"))));
        assert!(ra.value("BBB Equity", "PX_LAST").is_none());
    }

    #[test]
    fn unanswered_request_times_out_and_is_forgotten() {
        let config = fast_config().with_request_timeout(Duration::from_millis(100));
        let session = Session::start(Arc::new(ChannelTransport::new()), config).unwrap();

        let started = Instant::now();
        let err = session.submit(&spec()).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, SessionError::RequestTimeout { id: 1, .. }));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(3), "blocked too long: {elapsed:?}");
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn start_failures_are_reported() {
        let refused = Session::start(Arc::new(ChannelTransport::new().refusing_start()), fast_config());
        assert!(matches!(
            refused,
            Err(SessionError::TransportStart(TransportError::StartRefused(_)))
        ));

        let no_service = Session::start(
            Arc::new(ChannelTransport::new().with_services(["//other"])),
            fast_config(),
        );
        match no_service {
            Err(SessionError::ServiceUnavailable { service, .. }) => {
                assert_eq!(service, "//refdata/bulk")
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("session must not start"),
        }
    }

    #[test]
    fn invalid_request_is_rejected_before_sending() {
        let t = ChannelTransport::new();
        let requests = t.requests();
        let session = Session::start(Arc::new(t), fast_config()).unwrap();

        let err = session.submit(&RequestSpec::new(["IBM US Equity"], Vec::<String>::new())).unwrap_err();
        assert!(matches!(err, SessionError::Request(_)));
        assert!(requests.try_recv().is_err());
    }

    #[test]
    fn terminated_session_fails_pending_and_later_requests() {
        let t = ChannelTransport::new()
            .with_responder(|_id, _req| vec![SessionEvent::session_terminated("vendor logout")]);
        let session = Session::start(Arc::new(t), fast_config()).unwrap();

        let started = Instant::now();
        assert!(matches!(session.submit(&spec()), Err(SessionError::SessionTerminated)));
        assert!(started.elapsed() < Duration::from_secs(3));

        assert!(session.is_closed());
        assert!(matches!(session.submit(&spec()), Err(SessionError::SessionTerminated)));

        let stats = session.shutdown();
        assert_eq!(stats.stop_reason, StopReason::SessionTerminated("vendor logout".into()));
    }

    #[test]
    fn malformed_response_surfaces_format_error() {
        let t = ChannelTransport::new()
            .with_responder(|id, _req| vec![SessionEvent::response(id, "START-OF-FILE\nSTART-OF-NOTHING\n")]);
        let session = Session::start(Arc::new(t), fast_config()).unwrap();
        assert!(matches!(session.submit(&spec()), Err(SessionError::Format(_))));
    }
}
