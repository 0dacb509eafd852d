use std::fs::File;
use std::io::{BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};
use refdata_core::request::parse_csv_list;
use refdata_core::wire::{CaptureFrameV1, read_capture};
use refdata_core::{RequestSpec, TypedResponse};
use refdata_session::{ChannelTransport, Session, SessionConfig, SessionError, SessionEvent};

use crate::cli::ReplayArgs;
use crate::identifiers::load_identifiers;

const TICK_RATE_MS: u64 = 200;

/// Транспорт, который на каждый запрос отвечает записанными кадрами
pub(crate) fn replay_transport(frames: Vec<CaptureFrameV1>) -> ChannelTransport {
    ChannelTransport::new().with_responder(move |id, req| {
        info!("replaying {} frame(s) for request {id} ({} bytes)", frames.len(), req.body.len());
        frames.iter().map(|f| SessionEvent::from_frame(id, f)).collect()
    })
}

pub(crate) fn run_replay(
    args: &ReplayArgs,
    shutdown: Arc<AtomicBool>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let ids = load_identifiers(args)?;
    let mut spec = RequestSpec::new(ids, parse_csv_list(&args.fields));
    for (field, value) in args.overrides() {
        spec = spec.with_override(field, value);
    }

    let f = File::open(&args.capture).with_context(|| format!("open {:?}", args.capture))?;
    let frames = read_capture(BufReader::new(f)).with_context(|| format!("read capture {:?}", args.capture))?;
    if frames.is_empty() {
        bail!("capture {:?} has no frames", args.capture);
    }

    let config = SessionConfig::default()
        .with_service(&args.service)
        .with_request_timeout(Duration::from_millis(args.timeout_ms));
    let session = Session::start(Arc::new(replay_transport(frames)), config)?;

    let resp = wait_interruptible(session, spec, &shutdown)?;
    for r in &resp.records {
        writeln!(out, "{r}")?;
    }
    Ok(())
}

// submit в отдельном потоке, чтобы Ctrl+C не ждал таймаута запроса
fn wait_interruptible(
    session: Session,
    spec: RequestSpec,
    shutdown: &AtomicBool,
) -> anyhow::Result<TypedResponse> {
    let (tx, rx) = crossbeam_channel::bounded::<Result<TypedResponse, SessionError>>(1);

    let h = thread::spawn(move || {
        let res = session.submit(&spec);
        let stats = session.shutdown();
        info!("session closed: {stats}");
        // получатель мог уже уйти по Ctrl+C
        let _ = tx.send(res);
    });

    let result = loop {
        if shutdown.load(Ordering::Relaxed) {
            warn!("interrupted; not waiting for the response");
            bail!("interrupted");
        }
        match rx.recv_timeout(Duration::from_millis(TICK_RATE_MS)) {
            Ok(res) => break res,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("request thread exited without a result"),
        }
    };

    if let Err(panic) = h.join() {
        warn!("request thread panicked: {:?}", panic);
    }
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdata_core::wire::split_response;

    const RESPONSE: &str = "START-OF-FILE\nSTART-OF-FIELDS\nPX_LAST\nEND-OF-FIELDS\n\
START-OF-DATA\nIBM US Equity|0|1|100.25|\nEND-OF-DATA\nEND-OF-FILE\n";

    #[test]
    fn replayed_capture_answers_every_request() {
        let t = replay_transport(split_response(RESPONSE, 3));
        let session = Session::start(Arc::new(t), SessionConfig::default()).unwrap();
        let spec = RequestSpec::new(["IBM US Equity"], ["PX_LAST"]);

        for _ in 0..2 {
            let resp = session.submit(&spec).unwrap();
            assert_eq!(
                resp.value("IBM US Equity", "PX_LAST").unwrap().to_string(),
                "100.25"
            );
        }
    }

    #[test]
    fn shutdown_flag_interrupts_waiting() {
        // без ответа: запрос будет ждать свой таймаут
        let t = ChannelTransport::new();
        let config = SessionConfig::default().with_request_timeout(Duration::from_secs(30));
        let session = Session::start(Arc::new(t), config).unwrap();

        let shutdown = AtomicBool::new(true);
        let err = wait_interruptible(session, RequestSpec::new(["X"], ["PX_LAST"]), &shutdown).unwrap_err();
        assert_eq!(err.to_string(), "interrupted");
    }
}
