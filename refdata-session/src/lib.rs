//! # refdata-session
//!
//! Связывает асинхронные события поставщика с запросами, которые их ждут.
//!
//! - [`transport`] — абстрактная внешняя сессия и транспорт на каналах
//! - [`pending`] — таблица запросов в полёте
//! - [`dispatch`] — фоновый цикл опроса событий
//! - [`session`] — отправка запроса и блокирующее ожидание ответа
//! - [`config`] — настройки и значения по умолчанию
//!
//! ## Пример
//!
//! ```rust
//! use std::sync::Arc;
//! use refdata_core::RequestSpec;
//! use refdata_session::{ChannelTransport, Session, SessionConfig, SessionEvent};
//!
//! let transport = ChannelTransport::new().with_responder(|id, _req| {
//!     vec![SessionEvent::response(
//!         id,
//!         "START-OF-FILE\nSTART-OF-FIELDS\nPX_LAST\nEND-OF-FIELDS\n\
//!          START-OF-DATA\nIBM US Equity|0|1|100.25|\nEND-OF-DATA\nEND-OF-FILE\n",
//!     )]
//! });
//!
//! let session = Session::start(Arc::new(transport), SessionConfig::default()).unwrap();
//! let resp = session
//!     .submit(&RequestSpec::new(["IBM US Equity"], ["PX_LAST"]))
//!     .unwrap();
//! assert_eq!(resp.value("IBM US Equity", "PX_LAST").unwrap().to_string(), "100.25");
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod pending;
pub mod session;
pub mod transport;

pub use crate::config::{CorrelationId, SessionConfig};
pub use crate::dispatch::{DispatchStats, StopReason};
pub use crate::error::SessionError;
pub use crate::pending::{Completion, PendingError, PendingRequestTable};
pub use crate::session::Session;
pub use crate::transport::{
    ChannelTransport, EventKind, RequestPayload, SessionEvent, Transport, TransportError,
};
