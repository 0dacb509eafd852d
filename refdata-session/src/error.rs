use std::time::Duration;

use refdata_core::{DecodeError, FormatError, RequestError};
use thiserror::Error;

use crate::config::CorrelationId;
use crate::pending::PendingError;
use crate::transport::TransportError;

/// Ошибки сессии
#[derive(Debug, Error)]
pub enum SessionError {
    /// Транспорт не запустился
    #[error("transport failed to start: {0}")]
    TransportStart(#[source] TransportError),

    /// Сервис не открылся
    #[error("service {service} is unavailable: {source}")]
    ServiceUnavailable {
        /// имя сервиса
        service: String,
        /// причина
        #[source]
        source: TransportError,
    },

    /// Ошибка транспорта при отправке
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Ответ не пришёл вовремя
    #[error("request {id} timed out after {timeout:?}")]
    RequestTimeout {
        /// идентификатор корреляции
        id: CorrelationId,
        /// сколько ждали
        timeout: Duration,
    },

    /// Сессия закрыта, ответа не будет
    #[error("session is terminated")]
    SessionTerminated,

    /// Поэлементный ответ нельзя вернуть как документ
    #[error("raw documents are only available for line-file responses")]
    RawElementsUnsupported,

    /// Не удалось запустить поток диспетчеризации
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Pending(#[from] PendingError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Request(#[from] RequestError),
}
