use std::time::Duration;

pub use refdata_core::constants::DEFAULT_DATE_FORMAT;

/// Идентификатор корреляции запроса и его ответных событий
pub type CorrelationId = u64;

/// Сколько ждём ответ на запрос. Всегда конечное значение.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Нижняя граница таймаута запроса
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(1);

/// Верхняя граница таймаута запроса
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Ожидание одного события в цикле диспетчеризации
pub const DISPATCH_TICK: Duration = Duration::from_millis(50);

/// Через сколько удалять события, пришедшие раньше регистрации запроса
pub const ORPHAN_TTL: Duration = Duration::from_secs(30);

/// Сервис по умолчанию
pub const DEFAULT_SERVICE: &str = "//refdata/bulk";

/// Ошибок транспорта подряд, после которых цикл диспетчеризации сдаётся
pub(crate) const BACK_TO_BACK_POLL_ERR_LIMIT: usize = 20;

/// Настройки сессии
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Имя сервиса, который открывается при старте
    pub service: String,
    /// Таймаут ожидания ответа; сессия читает его через
    /// [`SessionConfig::effective_request_timeout`]
    pub request_timeout: Duration,
    /// Ожидание события за одну итерацию цикла
    pub poll_interval: Duration,
    /// Время жизни "осиротевших" событий
    pub orphan_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DISPATCH_TICK,
            orphan_ttl: ORPHAN_TTL,
        }
    }
}

impl SessionConfig {
    /// Другой таймаут запроса, приведённый к допустимому диапазону
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = clamp_timeout(timeout);
        self
    }

    /// Таймаут, с которым сессия реально ждёт ответ: `request_timeout`,
    /// зажатый в `MIN_REQUEST_TIMEOUT..=MAX_REQUEST_TIMEOUT`
    pub fn effective_request_timeout(&self) -> Duration {
        clamp_timeout(self.request_timeout)
    }

    /// Другой сервис
    pub fn with_service(mut self, service: &str) -> Self {
        self.service = service.to_string();
        self
    }
}

fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_REQUEST_TIMEOUT, MAX_REQUEST_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timeout_is_always_bounded() {
        let cfg = SessionConfig { request_timeout: Duration::MAX, ..SessionConfig::default() };
        assert_eq!(cfg.effective_request_timeout(), MAX_REQUEST_TIMEOUT);

        let cfg = SessionConfig { request_timeout: Duration::ZERO, ..SessionConfig::default() };
        assert_eq!(cfg.effective_request_timeout(), MIN_REQUEST_TIMEOUT);

        let cfg = SessionConfig::default().with_request_timeout(Duration::MAX);
        assert_eq!(cfg.request_timeout, MAX_REQUEST_TIMEOUT);
        assert_eq!(
            SessionConfig::default().effective_request_timeout(),
            DEFAULT_REQUEST_TIMEOUT
        );
    }
}
