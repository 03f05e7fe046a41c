/// Errors surfaced to callers of the push controller.
///
/// Every variant carries a message meant for display. Callers branch on the
/// variant (or on [`PushError::is_retryable`]), never on the message text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    #[error("push notifications are not supported here: {0}")]
    NotSupported(String),

    #[error("push notifications are not configured: {0}")]
    NotConfigured(String),

    #[error("notification permission denied: {0}")]
    PermissionDenied(String),

    #[error("sign in required: {0}")]
    AuthRequired(String),

    #[error("could not register subscription: {0}")]
    ServerRegistration(String),

    #[error("could not remove subscription: {0}")]
    ServerUnregistration(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("config request failed: {0}")]
    Config(String),

    /// The background worker never took control of the page. Only a reload
    /// fixes this, so it is not retried automatically.
    #[error("background worker is not controlling this page: {0}")]
    WorkerNotInControl(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl PushError {
    pub fn not_supported() -> Self {
        PushError::NotSupported(
            "this browser cannot show notifications, try another browser".to_owned(),
        )
    }

    pub fn not_configured() -> Self {
        PushError::NotConfigured("push notifications are turned off on the server".to_owned())
    }

    pub fn auth_required() -> Self {
        PushError::AuthRequired("you must be signed in to manage notifications".to_owned())
    }

    pub fn permission_denied() -> Self {
        PushError::PermissionDenied(
            "allow notifications for this site in your browser settings".to_owned(),
        )
    }

    pub fn worker_not_in_control() -> Self {
        PushError::WorkerNotInControl("reload the page and try again".to_owned())
    }

    /// Whether repeating the same user action may succeed without any
    /// outside change (browser switch, admin toggle, settings change).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PushError::ServerRegistration(_)
                | PushError::ServerUnregistration(_)
                | PushError::Network(_)
                | PushError::Config(_)
                | PushError::Server(_)
                | PushError::Platform(_)
                | PushError::Decode(_)
                | PushError::AuthRequired(_)
        )
    }

    /// Errors that hold for the rest of the session.
    pub fn is_terminal_for_session(&self) -> bool {
        matches!(
            self,
            PushError::NotSupported(_) | PushError::NotConfigured(_)
        )
    }
}

impl From<TransportError> for PushError {
    fn from(err: TransportError) -> Self {
        PushError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for PushError {
    fn from(err: serde_json::Error) -> Self {
        PushError::Decode(err.to_string())
    }
}

/// Failures of the HTTP transport itself. A non-2xx response is not a
/// transport failure.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    Url(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("response channel closed")]
    Canceled,
}

/// Failures reported by the browser platform.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<PlatformError> for PushError {
    fn from(err: PlatformError) -> Self {
        PushError::Platform(err.to_string())
    }
}
