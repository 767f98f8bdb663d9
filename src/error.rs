use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `subrelay`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; glue code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Store ────────────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),

    // ── Agent protocol ───────────────────────────────────────────────────
    #[error("auth: {0}")]
    Auth(#[from] crate::security::AuthRejection),

    // ── Job state machine ────────────────────────────────────────────────
    #[error("transition: {0}")]
    Transition(#[from] TransitionError),

    // ── Settlement ───────────────────────────────────────────────────────
    #[error("settlement: {0}")]
    Settlement(#[from] SettlementError),

    // ── Payments ─────────────────────────────────────────────────────────
    #[error("payment: {0}")]
    Payment(#[from] PaymentError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Job state machine errors ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("transition {from} -> {to} is not allowed")]
    NotAllowed { from: String, to: String },

    #[error("job {job_id} already carries invoice {invoice_id}")]
    AlreadyInvoiced { job_id: String, invoice_id: String },

    #[error("unknown job status '{0}'")]
    UnknownStatus(String),

    #[error("status override requires a non-empty reason")]
    MissingReason,

    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
}

impl TransitionError {
    /// HTTP status a handler should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::NotAllowed { .. } | Self::AlreadyInvoiced { .. } => 409,
            Self::UnknownStatus(_) | Self::MissingReason => 400,
            Self::Store(_) => 500,
        }
    }
}

// ─── Settlement errors ───────────────────────────────────────────────────────

/// Closed set of settlement failures surfaced to callers.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {0} is already paid")]
    AlreadyPaid(String),

    #[error("job {job_id} is not in a payable state: {reason}")]
    NotPayable { job_id: String, reason: String },

    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
}

impl SettlementError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::AlreadyPaid(_) => 409,
            Self::NotPayable { .. } => 400,
            Self::Store(_) => 500,
        }
    }

    /// Whether repeating the same settlement call can succeed or is a safe no-op.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AlreadyPaid(_) | Self::Store(_))
    }
}

// ─── Payment provider errors ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invoice provider not configured")]
    NotConfigured,

    #[error("invoice provider request failed: {0}")]
    Request(String),

    #[error("invoice provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, RelayError>;
