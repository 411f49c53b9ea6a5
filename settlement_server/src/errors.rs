use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use serde_json::json;
use settlement_engine::{
    settlement_api::checkout_objects::CartValidationError,
    traits::GatewayError,
    CheckoutError,
    ErrorKind,
    EscrowError,
    FundReleaseError,
    PaymentVerificationError,
    WalletError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Administrator credentials are missing or invalid")]
    Unauthorized,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The webhook signature is missing or invalid")]
    InvalidWebhookSignature,
    #[error("The cart failed validation with {} error(s)", .0.len())]
    InvalidCart(Vec<CartValidationError>),
    /// Any error raised by the settlement engine, classified by its [`ErrorKind`].
    #[error("{message}")]
    Settlement { kind: ErrorKind, message: String },
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    pub fn settlement<E: std::fmt::Display>(kind: ErrorKind, e: E) -> Self {
        Self::Settlement { kind, message: e.to_string() }
    }

    /// The machine-readable error code in the response body.
    pub fn code(&self) -> String {
        match self {
            Self::InitializeError(_) | Self::ConfigurationError(_) | Self::IOError(_) | Self::Unspecified(_) => {
                "internal".into()
            },
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) => "bad_request".into(),
            Self::Unauthorized | Self::InvalidWebhookSignature => "unauthorized".into(),
            Self::InsufficientPermissions(_) => "forbidden".into(),
            Self::InvalidCart(_) => ErrorKind::Validation.to_string(),
            Self::Settlement { kind, .. } => kind.to_string(),
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::InvalidCart(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Settlement { kind, .. } => match kind {
                ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvariantViolation => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut error = json!({ "code": self.code(), "message": self.to_string() });
        if let Self::InvalidCart(errors) = self {
            error["validation_errors"] = json!(errors);
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(json!({ "ok": false, "error": error }).to_string())
    }
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::InvalidCart(errors) => Self::InvalidCart(errors),
            e => Self::settlement(e.kind(), e),
        }
    }
}

impl From<PaymentVerificationError> for ServerError {
    fn from(e: PaymentVerificationError) -> Self {
        Self::settlement(e.kind(), e)
    }
}

impl From<EscrowError> for ServerError {
    fn from(e: EscrowError) -> Self {
        if e.kind() == ErrorKind::InvariantViolation {
            error!("💻️ Escrow invariant violated: {e}");
        }
        Self::settlement(e.kind(), e)
    }
}

impl From<FundReleaseError> for ServerError {
    fn from(e: FundReleaseError) -> Self {
        if e.kind() == ErrorKind::InvariantViolation {
            error!("💻️ Fund release invariant violated: {e}");
        }
        Self::settlement(e.kind(), e)
    }
}

impl From<WalletError> for ServerError {
    fn from(e: WalletError) -> Self {
        Self::settlement(e.kind(), e)
    }
}

impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        Self::settlement(e.kind(), e)
    }
}
