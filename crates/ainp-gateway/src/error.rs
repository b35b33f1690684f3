//! # HTTP Error Mapping
//!
//! Every internal error maps to exactly one status code and a stable
//! machine-readable code in the response body. Retryable rejections carry
//! `Retry-After`; payment challenges carry `WWW-Authenticate` and a
//! `Link` to the payment request.

use ainp_crypto::CryptoError;
use ainp_discovery::DiscoveryError;
use ainp_guard::GuardError;
use ainp_ledger::{LedgerError, PaymentError};
use ainp_mail::MailError;
use ainp_negotiation::NegotiationError;
use ainp_pou::PouError;
use ainp_routing::RouteError;
use ainp_types::ErrorBody;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// An API error ready to render.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
    pub headers: Vec<(HeaderName, String)>,
}

impl ApiError {
    /// Plain error without extra headers.
    #[must_use]
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(code, message),
            headers: Vec::new(),
        }
    }

    /// Attach a response header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// 401 for requests without a valid DID header.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "missing or malformed x-ainp-did header",
        )
    }

    /// 402 payment challenge referencing a payment request.
    #[must_use]
    pub fn payment_required(request_id: &str, method: &str, payment_url: &str) -> Self {
        Self::new(
            StatusCode::PAYMENT_REQUIRED,
            "PAYMENT_REQUIRED",
            "postage required; settle the referenced payment request and retry",
        )
        .with_header(
            header::WWW_AUTHENTICATE,
            format!("AINP-Pay realm=\"ainp\", request_id=\"{request_id}\", method=\"{method}\""),
        )
        .with_header(
            header::LINK,
            format!("<{payment_url}>; rel=\"payment\""),
        )
    }

    /// 400 for malformed request bodies.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 404 with a specific code.
    #[must_use]
    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = %self.body.error, message = %self.body.message, "Request failed");
        }
        let mut response = (self.status, Json(self.body)).into_response();
        for (name, value) in self.headers {
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        let code = match err {
            CryptoError::MalformedDid(_) => "MALFORMED_DID",
            CryptoError::UnsupportedDid(_) => "UNSUPPORTED_DID",
            CryptoError::InvalidPublicKey => "INVALID_PUBLIC_KEY",
            CryptoError::SignatureMissing => "SIGNATURE_MISSING",
            CryptoError::BadSignature => "BAD_SIGNATURE",
        };
        Self::new(StatusCode::UNAUTHORIZED, code, err.to_string())
    }
}

impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        match &err {
            GuardError::Duplicate { .. } => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE", err.to_string())
            }
            GuardError::DuplicateContent { .. } => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE_CONTENT", err.to_string())
            }
            GuardError::ExpiredOrFuture { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "EXPIRED_OR_FUTURE",
                err.to_string(),
            ),
            GuardError::TooEarly { retry_after_secs } => Self::new(
                StatusCode::TOO_EARLY,
                "TOO_EARLY",
                err.to_string(),
            )
            .with_header(header::RETRY_AFTER, retry_after_secs.to_string()),
            // callers that can mint a payment request use
            // ApiError::payment_required instead
            GuardError::PaymentRequired { .. } => Self::new(
                StatusCode::PAYMENT_REQUIRED,
                "PAYMENT_REQUIRED",
                err.to_string(),
            ),
            GuardError::RateLimited { retry_after_secs } => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                err.to_string(),
            )
            .with_header(header::RETRY_AFTER, retry_after_secs.to_string()),
        }
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Signature(inner) => inner.into(),
            RouteError::Guard(inner) => inner.into(),
            other => {
                let (status, code) = match &other {
                    RouteError::Unroutable => (StatusCode::BAD_REQUEST, "UNROUTABLE"),
                    RouteError::UnsupportedVersion(_) => {
                        (StatusCode::BAD_REQUEST, "UNSUPPORTED_VERSION")
                    }
                    RouteError::RecipientBlocked => (StatusCode::FORBIDDEN, "BLOCKED"),
                    RouteError::UpstreamDown => {
                        (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_DOWN")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
                };
                Self::new(status, code, other.to_string())
            }
        }
    }
}

impl From<NegotiationError> for ApiError {
    fn from(err: NegotiationError) -> Self {
        match &err {
            NegotiationError::NotFound(_) => Self::not_found("NOT_FOUND", err.to_string()),
            NegotiationError::InvalidStateTransition { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "INVALID_STATE_TRANSITION",
                err.to_string(),
            ),
            NegotiationError::Expired(_) => {
                Self::new(StatusCode::GONE, "EXPIRED", err.to_string())
            }
            NegotiationError::MaxRounds(_) => {
                Self::new(StatusCode::CONFLICT, "MAX_ROUNDS", err.to_string())
            }
            NegotiationError::NotAParticipant(_) => {
                Self::new(StatusCode::FORBIDDEN, "NOT_A_PARTICIPANT", err.to_string())
            }
            NegotiationError::SameActorTwice(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "SAME_PARTY_TWICE",
                err.to_string(),
            ),
            NegotiationError::SameParty => {
                Self::new(StatusCode::BAD_REQUEST, "SAME_PARTY", err.to_string())
            }
            NegotiationError::InvalidSplit => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_SPLIT", err.to_string())
            }
            NegotiationError::AlreadySettled => {
                Self::new(StatusCode::CONFLICT, "ALREADY_SETTLED", err.to_string())
            }
            NegotiationError::Ledger(inner) => inner.clone().into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::InsufficientBalance { .. } => Self::new(
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_BALANCE",
                err.to_string(),
            ),
            LedgerError::AccountNotFound(_) => Self::not_found("NOT_FOUND", err.to_string()),
            LedgerError::AccountExists(_) | LedgerError::DuplicateTransaction { .. } => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE", err.to_string())
            }
            LedgerError::InsufficientReserved { .. }
            | LedgerError::SpendExceedsRelease { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", err.to_string())
            }
            LedgerError::Overflow => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                err.to_string(),
            ),
        }
    }
}

impl From<PouError> for ApiError {
    fn from(err: PouError) -> Self {
        match &err {
            PouError::ReceiptNotFound(_) => Self::not_found("NOT_FOUND", err.to_string()),
            PouError::UnauthorizedAttestation { .. } => Self::new(
                StatusCode::FORBIDDEN,
                "UNAUTHORIZED_ATTESTATION",
                err.to_string(),
            ),
            PouError::DuplicateAttestation => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE", err.to_string())
            }
            PouError::ReceiptClosed { .. } => {
                Self::new(StatusCode::CONFLICT, "RECEIPT_CLOSED", err.to_string())
            }
            PouError::OutOfRange { .. } | PouError::InvalidProof(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", err.to_string())
            }
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match &err {
            PaymentError::NotFound(_) => Self::not_found("NOT_FOUND", err.to_string()),
            PaymentError::ZeroAmount => Self::bad_request(err.to_string()),
            PaymentError::NotOpen { .. } | PaymentError::AlreadySettled(_) => {
                Self::new(StatusCode::CONFLICT, "NOT_OPEN", err.to_string())
            }
            PaymentError::NotOwner { .. } => {
                Self::new(StatusCode::FORBIDDEN, "NOT_OWNER", err.to_string())
            }
            PaymentError::Ledger(inner) => inner.clone().into(),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        match &err {
            MailError::MessageNotFound(_) | MailError::ThreadNotFound(_) => {
                Self::not_found("NOT_FOUND", err.to_string())
            }
            MailError::NotAParticipant(_) => {
                Self::new(StatusCode::FORBIDDEN, "NOT_A_PARTICIPANT", err.to_string())
            }
            MailError::DuplicateEnvelope(_) => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE", err.to_string())
            }
            MailError::NotMailPayload => Self::bad_request(err.to_string()),
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        match &err {
            DiscoveryError::NoCapabilities => Self::bad_request(err.to_string()),
            DiscoveryError::AgentNotFound(_) => Self::not_found("NOT_FOUND", err.to_string()),
            DiscoveryError::Embedding(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "EMBEDDING_UNAVAILABLE",
                err.to_string(),
            ),
        }
    }
}
