//! Protocol error objects.
//!
//! The wire format carries errors as `{ code, message }` objects with the
//! numeric codes fixed by the protocol. [`ErrorCode`] keeps the named codes
//! and falls back to [`ErrorCode::Other`] for numbers it does not know, so
//! decoding never fails on a foreign code.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{borrow::Cow, fmt};

/// A protocol-level error, sent in wallet responses and `connect_error`
/// events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct WalletError {
    pub code: ErrorCode,
    pub message: Cow<'static, str>,
}

impl WalletError {
    /// Creates a new error with the code's canonical message.
    pub const fn new(code: ErrorCode) -> Self {
        Self { message: Cow::Borrowed(code.message()), code }
    }

    pub fn bad_request<M: Into<String>>(message: M) -> Self {
        Self { code: ErrorCode::BadRequest, message: Cow::Owned(message.into()) }
    }

    pub const fn user_declined() -> Self {
        Self::new(ErrorCode::UserDeclined)
    }

    /// A decline carrying a reason, for rejections the wallet itself makes.
    pub fn declined<M: Into<String>>(message: M) -> Self {
        Self { code: ErrorCode::UserDeclined, message: Cow::Owned(message.into()) }
    }

    pub const fn unknown_app() -> Self {
        Self::new(ErrorCode::UnknownApp)
    }

    pub const fn manifest_not_found() -> Self {
        Self::new(ErrorCode::ManifestNotFound)
    }

    pub const fn manifest_content_error() -> Self {
        Self::new(ErrorCode::ManifestContentError)
    }

    pub fn method_not_supported<M: Into<String>>(message: M) -> Self {
        Self { code: ErrorCode::MethodNotSupported, message: Cow::Owned(message.into()) }
    }

    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self { code: ErrorCode::UnknownError, message: Cow::Owned(message.into()) }
    }
}

/// Numeric error codes defined by the connection protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `0`
    UnknownError,
    /// `1`
    BadRequest,
    /// `2`
    ManifestNotFound,
    /// `3`
    ManifestContentError,
    /// `100`
    UnknownApp,
    /// `300`
    UserDeclined,
    /// `400`
    MethodNotSupported,
    /// Any code this implementation does not know.
    Other(i64),
}

impl ErrorCode {
    /// The numeric wire form.
    pub const fn code(&self) -> i64 {
        match self {
            Self::UnknownError => 0,
            Self::BadRequest => 1,
            Self::ManifestNotFound => 2,
            Self::ManifestContentError => 3,
            Self::UnknownApp => 100,
            Self::UserDeclined => 300,
            Self::MethodNotSupported => 400,
            Self::Other(code) => *code,
        }
    }

    /// The canonical human-readable message for the code.
    pub const fn message(&self) -> &'static str {
        match self {
            Self::UnknownError => "unknown error",
            Self::BadRequest => "bad request",
            Self::ManifestNotFound => "app manifest not found",
            Self::ManifestContentError => "app manifest content error",
            Self::UnknownApp => "unknown app",
            Self::UserDeclined => "user declined the request",
            Self::MethodNotSupported => "method is not supported",
            Self::Other(_) => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.code().fmt(f)
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::UnknownError,
            1 => Self::BadRequest,
            2 => Self::ManifestNotFound,
            3 => Self::ManifestContentError,
            100 => Self::UnknownApp,
            300 => Self::UserDeclined,
            400 => Self::MethodNotSupported,
            other => Self::Other(other),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [0, 1, 2, 3, 100, 300, 400] {
            let parsed = ErrorCode::from(code);
            assert_eq!(parsed.code(), code);
            assert!(!matches!(parsed, ErrorCode::Other(_)));
        }
        assert_eq!(ErrorCode::from(12345), ErrorCode::Other(12345));
    }

    #[test]
    fn wire_shape() {
        let err = WalletError::user_declined();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "code": 300, "message": "user declined the request" })
        );
        let back: WalletError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn foreign_code_decodes() {
        let err: WalletError =
            serde_json::from_str(r#"{"code":9000,"message":"from the future"}"#).unwrap();
        assert_eq!(err.code, ErrorCode::Other(9000));
        assert_eq!(err.message, "from the future");
    }
}
