/// Typed error taxonomy for routing and delivery operations.
/// Classifies errors as client-caused, operational, or soft (per-connection).
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChatError {
    // Client errors — reject the call, nothing persisted, nothing pushed
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no access: {0}")]
    Authorization(String),

    // Operational — fail the triggering call only, never the process
    #[error("storage unavailable: {0}")]
    Storage(String),

    // Soft — one connection's send failed; logged, triggers unregistration,
    // never fails the overall routing call
    #[error("delivery failed for connection {connection}")]
    Delivery { connection: String },
}

impl ChatError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Authorization(_))
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Delivery { .. })
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authorization(_) => "authorization",
            Self::Storage(_) => "storage",
            Self::Delivery { .. } => "delivery",
        }
    }

    /// Error code surfaced on the RPC wire.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authorization(_) => "UNAUTHORIZED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Delivery { .. } => "DELIVERY_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_classification() {
        assert!(ChatError::Validation("empty content".into()).is_client_error());
        assert!(ChatError::Authorization("not a participant".into()).is_client_error());
        assert!(!ChatError::Storage("disk full".into()).is_client_error());
        assert!(!ChatError::Delivery { connection: "conn_1".into() }.is_client_error());
    }

    #[test]
    fn only_delivery_is_soft() {
        assert!(ChatError::Delivery { connection: "conn_1".into() }.is_soft());
        assert!(!ChatError::Validation("x".into()).is_soft());
        assert!(!ChatError::Authorization("x".into()).is_soft());
        assert!(!ChatError::Storage("x".into()).is_soft());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ChatError::Validation("x".into()).error_kind(), "validation");
        assert_eq!(ChatError::Authorization("x".into()).error_kind(), "authorization");
        assert_eq!(ChatError::Storage("x".into()).error_kind(), "storage");
        assert_eq!(
            ChatError::Delivery { connection: "conn_1".into() }.error_kind(),
            "delivery"
        );
    }

    #[test]
    fn wire_codes() {
        assert_eq!(ChatError::Validation("x".into()).wire_code(), "VALIDATION_ERROR");
        assert_eq!(ChatError::Authorization("x".into()).wire_code(), "UNAUTHORIZED");
        assert_eq!(ChatError::Storage("x".into()).wire_code(), "STORAGE_ERROR");
        assert_eq!(
            ChatError::Delivery { connection: "conn_1".into() }.wire_code(),
            "DELIVERY_ERROR"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = ChatError::Validation("empty message content".into());
        assert!(err.to_string().contains("empty message content"));
    }
}
