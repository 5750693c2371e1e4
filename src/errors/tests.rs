use super::*;

#[test]
fn config_error_display() {
    let err = UniboxError::Config("bad value".into());
    assert_eq!(err.to_string(), "Configuration error: bad value");
}

#[test]
fn auth_error_display() {
    let err = UniboxError::Auth("token expired".into());
    assert_eq!(err.to_string(), "Authentication failed: token expired");
}

#[test]
fn malformed_payload_display() {
    let err = UniboxError::MalformedPayload("missing entry array".into());
    assert_eq!(err.to_string(), "Malformed payload: missing entry array");
}

#[test]
fn provider_error_respects_retryable_flag() {
    let transient = UniboxError::Provider {
        message: "503 from upstream".into(),
        retryable: true,
    };
    assert!(transient.is_retryable());

    let permanent = UniboxError::Provider {
        message: "unknown recipient".into(),
        retryable: false,
    };
    assert!(!permanent.is_retryable());
}

#[test]
fn auth_and_config_are_not_retryable() {
    assert!(!UniboxError::Auth("bad token".into()).is_retryable());
    assert!(!UniboxError::Config("missing field".into()).is_retryable());
    assert!(!UniboxError::MalformedPayload("not json".into()).is_retryable());
}

#[test]
fn internal_errors_are_retryable() {
    let err = UniboxError::Internal(anyhow::anyhow!("transient io"));
    assert!(err.is_retryable());
}

#[test]
fn internal_from_anyhow_preserves_message() {
    let err: UniboxError = anyhow::anyhow!("disk full").into();
    assert_eq!(err.to_string(), "disk full");
}
