//! Unit tests for `AppError` display format and conversions.

use simbridge::AppError;

#[test]
fn display_is_prefixed_by_category() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Process("bad".into()), "process: bad"),
        (AppError::Control("bad".into()), "control: bad"),
        (AppError::Streaming("bad".into()), "streaming: bad"),
        (AppError::Io("bad".into()), "io: bad"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn error_message_has_no_trailing_period() {
    let err = AppError::Streaming("not connected to streaming service".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err = AppError::from(io);
    assert_eq!(err.to_string(), "io: gone");
}

#[test]
fn json_error_converts_to_streaming_variant() {
    let json = serde_json::from_str::<serde_json::Value>("{").expect_err("truncated json");
    let err = AppError::from(json);
    assert!(err.to_string().starts_with("streaming: malformed json:"));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let toml = toml::from_str::<toml::Value>("a = [").expect_err("truncated toml");
    let err = AppError::from(toml);
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
    assert_error(&AppError::Io("x".into()));
}
