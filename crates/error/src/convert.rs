use crate::{ErrorCode, ErrorContext, QuarryError};

impl From<std::io::Error> for QuarryError {
    fn from(err: std::io::Error) -> Self {
        QuarryError::new(ErrorCode::Internal, err.to_string())
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<serde_yaml::Error> for QuarryError {
    fn from(err: serde_yaml::Error) -> Self {
        let line = err.location().map(|l| l.line());
        let mut error = QuarryError::new(ErrorCode::InvalidConfiguration, err.to_string());
        if line.is_some() {
            let mut data = std::collections::HashMap::new();
            data.insert("line".to_string(), serde_json::json!(line));
            error = error.with_context(ErrorContext::Generic { data });
        }
        error
    }
}
