use quarry_common::models::DatasetKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Malformed {axis} configuration: {source}")]
    MalformedAxis {
        axis: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier {
        name: String,
        reason: String,
        axis: Option<&'static str>,
    },

    #[error("Dataset '{dataset_id}' ({kind}) has no {missing}")]
    IncompleteDataset {
        dataset_id: String,
        kind: DatasetKind,
        missing: &'static str,
    },
}

impl CompileError {
    pub fn to_quarry_error(self) -> quarry_error::QuarryError {
        use quarry_error::{ErrorCode, ErrorContext, QuarryError};

        match self {
            CompileError::MalformedAxis { axis, source } => QuarryError::config(
                ErrorCode::InvalidFieldSpec,
                format!("Malformed {} configuration: {}", axis, source),
            )
            .with_context(ErrorContext::FieldSpec {
                axis: Some(axis.to_string()),
                field: None,
            })
            .with_hint("The stored axis configuration must be a JSON object with a 'fields' array"),
            CompileError::InvalidIdentifier { name, reason, axis } => QuarryError::config(
                ErrorCode::InvalidIdentifier,
                format!("Invalid identifier '{}': {}", name, reason),
            )
            .with_context(ErrorContext::FieldSpec {
                axis: axis.map(str::to_string),
                field: Some(name),
            })
            .with_hint("Field names must not contain quotes, semicolons, backticks, backslashes or NUL"),
            CompileError::IncompleteDataset {
                dataset_id,
                kind,
                missing,
            } => QuarryError::config(
                ErrorCode::InvalidDataset,
                format!("Dataset '{}' ({}) has no {}", dataset_id, kind, missing),
            )
            .with_context(ErrorContext::Dataset {
                dataset_id,
                kind: Some(kind.to_string()),
            })
            .with_hint("Fix the dataset definition in the dataset store"),
        }
    }
}

impl From<CompileError> for quarry_error::QuarryError {
    fn from(err: CompileError) -> Self {
        err.to_quarry_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_error::{ErrorCode, ErrorKind};

    #[test]
    fn test_all_variants_are_config_errors() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let errors = vec![
            CompileError::MalformedAxis {
                axis: "yAxis",
                source,
            },
            CompileError::InvalidIdentifier {
                name: "a;b".into(),
                reason: "forbidden characters".into(),
                axis: None,
            },
            CompileError::IncompleteDataset {
                dataset_id: "ds".into(),
                kind: DatasetKind::RawSql,
                missing: "SQL text",
            },
        ];

        let codes: Vec<_> = errors
            .into_iter()
            .map(|e| {
                let err = e.to_quarry_error();
                assert_eq!(err.kind(), ErrorKind::Config);
                assert!(err.hint.is_some());
                err.code
            })
            .collect();

        assert_eq!(
            codes,
            vec![
                ErrorCode::InvalidFieldSpec,
                ErrorCode::InvalidIdentifier,
                ErrorCode::InvalidDataset
            ]
        );
    }
}
