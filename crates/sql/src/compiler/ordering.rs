use super::CompilerOptions;
use crate::field_spec::FieldSpec;

pub(crate) fn order_by(spec: &FieldSpec) -> Option<String> {
    spec.sort_field()
        .map(|(name, direction)| format!("ORDER BY {} {}", name, direction.as_sql()))
}

/// Caller limit (clamped to `max_limit`) with optional offset, or the default cap.
pub(crate) fn limit_clause(options: &CompilerOptions, limit: Option<u64>, offset: Option<u64>) -> String {
    match limit.filter(|l| *l > 0) {
        Some(requested) => {
            let effective = options
                .max_limit
                .map_or(requested, |max| requested.min(max));
            match offset.filter(|o| *o > 0) {
                Some(offset) => format!("LIMIT {} OFFSET {}", effective, offset),
                None => format!("LIMIT {}", effective),
            }
        }
        None => format!("LIMIT {}", options.default_limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clause() {
        let options = CompilerOptions::default();
        assert_eq!(limit_clause(&options, None, None), "LIMIT 1000");
        assert_eq!(limit_clause(&options, Some(0), Some(20)), "LIMIT 1000");
        assert_eq!(limit_clause(&options, None, Some(20)), "LIMIT 1000");
        assert_eq!(limit_clause(&options, Some(50), None), "LIMIT 50");
        assert_eq!(limit_clause(&options, Some(50), Some(0)), "LIMIT 50");
        assert_eq!(limit_clause(&options, Some(50), Some(100)), "LIMIT 50 OFFSET 100");
    }

    #[test]
    fn test_max_limit_clamps() {
        let options = CompilerOptions {
            max_limit: Some(5000),
            ..Default::default()
        };
        assert_eq!(limit_clause(&options, Some(1_000_000), None), "LIMIT 5000");
        assert_eq!(limit_clause(&options, Some(10), None), "LIMIT 10");
    }
}
