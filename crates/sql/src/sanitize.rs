use crate::error::CompileError;

pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Rejects names that could break out of an identifier position.
///
/// Names are otherwise emitted verbatim, so expressions such as `*` or
/// `schema.table` pass.
pub fn validate_identifier(name: &str, axis: Option<&'static str>) -> Result<(), CompileError> {
    let reason = if name.trim().is_empty() {
        "empty".to_string()
    } else if name.len() > MAX_IDENTIFIER_LEN {
        format!("too long: {}", name.len())
    } else if name.contains('"')
        || name.contains('\x00')
        || name.contains(';')
        || name.contains('`')
        || name.contains('\\')
    {
        "forbidden characters".to_string()
    } else {
        return Ok(());
    };

    Err(CompileError::InvalidIdentifier {
        name: name.to_string(),
        reason,
        axis,
    })
}
