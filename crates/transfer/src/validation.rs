use crate::TransferError;

/// Validates a filename before it becomes part of an upload URL.
///
/// The name is appended to the endpoint as a single path segment, so it
/// must not be able to name another resource on the server.
///
/// Rejects:
/// - Empty names
/// - `.` and `..`
/// - Path separators (`/` or `\`)
/// - Control characters
pub fn validate_filename(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidFilename("empty filename".into()));
    }

    if name == "." || name == ".." {
        return Err(TransferError::InvalidFilename(format!(
            "relative path component not allowed: {name}"
        )));
    }

    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidFilename(format!(
            "path separator not allowed: {name}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(TransferError::InvalidFilename(format!(
            "control character not allowed: {name:?}"
        )));
    }

    Ok(())
}
