use crate::services::error::{ConvertError, ConvertResult};
use std::path::Path;

/// Longest staged filename component we keep, in bytes.
pub const MAX_FILENAME_LEN: usize = 200;

/// Validates an upload's size against the configured maximum
pub fn validate_file_size(name: &str, size: u64, max_size: usize) -> ConvertResult<()> {
    if size > max_size as u64 {
        return Err(ConvertError::PayloadTooLarge(format!(
            "'{}' exceeds the maximum allowed {} bytes ({} MB)",
            name,
            max_size,
            max_size / 1024 / 1024
        )));
    }
    Ok(())
}

/// Sanitizes an uploaded filename so it can be joined onto a staging path.
/// Path components are stripped and reserved characters replaced; the
/// extension is preserved.
pub fn sanitize_filename(filename: &str) -> ConvertResult<String> {
    // Browsers on Windows may send the full client path
    let last = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(ConvertError::Upload("Filename cannot be empty".to_string()));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // A leading dot would make the staged file hidden and confuse extension parsing
    let sanitized = sanitized.trim_start_matches('.').to_string();
    if sanitized.is_empty() {
        return Err(ConvertError::Upload(format!(
            "Filename '{}' has no usable characters",
            filename
        )));
    }

    Ok(truncate_keep_extension(&sanitized, MAX_FILENAME_LEN))
}

/// Lowercased extension of a filename, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn truncate_keep_extension(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() < max_len / 2)
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let mut end = max_len - ext.len();
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &name[..end], ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size("a.png", 1024, 2048).is_ok());
        assert!(validate_file_size("a.png", 2048, 2048).is_ok());
        let err = validate_file_size("a.png", 4096, 2048).unwrap_err();
        assert!(matches!(err, ConvertError::PayloadTooLarge(_)));
    }

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\report.docx").unwrap(),
            "report.docx"
        );
    }

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("a:b*c?.png").unwrap(), "a_b_c_.png");
        assert_eq!(sanitize_filename(".hidden.pdf").unwrap(), "hidden.pdf");
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("dir/").is_err());
    }

    #[test]
    fn test_long_names_keep_extension() {
        let long = format!("{}.jpeg", "x".repeat(500));
        let sanitized = sanitize_filename(&long).unwrap();
        assert_eq!(sanitized.len(), MAX_FILENAME_LEN);
        assert!(sanitized.ends_with(".jpeg"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("README"), None);
    }
}
