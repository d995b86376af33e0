//! Validation of uploaded markdown files.

use super::types::UploadError;

/// Default upload limit: 2 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

const BOM: &str = "\u{feff}";

/// Check the file name and size of an upload.
///
/// The extension is checked before the size, so an oversized `.txt` file reports the type error.
pub fn validate_upload(filename: &str, size: usize, max_bytes: usize) -> Result<(), UploadError> {
    if !filename.to_lowercase().ends_with(".md") {
        return Err(UploadError::UnsupportedType);
    }
    if size > max_bytes {
        return Err(UploadError::TooLarge {
            limit: format_limit(max_bytes),
        });
    }
    Ok(())
}

/// Decode upload bytes as UTF-8 text, dropping a leading byte-order mark.
pub fn decode_markdown(bytes: &[u8]) -> Result<String, UploadError> {
    let text = std::str::from_utf8(bytes).map_err(|_| UploadError::InvalidEncoding)?;
    Ok(text.strip_prefix(BOM).unwrap_or(text).to_string())
}

const MIB: usize = 1024 * 1024;

/// Render a byte limit for error messages: megabytes with at most one decimal, bytes under 1 MiB.
fn format_limit(max_bytes: usize) -> String {
    if max_bytes < MIB {
        return format!("{max_bytes} bytes");
    }
    let tenths = (max_bytes * 10) / MIB;
    if tenths % 10 == 0 {
        format!("{}MB", tenths / 10)
    } else {
        format!("{}.{}MB", tenths / 10, tenths % 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_markdown_with_any_case() {
        assert!(validate_upload("notes.md", 10, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(validate_upload("NOTES.MD", 10, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn rejects_other_extensions_before_size() {
        let error = validate_upload("notes.txt", usize::MAX, DEFAULT_MAX_UPLOAD_BYTES).unwrap_err();
        assert!(matches!(error, UploadError::UnsupportedType));
        assert_eq!(error.to_string(), "Only Markdown (.md) files are supported");
        assert!(validate_upload("md", 1, DEFAULT_MAX_UPLOAD_BYTES).is_err());
    }

    #[test]
    fn limit_is_inclusive() {
        assert!(validate_upload("a.md", DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        let error =
            validate_upload("a.md", DEFAULT_MAX_UPLOAD_BYTES + 1, DEFAULT_MAX_UPLOAD_BYTES)
                .unwrap_err();
        assert_eq!(error.to_string(), "File size must be under 2MB");
    }

    #[test]
    fn limit_renders_fractions_and_small_sizes() {
        assert_eq!(format_limit(DEFAULT_MAX_UPLOAD_BYTES), "2MB");
        assert_eq!(format_limit(7 * MIB / 2), "3.5MB");
        assert_eq!(format_limit(16), "16 bytes");
        assert_eq!(format_limit(512 * 1024), "524288 bytes");

        let error = validate_upload("a.md", 17, 16).unwrap_err();
        assert_eq!(error.to_string(), "File size must be under 16 bytes");
    }

    #[test]
    fn decode_strips_bom_and_rejects_binary() {
        let text = decode_markdown("\u{feff}# Title".as_bytes()).expect("decode");
        assert_eq!(text, "# Title");
        assert!(matches!(
            decode_markdown(&[0xff, 0xfe, 0x00]),
            Err(UploadError::InvalidEncoding)
        ));
    }
}
