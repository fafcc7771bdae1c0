//! Upload validation and staging.
//!
//! Validation is all-or-nothing: any violation rejects the whole batch
//! before a single document row is created. Detection runs on magic bytes,
//! never file extensions — extensions can be wrong.

use std::path::{Path, PathBuf};

use base64::Engine;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::PipelineConfig;

use super::BatchError;

/// One file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A file that passed batch validation.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub filename: String,
    pub mime_type: &'static str,
    pub content_hash: String,
    pub bytes: Vec<u8>,
}

/// Detect an accepted MIME type from magic bytes.
/// Accepted upload formats: PDF, JPEG, PNG, TIFF.
pub fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 5 && &bytes[0..5] == b"%PDF-" {
        Some("application/pdf")
    } else if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        Some("image/jpeg")
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        Some("image/png")
    } else if bytes.len() >= 4
        && (bytes[0..4] == [0x49, 0x49, 0x2A, 0x00] || bytes[0..4] == [0x4D, 0x4D, 0x00, 0x2A])
    {
        Some("image/tiff")
    } else {
        None
    }
}

/// Sanitize a filename — strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}

/// SHA-256 content hash for upload dedup and audit.
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Validate an entire submission. Errors name the violated constraint and
/// the offending file.
pub fn validate_batch(
    files: &[UploadFile],
    config: &PipelineConfig,
) -> Result<Vec<ValidatedUpload>, BatchError> {
    if files.is_empty() {
        return Err(BatchError::Validation(
            "batch must contain at least 1 file".to_string(),
        ));
    }
    if files.len() > config.max_files_per_batch {
        return Err(BatchError::Validation(format!(
            "batch of {} files exceeds the {}-file limit",
            files.len(),
            config.max_files_per_batch
        )));
    }

    let mut validated = Vec::with_capacity(files.len());
    for file in files {
        let filename = sanitize_filename(&file.filename);
        if file.bytes.len() as u64 > config.max_file_bytes {
            return Err(BatchError::Validation(format!(
                "file {filename:?} is {} bytes, over the {} MB per-file cap",
                file.bytes.len(),
                config.max_file_bytes / (1024 * 1024)
            )));
        }
        let mime_type = detect_mime(&file.bytes).ok_or_else(|| {
            BatchError::Validation(format!(
                "file {filename:?} is not an accepted type (PDF, JPEG, PNG, TIFF)"
            ))
        })?;
        validated.push(ValidatedUpload {
            content_hash: content_hash(&file.bytes),
            filename,
            mime_type,
            bytes: file.bytes.clone(),
        });
    }
    Ok(validated)
}

/// Write a validated file into document storage, named by document id.
pub fn stage_file(
    storage_dir: &Path,
    document_id: &Uuid,
    filename: &str,
    bytes: &[u8],
) -> Result<PathBuf, BatchError> {
    std::fs::create_dir_all(storage_dir)
        .map_err(|e| BatchError::Storage(format!("create storage dir: {e}")))?;
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let path = storage_dir.join(format!("{document_id}.{extension}"));
    std::fs::write(&path, bytes).map_err(|e| BatchError::Storage(format!("stage file: {e}")))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_file(name: &str) -> UploadFile {
        UploadFile {
            filename: name.to_string(),
            bytes: b"%PDF-1.4 minimal".to_vec(),
        }
    }

    #[test]
    fn detects_accepted_types_from_magic_bytes() {
        assert_eq!(detect_mime(b"%PDF-1.7 x"), Some("application/pdf"));
        assert_eq!(detect_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(
            detect_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            Some("image/png")
        );
        assert_eq!(detect_mime(&[0x49, 0x49, 0x2A, 0x00]), Some("image/tiff"));
        assert_eq!(detect_mime(&[0x4D, 0x4D, 0x00, 0x2A]), Some("image/tiff"));
        assert_eq!(detect_mime(b"MZ\x90\x00"), None);
    }

    #[test]
    fn wrong_extension_judged_by_content() {
        // JPEG bytes with a .pdf name still validate as JPEG
        let file = UploadFile {
            filename: "misleading.pdf".to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00],
        };
        let validated = validate_batch(&[file], &PipelineConfig::default()).unwrap();
        assert_eq!(validated[0].mime_type, "image/jpeg");
    }

    #[test]
    fn empty_batch_rejected() {
        let result = validate_batch(&[], &PipelineConfig::default());
        assert!(matches!(result, Err(BatchError::Validation(_))));
    }

    #[test]
    fn oversize_batch_rejected() {
        let files: Vec<UploadFile> = (0..51).map(|i| pdf_file(&format!("f{i}.pdf"))).collect();
        let err = validate_batch(&files, &PipelineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("50-file limit"));
    }

    #[test]
    fn one_oversize_file_rejects_whole_batch() {
        let mut config = PipelineConfig::default();
        config.max_file_bytes = 32;
        let files = vec![
            pdf_file("ok.pdf"),
            UploadFile {
                filename: "big.pdf".to_string(),
                bytes: b"%PDF-1.4 ".iter().cycle().take(64).copied().collect(),
            },
            pdf_file("also-ok.pdf"),
        ];
        let err = validate_batch(&files, &config).unwrap_err();
        assert!(err.to_string().contains("big.pdf"));
    }

    #[test]
    fn unsupported_type_rejects_whole_batch() {
        let files = vec![
            pdf_file("ok.pdf"),
            UploadFile {
                filename: "virus.exe".to_string(),
                bytes: vec![0x4D, 0x5A, 0x90, 0x00],
            },
        ];
        let err = validate_batch(&files, &PipelineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not an accepted type"));
    }

    #[test]
    fn sanitize_path_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("normal_file.pdf"), "normal_file.pdf");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[test]
    fn content_hash_deterministic() {
        let a = content_hash(b"same bytes");
        let b = content_hash(b"same bytes");
        let c = content_hash(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn stage_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let path = stage_file(dir.path(), &id, "scan.pdf", b"%PDF-1.4").unwrap();
        assert!(path.ends_with(format!("{id}.pdf")));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
    }
}
