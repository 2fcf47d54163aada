//! Multipart upload receiver
//!
//! Streams exactly one CSV file part to a temp file under the imports
//! directory and extracts the companion `projectId` field. Every failure path
//! removes the partially written temp file before the error propagates; on
//! success the caller owns the temp file and is responsible for staging or
//! deleting it.

use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::handlers::ApiError;

pub const FILE_FIELD: &str = "file";
pub const PROJECT_ID_FIELD: &str = "projectId";

/// A file successfully written to temporary storage
#[derive(Debug)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub file_name: String,
}

/// Consume a multipart request: write the first `file` part to a temp file
/// (later `file` parts are drained and discarded), read `projectId`, and
/// enforce the byte limit while streaming.
pub async fn receive_csv_upload(
    multipart: &mut Multipart,
    imports_dir: &Path,
    max_bytes: u64,
) -> Result<(UploadedFile, Uuid), ApiError> {
    let mut staged: Option<UploadedFile> = None;
    let mut project_id_raw: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                cleanup(&staged).await;
                return Err(ApiError::BadRequest(format!("Malformed multipart body: {}", e)));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            PROJECT_ID_FIELD => {
                let value = match field.text().await {
                    Ok(v) => v,
                    Err(e) => {
                        cleanup(&staged).await;
                        return Err(ApiError::BadRequest(format!(
                            "Failed to read form field \"{}\": {}",
                            PROJECT_ID_FIELD, e
                        )));
                    }
                };
                project_id_raw = Some(value);
            }
            FILE_FIELD if staged.is_none() => {
                match write_temp_file(field, imports_dir, max_bytes).await {
                    Ok(uploaded) => staged = Some(uploaded),
                    Err(e) => {
                        cleanup(&staged).await;
                        return Err(e);
                    }
                }
            }
            // Duplicate file parts and unknown fields are drained, not rejected
            _ => {
                let mut field = field;
                loop {
                    match field.chunk().await {
                        Ok(Some(_)) => continue,
                        Ok(None) => break,
                        Err(e) => {
                            cleanup(&staged).await;
                            return Err(ApiError::BadRequest(format!(
                                "Malformed multipart body: {}",
                                e
                            )));
                        }
                    }
                }
            }
        }
    }

    let uploaded = match staged {
        Some(uploaded) => uploaded,
        None => {
            return Err(ApiError::BadRequest(format!(
                "Missing form field \"{}\" (CSV file)",
                FILE_FIELD
            )));
        }
    };

    let project_id_raw = match project_id_raw {
        Some(v) => v,
        None => {
            remove_file(&uploaded.path).await;
            return Err(ApiError::BadRequest(format!(
                "Missing form field \"{}\"",
                PROJECT_ID_FIELD
            )));
        }
    };

    let project_id = match Uuid::parse_str(project_id_raw.trim()) {
        Ok(id) => id,
        Err(_) => {
            remove_file(&uploaded.path).await;
            return Err(ApiError::BadRequest(format!(
                "Form field \"{}\" must be a valid UUID",
                PROJECT_ID_FIELD
            )));
        }
    };

    Ok((uploaded, project_id))
}

/// Stream one file part to `<imports_dir>/upload-<uuid>.<ext>`, counting
/// bytes against `max_bytes`. The temp file is removed on every error.
async fn write_temp_file(
    mut field: axum::extract::multipart::Field<'_>,
    imports_dir: &Path,
    max_bytes: u64,
) -> Result<UploadedFile, ApiError> {
    let temp_name = temp_file_name(field.file_name());
    let file_name = field
        .file_name()
        .filter(|n| !n.is_empty())
        .unwrap_or(&temp_name)
        .to_string();

    fs::create_dir_all(imports_dir)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to create imports dir: {}", e)))?;

    let path = imports_dir.join(&temp_name);
    let mut file = fs::File::create(&path)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to create temp file: {}", e)))?;

    let mut written: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                remove_file(&path).await;
                return Err(ApiError::BadRequest(format!("Upload stream error: {}", e)));
            }
        };

        written += chunk.len() as u64;
        if written > max_bytes {
            remove_file(&path).await;
            return Err(ApiError::PayloadTooLarge(format!(
                "File exceeds the maximum upload size of {} bytes",
                max_bytes
            )));
        }

        if let Err(e) = file.write_all(&chunk).await {
            remove_file(&path).await;
            return Err(ApiError::Internal(anyhow::anyhow!(
                "Failed to write temp file: {}",
                e
            )));
        }
    }

    if let Err(e) = file.flush().await {
        remove_file(&path).await;
        return Err(ApiError::Internal(anyhow::anyhow!(
            "Failed to flush temp file: {}",
            e
        )));
    }

    debug!("Staged upload {} ({} bytes)", path.display(), written);
    Ok(UploadedFile { path, file_name })
}

/// Temp name preserving the original extension, defaulting to `.csv`
fn temp_file_name(original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("csv");
    format!("upload-{}.{}", Uuid::new_v4(), ext)
}

pub async fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Failed to remove temp upload {}: {}", path.display(), e);
    }
}

async fn cleanup(staged: &Option<UploadedFile>) {
    if let Some(uploaded) = staged {
        remove_file(&uploaded.path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file_name_keeps_extension() {
        let name = temp_file_name(Some("transactions.tsv"));
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".tsv"));
    }

    #[test]
    fn test_temp_file_name_defaults_to_csv() {
        assert!(temp_file_name(Some("noext")).ends_with(".csv"));
        assert!(temp_file_name(None).ends_with(".csv"));
    }
}
