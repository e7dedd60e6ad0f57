//! PDF Handlers

use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};

use crate::core::ServerState;
use crate::utils::validation::validate_filename;
use crate::utils::{ApiResponse, AppError, AppResult, ErrorCode, ok, ok_with_message};

/// Multipart field carrying the file
const FIELD_NAME: &str = "pdf";

const PDF_MAGIC: &[u8] = b"%PDF";

/// Stored PDF metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PdfInfo {
    pub filename: String,
    pub size: u64,
    /// Unix millis
    pub modified_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub filename: String,
    pub deleted: bool,
}

fn checked_path(state: &ServerState, filename: &str) -> AppResult<PathBuf> {
    validate_filename(filename).map_err(|e| {
        AppError::with_message(ErrorCode::InvalidFilename, e.0).with_detail("filename", filename)
    })?;
    Ok(state.config.pdf_dir().join(filename))
}

async fn read_info(path: &FsPath, filename: &str) -> AppResult<PdfInfo> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(AppError::not_found(format!("PDF {filename}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::not_found(format!("PDF {filename}")));
        }
        Err(e) => {
            return Err(AppError::with_message(
                ErrorCode::FileStorageFailed,
                format!("Failed to read file info: {e}"),
            ));
        }
    };

    let modified_at = meta
        .modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis());
    Ok(PdfInfo {
        filename: filename.to_string(),
        size: meta.len(),
        modified_at,
    })
}

/// POST /api/upload-pdf
pub async fn upload(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<PdfInfo>>> {
    let max_size = state.config.max_pdf_size_bytes();

    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart request: {e}")))?
    {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            AppError::with_message(ErrorCode::FileTooLarge, format!("Multipart error: {e}"))
        })?;
        upload = Some((filename, data.to_vec()));
        break;
    }

    let (filename, data) = upload.ok_or_else(|| {
        AppError::with_message(
            ErrorCode::NoFileProvided,
            format!("No '{FIELD_NAME}' field found"),
        )
    })?;
    let filename = filename.ok_or_else(|| AppError::new(ErrorCode::NoFilename))?;

    let path = checked_path(&state, &filename)?;
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(AppError::with_message(
            ErrorCode::UnsupportedFileFormat,
            format!("Only .pdf files are accepted: {filename}"),
        ));
    }
    if data.is_empty() {
        return Err(AppError::new(ErrorCode::EmptyFile));
    }
    if data.len() > max_size {
        return Err(AppError::with_message(
            ErrorCode::FileTooLarge,
            format!("File exceeds {} MB", state.config.max_pdf_size_mb),
        )
        .with_detail("size", data.len()));
    }
    if !data.starts_with(PDF_MAGIC) {
        return Err(AppError::with_message(
            ErrorCode::UnsupportedFileFormat,
            "File content is not a PDF",
        ));
    }

    // Atomic write: tmp file + rename
    let storage_err = |e: std::io::Error| {
        AppError::with_message(ErrorCode::FileStorageFailed, format!("Failed to save file: {e}"))
    };
    let dir = state.config.pdf_dir();
    tokio::fs::create_dir_all(&dir).await.map_err(storage_err)?;
    let tmp_path = dir.join(format!(".{}.tmp", shared::util::new_id()));
    tokio::fs::write(&tmp_path, &data).await.map_err(storage_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(storage_err(e));
    }

    tracing::info!(filename = %filename, size = data.len(), "PDF uploaded");
    let info = read_info(&path, &filename).await?;
    Ok(ok_with_message(info, "PDF uploaded"))
}

/// GET /api/pdf-info/{filename}
pub async fn info(
    State(state): State<ServerState>,
    Path(filename): Path<String>,
) -> AppResult<Json<ApiResponse<PdfInfo>>> {
    let path = checked_path(&state, &filename)?;
    Ok(ok(read_info(&path, &filename).await?))
}

/// DELETE /api/pdf/{filename}
pub async fn remove(
    State(state): State<ServerState>,
    Path(filename): Path<String>,
) -> AppResult<Json<ApiResponse<DeleteResponse>>> {
    let path = checked_path(&state, &filename)?;
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            tracing::info!(filename = %filename, "PDF deleted");
            Ok(ok(DeleteResponse {
                filename,
                deleted: true,
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::not_found(format!("PDF {filename}")))
        }
        Err(e) => Err(AppError::with_message(
            ErrorCode::FileStorageFailed,
            format!("Failed to delete file: {e}"),
        )),
    }
}
