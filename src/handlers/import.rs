//! CSV import handler

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::store::RecordStore;
use crate::services::import::import_csv_data;
use crate::types::{
    ErrorResponse, ImportCsvRequest, ImportCsvResponse, ImportErrorKind, ImportOptions, ImportRowError,
    Request, RowRef, SuccessResponse,
};

/// Upload checks done before any row is parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    Missing,
    NotCsv,
    TooLarge { size: usize, max: usize },
}

impl UploadRejection {
    pub fn code(&self) -> &'static str {
        match self {
            UploadRejection::TooLarge { .. } => "PAYLOAD_TOO_LARGE",
            _ => "INVALID_REQUEST",
        }
    }

    pub fn message(&self) -> String {
        match self {
            UploadRejection::Missing => "No se proporcionó ningún archivo CSV".to_string(),
            UploadRejection::NotCsv => "Solo se permiten archivos CSV".to_string(),
            UploadRejection::TooLarge { size, max } => {
                format!("El archivo pesa {} bytes, el máximo es {} bytes", size, max)
            }
        }
    }
}

pub fn validate_upload(request: &ImportCsvRequest, max_bytes: usize) -> Result<(), UploadRejection> {
    if request.csv_content.trim().is_empty() {
        return Err(UploadRejection::Missing);
    }
    if !request.filename.to_lowercase().ends_with(".csv") {
        return Err(UploadRejection::NotCsv);
    }
    let size = request.csv_content.len();
    if size > max_bytes {
        return Err(UploadRejection::TooLarge { size, max: max_bytes });
    }
    Ok(())
}

/// Handle import.csv messages
pub async fn handle_import_csv(
    client: Client,
    mut subscriber: Subscriber,
    store: Arc<dyn RecordStore>,
    options: ImportOptions,
    max_bytes: usize,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.csv message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ImportCsvRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        if let Err(rejection) = validate_upload(&request.payload, max_bytes) {
            warn!("Rejected upload {}: {}", request.payload.filename, rejection.message());
            let error = ErrorResponse::new(request.id, rejection.code(), rejection.message());
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        let ImportCsvRequest { filename, csv_content } = request.payload;
        let size = csv_content.len();
        info!("Processing file: {} ({} bytes)", filename, size);

        match import_csv_data(store.as_ref(), csv_content.as_bytes(), &options).await {
            Ok(result) => {
                let response = SuccessResponse::new(request.id, ImportCsvResponse { filename, size, result });
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                error!("Failed to parse {}: {}", filename, e);
                let detail = ImportRowError {
                    row: RowRef::General,
                    kind: ImportErrorKind::Parse,
                    error: e.to_string(),
                    data: None,
                };
                let error = ErrorResponse::new(request.id, "PARSE_ERROR", e.to_string())
                    .with_details(serde_json::to_value(&detail)?);
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
