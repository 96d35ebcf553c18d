//! Prediction endpoint

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use tracing::{debug, info};

use region_classifier::{PredictError, PredictionResponse, Upload};

use crate::error::ApiError;
use crate::state::SharedState;

/// POST /predict - Classify the uploaded image
///
/// A request without a multipart body is treated like one without the
/// expected file part.
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    if !state.service.is_ready() {
        return Err(PredictError::NotReady.into());
    }

    let upload = match multipart {
        Ok(mut multipart) => find_upload(&mut multipart, &state.service.config().field_name).await?,
        Err(rejection) => {
            debug!("Request is not multipart: {}", rejection);
            None
        }
    };

    let worker = state.clone();
    let response = tokio::task::spawn_blocking(move || worker.service.predict_upload(upload))
        .await
        .map_err(|e| PredictError::Processing(format!("inference task failed: {}", e)))??;

    info!("Predicted {}", response.prediction);
    Ok(Json(response))
}

/// The first part named `field_name` that carries a filename, if any
///
/// Parts with the right name but no `filename` attribute are plain form
/// values and are skipped.
async fn find_upload(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<Option<Upload>, PredictError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PredictError::Processing(format!("Failed to read request body: {}", e)))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            debug!("Skipping '{}' part without a filename", field_name);
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| PredictError::Processing(format!("Failed to read upload: {}", e)))?;

        return Ok(Some(Upload {
            file_name: Some(file_name),
            bytes: bytes.to_vec(),
        }));
    }

    Ok(None)
}
