//! Back-office route handlers.
//!
//! Every handler takes [`RequireAdmin`](crate::middleware::RequireAdmin),
//! so a customer session gets 403 and an anonymous one 401.

mod contacts;
mod dashboard;
mod orders;
mod products;
mod promotions;
mod users;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart},
};

use crate::error::{AppError, Result};
use crate::services::images::MAX_IMAGE_BYTES;
use crate::state::AppState;

/// Files accepted in one upload request.
const MAX_FILES_PER_UPLOAD: usize = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(dashboard::router())
        .nest("/products", products::router())
        .nest("/orders", orders::router())
        .nest("/users", users::router())
        .nest("/offers", promotions::offers_router())
        .nest("/coupons", promotions::coupons_router())
        .nest("/sliders", promotions::sliders_router())
        .nest("/contacts", contacts::router())
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024 * 1024))
}

/// One file part of a multipart upload.
pub(crate) struct UploadedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// The parts of a multipart request: the `data` JSON field, if any, and
/// every file part named `image` or `images`.
pub(crate) struct UploadForm {
    pub data: Option<String>,
    pub files: Vec<UploadedFile>,
}

impl UploadForm {
    /// Drain a multipart body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` on a malformed body or too many files.
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self {
            data: None,
            files: Vec::new(),
        };

        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            match field.name() {
                Some("data") => form.data = Some(field.text().await.map_err(bad_multipart)?),
                Some("image" | "images") => {
                    if form.files.len() == MAX_FILES_PER_UPLOAD {
                        return Err(AppError::BadRequest(format!(
                            "At most {MAX_FILES_PER_UPLOAD} images per upload"
                        )));
                    }
                    let content_type = field.content_type().map(str::to_owned);
                    let bytes = field.bytes().await.map_err(bad_multipart)?;
                    form.files.push(UploadedFile {
                        bytes: bytes.to_vec(),
                        content_type,
                    });
                }
                _ => {}
            }
        }

        Ok(form)
    }

    /// Parse the `data` field as JSON.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if the field is missing or invalid.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Missing data field".to_owned()))?;
        serde_json::from_str(data).map_err(|e| AppError::BadRequest(format!("Invalid data: {e}")))
    }
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(err.body_text())
}
