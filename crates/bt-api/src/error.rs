//! HTTP mapping of `AppError`. Every failure renders the error page;
//! internal details are logged, never shown.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use bt_core::AppError;
use bt_ui::ErrorTemplate;
use tracing::error;

const INTERNAL_MESSAGE: &str = "しばらくしてから再度お試しください。";

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match &self.0 {
            AppError::NotFound(..) => "お探しのページは削除されたか、存在しません。".to_string(),
            AppError::ValidationError(msg) => msg.clone(),
            AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Internal(detail) = &self.0 {
            error!(%detail, "request failed");
        }

        match ErrorTemplate::new(status.as_u16(), &self.public_message()).render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(err) => {
                error!(error = %err, "error page failed to render");
                (status, INTERNAL_MESSAGE).into_response()
            }
        }
    }
}

/// Renders a page, turning a template failure into a 500.
pub fn render<T: Template>(page: &T) -> Result<Html<String>, ApiError> {
    page.render()
        .map(Html)
        .map_err(|err| ApiError(AppError::Internal(format!("template: {err}"))))
}
