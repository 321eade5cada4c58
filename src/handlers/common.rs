use crate::{errors::ServiceError, storage::Upload};
use axum::extract::{multipart::MultipartError, Multipart};
use serde::Deserialize;
use utoipa::IntoParams;

/// `?projectId=` filter shared by the list endpoints that accept one.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProjectQuery {
    pub project_id: Option<i32>,
}

impl ProjectQuery {
    /// The project id, or 400 when the caller left it out.
    pub fn required(&self) -> Result<i32, ServiceError> {
        self.project_id
            .ok_or_else(|| ServiceError::BadRequest("Project ID is required".to_string()))
    }
}

fn multipart_error(err: MultipartError) -> ServiceError {
    ServiceError::BadRequest(err.body_text())
}

/// Reads the first multipart field called `field_name` into an [`Upload`].
///
/// Other fields are skipped. A body without the field is a validation error.
pub async fn read_upload(
    mut multipart: Multipart,
    field_name: &str,
) -> Result<Upload, ServiceError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(Upload {
            original_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(ServiceError::ValidationError("No file uploaded".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn project_query_requires_an_id() {
        assert_eq!(ProjectQuery { project_id: Some(3) }.required().unwrap(), 3);
        assert_matches!(
            ProjectQuery::default().required(),
            Err(ServiceError::BadRequest(msg)) if msg == "Project ID is required"
        );
    }
}
