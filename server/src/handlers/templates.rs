use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::CreateTemplate;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_template(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplate>,
) -> Result<Response, AppError> {
    let template = payload.into_template();
    template.validate()?;

    state.db.insert_template(&template).await?;
    tracing::info!(template_id = %template.id, format = %template.format(), "Template created");

    Ok(created(template, "Template created"))
}

#[derive(Debug, Deserialize)]
pub struct TemplateFilter {
    /// Comma-separated template ids.
    pub ids: Option<String>,
}

impl TemplateFilter {
    fn parse_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let Some(ids) = self.ids.as_deref() else {
            return Ok(Vec::new());
        };

        ids.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                Uuid::parse_str(id)
                    .map_err(|_| AppError::ValidationError(format!("'{}' is not a valid id", id)))
            })
            .collect()
    }
}

/// Summaries of the requested templates. Unknown ids are skipped.
pub async fn list_templates(
    State(state): State<AppState>,
    Query(filter): Query<TemplateFilter>,
) -> Result<Response, AppError> {
    let ids = filter.parse_ids()?;
    if ids.is_empty() {
        return Ok(success(Vec::<()>::new(), "No templates requested"));
    }

    let summaries = state.db.template_summaries(&ids).await?;
    Ok(success(summaries, "Templates retrieved"))
}
