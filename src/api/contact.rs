//! Contact-sales endpoint

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;

use super::dto::{ContactSalesRequest, ContactSalesResponse};
use crate::AppState;
use crate::data::{ContactRequest, EntityId};
use crate::error::AppError;

pub fn contact_router() -> Router<AppState> {
    Router::new().route("/contact-sales", post(contact_sales))
}

fn required(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// POST /api/contact-sales
///
/// Public. Stores the enquiry; every field except `planName` is required.
async fn contact_sales(
    State(state): State<AppState>,
    Json(req): Json<ContactSalesRequest>,
) -> Result<Json<ContactSalesResponse>, AppError> {
    let (Some(name), Some(email), Some(company), Some(phone), Some(message)) = (
        required(req.name),
        required(req.email),
        required(req.company),
        required(req.phone),
        required(req.message),
    ) else {
        return Err(AppError::Validation("All fields are required".to_string()));
    };

    let request = ContactRequest {
        id: EntityId::new().0,
        name,
        email,
        company,
        phone,
        message,
        plan_name: req.plan_name.and_then(required),
        created_at: Utc::now(),
    };
    state.db.insert_contact_request(&request).await?;

    tracing::info!(
        contact_id = %request.id,
        company = %request.company,
        plan = ?request.plan_name,
        "Contact sales request received"
    );

    Ok(Json(ContactSalesResponse {
        success: true,
        message: "Your message has been received. Our sales team will contact you shortly."
            .to_string(),
    }))
}
