use actix_web::{get, web, HttpResponse};
use chrono::{Duration, Utc};

use crate::analytics::models::Analytics;
use crate::auth::guard::AdminUser;
use crate::error::ApiError;
use crate::security::secure_error;
use crate::AppState;

#[get("/api/admin/analytics")]
pub async fn get_analytics(
    data: web::Data<AppState>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let since = Utc::now() - Duration::days(7);

    let (counts, leads) = futures_util::try_join!(
        data.store.student_counts(since),
        data.store.count_leads()
    )
    .map_err(|e| secure_error(e, "Failed to fetch analytics"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "analytics": Analytics {
            total_students: counts.total,
            active_students: counts.active,
            new_students_last7_days: counts.new_since,
            queries_feedback_count: leads,
        },
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_analytics);
}
