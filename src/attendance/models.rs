use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    #[validate(length(min = 1, message = "Please select a student and status"))]
    pub user_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub records: Vec<Attendance>,
    pub total_days: usize,
    pub present_days: usize,
    pub percentage: u32,
}

impl AttendanceSummary {
    pub fn from_records(records: Vec<Attendance>) -> Self {
        let total_days = records.len();
        let present_days = records
            .iter()
            .filter(|r| r.status == AttendanceStatus::Present)
            .count();
        let percentage = if total_days == 0 {
            0
        } else {
            ((present_days as f64 / total_days as f64) * 100.0).round() as u32
        };

        Self {
            records,
            total_days,
            present_days,
            percentage,
        }
    }
}
