use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_students: i64,
    pub active_students: i64,
    pub new_students_last7_days: i64,
    pub queries_feedback_count: i64,
}
