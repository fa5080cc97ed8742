use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, App};
use apex_portal::auth::models::{Role, User};
use apex_portal::config::Config;
use apex_portal::storage::MemoryFileStorage;
use apex_portal::store::{MemoryStore, Store};
use apex_portal::tasks::models::NewTask;
use apex_portal::{configure, AppState};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

const BOUNDARY: &str = "----apexportalboundary";

struct Harness {
    store: Arc<MemoryStore>,
    files: Arc<MemoryFileStorage>,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(&[])
    }

    fn with_settings(settings: &[(&str, &str)]) -> Self {
        let settings: Vec<(String, String)> = settings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_lookup(move |key| {
            settings
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        });

        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(MemoryFileStorage::new());
        let state = AppState::new(config, store.clone(), files.clone(), None);
        Self {
            store,
            files,
            state,
        }
    }

    /// Seeds a user and a live session for them.
    async fn sign_in(&self, name: &str, role: Role) -> (User, String) {
        let email = format!("{}@example.com", name.to_lowercase());
        let user = self.store.insert_user(name, &email, "unused", role);
        let token = Uuid::new_v4().simple().to_string();
        self.store
            .create_session(&token, user.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        (user, token)
    }

    /// Creates a task assigned to `student`, returning (task id, student task id).
    async fn assign(&self, student: &User) -> (Uuid, Uuid) {
        let task = self
            .store
            .create_task(NewTask {
                title: "Week 3: Data cleaning".into(),
                description: "Clean the provided CSV".into(),
                week: Some(3),
                due_date: None,
            })
            .await
            .unwrap();
        let assignment = self.store.assign_task(task.id, student.id).await.unwrap();
        (task.id, assignment.id)
    }
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

fn multipart(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn submit_request(token: &str, fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/student/tasks/submit")
        .insert_header(bearer(token))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart(fields, file))
}

fn review_request(token: &str, uri: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header(bearer(token))
        .set_json(body)
}

#[actix_web::test]
async fn submitting_twice_keeps_a_single_row() {
    let h = Harness::new();
    let (student, token) = h.sign_in("Sam", Role::Student).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let fields = [
        ("taskId", task_id.to_string()),
        ("studentTaskId", student_task_id.to_string()),
        ("answerText", "df.dropna()".to_string()),
    ];
    let fields: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let resp = test::call_service(&app, submit_request(&token, &fields, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["submission"]["status"], "SUBMITTED");

    let resp = test::call_service(&app, submit_request(&token, &fields, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "This task has already been submitted");

    let rows = h
        .store
        .list_task_submissions(apex_portal::submissions::models::SubmissionStatus::Submitted)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[actix_web::test]
async fn blank_answer_without_file_is_rejected() {
    let h = Harness::new();
    let (student, token) = h.sign_in("Sam", Role::Student).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let task_id = task_id.to_string();
    let student_task_id = student_task_id.to_string();
    let fields = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
        ("answerText", "   "),
    ];

    let resp = test::call_service(&app, submit_request(&token, &fields, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Provide an answer or upload a file");
}

#[actix_web::test]
async fn oversized_pdf_is_refused_before_storage() {
    let h = Harness::new();
    let (student, token) = h.sign_in("Sam", Role::Student).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let task_id = task_id.to_string();
    let student_task_id = student_task_id.to_string();
    let fields = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
    ];
    let pdf = vec![b'%'; 12 * 1024 * 1024];

    let resp = test::call_service(
        &app,
        submit_request(&token, &fields, Some(("thesis.pdf", "application/pdf", pdf.as_slice()))).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "File size exceeds 10MB limit");
    assert!(h.files.is_empty());
}

#[actix_web::test]
async fn small_pdf_is_stored_and_linked() {
    let h = Harness::new();
    let (student, token) = h.sign_in("Sam", Role::Student).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let task_id_s = task_id.to_string();
    let student_task_id = student_task_id.to_string();
    let fields = [
        ("taskId", task_id_s.as_str()),
        ("studentTaskId", student_task_id.as_str()),
    ];

    let resp = test::call_service(
        &app,
        submit_request(&token, &fields, Some(("notes v2.pdf", "application/pdf", &b"%PDF-1.7"[..])))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let url = body["submission"]["fileUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with(&format!("/uploads/tasks/{}-{}-", student.id, task_id)));
    assert!(url.ends_with("-notes_v2.pdf"));
    assert_eq!(h.files.urls(), vec![url]);
}

#[actix_web::test]
async fn reject_then_resubmit_reopens_same_submission() {
    let h = Harness::new();
    let (student, student_token) = h.sign_in("Sam", Role::Student).await;
    let (_, admin_token) = h.sign_in("Ada", Role::Admin).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let task_id = task_id.to_string();
    let student_task_id = student_task_id.to_string();
    let first = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
        ("answerText", "first try"),
    ];
    let resp =
        test::call_service(&app, submit_request(&student_token, &first, None).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let submission_id = body["submission"]["id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        review_request(
            &admin_token,
            "/api/admin/tasks/review",
            json!({ "submissionId": submission_id, "action": "reject", "feedback": "Handle missing values" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["submission"]["status"], "REJECTED");
    assert_eq!(body["submission"]["feedback"], "Handle missing values");

    let second = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
        ("answerText", "second try"),
        ("submissionId", submission_id.as_str()),
    ];
    let resp =
        test::call_service(&app, submit_request(&student_token, &second, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Task resubmitted successfully");
    assert_eq!(body["submission"]["id"], submission_id.as_str());
    assert_eq!(body["submission"]["status"], "SUBMITTED");
    assert_eq!(body["submission"]["feedback"], Value::Null);
    assert_eq!(body["submission"]["answerText"], "second try");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/notifications")
            .insert_header(bearer(&student_token))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["unreadCount"], 1);
    assert_eq!(body["notifications"][0]["title"], "Task needs changes");
}

#[actix_web::test]
async fn accepted_submission_is_final() {
    let h = Harness::new();
    let (student, student_token) = h.sign_in("Sam", Role::Student).await;
    let (_, admin_token) = h.sign_in("Ada", Role::Admin).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let task_id = task_id.to_string();
    let student_task_id = student_task_id.to_string();
    let fields = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
        ("answerText", "done"),
    ];
    let resp =
        test::call_service(&app, submit_request(&student_token, &fields, None).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let submission_id = body["submission"]["id"].as_str().unwrap().to_string();

    let accept = review_request(
        &admin_token,
        "/api/admin/tasks/review",
        json!({ "submissionId": submission_id, "action": "accept" }),
    );
    let resp = test::call_service(&app, accept.to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let reject = review_request(
        &admin_token,
        "/api/admin/tasks/review",
        json!({ "submissionId": submission_id, "action": "reject", "feedback": "On second thought" }),
    );
    let resp = test::call_service(&app, reject.to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Submission has already been reviewed");

    let retry = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
        ("answerText", "improved"),
        ("submissionId", submission_id.as_str()),
    ];
    let resp =
        test::call_service(&app, submit_request(&student_token, &retry, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let row = h
        .store
        .find_task_submission(Uuid::parse_str(&submission_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        row.status,
        apex_portal::submissions::models::SubmissionStatus::Accepted
    );
    assert_eq!(row.answer_text.as_deref(), Some("done"));
}

#[actix_web::test]
async fn task_reject_needs_feedback_but_project_reject_does_not() {
    let h = Harness::new();
    let (student, student_token) = h.sign_in("Sam", Role::Student).await;
    let (_, admin_token) = h.sign_in("Ada", Role::Admin).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let task_id = task_id.to_string();
    let student_task_id = student_task_id.to_string();
    let fields = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
        ("answerText", "answer"),
    ];
    let resp =
        test::call_service(&app, submit_request(&student_token, &fields, None).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let submission_id = body["submission"]["id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        review_request(
            &admin_token,
            "/api/admin/tasks/review",
            json!({ "submissionId": submission_id, "action": "reject" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/student/project")
            .insert_header(bearer(&student_token))
            .set_json(json!({
                "title": "Churn prediction",
                "githubRepo": "https://github.com/sam/churn"
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let project_id = body["project"]["id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        review_request(
            &admin_token,
            "/api/admin/projects/review",
            json!({ "submissionId": project_id, "action": "reject" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["submission"]["status"], "REJECTED");
    assert!(body["submission"]["reviewedAt"].is_string());
}

#[actix_web::test]
async fn roles_are_enforced_on_review_and_submit() {
    let h = Harness::new();
    let (student, student_token) = h.sign_in("Sam", Role::Student).await;
    let (_, admin_token) = h.sign_in("Ada", Role::Admin).await;
    let (task_id, student_task_id) = h.assign(&student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let resp = test::call_service(
        &app,
        review_request(
            &student_token,
            "/api/admin/tasks/review",
            json!({ "submissionId": Uuid::new_v4(), "action": "accept" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let task_id = task_id.to_string();
    let student_task_id = student_task_id.to_string();
    let fields = [
        ("taskId", task_id.as_str()),
        ("studentTaskId", student_task_id.as_str()),
        ("answerText", "on behalf of the student"),
    ];
    let resp =
        test::call_service(&app, submit_request(&admin_token, &fields, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/admin/analytics").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn contact_form_is_throttled_after_ten_requests() {
    let h = Harness::new();
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let contact = || {
        test::TestRequest::post()
            .uri("/api/contact")
            .insert_header(("x-forwarded-for", "203.0.113.7"))
            .set_json(json!({
                "name": "Riley",
                "email": "riley@example.com",
                "message": "Tell me about the data science track"
            }))
            .to_request()
    };

    for _ in 0..10 {
        let resp = test::call_service(&app, contact()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = test::call_service(&app, contact()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    assert_eq!(h.store.count_leads().await.unwrap(), 10);
}

#[actix_web::test]
async fn register_login_and_me() {
    let h = Harness::new();
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let register = |email: &str| {
        test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "name": "Jordan", "email": email, "password": "s3cret!" }))
            .to_request()
    };

    let resp = test::call_service(&app, register("  Jordan@Example.com ")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["email"], "jordan@example.com");

    let resp = test::call_service(&app, register("jordan@example.com")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Email already registered");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "jordan@example.com", "password": "wrong" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "jordan@example.com", "password": "s3cret!" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["role"], "STUDENT");
    assert!(body["user"].get("passwordHash").is_none());

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "Jordan");
}

#[actix_web::test]
async fn registration_rejects_short_password() {
    let h = Harness::new();
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "name": "Jo", "email": "jo@example.com", "password": "123" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Password must be at least 6 characters");
}

#[actix_web::test]
async fn notifications_for_other_users_need_admin() {
    let h = Harness::new();
    let (_, student_token) = h.sign_in("Sam", Role::Student).await;
    let (other, _) = h.sign_in("Kim", Role::Student).await;
    let (_, admin_token) = h.sign_in("Ada", Role::Admin).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let create = |token: &str| {
        test::TestRequest::post()
            .uri("/api/notifications")
            .insert_header(bearer(token))
            .set_json(json!({
                "userId": other.id,
                "title": "Reminder",
                "message": "Class starts at <b>9</b>"
            }))
            .to_request()
    };

    let resp = test::call_service(&app, create(&student_token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(&app, create(&admin_token)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["notification"]["message"], "Class starts at b9/b");
}

#[actix_web::test]
async fn progress_defaults_and_ownership() {
    let h = Harness::new();
    let (_, student_token) = h.sign_in("Sam", Role::Student).await;
    let (other, _) = h.sign_in("Kim", Role::Student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/student/progress")
            .insert_header(bearer(&student_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["progress"]["progressWeek"], 1);
    assert_eq!(body["progress"]["progressPercent"], 0);
    assert_eq!(body["progress"]["status"], "ACTIVE");

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri("/api/student/progress")
            .insert_header(bearer(&student_token))
            .set_json(json!({ "userId": other.id, "progressWeek": 4 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri("/api/student/progress")
            .insert_header(bearer(&student_token))
            .set_json(json!({ "progressWeek": 17 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn avatar_route_follows_capability_toggle() {
    let disabled = Harness::new();
    let app =
        test::init_service(App::new().configure(|cfg| configure(cfg, &disabled.state))).await;
    let (_, token) = disabled.sign_in("Sam", Role::Student).await;

    let avatar = |token: &str| {
        test::TestRequest::post()
            .uri("/api/upload/avatar")
            .insert_header(bearer(token))
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart(&[], Some(("me.png", "image/png", &b"\x89PNG"[..]))))
            .to_request()
    };

    let resp = test::call_service(&app, avatar(&token)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let enabled = Harness::with_settings(&[("AVATAR_UPLOADS_ENABLED", "true")]);
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &enabled.state))).await;
    let (user, token) = enabled.sign_in("Sam", Role::Student).await;

    let resp = test::call_service(&app, avatar(&token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let url = body["avatarUrl"].as_str().unwrap();
    assert!(url.starts_with(&format!("/uploads/avatars/{}-", user.id)));
    assert!(url.ends_with(".png"));

    let stored = enabled.store.find_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.avatar_url.as_deref(), Some(url));
}

#[actix_web::test]
async fn chat_without_assistant_reports_generic_error() {
    let h = Harness::new();
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({ "messages": [{ "role": "user", "content": "Hi" }] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Chat API error. Please try again.");
}

fn notifications_request(token: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri("/api/notifications")
        .insert_header(bearer(token))
}

#[actix_web::test]
async fn marking_read_is_scoped_to_the_owner() {
    let h = Harness::new();
    let (sam, sam_token) = h.sign_in("Sam", Role::Student).await;
    let (kim, kim_token) = h.sign_in("Kim", Role::Student).await;
    let sams = h.store.create_notification(sam.id, "Welcome", "Hi Sam").await.unwrap();
    h.store.create_notification(sam.id, "Reminder", "Week 2").await.unwrap();
    h.store.create_notification(kim.id, "Welcome", "Hi Kim").await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri("/api/notifications/read")
            .insert_header(bearer(&kim_token))
            .set_json(json!({ "notificationId": sams.id }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(!h.store.find_notification(sams.id).await.unwrap().unwrap().is_read);

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri("/api/notifications/read")
            .insert_header(bearer(&sam_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["updated"], 2);

    let resp = test::call_service(&app, notifications_request(&sam_token).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["unreadCount"], 0);

    let resp = test::call_service(&app, notifications_request(&kim_token).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["unreadCount"], 1);
}

#[actix_web::test]
async fn students_may_only_message_admins() {
    let h = Harness::new();
    let (sam, sam_token) = h.sign_in("Sam", Role::Student).await;
    let (kim, _) = h.sign_in("Kim", Role::Student).await;
    let (ada, _) = h.sign_in("Ada", Role::Admin).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let send = |receiver: Uuid| {
        test::TestRequest::post()
            .uri("/api/messages")
            .insert_header(bearer(&sam_token))
            .set_json(json!({ "receiverId": receiver, "content": "Can we talk about week 3?" }))
            .to_request()
    };

    let resp = test::call_service(&app, send(sam.id)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "You cannot message yourself");

    let resp = test::call_service(&app, send(kim.id)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(&app, send(ada.id)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert!(h.store.conversation(sam.id, kim.id, 10).await.unwrap().is_empty());
    assert_eq!(h.store.conversation(sam.id, ada.id, 10).await.unwrap().len(), 1);
}

#[actix_web::test]
async fn attendance_is_for_students_and_one_row_per_day() {
    let h = Harness::new();
    let (sam, sam_token) = h.sign_in("Sam", Role::Student).await;
    let (ada, ada_token) = h.sign_in("Ada", Role::Admin).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let mark = |user_id: Uuid, status: &str| {
        test::TestRequest::post()
            .uri("/api/attendance/mark")
            .insert_header(bearer(&ada_token))
            .set_json(json!({ "userId": user_id, "date": "2026-03-02", "status": status }))
            .to_request()
    };

    let resp = test::call_service(&app, mark(ada.id, "PRESENT")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, mark(sam.id, "PRESENT")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = test::call_service(&app, mark(sam.id, "ABSENT")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/student/attendance")
            .insert_header(bearer(&sam_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["totalDays"], 1);
    assert_eq!(body["presentDays"], 0);
    assert_eq!(body["records"][0]["status"], "ABSENT");
}

#[actix_web::test]
async fn assigning_a_task_twice_is_refused() {
    let h = Harness::new();
    let (sam, sam_token) = h.sign_in("Sam", Role::Student).await;
    let (_, ada_token) = h.sign_in("Ada", Role::Admin).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/admin/tasks")
            .insert_header(bearer(&ada_token))
            .set_json(json!({ "title": "Week 4: Joins", "description": "Merge the two tables", "week": 4 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let task_id = body["task"]["id"].as_str().unwrap().to_string();

    let assign = || {
        test::TestRequest::post()
            .uri("/api/admin/tasks/assign")
            .insert_header(bearer(&ada_token))
            .set_json(json!({ "taskId": task_id, "userId": sam.id }))
            .to_request()
    };

    let resp = test::call_service(&app, assign()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(&app, assign()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Task is already assigned to this student");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/student/tasks")
            .insert_header(bearer(&sam_token))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn malformed_query_gets_json_error() {
    let h = Harness::new();
    let (_, token) = h.sign_in("Sam", Role::Student).await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &h.state))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/notifications?limit=abc")
            .insert_header(bearer(&token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid query parameters");
}
