use std::collections::HashMap;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tower::ServiceExt;

use crate::{
    config::AppConfig,
    web::{
        AppState, data,
        models::{NewStudent, StudentRow},
        router::build_router,
        session::SESSION_COOKIE,
        state::run_migrations,
    },
};

struct TestResponse {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

/// Drives the router like a browser: cookies set by one response are sent
/// with the next request.
struct TestApp {
    router: Router,
    pool: SqlitePool,
    cookies: HashMap<String, String>,
}

impl TestApp {
    async fn new() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let config = AppConfig::from_lookup(|key| match key {
            "SECRET_KEY" => Some("integration-test-secret".to_string()),
            _ => None,
        })
        .unwrap();
        let state = AppState::with_pool(pool.clone(), &config);

        Self {
            router: build_router(state),
            pool,
            cookies: HashMap::new(),
        }
    }

    async fn send(&mut self, builder: axum::http::request::Builder, body: Body) -> TestResponse {
        let builder = if self.cookies.is_empty() {
            builder
        } else {
            let cookie_header = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder.header(header::COOKIE, cookie_header)
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        self.store_cookies(&response);

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            location,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    fn store_cookies(&mut self, response: &Response) {
        for value in response.headers().get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let expired = raw.to_ascii_lowercase().contains("max-age=0");
            if expired || value.is_empty() {
                self.cookies.remove(name.trim());
            } else {
                self.cookies
                    .insert(name.trim().to_string(), value.to_string());
            }
        }
    }

    async fn get(&mut self, uri: &str) -> TestResponse {
        let builder = Request::builder().method("GET").uri(uri);
        self.send(builder, Body::empty()).await
    }

    async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = fields
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        let builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(builder, Body::from(body)).await
    }

    async fn post_empty(&mut self, uri: &str) -> TestResponse {
        let builder = Request::builder().method("POST").uri(uri);
        self.send(builder, Body::empty()).await
    }

    /// Loads `page` and returns the CSRF token embedded in its forms.
    async fn csrf_token(&mut self, page: &str) -> String {
        let response = self.get(page).await;
        extract_csrf_token(&response.body)
    }

    async fn register(&mut self, username: &str, password: &str) -> TestResponse {
        let token = self.csrf_token("/register").await;
        self.post_form(
            "/register",
            &[
                ("username", username),
                ("password", password),
                ("csrf_token", &token),
            ],
        )
        .await
    }

    async fn login(&mut self, username: &str, password: &str, next: Option<&str>) -> TestResponse {
        let uri = match next {
            Some(next) => format!("/login?next={}", urlencoding::encode(next)),
            None => "/login".to_string(),
        };
        let token = self.csrf_token(&uri).await;
        self.post_form(
            &uri,
            &[
                ("username", username),
                ("password", password),
                ("csrf_token", &token),
            ],
        )
        .await
    }

    async fn registered_and_logged_in(&mut self) {
        let registered = self.register("alice", "wonderland1").await;
        assert_eq!(registered.status, StatusCode::SEE_OTHER);
        let logged_in = self.login("alice", "wonderland1", None).await;
        assert_eq!(logged_in.status, StatusCode::SEE_OTHER);
    }

    async fn seed_student(&self, firstname: &str) -> i64 {
        let student = NewStudent {
            firstname: firstname.to_string(),
            lastname: "Lovelace".to_string(),
            email: format!("{}@example.com", firstname.to_lowercase()),
            phone: "5551234567".to_string(),
        };
        data::insert_student(&self.pool, &student).await.unwrap()
    }

    async fn students(&self) -> Vec<StudentRow> {
        data::fetch_students(&self.pool).await.unwrap()
    }

    async fn user_count(&self, username: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn extract_csrf_token(html: &str) -> String {
    let marker = r#"name="csrf_token" value=""#;
    let start = html.find(marker).expect("page has no csrf field") + marker.len();
    let end = html[start..].find('"').unwrap() + start;
    html[start..end].to_string()
}

#[tokio::test]
async fn health_check_and_unknown_routes() {
    let mut app = TestApp::new().await;

    assert_eq!(app.get("/healthz").await.status, StatusCode::OK);

    let missing = app.get("/no/such/page").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(missing.body.contains("Page not found"));
}

#[tokio::test]
async fn listing_is_public() {
    let mut app = TestApp::new().await;
    app.seed_student("Grace").await;

    let page = app.get("/").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Grace"));
    assert!(page.body.contains(r#"href="/login""#));
}

#[tokio::test]
async fn creating_a_student_persists_one_trimmed_row() {
    let mut app = TestApp::new().await;
    let token = app.csrf_token("/").await;

    let response = app
        .post_form(
            "/",
            &[
                ("firstname", "  Ada "),
                ("lastname", " Lovelace"),
                ("email", " ada@example.com "),
                ("phone", " +44 20 7946 0958 "),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location.as_deref(), Some("/?status=student_added"));

    let students = app.students().await;
    assert_eq!(students.len(), 1);
    let student = &students[0];
    assert_eq!(student.firstname, "Ada");
    assert_eq!(student.lastname, "Lovelace");
    assert_eq!(student.email, "ada@example.com");
    assert_eq!(student.phone, "+44 20 7946 0958");

    let page = app.get("/?status=student_added").await;
    assert!(page.body.contains("Student added."));
}

#[tokio::test]
async fn empty_firstname_is_rejected_without_persisting() {
    let mut app = TestApp::new().await;
    let token = app.csrf_token("/").await;

    let response = app
        .post_form(
            "/",
            &[
                ("firstname", "   "),
                ("lastname", "Lovelace"),
                ("email", "ada@example.com"),
                ("phone", "5551234567"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("This field is required."));
    assert!(response.body.contains(r#"value="Lovelace""#));
    assert!(app.students().await.is_empty());
}

#[tokio::test]
async fn posts_without_a_valid_csrf_token_are_rejected() {
    let mut app = TestApp::new().await;
    let fields = [
        ("firstname", "Ada"),
        ("lastname", "Lovelace"),
        ("email", "ada@example.com"),
        ("phone", "5551234567"),
    ];

    let no_cookie = app.post_form("/", &fields).await;
    assert_eq!(no_cookie.status, StatusCode::BAD_REQUEST);

    app.csrf_token("/").await;
    let mut forged = fields.to_vec();
    forged.push(("csrf_token", "forged"));
    let wrong_token = app.post_form("/", &forged).await;
    assert_eq!(wrong_token.status, StatusCode::BAD_REQUEST);

    assert!(app.students().await.is_empty());
}

#[tokio::test]
async fn registering_a_username_twice_is_rejected() {
    let mut app = TestApp::new().await;

    let first = app.register("alice", "wonderland1").await;
    assert_eq!(first.status, StatusCode::SEE_OTHER);
    assert_eq!(first.location.as_deref(), Some("/login?status=registered"));

    let second = app.register("alice", "another-pass").await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert!(second.body.contains("Username already exists. Choose another."));
    assert_eq!(app.user_count("alice").await, 1);

    // matching is exact, so a different case is a different user
    let other_case = app.register("Alice", "wonderland1").await;
    assert_eq!(other_case.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn registration_validates_lengths() {
    let mut app = TestApp::new().await;

    let response = app.register("al", "short").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Field must be between 3 and 80 characters long."));
    assert!(response.body.contains("Field must be at least 8 characters long."));
    assert_eq!(app.user_count("al").await, 0);
}

#[tokio::test]
async fn login_establishes_a_session_and_goes_home() {
    let mut app = TestApp::new().await;
    app.register("alice", "wonderland1").await;

    let response = app.login("alice", "wonderland1", None).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location.as_deref(), Some("/?status=logged_in"));
    assert!(app.cookies.contains_key(SESSION_COOKIE));

    let home = app.get("/?status=logged_in").await;
    assert!(home.body.contains("Signed in as <strong>alice</strong>"));
    assert!(home.body.contains("Logged in successfully."));
}

#[tokio::test]
async fn failed_logins_share_one_generic_message() {
    let mut app = TestApp::new().await;
    app.register("alice", "wonderland1").await;

    let wrong_password = app.login("alice", "not-the-password", None).await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert!(wrong_password.body.contains("Invalid username or password."));
    assert!(!app.cookies.contains_key(SESSION_COOKIE));

    let unknown_user = app.login("mallory", "wonderland1", None).await;
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert!(unknown_user.body.contains("Invalid username or password."));
    assert!(!app.cookies.contains_key(SESSION_COOKIE));
}

#[tokio::test]
async fn protected_pages_round_trip_through_login() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    app.register("alice", "wonderland1").await;

    let update_path = format!("/update/{id}");
    let redirect = app.get(&update_path).await;
    assert_eq!(redirect.status, StatusCode::SEE_OTHER);
    let login_url = redirect.location.unwrap();
    assert_eq!(
        login_url,
        format!("/login?next=%2Fupdate%2F{id}&error=login_required")
    );

    let login_page = app.get(&login_url).await;
    assert!(login_page.body.contains("Please log in to access this page."));

    let logged_in = app.login("alice", "wonderland1", Some(&update_path)).await;
    let destination = format!("{update_path}?status=logged_in");
    assert_eq!(logged_in.location.as_deref(), Some(destination.as_str()));

    let edit = app.get(&destination).await;
    assert_eq!(edit.status, StatusCode::OK);
    assert!(edit.body.contains(r#"value="Grace""#));
    assert!(edit.body.contains("Logged in successfully."));
}

#[tokio::test]
async fn anonymous_delete_redirects_to_login_and_keeps_the_row() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    let token = app.csrf_token("/").await;

    let response = app
        .post_form(&format!("/delete/{id}"), &[("csrf_token", &token)])
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(
        response.location.as_deref(),
        Some("/login?next=%2F&error=login_required")
    );
    assert_eq!(app.students().await.len(), 1);
}

#[tokio::test]
async fn offsite_next_targets_fall_back_home() {
    let mut app = TestApp::new().await;
    app.register("alice", "wonderland1").await;

    let response = app
        .login("alice", "wonderland1", Some("https://evil.example/"))
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location.as_deref(), Some("/?status=logged_in"));
}

#[tokio::test]
async fn anonymous_posts_without_a_body_redirect_to_login() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;

    let delete = app.post_empty(&format!("/delete/{id}")).await;
    assert_eq!(delete.status, StatusCode::SEE_OTHER);
    assert_eq!(
        delete.location.as_deref(),
        Some("/login?next=%2F&error=login_required")
    );

    let update = app.post_empty(&format!("/update/{id}")).await;
    assert_eq!(update.status, StatusCode::SEE_OTHER);
    assert_eq!(
        update.location,
        Some(format!("/login?next=%2Fupdate%2F{id}&error=login_required"))
    );

    assert_eq!(app.students().await.len(), 1);
}

#[tokio::test]
async fn signed_in_posts_without_a_body_fail_the_csrf_check() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    app.registered_and_logged_in().await;

    let delete = app.post_empty(&format!("/delete/{id}")).await;
    assert_eq!(delete.status, StatusCode::BAD_REQUEST);
    let update = app.post_empty(&format!("/update/{id}")).await;
    assert_eq!(update.status, StatusCode::BAD_REQUEST);

    assert_eq!(app.students().await[0].lastname, "Lovelace");
}

#[tokio::test]
async fn second_login_replaces_the_session() {
    let mut app = TestApp::new().await;
    app.register("alice", "wonderland1").await;
    app.register("bob", "builder-pass").await;

    app.login("alice", "wonderland1", None).await;
    let alice_session = app.cookies.get(SESSION_COOKIE).cloned().unwrap();

    let response = app.login("bob", "builder-pass", None).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    let bob_session = app.cookies.get(SESSION_COOKIE).cloned().unwrap();
    assert_ne!(alice_session, bob_session);

    let home = app.get("/").await;
    assert!(home.body.contains("Signed in as <strong>bob</strong>"));
    assert!(!home.body.contains("<strong>alice</strong>"));
}

#[tokio::test]
async fn login_and_logout_issue_a_fresh_csrf_token() {
    let mut app = TestApp::new().await;
    app.register("alice", "wonderland1").await;
    let anonymous_token = app.csrf_token("/").await;

    app.login("alice", "wonderland1", None).await;
    let signed_in_token = app.csrf_token("/").await;
    assert_ne!(anonymous_token, signed_in_token);

    app.get("/logout").await;
    let stale = app
        .post_form(
            "/",
            &[
                ("firstname", "Ada"),
                ("lastname", "Lovelace"),
                ("email", "ada@example.com"),
                ("phone", "5551234567"),
                ("csrf_token", &signed_in_token),
            ],
        )
        .await;
    assert_eq!(stale.status, StatusCode::BAD_REQUEST);
    assert!(app.students().await.is_empty());
}

#[tokio::test]
async fn error_pages_keep_the_signed_in_navigation() {
    let mut app = TestApp::new().await;

    let anonymous = app.get("/no/such/page").await;
    assert!(anonymous.body.contains(r#"href="/register""#));

    app.registered_and_logged_in().await;
    for path in ["/update/999", "/no/such/page"] {
        let page = app.get(path).await;
        assert_eq!(page.status, StatusCode::NOT_FOUND);
        assert!(page.body.contains("Page not found"));
        assert!(page.body.contains("Signed in as <strong>alice</strong>"));
        assert!(!page.body.contains(r#"href="/register""#));
    }

    let bad_request = app.post_empty("/delete/1").await;
    assert_eq!(bad_request.status, StatusCode::BAD_REQUEST);
    assert!(bad_request.body.contains("Signed in as <strong>alice</strong>"));
}

#[tokio::test]
async fn storage_failures_render_the_server_error_page() {
    let mut app = TestApp::new().await;
    sqlx::query("DROP TABLE students")
        .execute(&app.pool)
        .await
        .unwrap();

    let page = app.get("/").await;
    assert_eq!(page.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(page.body.contains("Something went wrong"));
}

#[tokio::test]
async fn failed_writes_leave_no_partial_rows() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    app.registered_and_logged_in().await;

    // the inserted row survives the failing statement, so only the
    // transaction rollback can remove it
    sqlx::query(
        "CREATE TRIGGER students_insert_fails AFTER INSERT ON students \
         BEGIN SELECT RAISE(FAIL, 'storage failure'); END",
    )
    .execute(&app.pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER students_delete_fails BEFORE DELETE ON students \
         BEGIN SELECT RAISE(ABORT, 'storage failure'); END",
    )
    .execute(&app.pool)
    .await
    .unwrap();

    let token = app.csrf_token("/").await;
    let create = app
        .post_form(
            "/",
            &[
                ("firstname", "Ada"),
                ("lastname", "Lovelace"),
                ("email", "ada@example.com"),
                ("phone", "5551234567"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(create.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(create.body.contains("Something went wrong"));

    let delete = app
        .post_form(&format!("/delete/{id}"), &[("csrf_token", &token)])
        .await;
    assert_eq!(delete.status, StatusCode::INTERNAL_SERVER_ERROR);

    let students = app.students().await;
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].id, id);
}

#[tokio::test]
async fn update_changes_the_row_in_place() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    app.registered_and_logged_in().await;

    let path = format!("/update/{id}");
    let token = app.csrf_token(&path).await;
    let response = app
        .post_form(
            &path,
            &[
                ("firstname", " Grace "),
                ("lastname", "Hopper"),
                ("email", "grace@navy.mil"),
                ("phone", "555 000 1111"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location.as_deref(), Some("/?status=student_updated"));

    let students = app.students().await;
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].id, id);
    assert_eq!(students[0].lastname, "Hopper");
    assert_eq!(students[0].email, "grace@navy.mil");
    assert_eq!(students[0].phone, "555 000 1111");
}

#[tokio::test]
async fn invalid_update_leaves_the_row_untouched() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    app.registered_and_logged_in().await;

    let path = format!("/update/{id}");
    let token = app.csrf_token(&path).await;
    let response = app
        .post_form(
            &path,
            &[
                ("firstname", "Grace"),
                ("lastname", "Hopper"),
                ("email", "not-an-email"),
                ("phone", "555 000 1111"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Invalid email address."));

    let students = app.students().await;
    assert_eq!(students[0].lastname, "Lovelace");
    assert_eq!(students[0].email, "grace@example.com");
}

#[tokio::test]
async fn missing_records_return_not_found() {
    let mut app = TestApp::new().await;
    app.registered_and_logged_in().await;
    let token = app.csrf_token("/").await;

    assert_eq!(app.get("/update/999").await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/update/abc").await.status, StatusCode::NOT_FOUND);

    let update = app
        .post_form(
            "/update/999",
            &[
                ("firstname", "Grace"),
                ("lastname", "Hopper"),
                ("email", "grace@navy.mil"),
                ("phone", "555 000 1111"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(update.status, StatusCode::NOT_FOUND);

    let delete = app
        .post_form("/delete/999", &[("csrf_token", &token)])
        .await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);
    assert!(delete.body.contains("Page not found"));
}

#[tokio::test]
async fn delete_removes_exactly_the_requested_row() {
    let mut app = TestApp::new().await;
    let first = app.seed_student("Ada").await;
    let second = app.seed_student("Grace").await;
    app.registered_and_logged_in().await;
    let token = app.csrf_token("/").await;

    let response = app
        .post_form(&format!("/delete/{first}"), &[("csrf_token", &token)])
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location.as_deref(), Some("/?status=student_deleted"));

    let remaining = app.students().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second);
}

#[tokio::test]
async fn logout_clears_the_session() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    app.registered_and_logged_in().await;

    let response = app.get("/logout").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location.as_deref(), Some("/?status=logged_out"));
    assert!(!app.cookies.contains_key(SESSION_COOKIE));

    let guarded = app.get(&format!("/update/{id}")).await;
    assert_eq!(guarded.status, StatusCode::SEE_OTHER);

    // logging out without a session is harmless
    let again = app.get("/logout").await;
    assert_eq!(again.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn forged_session_cookie_is_ignored() {
    let mut app = TestApp::new().await;
    let id = app.seed_student("Grace").await;
    app.cookies
        .insert(SESSION_COOKIE.to_string(), "eyJ1c2VyX2lkIjoxfQ".to_string());

    let response = app.get(&format!("/update/{id}")).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert!(
        response
            .location
            .unwrap()
            .starts_with("/login?next=")
    );
}
