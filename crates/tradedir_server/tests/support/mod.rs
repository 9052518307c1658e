//! Shared integration-test server bootstrap helpers.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tradedir_server::{create_app, AppError, AppState, Config, Database, Mailer};

pub(crate) const ADMIN_TOKEN: &str = "test-admin-token";

#[derive(Debug, Clone)]
pub(crate) struct SentMail {
    pub receiver: String,
    pub subject: String,
    pub text: String,
}

/// Mailer that records every message it is handed.
#[derive(Default)]
pub(crate) struct CapturingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl CapturingMailer {
    pub(crate) fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().expect("mail lock").clone()
    }
}

impl Mailer for CapturingMailer {
    fn send(&self, receiver: &str, subject: &str, text: &str, _html: &str) -> Result<(), AppError> {
        self.sent.lock().expect("mail lock").push(SentMail {
            receiver: receiver.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

pub(crate) struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub mail: Arc<CapturingMailer>,
    _temp: TempDir,
}

pub(crate) fn test_config_for_dir(dir: &Path) -> Config {
    let mut config = Config::for_db_path(dir.join("data").to_str().expect("db path"));
    config.port = 0;
    config.admin_token = Some(ADMIN_TOKEN.to_string());
    config
}

pub(crate) fn test_app_for_config(config: Config, temp: TempDir) -> TestApp {
    let db = Database::new(config.db_path.as_str()).expect("open db");
    let mail = Arc::new(CapturingMailer::default());
    let state = AppState::new(config, db)
        .expect("open index")
        .with_mailer(mail.clone());
    let app = create_app(state.clone(), false);
    let server = TestServer::new(app).expect("server");
    TestApp {
        server,
        state,
        mail,
        _temp: temp,
    }
}

pub(crate) fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config_for_dir(temp_dir.path());
    test_app_for_config(config, temp_dir)
}

impl TestApp {
    /// Run every queued outbox item, standing in for the sync workers.
    pub(crate) fn drain(&self) {
        self.state.dispatcher.drain().expect("drain outbox");
    }

    pub(crate) async fn create_user(&self, email: &str) -> String {
        let response = self
            .server
            .post("/api/users")
            .json(&json!({
                "email": email,
                "first_name": "Test",
                "last_name": "User"
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let user: Value = response.json();
        user["id"].as_str().expect("user id").to_string()
    }

    pub(crate) async fn create_entity(&self, user_id: &str, body: Value) -> String {
        let response = self
            .server
            .post("/api/entities")
            .add_header("x-user-id", user_id)
            .json(&body)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let entity: Value = response.json();
        entity["id"].as_str().expect("entity id").to_string()
    }

    pub(crate) async fn set_status(&self, entity_id: &str, status: &str) {
        let response = self
            .server
            .put(&format!("/api/admin/entities/{}/status", entity_id))
            .add_header("x-admin-token", ADMIN_TOKEN)
            .json(&json!({ "status": status }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    /// User plus an Accepted entity with the given offers, fully synced.
    pub(crate) async fn accepted_entity(&self, email: &str, offers: &[&str]) -> (String, String) {
        let user_id = self.create_user(email).await;
        let entity_id = self
            .create_entity(
                &user_id,
                json!({
                    "name": format!("Shop {}", email),
                    "email": email,
                    "offers": offers,
                }),
            )
            .await;
        self.set_status(&entity_id, "accepted").await;
        self.drain();
        (user_id, entity_id)
    }
}

pub(crate) fn result_ids(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|item| item["id"].as_str().expect("id").to_string())
        .collect()
}
