#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use casebook_api::auth::{generate_jwt, Claims, UserRole};
use casebook_api::{app, AppState};

/// An in-process server over a fresh in-memory store
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let addr = listener.local_addr()?;

        let router = app(AppState::in_memory());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            client: Client::new(),
        })
    }

    pub fn get(&self, path: &str, user: &TestUser) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&user.token)
    }

    pub fn post(&self, path: &str, user: &TestUser) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&user.token)
    }

    pub fn delete(&self, path: &str, user: &TestUser) -> RequestBuilder {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(&user.token)
    }

    /// POST /api/cases as `owner`, returning the new case id
    pub async fn create_case(&self, owner: &TestUser) -> Result<Uuid> {
        let res = self.post("/api/cases", owner).json(&case_body()).send().await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "case create failed: {}", res.status());
        let body: Value = res.json().await?;
        data_id(&body)
    }

    /// POST /api/calendar/events for a hearing `days_ahead` from now
    pub async fn create_hearing(&self, user: &TestUser, case_id: Uuid, days_ahead: i64) -> Result<Uuid> {
        let start = Utc::now() + Duration::days(days_ahead);
        let res = self
            .post("/api/calendar/events", user)
            .json(&json!({
                "case_id": case_id,
                "event_type": "hearing",
                "title": "Preliminary hearing",
                "start_datetime": start,
                "end_datetime": start + Duration::hours(1),
            }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "event create failed: {}", res.status());
        let body: Value = res.json().await?;
        data_id(&body)
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

impl TestUser {
    pub fn new(email: &str, role: UserRole) -> Result<Self> {
        let id = Uuid::new_v4();
        let token = generate_jwt(Claims::new(id, email.to_string(), String::new(), role))?;
        Ok(Self { id, email: email.to_string(), token })
    }

    pub fn owner(email: &str) -> Result<Self> {
        Self::new(email, UserRole::Owner)
    }

    pub fn invited(email: &str) -> Result<Self> {
        Self::new(email, UserRole::Invited)
    }
}

pub fn case_body() -> Value {
    json!({
        "court_id": Uuid::new_v4(),
        "case_number": format!("A40-{}/2025", &Uuid::new_v4().simple().to_string()[..6]),
        "case_type": "civil",
        "court_instance": "first",
        "subject_matter": "Recovery of debt under supply contract",
        "status": "accepted",
        "received_date": "2025-02-01",
        "judge_name": "Petrova",
        "plaintiff": "Alfa LLC",
        "defendant": "Beta JSC",
        "client_role": "plaintiff"
    })
}

pub fn data_id(body: &Value) -> Result<Uuid> {
    let id = body["data"]["id"]
        .as_str()
        .with_context(|| format!("response has no data.id: {}", body))?;
    Ok(id.parse()?)
}
