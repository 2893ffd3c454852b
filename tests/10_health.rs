mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;

use common::TestServer;

#[tokio::test]
async fn health_reports_memory_backend() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server.client.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["store"], "memory");
    Ok(())
}

#[tokio::test]
async fn root_describes_the_api() -> Result<()> {
    let server = TestServer::start().await?;

    let body: Value = server.client.get(&server.base_url).send().await?.json().await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["name"].is_string());
    Ok(())
}
