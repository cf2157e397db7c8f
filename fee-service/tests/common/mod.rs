#![allow(dead_code)]

use fee_service::config::{DatabaseConfig, FeeConfig, SessionsConfig};
use fee_service::models::{NewReceipt, NewStudent};
use fee_service::services::{FeeService, SessionRegistry, StoreOptions};
use fee_service::startup::Application;
use serde_json::{json, Value};
use service_core::config::Config;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_SESSION: &str = "2024_25";

fn temp_sessions_dir() -> PathBuf {
    std::env::temp_dir().join(format!("fee_service_test_{}", uuid::Uuid::new_v4()))
}

/// Registry and service over a throwaway sessions directory.
pub struct TestContext {
    pub sessions_dir: PathBuf,
    pub registry: Arc<SessionRegistry>,
    pub fees: FeeService,
}

impl TestContext {
    pub fn new() -> Self {
        let sessions_dir = temp_sessions_dir();
        let registry = Arc::new(
            SessionRegistry::new(&sessions_dir, DEFAULT_SESSION, StoreOptions::default())
                .expect("Failed to create session registry"),
        );

        TestContext {
            fees: FeeService::new(registry.clone()),
            registry,
            sessions_dir,
        }
    }

    /// Cleanup the sessions directory after the test completes.
    pub async fn cleanup(&self) {
        self.registry.close_all().await;
        tokio::fs::remove_dir_all(&self.sessions_dir)
            .await
            .expect("Failed to remove test sessions directory");
    }
}

pub fn new_student(class_name: &str, roll: &str, months: Value) -> NewStudent {
    serde_json::from_value(json!({
        "name": format!("Student {class_name} {roll}"),
        "father": "Parent",
        "class_name": class_name,
        "roll": roll,
        "months": months,
    }))
    .expect("Failed to build student payload")
}

pub fn new_receipt(class_name: &str, roll: &str, total_paid: i64, receipt_key: &str) -> NewReceipt {
    serde_json::from_value(json!({
        "name": format!("Student {class_name} {roll}"),
        "father": "Parent",
        "class": class_name,
        "roll": roll,
        "date": "2024-07-01",
        "totalPaid": total_paid,
        "totalDue": 0,
        "advance": 0,
        "months": {},
        "receiptKey": receipt_key,
    }))
    .expect("Failed to build receipt payload")
}

/// A running application on a random port.
pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub sessions_dir: PathBuf,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let sessions_dir = temp_sessions_dir();

        let config = FeeConfig {
            common: Config {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            service_name: "fee-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            sessions: SessionsConfig {
                dir: sessions_dir.clone(),
                default_session: DEFAULT_SESSION.to_string(),
            },
            database: DatabaseConfig {
                max_connections: 5,
                busy_timeout_secs: 5,
            },
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            sessions_dir,
        }
    }

    pub async fn cleanup(&self) {
        tokio::fs::remove_dir_all(&self.sessions_dir).await.ok();
    }
}
