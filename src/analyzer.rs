//! Test-suite analysis through the structured completion pipeline.

use crate::config::Settings;
use crate::llm::{LlmError, StructuredCompletionClient};
use crate::practices::PracticeCatalog;
use crate::prompts;
use serde_json::Value;
use tracing::{info, warn};

/// Evaluation mode: report-only, or report plus rewritten test code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Check,
    Improve,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Check => "check",
            Mode::Improve => "improve",
        }
    }
}

/// Runs the two-call evaluation contract: a strict-schema analysis call,
/// with exactly one schema-less retry when the failure looks schema-shaped.
pub struct TestAnalyzer {
    client: StructuredCompletionClient,
}

impl TestAnalyzer {
    pub fn new(client: StructuredCompletionClient) -> Self {
        Self { client }
    }

    /// Analyze a test class against the catalog and return the model's
    /// report as a JSON object.
    ///
    /// The first call requests schema-constrained decoding. If it fails with
    /// `SchemaRejected` or `MalformedResponse` — the two classes a
    /// schema-free retry can plausibly cure — one retry is issued relying on
    /// the prompt-embedded JSON instruction alone. Any other failure, and
    /// failure of the retry itself, propagate unmodified.
    pub async fn analyze(
        &self,
        settings: &Settings,
        catalog: &PracticeCatalog,
        test_code: &str,
        class_name: &str,
        mode: Mode,
    ) -> Result<Value, LlmError> {
        info!(class = class_name, mode = mode.as_str(), "analyzing test class");

        let system_prompt = prompts::build_system_prompt(catalog, mode);
        let user_message = prompts::build_user_message(test_code, class_name, catalog.len());
        let spec = settings
            .request_spec(system_prompt, user_message)
            .with_schema(prompts::report_schema());

        match self.client.complete_json(&spec).await {
            Ok(report) => Ok(report),
            Err(err @ (LlmError::SchemaRejected { .. } | LlmError::MalformedResponse { .. })) => {
                warn!(error = %err, "structured analysis failed; retrying without schema");
                let mut retry_spec = spec.clone();
                retry_spec.response_schema = None;
                self.client.complete_json(&retry_spec).await
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionClient, RetryPolicy};
    use mockito::{Matcher, Server};
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_settings(api_base: String) -> Settings {
        Settings {
            api_key: "sk-test".to_string(),
            api_base,
            model: "test-model".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            timeout: Duration::from_secs(5),
            seed: None,
            requests_per_minute: 60_000,
            retry_attempts: 2,
            retry_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
            practices_path: PathBuf::from("data/best_practices.json"),
        }
    }

    fn test_catalog() -> PracticeCatalog {
        PracticeCatalog::from_json(
            r#"{"practices": [{
                "code": "CS-01",
                "title": "Descriptive test names",
                "category": "Common Sense",
                "principle": "Test names state the scenario and expected outcome."
            }]}"#,
        )
        .unwrap()
    }

    fn analyzer_for(settings: &Settings) -> TestAnalyzer {
        let client = CompletionClient::new(
            &settings.api_base,
            &settings.api_key,
            settings.requests_per_minute,
            RetryPolicy::new(settings.retry_attempts, settings.retry_delay, settings.backoff_factor)
                .unwrap(),
            settings.timeout,
        )
        .unwrap();
        TestAnalyzer::new(StructuredCompletionClient::new(client))
    }

    fn report_body() -> String {
        serde_json::json!({
            "choices": [{
                "message": {"content": "{\"test_class_name\": \"UserServiceTest\", \"overall_compliance_score\": \"80%\"}"},
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_analyze_returns_report_object() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(report_body())
            .create_async()
            .await;

        let settings = test_settings(server.url());
        let analyzer = analyzer_for(&settings);
        let report = analyzer
            .analyze(&settings, &test_catalog(), "class UserServiceTest {}", "UserServiceTest", Mode::Check)
            .await
            .unwrap();

        assert_eq!(report["overall_compliance_score"], "80%");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_schema_rejection_falls_back_to_schemaless_call() {
        let mut server = Server::new_async().await;
        // Schema-less retry carries no response_format at all and succeeds.
        let success = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(report_body())
            .create_async()
            .await;
        // Both the strict json_schema request and the json_object downgrade
        // are rejected, so the client surfaces SchemaRejected.
        let rejections = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("response_format".to_string()))
            .with_status(400)
            .with_body(r#"{"error": {"message": "response_format is not supported by this model"}}"#)
            .expect(2)
            .create_async()
            .await;

        let settings = test_settings(server.url());
        let analyzer = analyzer_for(&settings);
        let report = analyzer
            .analyze(&settings, &test_catalog(), "class UserServiceTest {}", "UserServiceTest", Mode::Check)
            .await
            .unwrap();

        assert_eq!(report["test_class_name"], "UserServiceTest");
        rejections.assert_async().await;
        success.assert_async().await;
    }

    #[tokio::test]
    async fn test_exhausted_remote_is_not_retried_without_schema() {
        let mut server = Server::new_async().await;
        // 2 configured attempts, each a server error; the analyzer must not
        // issue a third, schema-less call.
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("down")
            .expect(2)
            .create_async()
            .await;

        let settings = test_settings(server.url());
        let analyzer = analyzer_for(&settings);
        let err = analyzer
            .analyze(&settings, &test_catalog(), "class T {}", "T", Mode::Check)
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::RemoteCallExhausted { attempts: 2, .. }));
        mock.assert_async().await;
    }
}
