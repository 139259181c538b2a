use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use nhi_collector::{AwsIamClient, CollectorError, DirectIamApi, IdentityCollector};
use nhi_domain::config::{AwsConfig, Config};
use nhi_domain::error::Result as DomainResult;
use nhi_gateway::api;
use nhi_gateway::state::{AppState, Collector, CollectorFactory};
use nhi_mcp_client::{McpClient, McpError, McpTransport};
use nhi_providers::{ChatRequest, ChatResponse, LlmProvider};
use serde_json::{json, Value};
use tower::ServiceExt;

// ── Fakes ────────────────────────────────────────────────────────────

/// Answers tool calls for a two-user account and counts closes.
struct AccountTransport {
    closes: Arc<Mutex<usize>>,
}

fn text(value: Value) -> std::result::Result<Value, McpError> {
    Ok(json!({"content": [{"type": "text", "text": value.to_string()}]}))
}

#[async_trait]
impl McpTransport for AccountTransport {
    async fn ensure_started(&mut self) -> std::result::Result<(), McpError> {
        Ok(())
    }

    async fn send_request(&mut self, method: &str, params: Value) -> std::result::Result<Value, McpError> {
        if method == "tools/list" {
            return Ok(json!({"tools": [
                {"name": "list_users"}, {"name": "list_roles"}, {"name": "list_groups"},
                {"name": "get_user", "inputSchema": {"required": ["user_name"]}}
            ]}));
        }
        let user = params["arguments"]["user_name"].as_str().unwrap_or_default();
        match params["name"].as_str().unwrap_or_default() {
            "list_users" => text(json!({"Users": [{"UserName": "alice"}, {"UserName": "bob"}]})),
            "list_roles" => text(json!({"Roles": [{"RoleName": "deployer"}]})),
            "list_groups" => text(json!({"Groups": []})),
            "get_user" if user == "alice" => text(json!({"User": {
                "UserName": "alice",
                "AccessKeys": [{"AccessKeyId": "AKIAALICE", "Status": "Active", "CreateDate": "2020-01-01T00:00:00Z"}]
            }})),
            "get_user" => text(json!({"User": {"UserName": user}})),
            "list_attached_user_policies" if user == "alice" => {
                text(json!({"AttachedPolicies": [{"PolicyName": "AdministratorAccess"}]}))
            }
            _ => text(json!({})),
        }
    }

    async fn close(&mut self) {
        *self.closes.lock().unwrap() += 1;
    }
}

/// Least-privilege path: returns the requested user with one key.
struct SelfOnly;

#[async_trait]
impl DirectIamApi for SelfOnly {
    async fn get_user(&self, user_name: &str) -> std::result::Result<Option<Value>, CollectorError> {
        Ok(Some(json!({"UserName": user_name})))
    }

    async fn list_access_keys(&self, user_name: &str) -> std::result::Result<Vec<Value>, CollectorError> {
        Ok(vec![json!({"AccessKeyId": format!("AKIA{user_name}"), "Status": "Active"})])
    }
}

#[derive(Default)]
struct Factory {
    closes: Arc<Mutex<usize>>,
    seen: Mutex<Vec<AwsConfig>>,
}

impl CollectorFactory for Factory {
    fn collector(&self, aws: &AwsConfig) -> Collector {
        self.seen.lock().unwrap().push(aws.clone());
        let transport: Box<dyn McpTransport> = Box::new(AccountTransport { closes: self.closes.clone() });
        IdentityCollector::new(AwsIamClient::new(McpClient::new(transport), Box::new(SelfOnly)))
    }
}

struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn chat(&self, req: &ChatRequest) -> DomainResult<ChatResponse> {
        let prompt = &req.messages[1].content;
        Ok(ChatResponse {
            content: format!("saw users: {}", prompt.contains("Users (2):")),
            model: req.model.clone().unwrap_or_default(),
            finish_reason: None,
        })
    }

    fn provider_id(&self) -> &str {
        "echo"
    }
}

fn state(factory: Arc<Factory>, llm: bool) -> AppState {
    let mut config = Config::default();
    config.aws.profile = Some("audit".into());
    AppState {
        config: Arc::new(config),
        collectors: factory,
        llm: llm.then(|| Arc::new(EchoProvider) as Arc<dyn LlmProvider>),
    }
}

async fn call(state: AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let app = api::router().with_state(state);
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_and_health() {
    let factory = Arc::new(Factory::default());
    let (status, body) = call(state(factory.clone(), false), "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "service": "NHI Agent API"}));

    let (_, health) = call(state(factory, false), "GET", "/api/health", None).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["aws_configured"], true);
    assert_eq!(health["openai_configured"], false);
}

#[tokio::test]
async fn collect_reports_counts_and_closes_session() {
    let factory = Arc::new(Factory::default());
    let (status, body) = call(state(factory.clone(), false), "POST", "/api/identities/collect", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["summary"],
        json!({"total_count": 4, "aws_users": 2, "aws_roles": 1, "aws_groups": 0, "aws_access_keys": 1})
    );
    assert_eq!(body["identities"]["aws"]["access_keys"][0]["UserName"], "alice");
    assert_eq!(*factory.closes.lock().unwrap(), 1);
}

#[tokio::test]
async fn search_lists_category() {
    let factory = Arc::new(Factory::default());
    let (status, body) = call(
        state(factory.clone(), false),
        "POST",
        "/api/identities/search",
        Some(json!({"query": "list all users"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["query"], "list all users");
    assert_eq!(body["results"][0]["title"], "alice");
    assert_eq!(body["results"][0]["type"], "aws");
    assert_eq!(*factory.closes.lock().unwrap(), 1);
}

#[tokio::test]
async fn search_uses_enrichment_for_admin_queries() {
    let factory = Arc::new(Factory::default());
    let (_, body) = call(
        state(factory, false),
        "POST",
        "/api/identities/search",
        Some(json!({"query": "who has admin access"})),
    )
    .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["results"][0]["status"], "admin");
}

#[tokio::test]
async fn secure_search_without_user_credentials_is_400() {
    let factory = Arc::new(Factory::default());
    let (status, body) = call(
        state(factory.clone(), false),
        "POST",
        "/api/identities/search",
        Some(json!({"query": "list users", "current_user": "nobody_7f3c", "secure_mode": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("AWS_USER_nobody_7f3c_KEY"));
    assert!(factory.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn secure_search_collects_only_the_user() {
    std::env::set_var("AWS_USER_carol_5e1a_KEY", "AKIACAROL");
    std::env::set_var("AWS_USER_carol_5e1a_SECRET", "secret");
    let factory = Arc::new(Factory::default());
    let (status, body) = call(
        state(factory.clone(), false),
        "POST",
        "/api/identities/search",
        Some(json!({"query": "show my access keys", "current_user": "carol_5e1a", "secure_mode": true})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["results"][0]["title"], "AKIAcarol_5e1a (carol_5e1a)");
    let seen = factory.seen.lock().unwrap();
    assert_eq!(seen[0].static_credentials(), Some(("AKIACAROL", "secret")));
    assert_eq!(seen[0].profile, None);
}

#[tokio::test]
async fn query_without_llm_is_500() {
    let factory = Arc::new(Factory::default());
    let (status, body) = call(
        state(factory.clone(), false),
        "POST",
        "/api/query",
        Some(json!({"query": "how many users?"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn query_answers_with_inventory_context() {
    let factory = Arc::new(Factory::default());
    let (status, body) = call(
        state(factory.clone(), true),
        "POST",
        "/api/query",
        Some(json!({"query": "how many users?", "model": "gpt-4o"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "saw users: true");
    assert_eq!(body["identities_summary"]["total"], 4);
    assert_eq!(body["identities_summary"]["aws"]["users"], 2);
    assert_eq!(*factory.closes.lock().unwrap(), 1);
}
