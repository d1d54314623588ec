use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use legal_assistant_core::testing::{RunStep, ScriptedAssistantsApi, ScriptedSearch};
use legal_assistant_core::{AssistantSpec, RunOptions};
use legal_assistant_runtime::Relay;
use legal_assistant_runtime::web::{AppState, router};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const DEPOSIT_REPLY: &str = "Your landlord must return the deposit within 21 days. \
     See https://www.courts.ca.gov/1256.htm for details.";

fn app(api: ScriptedAssistantsApi) -> (axum::Router, Arc<ScriptedAssistantsApi>) {
    let api = Arc::new(api);
    let relay = Relay::new(
        api.clone(),
        Arc::new(ScriptedSearch::new("[]")),
        AssistantSpec::legal_expert("gpt-4o").unwrap(),
        RunOptions::default(),
    );
    let state = AppState::new(Arc::new(relay), CancellationToken::new()).unwrap();
    (router(state), api)
}

fn ask(query: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ask")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("query={}", query.replace(' ', "+"))))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_index_renders_empty_page() {
    let (app, api) = app(ScriptedAssistantsApi::new());

    let response = app.oneshot(index()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(browser_cookie(&response).starts_with("legal_assistant_browser="));
    let page = body_text(response).await;
    assert!(page.contains("<title>AI Legal Assistant</title>"));
    assert!(page.contains("name=\"query\""));
    assert!(page.contains("Ask a legal question to get started."));
    assert_eq!(api.calls().create_assistant, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ask_renders_reply_with_sources() {
    let (app, _api) = app(ScriptedAssistantsApi::new()
        .with_script(vec![RunStep::search_call("call_1", "security deposit return California")])
        .with_reply(DEPOSIT_REPLY));

    let response = app
        .oneshot(ask("How long does my landlord have to return my deposit"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("How long does my landlord have to return my deposit"));
    assert!(page.contains("Your landlord must return the deposit within 21 days."));
    assert!(page.contains("class=\"sources\""));
    assert!(page.contains("www.courts.ca.gov"));
    assert!(!page.contains("role=\"alert\""));
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_shows_error() {
    let (app, api) = app(ScriptedAssistantsApi::new().with_script(vec![RunStep::Failed(
        "Rate limit reached for gpt-4o".to_string(),
    )]));

    let response = app.oneshot(ask("Can I appeal a parking ticket")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("role=\"alert\""));
    assert!(page.contains("Rate limit reached for gpt-4o"));
    assert_eq!(api.calls().list_messages, 0);
}

#[tokio::test]
async fn test_blank_query_shows_error() {
    let (app, api) = app(ScriptedAssistantsApi::new());

    let response = app.oneshot(ask("   ")).await.unwrap();

    let page = body_text(response).await;
    assert!(page.contains("Invalid query"));
    assert_eq!(api.calls().create_thread, 0);
}

/// The `name=value` part of the cookie the page hands out
fn browser_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn from_browser(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    request
}

fn index() -> Request<Body> {
    Request::builder().uri("/").body(Body::empty()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_reset_starts_fresh_session() {
    let (app, api) = app(ScriptedAssistantsApi::new());

    let response = app.clone().oneshot(ask("What is a tort")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = browser_cookie(&response);

    let response = app
        .clone()
        .oneshot(from_browser(
            Request::builder()
                .method("POST")
                .uri("/reset")
                .body(Body::empty())
                .unwrap(),
            &cookie,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let page = body_text(app.clone().oneshot(from_browser(index(), &cookie)).await.unwrap()).await;
    assert!(!page.contains("What is a tort"));

    app.oneshot(from_browser(ask("What is negligence"), &cookie))
        .await
        .unwrap();
    assert_eq!(api.calls().create_assistant, 2);
    assert_eq!(api.threads_created().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_browsers_keep_separate_conversations() {
    let (app, api) = app(ScriptedAssistantsApi::new());

    let first = app.clone().oneshot(ask("Is my landlord allowed to enter")).await.unwrap();
    let alice = browser_cookie(&first);
    let second = app.clone().oneshot(ask("Can I contest a will")).await.unwrap();
    let bob = browser_cookie(&second);
    assert_ne!(alice, bob);

    let alice_page = body_text(app.clone().oneshot(from_browser(index(), &alice)).await.unwrap()).await;
    assert!(alice_page.contains("Is my landlord allowed to enter"));
    assert!(!alice_page.contains("Can I contest a will"));

    app.clone()
        .oneshot(from_browser(
            Request::builder()
                .method("POST")
                .uri("/reset")
                .body(Body::empty())
                .unwrap(),
            &alice,
        ))
        .await
        .unwrap();

    let bob_page = body_text(app.oneshot(from_browser(index(), &bob)).await.unwrap()).await;
    assert!(bob_page.contains("Can I contest a will"));
    assert_eq!(api.calls().create_assistant, 2);
}
