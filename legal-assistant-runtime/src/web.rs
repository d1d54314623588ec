use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Form, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use legal_assistant_core::{Message, Session};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::relay::Relay;

const PAGE_TITLE: &str = "AI Legal Assistant";
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const BROWSER_COOKIE: &str = "legal_assistant_browser";

/// What one browser's page shows
struct ChatView {
    session: Session,
    last_error: Option<String>,
}

type SharedView = Arc<Mutex<ChatView>>;

// Shared application state
//
// Each browser gets its own view, keyed by the `legal_assistant_browser`
// cookie. A view only ever runs one turn at a time.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<Relay>,
    views: Arc<Mutex<HashMap<Uuid, SharedView>>>,
    templates: Arc<Environment<'static>>,
    // Cancelled on shutdown so an in-flight turn stops polling
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, shutdown: CancellationToken) -> Result<Self> {
        let mut templates = Environment::new();
        templates
            .add_template("index.html", INDEX_TEMPLATE)
            .context("Failed to load the page template")?;

        Ok(Self {
            relay,
            views: Arc::default(),
            templates: Arc::new(templates),
            shutdown,
        })
    }

    /// Looks up the caller's view, opening one for browsers seen for the first time.
    ///
    /// The returned id is `Some` when the browser has no cookie yet and must be
    /// sent one.
    async fn view_for(&self, headers: &HeaderMap) -> (Option<Uuid>, SharedView) {
        let (browser, fresh) = match browser_id(headers) {
            Some(id) => (id, None),
            None => {
                let id = Uuid::new_v4();
                (id, Some(id))
            }
        };

        let mut views = self.views.lock().await;
        let view = views
            .entry(browser)
            .or_insert_with(|| {
                debug!("Opening a view for browser {}", browser);
                Arc::new(Mutex::new(ChatView {
                    session: self.relay.new_session(),
                    last_error: None,
                }))
            })
            .clone();
        (fresh, view)
    }

    fn render(&self, view: &ChatView) -> Result<Html<String>, (StatusCode, String)> {
        let history: Vec<HistoryEntry> = view.session.history().iter().map(HistoryEntry::from).collect();
        self.templates
            .get_template("index.html")
            .and_then(|tmpl| {
                tmpl.render(context! {
                    title => PAGE_TITLE,
                    history => history,
                    error => view.last_error,
                })
            })
            .map(Html)
            .map_err(|e| {
                error!("Failed to render page: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Internal Server Error: {e}"))
            })
    }
}

fn browser_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(BROWSER_COOKIE)?.strip_prefix('='))
        .find_map(|id| Uuid::parse_str(id).ok())
}

/// Attaches the browser cookie when one was just issued
fn with_cookie(fresh: Option<Uuid>, response: impl IntoResponse) -> Response {
    match fresh {
        Some(id) => (
            [(
                header::SET_COOKIE,
                format!("{BROWSER_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax"),
            )],
            response,
        )
            .into_response(),
        None => response.into_response(),
    }
}

#[derive(Serialize)]
struct HistoryEntry<'a> {
    role: &'static str,
    content: &'a str,
    sources: Vec<String>,
}

impl<'a> From<&'a Message> for HistoryEntry<'a> {
    fn from(message: &'a Message) -> Self {
        let sources = if message.is_assistant() {
            message.cited_urls()
        } else {
            Vec::new()
        };
        Self {
            role: message.role.as_str(),
            content: &message.content,
            sources,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    pub query: String,
}

async fn index_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let (fresh, view) = state.view_for(&headers).await;
    let view = view.lock().await;
    Ok(with_cookie(fresh, state.render(&view)?))
}

async fn ask_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AskForm>,
) -> Result<Response, (StatusCode, String)> {
    let (fresh, view) = state.view_for(&headers).await;
    let mut view = view.lock().await;
    let cancel = state.shutdown.child_token();

    let outcome = state.relay.ask(&mut view.session, &form.query, &cancel).await;
    view.last_error = match outcome {
        Ok(reply) => {
            info!("Answered query on thread {}", reply.thread_id);
            None
        }
        Err(e) => {
            warn!("Turn ended with an error: {}", e);
            Some(e.to_string())
        }
    };
    Ok(with_cookie(fresh, state.render(&view)?))
}

async fn reset_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (fresh, view) = state.view_for(&headers).await;
    let mut view = view.lock().await;
    info!("Starting a new session, dropping {}", view.session.id());
    view.session = state.relay.new_session();
    view.last_error = None;
    with_cookie(fresh, Redirect::to("/"))
}

/// Routes for the chat page
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ask", post(ask_handler))
        .route("/reset", post(reset_handler))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Serves the chat page until `shutdown` is cancelled
pub async fn start_web_server(relay: Arc<Relay>, port: u16, shutdown: CancellationToken) -> Result<()> {
    let state = AppState::new(relay, shutdown.clone())?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Web server failed")?;

    Ok(())
}
