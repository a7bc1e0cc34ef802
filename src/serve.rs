//! HTTP surface for on-demand dumps.
//!
//! `GET /jvmdump` shows a confirm page; `GET /jvmdump?action=Dump` fires the
//! trigger and reports the outcome. `POST /api/dump` does the same for scripts.

use crate::config::DumpConfig;
use crate::signals::DumpRequestFailed;
use crate::trigger::{SignalTrigger, TriggerResult};
use axum::{
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    trigger: SignalTrigger,
    host: String,
    node: String,
}

pub async fn run(
    config: &DumpConfig,
    trigger: SignalTrigger,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(trigger, crate::config::host_name(), config.node_name());

    let addr = format!("{}:{}", config.serve.bind, config.serve.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("serve listening on {local_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

fn router(trigger: SignalTrigger, host: String, node: String) -> Router {
    let state = AppState {
        trigger,
        host,
        node,
    };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/dump", post(api_dump))
        .route("/jvmdump", get(dump_page))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

#[derive(Debug, Serialize)]
struct DumpResponse {
    ok: bool,
    error: Option<String>,
    os_error: Option<i64>,
}

impl From<&TriggerResult> for DumpResponse {
    fn from(result: &TriggerResult) -> Self {
        Self {
            ok: result.is_accepted(),
            error: result.failure().map(|f| f.to_string()),
            os_error: result.os_error(),
        }
    }
}

async fn api_dump(State(state): State<AppState>) -> (StatusCode, Json<DumpResponse>) {
    let result = fire(&state);
    let status = if result.is_accepted() {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    };
    (status, Json(DumpResponse::from(&result)))
}

#[derive(Debug, Deserialize)]
struct DumpQuery {
    action: Option<String>,
}

async fn dump_page(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<DumpQuery>,
) -> (StatusCode, Html<String>) {
    let path = uri.path();

    if query.action.as_deref() != Some("Dump") {
        let body = format!(
            "Request a thread dump to be sent to standard-out. \
             This is equivalent to a \"{}\".<p>\n\
             Confirm by pressing the \"Dump\" button below:\n{}",
            escape(state.trigger.gesture()),
            form(path)
        );
        return (StatusCode::BAD_REQUEST, Html(page(&state, &body)));
    }

    let result = fire(&state);
    match result.failure() {
        None => {
            let body = format!(
                "<b>SUCCESS:</b><p>\n\
                 The thread dump has been requested and will be written to standard-out.<p>\n\
                 Invoke another stack dump?<p>\n{}",
                form(path)
            );
            (StatusCode::OK, Html(page(&state, &body)))
        }
        Some(failure) => {
            let body = format!(
                "<b>ERROR:</b><p>\n\
                 The dump request was not accepted: {}.<p>\n\
                 {}<p>\n",
                escape(&failure.to_string()),
                failure_hint(failure)
            );
            (StatusCode::FORBIDDEN, Html(page(&state, &body)))
        }
    }
}

/// What an operator should check for a refused request on this platform.
fn failure_hint(failure: &DumpRequestFailed) -> &'static str {
    match failure {
        DumpRequestFailed::NoTarget { .. } => {
            "The process group of this node could not be resolved; \
             no signal was sent."
        }
        DumpRequestFailed::Rejected { .. } if cfg!(windows) => {
            "Check that this node is attached to a console; \
             CTRL-BREAK events only reach console process groups."
        }
        DumpRequestFailed::Rejected { .. } => {
            "The OS refused to signal the process group; check that this node \
             may send SIGQUIT to its own group (permissions, seccomp or \
             container signal policy)."
        }
    }
}

fn fire(state: &AppState) -> TriggerResult {
    let result = state.trigger.request_dump();
    if result.is_accepted() {
        tracing::info!(node = %state.node, "thread dump requested");
    } else {
        tracing::warn!(
            node = %state.node,
            os_error = ?result.os_error(),
            "thread dump request failed"
        );
    }
    result
}

fn page(state: &AppState, body: &str) -> String {
    let now = chrono::Local::now().format("%a %b %e %H:%M:%S %Z %Y");
    format!(
        "<html><head><title>{node} thread dump</title></head><body>\n\
         <h2>Thread dump</h2><p>\n\
         <table>\
         <tr><td><i>Host:</i></td><td>{host}</td></tr>\
         <tr><td><i>Node:</i></td><td>{node}</td></tr>\
         <tr><td><i>Date:</i></td><td>{now}</td></tr>\
         </table><p>\n\
         {body}</body></html>\n",
        node = escape(&state.node),
        host = escape(&state.host),
    )
}

fn form(action: &str) -> String {
    format!(
        "<form method=\"GET\" action=\"{}\">\n\
         <input type=\"submit\" name=\"action\" value=\"Dump\"><br>\n\
         </form>\n",
        escape(action)
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
