//! Keep-alive HTTP surface: a health check for the hosting platform plus
//! a few plain-text operator endpoints.

use std::sync::mpsc::Sender;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use color_eyre::Result;
use log::info;

use crate::watcher::{Command, SharedStatus};

#[derive(Clone)]
pub struct AppState {
    pub status: SharedStatus,
    pub control: Sender<Command>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/check", get(check))
        .route("/test", get(test))
        .route("/pause", get(pause))
        .route("/resume", get(resume))
        .route("/reset", get(reset))
        .route("/logs", get(logs))
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("keep-alive server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn index(State(state): State<AppState>) -> String {
    let status = state.status.lock().unwrap();
    let last_cycle = match (&status.last_cycle_at, &status.last_outcome) {
        (Some(at), Some(outcome)) => {
            format!("{} ({outcome})", at.format("%Y-%m-%d %H:%M:%S UTC"))
        }
        _ => "never".to_string(),
    };
    format!(
        "wantlist-tracker\n\n\
         state:          {}\n\
         policy:         {}\n\
         cycles:         {}\n\
         last cycle:     {}\n\
         releases:       {} tracked\n\
         seen listings:  {}\n\
         notifications:  {} sent\n",
        if status.paused { "paused" } else { "running" },
        status.policy,
        status.cycles,
        last_cycle,
        status.releases_tracked,
        status.seen_listings,
        status.notifications_sent,
    )
}

async fn check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    enqueue(&state, Command::PollNow)
}

async fn test(State(state): State<AppState>) -> (StatusCode, &'static str) {
    enqueue(&state, Command::SendTest)
}

async fn pause(State(state): State<AppState>) -> (StatusCode, &'static str) {
    enqueue(&state, Command::Pause)
}

async fn resume(State(state): State<AppState>) -> (StatusCode, &'static str) {
    enqueue(&state, Command::Resume)
}

async fn reset(State(state): State<AppState>) -> (StatusCode, &'static str) {
    enqueue(&state, Command::Reset)
}

async fn logs(State(state): State<AppState>) -> String {
    let status = state.status.lock().unwrap();
    if status.recent.is_empty() {
        return "no events yet\n".to_string();
    }
    let mut out = String::new();
    for line in &status.recent {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn enqueue(state: &AppState, command: Command) -> (StatusCode, &'static str) {
    match state.control.send(command) {
        Ok(()) => (StatusCode::ACCEPTED, "queued\n"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "watcher is not running\n"),
    }
}
