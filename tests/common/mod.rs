//! Shared utilities for integration testing: an in-process mock gateway.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use portal_client::ClientConfig;

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Accepts connections and closes them without answering. Returns the
/// address and the number of connections accepted so far.
pub async fn dropping_listener() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });
    (addr, accepted)
}

/// Client configuration pointing at `addr`, with short delays for tests.
pub fn config_for(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::with_base_url(format!("http://{}", addr));
    config.retries.base_delay_ms = 10;
    config.stream.reconnect_base_ms = 10;
    config.stream.reconnect_max_ms = 50;
    config
}

/// One canned reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Text(u16, &'static str),
    Raw {
        status: u16,
        content_type: &'static str,
        body: &'static str,
    },
    Slow(Duration, u16, Value),
}

/// What the mock saw of one request.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Replies are served in order; the last one repeats.
#[derive(Clone)]
pub struct Script {
    replies: Arc<Vec<Reply>>,
    hits: Arc<AtomicU32>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Script {
    pub fn new(replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty());
        Self {
            replies: Arc::new(replies),
            hits: Arc::new(AtomicU32::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Serve this script for every path and method.
    pub async fn start(&self) -> SocketAddr {
        serve(Router::new().fallback(scripted).with_state(self.clone())).await
    }
}

async fn scripted(
    State(script): State<Script>,
    method: Method,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let n = script.hits.fetch_add(1, Ordering::SeqCst) as usize;
    script.seen.lock().unwrap().push(Seen {
        method,
        path: uri.path().to_string(),
        headers,
        body,
    });

    let reply = script.replies[n.min(script.replies.len() - 1)].clone();
    match reply {
        Reply::Json(status, value) => (status_code(status), Json(value)).into_response(),
        Reply::Text(status, text) => {
            (status_code(status), [(CONTENT_TYPE, "text/plain")], text).into_response()
        }
        Reply::Raw {
            status,
            content_type,
            body,
        } => (status_code(status), [(CONTENT_TYPE, content_type)], body).into_response(),
        Reply::Slow(delay, status, value) => {
            tokio::time::sleep(delay).await;
            (status_code(status), Json(value)).into_response()
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap()
}

/// One push stream connection as the mock serves it.
#[derive(Debug, Clone)]
pub enum Feed {
    /// Send the frames, then end the body.
    Finite(&'static str),
    /// Send the frames, then keep the connection open.
    Hold(&'static str),
    /// Send `data: tick-N` every interval, forever.
    Ticker(Duration),
    /// Reply with a status and no stream.
    Status(u16),
    /// Reply 200 with the wrong content type.
    NotEventStream,
}

/// Push stream mock. Connection N gets feed N; the last one repeats.
#[derive(Clone)]
pub struct EventFeed {
    feeds: Arc<Vec<Feed>>,
    connections: Arc<AtomicU32>,
    last_event_ids: Arc<Mutex<Vec<Option<String>>>>,
}

impl EventFeed {
    pub fn new(feeds: Vec<Feed>) -> Self {
        assert!(!feeds.is_empty());
        Self {
            feeds: Arc::new(feeds),
            connections: Arc::new(AtomicU32::new(0)),
            last_event_ids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// `Last-Event-ID` sent with each connection, in order.
    pub fn last_event_ids(&self) -> Vec<Option<String>> {
        self.last_event_ids.lock().unwrap().clone()
    }

    pub async fn start(&self) -> SocketAddr {
        serve(Router::new().fallback(event_feed).with_state(self.clone())).await
    }
}

async fn event_feed(State(feed): State<EventFeed>, headers: HeaderMap) -> Response {
    let n = feed.connections.fetch_add(1, Ordering::SeqCst) as usize;
    feed.last_event_ids.lock().unwrap().push(
        headers
            .get("last-event-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let body = match feed.feeds[n.min(feed.feeds.len() - 1)].clone() {
        Feed::Finite(frames) => Body::from(frames),
        Feed::Hold(frames) => Body::from_stream(
            stream::once(async move { Ok::<_, Infallible>(Bytes::from_static(frames.as_bytes())) })
                .chain(stream::pending()),
        ),
        Feed::Ticker(interval) => Body::from_stream(stream::unfold(0u64, move |i| async move {
            tokio::time::sleep(interval).await;
            let frame = format!("data: tick-{}\n\n", i);
            Some((Ok::<_, Infallible>(Bytes::from(frame)), i + 1))
        })),
        Feed::Status(status) => return status_code(status).into_response(),
        Feed::NotEventStream => {
            return ([(CONTENT_TYPE, "application/json")], "{}").into_response();
        }
    };

    ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
