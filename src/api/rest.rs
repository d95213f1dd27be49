//! HTTP query API
//!
//! * `GET /1/queries/count/<prefix>` returns `{"count": n}`
//! * `GET /1/queries/popular/<prefix>?size=N` returns
//!   `{"queries": [{"query": q, "count": c}, ...]}`
//!
//! The prefix is the percent-decoded rest of the path and may be empty.
//! A `size` above the index's `k_max` is capped rather than rejected.

use crate::db::QueryLogDB;
use crate::error::{Error, Result};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode, Uri};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use tracing::{debug, info};

pub const COUNT_QUERY_PATH: &str = "/1/queries/count/";
pub const TOP_QUERY_PATH: &str = "/1/queries/popular/";
pub const TOP_QUERY_SIZE_PARAM: &str = "size";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Answer one request against the database
pub fn route(db: &QueryLogDB, method: &Method, uri: &Uri) -> Response<Body> {
    let path = uri.path();

    let (is_count, raw_prefix) = if let Some(rest) = path.strip_prefix(COUNT_QUERY_PATH) {
        (true, rest)
    } else if let Some(rest) = path.strip_prefix(TOP_QUERY_PATH) {
        (false, rest)
    } else {
        return error_response(StatusCode::NOT_FOUND, format!("No route for {}", path));
    };

    if *method != Method::GET {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} is not allowed", method),
        );
    }

    let prefix = match percent_decode_str(raw_prefix).decode_utf8() {
        Ok(prefix) => prefix,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "The date prefix is not valid UTF-8".to_string(),
            )
        }
    };

    if is_count {
        return json_response(StatusCode::OK, &db.distinct_queries(&prefix));
    }

    match size_param(uri) {
        Some(size) => json_response(StatusCode::OK, &db.popular_queries(&prefix, size)),
        None => error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "The '{}' query string parameter is missing or invalid",
                TOP_QUERY_SIZE_PARAM
            ),
        ),
    }
}

/// `size` must be a non-negative integer
fn size_param(uri: &Uri) -> Option<usize> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOP_QUERY_SIZE_PARAM)
        .and_then(|(_, value)| {
            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                value.parse().ok()
            } else {
                None
            }
        })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            let mut response = Response::new(Body::from(e.to_string()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response<Body> {
    json_response(status, &ErrorBody { error: message })
}

async fn handle(
    db: Arc<QueryLogDB>,
    req: Request<Body>,
) -> std::result::Result<Response<Body>, Infallible> {
    let response = route(&db, req.method(), req.uri());
    debug!(
        method = %req.method(),
        uri = %req.uri(),
        status = response.status().as_u16(),
        "Handled request"
    );
    Ok(response)
}

/// Serve the API on `addr` until `shutdown` completes
pub async fn serve<F>(db: Arc<QueryLogDB>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(addr)
        .map_err(|e| Error::Network(format!("failed to bind {}: {}", addr, e)))?;
    serve_listener(db, listener, shutdown).await
}

/// Serve the API on an already bound listener until `shutdown` completes
pub async fn serve_listener<F>(
    db: Arc<QueryLogDB>,
    listener: TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    let make_svc = make_service_fn(move |_conn| {
        let db = db.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(db.clone(), req))) }
    });

    let server = Server::from_tcp(listener)?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown);

    info!(%addr, "Starting httpd");
    server.await?;
    info!("Stopping httpd");
    Ok(())
}
