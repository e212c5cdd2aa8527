use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::{collections::HashMap, convert::Infallible, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use window_stats::{Granularity, StatsError};

use crate::db::StatsData;

pub async fn run_http_server(
    address: String,
    stats: Arc<StatsData>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(&address).await?;
    info!("HTTP query API listening on http://{}", address);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let stats = stats.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let stats = stats.clone();
                async move { handle_request(req, stats).await }
            });

            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    stats: Arc<StatsData>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let query = req.uri().query().unwrap_or("").to_string();
    let response = route(req.method(), req.uri().path(), &query, &stats).await;
    Ok(response)
}

/// Dispatch a request to its endpoint.
pub async fn route(
    method: &Method,
    path: &str,
    query: &str,
    stats: &StatsData,
) -> Response<Full<Bytes>> {
    if *method != Method::GET {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "error": "method not allowed" }),
        );
    }

    let params = parse_query(query);
    let result = match path {
        "/health" => Ok(serve_health(stats)),
        "/api/stats" => serve_range_stats(stats, &params).await,
        "/api/bucket" => serve_bucket(stats, &params).await,
        "/api/range" => serve_bucket_range(stats, &params).await,
        "/api/count" => serve_bucket_count(stats, &params).await,
        _ => return json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" })),
    };

    match result {
        Ok(response) => response,
        Err(e) => error_response(path, e),
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(path: &str, e: StatsError) -> Response<Full<Bytes>> {
    let status = match e {
        StatsError::InvalidInput(_) | StatsError::OutOfOrder { .. } => {
            warn!("Rejected request to {}: {}", path, e);
            StatusCode::BAD_REQUEST
        }
        StatsError::StorageUnavailable(_) | StatsError::Io(_) => {
            error!("Storage failure serving {}: {}", path, e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    json_response(status, json!({ "error": e.to_string() }))
}

/// Split a raw query string into percent-decoded key/value pairs.
fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn required<'a>(params: &'a HashMap<String, String>, key: &str) -> Result<&'a str, StatsError> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| StatsError::InvalidInput(format!("missing query parameter: {key}")))
}

fn required_u64(params: &HashMap<String, String>, key: &str) -> Result<u64, StatsError> {
    let raw = required(params, key)?;
    raw.parse::<u64>()
        .map_err(|_| StatsError::InvalidInput(format!("invalid {key}: {raw}")))
}

fn required_granularity(params: &HashMap<String, String>) -> Result<Granularity, StatsError> {
    required(params, "granularity")?.parse()
}

fn serve_health(stats: &StatsData) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        json!({
            "healthy": true,
            "ingested": stats.ingested_count(),
            "rejected": stats.rejected_count(),
        }),
    )
}

async fn serve_range_stats(
    stats: &StatsData,
    params: &HashMap<String, String>,
) -> Result<Response<Full<Bytes>>, StatsError> {
    let subject = required(params, "subject")?;
    let start = required_u64(params, "start")?;
    let end = required_u64(params, "end")?;

    let window = stats.index().query(subject, start, end).await?;
    Ok(json_response(
        StatusCode::OK,
        json!({
            "subject": subject,
            "start": start,
            "end": end,
            "stats": window,
            "mean": window.mean(),
        }),
    ))
}

async fn serve_bucket(
    stats: &StatsData,
    params: &HashMap<String, String>,
) -> Result<Response<Full<Bytes>>, StatsError> {
    let subject = required(params, "subject")?;
    let granularity = required_granularity(params)?;
    let bucket = required_u64(params, "bucket")?;

    let response = match stats.index().point_query(subject, granularity, bucket).await? {
        Some(window) => json_response(
            StatusCode::OK,
            json!({
                "subject": subject,
                "granularity": granularity,
                "bucket": bucket,
                "stats": window,
            }),
        ),
        None => json_response(
            StatusCode::NOT_FOUND,
            json!({ "error": "no data for bucket" }),
        ),
    };
    Ok(response)
}

async fn serve_bucket_range(
    stats: &StatsData,
    params: &HashMap<String, String>,
) -> Result<Response<Full<Bytes>>, StatsError> {
    let subject = required(params, "subject")?;
    let granularity = required_granularity(params)?;
    let start = required_u64(params, "start")?;
    let end = required_u64(params, "end")?;

    let buckets = stats
        .index()
        .range(subject, granularity, start, end)
        .await?;
    let data: Vec<_> = buckets
        .into_iter()
        .map(|(bucket, window)| json!({ "bucket": bucket, "stats": window }))
        .collect();

    Ok(json_response(StatusCode::OK, json!({ "data": data })))
}

async fn serve_bucket_count(
    stats: &StatsData,
    params: &HashMap<String, String>,
) -> Result<Response<Full<Bytes>>, StatsError> {
    let subject = required(params, "subject")?;
    let granularity = required_granularity(params)?;
    let start = required_u64(params, "start")?;
    let end = required_u64(params, "end")?;

    let count = stats
        .index()
        .count_buckets(subject, granularity, start, end)
        .await?;
    Ok(json_response(StatusCode::OK, json!({ "count": count })))
}
