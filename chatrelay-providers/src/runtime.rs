use crate::request::{Body, HttpRequest};
use anyhow::{Context, anyhow};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Failures before a status line was received.
///
/// Callers need to tell "the network is not there" apart from everything else.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("network unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn classify(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout
    } else if e.is_connect() {
        HttpError::Unreachable(e.to_string())
    } else {
        HttpError::Other(anyhow::Error::new(e).context("http request failed"))
    }
}

pub async fn execute(req: &HttpRequest) -> Result<HttpResponse, HttpError> {
    // Important: without an explicit timeout a dead webhook leaves the
    // typing placeholder on screen forever.
    execute_with_timeouts(req, Duration::from_secs(10), Duration::from_secs(60)).await
}

pub async fn execute_with_timeouts(
    req: &HttpRequest,
    connect_timeout: Duration,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    let client = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .build()
        .context("build http client")?;

    let mut headers = HeaderMap::new();
    for (k, v) in &req.headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .with_context(|| format!("invalid header name: {k}"))?;
        let value =
            HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
        headers.insert(name, value);
    }

    let builder = match req.method.as_str() {
        "GET" => client.get(&req.url),
        "POST" => client.post(&req.url),
        other => return Err(anyhow!("unsupported method: {other}").into()),
    }
    .headers(headers);

    let builder = match &req.body {
        Body::Empty => builder,
        Body::Json(s) => builder.body(s.clone()),
    };

    let resp = builder.send().await.map_err(classify)?;
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.bytes().await.map_err(classify)?.to_vec();

    Ok(HttpResponse {
        status,
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_status_and_body_without_judging_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;

        let resp = execute(&HttpRequest::get(format!("{}/missing", server.uri())))
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
        assert_eq!(resp.body, b"nope");
    }

    #[tokio::test]
    async fn sends_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"output":"ok"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let req = HttpRequest {
            method: "POST".into(),
            url: format!("{}/hook", server.uri()),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Body::Json("{}".into()),
        };
        let resp = execute(&req).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };

        let err = execute(&HttpRequest::get(format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Unreachable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = execute_with_timeouts(
            &HttpRequest::get(server.uri()),
            Duration::from_secs(1),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HttpError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let req = HttpRequest {
            method: "PATCH".into(),
            ..HttpRequest::get("http://127.0.0.1:1/")
        };
        let err = execute(&req).await.unwrap_err();
        assert!(err.to_string().contains("unsupported method"));
    }
}
