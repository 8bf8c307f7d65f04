//! End-to-end executor behavior against a scripted HTTP server.
//!
//! mockito cannot serve a different status per request, so these tests run a
//! small tokio TCP server that answers a fixed sequence of responses and
//! records the user-agent of every request it sees.

use fetchwave::{ApiClient, ApiRequest, Decoded, RetryPolicy, USER_AGENTS};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Serves the scripted `(status, body)` responses one connection at a time,
/// closing each connection so every attempt arrives on a fresh one. Returns
/// the base URL and the user-agent header seen on each request, in order.
async fn scripted_server(script: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let agents = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&agents);

    tokio::spawn(async move {
        for (status, body) in script {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                head.extend_from_slice(&chunk[..n]);
                if n == 0 || head.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }

            let head = String::from_utf8_lossy(&head);
            if let Some(line) = head
                .lines()
                .find(|l| l.to_ascii_lowercase().starts_with("user-agent:"))
            {
                seen.lock()
                    .await
                    .push(line["user-agent:".len()..].trim().to_string());
            }

            let reason = match status {
                200 => "OK",
                500 => "Internal Server Error",
                503 => "Service Unavailable",
                _ => "",
            };
            let response = format!(
                "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
    });

    (base, agents)
}

#[test_log::test(tokio::test)]
async fn retry_forever_returns_first_success() {
    let (base, agents) = scripted_server(vec![
        (503, ""),
        (500, "busted"),
        (200, r#"{"status": "recovered"}"#),
    ])
    .await;

    let client = ApiClient::with_policy(RetryPolicy::Forever);
    let start = Instant::now();
    let result = client
        .execute(&ApiRequest::get(&base, "/health"))
        .await
        .unwrap();

    // Two retries, no delay between them.
    assert_eq!(result, Decoded::Json(json!({"status": "recovered"})));
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(agents.lock().await.len(), 3);
}

#[test_log::test(tokio::test)]
async fn backoff_recovers_from_transient_503s() {
    let (base, agents) = scripted_server(vec![
        (503, ""),
        (503, ""),
        (200, r#"{"items": [1, 2]}"#),
    ])
    .await;

    let client = ApiClient::with_policy(RetryPolicy::Backoff {
        max_retries: 5,
        base_delay: Duration::from_millis(20),
    });

    let start = Instant::now();
    let result = client
        .execute(&ApiRequest::get(&base, "/items"))
        .await
        .unwrap();

    assert_eq!(result, Decoded::Json(json!({"items": [1, 2]})));

    // Two sleeps: 40ms then 80ms.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(120), "elapsed {:?}", elapsed);
    assert_eq!(agents.lock().await.len(), 3);
}

#[test_log::test(tokio::test)]
async fn user_agent_is_rerolled_from_the_pool_on_each_attempt() {
    let (base, agents) = scripted_server(vec![
        (503, ""),
        (503, ""),
        (503, ""),
        (200, "{}"),
    ])
    .await;

    let client = ApiClient::with_policy(RetryPolicy::Backoff {
        max_retries: 5,
        base_delay: Duration::from_millis(1),
    });

    client
        .execute(&ApiRequest::get(&base, "/items"))
        .await
        .unwrap();

    let seen = agents.lock().await;
    assert_eq!(seen.len(), 4);
    for agent in seen.iter() {
        assert!(
            USER_AGENTS.contains(&agent.as_str()),
            "unexpected user-agent: {}",
            agent
        );
    }
}

#[test_log::test(tokio::test)]
async fn multipart_body_decodes_to_fragments() {
    let (base, _) = scripted_server(vec![(
        200,
        "{\"page\": 1}\n&&&\n{\"page\": 2}\n&&&\n{\"page\": 3}",
    )])
    .await;

    let client = ApiClient::default();
    let result = client
        .execute(&ApiRequest::get(&base, "/pages"))
        .await
        .unwrap();

    assert_eq!(
        result,
        Decoded::Fragments(vec![
            json!({"page": 1}),
            json!({"page": 2}),
            json!({"page": 3})
        ])
    );
}

#[test_log::test(tokio::test)]
async fn plain_text_body_is_preserved() {
    let (base, _) = scripted_server(vec![(200, "maintenance page")]).await;

    let client = ApiClient::default();
    let result = client
        .execute(&ApiRequest::get(&base, "/status"))
        .await
        .unwrap();

    assert_eq!(result, Decoded::Text("maintenance page".to_string()));
}

#[test_log::test(tokio::test)]
async fn concurrent_calls_do_not_interfere() {
    let (base_a, _) = scripted_server(vec![(503, ""), (200, r#"{"who": "a"}"#)]).await;
    let (base_b, _) = scripted_server(vec![(200, r#"{"who": "b"}"#)]).await;

    let client = ApiClient::with_policy(RetryPolicy::Backoff {
        max_retries: 5,
        base_delay: Duration::from_millis(1),
    });

    let req_a = ApiRequest::get(&base_a, "/");
    let req_b = ApiRequest::get(&base_b, "/");
    let (a, b) = tokio::join!(client.execute(&req_a), client.execute(&req_b),);

    assert_eq!(a.unwrap(), Decoded::Json(json!({"who": "a"})));
    assert_eq!(b.unwrap(), Decoded::Json(json!({"who": "b"})));
}
