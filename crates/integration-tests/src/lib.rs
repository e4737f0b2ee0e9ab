// Shared helpers for the end-to-end scenarios

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Envelope with a plain string payload, mirroring the producer wire format.
pub fn string_message(id: &str) -> Vec<u8> {
    format!(
        r#"{{"job_id":"test-job-id-{id}","job_type":"test-job-type-1","payload":"{id}"}}"#
    )
    .into_bytes()
}

/// Envelope whose payload is a JSON-encoded string the handler re-parses.
pub fn map_message(id: &str) -> Vec<u8> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let payload = serde_json::json!({ "id": id, "timestamp": timestamp }).to_string();
    serde_json::json!({
        "job_id": format!("test-job-id-{id}"),
        "job_type": "test-job-type-1",
        "payload": payload,
    })
    .to_string()
    .into_bytes()
}

/// Poll a condition until it holds or the timeout elapses. Returns the final
/// evaluation so asserts read naturally.
pub async fn wait_until<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
