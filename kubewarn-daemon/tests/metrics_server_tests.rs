//! Metrics exporter configuration tests.

use kubewarn_core::config::MetricsConfig;
use kubewarn_daemon::metrics_server;

fn metrics_config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port,
        endpoint: endpoint.to_owned(),
    }
}

#[test]
fn test_metrics_addr_combines_ip_and_port() {
    let addr = metrics_server::metrics_addr(&metrics_config("127.0.0.1", 19100, "/metrics"))
        .expect("valid address");
    assert_eq!(addr.to_string(), "127.0.0.1:19100");
}

#[test]
fn test_metrics_addr_accepts_ipv6() {
    let addr = metrics_server::metrics_addr(&metrics_config("[::1]", 9100, "/metrics"))
        .expect("valid address");
    assert!(addr.is_ipv6());
}

#[test]
fn test_metrics_addr_rejects_invalid_ip() {
    let result = metrics_server::metrics_addr(&metrics_config("999.999.999.999", 9100, "/metrics"));
    assert!(result.is_err());
}

#[test]
fn test_metrics_addr_rejects_unsupported_endpoint() {
    let err = metrics_server::metrics_addr(&metrics_config("127.0.0.1", 9100, "/custom"))
        .unwrap_err()
        .to_string();
    assert!(err.contains("unsupported metrics endpoint"), "got: {err}");
}

#[tokio::test]
async fn test_install_metrics_recorder_serves_scrapes() {
    // Given: A valid configuration on a free port
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = metrics_config("127.0.0.1", port, "/metrics");

    // When: Installing the recorder and recording a metric
    metrics_server::install_metrics_recorder(&config).expect("recorder should install");
    metrics::counter!(kubewarn_core::metrics::INGEST_EVENTS_INSERTED_TOTAL).increment(1);

    // Then: The exporter answers scrapes with the metric
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let mut body = String::new();
    for _ in 0..50 {
        if let Ok(response) = client
            .get(format!("http://127.0.0.1:{port}/metrics"))
            .send()
            .await
        {
            body = response.text().await.unwrap();
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(
        body.contains("kubewarn_ingest_events_inserted_total"),
        "scrape body: {body}"
    );
}
