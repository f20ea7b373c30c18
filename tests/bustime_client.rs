use std::time::Duration;

use busfeed::{BustimeClient, BustimeConfig, DataSource, FetchError};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::oneshot,
};

/// Поднимает HTTP-заглушку, отвечающую один раз заданным статусом и телом.
/// Возвращает адрес и строку запроса, которую прислал клиент.
async fn serve_once(
    status: &'static str,
    body: &'static str,
    delay: Duration,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let request = String::from_utf8_lossy(&request).into_owned();
        let _ = tx.send(request.lines().next().unwrap_or_default().to_string());

        tokio::time::sleep(delay).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    (addr, rx)
}

fn client(
    host: String,
    timeout: Duration,
) -> BustimeClient {
    BustimeClient::new(&BustimeConfig {
        host,
        key: "test-key".to_string(),
        scheme: "http".to_string(),
        request_timeout: timeout,
    })
    .unwrap()
}

/// Тест проверяет запрос к API и разбор ответа со списком машин.
#[tokio::test]
async fn test_fetches_vehicles() {
    let (addr, request) = serve_once(
        "200 OK",
        r#"{"bustime-response":{"vehicle":[{"vid":"1","rt":"9"},{"vid":"2","rt":"22"}]}}"#,
        Duration::ZERO,
    )
    .await;

    let snapshot = client(addr, Duration::from_secs(5)).load().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        serde_json::to_string(&snapshot).unwrap(),
        r#"[{"vid":"1","rt":"9"},{"vid":"2","rt":"22"}]"#
    );

    let request_line = request.await.unwrap();
    assert!(request_line.starts_with("GET /bustime/api/v3/getvehicles?"));
    assert!(request_line.contains("key=test-key"));
    assert!(request_line.contains("tmres=s"));
    assert!(request_line.contains("rtpidatafeed=bustime"));
    assert!(request_line.contains("format=json"));
}

#[tokio::test]
async fn test_non_200_is_status_error() {
    let (addr, _) = serve_once("503 Service Unavailable", "{}", Duration::ZERO).await;
    let err = client(addr, Duration::from_secs(5)).load().await.unwrap_err();
    assert_eq!(err, FetchError::Status { status: 503 });
}

#[tokio::test]
async fn test_bad_body_is_decode_error() {
    let (addr, _) = serve_once("200 OK", "<html>maintenance</html>", Duration::ZERO).await;
    let err = client(addr, Duration::from_secs(5)).load().await.unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
}

/// Тест проверяет, что зависший API превращается в ошибку таймаута, а не
/// блокирует опрос.
#[tokio::test]
async fn test_slow_upstream_times_out() {
    let (addr, _) = serve_once("200 OK", "{}", Duration::from_secs(5)).await;
    let err = client(addr, Duration::from_millis(200)).load().await.unwrap_err();
    assert_eq!(err, FetchError::Timeout);
}

/// Тест проверяет, что ошибка соединения не раскрывает ключ API.
#[tokio::test]
async fn test_connection_error_hides_key() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = client(addr, Duration::from_secs(2)).load().await.unwrap_err();
    assert!(matches!(err, FetchError::Request { .. }));
    assert!(!err.to_string().contains("test-key"));
}
