use std::time::Duration;

use async_trait::async_trait;
use busfeed_error::FetchError;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{debug, info};

use super::{DataSource, VehicleSnapshot};

/// Путь метода, возвращающего положения машин.
const VEHICLES_PATH: &str = "/bustime/api/v3/getvehicles";

/// Таймаут HTTP-запроса по умолчанию.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Параметры подключения к BusTime API.
#[derive(Clone, PartialEq, Eq)]
pub struct BustimeConfig {
    /// Хост (и, при необходимости, порт) API
    pub host: String,
    /// Ключ доступа
    pub key: String,
    /// `https` в работе, `http` для локальных заглушек
    pub scheme: String,
    pub request_timeout: Duration,
}

/// Клиент BusTime API, возвращающий снимки машин.
#[derive(Clone)]
pub struct BustimeClient {
    http: reqwest::Client,
    url: Url,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "bustime-response", default)]
    response: BustimeResponse,
}

#[derive(Deserialize, Default)]
struct BustimeResponse {
    #[serde(default)]
    vehicle: Vec<Box<RawValue>>,
    #[serde(default)]
    error: Vec<Box<RawValue>>,
}

impl Default for BustimeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            key: String::new(),
            scheme: "https".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for BustimeConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BustimeConfig")
            .field("host", &self.host)
            .field("key", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl BustimeClient {
    /// Создаёт клиент. URL запроса собирается один раз.
    pub fn new(config: &BustimeConfig) -> Result<Self, FetchError> {
        let base = format!("{}://{}{}", config.scheme, config.host, VEHICLES_PATH);
        let url = Url::parse_with_params(
            &base,
            &[
                ("key", config.key.as_str()),
                ("tmres", "s"),
                ("rtpidatafeed", "bustime"),
                ("format", "json"),
            ],
        )
        .map_err(|e| FetchError::Request {
            reason: format!("invalid upstream url: {e}"),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(request_error)?;

        Ok(Self { http, url })
    }

    /// Адрес запроса без ключа, для логов.
    pub fn endpoint(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }
}

impl std::fmt::Debug for BustimeClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BustimeClient")
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

#[async_trait]
impl DataSource<VehicleSnapshot> for BustimeClient {
    async fn load(&self) -> Result<VehicleSnapshot, FetchError> {
        let response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        let snapshot = decode_vehicles(&body)?;
        info!(vehicles = snapshot.len(), "client fetched vehicles");
        Ok(snapshot)
    }
}

/// Разбирает ответ `getvehicles`.
///
/// Отсутствующий массив `vehicle` даёт пустой снимок. Ошибки, которые API
/// возвращает в массиве `error`, только логируются.
pub fn decode_vehicles(body: &[u8]) -> Result<VehicleSnapshot, FetchError> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        reason: e.to_string(),
    })?;

    for err in &envelope.response.error {
        debug!(error = err.get(), "upstream reported error");
    }

    Ok(VehicleSnapshot::new(envelope.response.vehicle))
}

/// URL содержит ключ API, поэтому он вырезается из текста ошибки.
fn request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Request {
            reason: err.without_url().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_vehicles() {
        let body = br#"{"bustime-response":{"vehicle":[{"vid":"8012","lat":"41.9"},{"vid":"8013"}]}}"#;
        let snapshot = decode_vehicles(body).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.iter().next().map(|v| v.get()),
            Some(r#"{"vid":"8012","lat":"41.9"}"#)
        );
    }

    /// Тест проверяет, что ответ без массива `vehicle` даёт пустой снимок,
    /// а не ошибку.
    #[test]
    fn test_missing_vehicles_is_empty_snapshot() {
        let body = br#"{"bustime-response":{"error":[{"msg":"No data found for parameter"}]}}"#;
        let snapshot = decode_vehicles(body).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_vehicles(b"<html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn test_url_is_built_once_with_params() {
        let client = BustimeClient::new(&BustimeConfig {
            host: "bustime.example.org".into(),
            key: "secret".into(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            client.url.as_str(),
            "https://bustime.example.org/bustime/api/v3/getvehicles?key=secret&tmres=s&rtpidatafeed=bustime&format=json"
        );
        assert_eq!(
            client.endpoint(),
            "https://bustime.example.org/bustime/api/v3/getvehicles"
        );
    }

    #[test]
    fn test_config_debug_hides_key() {
        let config = BustimeConfig {
            key: "secret".into(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("secret"));
    }
}
