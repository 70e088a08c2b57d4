//! IP geolocation lookups against the ip-api.com JSON API.
use anyhow::Context;
use itertools::Itertools;
use log::debug;
use serde_derive::{Deserialize, Serialize};
use std::fmt::Write;
use std::net::IpAddr;
use std::time::Duration;

use crate::input::OutputFormat;

/// Public free-tier endpoint, limited to 45 requests per minute.
pub const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json";

const REQUESTED_FIELDS: &str = "status,message,query,country,countryCode,regionName,city,lat,lon,isp,org,as,timezone,mobile,proxy,hosting";
const RULE_WIDTH: usize = 50;

/// Geolocation record as returned by the API. Every field is optional
/// because a failed lookup only carries `status` and `message`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// Autonomous system, e.g. `AS15169 Google LLC`.
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosting: Option<bool>,
}

impl GeoInfo {
    /// True when the API answered with `"status": "fail"`.
    pub fn is_failure(&self) -> bool {
        self.status.as_deref() == Some("fail")
    }

    fn failure_message(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }

    /// `(label, api key, value)` for every displayed field, in display order.
    fn columns(&self) -> [(&'static str, &'static str, Option<String>); 14] {
        fn text(value: Option<&String>) -> Option<String> {
            value.cloned()
        }
        fn show<T: ToString>(value: Option<T>) -> Option<String> {
            value.map(|v| v.to_string())
        }

        [
            ("IP Address", "query", text(self.query.as_ref())),
            ("Country", "country", text(self.country.as_ref())),
            ("Country Code", "countryCode", text(self.country_code.as_ref())),
            ("Region", "regionName", text(self.region_name.as_ref())),
            ("City", "city", text(self.city.as_ref())),
            ("Latitude", "lat", show(self.lat)),
            ("Longitude", "lon", show(self.lon)),
            ("ISP", "isp", text(self.isp.as_ref())),
            ("Organization", "org", text(self.org.as_ref())),
            ("AS", "as", text(self.asn.as_ref())),
            ("Timezone", "timezone", text(self.timezone.as_ref())),
            ("Mobile", "mobile", show(self.mobile)),
            ("Proxy", "proxy", show(self.proxy)),
            ("Hosting", "hosting", show(self.hosting)),
        ]
    }

    /// Renders the record in `format`.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(self.render_text()),
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Csv => Ok(self.render_csv()),
        }
    }

    /// Banner and one dotted row per field, `N/A` for missing values.
    pub fn render_text(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = format!("\n[*] IP Geolocation Information\n{rule}\n");
        if self.is_failure() {
            let _ = writeln!(out, "[!] Error: {}", self.failure_message());
            return out;
        }

        for (label, _, value) in self.columns() {
            let _ = writeln!(out, "  {label:.<20} {}", value.as_deref().unwrap_or("N/A"));
        }
        let _ = writeln!(out, "{rule}");
        out
    }

    /// Header of API field names and one value row.
    pub fn render_csv(&self) -> String {
        if self.is_failure() {
            return format!("Error,{}\n", csv_escape(self.failure_message()));
        }

        let columns = self.columns();
        let header = columns.iter().map(|(_, key, _)| *key).join(",");
        let values = columns
            .iter()
            .map(|(_, _, value)| csv_escape(value.as_deref().unwrap_or_default()))
            .join(",");
        format!("{header}\n{values}\n")
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

/// HTTP client for the geolocation API.
#[derive(Debug, Clone)]
pub struct GeoClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GeoClient {
    /// Client for `endpoint` (see [`DEFAULT_ENDPOINT`]) with a request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lmv-modules/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Could not build the HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        })
    }

    /// Fetches the record for `ip`.
    ///
    /// An API-level failure (`"status": "fail"`) is a successful lookup; only
    /// transport, HTTP status and decoding problems are errors.
    pub async fn lookup(&self, ip: IpAddr) -> anyhow::Result<GeoInfo> {
        let url = format!("{}/{ip}", self.endpoint);
        debug!("Requesting geolocation from {url}");

        let response = self
            .client
            .get(&url)
            .query(&[("fields", REQUESTED_FIELDS)])
            .send()
            .await
            .with_context(|| format!("Network error contacting {url}"))?
            .error_for_status()
            .context("Geolocation API returned an error status")?;

        let info = response
            .json::<GeoInfo>()
            .await
            .context("Unexpected response from the geolocation API")?;
        debug!("Geolocation status {:?}", info.status);

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const GOOGLE: &str = r#"{
        "status": "success",
        "country": "United States",
        "countryCode": "US",
        "regionName": "Virginia",
        "city": "Ashburn",
        "lat": 39.03,
        "lon": -77.5,
        "timezone": "America/New_York",
        "isp": "Google LLC",
        "org": "Google Public DNS",
        "as": "AS15169 Google LLC",
        "mobile": false,
        "proxy": false,
        "hosting": true,
        "query": "8.8.8.8"
    }"#;

    const FAILED: &str = r#"{"status":"fail","message":"private range","query":"10.0.0.1"}"#;

    /// Serves one canned HTTP response and hands back the request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/json", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_owned()
        });

        (endpoint, handle)
    }

    #[test]
    fn decodes_api_record() {
        let info: GeoInfo = serde_json::from_str(GOOGLE).unwrap();

        assert!(!info.is_failure());
        assert_eq!(info.country_code.as_deref(), Some("US"));
        assert_eq!(info.asn.as_deref(), Some("AS15169 Google LLC"));
        assert_eq!(info.hosting, Some(true));
    }

    #[test]
    fn text_rows_use_dotted_labels() {
        let info: GeoInfo = serde_json::from_str(GOOGLE).unwrap();
        let text = info.render_text();

        assert!(text.contains("[*] IP Geolocation Information"));
        assert!(text.contains("  IP Address.......... 8.8.8.8\n"));
        assert!(text.contains("  Longitude........... -77.5\n"));
        assert!(text.contains("  Hosting............. true\n"));
    }

    #[test]
    fn missing_fields_show_placeholders() {
        let info = GeoInfo {
            status: Some("success".to_owned()),
            query: Some("1.1.1.1".to_owned()),
            ..GeoInfo::default()
        };

        assert!(info.render_text().contains("  City................ N/A\n"));
        assert!(info.render_csv().ends_with("\n1.1.1.1,,,,,,,,,,,,,\n"));
    }

    #[test]
    fn csv_quotes_commas() {
        let info: GeoInfo = serde_json::from_str(GOOGLE).unwrap();
        let csv = info.render_csv();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next(),
            Some("query,country,countryCode,regionName,city,lat,lon,isp,org,as,timezone,mobile,proxy,hosting")
        );
        assert_eq!(
            lines.next(),
            Some("8.8.8.8,United States,US,Virginia,Ashburn,39.03,-77.5,Google LLC,Google Public DNS,AS15169 Google LLC,America/New_York,false,false,true")
        );
        assert_eq!(csv_escape("Acme, Inc."), "\"Acme, Inc.\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn failures_render_the_message() {
        let info: GeoInfo = serde_json::from_str(FAILED).unwrap();

        assert!(info.is_failure());
        let banner = format!("\n[*] IP Geolocation Information\n{}\n", "=".repeat(50));
        assert_eq!(
            info.render_text(),
            format!("{banner}[!] Error: private range\n")
        );
        assert_eq!(info.render_csv(), "Error,private range\n");
    }

    #[test]
    fn json_omits_missing_fields() {
        let info: GeoInfo = serde_json::from_str(FAILED).unwrap();
        let json = info.render(OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["status"], "fail");
        assert!(value.get("country").is_none());
    }

    #[tokio::test]
    async fn lookup_requests_the_address() {
        let (endpoint, server) = serve_once("200 OK", GOOGLE).await;
        let client = GeoClient::new(&endpoint, Duration::from_secs(5)).unwrap();

        let info = client.lookup("8.8.8.8".parse().unwrap()).await.unwrap();
        let request_line = server.await.unwrap();

        assert_eq!(info.city.as_deref(), Some("Ashburn"));
        assert!(request_line.starts_with("GET /json/8.8.8.8?fields=status%2Cmessage"));
    }

    #[tokio::test]
    async fn api_failure_is_not_an_error() {
        let (endpoint, _server) = serve_once("200 OK", FAILED).await;
        let client = GeoClient::new(&endpoint, Duration::from_secs(5)).unwrap();

        let info = client.lookup("10.0.0.1".parse().unwrap()).await.unwrap();

        assert!(info.is_failure());
    }

    #[tokio::test]
    async fn http_errors_are_errors() {
        let (endpoint, _server) = serve_once("500 Internal Server Error", "{}").await;
        let client = GeoClient::new(&endpoint, Duration::from_secs(5)).unwrap();

        assert!(client.lookup("8.8.8.8".parse().unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/json", listener.local_addr().unwrap());
        drop(listener);
        let client = GeoClient::new(&endpoint, Duration::from_secs(2)).unwrap();

        let err = client.lookup("8.8.8.8".parse().unwrap()).await.unwrap_err();

        assert!(err.to_string().contains("Network error"));
    }
}
