// Device REST client
//
// Wraps `reqwest::Client` with device URL construction and response
// checking. The secret header is injected by the client itself (see
// `TransportConfig::build_client`), so the request helpers stay plain.

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{FunctionPath, StateResponse, SummaryResponse};
use crate::transport::TransportConfig;

/// HTTP client for a single device's REST API.
///
/// The inner `reqwest::Client` is the transport session: one connection
/// pool shared by every request. Cloning a `DeviceClient` shares it.
#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DeviceClient {
    /// Create a client for `https://{host}` from a `TransportConfig`.
    pub fn new(host: &str, secret: &SecretString, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("https://{host}/"))?;
        let http = transport.build_client(secret)?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client` and an explicit
    /// base URL. The caller is responsible for the secret header.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Host portion of the base URL (`192.168.1.20`, `device.local:8443`).
    pub fn host(&self) -> String {
        match (self.base_url.host_str(), self.base_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => String::new(),
        }
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Structural description of the device.
    ///
    /// `GET /api/v1/summary`
    pub async fn summary(&self) -> Result<SummaryResponse, Error> {
        self.get(self.api_url("summary")?).await
    }

    /// Current value of every function.
    ///
    /// `GET /api/v1/state`
    pub async fn state(&self) -> Result<StateResponse, Error> {
        self.get(self.api_url("state")?).await
    }

    /// Issue a control request and return the device's echo.
    ///
    /// `POST /api/v1/command` with the body built by [`FunctionPath::command_body`].
    pub async fn command(&self, path: &FunctionPath, command: Value) -> Result<Value, Error> {
        debug!(%path, "sending command");
        let body = path.command_body(command);
        self.post(self.api_url("command")?, &body).await
    }

    /// Liveness probe. Returns the raw response text.
    ///
    /// `GET /ping`
    pub async fn ping(&self) -> Result<String, Error> {
        let resp = self.send(self.http.get(self.root_url("ping")?)).await?;
        resp.text().await.map_err(Error::Transport)
    }

    /// Flash the identification LED.
    ///
    /// `GET /blink`
    pub async fn blink(&self) -> Result<(), Error> {
        self.send(self.http.get(self.root_url("blink")?)).await?;
        Ok(())
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/v1/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(&format!("api/v1/{path}"))?)
    }

    /// `{base}/{path}`
    pub(crate) fn root_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.send(self.http.get(url)).await?;
        parse_json(resp).await
    }

    async fn post<T: DeserializeOwned>(&self, url: Url, body: &(impl Serialize + Sync)) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self.send(self.http.post(url).json(body)).await?;
        parse_json(resp).await
    }

    /// Send a request and map non-success statuses to errors.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let resp = builder.send().await.map_err(Error::Transport)?;
        let status = resp.status();
        trace!(%status, "device response");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "device rejected the secret key".into(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(resp)
    }
}

/// Read the body as text and decode it, keeping the raw text on failure.
async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = resp.text().await.map_err(Error::Transport)?;
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> DeviceClient {
        DeviceClient::with_client(reqwest::Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn api_url_joins_under_api_v1() {
        let c = client("https://192.168.1.20/");
        assert_eq!(c.api_url("summary").unwrap().as_str(), "https://192.168.1.20/api/v1/summary");
        assert_eq!(c.root_url("ping").unwrap().as_str(), "https://192.168.1.20/ping");
    }

    #[test]
    fn host_includes_explicit_port() {
        assert_eq!(client("http://127.0.0.1:8080/").host(), "127.0.0.1:8080");
        assert_eq!(client("https://device.local/").host(), "device.local");
    }
}
