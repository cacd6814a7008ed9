//! The `FriendApi` seam and its reqwest implementation

use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ApiError, ApiResult};
use crate::model::{FriendRefresh, RefreshBody, RefreshRequest, CODE_QUOTA_EXCEEDED};

/// Public friend refresh endpoint
pub const DEFAULT_URL: &str = "https://api.arona.icu/api/friends/refresh";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of friend refresh responses
#[async_trait]
pub trait FriendApi: Send + Sync {
    /// Fetch the friend's assist list
    ///
    /// Code 4003 is reported as [`ApiError::QuotaExceeded`]. Other
    /// unsuccessful responses are returned as parsed so the caller decides
    /// how strict to be.
    async fn refresh(&self, request: &RefreshRequest) -> ApiResult<FriendRefresh>;
}

/// HTTP client for the arona.icu service
#[derive(Debug, Clone)]
pub struct AronaClient {
    client: Client,
}

impl AronaClient {
    pub fn new() -> ApiResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FriendApi for AronaClient {
    async fn refresh(&self, request: &RefreshRequest) -> ApiResult<FriendRefresh> {
        debug!(url = %request.url, usercode = %request.usercode, "Refreshing friend");

        let response = self
            .client
            .post(&request.url)
            // The service expects the bare token, no scheme
            .header(header::AUTHORIZATION, &request.access_token)
            .json(&RefreshBody {
                friend: &request.usercode,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        trace!(%status, %body, "Friend refresh response");

        let parsed = match serde_json::from_str::<FriendRefresh>(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(ApiError::Status(status.as_u16())),
            Err(e) => return Err(e.into()),
        };

        if parsed.code == CODE_QUOTA_EXCEEDED {
            return Err(ApiError::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(ApiError::Rejected {
                code: parsed.code,
                message: parsed.message,
            });
        }

        Ok(parsed)
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Http(e)
    }
}
