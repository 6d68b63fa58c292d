use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use url::Url;

use super::*;
use crate::API_SEGMENTS;
use crate::auth::Lease;

impl DotClient {
    /// Absolute URL of an API endpoint; segments are percent-encoded.
    pub(super) fn endpoint(&self, segments: &[&str]) -> Result<Url, DotError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DotError::Url(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(API_SEGMENTS)
            .extend(segments);
        Ok(url)
    }

    /// Send an authenticated request and return the response body.
    ///
    /// A 401 triggers one re-authentication and one retry. A second 401, or
    /// a failed re-authentication, is reported as [`DotError::Auth`]. A call
    /// whose lease already replaced an expired session has used its one
    /// re-authentication, so a 401 on it fails right away.
    pub(super) async fn authorized(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&[u8]>,
    ) -> Result<String, DotError> {
        let url = self.endpoint(segments)?;
        let lease = self.session.lease().await?;
        let (mut status, mut text) = self.send_once(&method, &url, body, &lease).await?;

        if status == StatusCode::UNAUTHORIZED && lease.reauthenticated {
            return Err(DotError::Auth(format!(
                "fresh session rejected after re-authentication: {text}"
            )));
        }
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %url, "Got 401, re-authenticating and retrying once");
            let lease = self.session.reauthenticate(lease.generation).await?;
            (status, text) = self.send_once(&method, &url, body, &lease).await?;

            if status == StatusCode::UNAUTHORIZED {
                return Err(DotError::Auth(format!(
                    "credentials rejected after re-authentication: {text}"
                )));
            }
        }

        if !status.is_success() {
            return Err(DotError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        tracing::debug!(%method, url = %url, status = status.as_u16(), "Dot API call succeeded");
        Ok(text)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
        lease: &Lease,
    ) -> Result<(StatusCode, String), DotError> {
        let mut req = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&lease.bearer);
        if let Some(bytes) = body {
            req = req
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.to_vec());
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        Ok((status, text))
    }
}
