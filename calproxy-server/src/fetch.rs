//! Upstream feed fetching.

use std::time::Duration;

use anyhow::{bail, Result};

const ACCEPT_CALENDAR: &str = "text/calendar";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("calproxy/", env!("CARGO_PKG_VERSION")))
        .timeout(FETCH_TIMEOUT)
        .build()?)
}

/// GET the tenant's source URL. Any transport error or non-2xx status is an
/// upstream-unreachable condition; the caller decides whether a last-known-
/// good snapshot can stand in.
pub async fn fetch_ics(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .header(reqwest::header::ACCEPT, ACCEPT_CALENDAR)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        bail!("upstream returned HTTP {status}");
    }

    Ok(response.text().await?)
}
