//! Coarse visitor location from the client IP

use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

pub const LOCAL_LOCATION: &str = "Local Development";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

#[derive(Debug, Default, Deserialize)]
struct LookupResponse {
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
}

impl LookupResponse {
    fn display(&self) -> String {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country_name]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Private, loopback, link-local and unparsable addresses are treated as local
pub fn is_local_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified(),
        Ok(IpAddr::V6(v6)) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
        }
        Err(_) => true,
    }
}

#[derive(Clone)]
pub struct GeoLocator {
    client: Client,
    endpoint: String,
}

impl GeoLocator {
    pub fn new(endpoint: &str) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// "City, Region, Country" for public addresses; never fails
    pub async fn locate(&self, ip: &str) -> String {
        if is_local_ip(ip) {
            return LOCAL_LOCATION.to_string();
        }

        match self.lookup(ip).await {
            Ok(data) => data.display(),
            Err(e) => {
                log::debug!("Location lookup for {} failed: {}", ip, e);
                UNKNOWN_LOCATION.to_string()
            }
        }
    }

    async fn lookup(&self, ip: &str) -> Result<LookupResponse, reqwest::Error> {
        self.client
            .get(format!("{}/{}/json/", self.endpoint, ip))
            .send()
            .await?
            .json::<LookupResponse>()
            .await
    }
}
