//! Reporting API configuration
//!
//! Deployments of the same reporting service disagree on query parameter names,
//! most visibly for the window bounds. Every name the fetcher sends is therefore
//! configuration rather than code.
//!
//! # Window parameter conventions
//!
//! - **Updated range**: `updated_after` / `updated_before` (filters on last update)
//! - **Date range**: `start_date` / `end_date` (filters on request creation)

use reqwest::Url;
use std::borrow::Cow;
use std::str::FromStr;

/// Default Open311 endpoint (City of Boston)
pub const DEFAULT_ENDPOINT: &str = "https://311.boston.gov/open311/v2/requests.json";

/// Service code of the needle pickup category, the reference use case.
pub const DEFAULT_SERVICE_CODE: &str = "Mayor's 24 Hour Hotline:Needle Program:Needle Pickup";

/// Largest page size the reporting API honours
pub const MAX_PAGE_SIZE: u32 = 100;

/// Client identification sent with every call
pub const DEFAULT_USER_AGENT: &str = concat!("Open311Downloader/", env!("CARGO_PKG_VERSION"));

/// Names of the two window-bound query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowParams {
    /// Parameter carrying the inclusive lower bound
    pub after: Cow<'static, str>,
    /// Parameter carrying the exclusive upper bound
    pub before: Cow<'static, str>,
}

/// `updated_after` / `updated_before`
pub const UPDATED_WINDOW_PARAMS: WindowParams = WindowParams {
    after: Cow::Borrowed("updated_after"),
    before: Cow::Borrowed("updated_before"),
};

/// `start_date` / `end_date`
pub const DATE_WINDOW_PARAMS: WindowParams = WindowParams {
    after: Cow::Borrowed("start_date"),
    before: Cow::Borrowed("end_date"),
};

impl WindowParams {
    /// Arbitrary parameter names
    pub fn custom(after: impl Into<String>, before: impl Into<String>) -> Self {
        Self {
            after: Cow::Owned(after.into()),
            before: Cow::Owned(before.into()),
        }
    }
}

impl Default for WindowParams {
    fn default() -> Self {
        UPDATED_WINDOW_PARAMS
    }
}

impl std::fmt::Display for WindowParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == UPDATED_WINDOW_PARAMS {
            write!(f, "updated")
        } else if *self == DATE_WINDOW_PARAMS {
            write!(f, "date")
        } else {
            write!(f, "custom:{},{}", self.after, self.before)
        }
    }
}

impl FromStr for WindowParams {
    type Err = String;

    /// Accepts `updated`, `date`, or `custom:<after>,<before>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "updated" => Ok(UPDATED_WINDOW_PARAMS),
            "date" => Ok(DATE_WINDOW_PARAMS),
            other => {
                let names = other.strip_prefix("custom:").ok_or_else(|| {
                    format!(
                        "Invalid window params: {other}. Valid options: updated, date, custom:<after>,<before>"
                    )
                })?;
                match names.split_once(',') {
                    Some((after, before))
                        if !after.trim().is_empty() && !before.trim().is_empty() =>
                    {
                        Ok(WindowParams::custom(after.trim(), before.trim()))
                    }
                    _ => Err(format!(
                        "Invalid custom window params: {names}. Expected custom:<after>,<before>"
                    )),
                }
            }
        }
    }
}

/// Endpoint and query naming for one reporting API deployment
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Full URL of the records endpoint
    pub endpoint: String,
    /// Parameter carrying the service code
    pub filter_param: Cow<'static, str>,
    /// Parameter carrying the page size
    pub page_size_param: Cow<'static, str>,
    /// Parameter carrying the 1-based page number
    pub page_param: Cow<'static, str>,
    /// Window bound parameter names
    pub window_params: WindowParams,
    /// Largest page size the server accepts
    pub max_page_size: u32,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            filter_param: Cow::Borrowed("service_code"),
            page_size_param: Cow::Borrowed("per_page"),
            page_param: Cow::Borrowed("page"),
            window_params: WindowParams::default(),
            max_page_size: MAX_PAGE_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ApiConfig {
    /// Point at a different endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use a different window parameter convention
    pub fn with_window_params(mut self, window_params: WindowParams) -> Self {
        self.window_params = window_params;
        self
    }

    /// Override the `User-Agent` header
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid endpoint '{}': {e}", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "Endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            ));
        }

        if self.max_page_size == 0 {
            return Err("Max page size must be positive".to_string());
        }

        if self.user_agent.trim().is_empty() {
            return Err("User agent cannot be empty".to_string());
        }

        if self.window_params.after == self.window_params.before {
            return Err(format!(
                "Window parameter names must differ, both are '{}'",
                self.window_params.after
            ));
        }

        Ok(())
    }
}
