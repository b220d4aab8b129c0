use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use reqwest::Url;

use crate::limit::RateLimiter;
use crate::session::SessionCookie;

pub const BASE_URL: &str = "https://api.100points.ru";

/// The backend serves a stripped-down page to unknown agents; pin a desktop
/// browser UA like a regular client would send.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/104.0.5112.102 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One response, fully read. Captured before the body is consumed so callers
/// can inspect status, final URL and any cookies the server set.
pub struct PageResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
    pub set_cookies: Vec<(String, String)>,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared connection context: one reqwest client with a cookie jar, plus the
/// global admission gate. Every network operation in the pipeline goes
/// through here, so the connection cap holds across page and record fetches
/// alike.
///
/// Redirects are never followed: the auth probe distinguishes "200 =
/// authenticated" from "302 = login redirect", and the listing endpoints
/// respond directly once authenticated.
pub struct Backend {
    http: reqwest::Client,
    jar: Arc<Jar>,
    limiter: RateLimiter,
    base: Url,
}

impl Backend {
    pub fn new(connections: usize) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            jar,
            limiter: RateLimiter::new(connections),
            base: Url::parse(BASE_URL).expect("base URL is valid"),
        })
    }

    /// Seed the cookie jar with a previously persisted session.
    pub fn inject_cookies(&self, cookies: &[SessionCookie]) {
        for cookie in cookies {
            let header = format!("{}={}; Path=/", cookie.name, cookie.value);
            self.jar.add_cookie_str(&header, &self.base);
        }
    }

    /// GET a path relative to the base URL.
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<PageResponse> {
        let url = self.base.join(path).context("invalid request path")?;
        self.get_url(url, query).await
    }

    /// GET an absolute or listing-relative URL (detail links come back in
    /// both forms depending on the backend's mood).
    pub async fn get_href(&self, href: &str) -> Result<PageResponse> {
        let url = match Url::parse(href) {
            Ok(url) => url,
            Err(_) => self.base.join(href).context("invalid detail link")?,
        };
        self.get_url(url, &[]).await
    }

    async fn get_url(&self, url: Url, query: &[(String, String)]) -> Result<PageResponse> {
        let _permit = self.limiter.acquire().await;
        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;
        Self::read_response(response).await
    }

    /// POST a form (the login endpoint). Held under the limiter like any
    /// other request.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<PageResponse> {
        let url = self.base.join(path).context("invalid request path")?;
        let _permit = self.limiter.acquire().await;
        let response = self.http.post(url).form(form).send().await?;
        Self::read_response(response).await
    }

    async fn read_response(response: reqwest::Response) -> Result<PageResponse> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let set_cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = response.text().await?;

        Ok(PageResponse {
            status,
            url,
            body,
            set_cookies,
        })
    }
}
