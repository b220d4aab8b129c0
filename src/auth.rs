use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};

use crate::client::{Backend, PageResponse};
use crate::config::AppConfig;
use crate::error::AuthError;
use crate::session::{SessionCookie, SessionState, SessionStore};

pub const LOGIN_PATH: &str = "/login";
pub const PROBE_PATH: &str = "/myself";

static TOKEN_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="_token"]"#).unwrap());

/// Progress of the authentication state machine. Terminal states are
/// `Verified` (success) and the fatal [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    SessionRestored,
    LoginAttempted,
    Verified,
}

/// The transport the authenticator drives. [`Backend`] is the live
/// implementation; tests script the probe outcomes to exercise the decision
/// sequence without a network.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Seed the connection context with persisted cookies.
    fn restore_session(&self, cookies: &[SessionCookie]);

    /// GET a path (the probe and the login page).
    async fn fetch(&self, path: &str) -> Result<PageResponse>;

    /// POST the login form.
    async fn submit_form(&self, path: &str, form: &[(&str, &str)]) -> Result<PageResponse>;
}

#[async_trait]
impl AuthTransport for Backend {
    fn restore_session(&self, cookies: &[SessionCookie]) {
        self.inject_cookies(cookies);
    }

    async fn fetch(&self, path: &str) -> Result<PageResponse> {
        self.get(path, &[]).await
    }

    async fn submit_form(&self, path: &str, form: &[(&str, &str)]) -> Result<PageResponse> {
        self.post_form(path, form).await
    }
}

/// Establish an authenticated session: stored cookies first, login form as
/// the fallback. A rejected login is fatal and is never retried.
pub async fn ensure_authenticated<T>(
    transport: &T,
    store: &SessionStore,
    config: &AppConfig,
) -> Result<AuthState>
where
    T: AuthTransport + ?Sized,
{
    let mut state = AuthState::Unauthenticated;
    let mut cookies: BTreeMap<String, String> = BTreeMap::new();

    if let Some(session) = store.load(&config.email) {
        info!("restoring saved session for {}", config.email);
        for cookie in &session.cookies {
            cookies.insert(cookie.name.clone(), cookie.value.clone());
        }
        transport.restore_session(&session.cookies);
        state = AuthState::SessionRestored;
    }
    debug!(?state, "starting auth probe");

    let probe = transport.fetch(PROBE_PATH).await?;
    merge_cookies(&mut cookies, &probe.set_cookies);
    if probe_verified(probe.status) {
        info!("authenticated via stored session");
        return Ok(AuthState::Verified);
    }

    info!("stored session rejected, logging in as {}", config.email);
    let login_page = transport.fetch(LOGIN_PATH).await?;
    merge_cookies(&mut cookies, &login_page.set_cookies);

    let token = extract_csrf_token(&login_page.body);
    if token.is_none() {
        warn!("login page had no _token input, submitting without it");
    }
    let token = token.unwrap_or_default();

    let form = [
        ("email", config.email.as_str()),
        ("password", config.password.as_str()),
        ("_token", token.as_str()),
    ];
    let submitted = transport.submit_form(LOGIN_PATH, &form).await?;
    merge_cookies(&mut cookies, &submitted.set_cookies);
    state = AuthState::LoginAttempted;
    debug!(?state, status = submitted.status, "login form submitted");

    let reprobe = transport.fetch(PROBE_PATH).await?;
    merge_cookies(&mut cookies, &reprobe.set_cookies);
    if !probe_verified(reprobe.status) {
        let err = AuthError {
            status: submitted.status,
            url: submitted.url.clone(),
            form_keys: form.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(", "),
        };
        error!("{err}");
        return Err(err.into());
    }

    info!("authenticated via login form");
    persist_session(store, &config.email, &cookies);
    Ok(AuthState::Verified)
}

/// A 200 with redirects disabled is the only authenticated outcome; the
/// backend 302s the probe endpoint to the login page otherwise.
pub fn probe_verified(status: u16) -> bool {
    status == 200
}

/// Pull the anti-forgery token out of the login form.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&TOKEN_SELECTOR)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
}

fn merge_cookies(into: &mut BTreeMap<String, String>, set_cookies: &[(String, String)]) {
    for (name, value) in set_cookies {
        into.insert(name.clone(), value.clone());
    }
}

fn persist_session(store: &SessionStore, email: &str, cookies: &BTreeMap<String, String>) {
    if cookies.is_empty() {
        warn!("no cookies observed, session not persisted");
        return;
    }
    let state = SessionState {
        cookies: cookies
            .iter()
            .map(|(name, value)| SessionCookie {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
    };
    if let Err(err) = store.save(email, &state) {
        warn!("could not persist session for {email}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport with scripted probe statuses. Counts login POSTs so tests
    /// can assert which branches of the flow actually fired.
    struct Scripted {
        probe_statuses: Mutex<Vec<u16>>,
        login_posts: AtomicUsize,
    }

    impl Scripted {
        fn new(probe_statuses: Vec<u16>) -> Self {
            Self {
                probe_statuses: Mutex::new(probe_statuses),
                login_posts: AtomicUsize::new(0),
            }
        }

        fn posts(&self) -> usize {
            self.login_posts.load(Ordering::SeqCst)
        }
    }

    fn page(status: u16, path: &str, body: &str) -> PageResponse {
        PageResponse {
            status,
            url: format!("https://api.100points.ru{path}"),
            body: body.to_string(),
            set_cookies: Vec::new(),
        }
    }

    #[async_trait]
    impl AuthTransport for Scripted {
        fn restore_session(&self, _cookies: &[SessionCookie]) {}

        async fn fetch(&self, path: &str) -> Result<PageResponse> {
            if path == PROBE_PATH {
                let status = self.probe_statuses.lock().unwrap().remove(0);
                Ok(page(status, path, ""))
            } else {
                Ok(page(
                    200,
                    path,
                    r#"<form><input name="_token" value="tok-1"></form>"#,
                ))
            }
        }

        async fn submit_form(&self, path: &str, _form: &[(&str, &str)]) -> Result<PageResponse> {
            self.login_posts.fetch_add(1, Ordering::SeqCst);
            let mut response = page(302, path, "");
            response.set_cookies = vec![("laravel_session".into(), "fresh".into())];
            Ok(response)
        }
    }

    fn temp_store(tag: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!("points_scraper_auth_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        SessionStore::new(dir)
    }

    fn config() -> AppConfig {
        AppConfig {
            email: "user@example.com".into(),
            password: "secret".into(),
            course_id: 3,
            group_id: 14,
            show_table: false,
        }
    }

    #[tokio::test]
    async fn valid_saved_session_issues_no_login_post() {
        let store = temp_store("no_post");
        let config = config();
        store
            .save(
                &config.email,
                &SessionState {
                    cookies: vec![SessionCookie {
                        name: "laravel_session".into(),
                        value: "stored".into(),
                    }],
                },
            )
            .unwrap();

        // The first probe answers 200: the flow must stop right there.
        let transport = Scripted::new(vec![200]);
        let state = ensure_authenticated(&transport, &store, &config)
            .await
            .unwrap();

        assert_eq!(state, AuthState::Verified);
        assert_eq!(transport.posts(), 0);
    }

    #[tokio::test]
    async fn dead_session_falls_back_to_one_login_post() {
        let store = temp_store("fallback");
        let config = config();

        // Probe rejects, re-probe after login accepts.
        let transport = Scripted::new(vec![302, 200]);
        let state = ensure_authenticated(&transport, &store, &config)
            .await
            .unwrap();

        assert_eq!(state, AuthState::Verified);
        assert_eq!(transport.posts(), 1);
        // The fresh cookie from the login response was persisted.
        let saved = store.load(&config.email).unwrap();
        assert!(saved
            .cookies
            .iter()
            .any(|c| c.name == "laravel_session" && c.value == "fresh"));
    }

    #[tokio::test]
    async fn rejected_login_is_fatal_and_not_retried() {
        let store = temp_store("rejected");
        let config = config();

        let transport = Scripted::new(vec![302, 302]);
        let err = ensure_authenticated(&transport, &store, &config)
            .await
            .unwrap_err();

        let auth_err = err.downcast_ref::<AuthError>().expect("an AuthError");
        assert_eq!(auth_err.status, 302);
        // Names only, never the secret values.
        assert_eq!(auth_err.form_keys, "email, password, _token");
        assert!(!auth_err.to_string().contains("secret"));
        assert_eq!(transport.posts(), 1);
        // Nothing persisted on the failure path.
        assert!(store.load(&config.email).is_none());
    }

    #[test]
    fn only_plain_200_verifies_the_probe() {
        assert!(probe_verified(200));
        // A redirect to /login means the session is dead.
        assert!(!probe_verified(302));
        assert!(!probe_verified(301));
        assert!(!probe_verified(401));
        assert!(!probe_verified(500));
    }

    #[test]
    fn csrf_token_extracted_from_login_form() {
        let html = r#"
            <form method="POST" action="/login">
                <input type="hidden" name="_token" value="tok-9f8e7d">
                <input type="email" name="email">
                <input type="password" name="password">
            </form>"#;
        assert_eq!(extract_csrf_token(html).as_deref(), Some("tok-9f8e7d"));
    }

    #[test]
    fn missing_token_input_yields_none() {
        let html = "<form><input name=\"email\"></form>";
        assert_eq!(extract_csrf_token(html), None);
    }

    #[test]
    fn later_cookies_replace_earlier_ones() {
        let mut cookies = BTreeMap::new();
        merge_cookies(
            &mut cookies,
            &[("laravel_session".into(), "old".into())],
        );
        merge_cookies(
            &mut cookies,
            &[
                ("laravel_session".into(), "new".into()),
                ("xsrf".into(), "x1".into()),
            ],
        );
        assert_eq!(cookies.get("laravel_session").map(String::as_str), Some("new"));
        assert_eq!(cookies.len(), 2);
    }
}
