use accounts::{
    api::{self, AccountsConfig, AccountsState},
    forms::{FormView, NotificationForm},
    plugins::{form_factory, FormFactory, MailPlugin, NotificationFormProvider, PluginRegistry},
    storage::{
        password::hash_password, token::generate_token, MemoryStore, SessionData, SessionStore,
        User, UserOptionStore, UserOptions, UserStore,
    },
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;
use tower::ServiceExt;
use url::form_urlencoded;

const PASSWORD: &str = "correct horse battery";

struct Harness {
    store: Arc<MemoryStore>,
    user: User,
    csrf: String,
    app: Router,
}

impl Harness {
    async fn new() -> Result<Self> {
        Self::with_plugins(PluginRegistry::new().with(Arc::new(MailPlugin))).await
    }

    async fn with_plugins(plugins: PluginRegistry) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::assemble(store.clone(), store, plugins).await
    }

    /// `backing` serves the app; `store` is the memory store it wraps.
    async fn assemble<S>(store: Arc<MemoryStore>, backing: Arc<S>, plugins: PluginRegistry) -> Result<Self>
    where
        S: UserStore + SessionStore + UserOptionStore + 'static,
    {
        let user = User::new(
            "ann@example.com",
            hash_password(&SecretString::from(PASSWORD.to_string()))?,
        );
        store.insert_user(user.clone()).await;

        let config = AccountsConfig::new()
            .with_languages(vec!["en".to_string(), "de".to_string()])
            .with_default_redirect("/projects/".to_string());
        let state = AccountsState::new(config, backing).with_plugins(plugins);

        Ok(Self {
            store,
            user,
            csrf: generate_token()?,
            app: api::app(Arc::new(state)),
        })
    }

    async fn session(&self, data: &SessionData) -> Result<String> {
        self.store.create(data, Duration::from_secs(60)).await
    }

    async fn user_session(&self) -> Result<String> {
        self.session(&SessionData::for_user(self.user.id)).await
    }

    async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.app.clone().oneshot(request).await?)
    }

    async fn get(&self, uri: &str, session: Option<&str>) -> Result<Response> {
        let request = Request::builder()
            .uri(uri)
            .header(COOKIE, self.cookies(session))
            .body(Body::empty())?;
        self.send(request).await
    }

    async fn post(&self, uri: &str, session: Option<&str>, fields: &[(&str, &str)]) -> Result<Response> {
        let mut body = form_urlencoded::Serializer::new(String::new());
        body.append_pair("csrf_token", &self.csrf);
        body.extend_pairs(fields);
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(COOKIE, self.cookies(session))
            .body(Body::from(body.finish()))?;
        self.send(request).await
    }

    fn cookies(&self, session: Option<&str>) -> String {
        match session {
            Some(token) => format!("csrftoken={}; accounts_session={token}", self.csrf),
            None => format!("csrftoken={}", self.csrf),
        }
    }
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

fn cookie_from(response: &Response, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let (pair, _) = cookie.split_once(';')?;
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

async fn page(response: Response) -> Result<Value> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[tokio::test]
async fn login_with_valid_credentials_starts_session() -> Result<()> {
    let harness = Harness::new().await?;
    let response = harness
        .post(
            "/account/login/",
            None,
            &[
                ("username", "Ann@Example.com"),
                ("password", PASSWORD),
                ("next", "/organizations/acme/"),
            ],
        )
        .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/organizations/acme/"));

    let token = cookie_from(&response, "accounts_session").ok_or_else(|| anyhow!("no session cookie"))?;
    let session = harness.store.load(&token).await?;
    assert_eq!(session.and_then(|data| data.user_id), Some(harness.user.id));
    assert_eq!(harness.store.session_count().await, 1);
    assert_eq!(harness.store.login_count(harness.user.id).await, 1);
    Ok(())
}

#[tokio::test]
async fn login_with_wrong_password_rerenders_without_session() -> Result<()> {
    let harness = Harness::new().await?;
    let response = harness
        .post(
            "/account/login/",
            None,
            &[("username", "ann@example.com"), ("password", "wrong")],
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_from(&response, "accounts_session").is_none());
    assert_eq!(cookie_from(&response, "testcookie").as_deref(), Some("worked"));
    assert_eq!(harness.store.session_count().await, 0);

    let page = page(response).await?;
    assert_eq!(page["template"], "accounts/login.html");
    let form = &page["context"]["form"];
    assert!(!form["non_field_errors"].as_array().map_or(true, Vec::is_empty));
    assert_eq!(form["fields"][0]["value"], "ann@example.com");
    assert_eq!(form["fields"][1]["value"], "");
    Ok(())
}

#[tokio::test]
async fn login_page_issues_csrf_token_and_keeps_next() -> Result<()> {
    let harness = Harness::new().await?;
    let request = Request::builder()
        .uri("/account/login/?next=%2Fsettings%2F")
        .body(Body::empty())?;
    let response = harness.send(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let csrf = cookie_from(&response, "csrftoken").ok_or_else(|| anyhow!("no csrf cookie"))?;
    let page = page(response).await?;
    assert_eq!(page["context"]["csrf_token"], json!(csrf));
    assert_eq!(page["context"]["next"], "/settings/");
    assert_eq!(page["context"]["form"]["is_bound"], false);
    Ok(())
}

#[tokio::test]
async fn login_page_marks_existing_session_for_cookie_probe() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.session(&SessionData::default()).await?;
    let response = harness.get("/account/login/", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let session = harness.store.load(&token).await?;
    assert!(session.is_some_and(|data| data.test_cookie));
    Ok(())
}

#[tokio::test]
async fn login_ignores_foreign_next_targets() -> Result<()> {
    let harness = Harness::new().await?;
    for next in ["//evil.example.com/", "https://evil.example.com/"] {
        let response = harness
            .post(
                "/account/login/",
                None,
                &[
                    ("username", "ann@example.com"),
                    ("password", PASSWORD),
                    ("next", next),
                ],
            )
            .await?;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), Some("/projects/"));
    }
    Ok(())
}

#[tokio::test]
async fn login_replaces_previous_session_and_keeps_locale() -> Result<()> {
    let harness = Harness::new().await?;
    let previous = harness
        .session(&SessionData {
            locale: Some("de".to_string()),
            ..SessionData::default()
        })
        .await?;

    let response = harness
        .post(
            "/account/login/",
            Some(&previous),
            &[("username", "ann@example.com"), ("password", PASSWORD)],
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);

    assert!(harness.store.load(&previous).await?.is_none());
    let token = cookie_from(&response, "accounts_session").ok_or_else(|| anyhow!("no session cookie"))?;
    assert_ne!(token, previous);
    let session = harness.store.load(&token).await?;
    assert_eq!(session.and_then(|data| data.locale).as_deref(), Some("de"));
    Ok(())
}

#[tokio::test]
async fn post_without_matching_csrf_token_is_forbidden() -> Result<()> {
    let harness = Harness::new().await?;
    let request = Request::builder()
        .method("POST")
        .uri("/account/login/")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(COOKIE, format!("csrftoken={}", harness.csrf))
        .body(Body::from(format!(
            "csrf_token={}&username=ann%40example.com&password=x",
            generate_token()?
        )))?;
    let response = harness.send(request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // no cookie at all
    let request = Request::builder()
        .method("POST")
        .uri("/account/login/")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=ann%40example.com&password=x"))?;
    let response = harness.send(request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn logout_destroys_session_and_redirects() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.user_session().await?;

    let response = harness.get("/account/logout/", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/projects/"));
    assert!(harness.store.load(&token).await?.is_none());
    assert_eq!(cookie_from(&response, "accounts_session").as_deref(), Some(""));

    // without a session it still redirects
    let response = harness.get("/account/logout/", None).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    Ok(())
}

#[tokio::test]
async fn settings_redirect_anonymous_users_to_login() -> Result<()> {
    let harness = Harness::new().await?;
    for (uri, expected) in [
        (
            "/account/settings/",
            "/account/login/?next=%2Faccount%2Fsettings%2F",
        ),
        (
            "/account/settings/notifications/?success=1",
            "/account/login/?next=%2Faccount%2Fsettings%2Fnotifications%2F%3Fsuccess%3D1",
        ),
    ] {
        let response = harness.get(uri, None).await?;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), Some(expected));
    }
    Ok(())
}

#[tokio::test]
async fn settings_save_then_show_new_values() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.user_session().await?;

    let response = harness
        .post(
            "/account/settings/",
            Some(&token),
            &[("email", "a@b.com"), ("first_name", "Ann"), ("language", "en")],
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/account/settings/?success=1"));

    let stored = harness
        .store
        .find_by_id(harness.user.id)
        .await?
        .ok_or_else(|| anyhow!("user vanished"))?;
    assert_eq!(stored.email, "a@b.com");
    assert_eq!(stored.first_name, "Ann");
    assert_eq!(stored.locale.as_deref(), Some("en"));

    let response = harness.get("/account/settings/?success=1", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let page = page(response).await?;
    assert_eq!(page["template"], "accounts/settings.html");
    assert_eq!(page["context"]["page"], "settings");
    assert_eq!(page["context"]["success"], true);
    assert_eq!(page["context"]["form"]["fields"][0]["value"], "a@b.com");
    Ok(())
}

#[tokio::test]
async fn settings_language_goes_to_session() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.user_session().await?;

    let response = harness
        .post(
            "/account/settings/",
            Some(&token),
            &[("email", "ann@example.com"), ("language", "de")],
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(cookie_from(&response, "accounts_language").is_none());

    let session = harness.store.load(&token).await?;
    assert_eq!(session.and_then(|data| data.locale).as_deref(), Some("de"));
    Ok(())
}

#[tokio::test]
async fn settings_language_goes_to_cookie_without_cookie_session() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.user_session().await?;

    let request = Request::builder()
        .method("POST")
        .uri("/account/settings/")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header("x-csrf-token", harness.csrf.as_str())
        .header(COOKIE, harness.cookies(None))
        .body(Body::from("email=ann%40example.com&language=de"))?;
    let response = harness.send(request).await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(cookie_from(&response, "accounts_language").as_deref(), Some("de"));
    Ok(())
}

#[tokio::test]
async fn settings_invalid_submission_keeps_user() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.user_session().await?;

    let response = harness
        .post(
            "/account/settings/",
            Some(&token),
            &[("email", "not-an-email"), ("language", "xx")],
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let page = page(response).await?;
    let fields = &page["context"]["form"]["fields"];
    assert_eq!(fields[0]["name"], "email");
    assert!(!fields[0]["errors"].as_array().map_or(true, Vec::is_empty));
    assert_eq!(fields[0]["value"], "not-an-email");
    assert_eq!(page["context"]["success"], false);

    let stored = harness.store.find_by_id(harness.user.id).await?;
    assert_eq!(stored, Some(harness.user.clone()));
    Ok(())
}

#[tokio::test]
async fn notifications_list_base_form_first() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.user_session().await?;

    let response = harness.get("/account/settings/notifications/", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let page = page(response).await?;
    assert_eq!(page["template"], "accounts/notifications.html");
    assert_eq!(page["context"]["page"], "notifications");
    let forms = page["context"]["forms"].as_array().cloned().unwrap_or_default();
    assert_eq!(forms.len(), 2);
    assert_eq!(forms[0]["fields"][0]["name"], "alert_email");
    assert_eq!(forms[1]["prefix"], "mail");
    Ok(())
}

#[tokio::test]
async fn notifications_are_saved_all_or_nothing() -> Result<()> {
    let harness = Harness::new().await?;
    let token = harness.user_session().await?;
    let uri = "/account/settings/notifications/";

    let response = harness
        .post(uri, Some(&token), &[("alert_email", "broken")])
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.store.options(harness.user.id).await?.is_empty());

    let response = harness
        .post(uri, Some(&token), &[("alert_email", "ops@example.com")])
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/account/settings/notifications/?success=1"));

    let options = harness.store.options(harness.user.id).await?;
    assert_eq!(options.get("alert_email"), Some(&json!("ops@example.com")));
    assert_eq!(options.get("mail:subscribe_by_default"), Some(&json!(false)));
    Ok(())
}

struct StrictPlugin;

impl NotificationFormProvider for StrictPlugin {
    fn slug(&self) -> &str {
        "strict"
    }

    fn title(&self) -> &str {
        "Strict"
    }

    fn notification_forms(&self) -> Result<Vec<FormFactory>> {
        Ok(vec![form_factory(|plugin, _user, _options, data| {
            Ok(Some(Box::new(RejectingForm {
                title: plugin.title().to_string(),
                bound: data.is_some(),
            })))
        })])
    }
}

/// Never validates.
struct RejectingForm {
    title: String,
    bound: bool,
}

#[async_trait]
impl NotificationForm for RejectingForm {
    fn is_valid(&mut self) -> bool {
        false
    }

    fn view(&self) -> FormView {
        FormView {
            title: self.title.clone(),
            prefix: Some("strict".to_string()),
            is_bound: self.bound,
            fields: Vec::new(),
            non_field_errors: vec!["Not accepted.".to_string()],
        }
    }

    async fn save(&self, _options: &dyn UserOptionStore) -> Result<()> {
        bail!("rejected form was saved")
    }
}

#[tokio::test]
async fn invalid_plugin_form_blocks_every_save() -> Result<()> {
    let plugins = PluginRegistry::new()
        .with(Arc::new(MailPlugin))
        .with(Arc::new(StrictPlugin));
    let harness = Harness::with_plugins(plugins).await?;
    let token = harness.user_session().await?;

    let response = harness
        .post(
            "/account/settings/notifications/",
            Some(&token),
            &[("alert_email", "ops@example.com"), ("mail-subscribe_by_default", "on")],
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.store.options(harness.user.id).await?.is_empty());

    let page = page(response).await?;
    let forms = page["context"]["forms"].as_array().cloned().unwrap_or_default();
    assert_eq!(forms.len(), 3);
    assert_eq!(forms[2]["non_field_errors"], json!(["Not accepted."]));
    Ok(())
}

/// Memory store whose last-login bookkeeping is down.
struct LoginLedgerDown(Arc<MemoryStore>);

#[async_trait]
impl UserStore for LoginLedgerDown {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.0.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.0.find_by_email(email).await
    }

    async fn save(&self, user: &User) -> Result<()> {
        self.0.save(user).await
    }

    async fn record_login(&self, _id: Uuid) -> Result<()> {
        bail!("last_login column is locked")
    }

    async fn ping(&self) -> Result<()> {
        self.0.ping().await
    }
}

#[async_trait]
impl SessionStore for LoginLedgerDown {
    async fn create(&self, data: &SessionData, ttl: Duration) -> Result<String> {
        self.0.create(data, ttl).await
    }

    async fn load(&self, token: &str) -> Result<Option<SessionData>> {
        self.0.load(token).await
    }

    async fn update(&self, token: &str, data: &SessionData) -> Result<()> {
        self.0.update(token, data).await
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        self.0.destroy(token).await
    }
}

#[async_trait]
impl UserOptionStore for LoginLedgerDown {
    async fn options(&self, user_id: Uuid) -> Result<UserOptions> {
        self.0.options(user_id).await
    }

    async fn set_option(&self, user_id: Uuid, key: &str, value: Option<Value>) -> Result<()> {
        self.0.set_option(user_id, key, value).await
    }
}

#[tokio::test]
async fn login_survives_failed_last_login_update() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let backing = Arc::new(LoginLedgerDown(store.clone()));
    let harness = Harness::assemble(store, backing, PluginRegistry::new()).await?;

    let response = harness
        .post(
            "/account/login/",
            None,
            &[("username", "ann@example.com"), ("password", PASSWORD)],
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/projects/"));

    let token = cookie_from(&response, "accounts_session").ok_or_else(|| anyhow!("no session cookie"))?;
    assert!(harness.store.load(&token).await?.is_some());
    assert_eq!(harness.store.session_count().await, 1);
    assert_eq!(harness.store.login_count(harness.user.id).await, 0);
    Ok(())
}

struct BrokenPlugin;

impl NotificationFormProvider for BrokenPlugin {
    fn slug(&self) -> &str {
        "broken"
    }

    fn title(&self) -> &str {
        "Broken"
    }

    fn notification_forms(&self) -> Result<Vec<FormFactory>> {
        panic!("plugin exploded")
    }
}

#[tokio::test]
async fn broken_plugin_does_not_hide_other_forms() -> Result<()> {
    let plugins = PluginRegistry::new()
        .with(Arc::new(BrokenPlugin))
        .with(Arc::new(MailPlugin));
    let harness = Harness::with_plugins(plugins).await?;
    let token = harness.user_session().await?;

    let response = harness.get("/account/settings/notifications/", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let page = page(response).await?;
    let titles: Vec<Value> = page["context"]["forms"]
        .as_array()
        .map(|forms| forms.iter().map(|form| form["title"].clone()).collect())
        .unwrap_or_default();
    assert_eq!(titles, vec![json!("General"), json!("Mail")]);
    Ok(())
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let harness = Harness::new().await?;
    let response = harness.get("/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));

    let page = page(response).await?;
    assert_eq!(page["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(page["database"], "ok");
    Ok(())
}
