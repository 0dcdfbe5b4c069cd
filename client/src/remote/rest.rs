//! Hosted backend over HTTP: PostgREST tables under `/rest/v1`, GoTrue auth
//! under `/auth/v1`, change feeds over the realtime websocket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use mercado_common::order::OrderStatus;

use super::rows::{
    NewOrderRow, OrderItemRow, OrderRow, ProductRow, ProductRowPatch, ProfilePatch, ProfileRow,
    ZoneRow,
};
use super::{realtime, AuthSession, ChangeFeed, ConnectionStatus, RemoteBackend, Table};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: Mutex<Option<AuthSession>>,
    /// Set while a resumed session has not been refreshed yet.
    resumed: AtomicBool,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Token grants nest the user; sign-ups awaiting email confirmation return
/// the bare user.
#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl AuthResponse {
    fn into_session(self, fallback_email: &str) -> Result<AuthSession, RemoteError> {
        let (id, email) = match self.user {
            Some(u) => (u.id, u.email),
            None => (
                self.id
                    .ok_or_else(|| RemoteError::Decode("auth response without user".into()))?,
                self.email,
            ),
        };
        Ok(AuthSession {
            user_id: id,
            email: email.unwrap_or_else(|| fallback_email.to_string()),
            access_token: self.access_token.unwrap_or_default(),
            refresh_token: self.refresh_token.unwrap_or_default(),
        })
    }
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            session: Mutex::new(None),
            resumed: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &RemoteConfig, timeout: Duration) -> Result<Self, RemoteError> {
        let (url, key) = config.credentials().ok_or(RemoteError::NotConfigured)?;
        Self::new(url, key, timeout)
    }

    fn current_session(&self) -> Option<AuthSession> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session(&self, session: Option<AuthSession>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Trade the refresh token for a fresh pair. A rejected token ends the
    /// session; transport failures leave it for the next attempt.
    async fn refresh(&self, session: AuthSession) -> Result<Option<AuthSession>, RemoteError> {
        let request = self
            .http
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&json!({ "refresh_token": session.refresh_token }));
        match send_json::<AuthResponse>(request).await {
            Ok(response) => {
                let fresh = response.into_session(&session.email)?;
                self.set_session(Some(fresh.clone()));
                Ok(Some(fresh))
            }
            Err(RemoteError::Status { status, message }) if (400..500).contains(&status) => {
                tracing::info!("stored session no longer valid: {message}");
                self.set_session(None);
                Ok(None)
            }
            Err(e) => {
                self.resumed.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn bearer(&self) -> String {
        self.current_session()
            .map(|s| s.access_token)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.api_key.clone())
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, format!("{}/rest/v1/{table}", self.base_url))
    }

    fn auth(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, format!("{}/auth/v1/{path}", self.base_url))
    }

    fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.api_key
        )
    }
}

async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull a human message out of a PostgREST or GoTrue error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RemoteError> {
    let response = check(request.send().await?).await?;
    Ok(response.json::<T>().await?)
}

async fn send(request: RequestBuilder) -> Result<(), RemoteError> {
    check(request.send().await?).await?;
    Ok(())
}

/// Inserts ask for the stored rows back and get an array.
async fn insert_one<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RemoteError> {
    let rows: Vec<T> = send_json(request.header("Prefer", "return=representation")).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| RemoteError::Decode("insert returned no rows".into()))
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

impl RemoteBackend for RestBackend {
    async fn test_connection(&self) -> ConnectionStatus {
        let probe = self
            .table(Method::GET, "products")
            .query(&[("select", "id"), ("limit", "1")]);
        match send(probe).await {
            Ok(()) => ConnectionStatus::ok(),
            Err(e) => ConnectionStatus::failed(e.to_string()),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError> {
        let response: AuthResponse = send_json(
            self.auth("signup")
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;
        let session = response.into_session(email)?;
        if session.is_live() {
            self.set_session(Some(session.clone()));
        }
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError> {
        let response: AuthResponse = send_json(
            self.auth("token")
                .query(&[("grant_type", "password")])
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;
        let session = response.into_session(email)?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if self.current_session().is_none() {
            return Ok(());
        }
        let result = send(self.auth("logout")).await;
        self.set_session(None);
        result
    }

    async fn get_session(&self) -> Result<Option<AuthSession>, RemoteError> {
        let Some(session) = self.current_session().filter(AuthSession::is_live) else {
            return Ok(None);
        };
        if self.resumed.swap(false, Ordering::SeqCst) && !session.refresh_token.is_empty() {
            return self.refresh(session).await;
        }
        Ok(Some(session))
    }

    fn resume_session(&self, session: AuthSession) {
        if session.is_live() {
            self.set_session(Some(session));
            self.resumed.store(true, Ordering::SeqCst);
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, RemoteError> {
        let rows: Vec<ProfileRow> = send_json(
            self.table(Method::GET, "profiles")
                .query(&[("select", "*".to_string()), ("id", eq(user_id))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_profile(&self, profile: &ProfileRow) -> Result<ProfileRow, RemoteError> {
        insert_one(self.table(Method::POST, "profiles").json(profile)).await
    }

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<(), RemoteError> {
        send(
            self.table(Method::PATCH, "profiles")
                .query(&[("id", eq(user_id))])
                .json(patch),
        )
        .await
    }

    async fn get_products(&self) -> Result<Vec<ProductRow>, RemoteError> {
        send_json(
            self.table(Method::GET, "products")
                .query(&[("select", "*"), ("order", "created_at.desc")]),
        )
        .await
    }

    async fn create_product(&self, row: &ProductRow) -> Result<ProductRow, RemoteError> {
        insert_one(self.table(Method::POST, "products").json(row)).await
    }

    async fn update_product(&self, id: &str, patch: &ProductRowPatch) -> Result<(), RemoteError> {
        send(
            self.table(Method::PATCH, "products")
                .query(&[("id", eq(id))])
                .json(patch),
        )
        .await
    }

    async fn delete_product(&self, id: &str) -> Result<(), RemoteError> {
        send(self.table(Method::DELETE, "products").query(&[("id", eq(id))])).await
    }

    async fn get_orders(&self, customer_id: Option<&str>) -> Result<Vec<OrderRow>, RemoteError> {
        let mut query = vec![
            ("select", "*,order_items(*)".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(id) = customer_id {
            query.push(("customer_id", eq(id)));
        }
        send_json(self.table(Method::GET, "orders").query(&query)).await
    }

    async fn create_order(&self, order: &NewOrderRow) -> Result<OrderRow, RemoteError> {
        insert_one(self.table(Method::POST, "orders").json(order)).await
    }

    async fn create_order_items(&self, items: &[OrderItemRow]) -> Result<(), RemoteError> {
        send(self.table(Method::POST, "order_items").json(items)).await
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<(), RemoteError> {
        send(
            self.table(Method::PATCH, "orders")
                .query(&[("id", eq(id))])
                .json(&json!({ "status": status.as_str() })),
        )
        .await
    }

    async fn verify_payment(&self, id: &str) -> Result<(), RemoteError> {
        send(
            self.table(Method::PATCH, "orders")
                .query(&[("id", eq(id))])
                .json(&json!({ "payment_verified": true })),
        )
        .await
    }

    async fn get_delivery_zones(&self) -> Result<Vec<ZoneRow>, RemoteError> {
        send_json(
            self.table(Method::GET, "delivery_zones")
                .query(&[("select", "*"), ("is_active", "eq.true"), ("order", "name.asc")]),
        )
        .await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, RemoteError> {
        #[derive(Deserialize)]
        struct Setting {
            value: Option<String>,
        }
        let rows: Vec<Setting> = send_json(
            self.table(Method::GET, "app_settings")
                .query(&[("select", "value".to_string()), ("key", eq(key))]),
        )
        .await?;
        Ok(rows.into_iter().next().and_then(|s| s.value))
    }

    async fn subscribe_to_products(&self) -> Result<ChangeFeed, RemoteError> {
        realtime::subscribe(&self.realtime_url(), Table::Products).await
    }

    async fn subscribe_to_orders(&self) -> Result<ChangeFeed, RemoteError> {
        realtime::subscribe(&self.realtime_url(), Table::Orders).await
    }

    fn backend_name(&self) -> &str {
        "rest"
    }
}
