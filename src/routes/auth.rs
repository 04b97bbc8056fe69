//! Authentication routes

use std::sync::Arc;

use axum::headers::Cookie;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json, TypedHeader};
use serde::Deserialize;

use super::extract::Form;
use crate::auth::{self, ActiveOperator};
use crate::err::Error;
use crate::models::{Message, TokenResponse};
use crate::{proceeds, App, Payload};

pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

fn refresh_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        REFRESH_COOKIE, token
    )
}

fn expired_refresh_cookie() -> String {
    format!(
        "{}=; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age=0",
        REFRESH_COOKIE
    )
}

pub async fn login(
    Extension(app): Extension<Arc<App>>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, Error> {
    let session = auth::login(&app, &form.username, &form.password).await?;
    Ok((
        [(header::SET_COOKIE, refresh_cookie(&session.refresh_token))],
        Json(TokenResponse::bearer(session.access_token)),
    ))
}

pub async fn refresh_token(
    Extension(app): Extension<Arc<App>>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Payload<TokenResponse> {
    let presented = cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(REFRESH_COOKIE));
    let access_token = auth::refresh(&app, presented).await?;
    proceeds(TokenResponse::bearer(access_token))
}

pub async fn logout(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
) -> Result<impl IntoResponse, Error> {
    auth::logout(&app, &operator).await?;
    Ok((
        [(header::SET_COOKIE, expired_refresh_cookie())],
        Json(Message::new("Vous avez été déconnecté")),
    ))
}
