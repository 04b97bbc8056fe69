//! Operator authentication.
//!
//! Every protected request walks the same chain on its own, there is no
//! server-side session: a bearer access token must be present, must verify
//! (signature, expiry, subject), must name a stored operator, and that
//! operator must not be disabled. Only the end of that chain, an
//! [`ActiveOperator`], can be handed to the mutating services.
//!
//! Refresh tokens are the one piece of persisted session state: each operator
//! holds at most one, overwritten by every login and cleared by logout.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::rejection::TypedHeaderRejectionReason;
use axum::extract::{FromRequest, RequestParts};
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, TypedHeader};

use crate::err::Error;
use crate::models::OperatorRow;
use crate::operators;
use crate::token::TokenKind;
use crate::App;

/// An operator that presented a valid access token and is not disabled.
#[derive(Debug, Clone)]
pub struct ActiveOperator {
    row: OperatorRow,
}

impl ActiveOperator {
    pub fn activate(row: OperatorRow) -> Result<Self, Error> {
        if row.disabled {
            return Err(Error::OperatorDisabled);
        }
        Ok(Self { row })
    }

    pub fn id(&self) -> i64 {
        self.row.id
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    pub fn into_row(self) -> OperatorRow {
        self.row
    }
}

pub async fn resolve(app: &App, bearer: Option<&str>) -> Result<ActiveOperator, Error> {
    let token = bearer.ok_or(Error::MissingCredential)?;
    let claims = app
        .tokens
        .validate(token, TokenKind::Access)
        .map_err(|reason| {
            log::debug!("Rejected access token: {:?}", reason);
            Error::InvalidCredential
        })?;
    let row = operators::find_by_name(&app.db, &claims.sub)
        .await?
        .ok_or(Error::UnknownOperator)?;
    ActiveOperator::activate(row)
}

#[async_trait]
impl<B> FromRequest<B> for ActiveOperator
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(app) = Extension::<Arc<App>>::from_request(req)
            .await
            .map_err(|err| Error::InternalError {
                kind: "ExtensionError",
                message: format!("{:?}", err),
            })?;

        let bearer = match TypedHeader::<Authorization<Bearer>>::from_request(req).await {
            Ok(TypedHeader(Authorization(bearer))) => Some(bearer),
            Err(rejection) => match rejection.reason() {
                TypedHeaderRejectionReason::Missing => None,
                _ => return Err(Error::InvalidCredential),
            },
        };

        resolve(&app, bearer.as_ref().map(Bearer::token)).await
    }
}

/// Tokens handed out by a successful login.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

/// Unknown names and wrong passwords fail identically.
pub async fn login(app: &App, username: &str, password: &str) -> Result<Session, Error> {
    let operator = match operators::find_by_name(&app.db, username).await? {
        Some(operator) if app.passwords.verify(password, &operator.password_hash) => operator,
        _ => {
            log::debug!("Failed login attempt for {:?}", username);
            return Err(Error::AuthenticationFailed);
        }
    };

    let access_token = app.tokens.issue(&operator.name, TokenKind::Access)?;
    let refresh_token = app.tokens.issue(&operator.name, TokenKind::Refresh)?;
    operators::set_refresh_token(&app.db, operator.id, Some(&refresh_token)).await?;
    log::info!("Operator {} logged in", operator.name);

    Ok(Session {
        access_token,
        refresh_token,
    })
}

/// Mints a new access token. The presented refresh token must be the one
/// currently stored for its operator; it is not rotated.
pub async fn refresh(app: &App, presented: Option<&str>) -> Result<String, Error> {
    let token = presented.ok_or(Error::MissingRefreshToken)?;
    let claims = app
        .tokens
        .validate(token, TokenKind::Refresh)
        .map_err(|reason| {
            log::debug!("Rejected refresh token: {:?}", reason);
            Error::InvalidRefreshToken
        })?;

    let operator = operators::find_by_name(&app.db, &claims.sub).await?;
    match operator {
        Some(operator) if operator.refresh_token.as_deref() == Some(token) => {
            Ok(app.tokens.issue(&operator.name, TokenKind::Access)?)
        }
        _ => Err(Error::InvalidRefreshToken),
    }
}

/// Revokes the stored refresh token. Access tokens already issued stay valid
/// until they expire.
pub async fn logout(app: &App, operator: &ActiveOperator) -> Result<(), Error> {
    operators::set_refresh_token(&app.db, operator.id(), None).await?;
    log::info!("Operator {} logged out", operator.name());
    Ok(())
}
