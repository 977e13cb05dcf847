// server/src/web/extractors.rs

//! Identity extractors. Authentication itself happens upstream; this layer
//! trusts the `X-User-ID` / `X-User-Role` headers that layer sets.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use paysettle::{Requester, UserId};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: UserId,
  pub is_admin: bool,
}

impl AuthenticatedUser {
  pub fn requester(&self) -> Requester {
    Requester {
      user_id: self.user_id,
      is_admin: self.is_admin,
    }
  }
}

fn identify(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
  let user_id = req
    .headers()
    .get(USER_ID_HEADER)
    .and_then(|h| h.to_str().ok())
    .and_then(|s| Uuid::parse_str(s.trim()).ok())
    .ok_or_else(|| {
      warn!("Missing or invalid {} header.", USER_ID_HEADER);
      AppError::Auth(format!("Missing or invalid {} header", USER_ID_HEADER))
    })?;
  let is_admin = req
    .headers()
    .get(USER_ROLE_HEADER)
    .and_then(|h| h.to_str().ok())
    .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));
  Ok(AuthenticatedUser { user_id, is_admin })
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(identify(req))
  }
}

/// An authenticated user holding the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequest for AdminUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(identify(req).and_then(|user| {
      if user.is_admin {
        Ok(AdminUser(user))
      } else {
        warn!(user_id = %user.user_id, "Admin route refused for non-admin user.");
        Err(AppError::Forbidden("Admin role required".to_string()))
      }
    }))
  }
}
