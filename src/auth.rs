use actix_web::{dev::ServiceRequest, error::ErrorUnauthorized, web, Error, HttpMessage};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    models::{UserRow, ROLE_ADMIN, ROLE_DOCTOR, ROLE_USER},
    state::AppState,
};

/// The authenticated caller, attached to request extensions by the validators.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub role: String,
}

impl Principal {
    pub fn is_doctor(&self) -> bool {
        self.role == ROLE_DOCTOR
    }

    pub fn is_user(&self) -> bool {
        self.role == ROLE_USER
    }
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn authenticate_credentials(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Option<Principal> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, role, password_hash, active, created_at
           FROM users
           WHERE username = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .map_err(|err| log::warn!("Credential lookup failed: {err}"))
    .ok()??;

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    Some(Principal {
        id: user.id,
        display_name: user.display_name,
        role: user.role,
    })
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<Principal, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(&state.db, credentials.user_id(), password)
        .await
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))
}

async fn require_role(
    req: ServiceRequest,
    credentials: BasicAuth,
    role: Option<&'static str>,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(principal) => {
            if let Some(role) = role {
                if principal.role != role {
                    return Err((ErrorUnauthorized(format!("{role} access required")), req));
                }
            }
            req.extensions_mut().insert(principal);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    require_role(req, credentials, None).await
}

pub async fn doctor_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    require_role(req, credentials, Some(ROLE_DOCTOR)).await
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    require_role(req, credentials, Some(ROLE_ADMIN)).await
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
