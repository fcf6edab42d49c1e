//! Token verification and permission resolution.
//!
//! Signing secrets live in `auth_secrets` so they can rotate without a
//! redeploy: a new primary is inserted, the old one keeps verifying until it
//! expires, and every still-valid row is accepted at verify time. Both the
//! secret set and each user's resolved permission set are cached in-process
//! with a short TTL — a compromise between "hit the database on every
//! request" and "never notice a revoked role until restart".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const ADMIN_ACCESS: &str = "admin.access";
pub const ADMIN_SUPER: &str = "admin.super";

const SECRET_CACHE_TTL: Duration = Duration::from_secs(60);
const PERM_CACHE_TTL: Duration = Duration::from_secs(30);
const TOKEN_LIFETIME_SECS: i64 = 60 * 60 * 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    InvalidToken,
    Expired,
    NoPrimarySecret,
    UserNotFound { user_id: Uuid },
    Banned { user_id: Uuid },
}

impl std::fmt::Display for AuthzError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidToken => write!(f, "authz: token signature/claims invalid"),
            Self::Expired => write!(f, "authz: token expired"),
            Self::NoPrimarySecret => write!(f, "authz: no primary signing secret configured"),
            Self::UserNotFound { user_id } => write!(f, "authz: user {user_id} not found"),
            Self::Banned { user_id } => write!(f, "authz: user {user_id} is banned"),
        }
    }
}

impl std::error::Error for AuthzError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    iat: i64,
    exp: i64,
}

/// The authenticated identity for one request, with its resolved
/// permission set already attached so handlers never query RBAC directly.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub user_id: Uuid,
    pub permissions: HashSet<String>,
}

impl AuthenticatedPrincipal {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_admin(&self) -> bool {
        self.has_permission(ADMIN_ACCESS)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_permission(ADMIN_SUPER)
    }
}

struct SecretCacheEntry {
    secrets: Vec<(String, bool)>, // (secret, is_primary)
    fetched_at: Instant,
}

struct PermCacheEntry {
    permissions: HashSet<String>,
    fetched_at: Instant,
}

/// Clone-able handle shared across handlers, same shape as other
/// request-scoped caches in this codebase: an `Arc<RwLock<_>>` refreshed
/// lazily on expiry rather than on a background ticker.
#[derive(Clone)]
pub struct Authz {
    pool: PgPool,
    secret_cache: Arc<RwLock<Option<SecretCacheEntry>>>,
    perm_cache: Arc<RwLock<HashMap<Uuid, PermCacheEntry>>>,
}

impl Authz {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            secret_cache: Arc::new(RwLock::new(None)),
            perm_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn secrets(&self) -> Result<Vec<(String, bool)>, AuthzError> {
        {
            let cache = self.secret_cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.fetched_at.elapsed() < SECRET_CACHE_TTL {
                    return Ok(entry.secrets.clone());
                }
            }
        }

        let now = Utc::now();
        let rows: Vec<(String, bool)> = sqlx::query_as(
            r#"
            select secret, is_primary from auth_secrets
            where expires_at is null or expires_at > $1
            order by is_primary desc, created_at desc
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|_| AuthzError::NoPrimarySecret)?;

        let mut cache = self.secret_cache.write().await;
        *cache = Some(SecretCacheEntry {
            secrets: rows.clone(),
            fetched_at: Instant::now(),
        });
        Ok(rows)
    }

    /// Sign a new token for `user_id` using the current primary secret.
    pub async fn issue_token(&self, user_id: Uuid) -> Result<String, AuthzError> {
        let secrets = self.secrets().await?;
        let (primary, _) = secrets
            .into_iter()
            .find(|(_, is_primary)| *is_primary)
            .ok_or(AuthzError::NoPrimarySecret)?;

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(primary.as_bytes()),
        )
        .map_err(|_| AuthzError::InvalidToken)
    }

    /// Verify `token` against every currently-valid secret, then resolve the
    /// subject's permissions and banned status. Rejects banned users even
    /// when the signature itself checks out.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedPrincipal, AuthzError> {
        let secrets = self.secrets().await?;
        let claims = verify_against_any(token, &secrets)?;

        let now = Utc::now().timestamp();
        if claims.exp < now {
            return Err(AuthzError::Expired);
        }

        let (is_banned,): (bool,) =
            sqlx::query_as("select is_banned from users where id = $1")
                .bind(claims.sub)
                .fetch_optional(&self.pool)
                .await
                .map_err(|_| AuthzError::UserNotFound { user_id: claims.sub })?
                .ok_or(AuthzError::UserNotFound { user_id: claims.sub })?;

        if is_banned {
            return Err(AuthzError::Banned { user_id: claims.sub });
        }

        let permissions = self.permissions_for(claims.sub).await?;
        Ok(AuthenticatedPrincipal {
            user_id: claims.sub,
            permissions,
        })
    }

    async fn permissions_for(&self, user_id: Uuid) -> Result<HashSet<String>, AuthzError> {
        {
            let cache = self.perm_cache.read().await;
            if let Some(entry) = cache.get(&user_id) {
                if entry.fetched_at.elapsed() < PERM_CACHE_TTL {
                    return Ok(entry.permissions.clone());
                }
            }
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            select distinct p.name
            from user_roles ur
            join role_permissions rp on rp.role_id = ur.role_id
            join permissions p on p.id = rp.permission_id
            where ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|_| AuthzError::UserNotFound { user_id })?;

        let permissions: HashSet<String> = rows.into_iter().map(|(name,)| name).collect();

        let mut cache = self.perm_cache.write().await;
        cache.insert(
            user_id,
            PermCacheEntry {
                permissions: permissions.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(permissions)
    }

    /// Drop a user's cached permission set immediately, e.g. right after an
    /// admin promotes/demotes them, so the TTL doesn't hide the change.
    pub async fn invalidate_permissions(&self, user_id: Uuid) {
        let mut cache = self.perm_cache.write().await;
        cache.remove(&user_id);
    }
}

fn verify_against_any(token: &str, secrets: &[(String, bool)]) -> Result<Claims, AuthzError> {
    let mut validation = Validation::default();
    validation.validate_exp = false; // expiry is checked explicitly, with our own clock source

    for (secret, _) in secrets {
        if let Ok(data) = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        ) {
            return Ok(data.claims);
        }
    }
    Err(AuthzError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_permission_checks() {
        let mut permissions = HashSet::new();
        permissions.insert(ADMIN_ACCESS.to_string());
        let principal = AuthenticatedPrincipal {
            user_id: Uuid::nil(),
            permissions,
        };
        assert!(principal.is_admin());
        assert!(!principal.is_super_admin());
    }

    #[test]
    fn verify_against_any_rejects_garbage_token() {
        let secrets = vec![("a-real-secret".to_string(), true)];
        let err = verify_against_any("not-a-jwt", &secrets).unwrap_err();
        assert_eq!(err, AuthzError::InvalidToken);
    }
}
