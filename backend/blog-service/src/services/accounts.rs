/// Account service - signup, credential checks and token issuance
use crate::db::EntityStore;
use crate::error::{AppError, FieldErrors, Result};
use crate::middleware::AuthUser;
use crate::models::{Author, NewAuthor};
use crypto_core::{hash_password, verify_password, TokenIssuer, TokenPair};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SignupForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 150, message = "Required. 150 characters or fewer."))]
    pub username: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 8, message = "This password is too short. It must contain at least 8 characters."))]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn EntityStore>,
    issuer: Arc<TokenIssuer>,
}

impl AccountService {
    pub fn new(store: Arc<dyn EntityStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self { store, issuer }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub async fn signup(&self, mut form: SignupForm) -> Result<Author> {
        form.username = form.username.trim().to_string();
        form.email = form
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let mut errors = match form.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };
        if !form.username.is_empty() && !valid_username(&form.username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        if form.password1 != form.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }
        if errors.is_empty()
            && self
                .store
                .find_author_by_username(&form.username)
                .await?
                .is_some()
        {
            errors.add("username", "A user with that username already exists.");
        }
        errors.into_result()?;

        let password_hash = hash_password(&form.password1)?;
        let author = self
            .store
            .create_author(NewAuthor {
                username: form.username,
                email: form.email,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::Validation(FieldErrors::single(
                    "username",
                    "A user with that username already exists.",
                )),
                other => other,
            })?;

        info!(author_id = author.id, username = %author.username, "account created");
        Ok(author)
    }

    /// Check a username/password pair
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Author> {
        let author = self
            .store
            .find_author_by_username(credentials.username.trim())
            .await?
            .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

        if let Err(e) = verify_password(&credentials.password, &author.password_hash) {
            warn!(author_id = author.id, "failed login attempt");
            return Err(e.into());
        }
        Ok(author)
    }

    /// Access token stored in the web session cookie
    pub fn session_token(&self, author: &Author) -> Result<String> {
        self.issuer
            .issue_access(author.id, &author.username)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    pub async fn obtain_pair(&self, credentials: &Credentials) -> Result<TokenPair> {
        let mut errors = FieldErrors::new();
        if credentials.username.trim().is_empty() {
            errors.add("username", "This field is required.");
        }
        if credentials.password.is_empty() {
            errors.add("password", "This field is required.");
        }
        errors.into_result()?;

        let author = self.authenticate(credentials).await?;
        self.issuer
            .issue_pair(author.id, &author.username)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    /// New access token for a refresh token whose author still exists
    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let invalid = || AppError::Unauthorized("Token is invalid or expired".to_string());
        let claims = self
            .issuer
            .verify_refresh(refresh_token)
            .map_err(|_| invalid())?;
        let author_id = claims.author_id().map_err(|_| invalid())?;

        let author = self
            .store
            .find_author(author_id)
            .await?
            .filter(|author| author.username == claims.username)
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        self.issuer
            .issue_access(author.id, &author.username)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser> {
        let claims = self
            .issuer
            .verify(token)
            .map_err(|_| AppError::Unauthorized("Token is invalid or expired".to_string()))?;
        let id = claims
            .author_id()
            .map_err(|_| AppError::Unauthorized("Token is invalid or expired".to_string()))?;
        Ok(AuthUser {
            id,
            username: claims.username,
        })
    }
}
