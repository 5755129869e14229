/// HTTP middleware utilities for blog-service
///
/// `IdentityMiddleware` resolves the viewer from a bearer token (API) or the
/// session cookie (web) and stores an `AuthUser` in the request extensions.
/// The token's author is looked up on every request and must still exist
/// under the same username. Handlers receive it through the `Viewer` or
/// `AuthUser` extractors.
pub mod permissions;

pub use permissions::*;

use crate::db::EntityStore;
use crate::error::AppError;
use crate::metrics::http::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use crypto_core::TokenIssuer;
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

// =====================================================================
// Identity
// =====================================================================

/// Authenticated author attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

/// Possibly anonymous viewer of a request
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<AuthUser>);

impl Viewer {
    pub fn user(&self) -> Option<&AuthUser> {
        self.0.as_ref()
    }

    /// The authenticated author, or `Unauthorized`
    pub fn require(&self) -> crate::error::Result<&AuthUser> {
        require_auth(self.user())
    }
}

/// Where the middleware looks for a token
#[derive(Debug, Clone)]
enum TokenSource {
    /// `Authorization: Bearer <token>`; a bad token rejects the request
    Bearer,
    /// Session cookie; a bad or expired cookie leaves the viewer anonymous
    Cookie(String),
}

/// Actix middleware that resolves the viewer identity.
#[derive(Clone)]
pub struct IdentityMiddleware {
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn EntityStore>,
    source: TokenSource,
}

impl IdentityMiddleware {
    pub fn bearer(issuer: Arc<TokenIssuer>, store: Arc<dyn EntityStore>) -> Self {
        Self {
            issuer,
            store,
            source: TokenSource::Bearer,
        }
    }

    pub fn session(
        issuer: Arc<TokenIssuer>,
        store: Arc<dyn EntityStore>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            issuer,
            store,
            source: TokenSource::Cookie(cookie_name.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityMiddlewareService {
            service: Rc::new(service),
            issuer: self.issuer.clone(),
            store: self.store.clone(),
            source: self.source.clone(),
        }))
    }
}

pub struct IdentityMiddlewareService<S> {
    service: Rc<S>,
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn EntityStore>,
    source: TokenSource,
}

impl<S> IdentityMiddlewareService<S> {
    fn resolve(&self, req: &ServiceRequest) -> Result<Option<AuthUser>, AppError> {
        match &self.source {
            TokenSource::Bearer => {
                let Some(header) = req.headers().get("Authorization") else {
                    return Ok(None);
                };
                let token = header
                    .to_str()
                    .ok()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .ok_or_else(|| {
                        AppError::Unauthorized("Invalid Authorization scheme".to_string())
                    })?;
                self.authenticate(token)
                    .map(Some)
                    .map_err(|_| AppError::Unauthorized("Given token not valid".to_string()))
            }
            TokenSource::Cookie(name) => Ok(req
                .cookie(name)
                .and_then(|cookie| self.authenticate(cookie.value()).ok())),
        }
    }

    fn authenticate(&self, token: &str) -> Result<AuthUser, crypto_core::TokenError> {
        let claims = self.issuer.verify_access(token)?;
        Ok(AuthUser {
            id: claims.author_id()?,
            username: claims.username,
        })
    }

    fn is_bearer(&self) -> bool {
        matches!(self.source, TokenSource::Bearer)
    }
}

/// Confirm the token's author still exists under the same username
async fn confirm_author(
    store: &dyn EntityStore,
    claimed: AuthUser,
) -> Result<Option<AuthUser>, AppError> {
    Ok(store
        .find_author(claimed.id)
        .await?
        .filter(|author| author.username == claimed.username)
        .map(|_| claimed))
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let resolved = self.resolve(&req);
        let service = self.service.clone();
        let store = self.store.clone();
        let reject_unknown = self.is_bearer();

        Box::pin(async move {
            let claimed = match resolved {
                Ok(claimed) => claimed,
                Err(err) => {
                    tracing::debug!(error = %err, "rejecting request with invalid token");
                    return Err(err.into());
                }
            };

            if let Some(claimed) = claimed {
                let claimed_id = claimed.id;
                match confirm_author(store.as_ref(), claimed).await? {
                    Some(user) => {
                        tracing::debug!(author_id = user.id, "viewer authenticated");
                        req.extensions_mut().insert(user);
                    }
                    None if reject_unknown => {
                        tracing::debug!(author_id = claimed_id, "token author no longer exists");
                        return Err(AppError::Unauthorized("User not found".to_string()).into());
                    }
                    None => {
                        tracing::debug!(
                            author_id = claimed_id,
                            "ignoring session of unknown author"
                        );
                    }
                }
            }

            service.call(req).await
        })
    }
}

impl FromRequest for Viewer {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(Ok(Viewer(req.extensions().get::<AuthUser>().cloned())))
    }
}

impl FromRequest for AuthUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| {
                    AppError::Unauthorized(
                        "Authentication credentials were not provided".to_string(),
                    )
                    .into()
                }),
        )
    }
}

// =====================================================================
// Metrics middleware
// =====================================================================

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let res = service.call(req).await;
            let status = match &res {
                Ok(resp) => resp.status().as_u16().to_string(),
                Err(err) => err.as_response_error().status_code().as_u16().to_string(),
            };

            HTTP_REQUESTS_TOTAL
                .with_label_values(&[method.as_str(), status.as_str()])
                .inc();
            HTTP_REQUEST_DURATION_SECONDS
                .with_label_values(&[method.as_str()])
                .observe(start.elapsed().as_secs_f64());
            res
        })
    }
}
