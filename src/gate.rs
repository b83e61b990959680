use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::error::ApiError;

/// Routes reachable without a session token.
const PUBLIC_PATHS: &[&str] = &[
    "/login",
    "/register",
    "/logout",
    "/docs",
    "/openapi.json",
    "/getproduct",
    "/getslides",
    "/chceck_payment_status",
];

/// Prefixes serving public assets (uploaded images, API docs).
const PUBLIC_PREFIXES: &[&str] = &["/uploads/", "/docs/"];

fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Bearer-token check in front of every non-public route. Stateless: each
/// request re-verifies the token and re-reads the user, so a deleted account
/// is locked out immediately.
#[derive(Clone)]
pub struct RequestGate {
    auth: Arc<AuthService>,
}

impl RequestGate {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestGateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestGateMiddleware {
            service: Rc::new(service),
            auth: self.auth.clone(),
        }))
    }
}

pub struct RequestGateMiddleware<S> {
    service: Rc<S>,
    auth: Arc<AuthService>,
}

impl<S, B> Service<ServiceRequest> for RequestGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let auth = self.auth.clone();

        if is_public(req.path()) {
            return Box::pin(async move { svc.call(req).await });
        }

        // Delegate header parsing to BearerAuth before entering the future.
        let bearer = BearerAuth::from_request(req.request(), &mut Payload::None).into_inner();

        Box::pin(async move {
            let bearer = bearer.map_err(|_| Error::from(ApiError::Unauthorized))?;
            // A token whose user has vanished is indistinguishable from an
            // invalid one at this layer.
            auth.validate_token(bearer.token()).await.map_err(|e| match e {
                crate::auth::AuthError::UserNotFound => Error::from(ApiError::InvalidToken),
                other => Error::from(ApiError::from(other)),
            })?;
            svc.call(req).await
        })
    }
}
