//! Bearer token middleware.
//!
//! Every request passing through this middleware must carry an `Authorization: Bearer <token>` header holding a valid
//! HS256 token. The validated [`JwtClaims`] are stored in the request extensions, where the [`super::AclMiddlewareFactory`]
//! and the `JwtClaims` extractor pick them up. Requests without a valid token are rejected with a 401.

use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
    HttpMessage,
};
use futures::future::{ok, Ready};
use log::*;

use crate::{
    auth::JwtAuthority,
    errors::{AuthError, ServerError},
};

pub struct JwtMiddlewareFactory {
    authority: JwtAuthority,
}

impl JwtMiddlewareFactory {
    pub fn new(authority: JwtAuthority) -> Self {
        Self { authority }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(JwtMiddlewareService { authority: self.authority.clone(), service: Rc::new(service) })
    }
}

pub struct JwtMiddlewareService<S> {
    authority: JwtAuthority,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let result = bearer_token(&req).and_then(|token| self.authority.validate(token));
        Box::pin(async move {
            match result {
                Ok(claims) => {
                    trace!("🔐️ {} {} by user {} ({})", req.method(), req.path(), claims.sub, claims.role);
                    req.extensions_mut().insert(claims);
                    service.call(req).await
                },
                Err(e) => {
                    debug!("🔐️ Rejecting {} {}: {e}", req.method(), req.path());
                    Err(ServerError::AuthenticationError(e).into())
                },
            }
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Result<&str, AuthError> {
    let header = req.headers().get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::PoorlyFormattedToken("Expected a Bearer token".into()))
}
