//! Access control list middleware for the shop server.
//! This middleware can be placed on any route or service inside the authenticated `/api` scope.
//!
//! It reads the claims that [`super::JwtMiddlewareFactory`] placed in the request extensions and checks the caller's
//! role against the roles permitted on the route. If the role is permitted, the request continues. Otherwise, a 403
//! Forbidden response is returned.

use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::future::{ok, Ready};
use log::*;
use order_engine::db_types::Role;

use crate::{
    auth::JwtClaims,
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    permitted_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(permitted_roles: &[Role]) -> Self {
        AclMiddlewareFactory { permitted_roles: permitted_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AclMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { permitted_roles: self.permitted_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    permitted_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
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
        let permitted_roles = self.permitted_roles.clone();
        Box::pin(async move {
            let claims = req.extensions().get::<JwtClaims>().cloned();
            let Some(claims) = claims else {
                warn!("🔐️ No access token claims found on a protected route: {}", req.path());
                return Err(ServerError::AuthenticationError(AuthError::MissingToken).into());
            };
            if permitted_roles.contains(&claims.role) {
                service.call(req).await
            } else {
                info!("🔐️ User {} ({}) is not permitted to access {}", claims.sub, claims.role, req.path());
                let msg = format!("{} is not permitted to access this resource", claims.role);
                Err(ServerError::InsufficientPermissions(msg).into())
            }
        })
    }
}
