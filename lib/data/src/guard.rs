//! The gate every service operation passes through.

use std::future::Future;

use fieldcheck_authz::{AuthorizationContext, Authorizer, Permission, authorized};

use crate::error::ServiceError;

/// [`authorized`] with the error type fixed to [`ServiceError`].
pub(crate) async fn gated<T, Fut>(
    authorizer: &Authorizer,
    context: &AuthorizationContext,
    permission: Permission,
    operation: impl FnOnce() -> Fut,
) -> Result<T, ServiceError>
where
    Fut: Future<Output = Result<T, ServiceError>>,
{
    authorized(authorizer, context, permission, operation).await
}
