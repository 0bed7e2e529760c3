//! Permission-gated operations.
//!
//! Every data operation passes through here: the context is derived, the
//! permission checked, and only then is the operation invoked. A denied call
//! never reaches the operation.

use std::future::Future;

use crate::context::AuthorizationContext;
use crate::engine::Authorizer;
use crate::error::AuthzError;
use crate::permission::Permission;

/// Runs `operation` if `context` grants `permission`.
///
/// # Errors
///
/// `AuthzError::PermissionDenied` (converted into `E`) if the check fails;
/// otherwise whatever `operation` returns, unchanged.
pub async fn authorized<T, E, Fut>(
    authorizer: &Authorizer,
    context: &AuthorizationContext,
    permission: Permission,
    operation: impl FnOnce() -> Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: From<AuthzError>,
{
    if !authorizer.check_permission(context, permission).await {
        return Err(AuthzError::denied(permission, context).into());
    }
    operation().await
}

/// An operation bound to the permission that guards it.
///
/// Created by [`with_permission`].
pub struct Guarded<D, Op> {
    authorizer: Authorizer,
    permission: Permission,
    derive_context: D,
    operation: Op,
}

/// Wraps `operation` so that every call first derives an authorization
/// context from the arguments and checks `permission` against it.
pub fn with_permission<D, Op>(
    authorizer: Authorizer,
    permission: Permission,
    derive_context: D,
    operation: Op,
) -> Guarded<D, Op> {
    Guarded {
        authorizer,
        permission,
        derive_context,
        operation,
    }
}

impl<D, Op> Guarded<D, Op> {
    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Checks, then invokes the operation with `args`.
    ///
    /// # Errors
    ///
    /// Whatever `derive_context` fails with, `PermissionDenied` if the check
    /// fails, otherwise the operation's own result.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        D: Fn(&A) -> Result<AuthorizationContext, AuthzError>,
        Op: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AuthzError>,
    {
        let context = (self.derive_context)(&args)?;
        authorized(&self.authorizer, &context, self.permission, || {
            (self.operation)(args)
        })
        .await
    }
}
