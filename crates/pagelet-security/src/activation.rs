//! Authorization resolution for pagelet instances.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use pagelet_core::RequestContext;

/// Tri-state authorization result of one pagelet instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// No decision yet.
    #[default]
    Unresolved,
    /// Allowed to appear for this request.
    Active,
    /// Rejected for this request.
    Inactive,
}

impl Activation {
    pub fn from_bool(allowed: bool) -> Self {
        if allowed {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

/// Authorization check that only looks at the request.
#[async_trait]
pub trait Check: Send + Sync {
    async fn check(&self, req: &RequestContext) -> anyhow::Result<bool>;
}

/// Authorization check that also sees the names of the alternates that
/// would be tried if this candidate is rejected.
#[async_trait]
pub trait AlternatesCheck: Send + Sync {
    async fn check(&self, req: &RequestContext, alternates: &[String]) -> anyhow::Result<bool>;
}

/// Declared authorization check of a pagelet kind.
///
/// The calling convention is fixed when the kind is declared.
#[derive(Clone)]
pub enum Condition {
    Simple(Arc<dyn Check>),
    WithAlternates(Arc<dyn AlternatesCheck>),
}

impl Condition {
    pub fn simple(check: impl Check + 'static) -> Self {
        Self::Simple(Arc::new(check))
    }

    pub fn with_alternates(check: impl AlternatesCheck + 'static) -> Self {
        Self::WithAlternates(Arc::new(check))
    }

    /// Synchronous predicate over the request.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        Self::simple(Predicate(predicate))
    }

    /// Constant verdict.
    pub fn always(allowed: bool) -> Self {
        Self::when(move |_| allowed)
    }

    async fn evaluate(&self, req: &RequestContext, alternates: &[String]) -> anyhow::Result<bool> {
        match self {
            Self::Simple(check) => check.check(req).await,
            Self::WithAlternates(check) => check.check(req, alternates).await,
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(_) => f.write_str("Condition::Simple"),
            Self::WithAlternates(_) => f.write_str("Condition::WithAlternates"),
        }
    }
}

struct Predicate<F>(F);

#[async_trait]
impl<F> Check for Predicate<F>
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    async fn check(&self, req: &RequestContext) -> anyhow::Result<bool> {
        Ok((self.0)(req))
    }
}

/// Resolve the activation of one instance.
///
/// `memo` is the instance's memoized state: once resolved it is returned as
/// is and the condition is never consulted again. Without a condition the
/// instance is active. A failing check counts as a rejection.
pub async fn authorize(
    condition: Option<&Condition>,
    memo: &mut Activation,
    req: &RequestContext,
    alternates: &[String],
) -> Activation {
    if memo.is_resolved() {
        return *memo;
    }

    let allowed = match condition {
        None => true,
        Some(condition) => match condition.evaluate(req, alternates).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(request = %req.request_id, error = %err, "authorization check failed, rejecting");
                false
            }
        },
    };

    *memo = Activation::from_bool(allowed);
    *memo
}
