//! Tenant context: who is calling.
//!
//! The façade resolves the tenant once per request and threads it explicitly
//! through every mapper call, so the provider is consulted exactly once per
//! operation and background work carries the tenant it was enqueued with.

use std::sync::Arc;

/// Supplies the tenant id for the calling thread of execution.
///
/// An absent tenant is an error for every data-plane operation.
pub trait TenantContextProvider: Send + Sync {
    /// The current tenant, if one is set.
    fn current_tenant(&self) -> Option<String>;
}

/// A provider that always returns the same tenant.
///
/// Useful for embedding the layer in single-tenant processes and in tests.
#[derive(Debug, Clone)]
pub struct StaticTenant(pub String);

impl StaticTenant {
    pub fn new(tenant: impl Into<String>) -> Arc<Self> {
        Arc::new(Self(tenant.into()))
    }
}

impl TenantContextProvider for StaticTenant {
    fn current_tenant(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_tenant() {
        let provider = StaticTenant::new("org-1");
        assert_eq!(provider.current_tenant(), Some("org-1".to_string()));
    }
}
