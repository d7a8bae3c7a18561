/// Client identity resolution.
///
/// The host (a DevOps extension frame, a desktop shell, ...) may be able to
/// name the current user; when it cannot, the engine falls back to an
/// anonymous id generated once and cached in the private store so it stays
/// stable across reloads. Resolution never fails the caller.
use log::{debug, warn};

use crate::storage::PrivateStore;
use crate::types::new_id;

/// Private-store key caching the generated anonymous id.
pub const KEY_ANON_ID: &str = "retro-v4-anon-id";

pub trait IdentityResolver: Send + Sync {
    /// The host's stable user id, or `None` when no host identity exists.
    fn resolve(&self) -> Option<String>;
}

/// Resolver for hosts with no identity provider at all.
pub struct AnonymousIdentity;

impl IdentityResolver for AnonymousIdentity {
    fn resolve(&self) -> Option<String> {
        None
    }
}

/// Resolve the current user id, falling back to the cached anonymous id.
pub fn resolve_identity(resolver: &dyn IdentityResolver, private: &dyn PrivateStore) -> String {
    if let Some(id) = resolver.resolve().filter(|id| !id.is_empty()) {
        return id;
    }
    if let Some(cached) = private.get(KEY_ANON_ID).filter(|id| !id.is_empty()) {
        debug!("using cached anonymous identity");
        return cached;
    }
    let generated = new_id();
    if let Err(e) = private.set(KEY_ANON_ID, &generated) {
        warn!("could not cache anonymous identity: {e}");
    }
    generated
}
