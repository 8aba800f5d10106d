//! Coordinator resolution (§4.5 step 2-4): given a coordinator shard
//! identity, decide whether it's hosted in-process or must be reached over
//! the network, and in the latter case supply routing information.
//!
//! Mirrors the shape of `gazette::Router::route`'s resolver argument
//! (`Option<&Route>` plus a default), generalized to a trait so a consumer
//! runtime that hosts some shards locally can short-circuit the network
//! entirely for those.

use proto_gazette::broker::Route;
use proto_gazette::consumer::ShardId;

/// The outcome of resolving a coordinator (§4.5 step 2): `Ok` must carry
/// either a local handle or routing information; any other status maps to
/// a transient error reported through the read channel.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The coordinator is a shard hosted by this same process; the caller
    /// should subscribe through its in-process coordinator interface
    /// instead of dialing out.
    Local,
    /// The coordinator must be reached over the network at `route`.
    Remote(Route),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("coordinator {0:?} could not be resolved: {1}")]
    Unavailable(ShardId, String),
}

pub trait Resolver: Send + Sync {
    fn resolve(&self, coordinator: &ShardId) -> Result<Resolution, Error>;
}

/// A `Resolver` backed by a fixed set of locally-hosted shard identities;
/// anything else resolves to `Remote` using the supplied default route.
pub struct StaticResolver {
    local: std::collections::HashSet<ShardId>,
    default_route: Route,
}

impl StaticResolver {
    pub fn new(local: impl IntoIterator<Item = ShardId>, default_route: Route) -> Self {
        Self {
            local: local.into_iter().collect(),
            default_route,
        }
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, coordinator: &ShardId) -> Result<Resolution, Error> {
        if self.local.contains(coordinator) {
            Ok(Resolution::Local)
        } else {
            Ok(Resolution::Remote(self.default_route.clone()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_static_resolver_distinguishes_local_and_remote() {
        let resolver = StaticResolver::new(
            [ShardId("local/shard".to_string())],
            Route::default(),
        );

        assert!(matches!(
            resolver.resolve(&ShardId("local/shard".to_string())),
            Ok(Resolution::Local)
        ));
        assert!(matches!(
            resolver.resolve(&ShardId("remote/shard".to_string())),
            Ok(Resolution::Remote(_))
        ));
    }
}
