use crate::Error;
use proto_gazette::broker;
use proto_gazette::broker::ProcessSpecId as MemberId;
use std::collections::HashMap;
use std::sync::Arc;
use tonic::transport::Channel;

/// A Channel which may be ready (`Some`), currently being dialed (locked),
/// or neither (`None` and not locked). Ready channels track their use
/// count since the last sweep.
type DialState = Arc<futures::lock::Mutex<Option<(Channel, usize)>>>;

/// Dispatches requests to members of a dynamic serving topology (a broker
/// Route or consumer shard Route), dialing and caching Channels to member
/// endpoints as they're discovered (§4.5 "dispatch routing information
/// with the resolver's header").
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

struct Inner {
    states: std::sync::Mutex<HashMap<MemberId, DialState>>,
    zone: String,
}

impl Router {
    /// Create a new Router which prefers to route to members in `zone`.
    pub fn new(zone: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                states: Default::default(),
                zone: zone.to_string(),
            }),
        }
    }

    /// Resolve a ready Channel to serve an RPC against `route`, dialing a
    /// new member connection if none is ready. `default` is used when
    /// `route` is absent, as when the caller is dispatching directly to a
    /// known endpoint rather than through a resolved Route.
    pub async fn route(
        &self,
        route: Option<&broker::Route>,
        primary: bool,
        default: &MemberId,
    ) -> Result<Channel, Error> {
        let (index, state) = self.pick(route, primary, default);
        let mut state = state.lock().await;

        if let Some((ref client, uses)) = &mut *state {
            *uses += 1;
            return Ok(client.clone());
        }

        let endpoint = match index {
            Some(index) => &route.unwrap().endpoints[index],
            None => &default.suffix,
        };
        let channel = dial_channel(endpoint).await?;
        *state = Some((channel.clone(), 1));
        Ok(channel)
    }

    fn pick(
        &self,
        route: Option<&broker::Route>,
        primary: bool,
        default: &MemberId,
    ) -> (Option<usize>, DialState) {
        let mut states = self.inner.states.lock().unwrap();
        let index = pick(route, primary, &self.inner.zone, &states);

        let id = match index {
            Some(index) => &route.unwrap().members[index],
            None => default,
        };

        let state = match states.get(id) {
            Some(value) => value.clone(),
            None => states.entry(id.clone()).or_default().clone(),
        };

        (index, state)
    }

    /// Close Channels which have not been used since the preceding sweep.
    /// Call periodically so connections to members which have left the
    /// topology don't accumulate forever.
    pub fn sweep(&self) {
        let mut states = self.inner.states.lock().unwrap();

        states.retain(|id, state| {
            let Some(mut state) = state.try_lock() else {
                return true; // Currently connecting; keep.
            };
            let Some((_client, uses)) = &mut *state else {
                return false; // Never connected; drop.
            };
            if *uses == 0 {
                tracing::debug!(?id, "dropping idle member connection");
                return false;
            }
            *uses = 0;
            true
        });
    }
}

fn pick(
    route: Option<&broker::Route>,
    primary: bool,
    zone: &str,
    states: &HashMap<MemberId, DialState>,
) -> Option<usize> {
    let default_route = broker::Route::default();
    let route = route.unwrap_or(&default_route);

    route
        .members
        .iter()
        .zip(route.endpoints.iter())
        .enumerate()
        .max_by_key(|(index, (id, _endpoint))| {
            let connected = match states.get(id) {
                Some(state) => match state.try_lock() {
                    Some(state) => state.is_some(),
                    None => true, // Another task is dialing it.
                },
                None => false,
            };

            (
                primary && *index as i32 == route.primary,
                zone == id.zone,
                connected,
            )
        })
        .map(|(index, _)| index)
}

async fn dial_channel(endpoint: &str) -> Result<Channel, Error> {
    let endpoint = tonic::transport::Endpoint::from_shared(endpoint.to_string())
        .map_err(|_| Error::InvalidEndpoint(endpoint.to_string()))?
        .connect_timeout(std::time::Duration::from_secs(5));
    Ok(endpoint.connect().await?)
}

#[cfg(test)]
mod test {
    use super::*;

    fn member(zone: &str, suffix: &str) -> MemberId {
        MemberId {
            zone: zone.to_string(),
            suffix: suffix.to_string(),
        }
    }

    #[test]
    fn test_pick_prefers_primary_then_zone_then_connected() {
        let route = broker::Route {
            members: vec![member("west", "a"), member("east", "b")],
            endpoints: vec!["http://a".to_string(), "http://b".to_string()],
            primary: 1,
        };
        let states = HashMap::new();

        // Primary (index 1) wins even though it's not our zone.
        assert_eq!(pick(Some(&route), true, "west", &states), Some(1));
        // Without requiring primary, our zone wins.
        assert_eq!(pick(Some(&route), false, "west", &states), Some(0));
    }

    #[test]
    fn test_pick_with_no_route_returns_none() {
        let states = HashMap::new();
        assert_eq!(pick(None, false, "west", &states), None);
    }
}
