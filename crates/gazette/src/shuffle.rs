//! Client side of the `Shuffle` streaming RPC (§6): the call a Read state
//! machine makes once it has resolved a coordinator shard.

use crate::{grpc, Router};
use futures::Stream;
use proto_gazette::broker::ProcessSpecId;
use proto_gazette::shuffle::{ShuffleRequest, ShuffleResponse};

/// Open a Shuffle subscription against the coordinator addressed by
/// `route`/`default`, per §4.5 step 4 ("dispatch routing information with
/// the resolver's header and open a Shuffle streaming RPC").
pub async fn open(
    router: &Router,
    route: Option<&proto_gazette::broker::Route>,
    default: &ProcessSpecId,
    request: ShuffleRequest,
) -> crate::Result<impl Stream<Item = crate::Result<ShuffleResponse>>> {
    let channel = router.route(route, false, default).await?;
    let stream = grpc::server_streaming(channel, "/flow.Shuffler/Shuffle", request).await?;
    Ok(tokio_stream::StreamExt::map(stream, |item| {
        item.map_err(crate::Error::from)
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use proto_gazette::flow::RangeSpec;

    #[test]
    fn test_shuffle_request_round_trips_through_json() {
        // Exercises the JsonCodec's underlying shape (not the network path):
        // a ShuffleRequest must serialize and deserialize losslessly, since
        // that's the substitute wire format this crate speaks in place of
        // protobuf.
        let req = ShuffleRequest {
            journal: "acmeCo/orders/part=0;fromOrders".to_string(),
            coordinator: proto_gazette::consumer::ShardId("derive/acmeCo/totals/0".to_string()),
            build: "build-id".to_string(),
            range: RangeSpec {
                key_begin: 0,
                key_end: u32::MAX,
                r_clock_begin: 0,
                r_clock_end: u32::MAX,
            },
            offset: 1024,
            end_offset: 0,
            source_schema: None,
            partition_include: Default::default(),
            partition_exclude: Default::default(),
            resolution_header: None,
        };
        let encoded = serde_json::to_vec(&req).unwrap();
        let decoded: ShuffleRequest = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.journal, req.journal);
        assert_eq!(decoded.offset, req.offset);
    }
}
