//! Shard RPCs: listing a task's live ShardSpecs, the input to
//! [`member_topology::Topology::from_shards`].

use crate::{grpc, Router};
use proto_gazette::broker::ProcessSpecId;
use proto_gazette::consumer;

pub async fn list_shards(
    router: &Router,
    default: &ProcessSpecId,
    selector: proto_gazette::broker::LabelSelector,
) -> crate::Result<Vec<consumer::ShardSpec>> {
    let channel = router.route(None, false, default).await?;
    let req = consumer::ListRequest {
        selector: Some(selector),
    };
    let resp: consumer::ListResponse =
        grpc::unary(channel, "/gazette.consumer.Shard/List", req).await?;

    Ok(resp.shards.into_iter().filter_map(|s| s.spec).collect())
}
