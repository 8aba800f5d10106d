//! Journal RPCs: append, list, and read (§4.3, §4.5).

use crate::{grpc, Error, Router};
use futures::Stream;
use proto_gazette::broker::{self, ProcessSpecId};

/// Append a single chunk of content to `journal` and wait for the commit.
/// The production `append` RPC is client-streaming (a sequence of chunks
/// followed by an empty EOF chunk); since the Ingester always hands a
/// whole combined document to the publisher in one piece (§4.3), this
/// crate only needs the single-chunk case journal-client's `append_once`
/// models.
pub async fn append_once(
    router: &Router,
    default: &ProcessSpecId,
    journal: String,
    content: Vec<u8>,
) -> crate::Result<broker::AppendResponse> {
    let channel = router.route(None, false, default).await?;
    let req = broker::AppendRequest { journal, content };
    let resp: broker::AppendResponse =
        grpc::unary(channel, "/gazette.broker.Journal/Append", req).await?;

    let status =
        broker::Status::from_i32(resp.status).ok_or(Error::Protocol("invalid append status"))?;
    if status != broker::Status::Ok {
        return Err(Error::AppendNotOk(status));
    }
    Ok(resp)
}

/// List JournalSpecs matching `selector`.
pub async fn list_journals(
    router: &Router,
    default: &ProcessSpecId,
    selector: broker::LabelSelector,
) -> crate::Result<Vec<broker::JournalSpec>> {
    let channel = router.route(None, false, default).await?;
    let req = broker::ListRequest {
        selector: Some(selector),
    };
    let resp: broker::ListResponse =
        grpc::unary(channel, "/gazette.broker.Journal/List", req).await?;

    Ok(resp
        .journals
        .into_iter()
        .filter_map(|j| j.spec)
        .collect())
}

/// Open a blocking read of `journal` starting at `offset`, optionally
/// bounded by `end_offset` for a replay read (§4.5 step 2/4).
pub async fn read(
    router: &Router,
    default: &ProcessSpecId,
    journal: String,
    offset: i64,
    end_offset: i64,
) -> crate::Result<impl Stream<Item = crate::Result<broker::ReadResponse>>> {
    let channel = router.route(None, false, default).await?;
    let req = broker::ReadRequest {
        journal,
        offset,
        end_offset,
        block: true,
    };
    let stream = grpc::server_streaming(channel, "/gazette.broker.Journal/Read", req).await?;
    Ok(tokio_stream::StreamExt::map(stream, |item| {
        item.map_err(Error::from)
    }))
}
