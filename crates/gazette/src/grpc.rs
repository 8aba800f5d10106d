//! Thin unary/server-streaming call helpers over our [`proto_gazette::codec::JsonCodec`],
//! standing in for the generated client stubs `tonic-build` would otherwise
//! produce from the broker/consumer/shuffle `.proto` services.

use crate::Error;
use proto_gazette::codec::JsonCodec;
use serde::{de::DeserializeOwned, Serialize};
use tonic::client::Grpc;
use tonic::transport::Channel;

pub(crate) async fn unary<Req, Resp>(
    channel: Channel,
    path: &'static str,
    req: Req,
) -> Result<Resp, Error>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + Sync + 'static,
{
    let mut grpc = Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Error::Grpc(tonic::Status::unavailable(e.to_string())))?;

    let path = tonic::codegen::http::uri::PathAndQuery::from_static(path);
    let resp = grpc
        .unary(tonic::Request::new(req), path, JsonCodec::default())
        .await?;
    Ok(resp.into_inner())
}

pub(crate) async fn server_streaming<Req, Resp>(
    channel: Channel,
    path: &'static str,
    req: Req,
) -> Result<tonic::Streaming<Resp>, Error>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + Sync + 'static,
{
    let mut grpc = Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Error::Grpc(tonic::Status::unavailable(e.to_string())))?;

    let path = tonic::codegen::http::uri::PathAndQuery::from_static(path);
    let resp = grpc
        .server_streaming(tonic::Request::new(req), path, JsonCodec::default())
        .await?;
    Ok(resp.into_inner())
}
