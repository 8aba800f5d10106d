pub mod journal;
pub mod shard;
pub mod shuffle;

mod grpc;
mod router;
pub use router::Router;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid gRPC endpoint: '{0}'")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
    #[error(transparent)]
    Grpc(#[from] tonic::Status),
    #[error("append response not OK: {0:?}")]
    AppendNotOk(proto_gazette::broker::Status),
    #[error("{0}")]
    Protocol(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
