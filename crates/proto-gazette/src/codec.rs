//! A `tonic::codec::Codec` over our hand-maintained wire types (see the
//! crate doc comment). Production Gazette speaks protobuf, generated by
//! `prost`/`tonic-build`; since that codegen pipeline is out of scope here,
//! RPC bodies are instead framed as length-prefixed JSON using this codec.
//! The request/response shapes are otherwise identical to the real
//! protocol, so everything above the wire (Router, retry, back-pressure)
//! is unaffected by the substitution.

use bytes::{Buf, BufMut};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

#[derive(Debug, Clone, Default)]
pub struct JsonCodec<T, U>(PhantomData<(T, U)>);

impl<T, U> Codec for JsonCodec<T, U>
where
    T: Serialize + Send + Sync + 'static,
    U: DeserializeOwned + Send + Sync + 'static,
{
    type Encode = T;
    type Decode = U;
    type Encoder = JsonEncoder<T>;
    type Decoder = JsonDecoder<U>;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(PhantomData)
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(PhantomData)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonEncoder<T>(PhantomData<T>);

impl<T: Serialize> Encoder for JsonEncoder<T> {
    type Item = T;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        let bytes = serde_json::to_vec(&item)
            .map_err(|e| Status::internal(format!("encoding request: {e}")))?;
        dst.put_slice(&bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonDecoder<U>(PhantomData<U>);

impl<U: DeserializeOwned> Decoder for JsonDecoder<U> {
    type Item = U;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        if !src.has_remaining() {
            return Ok(None);
        }
        let buf = src.copy_to_bytes(src.remaining());
        let item = serde_json::from_slice(&buf)
            .map_err(|e| Status::internal(format!("decoding response: {e}")))?;
        Ok(Some(item))
    }
}
