use std::io;
use std::io::{Read, Write};

use async_trait::async_trait;
use containers::ssz::{SszReadDefault, SszWrite};
use containers::{Block, State};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::{
    Behaviour as RequestResponse, Codec, Config, Event, ProtocolSupport,
};
use snap::read::FrameDecoder;
use snap::write::FrameEncoder;

use crate::types::{
    BatchedBeaconBlockRequest, BeaconBlockRequest, BeaconStateRequest, OutboundP2pRequest,
};

/// Upper bound on the number of slots a single range request may cover.
pub const MAX_REQUEST_BLOCKS: u64 = 1024;

/// Upper bound on a single SSZ chunk, protecting the decoder from bogus length prefixes.
pub const MAX_CHUNK_SIZE: usize = 1 << 20;

pub const BLOCKS_BY_RANGE_PROTOCOL_V1: &str =
    "/eth2/beacon_chain/req/beacon_blocks_by_range/1/ssz_snappy";
pub const BLOCK_BY_HASH_PROTOCOL_V1: &str =
    "/eth2/beacon_chain/req/beacon_block_by_hash/1/ssz_snappy";
pub const STATE_PROTOCOL_V1: &str = "/eth2/beacon_chain/req/beacon_state/1/ssz_snappy";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SyncProtocol(pub String);

impl AsRef<str> for SyncProtocol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SyncProtocol {
    /// Protocol a given outbound request travels on.
    pub fn for_request(request: &OutboundP2pRequest) -> Self {
        let name = match request {
            OutboundP2pRequest::RequestBlocksByRange(_) => BLOCKS_BY_RANGE_PROTOCOL_V1,
            OutboundP2pRequest::RequestBlockByHash(_) => BLOCK_BY_HASH_PROTOCOL_V1,
            OutboundP2pRequest::RequestState(_) => STATE_PROTOCOL_V1,
        };
        SyncProtocol(name.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResponse {
    Blocks(Vec<Block>),
    State(Box<State>),
    Empty,
}

#[derive(Clone, Default)]
pub struct SyncCodec;

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

impl SyncCodec {
    /// Compress data using Snappy framing format (required for req/resp protocol)
    fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(data)?;
        encoder
            .into_inner()
            .map_err(|e| io::Error::other(format!("Snappy framing failed: {e}")))
    }

    /// Decompress data using Snappy framing format (required for req/resp protocol)
    fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = FrameDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    fn ssz_bytes<T: SszWrite>(value: &T) -> io::Result<Vec<u8>> {
        value
            .to_ssz()
            .map_err(|e| io::Error::other(format!("SSZ encode failed: {e}")))
    }

    fn from_ssz<T: SszReadDefault>(bytes: &[u8], what: &str) -> io::Result<T> {
        T::from_ssz_default(bytes)
            .map_err(|e| invalid_data(format!("SSZ decode {what} failed: {e:?}")))
    }

    pub fn encode_request(request: &OutboundP2pRequest) -> io::Result<Vec<u8>> {
        let ssz_bytes = match request {
            OutboundP2pRequest::RequestBlocksByRange(range) => Self::ssz_bytes(range)?,
            OutboundP2pRequest::RequestBlockByHash(by_hash) => Self::ssz_bytes(by_hash)?,
            OutboundP2pRequest::RequestState(state) => Self::ssz_bytes(state)?,
        };
        Self::compress(&ssz_bytes)
    }

    pub fn decode_request(protocol: &str, data: &[u8]) -> io::Result<OutboundP2pRequest> {
        let ssz_bytes = Self::decompress(data)?;

        match protocol {
            BLOCKS_BY_RANGE_PROTOCOL_V1 => {
                let range: BatchedBeaconBlockRequest =
                    Self::from_ssz(&ssz_bytes, "BatchedBeaconBlockRequest")?;
                if range.is_empty() {
                    return Err(invalid_data(format!(
                        "Empty block range requested: {}..={}",
                        range.start_slot, range.end_slot
                    )));
                }
                if range.len() > MAX_REQUEST_BLOCKS {
                    return Err(invalid_data(format!(
                        "Too many blocks requested: {} > {}",
                        range.len(),
                        MAX_REQUEST_BLOCKS
                    )));
                }
                Ok(OutboundP2pRequest::RequestBlocksByRange(range))
            }
            BLOCK_BY_HASH_PROTOCOL_V1 => Ok(OutboundP2pRequest::RequestBlockByHash(
                Self::from_ssz::<BeaconBlockRequest>(&ssz_bytes, "BeaconBlockRequest")?,
            )),
            STATE_PROTOCOL_V1 => Ok(OutboundP2pRequest::RequestState(
                Self::from_ssz::<BeaconStateRequest>(&ssz_bytes, "BeaconStateRequest")?,
            )),
            _ => Err(io::Error::other(format!("Unknown protocol: {protocol}"))),
        }
    }

    /// Each block becomes one chunk: a little-endian `u32` length followed by
    /// its SSZ bytes.
    pub fn encode_response(response: &SyncResponse) -> io::Result<Vec<u8>> {
        let ssz_bytes = match response {
            SyncResponse::Blocks(blocks) => {
                let mut bytes = Vec::new();
                for block in blocks {
                    let block_bytes = Self::ssz_bytes(block)?;
                    let len = u32::try_from(block_bytes.len())
                        .map_err(|_| invalid_data("Block too large to frame".to_owned()))?;
                    bytes.extend_from_slice(&len.to_le_bytes());
                    bytes.extend_from_slice(&block_bytes);
                }
                bytes
            }
            SyncResponse::State(state) => Self::ssz_bytes(state.as_ref())?,
            SyncResponse::Empty => Vec::new(),
        };

        if ssz_bytes.is_empty() {
            return Ok(Vec::new());
        }

        Self::compress(&ssz_bytes)
    }

    pub fn decode_response(protocol: &str, data: &[u8]) -> io::Result<SyncResponse> {
        if data.is_empty() {
            return Ok(SyncResponse::Empty);
        }

        let ssz_bytes = Self::decompress(data)?;

        match protocol {
            BLOCKS_BY_RANGE_PROTOCOL_V1 | BLOCK_BY_HASH_PROTOCOL_V1 => {
                Ok(SyncResponse::Blocks(Self::decode_block_chunks(&ssz_bytes)?))
            }
            STATE_PROTOCOL_V1 => Ok(SyncResponse::State(Box::new(Self::from_ssz::<State>(
                &ssz_bytes, "State",
            )?))),
            _ => Err(io::Error::other(format!("Unknown protocol: {protocol}"))),
        }
    }

    fn decode_block_chunks(mut bytes: &[u8]) -> io::Result<Vec<Block>> {
        let mut blocks = Vec::new();

        while !bytes.is_empty() {
            let (prefix, rest) = bytes
                .split_first_chunk::<4>()
                .ok_or_else(|| invalid_data("Truncated chunk length prefix".to_owned()))?;
            let len = u32::from_le_bytes(*prefix) as usize;
            if len > MAX_CHUNK_SIZE {
                return Err(invalid_data(format!(
                    "Chunk length {len} exceeds limit {MAX_CHUNK_SIZE}"
                )));
            }
            if rest.len() < len {
                return Err(invalid_data(format!(
                    "Truncated chunk: expected {len} bytes, got {}",
                    rest.len()
                )));
            }

            let (chunk, remaining) = rest.split_at(len);
            blocks.push(Self::from_ssz::<Block>(chunk, "Block")?);
            bytes = remaining;
        }

        Ok(blocks)
    }
}

#[async_trait]
impl Codec for SyncCodec {
    type Protocol = SyncProtocol;
    type Request = OutboundP2pRequest;
    type Response = SyncResponse;

    async fn read_request<T>(
        &mut self,
        protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        io.read_to_end(&mut data).await?;
        Self::decode_request(&protocol.0, &data)
    }

    async fn read_response<T>(
        &mut self,
        protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        io.read_to_end(&mut data).await?;
        Self::decode_response(&protocol.0, &data)
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        request: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = Self::encode_request(&request)?;
        io.write_all(&data).await?;
        io.close().await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        response: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = Self::encode_response(&response)?;
        io.write_all(&data).await?;
        io.close().await
    }
}

pub type ReqResp = RequestResponse<SyncCodec>;

pub type ReqRespMessage = Event<OutboundP2pRequest, SyncResponse>;

pub fn build(protocols: impl IntoIterator<Item = String>) -> ReqResp {
    let protocols = protocols
        .into_iter()
        .map(|name| (SyncProtocol(name), ProtocolSupport::Full))
        .collect::<Vec<_>>();

    RequestResponse::with_codec(SyncCodec, protocols, Config::default())
}

pub fn build_default() -> ReqResp {
    build(vec![
        BLOCKS_BY_RANGE_PROTOCOL_V1.to_string(),
        BLOCK_BY_HASH_PROTOCOL_V1.to_string(),
        STATE_PROTOCOL_V1.to_string(),
    ])
}
