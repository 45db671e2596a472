use super::*;

// Context selectors for use in submodules.
use error::{ParseHexIntSnafu, ParseHexSnafu};

mod authorize;
mod client;
mod error;
mod extranonce;
mod job_id;
mod merkle;
mod message;
mod nbits;
mod nonce;
mod notify;
mod ntime;
mod prevhash;
mod set_difficulty;
mod submit;
mod subscribe;
mod version;

pub use {
    authorize::Authorize,
    client::{Client, ClientConfig},
    error::{ClientError, JsonRpcError, ParseError},
    extranonce::Extranonce,
    job_id::JobId,
    merkle::{MerkleNode, merkle_root},
    message::{Id, Message},
    nbits::Nbits,
    nonce::Nonce,
    notify::Notify,
    ntime::Ntime,
    prevhash::PrevHash,
    set_difficulty::SetDifficulty,
    submit::Submit,
    subscribe::{Subscribe, SubscribeResult},
    version::Version,
};

pub const MAX_MESSAGE_SIZE: usize = 32 * 1024;
