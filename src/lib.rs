use {
    anyhow::{Context, Error, anyhow, ensure},
    arguments::Arguments,
    bitcoin::{
        Amount, CompactTarget, Target, block,
        hashes::{Hash, sha256d},
    },
    byteorder::{ByteOrder, LittleEndian},
    clap::Parser,
    derive_more::Display,
    difficulty::Difficulty,
    dispatcher::Dispatcher,
    hash_rate::HashRate,
    job::Job,
    kernel::Kernel,
    lazy_static::lazy_static,
    metrics::Metrics,
    parking_lot::{Condvar, Mutex},
    primitive_types::U256,
    rand::Rng,
    serde::{
        Deserialize, Serialize, Serializer,
        de::{self, Deserializer},
        ser::SerializeSeq,
    },
    serde_json::Value,
    serde_with::{DeserializeFromStr, SerializeDisplay},
    share::{ShareCandidate, ShareQueue},
    snafu::{ResultExt, Snafu},
    std::{
        collections::{BTreeMap, VecDeque},
        env,
        fmt::{self, Display, Formatter},
        io::{self, Write},
        process,
        str::FromStr,
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        thread,
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratum::{
        Authorize, Extranonce, JobId, Message, Nbits, Nonce, Notify, Ntime, PrevHash,
        SetDifficulty, Submit, Subscribe, SubscribeResult, Version,
    },
    sysinfo::System,
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
        net::TcpStream,
        runtime::Runtime,
        signal::ctrl_c,
        task,
        time::{sleep, timeout},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    tracing_subscriber::EnvFilter,
};

mod arguments;
mod backoff;
pub mod benchmark;
pub mod controller;
pub mod difficulty;
pub mod dispatcher;
pub mod hash_rate;
pub mod job;
pub mod kernel;
pub mod metrics;
pub mod p2p;
pub mod share;
pub mod stratum;
pub mod worker;

pub const USER_AGENT: &str = "krill/0.1.0";
pub const COIN_VALUE: u64 = 100_000_000;

type Result<T = (), E = Error> = std::result::Result<T, E>;

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Arguments::parse();

    match args.run() {
        Ok(()) => process::exit(0),
        Err(err) => {
            error!("error: {err}");

            if env::var_os("RUST_BACKTRACE")
                .map(|val| val == "1")
                .unwrap_or_default()
            {
                error!("{}", err.backtrace());
            }

            if matches!(
                err.downcast_ref::<stratum::ClientError>(),
                Some(stratum::ClientError::Unauthorized { .. })
            ) {
                process::exit(2);
            }

            process::exit(1);
        }
    }
}
