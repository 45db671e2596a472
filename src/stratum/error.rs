use super::*;

#[derive(Debug, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub error_code: i32,
    pub message: String,
    pub traceback: Option<Value>,
}

impl Serialize for JsonRpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.error_code, &self.message, &self.traceback).serialize(serializer)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stratum error {}: {}", self.error_code, self.message)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseError {
    #[snafu(display("invalid hex integer `{input}`: {source}"))]
    ParseHexInt {
        input: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("invalid hex string `{input}`: {source}"))]
    ParseHex {
        input: String,
        source: hex::FromHexError,
    },

    #[snafu(display("{message}"))]
    Invalid { message: String },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("failed to connect to `{address}`: {source}"))]
    Connect {
        address: String,
        source: io::Error,
    },

    #[snafu(display("connection to `{address}` timed out"))]
    ConnectTimeout { address: String },

    #[snafu(display("io error: {source}"))]
    Io { source: io::Error },

    #[snafu(display("serialization error: {source}"))]
    Serialization { source: serde_json::Error },

    #[snafu(display("pool refused authorization for `{username}`"))]
    Unauthorized { username: String },

    #[snafu(display("{message}"))]
    Protocol { message: String },
}
