use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following QUARRY-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Configuration errors (bad chart/dataset definitions, bad requests)
/// - **2000-2999**: Execution errors (backing store connectivity, SQL failures)
/// - **3000-3999**: Cache errors (always absorbed by the executor)
/// - **4000-4999**: Row security resolution errors (fail closed)
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Configuration Errors (1000-1999) ===
    /// QUARRY-1001: Axis configuration is not valid JSON
    InvalidFieldSpec = 1001,
    /// QUARRY-1002: Dataset descriptor is incomplete or its info JSON is malformed
    InvalidDataset = 1002,
    /// QUARRY-1003: Runtime filter could not be decoded
    InvalidFilter = 1003,
    /// QUARRY-1004: Field name contains forbidden characters
    InvalidIdentifier = 1004,
    /// QUARRY-1005: Chart not found in the chart store
    ChartNotFound = 1005,
    /// QUARRY-1006: Dataset not found in the dataset store
    DatasetNotFound = 1006,
    /// QUARRY-1007: Application configuration is invalid
    InvalidConfiguration = 1007,

    // === Execution Errors (2000-2999) ===
    /// QUARRY-2001: Could not reach the backing query endpoint
    ConnectionFailed = 2001,
    /// QUARRY-2002: No pooled connection became available in time
    PoolExhausted = 2002,
    /// QUARRY-2003: The backing store rejected or failed the statement
    StatementFailed = 2003,
    /// QUARRY-2004: Query deadline elapsed
    QueryTimedOut = 2004,
    /// QUARRY-2005: A result row could not be converted
    RowDecodeFailed = 2005,
    /// QUARRY-2006: Chart/dataset metadata store unavailable
    MetadataUnavailable = 2006,

    // === Cache Errors (3000-3999) ===
    /// QUARRY-3001: Cache store unavailable
    CacheUnavailable = 3001,
    /// QUARRY-3002: Result set could not be encoded for the cache
    CacheEncodeFailed = 3002,
    /// QUARRY-3003: Cached bytes could not be decoded
    CacheDecodeFailed = 3003,

    // === Security Errors (4000-4999) ===
    /// QUARRY-4001: Row security resolver could not be consulted
    SecurityResolutionFailed = 4001,
    /// QUARRY-4002: Request carries no user identity
    MissingIdentity = 4002,

    // === Internal Errors (5000-5999) ===
    /// QUARRY-5001: Serialization/deserialization failed
    SerializationFailed = 5001,
    /// QUARRY-5002: Unexpected internal state
    Internal = 5002,

    /// QUARRY-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "QUARRY-2002")
    pub fn as_str(&self) -> String {
        format!("QUARRY-{:04}", self.as_u16())
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self.as_u16() {
            1000..=1999 => ErrorKind::Config,
            2000..=2999 => ErrorKind::Execution,
            3000..=3999 => ErrorKind::Cache,
            4000..=4999 => ErrorKind::SecurityResolution,
            _ => ErrorKind::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::ChartNotFound | Self::DatasetNotFound => 404,
            Self::MissingIdentity => 401,
            Self::QueryTimedOut => 504,
            Self::PoolExhausted | Self::MetadataUnavailable => 503,
            _ => match self.kind() {
                ErrorKind::Config => 400,
                ErrorKind::Execution => 502,
                ErrorKind::Cache => 503,
                ErrorKind::SecurityResolution | ErrorKind::Internal => 500,
            },
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("QUARRY-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::InvalidFieldSpec),
            1002 => Ok(Self::InvalidDataset),
            1003 => Ok(Self::InvalidFilter),
            1004 => Ok(Self::InvalidIdentifier),
            1005 => Ok(Self::ChartNotFound),
            1006 => Ok(Self::DatasetNotFound),
            1007 => Ok(Self::InvalidConfiguration),
            2001 => Ok(Self::ConnectionFailed),
            2002 => Ok(Self::PoolExhausted),
            2003 => Ok(Self::StatementFailed),
            2004 => Ok(Self::QueryTimedOut),
            2005 => Ok(Self::RowDecodeFailed),
            2006 => Ok(Self::MetadataUnavailable),
            3001 => Ok(Self::CacheUnavailable),
            3002 => Ok(Self::CacheEncodeFailed),
            3003 => Ok(Self::CacheDecodeFailed),
            4001 => Ok(Self::SecurityResolutionFailed),
            4002 => Ok(Self::MissingIdentity),
            5001 => Ok(Self::SerializationFailed),
            5002 => Ok(Self::Internal),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// The failure classes callers branch on.
///
/// `Cache` errors never reach callers of the executor; they are logged and absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    Config,
    Execution,
    Cache,
    SecurityResolution,
    Internal,
}
