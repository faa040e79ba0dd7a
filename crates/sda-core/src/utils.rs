//! Small shared helpers: timestamps, the retry/back-off construct used by
//! every mutating store operation (§4.1, §9), and header hex encoding.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Error;

/// Current time in seconds since the Unix epoch.
pub fn secs_since_unix_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_secs()
}

/// Number of retry attempts the store contract allows before surfacing the
/// error upward (§4.1).
pub const RETRY_TIMES: u32 = 5;

/// Exponential back-off schedule shared by the store's retry contract and
/// the broker adapter's reconnect loop (§4.2, §9): 2, 4, 8, 16, 32 seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Retry an inner, single-attempt operation up to [`RETRY_TIMES`] with the
/// shared exponential back-off schedule. Short-circuits immediately on a
/// definitive error (`Error::is_definitive`) — retrying "no rows" or
/// "duplicate key" can never succeed.
///
/// This is the one higher-order construct §9 asks to unify the two-layered
/// retry pattern behind.
pub async fn with_retry<F, Fut, T>(operation: &str, mut f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_definitive() => {
                debug!(operation, %err, "definitive error, not retrying");
                return Err(err);
            }
            Err(err) if attempt + 1 >= RETRY_TIMES => {
                warn!(operation, attempts = attempt + 1, %err, "retry budget exhausted");
                return Err(err);
            }
            Err(err) => {
                let delay = backoff_delay(attempt + 1);
                warn!(operation, attempt, %err, ?delay, "retrying after back-off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Hex-encode bytes for storage in a text column (Crypt4GH headers are
/// stored hex-encoded at rest, §3).
pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex-encoded column back into raw bytes.
pub fn hex_decode(s: &str) -> Result<Vec<u8>, Error> {
    hex::decode(s).map_err(|e| Error::Validation(format!("invalid hex in stored header: {e}")))
}

/// Lower-case hex SHA256 digest, the one checksum algorithm in current use
/// (§3 `ChecksumType`).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_delay_follows_the_published_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn with_retry_short_circuits_on_definitive_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::NotFound("file".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test_op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Database("connection reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn hex_round_trips_header_bytes() {
        let header = b"crypt4gh-header-bytes";
        let encoded = hex_encode(header);
        assert_eq!(hex_decode(&encoded).unwrap(), header);
    }

    #[test]
    fn sha256_hex_is_deterministic_and_lowercase() {
        let digest = sha256_hex(b"hello world");
        assert_eq!(digest, "b94d27b9934d3e08a52e52d7da7dacefbd9bc5c8f58cd1f9f7d1c0d05e5c5b6a");
    }
}
