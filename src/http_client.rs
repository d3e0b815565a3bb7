//! Shared HTTP agent and bounded, retrying file downloads.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("xgbridge/", env!("CARGO_PKG_VERSION"));

/// Limits for one download.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DownloadPolicy {
    /// Attempts including the first one.
    pub attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Responses larger than this are rejected.
    pub max_bytes: u64,
}

impl DownloadPolicy {
    pub(crate) fn with_limit(max_bytes: u64) -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            max_bytes,
        }
    }

    /// Wait before retry number `retry` (1-based), doubling up to `max_delay`.
    fn delay_before(&self, retry: usize) -> Duration {
        let shift = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX).min(31);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
    })
}

/// Download `url` into `dest` through a `.part` file that is renamed on success.
///
/// Transport errors and 5xx responses are retried; 4xx responses fail at once.
pub(crate) fn download_to_path(
    url: &str,
    dest: &Path,
    policy: &DownloadPolicy,
) -> Result<(), String> {
    let response = get_with_retry(url, policy).map_err(|err| format!("Failed to download {url}: {err}"))?;
    let partial = dest.with_extension("part");
    let written = File::create(&partial).and_then(|file| {
        let mut writer = BufWriter::new(file);
        stream_limited(response, &mut writer, policy.max_bytes)?;
        writer.flush()
    });
    if let Err(err) = written {
        let _ = fs::remove_file(&partial);
        return Err(format!("Failed to write {}: {err}", partial.display()));
    }
    fs::rename(&partial, dest).map_err(|err| format!("Failed to move {}: {err}", dest.display()))
}

fn get_with_retry(url: &str, policy: &DownloadPolicy) -> Result<ureq::Response, ureq::Error> {
    let mut attempt = 1;
    loop {
        match agent().get(url).call() {
            Ok(response) => return Ok(response),
            Err(err) if attempt < policy.attempts && is_transient(&err) => {
                tracing::debug!("Download of {url} failed (attempt {attempt}): {err}");
                std::thread::sleep(policy.delay_before(attempt));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_transient(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

/// Copy the body into `writer`, failing once more than `max_bytes` arrive.
fn stream_limited(response: ureq::Response, writer: &mut impl Write, max_bytes: u64) -> io::Result<u64> {
    let declared = response
        .header("Content-Length")
        .and_then(|value| value.parse::<u64>().ok());
    if let Some(length) = declared.filter(|length| *length > max_bytes) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response too large: {length} bytes"),
        ));
    }
    let mut body = response.into_reader().take(max_bytes + 1);
    let copied = io::copy(&mut body, writer)?;
    if copied > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response exceeded {max_bytes} bytes"),
        ));
    }
    Ok(copied)
}
