//! Parser for the textual output of the system `ping` command
//!
//! Parsing is all-or-nothing: a single malformed numeric token anywhere in a
//! recognised line, or a missing summary line, leaves the parser in the
//! invalid state with every statistic at its sentinel value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Per-reply line: `64 bytes from ...: icmp_seq=1 ttl=115 time=11.2 ms`
/// or `Reply from ...: bytes=32 time<1ms TTL=128`.
static REPLY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s)(?:(\S+)\s+bytes\s+from\b|bytes=(\S+)).*?\btime\s*([=<])\s*(\S+)")
        .expect("reply pattern compiles")
});

/// Summary line: `4 packets transmitted, 4 received, 0% packet loss, time 3004ms`
static SUMMARY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\S+)\s+packets\s+transmitted,\s*(\S+)\s+(?:packets\s+)?received,\s*(?:\+\S+\s+\w+,\s*)*(\S+)%\s+packet\s+loss",
    )
    .expect("summary pattern compiles")
});

/// Lifecycle of a parser instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParserState {
    /// Nothing parsed since creation or the last reset
    Idle,
    /// The last input parsed completely
    Valid,
    /// The last input was rejected
    Invalid,
}

/// Statistics extracted from ping output.
///
/// Only meaningful when `valid` is true; otherwise every field holds the
/// sentinel produced by [`PingStatistics::invalid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingStatistics {
    pub valid: bool,
    pub packets_transmitted: i32,
    pub packets_received: i32,
    /// Loss in percent
    pub packet_loss: f64,
    /// Bytes per reply, taken from the first reply line
    pub bytes: i32,
    /// Reply lines carrying a time marker (`=` or `<`)
    pub valid_times: i32,
    /// Mean of the `time=` values in milliseconds
    pub average_time: f64,
}

impl PingStatistics {
    /// The sentinel state
    pub fn invalid() -> Self {
        Self {
            valid: false,
            packets_transmitted: -1,
            packets_received: -1,
            packet_loss: -1.0,
            bytes: -1,
            valid_times: 0,
            average_time: 0.0,
        }
    }
}

impl Default for PingStatistics {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Single-shot parser; call [`reset`](PingOutputParser::reset) or
/// [`parse`](PingOutputParser::parse) again to reuse it.
#[derive(Debug, Clone)]
pub struct PingOutputParser {
    state: ParserState,
    statistics: PingStatistics,
}

impl Default for PingOutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PingOutputParser {
    /// Create a parser in the idle state
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            statistics: PingStatistics::invalid(),
        }
    }

    /// Parse `output`, replacing any previous result. Returns validity.
    pub fn parse(&mut self, output: &str) -> bool {
        match parse_statistics(output) {
            Ok(statistics) => {
                self.statistics = statistics;
                self.state = ParserState::Valid;
                true
            }
            Err(reason) => {
                trace!("Rejecting ping output: {}", reason);
                self.statistics = PingStatistics::invalid();
                self.state = ParserState::Invalid;
                false
            }
        }
    }

    /// Return to the idle state with sentinel statistics
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.statistics = PingStatistics::invalid();
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.statistics.valid
    }

    pub fn statistics(&self) -> &PingStatistics {
        &self.statistics
    }

    pub fn into_statistics(self) -> PingStatistics {
        self.statistics
    }

    pub fn packets_transmitted(&self) -> i32 {
        self.statistics.packets_transmitted
    }

    pub fn packets_received(&self) -> i32 {
        self.statistics.packets_received
    }

    pub fn packet_loss(&self) -> f64 {
        self.statistics.packet_loss
    }

    pub fn bytes(&self) -> i32 {
        self.statistics.bytes
    }

    pub fn valid_times(&self) -> i32 {
        self.statistics.valid_times
    }

    pub fn average_time(&self) -> f64 {
        self.statistics.average_time
    }
}

/// Convenience wrapper for one-off parsing
pub fn parse_ping_output(output: &str) -> PingStatistics {
    let mut parser = PingOutputParser::new();
    parser.parse(output);
    parser.into_statistics()
}

fn parse_statistics(output: &str) -> Result<PingStatistics, String> {
    if output.trim().is_empty() {
        return Err("empty output".to_string());
    }

    let lines: Vec<&str> = output.lines().collect();
    if lines.is_empty() {
        return Err("no lines".to_string());
    }

    let mut statistics = PingStatistics::invalid();

    // Per-reply pass
    let mut bytes: Option<i32> = None;
    let mut time_sum = 0.0;
    let mut measured = 0;
    let mut valid_times = 0;

    for line in &lines {
        let Some(captures) = REPLY_PATTERN.captures(line) else {
            continue;
        };

        let byte_token = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let byte_count = parse_count(byte_token)
            .ok_or_else(|| format!("invalid byte count {:?}", byte_token))?;
        bytes.get_or_insert(byte_count);

        let marker = captures.get(3).map(|m| m.as_str()).unwrap_or_default();
        if marker == "=" {
            let time_token = captures.get(4).map(|m| m.as_str()).unwrap_or_default();
            let time_token = time_token.strip_suffix("ms").unwrap_or(time_token);
            let time = parse_decimal(time_token)
                .ok_or_else(|| format!("invalid reply time {:?}", time_token))?;
            time_sum += time;
            measured += 1;
        }
        valid_times += 1;
    }

    statistics.bytes = bytes.unwrap_or(-1);
    statistics.valid_times = valid_times;
    statistics.average_time = if measured > 0 {
        time_sum / measured as f64
    } else {
        0.0
    };

    // Summary pass
    let captures = lines
        .iter()
        .rev()
        .find_map(|line| SUMMARY_PATTERN.captures(line))
        .ok_or_else(|| "no summary line".to_string())?;

    let transmitted = &captures[1];
    statistics.packets_transmitted = parse_count(transmitted)
        .ok_or_else(|| format!("invalid transmitted count {:?}", transmitted))?;

    let received = &captures[2];
    statistics.packets_received = parse_count(received)
        .ok_or_else(|| format!("invalid received count {:?}", received))?;

    let loss = &captures[3];
    statistics.packet_loss =
        parse_decimal(loss).ok_or_else(|| format!("invalid packet loss {:?}", loss))?;

    statistics.valid = true;
    Ok(statistics)
}

/// Non-negative decimal integer; rejects signs, separators and overflow
fn parse_count(token: &str) -> Option<i32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<i32>().ok()
}

/// Non-negative decimal with a period separator, e.g. `12`, `0.045`
fn parse_decimal(token: &str) -> Option<f64> {
    let (integer, fraction) = match token.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (token, None),
    };

    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(integer) || fraction.is_some_and(|f| !digits(f)) {
        return None;
    }

    token.parse::<f64>().ok().filter(|value| value.is_finite())
}
