use std::time::Duration;

/// Per-connection keep-alive budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    remaining: u32,
    timeout: Duration,
}

impl KeepAlive {
    pub const fn new(max_requests: u32, timeout: Duration) -> Self {
        Self {
            remaining: max_requests,
            timeout,
        }
    }

    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Decide whether the connection stays open after this request.
    ///
    /// Returns the `Keep-Alive` header value when the client asked for it, the
    /// budget is not exhausted and the cycle is still inside the timeout. The
    /// advertised `max` is the budget before this request is counted.
    pub fn negotiate(&mut self, connection_header: Option<&str>, elapsed: Duration) -> Option<String> {
        let requested = connection_header.is_some_and(|v| v.trim().eq_ignore_ascii_case("keep-alive"));
        if !requested || self.remaining == 0 || elapsed >= self.timeout {
            return None;
        }
        let value = format!("timeout={}, max={}", self.timeout.as_secs(), self.remaining);
        self.remaining -= 1;
        Some(value)
    }
}
