//! Marketplace session lifecycle.
//!
//! ```text
//!   Fresh --handshake--> Active --(N requests | expiry)--> Fresh
//! ```
//!
//! A session starts [`SessionPhase::Fresh`]; a warm-up request obtains the
//! cookies that make it [`SessionPhase::Active`]. After
//! `requests_per_session` search requests, or as soon as a response is
//! classified as expired, it drops back to `Fresh` and the next request
//! re-handshakes with an empty cookie jar.

use strum_macros::AsRefStr;

/// Phase of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum SessionPhase {
    /// No usable tokens; a handshake is required before searching.
    Fresh,
    /// Tokens obtained; searches may be issued.
    Active,
}

/// Session bookkeeping owned by one listing source.
#[derive(Debug, Clone)]
pub struct Session {
    phase: SessionPhase,
    requests_per_session: u32,
    requests_in_session: u32,
    total_requests: u64,
    handshakes: u64,
}

impl Session {
    /// Creates a fresh session rotated every `requests_per_session`
    /// searches. A value of `0` disables rotation.
    #[must_use]
    pub const fn new(requests_per_session: u32) -> Self {
        Self {
            phase: SessionPhase::Fresh,
            requests_per_session,
            requests_in_session: 0,
            total_requests: 0,
            handshakes: 0,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a handshake must happen before the next search.
    #[must_use]
    pub fn needs_handshake(&self) -> bool {
        self.phase == SessionPhase::Fresh
    }

    /// Records a successful handshake.
    pub const fn activate(&mut self) {
        self.phase = SessionPhase::Active;
        self.requests_in_session = 0;
        self.handshakes += 1;
    }

    /// Records an issued search request, rotating the session once the
    /// per-session quota is reached.
    pub fn record_request(&mut self) {
        self.requests_in_session += 1;
        self.total_requests += 1;
        if self.requests_per_session > 0 && self.requests_in_session >= self.requests_per_session
        {
            log::debug!(
                "Session reached {} requests, rotating",
                self.requests_in_session
            );
            self.phase = SessionPhase::Fresh;
        }
    }

    /// Marks the session as no longer accepted by the remote side.
    pub const fn expire(&mut self) {
        self.phase = SessionPhase::Fresh;
    }

    /// Search requests issued over the lifetime of this object.
    #[must_use]
    pub const fn total_requests(&self) -> u64 {
        self.total_requests
    }

    /// Handshakes completed over the lifetime of this object.
    #[must_use]
    pub const fn handshakes(&self) -> u64 {
        self.handshakes
    }
}
