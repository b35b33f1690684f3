//! # Anti-Abuse Guard
//!
//! Runs after signature verification and before routing. Sub-policies, in
//! order:
//!
//! 1. **TTL / timestamp window** - stale or future-dated envelopes are
//!    rejected before anything is cached.
//! 2. **Replay protection** - envelope ids are cached until past their TTL;
//!    a duplicate id is rejected without side effects.
//! 3. **Content dedupe** (email facet) - a body-hash seen within the window
//!    is rejected.
//! 4. **Greylist** - first contact between non-mutual peers is delayed; the
//!    sender must resend after the delay.
//! 5. **Postage** - cold outbound costs a credit debit from the sender.
//! 6. **Rate limit** - per-DID sliding window; when the backing store is
//!    down requests proceed with a degraded marker.
//!
//! Each policy is independently toggleable; the guard never mutates
//! anything beyond its own caches and the postage debit.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dedupe;
pub mod errors;
pub mod greylist;
pub mod guard;
pub mod postage;
pub mod rate_limit;
pub mod replay;

pub use dedupe::ContentDedupeCache;
pub use errors::GuardError;
pub use greylist::Greylist;
pub use guard::{EnvelopeGuard, GuardContext, GuardVerdict};
pub use postage::{NoPostage, PostageCharger, PostageError};
pub use rate_limit::SlidingWindowRateLimiter;
pub use replay::ReplayCache;
