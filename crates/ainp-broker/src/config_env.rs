//! Environment-driven configuration. The composition root is the only
//! place that reads the environment; every recognized option falls back
//! to its documented default.

use ainp_types::BrokerConfig;
use std::env;
use tracing::warn;

/// Load the broker configuration from the environment over the defaults.
#[must_use]
pub fn config_from_env() -> BrokerConfig {
    let mut config = BrokerConfig::default();

    read_bool("SIGNATURE_VERIFICATION_ENABLED", &mut config.signature.enabled);
    read_bool(
        "SIGNATURE_TEST_SENTINEL_ENABLED",
        &mut config.signature.allow_test_sentinel,
    );

    read_bool("CREDIT_LEDGER_ENABLED", &mut config.credits.enabled);
    read_u64("INITIAL_CREDITS", &mut config.credits.initial_allocation);

    read_u32("NEGOTIATION_MAX_ROUNDS", &mut config.negotiation.max_rounds);
    read_u64("NEGOTIATION_TTL_MS", &mut config.negotiation.ttl_ms);
    read_f64(
        "NEGOTIATION_CONVERGENCE_THRESHOLD",
        &mut config.negotiation.convergence_threshold,
    );
    read_u64(
        "NEGOTIATION_EXPIRATION_INTERVAL_SECONDS",
        &mut config.negotiation.expiration_interval_secs,
    );

    read_u64("RATE_LIMIT_WINDOW_MS", &mut config.rate_limit.window_ms);
    read_u32("RATE_LIMIT_MAX_REQUESTS", &mut config.rate_limit.max_requests);

    read_f64(
        "DISCOVERY_SIMILARITY_WEIGHT",
        &mut config.discovery.similarity_weight,
    );
    read_f64("DISCOVERY_TRUST_WEIGHT", &mut config.discovery.trust_weight);
    read_f64(
        "DISCOVERY_USEFULNESS_WEIGHT",
        &mut config.discovery.usefulness_weight,
    );
    read_bool(
        "DISCOVERY_USEFULNESS_RANKING_ENABLED",
        &mut config.discovery.usefulness_ranking_enabled,
    );
    read_f64(
        "VECTOR_SIMILARITY_THRESHOLD",
        &mut config.discovery.similarity_threshold,
    );
    read_usize("VECTOR_SEARCH_LIMIT", &mut config.discovery.search_limit);

    read_u64(
        "USEFULNESS_AGGREGATION_INTERVAL_HOURS",
        &mut config.pou.aggregation_interval_hours,
    );
    read_usize("POU_K", &mut config.pou.quorum_k);
    read_usize("POU_M", &mut config.pou.committee_m);
    read_u64(
        "POU_FINALIZER_INTERVAL_SECONDS",
        &mut config.pou.finalizer_interval_secs,
    );
    read_bool("POU_REQUIRE_STAKE", &mut config.pou.require_stake);

    read_bool(
        "EMAIL_GREYLIST_ENABLED",
        &mut config.mail_policy.greylist_enabled,
    );
    read_bool(
        "EMAIL_POSTAGE_ENABLED",
        &mut config.mail_policy.postage_enabled,
    );
    read_bool(
        "EMAIL_CONTENT_DEDUPE_ENABLED",
        &mut config.mail_policy.content_dedupe_enabled,
    );
    read_u64(
        "EMAIL_POSTAGE_AMOUNT_ATOMIC",
        &mut config.mail_policy.postage_amount_atomic,
    );
    read_u64(
        "EMAIL_GREYLIST_DELAY_SECONDS",
        &mut config.mail_policy.greylist_delay_secs,
    );
    read_u64(
        "EMAIL_DEDUPE_TTL_SECONDS",
        &mut config.mail_policy.dedupe_ttl_secs,
    );

    read_u64("CLOCK_SKEW_MS", &mut config.clock_skew_ms);

    config
}

fn read_bool(key: &str, slot: &mut bool) {
    if let Some(raw) = env::var(key).ok().filter(|v| !v.is_empty()) {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *slot = true,
            "0" | "false" | "no" | "off" => *slot = false,
            other => warn!(key, value = other, "Unparseable boolean, keeping default"),
        }
    }
}

fn read_u64(key: &str, slot: &mut u64) {
    read_parsed(key, slot);
}

fn read_u32(key: &str, slot: &mut u32) {
    read_parsed(key, slot);
}

fn read_usize(key: &str, slot: &mut usize) {
    read_parsed(key, slot);
}

fn read_f64(key: &str, slot: &mut f64) {
    read_parsed(key, slot);
}

fn read_parsed<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Some(raw) = env::var(key).ok().filter(|v| !v.is_empty()) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "Unparseable value, keeping default"),
        }
    }
}
