//! Tracing and diagnostics initialization (§10.1).
//!
//! Every dispatch-path span in this crate (`controller.dispatch`, `composite.step`,
//! `registry.*`, `wire.frame`) flows through whatever subscriber [`init`] installs; nothing
//! downstream cares whether that's a terminal, a file, or (in tests) nothing at all.

use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a global tracing subscriber: `RUST_LOG`-driven env filter (defaulting to
/// `info,domainctl=debug`), ANSI-colored compact formatting, and a [`miette`] panic hook for
/// readable diagnostics.
///
/// Safe to call more than once; subsequent calls are no-ops (the underlying
/// `tracing::subscriber::set_global_default` failure is swallowed, matching the common
/// pattern of calling this once per binary but any number of times across a test suite).
pub fn init() {
    let fmt_layer = fmt::layer().with_target(true).with_ansi(true);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,domainctl=debug"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init();

    miette::set_panic_hook();
}

/// Variant used by integration tests: emits `NEW`/`CLOSE` span events so assertions can
/// observe dispatch-path instrumentation boundaries without a real terminal.
pub fn init_for_tests() {
    let fmt_layer = fmt::layer()
        .with_test_writer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("debug,domainctl=trace"))
        .unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init();
}
