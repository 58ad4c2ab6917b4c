#![allow(dead_code)]

pub mod builders;
pub mod fakes;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialise tracing once for the whole test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
