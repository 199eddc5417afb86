/// Logging macros for the courier crates that call into tracing underneath.
///
/// Each macro checks the log level feature of the crate it is expanded in, so a
/// crate opts into a level by declaring `log_info`, `log_warnings`, `log_debug`,
/// `log_errors` or `log_trace` in its own feature table. Levels that are not
/// enabled compile down to nothing.
///
/// See similar: https://doc.rust-lang.org/src/std/macros.rs.html#138-145.

#[doc(hidden)]
pub use tracing;

#[macro_export]
macro_rules! info {
    ($($t:tt)*) => {
        if cfg!(feature = "log_info") {
            $crate::tracing::info!($($t)*);
        }
    };
}

#[macro_export]
macro_rules! warn {
    ($($t:tt)*) => {
        if cfg!(feature = "log_warnings") {
            $crate::tracing::warn!($($t)*);
        }
    };
}

#[macro_export]
macro_rules! debug {
    ($($t:tt)*) => {
        if cfg!(feature = "log_debug") {
            $crate::tracing::debug!($($t)*);
        }
    };
}

#[macro_export]
macro_rules! error {
    ($($t:tt)*) => {
        if cfg!(feature = "log_errors") {
            $crate::tracing::error!($($t)*);
        }
    };
}

/// `trace` is reserved for per chunk and per message logging which is far
/// too noisy for anything but stepping through a single exchange.
#[macro_export]
macro_rules! trace {
    ($($t:tt)*) => {
        if cfg!(feature = "log_trace") {
            $crate::tracing::trace!($($t)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn emits_enabled_levels() {
        info!("stream closed");
        warn!("stream cancelled");
        error!("framing violated");

        assert!(logs_contain("stream closed"));
        assert!(logs_contain("stream cancelled"));
        assert!(logs_contain("framing violated"));
    }

    #[test]
    #[traced_test]
    fn supports_structured_fields() {
        info!(declared = 3_u64, "negotiated fixed length framing");
        error!(reason = "peer gone", "channel closed: {}", 1000);

        assert!(logs_contain("negotiated fixed length framing"));
        assert!(logs_contain("channel closed: 1000"));
    }

    #[test]
    #[traced_test]
    fn skips_disabled_levels() {
        trace!("chunk of 3 bytes");
        assert!(!logs_contain("chunk of 3 bytes"));
    }
}
