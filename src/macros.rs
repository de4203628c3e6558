/// Bump a stats counter by one.
///
/// Without the `stats` feature nothing is compiled.
#[macro_export]
macro_rules! stat_inc {
    ($counter:ident) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add(1, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Add an arbitrary amount to a stats counter (byte volumes and other
/// non-unit quantities).
///
/// Without the `stats` feature nothing is compiled, not even the amount
/// expression.
#[macro_export]
macro_rules! stat_add {
    ($counter:ident, $amount:expr) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add($amount as u64, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}
