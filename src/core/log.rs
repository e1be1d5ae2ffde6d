use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[macro_export]
macro_rules! error {
    ( $($x:tt)+ ) => { ::tracing::error!( $($x)+ ); }
}

#[macro_export]
macro_rules! warn {
    ( $($x:tt)+ ) => { ::tracing::warn!( $($x)+ ); }
}

#[macro_export]
macro_rules! info {
    ( $($x:tt)+ ) => { ::tracing::info!( $($x)+ ); }
}

#[macro_export]
macro_rules! debug {
    ( $($x:tt)+ ) => { ::tracing::debug!( $($x)+ ); }
}

#[macro_export]
macro_rules! trace {
    ( $($x:tt)+ ) => { ::tracing::trace!( $($x)+ ); }
}

/// Logs at INFO in debug builds, DEBUG in release builds - for messages
/// that are useful during development but too chatty for production.
#[macro_export]
macro_rules! debug_info {
    ( $($x:tt)+ ) => {
        if cfg!(debug_assertions) {
            ::tracing::info!( $($x)+ )
        } else {
            ::tracing::debug!( $($x)+ )
        }
    }
}

/// Installs the global `tracing` subscriber from the given filter string
/// (`RUST_LOG`-style directives, e.g. `"typing_service=debug,info"`).
pub fn init(filter: &str) -> crate::Result<()> {
	let env_filter =
		EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(fmt::layer().with_target(true))
		.try_init()
		.map_err(|e| crate::err!("failed to install tracing subscriber: {e}"))?;

	Ok(())
}
