// Package identity baked in at compile time; served on GET /version.

pub const NAME: &str = env!("CARGO_PKG_NAME");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
