//! ASPset-510 dataset tools
//!
//! Command-line interface for downloading, browsing, and evaluating against
//! the ASPset-510 dataset using the aspset510 library.

#[cfg(feature = "cli")]
use aspset510::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
