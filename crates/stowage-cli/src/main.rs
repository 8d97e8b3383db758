//! `stowage` binary.

use std::process;

#[tokio::main]
async fn main() {
    process::exit(stowage_cli::run().await);
}
