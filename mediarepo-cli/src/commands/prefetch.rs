//! `prefetch`: batch-load several files, then read each one.

use std::time::Instant;

use mediarepo::repo::{normalize_title, QueryParams};
use mediarepo::MetadataRepo;
use tracing::info;

use crate::error::CliError;

pub fn run(repo: &mut MetadataRepo, names: &[String]) -> Result<(), CliError> {
    let start = Instant::now();
    repo.prefetch(names)?;
    let stats = repo.finalize()?;
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Prefetch complete"
    );

    println!("Prefetch: {}", stats);
    println!();

    let mut missing = 0;
    for name in names {
        let title = normalize_title(name);
        let found = repo
            .fetch(name, &QueryParams::new())
            .and_then(|env| env.first_image_info(&title).cloned());
        match found {
            Some(info) => println!(
                "  {:<40} {}",
                name,
                info.url.as_deref().unwrap_or("(no url)")
            ),
            None => {
                missing += 1;
                println!("  {:<40} (not found)", name);
            }
        }
    }

    if missing > 0 {
        println!();
        println!("{} of {} not found", missing, names.len());
    }
    Ok(())
}
