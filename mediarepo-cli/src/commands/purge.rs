//! `purge`: evict cached metadata for files and load it again.
//!
//! The cache is per process, so the command warms it with one prefetch
//! round trip first; the reload that follows each purge always goes to the
//! remote API.

use mediarepo::repo::QueryParams;
use mediarepo::MetadataRepo;

use crate::error::CliError;

pub fn run(repo: &mut MetadataRepo, names: &[String]) -> Result<(), CliError> {
    repo.prefetch(names)?;
    repo.finalize()?;

    for name in names {
        let evicted = repo.purge(name);
        let reloaded = repo.fetch(name, &QueryParams::new()).is_some();
        println!(
            "{}: evicted {} cached entr{}, reload {}",
            name,
            evicted,
            if evicted == 1 { "y" } else { "ies" },
            if reloaded { "ok" } else { "failed" }
        );
    }
    Ok(())
}
