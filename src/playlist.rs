use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::error::Error;

/// Shuffle `candidates` and keep the first `count` of them.
///
/// A count larger than the candidate set is clamped to the whole set; `None`
/// keeps everything.
///
/// # Errors
/// Returns [`Error::EmptyScan`] when there is nothing to choose from.
pub fn sample(
    mut candidates: Vec<PathBuf>,
    count: Option<usize>,
    seed: Option<u64>,
) -> Result<Vec<PathBuf>, Error> {
    if candidates.is_empty() {
        return Err(Error::EmptyScan);
    }

    let available = candidates.len();
    let wanted = match count {
        Some(n) if n > available => {
            warn!(
                requested = n,
                available, "more images requested than found; showing all of them"
            );
            available
        }
        Some(n) => n,
        None => available,
    };

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    candidates.shuffle(&mut rng);
    candidates.truncate(wanted);
    info!(selected = candidates.len(), available, seeded = seed.is_some(), "playlist built");
    Ok(candidates)
}
