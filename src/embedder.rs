//! Placeholder embedding generator.
//!
//! The vector is drawn from a PRNG seeded with a hash of the image *path*;
//! the image itself is never opened. It stands in for a real encoder while
//! the rest of a system is wired up.

use std::io::Write;

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

pub const EMBEDDING_LEN: usize = 128;

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Output<'a> {
    Embedding { embedding: &'a [f64] },
    Error { error: &'a str },
}

/// 64-bit FNV-1a. Stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Deterministic pseudo-random vector in `[0, 1)` keyed off `path`.
pub fn generate_embedding(path: &str) -> Vec<f64> {
    let seed = fnv1a(path.as_bytes()) % (1u64 << 32);
    let mut rng = StdRng::seed_from_u64(seed);
    (0..EMBEDDING_LEN).map(|_| rng.gen::<f64>()).collect()
}

/// Write the JSON result for `path` to `out` and return the process exit code.
pub fn run(path: Option<&str>, out: &mut impl Write) -> Result<i32> {
    let (output, code) = match path {
        Some(path) => {
            let embedding = generate_embedding(path);
            log::debug!("stub embedding for {}", path);
            (
                serde_json::to_string(&Output::Embedding {
                    embedding: &embedding,
                })?,
                0,
            )
        }
        None => (
            serde_json::to_string(&Output::Error {
                error: "No image path provided",
            })?,
            1,
        ),
    };

    writeln!(out, "{}", output)?;
    out.flush()?;
    Ok(code)
}
