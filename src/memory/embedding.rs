//! Text embedding for long-term recall.
//!
//! A hashed bag-of-words: each lowercase alphanumeric token is hashed into
//! one of `dim` buckets with a hash-derived sign, then the vector is
//! L2-normalised. Summaries sharing a ticker and decision land close
//! together.

/// Embed `text` into a unit vector of length `dim`.
///
/// Text with no tokens embeds to the zero vector.
pub fn embed(text: &str, dim: usize) -> Vec<f32> {
    let mut vector = vec![0f32; dim];
    if dim == 0 {
        return vector;
    }

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let hash = token_hash(&token.to_lowercase());
        let bucket = (hash % dim as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn token_hash(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in token.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
