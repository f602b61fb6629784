//! Exact and near-duplicate removal.
//!
//! Exact deduplication hashes Unicode-normalized, whitespace-collapsed
//! text with SHA-256 and keeps first occurrences. Near-duplicate removal
//! runs MinHash signatures over word 5-shingles with LSH banding to find
//! candidate pairs, confirms with exact Jaccard similarity, and collapses
//! pairs at or above 0.95 to the longer chunk (ties by lexicographic
//! content hash).

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use sha2::{Digest, Sha256};

use super::CleanChunk;
use crate::io::normalize_for_hash;

/// Words per shingle.
const SHINGLE_SIZE: usize = 5;
/// MinHash permutations.
const NUM_PERMUTATIONS: usize = 128;
/// LSH bands (rows = permutations / bands).
const NUM_BANDS: usize = 16;
/// Jaccard similarity at which two chunks collapse.
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.95;

/// Strong content hash over normalized text.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_for_hash(text);
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{digest:x}")
}

/// Drops exact duplicates, keeping the first occurrence of each hash.
/// Returns the survivors and the number removed.
#[must_use]
pub fn dedup_exact(chunks: Vec<CleanChunk>) -> (Vec<CleanChunk>, usize) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut kept = Vec::with_capacity(chunks.len());
    let mut removed = 0usize;
    for chunk in chunks {
        if seen.insert(chunk.content_hash.clone()) {
            kept.push(chunk);
        } else {
            removed += 1;
        }
    }
    (kept, removed)
}

/// Word shingles of the normalized content.
fn shingles(text: &str) -> BTreeSet<u64> {
    let normalized = normalize_for_hash(text).to_lowercase();
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    let mut set = BTreeSet::new();
    if words.is_empty() {
        return set;
    }
    if words.len() < SHINGLE_SIZE {
        set.insert(hash_slice(&words));
        return set;
    }
    for window in words.windows(SHINGLE_SIZE) {
        set.insert(hash_slice(window));
    }
    set
}

fn hash_slice(words: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for word in words {
        word.hash(&mut hasher);
        0xffu8.hash(&mut hasher);
    }
    hasher.finish()
}

/// Deterministic per-permutation rehash (xorshift-style mix).
const fn permute(value: u64, seed: u64) -> u64 {
    let mut x = value ^ (seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn minhash_signature(shingle_set: &BTreeSet<u64>) -> Vec<u64> {
    let mut signature = vec![u64::MAX; NUM_PERMUTATIONS];
    for &shingle in shingle_set {
        for (perm, slot) in signature.iter_mut().enumerate() {
            let hashed = permute(shingle, perm as u64);
            if hashed < *slot {
                *slot = hashed;
            }
        }
    }
    signature
}

fn jaccard(a: &BTreeSet<u64>, b: &BTreeSet<u64>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Removes near-duplicates. Returns the survivors and the number removed.
///
/// Candidate pairs come from LSH banding over MinHash signatures, so the
/// amortized cost stays near O(n log n); each candidate is confirmed with
/// exact Jaccard before anything is dropped.
#[must_use]
pub fn dedup_near(chunks: Vec<CleanChunk>) -> (Vec<CleanChunk>, usize) {
    if chunks.len() < 2 {
        return (chunks, 0);
    }

    let shingle_sets: Vec<BTreeSet<u64>> = chunks.iter().map(|c| shingles(&c.content)).collect();
    let signatures: Vec<Vec<u64>> = shingle_sets.iter().map(minhash_signature).collect();

    // Band the signatures; same band hash => candidate pair.
    let rows = NUM_PERMUTATIONS / NUM_BANDS;
    let mut candidates: BTreeSet<(usize, usize)> = BTreeSet::new();
    for band in 0..NUM_BANDS {
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for (index, signature) in signatures.iter().enumerate() {
            let mut hasher = DefaultHasher::new();
            signature[band * rows..(band + 1) * rows].hash(&mut hasher);
            buckets.entry(hasher.finish()).or_default().push(index);
        }
        for bucket in buckets.values() {
            for (i, &a) in bucket.iter().enumerate() {
                for &b in &bucket[i + 1..] {
                    candidates.insert((a.min(b), a.max(b)));
                }
            }
        }
    }

    // Confirm candidates and mark losers.
    let mut dropped = vec![false; chunks.len()];
    for (a, b) in candidates {
        if dropped[a] || dropped[b] {
            continue;
        }
        let similarity = jaccard(&shingle_sets[a], &shingle_sets[b]);
        if similarity >= NEAR_DUPLICATE_THRESHOLD {
            let loser = pick_loser(&chunks[a], &chunks[b], a, b);
            dropped[loser] = true;
        }
    }

    let removed = dropped.iter().filter(|&&d| d).count();
    let kept = chunks
        .into_iter()
        .zip(dropped)
        .filter_map(|(chunk, dropped)| (!dropped).then_some(chunk))
        .collect();
    (kept, removed)
}

/// The longer chunk wins; ties break toward the lexicographically smaller
/// content hash.
fn pick_loser(a: &CleanChunk, b: &CleanChunk, index_a: usize, index_b: usize) -> usize {
    let len_a = a.content.chars().count();
    let len_b = b.content.chars().count();
    match len_a.cmp(&len_b) {
        std::cmp::Ordering::Greater => index_b,
        std::cmp::Ordering::Less => index_a,
        std::cmp::Ordering::Equal => {
            if a.content_hash <= b.content_hash {
                index_b
            } else {
                index_a
            }
        }
    }
}
