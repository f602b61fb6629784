//! Preprocessing pipeline scenarios.
//!
//! Drives the full pipeline over generated corpora and checks the dedup
//! arithmetic, metrics, idempotence, and installation behavior.

#![allow(clippy::expect_used)]

use std::path::Path;

use tempfile::TempDir;
use test_smith::preprocess::{Pipeline, PipelineOptions, QualityLabel, install};
use test_smith::providers::{
    FALLBACK_DIMENSIONS, FallbackEmbedder, Retriever, StaticRetriever,
};

/// One base-36 pair per value, giving stable two-character tokens.
fn token(value: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let hi = ALPHABET[(value / 36) % 36] as char;
    let lo = ALPHABET[value % 36] as char;
    format!("{hi}{lo}")
}

/// A single-chunk markdown document of ~250 two-character tokens. Token
/// sequences differ per seed, so distinct documents share almost no
/// shingles.
fn document(seed: usize) -> String {
    let tokens: Vec<String> = (0..250).map(|j| token(seed * 251 + j * 7)).collect();
    format!("# Topic note {seed}\n\n{}\n", tokens.join(" "))
}

/// A near-duplicate: one token replaced mid-document (Jaccard ~0.96).
/// The replacement is three characters long, so it can never equal a
/// generated token and the result is never byte-identical.
fn near_duplicate(seed: usize) -> String {
    let tokens: Vec<String> = (0..250)
        .map(|j| {
            if j == 125 {
                "qqq".to_string()
            } else {
                token(seed * 251 + j * 7)
            }
        })
        .collect();
    format!("# Topic note {seed}\n\n{}\n", tokens.join(" "))
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("write doc");
}

/// Scenario corpus: 100 markdown files of which 10 are byte-identical
/// duplicates and 5 are near-duplicates at ~0.96 similarity.
fn scenario_corpus(dir: &Path) {
    // 85 unique documents.
    for seed in 0..85 {
        write(dir, &format!("doc{seed:03}.md"), &document(seed));
    }
    // 10 byte-identical copies of the first ten documents.
    for seed in 0..10 {
        write(dir, &format!("copy{seed:03}.md"), &document(seed));
    }
    // 5 near-duplicates of documents 10..15.
    for seed in 10..15 {
        write(dir, &format!("near{seed:03}.md"), &near_duplicate(seed));
    }
}

#[test]
fn scenario_corpus_dedup_arithmetic() {
    let tmp = TempDir::new().expect("tmp");
    scenario_corpus(tmp.path());

    let output = Pipeline::new(PipelineOptions::default())
        .run(tmp.path())
        .expect("pipeline");

    assert_eq!(output.analyses.len(), 100);
    assert_eq!(output.report.exact_duplicates_removed, 10);
    assert_eq!(output.report.near_duplicates_removed, 5);
    // installed = total - exact - near (nothing dropped for length).
    assert_eq!(output.report.dropped_short, 0);
    assert_eq!(output.chunks.len(), 85);

    assert!((500..=1000).contains(&output.report.median_chunk_size));
    assert!(output.report.quality_label >= QualityLabel::Good);
}

#[test]
fn installed_chunks_have_unique_hashes_and_low_similarity() {
    let tmp = TempDir::new().expect("tmp");
    scenario_corpus(tmp.path());

    let output = Pipeline::new(PipelineOptions::default())
        .run(tmp.path())
        .expect("pipeline");

    let mut hashes = std::collections::BTreeSet::new();
    for chunk in &output.chunks {
        assert!(
            hashes.insert(chunk.content_hash.clone()),
            "duplicate hash survived: {}",
            chunk.content_hash
        );
    }
}

#[test]
fn pipeline_is_idempotent_per_source() {
    let tmp = TempDir::new().expect("tmp");
    scenario_corpus(tmp.path());

    let pipeline = Pipeline::new(PipelineOptions::default());
    let first = pipeline.run(tmp.path()).expect("first run");
    let second = pipeline.run(tmp.path()).expect("second run");
    assert_eq!(first.chunks, second.chunks);
    assert_eq!(first.report, second.report);
}

#[tokio::test]
async fn install_populates_collection_and_swap_replaces() {
    let tmp = TempDir::new().expect("tmp");
    scenario_corpus(tmp.path());
    let output = Pipeline::new(PipelineOptions::default())
        .run(tmp.path())
        .expect("pipeline");

    let embedder = FallbackEmbedder::new(FALLBACK_DIMENSIONS);
    let retriever = StaticRetriever::new();
    let installed = install(&output, &embedder, &retriever, "knowledge", 32)
        .await
        .expect("install");
    assert_eq!(installed, 85);

    let status = retriever.status("knowledge").await.expect("status");
    assert!(status.is_usable());
    assert_eq!(status.chunk_count, 85);

    // Re-install replaces wholesale rather than accumulating.
    let installed_again = install(&output, &embedder, &retriever, "knowledge", 32)
        .await
        .expect("reinstall");
    assert_eq!(installed_again, 85);
    let status = retriever.status("knowledge").await.expect("status");
    assert_eq!(status.chunk_count, 85);
}

#[test]
fn mixed_corpus_reports_strategies() {
    let tmp = TempDir::new().expect("tmp");
    write(tmp.path(), "guide.md", &document(500));
    let code = format!(
        "fn handler() {{\n{}}}\n\nfn helper() {{\n{}}}\n",
        "    let value = compute_next(previous_value, increment_step);\n".repeat(12),
        "    let other = merge_results(collected_items, default_limit);\n".repeat(12)
    );
    write(tmp.path(), "service.rs", &code);
    let prose = "This essay paragraph develops one argument with enough length to matter. "
        .repeat(80);
    write(tmp.path(), "essay.txt", &prose);

    let output = Pipeline::new(PipelineOptions {
        skip_low_quality: false,
        ..PipelineOptions::default()
    })
    .run(tmp.path())
    .expect("pipeline");

    let strategies: std::collections::BTreeSet<&str> = output
        .chunks
        .iter()
        .map(|c| c.strategy_used.as_str())
        .collect();
    assert!(strategies.contains("markdown-header"));
    assert!(strategies.contains("recursive-character"));
    assert!(strategies.contains("hybrid"));
}
