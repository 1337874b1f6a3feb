//! Build an index, persist it in both formats, and query it back.
//!
//! ```bash
//! RUST_LOG=lshdb=info cargo run --example index_demo
//! ```

use lshdb::{LoadMode, LshIndex, LshParams, SerialFormat};
use rand::prelude::*;
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

fn main() -> lshdb::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lshdb=info")))
        .init();

    println!("LSH index demo");
    println!("==============\n");

    let dim = 12;
    let mut rng = StdRng::seed_from_u64(7);
    let vectors: Vec<Vec<f32>> = (0..2000)
        .map(|_| (0..dim).map(|_| rng.random::<f32>() * 10.0).collect())
        .collect();

    let params = LshParams::new(2.0, 6, 5, dim as u32).with_rows(8192, 50).with_radius(1.0).with_seed(42);
    let mut index = LshIndex::new(params)?;
    index.insert_point_set(&vectors, 0)?;
    let stats = index.stats();
    println!(
        "  {} tables, {} buckets, {} entries, {} saturated rows",
        index.num_tables(),
        stats.bucket_count,
        stats.point_count,
        stats.saturated_rows
    );

    // Perturb a stored vector slightly and look for it.
    let query: Vec<f32> = vectors[123].iter().map(|x| x + 0.05).collect();
    let mut votes: BTreeMap<u32, usize> = BTreeMap::new();
    index.retrieve_point(&query, 0, |hit| *votes.entry(hit.point_id).or_default() += 1)?;
    let mut ranked: Vec<_> = votes.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    println!("\n  in-core candidates for a perturbed copy of point 123:");
    for (id, n) in ranked.iter().take(5) {
        println!("    point {id:5}  in {n} tables");
    }

    let dir = std::env::temp_dir().join(format!("lshdb-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    for format in [SerialFormat::Format1, SerialFormat::Format2] {
        let path = dir.join(format!("demo-{format}.lsh"));
        index.serialize(&path, format)?;
        let size = std::fs::metadata(&path)?.len();
        println!("\n  {format}: {} KiB on disk", size / 1024);

        let loaded = LshIndex::open(&path, LoadMode::InCore)?;
        let mut n = 0;
        loaded.retrieve_point(&query, 0, |_| n += 1)?;
        println!("    reloaded in core: {n} hits");

        let light = LshIndex::open(&path, LoadMode::FunctionsOnly)?;
        let mut n = 0;
        match light.serial_retrieve_point(&path, &query, 0, |_| n += 1) {
            Ok(()) => println!("    queried on disk:  {n} hits"),
            Err(e) => println!("    queried on disk:  {e}"),
        }
    }

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
