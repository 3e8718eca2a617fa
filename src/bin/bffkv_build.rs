use bffkv::timing::PhaseTimings;
use bffkv::{BuildError, Filter, Key};
use clap::Parser;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

const PAIR_RECORD_SIZE: usize = 36;

#[derive(Parser)]
#[command(about = "Build a bffkv filter and write it alongside its metadata")]
struct Args {
    /// Binary pair records: 32-byte key followed by a 4-byte LE value
    #[arg(long)]
    pairs: Option<String>,

    /// Number of random pairs to generate when --pairs is absent
    #[arg(long, default_value = "100000")]
    num_keys: usize,

    /// Plaintext modulo
    #[arg(long, default_value = "1024")]
    modulo: u64,

    /// Label folded into every per-key mask
    #[arg(long, default_value = "1")]
    label: u64,

    /// RNG seed for generated pairs and construction seeds
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Fresh construction seeds to try when peeling fails
    #[arg(long, default_value = "8")]
    max_retries: usize,

    /// Output directory
    #[arg(long)]
    out: String,
}

#[derive(serde::Serialize)]
struct FilterMetadataFile {
    num_keys: u64,
    plaintext_modulo: u64,
    label: u64,
    segment_length: u64,
    segment_count: u64,
    array_length: u64,
    bits_per_entry: u64,
    serialized_bytes: u64,
}

fn read_pairs(
    path: &Path,
    modulo: u64,
) -> Result<(Vec<Key>, Vec<u32>), Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len % PAIR_RECORD_SIZE != 0 {
        return Err(format!("pair file {} has invalid length", path.display()).into());
    }
    let count = len / PAIR_RECORD_SIZE;

    let mut reader = BufReader::new(file);
    let mut buf = [0u8; PAIR_RECORD_SIZE];
    let mut keys = Vec::with_capacity(count);
    let mut values = Vec::with_capacity(count);
    for record in 0..count {
        reader.read_exact(&mut buf)?;
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&buf[..32]);
        let mut value_bytes = [0u8; 4];
        value_bytes.copy_from_slice(&buf[32..]);
        let value = u32::from_le_bytes(value_bytes);
        if u64::from(value) >= modulo {
            return Err(format!("record {record} value {value} is not below the modulo").into());
        }
        keys.push(Key::from_bytes(&key_bytes));
        values.push(value);
    }
    Ok((keys, values))
}

fn generate_pairs(num_keys: usize, modulo: u64, rng: &mut ChaCha20Rng) -> (Vec<Key>, Vec<u32>) {
    let keys = (0..num_keys).map(|_| Key::new(rng.gen())).collect();
    let values = (0..num_keys)
        .map(|_| rng.gen_range(0..modulo) as u32)
        .collect();
    (keys, values)
}

fn build_with_fresh_seeds(
    keys: &[Key],
    values: &[u32],
    modulo: u64,
    label: u64,
    max_retries: usize,
    rng: &mut ChaCha20Rng,
    timings: &mut PhaseTimings,
) -> Result<Filter, Box<dyn std::error::Error>> {
    for attempt in 0..max_retries.max(1) {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);

        let start = Instant::now();
        let result = Filter::build(&seed, keys, values, modulo, label);
        timings.record("construct", start.elapsed());

        match result {
            Ok(filter) => return Ok(filter),
            Err(BuildError::ConstructionFailed) => {
                log::warn!("construction attempt {attempt} failed, retrying with a fresh seed");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err("no construction seed produced a peelable filter".into())
}

fn write_metadata(out_dir: &Path, filter: &Filter) -> Result<(), Box<dyn std::error::Error>> {
    let metadata = FilterMetadataFile {
        num_keys: u64::from(filter.num_keys()),
        plaintext_modulo: filter.plaintext_modulo(),
        label: filter.label(),
        segment_length: u64::from(filter.segment_length()),
        segment_count: u64::from(filter.segment_count()),
        array_length: u64::from(filter.array_length()),
        bits_per_entry: filter.bits_per_entry() as u64,
        serialized_bytes: filter.serialized_num_bytes() as u64,
    };
    let mut contents = serde_json::to_string_pretty(&metadata)?;
    contents.push('\n');
    fs::write(out_dir.join("bffkv-metadata.json"), contents)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    if args.modulo < 256 {
        return Err("modulo must be >= 256".into());
    }

    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);
    let (keys, values) = match &args.pairs {
        Some(path) => read_pairs(Path::new(path), args.modulo)?,
        None => generate_pairs(args.num_keys, args.modulo, &mut rng),
    };

    let mut timings = PhaseTimings::new();
    let filter = build_with_fresh_seeds(
        &keys,
        &values,
        args.modulo,
        args.label,
        args.max_retries,
        &mut rng,
        &mut timings,
    )?;

    let mismatches = timings.time("verify", || {
        keys.par_iter()
            .zip(values.par_iter())
            .filter(|(key, value)| filter.recover(key) != **value)
            .count()
    });
    if mismatches > 0 {
        return Err(format!("{mismatches} recoveries disagree with the input values").into());
    }

    let bytes = timings.time("serialize", || filter.to_bytes());

    let out_dir = Path::new(&args.out);
    fs::create_dir_all(out_dir)?;
    fs::write(out_dir.join("bffkv-filter.bin"), &bytes)?;
    write_metadata(out_dir, &filter)?;

    for phase in ["construct", "verify", "serialize"] {
        println!("{}", timings.summary_line(phase));
    }
    println!(
        "filter: {} keys, modulo {}, {} slots, {} bits/entry, {} bytes",
        filter.num_keys(),
        filter.plaintext_modulo(),
        filter.array_length(),
        filter.bits_per_entry(),
        bytes.len(),
    );
    Ok(())
}
