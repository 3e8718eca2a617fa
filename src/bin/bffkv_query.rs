use bffkv::{Filter, Key};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;

#[derive(Parser)]
#[command(about = "Recover values from a serialized bffkv filter")]
struct Args {
    /// Path to a serialized filter
    #[arg(long)]
    filter: String,

    /// 64 hex characters naming a 32-byte key
    #[arg(long)]
    key_hex: Option<String>,

    /// Arbitrary keyword, hashed down to a 32-byte key
    #[arg(long)]
    keyword: Option<String>,

    /// Also print the table taps and the key fingerprint
    #[arg(long)]
    taps: bool,
}

fn parse_key_hex(hex: &str) -> Result<Key, Box<dyn std::error::Error>> {
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("--key-hex must be 64 hex characters".into());
    }
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)?;
    }
    Ok(Key::from_bytes(&bytes))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let key = match (&args.key_hex, &args.keyword) {
        (Some(hex), None) => parse_key_hex(hex)?,
        (None, Some(word)) => Key::from_keyword(word.as_bytes()),
        _ => return Err("exactly one of --key-hex and --keyword is required".into()),
    };

    let file = File::open(&args.filter)?;
    let bytes = unsafe { Mmap::map(&file)? };
    let filter = Filter::from_bytes(&bytes[..])?;

    println!("value: {}", filter.recover(&key));
    if args.taps {
        let (h0, h1, h2) = filter.hash_taps(&key);
        println!("taps: {h0} {h1} {h2}");
        println!("key fingerprint: {:#018x}", filter.key_fingerprint(&key));
    }
    Ok(())
}
