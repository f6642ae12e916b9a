//! Print the search variants built for track titles.
//! Usage: cargo run --bin search-variants -- "Artist - Song [Official Video]"
//! Reads one title per line from stdin when no titles are given.

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use clap::Parser;

use playlist_migrate::models::Track;
use playlist_migrate::normalize::build_search_variants;

#[derive(Parser)]
#[command(name = "search-variants")]
#[command(about = "Show the normalized search queries for track titles")]
struct Args {
    /// "Artist - Title" strings
    titles: Vec<String>,
}

fn source_track(line: &str) -> Track {
    match line.split_once(" - ") {
        Some((artist, title)) => Track::new(artist, title, 0),
        None => Track {
            search_string: line.to_string(),
            artist: String::new(),
            title: line.to_string(),
            duration_ms: 0,
            id: None,
        },
    }
}

fn print_variants(line: &str) {
    let track = source_track(line);
    println!("{}", line);
    for (i, variant) in build_search_variants(&track).iter().enumerate() {
        println!("  {}. {:?}", i + 1, variant);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.titles.is_empty() {
        args.titles.iter().for_each(|title| print_variants(title));
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if !line.trim().is_empty() {
            print_variants(line.trim_end());
        }
    }
    Ok(())
}
