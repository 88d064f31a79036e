use std::path::PathBuf;
use std::time::Instant;

use large_folder_finder::cancel::CancelToken;
use large_folder_finder::config::ScanConfig;
use large_folder_finder::format::{SizeUnit, format_duration, format_size};
use large_folder_finder::progress::NoProgress;
use large_folder_finder::scanner::{self, ScanOptions};
use pico_args::Arguments;
use serde::Serialize;

#[derive(Serialize)]
struct Snapshot {
    root: String,
    total_size: u64,
    folders: u64,
    files: u64,
    counted: u64,
    count_ms: u128,
    elapsed_ms: u128,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("bench_scan: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = Arguments::from_env();
    let snapshot_path: Option<PathBuf> = args
        .opt_value_from_str("--snapshot")
        .map_err(|e| e.to_string())?;
    let sequential = args.contains("--sequential");
    let root_arg: Option<String> = args.opt_free_from_str().map_err(|e| e.to_string())?;
    let leftover = args.finish();
    if !leftover.is_empty() {
        return Err("unexpected positional arguments".into());
    }

    let root = match root_arg {
        Some(raw) => PathBuf::from(expand_path(&raw)?),
        None => std::env::current_dir().map_err(|e| e.to_string())?,
    };
    if !root.exists() {
        return Err(format!("{} does not exist", root.display()));
    }
    let canonical = root
        .canonicalize()
        .map_err(|err| format!("failed to canonicalize {}: {err}", root.display()))?;

    let mut config = ScanConfig::default();
    config.use_parallel_scan = !sequential;
    let cancel = CancelToken::new();

    let count_start = Instant::now();
    let counted = scanner::count_entries(&canonical, config.max_depth_for_count, &cancel)
        .map_err(|err| err.to_string())?;
    let count_elapsed = count_start.elapsed();

    let options = ScanOptions::from_config(&config, 0, counted);
    let start = Instant::now();
    let tree = scanner::scan(&canonical, &options, &NoProgress, &cancel).map_err(|err| err.to_string())?;
    let elapsed = start.elapsed();

    let folders = tree.count_folders();
    let files = tree.count_files();

    println!("root: {}", canonical.display());
    println!(
        "counted {counted} folders to depth {} in {}",
        config.max_depth_for_count,
        format_duration(count_elapsed)
    );
    println!(
        "scanned {folders} folders, {files} files, {} ({} bytes) in {}",
        format_size(tree.size(), SizeUnit::MB).trim(),
        tree.size(),
        format_duration(elapsed)
    );

    if let Some(path) = snapshot_path {
        let snapshot = Snapshot {
            root: canonical.display().to_string(),
            total_size: tree.size(),
            folders,
            files,
            counted,
            count_ms: count_elapsed.as_millis(),
            elapsed_ms: elapsed.as_millis(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|err| err.to_string())?;
        std::fs::write(&path, json)
            .map_err(|err| format!("failed to write snapshot {}: {err}", path.display()))?;
    }

    Ok(())
}

fn expand_path(raw: &str) -> Result<String, String> {
    shellexpand::full(raw)
        .map(|expanded| expanded.into_owned())
        .map_err(|err| err.to_string())
}
