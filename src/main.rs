use std::path::PathBuf;
use std::process;

use env_logger::Env;
use large_folder_finder::config::{ScanConfig, Separator, ViewSettings};
use large_folder_finder::format::{SizeUnit, format_duration, format_system_time};
use large_folder_finder::owner::resolve_owner;
use large_folder_finder::session::{self, ScanMessage, ScanRequest, ViewSession};
use large_folder_finder::view_cache::{SortDirection, SortKey};
use log::info;
use pico_args::Arguments;
use serde::Serialize;
use shellexpand::full;

#[derive(Serialize)]
struct RowRecord<'a> {
    depth: usize,
    name: &'a str,
    size: u64,
    size_text: &'a str,
    display_type: &'a str,
    modified: String,
    is_file: bool,
    owner: &'a str,
    line: &'a str,
}

struct Cli {
    root: PathBuf,
    config: ScanConfig,
    view: ViewSettings,
    rows: bool,
}

fn main() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("lff: {err}");
            process::exit(2);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("lff: {err}");
        process::exit(1);
    }
}

fn parse_args() -> Result<Cli, String> {
    let mut args = Arguments::from_env();
    let mut config = ScanConfig::load();
    let mut view = ViewSettings::default();

    if let Some(threshold) = args
        .opt_value_from_str::<_, f64>("--threshold")
        .map_err(|e| e.to_string())?
    {
        view.threshold = threshold;
    }
    if let Some(unit) = args
        .opt_value_from_str::<_, SizeUnit>("--unit")
        .map_err(|e| e.to_string())?
    {
        view.unit = unit;
    }
    if let Some(key) = args
        .opt_value_from_str::<_, SortKey>("--sort")
        .map_err(|e| e.to_string())?
    {
        if key != view.sort_key {
            view.sort_by(key);
        }
    }
    if args.contains("--asc") {
        view.sort_direction = SortDirection::Ascending;
    }
    if args.contains("--desc") {
        view.sort_direction = SortDirection::Descending;
    }
    if let Some(pattern) = args
        .opt_value_from_str::<_, String>("--filter")
        .map_err(|e| e.to_string())?
    {
        view.filter = pattern;
    }
    view.filter_is_regex = args.contains("--regex");
    view.include_files = args.contains("--include-files");
    if args.contains("--tabs") {
        view.separator = Separator::Tab;
    }
    if let Some(width) = args
        .opt_value_from_str::<_, usize>("--tab-width")
        .map_err(|e| e.to_string())?
    {
        view.tab_width = width;
    }

    if args.contains("--no-parallel") {
        config.use_parallel_scan = false;
    }
    if args.contains("--logical-size") {
        config.use_physical_size = false;
    }
    if args.contains("--skip-count") {
        config.skip_folder_count = true;
    }
    if let Some(depth) = args
        .opt_value_from_str::<_, usize>("--max-depth")
        .map_err(|e| e.to_string())?
    {
        config.max_depth_for_count = depth;
    }
    if let Some(threads) = args
        .opt_value_from_str::<_, usize>("--threads")
        .map_err(|e| e.to_string())?
    {
        config.scan_threads = Some(threads.max(1));
    }
    let rows = args.contains("--rows");

    let root_arg: Option<String> = args.opt_free_from_str().map_err(|e| e.to_string())?;
    let leftover = args.finish();
    if !leftover.is_empty() {
        let extras: Vec<String> = leftover
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        return Err(format!("unexpected arguments: {}", extras.join(" ")));
    }

    Ok(Cli {
        root: resolve_root(root_arg)?,
        config,
        view,
        rows,
    })
}

fn resolve_root(raw: Option<String>) -> Result<PathBuf, String> {
    let path = match raw {
        Some(raw) => {
            let expanded = full(raw.as_str()).map_err(|err| err.to_string())?;
            PathBuf::from(expanded.as_ref())
        }
        None => std::env::current_dir().map_err(|err| err.to_string())?,
    };
    if !path.is_dir() {
        return Err(format!("{} is not a directory", path.display()));
    }
    path.canonicalize()
        .map_err(|err| format!("failed to canonicalize {}: {err}", path.display()))
}

fn run(cli: Cli) -> Result<(), String> {
    let (scanner, rx) = session::spawn().map_err(|err| format!("scanner thread: {err}"))?;
    let job_id = scanner.request_scan(ScanRequest {
        root: cli.root.clone(),
        threshold_bytes: cli.view.threshold_bytes(),
        config: cli.config.clone(),
    });

    let tree = loop {
        let message = rx
            .recv()
            .map_err(|_| "scanner stopped unexpectedly".to_string())?;
        if message.job_id() != job_id {
            continue;
        }
        match message {
            ScanMessage::Counted { total, .. } if total > 0 => {
                info!("scanning {} ({total} folders)", cli.root.display());
            }
            ScanMessage::Progress { progress, .. } => {
                let percent = progress
                    .fraction()
                    .map(|f| format!("{:.1}%", f * 100.0))
                    .unwrap_or_else(|| "?".into());
                let eta = progress
                    .eta
                    .map(format_duration)
                    .unwrap_or_else(|| "unknown".into());
                info!(
                    "{percent} {} folders, {} elapsed, {eta} remaining",
                    progress.processed,
                    format_duration(progress.elapsed)
                );
            }
            ScanMessage::Complete { tree, elapsed, .. } => {
                info!("finished in {}", format_duration(elapsed));
                break tree;
            }
            ScanMessage::Cancelled { .. } => return Err("scan cancelled".into()),
            ScanMessage::Failed { message, .. } => return Err(message),
            _ => {}
        }
    };

    let view = ViewSession::new()
        .render(&tree, &cli.view)
        .map_err(|err| err.to_string())?;

    if cli.rows {
        for row in &view.rows {
            let record = RowRecord {
                depth: row.depth,
                name: row.node.name(),
                size: row.node.size(),
                size_text: row.size_text.trim(),
                display_type: &row.display_type,
                modified: format_system_time(row.last_modified),
                is_file: row.node.is_file(),
                owner: resolve_owner(&row.node),
                line: &row.display_text,
            };
            let json = serde_json::to_string(&record).map_err(|err| err.to_string())?;
            println!("{json}");
        }
    } else {
        print!("{}", view.text);
    }
    Ok(())
}
