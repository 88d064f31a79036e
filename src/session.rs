use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{info, warn};
use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::config::{ScanConfig, ViewSettings};
use crate::error::{Cancelled, ScanError};
use crate::filter::TreeFilter;
use crate::format::format_duration;
use crate::node::FolderNode;
use crate::progress::ScanProgress;
use crate::render::{RenderOptions, TreeRenderer, TreeRow};
use crate::scanner::{self, ScanOptions};
use crate::view_cache::{ViewFilterCache, ViewParams};

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub root: PathBuf,
    pub threshold_bytes: u64,
    pub config: ScanConfig,
}

#[derive(Debug)]
pub enum ScanMessage {
    Begin {
        job_id: u64,
        root: PathBuf,
    },
    Counted {
        job_id: u64,
        total: u64,
    },
    Progress {
        job_id: u64,
        progress: ScanProgress,
    },
    Complete {
        job_id: u64,
        tree: Arc<FolderNode>,
        elapsed: Duration,
    },
    Cancelled {
        job_id: u64,
    },
    Failed {
        job_id: u64,
        message: String,
    },
}

impl ScanMessage {
    pub fn job_id(&self) -> u64 {
        match self {
            ScanMessage::Begin { job_id, .. }
            | ScanMessage::Counted { job_id, .. }
            | ScanMessage::Progress { job_id, .. }
            | ScanMessage::Complete { job_id, .. }
            | ScanMessage::Cancelled { job_id }
            | ScanMessage::Failed { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanMessage::Complete { .. } | ScanMessage::Cancelled { .. } | ScanMessage::Failed { .. }
        )
    }
}

enum ScanCommand {
    Run {
        job_id: u64,
        request: ScanRequest,
        cancel: CancelToken,
    },
}

pub struct ScannerHandle {
    cmd_tx: Sender<ScanCommand>,
    job_counter: Arc<AtomicU64>,
    active: Mutex<CancelToken>,
}

impl ScannerHandle {
    pub fn request_scan(&self, request: ScanRequest) -> u64 {
        let cancel = CancelToken::new();
        {
            let mut active = self.active.lock();
            active.cancel();
            *active = cancel.clone();
        }
        let job_id = self.job_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.cmd_tx.send(ScanCommand::Run {
            job_id,
            request,
            cancel,
        });
        job_id
    }

    pub fn cancel(&self) {
        self.active.lock().cancel();
    }

    pub fn latest_job(&self) -> u64 {
        self.job_counter.load(Ordering::SeqCst)
    }
}

pub fn spawn() -> std::io::Result<(ScannerHandle, Receiver<ScanMessage>)> {
    let (cmd_tx, cmd_rx) = unbounded();
    let (msg_tx, msg_rx) = unbounded();

    thread::Builder::new()
        .name("lff-scanner".into())
        .spawn(move || worker_loop(cmd_rx, msg_tx))?;

    Ok((
        ScannerHandle {
            cmd_tx,
            job_counter: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(CancelToken::new()),
        },
        msg_rx,
    ))
}

fn worker_loop(cmd_rx: Receiver<ScanCommand>, msg_tx: Sender<ScanMessage>) {
    while let Ok(command) = cmd_rx.recv() {
        match command {
            ScanCommand::Run {
                job_id,
                request,
                cancel,
            } => {
                let _ = msg_tx.send(ScanMessage::Begin {
                    job_id,
                    root: request.root.clone(),
                });
                let terminal = run_job(job_id, &request, &cancel, &msg_tx);
                let _ = msg_tx.send(terminal);
            }
        }
    }
}

fn run_job(
    job_id: u64,
    request: &ScanRequest,
    cancel: &CancelToken,
    msg_tx: &Sender<ScanMessage>,
) -> ScanMessage {
    let started = Instant::now();
    let config = &request.config;

    let total = if config.skip_folder_count {
        0
    } else {
        match scanner::count_entries(&request.root, config.max_depth_for_count, cancel) {
            Ok(total) => total,
            Err(Cancelled) => {
                info!("lff job {job_id} cancelled while counting");
                return ScanMessage::Cancelled { job_id };
            }
        }
    };
    let _ = msg_tx.send(ScanMessage::Counted { job_id, total });

    let options = ScanOptions::from_config(config, request.threshold_bytes, total);
    let progress_tx = msg_tx.clone();
    let sink = move |progress: ScanProgress| {
        let _ = progress_tx.send(ScanMessage::Progress { job_id, progress });
    };

    match scanner::scan(&request.root, &options, &sink, cancel) {
        Ok(tree) => {
            let elapsed = started.elapsed();
            info!(
                "lff job {job_id} finished in {}: {} folders, {} files",
                format_duration(elapsed),
                tree.count_folders(),
                tree.count_files()
            );
            ScanMessage::Complete {
                job_id,
                tree,
                elapsed,
            }
        }
        Err(ScanError::Cancelled) => {
            info!("lff job {job_id} cancelled");
            ScanMessage::Cancelled { job_id }
        }
        Err(err) => {
            warn!("lff job {job_id} failed: {err}");
            ScanMessage::Failed {
                job_id,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderTicket {
    generation: u64,
    cancel: CancelToken,
}

impl RenderTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

pub struct RenderedView {
    pub generation: u64,
    pub cache: ViewFilterCache,
    pub text: String,
    pub rows: Vec<TreeRow>,
    pub target_column: usize,
}

#[derive(Default)]
pub struct ViewSession {
    generation: AtomicU64,
    active: Mutex<CancelToken>,
}

impl ViewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RenderTicket {
        let cancel = CancelToken::new();
        let mut active = self.active.lock();
        active.cancel();
        *active = cancel.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RenderTicket { generation, cancel }
    }

    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        !ticket.cancel.is_cancelled() && self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    pub fn cancel(&self) {
        self.active.lock().cancel();
    }

    pub fn render(&self, tree: &Arc<FolderNode>, settings: &ViewSettings) -> Result<RenderedView, Cancelled> {
        let ticket = self.begin();
        self.render_with(&ticket, tree, settings)
    }

    pub fn render_with(
        &self,
        ticket: &RenderTicket,
        tree: &Arc<FolderNode>,
        settings: &ViewSettings,
    ) -> Result<RenderedView, Cancelled> {
        let cancel = &ticket.cancel;
        let params = ViewParams {
            threshold_bytes: settings.threshold_bytes(),
            include_files: settings.include_files,
            sort_key: settings.sort_key,
            sort_direction: settings.sort_direction,
            filter: TreeFilter::compile(&settings.filter, settings.filter_is_regex),
        };
        let cache = ViewFilterCache::build(tree, params, cancel)?;

        let options = RenderOptions {
            use_spaces: settings.use_spaces(),
            tab_width: settings.tab_width(),
            unit: settings.unit,
            ..RenderOptions::default()
        };
        let (text, rows, target_column) = {
            let renderer = TreeRenderer::new(&cache, options);
            let text = renderer.render_text(cancel)?;
            let rows: Vec<TreeRow> = renderer.rows(cancel).collect();
            (text, rows, renderer.target_column())
        };

        if !self.is_current(ticket) {
            return Err(Cancelled);
        }
        Ok(RenderedView {
            generation: ticket.generation,
            cache,
            text,
            rows,
            target_column,
        })
    }
}
