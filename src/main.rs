// src/main.rs
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use log::{debug, info, warn};

use airlift_ingest::{AudioReader, AudioReaderState, ByteRingBuffer, Config, MediaFile, MediaFileType};

const DRAIN_CHUNK: usize = 4 * 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_millis(50);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Args / Config
    // ------------------------------------------------------------
    let mut args = std::env::args().skip(1);
    let cfg_path = args.next().unwrap_or_else(|| "config.toml".into());
    let Some(source) = args.next() else {
        bail!("usage: airlift-ingest <config.toml> <url|file>");
    };

    let cfg = if Path::new(&cfg_path).exists() {
        Config::load(&cfg_path)?
    } else {
        warn!("[ingest] {} not found, using defaults", cfg_path);
        Config::default()
    };
    info!("[ingest] loaded {}", cfg_path);

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[ingest] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Ring + stand-in consumer
    // ------------------------------------------------------------
    let ring = Arc::new(ByteRingBuffer::new(cfg.ring.capacity));
    let drained = Arc::new(AtomicU64::new(0));
    let producing = Arc::new(AtomicBool::new(true));
    let drain_handle = {
        let ring = ring.clone();
        let drained = drained.clone();
        let producing = producing.clone();
        std::thread::Builder::new()
            .name("ingest-drain".into())
            .spawn(move || {
                let mut buf = vec![0u8; DRAIN_CHUNK];
                loop {
                    let n = ring.read(&mut buf, DRAIN_TIMEOUT);
                    drained.fetch_add(n as u64, Ordering::Relaxed);
                    if n == 0 && !producing.load(Ordering::Relaxed) && ring.is_empty() {
                        break;
                    }
                }
            })
            .context("spawning drain thread")?
    };

    // ------------------------------------------------------------
    // Reader
    // ------------------------------------------------------------
    let mut reader = AudioReader::with_config(ring.clone(), cfg.reader.clone());
    let file_type = if source.contains("://") {
        reader.start_url(&source)?
    } else {
        let path = Path::new(&source);
        let data = std::fs::read(path).with_context(|| format!("reading {}", source))?;
        let file_type = MediaFileType::from_path(path);
        reader.start_file(&MediaFile::new(data, file_type))?
    };
    info!(
        "[ingest] streaming {} as {} ({})",
        source,
        file_type,
        file_type.mime_type()
    );

    let started = Instant::now();
    let mut last_stats = Instant::now();
    let mut state = AudioReaderState::Reading;

    while running.load(Ordering::Relaxed) {
        state = reader.step();
        if state.is_terminal() {
            break;
        }

        if last_stats.elapsed() >= Duration::from_secs(5) {
            let stats = reader.stats();
            debug!(
                "[ingest] forwarded={} dropped={} ring={}/{}",
                stats.bytes_forwarded,
                stats.bytes_dropped,
                ring.available(),
                cfg.ring.capacity
            );
            last_stats = Instant::now();
        }
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    reader.close();
    producing.store(false, Ordering::Relaxed);
    if drain_handle.join().is_err() {
        warn!("[ingest] drain thread panicked");
    }

    let stats = reader.stats();
    info!(
        "[ingest] {:?} in {:.1}s: forwarded={} drained={} dropped={} steps={}",
        state,
        started.elapsed().as_secs_f32(),
        stats.bytes_forwarded,
        drained.load(Ordering::Relaxed),
        stats.bytes_dropped,
        stats.steps
    );

    if state == AudioReaderState::Failed {
        bail!("stream {} failed", source);
    }
    Ok(())
}
