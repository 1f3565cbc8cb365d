mod cli;

use mseforged::{config, EventKind, HeadlessElement, MediaSource};
use mseforged_common::TrackKind;
use mseforged_isobmff::segment::{self, ExtractOptions, SegmentStart};
use mseforged_isobmff::{InitSegmentBuilder, MediaSegmentBuilder, TrackSpec};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mseforged=trace,mseforged_isobmff=trace".to_string()
        } else {
            "mseforged=info,mseforged_isobmff=info".to_string()
        }
    });

    // Logs go to stderr so probe --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::Feed {
            file,
            chunk_size,
            content_type,
        } => feed_file(&file, cli.config.as_deref(), chunk_size, content_type),
        Commands::Generate {
            output,
            segments,
            audio,
            version1,
        } => generate_stream(&output, segments, audio, version1),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mseforged {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    file: PathBuf,
    major_brand: String,
    init_size: usize,
    duration_ms: Option<u64>,
    tracks: Vec<TrackReport>,
    media_segments: usize,
    trailing_bytes: usize,
}

#[derive(Debug, Serialize)]
struct TrackReport {
    track_id: u32,
    kind: TrackKind,
    enabled: bool,
    duration_ms: Option<u64>,
    media_timescale: u32,
    media_duration_ms: Option<u64>,
}

fn millis(duration: Option<Duration>) -> Option<u64> {
    duration.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => {
            let secs = d.as_secs();
            format!(
                "{:02}:{:02}:{:02}.{:03}",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60,
                d.subsec_millis()
            )
        }
        None => "unknown".to_string(),
    }
}

fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;

    match segment::classify(&data) {
        SegmentStart::InitSegment => {}
        SegmentStart::MediaSegment => {
            anyhow::bail!("{:?} starts with a media segment, not an initialization segment", file)
        }
        SegmentStart::NeedMoreData => anyhow::bail!("{:?} is too short to hold a box", file),
        SegmentStart::Unrecognized(atom) => {
            anyhow::bail!("{:?} starts with unrecognized box '{}'", file, atom)
        }
    }

    let options = ExtractOptions {
        exclude_disabled_tracks: config.source.exclude_disabled_tracks,
    };
    let init = segment::parse_init_segment_with(&data, options)
        .with_context(|| format!("Failed to parse initialization segment of {:?}", file))?;

    let mut offset = init.size();
    let mut media_segments = 0;
    while offset < data.len() {
        match segment::scan_media_segment(&data[offset..]) {
            Ok(len) => {
                offset += len;
                media_segments += 1;
            }
            Err(e) => {
                tracing::warn!("Stopped scanning media segments at byte {}: {}", offset, e);
                break;
            }
        }
    }

    let report = ProbeReport {
        file: file.to_path_buf(),
        major_brand: init.major_brand().to_string(),
        init_size: init.size(),
        duration_ms: millis(init.duration()),
        tracks: init
            .tracks()
            .iter()
            .map(|t| TrackReport {
                track_id: t.track_id,
                kind: t.kind,
                enabled: t.enabled,
                duration_ms: millis(t.duration),
                media_timescale: t.media_timescale,
                media_duration_ms: millis(t.media_duration),
            })
            .collect(),
        media_segments,
        trailing_bytes: data.len() - offset,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", report.file.display());
    println!("Major brand: {}", report.major_brand);
    println!("Init segment: {} bytes", report.init_size);
    println!("Duration: {}", format_duration(init.duration()));
    println!("\nTracks: {}", init.tracks().len());
    for track in init.tracks() {
        print!(
            "  [{}] {} {} Hz, {}",
            track.track_id,
            track.kind,
            track.media_timescale,
            format_duration(track.duration)
        );
        if !track.enabled {
            print!(" [disabled]");
        }
        println!();
    }
    println!("\nMedia segments: {}", report.media_segments);
    if report.trailing_bytes > 0 {
        println!("Trailing bytes: {}", report.trailing_bytes);
    }

    Ok(())
}

fn feed_file(
    file: &Path,
    config_path: Option<&Path>,
    chunk_size: Option<usize>,
    content_type: Option<String>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let chunk_size = chunk_size.unwrap_or(config.feed.chunk_size);
    if chunk_size == 0 {
        anyhow::bail!("Chunk size cannot be 0");
    }
    let content_type = content_type.unwrap_or_else(|| config.feed.content_type.clone());

    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    tracing::info!("Feeding {} bytes from {:?} as {}", data.len(), file, content_type);

    let mut source = MediaSource::new(config.source.clone());
    source.attach(HeadlessElement::new())?;
    let id = source
        .add_source_buffer(&content_type)
        .with_context(|| format!("Cannot create a source buffer for {}", content_type))?;
    log_events(&source.run_tasks());

    let mut chunks = 0;
    for (index, chunk) in data.chunks(chunk_size).enumerate() {
        let offset = index * chunk_size;
        source
            .append_buffer(id, chunk)
            .with_context(|| format!("Append at byte {} rejected", offset))?;
        let events = source.run_tasks();
        log_events(&events);
        chunks += 1;

        if events.iter().any(|e| e.kind == EventKind::Error) {
            let reason = source
                .element()
                .and_then(|e| e.failure())
                .map(|f| f.to_string())
                .unwrap_or_else(|| "unknown failure".to_string());
            anyhow::bail!("Append error in chunk at byte {}: {}", offset, reason);
        }
    }

    let buffer = source
        .source_buffer(id)
        .context("Source buffer was removed")?;
    let tracks: Vec<String> = buffer
        .tracks()
        .iter()
        .map(|t| format!("[{}] {}", t.track_id, t.kind))
        .collect();
    let buffered_bytes = buffer.buffered_bytes();
    let pending = buffer.pending_input();
    if pending > 0 {
        tracing::warn!("{} trailing bytes do not form a complete segment", pending);
    }

    source.end_of_stream(None)?;
    log_events(&source.run_tasks());

    println!("Appended: {} bytes in {} chunks", data.len(), chunks);
    println!("Tracks: {}", tracks.len());
    for track in &tracks {
        println!("  {}", track);
    }
    println!("Buffered: {} bytes", buffered_bytes);
    let duration = source.duration();
    if duration.is_nan() {
        println!("Duration: unknown");
    } else if duration.is_infinite() {
        println!("Duration: unbounded");
    } else {
        println!("Duration: {:.3}s", duration);
    }
    println!("Ready state: {}", source.ready_state());

    Ok(())
}

fn log_events(events: &[mseforged::Event]) {
    for event in events {
        tracing::debug!("Event: {}", event);
    }
}

fn generate_stream(output: &Path, segments: u32, audio: bool, version1: bool) -> Result<()> {
    const SEGMENT_MS: u64 = 2000;
    const VIDEO_TIMESCALE: u32 = 90_000;
    const SEGMENT_TICKS: u64 = SEGMENT_MS * VIDEO_TIMESCALE as u64 / 1000;

    let total_ms = u64::from(segments) * SEGMENT_MS;
    let mut builder = InitSegmentBuilder::new()
        .version(if version1 { 1 } else { 0 })
        .timescale(1000)
        .duration(total_ms)
        .track(
            TrackSpec::video(1)
                .duration(total_ms)
                .media(VIDEO_TIMESCALE, u64::from(segments) * SEGMENT_TICKS),
        );
    if audio {
        builder = builder.track(
            TrackSpec::audio(2)
                .duration(total_ms)
                .media(48_000, u64::from(segments) * SEGMENT_MS * 48),
        );
    }

    let mut data = builder.build().to_vec();
    for i in 0..segments {
        let segment = MediaSegmentBuilder::new(i + 1, 1)
            .base_media_decode_time(u64::from(i) * SEGMENT_TICKS)
            .samples(60, 3000, 512)
            .with_styp()
            .build();
        data.extend_from_slice(&segment);
    }

    std::fs::write(output, &data).with_context(|| format!("Failed to write {:?}", output))?;
    println!(
        "Wrote {} bytes ({} media segments) to {}",
        data.len(),
        segments,
        output.display()
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Buffer quota: {} bytes", config.source.buffer_quota_bytes);
            println!(
                "  Exclude disabled tracks: {}",
                config.source.exclude_disabled_tracks
            );
            println!(
                "  Supported subtypes: {}",
                config.source.supported_subtypes.join(", ")
            );
            println!("  Feed chunk size: {} bytes", config.feed.chunk_size);
            println!("  Feed content type: {}", config.feed.content_type);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Buffer quota: {} bytes", config.source.buffer_quota_bytes);
            println!(
                "  Supported subtypes: {}",
                config.source.supported_subtypes.join(", ")
            );
        }
    }

    Ok(())
}
