use std::{
    ops::ControlFlow,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::{Parser, Subcommand};
use serde::Serialize;
use sonic_geometry_core::{
    analysis::{bin_span, BinSpan},
    format_time, AppConfig, BandAnalyzer, BandLevels, FftSpectrumSource, FixedStepDriver, FrameDriver,
    FrameParameters, ManualClock, SceneState, Visualizer, VizError, WavDecoder,
};
use tracing_subscriber::EnvFilter;

/// Sample rate assumed before the first buffer is loaded.
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

fn main() -> sonic_geometry_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            input,
            config,
            fps,
            seconds,
            no_loop,
            trace,
        } => run_render(&input, config.as_deref(), fps, seconds, no_loop, trace.as_deref()),
        Commands::Bands {
            sample_rate,
            transform_size,
            config,
        } => run_bands(sample_rate, transform_size, config.as_deref()),
    }
}

#[derive(Debug, Serialize)]
struct TraceRow {
    frame: u64,
    time: f64,
    position: f64,
    levels: BandLevels,
    params: FrameParameters,
}

fn run_render(
    input: &Path,
    config: Option<&Path>,
    fps: u32,
    seconds: Option<f64>,
    no_loop: bool,
    trace: Option<&Path>,
) -> sonic_geometry_core::Result<()> {
    let mut config = load_config(config)?;
    if no_loop {
        config.audio.loop_enabled = false;
    }
    tracing::info!(?input, fps, loop_enabled = config.audio.loop_enabled, "starting headless render");

    let raw = std::fs::read(input)?;
    let clock = ManualClock::new(0.0);
    let spectrum = FftSpectrumSource::new(DEFAULT_SAMPLE_RATE, &config.audio)?;
    let mut visualizer = Visualizer::new(clock.clone(), spectrum, &config);

    let ended = Arc::new(AtomicBool::new(false));
    let ended_flag = ended.clone();
    visualizer.set_on_playback_ended(move || ended_flag.store(true, Ordering::SeqCst));
    visualizer.load(&WavDecoder, &raw)?;

    let seconds = seconds.unwrap_or_else(|| visualizer.playback().duration_seconds());
    let frames = (seconds.max(0.0) * f64::from(fps)).ceil() as u64;
    let mut driver = FixedStepDriver::new(clock, fps, frames);
    let mut scene = SceneState::new();
    let mut rows = Vec::new();

    driver.run(&mut |tick| {
        let params = visualizer.frame(&mut scene);
        let levels = visualizer.last_levels();
        let position = visualizer.playback().current_position();

        if tick.index % u64::from(fps) == 0 {
            tracing::info!(
                frame = tick.index,
                position = %format_time(position),
                kick = levels.kick,
                snare = levels.snare,
                scale = params.reactive_scale,
                bloom = params.bloom_intensity,
                "frame"
            );
        }

        if trace.is_some() {
            rows.push(TraceRow {
                frame: tick.index,
                time: tick.now,
                position,
                levels,
                params,
            });
        }

        if ended.load(Ordering::SeqCst) {
            tracing::info!(frame = tick.index, "track ended");
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    let position_display = visualizer.display();
    tracing::info!(
        frames = scene.frames_applied,
        position = %position_display.label,
        scale = scene.scale[0],
        "render finished"
    );

    if let Some(path) = trace {
        let json = serde_json::to_vec_pretty(&rows)
            .map_err(|err| VizError::msg(format!("failed to serialise trace: {err}")))?;
        std::fs::write(path, json)?;
        tracing::info!(?path, rows = rows.len(), "wrote frame trace");
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct BandReport {
    sample_rate: u32,
    transform_size: usize,
    kick: BinSpan,
    snare: BinSpan,
    bass_bins: usize,
}

fn run_bands(
    sample_rate: u32,
    transform_size: Option<usize>,
    config: Option<&Path>,
) -> sonic_geometry_core::Result<()> {
    let config = load_config(config)?;
    let transform_size = transform_size.unwrap_or(config.audio.transform_size);
    let bins = transform_size / 2;
    let analyzer = BandAnalyzer::from_config(&config.bands);

    let report = BandReport {
        sample_rate,
        transform_size,
        kick: bin_span(analyzer.kick_band(), sample_rate, transform_size, bins),
        snare: bin_span(analyzer.snare_band(), sample_rate, transform_size, bins),
        bass_bins: analyzer.bass_bins().min(bins),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| VizError::msg(format!("failed to serialise band report: {err}")))?;
    println!("{json}");
    Ok(())
}

fn load_config(path: Option<&Path>) -> sonic_geometry_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive geometry driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a WAV file through the pipeline without a display.
    Render {
        /// Path to the WAV file to play.
        input: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Simulated display refresh rate.
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
        fps: u32,
        /// Seconds to simulate; defaults to the track length.
        #[arg(short, long)]
        seconds: Option<f64>,
        /// Stop at the end of the track instead of looping.
        #[arg(long)]
        no_loop: bool,
        /// Write every frame's levels and parameters to this JSON file.
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Print the spectrum bins each configured band resolves to.
    Bands {
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,
        #[arg(long)]
        transform_size: Option<usize>,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
