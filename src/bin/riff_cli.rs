use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use riff_trainer::analysis::chord::match_pitch_classes;
use riff_trainer::config::AppConfig;
use riff_trainer::engine::EngineHandle;
use riff_trainer::fixtures::{
    sine_wave, write_wav, ExpectationDiff, FixtureData, FixtureProcessor, FixtureReport,
};
use riff_trainer::harmony::{LocalHarmonicAnalyzer, DEFAULT_ANALYSIS_TIMEOUT};
use riff_trainer::trainer::ComplexityMode;
use riff_trainer::PitchClass;
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "riff_cli",
    about = "Offline and real-time harness for the Riff Trainer core"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/riff_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect notes in a mono WAV and print them as JSON lines
    Detect {
        #[arg(long)]
        wav: PathBuf,
        /// Expectation JSON (defaults to <wav stem>.expect.json when present)
        #[arg(long)]
        expect: Option<PathBuf>,
        /// Write the full report here instead of printing a summary
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Match a comma-separated list of pitch classes against chord templates
    Chord {
        #[arg(long, value_delimiter = ',')]
        notes: Vec<String>,
        /// Also print a local harmonic analysis
        #[arg(long)]
        harmony: bool,
    },
    /// Play a WAV through the live engine at real-time pace
    Listen {
        #[arg(long)]
        wav: PathBuf,
        /// Run the rhythm trainer on the detected notes
        #[arg(long)]
        train: bool,
        #[arg(long)]
        complexity: Option<ComplexityMode>,
    },
    /// Write a sine fixture
    Synth {
        #[arg(long)]
        freq: f32,
        #[arg(long, default_value_t = 1.0)]
        seconds: f32,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Detect {
            wav,
            expect,
            output,
        } => run_detect(config, &wav, expect, output),
        Commands::Chord { notes, harmony } => run_chord(&notes, harmony),
        Commands::Listen {
            wav,
            train,
            complexity,
        } => run_listen(config, &wav, train, complexity),
        Commands::Synth {
            freq,
            seconds,
            out,
            sample_rate,
            amplitude,
        } => run_synth(freq, seconds, &out, sample_rate, amplitude),
    }
}

fn run_detect(
    config: AppConfig,
    wav: &Path,
    expect: Option<PathBuf>,
    output_path: Option<PathBuf>,
) -> Result<ExitCode> {
    let data = FixtureData::load(wav, expect)?;
    let report = FixtureProcessor::new(config)
        .run(&data)
        .with_context(|| format!("processing {}", wav.display()))?;

    for note in &report.notes {
        println!("{}", serde_json::to_string(note)?);
    }
    emit_report(&report, output_path)?;

    if let Some(expectations) = data.expectations {
        match expectations.verify(&report) {
            Ok(()) => Ok(ExitCode::from(0)),
            Err(diff) => {
                emit_diff(&diff)?;
                Ok(ExitCode::from(2))
            }
        }
    } else {
        Ok(ExitCode::from(0))
    }
}

fn run_chord(notes: &[String], harmony: bool) -> Result<ExitCode> {
    let classes = notes
        .iter()
        .map(|name| name.trim().parse::<PitchClass>().map_err(|err| anyhow!(err)))
        .collect::<Result<Vec<_>>>()?;

    match match_pitch_classes(&classes) {
        Some(chord) => println!("{}", serde_json::to_string_pretty(&chord)?),
        None => println!("null"),
    }

    if harmony {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building runtime")?;
        let detected = classes.into_iter().collect();
        let context = runtime.block_on(riff_trainer::harmony::request_analysis(
            &LocalHarmonicAnalyzer,
            &detected,
            DEFAULT_ANALYSIS_TIMEOUT,
        ))?;
        println!("{}", serde_json::to_string_pretty(&context)?);
    }
    Ok(ExitCode::from(0))
}

fn run_listen(
    config: AppConfig,
    wav: &Path,
    train: bool,
    complexity: Option<ComplexityMode>,
) -> Result<ExitCode> {
    let data = FixtureData::load(wav, None)?;
    let engine = EngineHandle::new(config)?;
    let runtime = engine.runtime_handle();

    let notes = engine.note_stream();
    runtime.spawn(async move {
        tokio::pin!(notes);
        while let Some(note) = notes.next().await {
            if let Ok(line) = serde_json::to_string(&note) {
                println!("{line}");
            }
        }
    });
    let feedback = engine.feedback_stream();
    runtime.spawn(async move {
        tokio::pin!(feedback);
        while let Some(event) = feedback.next().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        }
    });

    if train {
        engine.start_trainer(complexity)?;
    }

    let mut capture = engine.start_listening()?;
    let frame_size = capture.frame_size();
    let frame_duration = Duration::from_secs_f64(frame_size as f64 / data.sample_rate as f64);
    for frame in data.samples.chunks_exact(frame_size) {
        if let Err(err) = capture.push(frame, data.sample_rate) {
            log::warn!("[riff_cli] Dropped frame: {}", err);
        }
        std::thread::sleep(frame_duration);
    }
    drop(capture);
    engine.stop_listening()?;

    let snapshot = engine.settle()?;
    let summary = ListenSummary {
        pitch_classes: engine.detected_pitch_classes().to_names(),
        chord: engine.current_chord().map(|c| c.suffixed_name),
        trainer: train.then_some(snapshot),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if train {
        engine.stop_trainer()?;
        engine.settle()?;
    }
    Ok(ExitCode::from(0))
}

fn run_synth(
    freq: f32,
    seconds: f32,
    out: &Path,
    sample_rate: u32,
    amplitude: f32,
) -> Result<ExitCode> {
    let len = (seconds.max(0.0) * sample_rate as f32) as usize;
    let samples = sine_wave(freq, sample_rate, len, amplitude);
    write_wav(out, &samples, sample_rate)?;
    println!("Wrote {} samples at {} Hz to {}", len, sample_rate, out.display());
    Ok(ExitCode::from(0))
}

fn emit_report(report: &FixtureReport, output_path: Option<PathBuf>) -> Result<()> {
    if let Some(path) = output_path {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        let summary = DetectSummary {
            fixture: &report.fixture,
            note_count: report.notes.len(),
            pitch_classes: &report.pitch_classes,
            chord: report.chord.as_ref().map(|c| c.suffixed_name.as_str()),
            stats: &report.stats,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct DetectSummary<'a> {
    fixture: &'a str,
    note_count: usize,
    pitch_classes: &'a [String],
    chord: Option<&'a str>,
    stats: &'a riff_trainer::analysis::PipelineStats,
}

#[derive(Serialize)]
struct ListenSummary {
    pitch_classes: Vec<String>,
    chord: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trainer: Option<riff_trainer::TrainerSnapshot>,
}
