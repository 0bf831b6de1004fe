//! Fixture utilities for offline runs and deterministic tests.
//!
//! This module synthesizes test signals, loads and writes PCM WAV data,
//! parses optional expectation JSON, and runs the note pipeline over a
//! whole recording frame by frame. It is desktop-focused to support CI
//! and QA workflows.

use std::f32::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analysis::chord::{match_chord, ChordMatch};
use crate::analysis::stabilizer::NoteEvent;
use crate::analysis::{NotePipeline, PipelineStats};
use crate::audio::frame::AudioFrame;
use crate::config::AppConfig;

/// Pure sine, phase zero.
pub fn sine_wave(frequency_hz: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    let step = 2.0 * PI * frequency_hz / sample_rate as f32;
    (0..len)
        .map(|i| amplitude * (step * i as f32).sin())
        .collect()
}

/// Uniform white noise in `[-amplitude, amplitude)`, reproducible per seed.
pub fn noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    if amplitude <= 0.0 {
        return vec![0.0; len];
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
}

/// Concatenated sine segments, `(frequency_hz, seconds)` each.
///
/// A frequency of zero renders silence for that segment.
pub fn melody(segments: &[(f32, f32)], sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let mut samples = Vec::new();
    for &(frequency_hz, seconds) in segments {
        let len = (seconds.max(0.0) * sample_rate as f32) as usize;
        if frequency_hz > 0.0 {
            samples.extend(sine_wave(frequency_hz, sample_rate, len, amplitude));
        } else {
            samples.extend(std::iter::repeat(0.0).take(len));
        }
    }
    samples
}

/// Loaded fixture data with decoded PCM samples.
pub struct FixtureData {
    pub name: String,
    pub wav_path: PathBuf,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub expectations: Option<FixtureExpectations>,
}

impl FixtureData {
    /// Wrap in-memory samples (e.g. a synthesized melody)
    pub fn from_samples(name: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            wav_path: PathBuf::new(),
            sample_rate,
            samples,
            expectations: None,
        }
    }

    /// Load a mono WAV plus `<name>.expect.json` when present (or the
    /// explicit `expect` override).
    pub fn load(wav_path: &Path, expect: Option<PathBuf>) -> Result<Self> {
        let (samples, sample_rate) = read_wav(wav_path)?;
        let name = wav_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Invalid fixture name for {}", wav_path.display()))?
            .to_string();

        let default_expect = wav_path.with_extension("expect.json");
        let expect_path = expect.or_else(|| default_expect.exists().then_some(default_expect));
        let expectations = match expect_path {
            Some(path) => {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("reading expectation {}", path.display()))?;
                Some(
                    serde_json::from_str(&json)
                        .with_context(|| format!("parsing {}", path.display()))?,
                )
            }
            None => None,
        };

        Ok(Self {
            name,
            wav_path: wav_path.to_path_buf(),
            sample_rate,
            samples,
            expectations,
        })
    }
}

/// JSON expectation schema for fixture verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FixtureExpectations {
    /// Expected note attacks in order, e.g. `["E2", "A2"]`
    pub notes: Vec<String>,
    /// Expected chord suffixed name, if any
    #[serde(default)]
    pub chord: Option<String>,
}

impl FixtureExpectations {
    pub fn verify(&self, report: &FixtureReport) -> std::result::Result<(), ExpectationDiff> {
        let actual: Vec<String> = report
            .attack_notes()
            .map(|event| event.note().to_string())
            .collect();
        let actual_chord = report.chord.as_ref().map(|c| c.suffixed_name.clone());

        let mut failures = Vec::new();
        if actual != self.notes {
            failures.push(format!(
                "notes: expected {:?}, found {:?}",
                self.notes, actual
            ));
        }
        if self.chord.is_some() && self.chord != actual_chord {
            failures.push(format!(
                "chord: expected {:?}, found {:?}",
                self.chord, actual_chord
            ));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Outcome of comparing a report with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub failures: Vec<String>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "failures": self.failures })
    }
}

/// Everything the pipeline produced for one recording
#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub fixture: String,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub notes: Vec<NoteEvent>,
    pub pitch_classes: Vec<String>,
    pub chord: Option<ChordMatch>,
    pub stats: PipelineStats,
}

impl FixtureReport {
    pub fn attack_notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.notes
            .iter()
            .filter(|event| event.kind == crate::analysis::stabilizer::NoteEventKind::Attack)
    }
}

/// Runs a whole recording through the note pipeline, one frame per step.
pub struct FixtureProcessor {
    config: AppConfig,
}

impl FixtureProcessor {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Process non-overlapping frames; a trailing partial frame is dropped.
    pub fn run(&self, data: &FixtureData) -> Result<FixtureReport> {
        let mut pipeline = NotePipeline::standalone(&self.config)
            .with_context(|| format!("configuring pipeline for {}", data.name))?;
        let frame_size = pipeline.frame_size();
        let frame_ms = frame_size as f64 / data.sample_rate.max(1) as f64 * 1000.0;

        let mut notes = Vec::new();
        for (index, frame) in data.samples.chunks_exact(frame_size).enumerate() {
            let outcome = AudioFrame::new(frame.to_vec(), data.sample_rate)
                .and_then(|frame| pipeline.process_frame(&frame, index as f64 * frame_ms))
                .with_context(|| format!("frame {} of {}", index, data.name))?;
            if let Some(note) = outcome.note {
                notes.push(note);
            }
        }

        let detected = pipeline.detected_snapshot();
        Ok(FixtureReport {
            fixture: data.name.clone(),
            sample_rate: data.sample_rate,
            frame_size,
            notes,
            pitch_classes: detected.to_names(),
            chord: match_chord(&detected),
            stats: pipeline.stats(),
        })
    }
}

pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(anyhow!(
            "Fixture {} must be mono (found {} channels)",
            path.display(),
            spec.channels
        ));
    }

    let sample_rate = spec.sample_rate;

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|sample| sample.map(|v| v as f32 / max).map_err(|err| anyhow!(err)))
                    .collect::<Result<Vec<f32>>>()?,
                24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|v| v as f32 / max).map_err(|err| anyhow!(err)))
                    .collect::<Result<Vec<f32>>>()?,
                other => {
                    return Err(anyhow!(
                        "Unsupported bits per sample {} in {}",
                        other,
                        path.display()
                    ))
                }
            }
        }
    };

    Ok((samples, sample_rate))
}

/// Write mono 16-bit PCM
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer
        .finalize()
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}
