//! choir: renders a stereo vocal harmony mix for a recorded session

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use choir_core::RenderSettings;
use choir_services::{run_session, NsdfPitchExtractor, PhaseVocoderShifter, RenderReport};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "choir", about = "Render a stereo vocal harmony mix for a recorded session")]
struct Args {
    /// Session directory holding output.wav, timeline.json and config.json
    session: PathBuf,
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("choir=info".parse()?))
        .try_init()?;
    Ok(())
}

fn render(dir: PathBuf) -> anyhow::Result<RenderReport> {
    tracing::info!(session = %dir.display(), "Rendering harmony");
    let mut extractor = NsdfPitchExtractor::new();
    let report = run_session(
        &dir,
        &mut extractor,
        PhaseVocoderShifter::new(),
        RenderSettings::default(),
    )
    .with_context(|| format!("Session {} failed", dir.display()))?;
    Ok(report)
}

fn main() -> ExitCode {
    // Usage errors exit with status 2
    let args = Args::parse();

    if let Err(err) = init_tracing() {
        eprintln!("Failed to initialize logging: {err}");
    }

    match render(args.session) {
        Ok(report) => {
            tracing::info!(
                segments = report.segments_rendered,
                skipped = report.segments_skipped,
                malformed = report.malformed_segments,
                voices = report.voices_rendered,
                voices_skipped = report.voices_skipped,
                peak = report.peak,
                gain = ?report.applied_gain,
                "Wrote harmonized mix"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
