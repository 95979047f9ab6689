// crates/framestack-cli/src/main.rs
//
// framestack: render a project JSON to an MP4.
//
//   framestack timeline.json -o out.mp4
//
// The render runs on its own thread; this thread drains progress events and
// paints a single-line status until the channel closes.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use log::info;

use framestack_core::Project;
use framestack_media::{render_timeline, RenderSpec};

#[derive(Parser, Debug)]
#[command(name = "framestack", version, about = "Timeline compositor: project JSON in, MP4 out")]
struct Args {
    /// Project description (JSON).
    project: PathBuf,

    /// Output file path.
    #[arg(short, long)]
    output: PathBuf,

    /// Output frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Forward decode window before a source reseeks, in seconds.
    #[arg(long, default_value_t = 1.0)]
    seek_threshold: f64,

    /// Suppress the progress line.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let json = fs::read_to_string(&args.project)
        .with_context(|| format!("read project '{}'", args.project.display()))?;
    let project: Project = serde_json::from_str(&json)
        .with_context(|| format!("parse project '{}'", args.project.display()))?;

    let mut spec = RenderSpec::new(project, &args.output);
    spec.fps = args.fps;
    spec.seek_threshold = args.seek_threshold;

    info!(
        "rendering '{}' -> '{}' ({}x{} @ {} fps, job {})",
        args.project.display(),
        args.output.display(),
        spec.project.output_width,
        spec.project.output_height,
        spec.fps,
        spec.job_id
    );

    let (tx, rx) = crossbeam_channel::bounded(64);
    let stats = std::thread::scope(|scope| {
        let spec = &spec;
        let handle = scope.spawn(move || render_timeline(spec, Some(&tx)));

        for event in rx {
            if args.quiet {
                continue;
            }
            let pct = 100 * event.frames_done / event.total_frames.max(1);
            print!("\rframe {}/{} ({pct}%)", event.frames_done, event.total_frames);
            let _ = std::io::stdout().flush();
        }
        if !args.quiet {
            println!();
        }

        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("render thread panicked")),
        }
    })?;

    info!(
        "done: {} video frames, {} audio frames -> '{}'",
        stats.video_frames,
        stats.audio_frames,
        args.output.display()
    );
    Ok(())
}
