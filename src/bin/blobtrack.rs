use clap::Parser;
use serde::Serialize;

use blobtrack::{Config, Frame, Strategy, Tracker};

/// Demo for the tracking pipeline: runs the tracker over a synthetic
/// sequence with a drifting colored bar and prints one JSON record per
/// frame.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to a config JSON file; a built-in green color range is used
    /// when omitted
    #[arg(long)]
    config: Option<String>,
    /// Number of synthetic frames to process
    #[arg(long, default_value_t = 60)]
    frames: usize,
}

#[derive(Serialize)]
struct FrameRecord {
    frame_id: usize,
    has_lock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    angle: Option<f64>,
    vx: f64,
    vy: f64,
}

const FRAME_RATE: f64 = 30.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let mut tracker = match &args.config {
        Some(path) => Tracker::from_config(&Config::from_file(path)?)?,
        None => {
            let mut tracker = Tracker::new(Strategy::ColorRange);
            tracker.configure_color_range([40, 50, 50], [80, 255, 255])?;
            tracker
        }
    };

    for frame_id in 0..args.frames {
        let frame = synthetic_frame(320, 240, frame_id);
        tracker.update(&frame, frame_id as f64 / FRAME_RATE);

        let position = tracker.position();
        let velocity = tracker.velocity_vector();
        let record = FrameRecord {
            frame_id,
            has_lock: tracker.has_lock(),
            x: position.map(|(x, _)| x),
            y: position.map(|(_, y)| y),
            angle: tracker.angle(),
            vx: velocity.x,
            vy: velocity.y,
        };
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

/// A gray scene with a green bar drifting right two pixels per frame.
fn synthetic_frame(width: usize, height: usize, frame_id: usize) -> Frame {
    let mut frame = Frame::new(width, height, 3);
    for y in 0..height {
        for x in 0..width {
            frame.set_pixel(x, y, &[120, 120, 120]);
        }
    }
    let left = 20 + frame_id * 2;
    for y in 100..140 {
        for x in left..(left + 60).min(width) {
            frame.set_pixel(x, y, &[40, 200, 40]);
        }
    }
    frame
}
