// src/main.rs

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use crossterm::terminal;
use tokio::runtime::Handle;

use trackline::waveform::terminal::render_composite;
use trackline::{PipelineConfig, Sample, Track, TrackLineGenerator};

const USAGE: &str = "usage: trackline [--config FILE] [--height ROWS] FILE[:VOLUME[:TEMPO]]...";

struct CliArgs {
    config: Option<PathBuf>,
    height: usize,
    tracks: Vec<TrackArg>,
}

#[derive(Debug, PartialEq)]
struct TrackArg {
    path: PathBuf,
    volume: Option<f32>,
    tempo: Option<f32>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut config = None;
        let mut height = 9;
        let mut tracks = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().ok_or_else(|| anyhow!("--config needs a file"))?;
                    config = Some(PathBuf::from(path));
                }
                "--height" => {
                    let rows = args.next().ok_or_else(|| anyhow!("--height needs a number"))?;
                    height = rows.parse().with_context(|| format!("bad height '{rows}'"))?;
                }
                "-h" | "--help" => bail!(USAGE),
                _ => tracks.push(TrackArg::parse(&arg)),
            }
        }

        if tracks.is_empty() {
            bail!(USAGE);
        }
        Ok(Self {
            config,
            height,
            tracks,
        })
    }
}

impl TrackArg {
    /// Peels up to two trailing `:number` fields (volume, then tempo) off
    /// the path.
    fn parse(arg: &str) -> Self {
        let mut parts: Vec<&str> = arg.split(':').collect();
        let mut numbers = Vec::new();
        while parts.len() > 1 && numbers.len() < 2 {
            match parts[parts.len() - 1].parse::<f32>() {
                Ok(n) => {
                    numbers.insert(0, n);
                    parts.pop();
                }
                Err(_) => break,
            }
        }
        Self {
            path: PathBuf::from(parts.join(":")),
            volume: numbers.first().copied(),
            tempo: numbers.get(1).copied(),
        }
    }

    fn into_track(self) -> Track {
        let name = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("track")
            .to_string();
        let mut track = Track::from_sample(&Sample::from_path(name, &self.path));
        if self.volume.is_some() || self.tempo.is_some() {
            track = track.with_volume_tempo(self.volume.unwrap_or(1.0), self.tempo.unwrap_or(1.0));
        }
        track
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = CliArgs::parse(std::env::args().skip(1))?;
    let config = match &args.config {
        Some(path) => PipelineConfig::load_from_disk(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let generator = TrackLineGenerator::builder()
        .config(config)
        .handle(Handle::current())
        .build()?;

    let mut layered = 0usize;
    for arg in args.tracks {
        let track = arg.into_track();
        match generator.update(&track).await {
            Some(_) => layered += 1,
            None => log::warn!("skipping {}", track.name),
        }
    }
    if layered == 0 {
        bail!("no track could be decoded");
    }

    let composite = generator.snapshot().await;
    let width = terminal::size().map(|(cols, _)| cols as usize).unwrap_or(80);

    for line in render_composite(&composite.values, width, args.height) {
        println!("{line}");
    }
    println!("🎚️ {} track(s), peak {:.4}", layered, composite.peak);
    Ok(())
}
