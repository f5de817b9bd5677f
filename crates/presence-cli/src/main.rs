use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::imageops::{self, FilterType};
use image::RgbImage;
use presence_core::{
    extract_face, select_detections, BoundingBox, Detection, Landmarks, LivenessConfig,
    LivenessVerdict, FACE_CROP_SIZE,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

#[derive(Parser)]
#[command(
    name = "presence",
    about = "Passive face liveness checks for attendance kiosks",
    version,
    arg_required_else_help = true
)]
struct Cli {
    /// TOML configuration file (PRESENCE_* environment variables override it)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single face crop
    Check(CheckArgs),
    /// Score face crops in order, carrying motion and blink state across frames
    Sequence(SequenceArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct CheckArgs {
    /// Face crop image, or a full frame when --bbox is given
    image: PathBuf,

    /// Previous crop (or frame) for motion analysis
    #[arg(long, value_name = "PATH")]
    previous: Option<PathBuf>,

    /// Five landmarks as "x,y;x,y;x,y;x,y;x,y" (eyes first)
    #[arg(long, value_parser = parse_landmarks, allow_hyphen_values = true)]
    landmarks: Option<Landmarks>,

    /// Face box "x1,y1,x2,y2"; the face is cropped out of the image first
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Detector confidence for --bbox
    #[arg(long, default_value_t = 1.0, requires = "bbox")]
    confidence: f32,
}

#[derive(Args)]
struct SequenceArgs {
    /// Face crops in capture order
    #[arg(required = true, value_name = "FRAME")]
    frames: Vec<PathBuf>,

    /// JSON array with one entry per frame: null or [[x, y], ...] (5 points)
    #[arg(long, value_name = "PATH")]
    landmarks_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    image: String,
    label: &'static str,
    #[serde(flatten)]
    verdict: &'a LivenessVerdict,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Check(args) => run_check(config, args, cli.json).await,
        Commands::Sequence(args) => run_sequence(config, args, cli.json).await,
        Commands::Config => print_config(&config, cli.json),
    }
}

async fn run_check(config: LivenessConfig, args: CheckArgs, json: bool) -> Result<()> {
    let min_confidence = config.min_detection_confidence;
    let mut face = load_rgb(&args.image).await?;
    let mut previous = match &args.previous {
        Some(p) => Some(load_rgb(p).await?),
        None => None,
    };

    if let Some(bbox) = args.bbox {
        let detections = [Detection {
            bbox,
            confidence: args.confidence,
            landmarks: args.landmarks,
        }];
        if select_detections(&detections, min_confidence).is_empty() {
            bail!(
                "face rejected: confidence {} must exceed {} and the box must enclose pixels",
                args.confidence,
                min_confidence
            );
        }
        face = extract_face(&face, &bbox).context("failed to crop face")?;
        previous = previous
            .map(|p| extract_face(&p, &bbox))
            .transpose()
            .context("failed to crop previous frame")?;
    }

    let face = normalize_crop(face);
    let previous = previous.map(normalize_crop);

    let handle = engine::spawn_engine(config)?;
    let verdict = handle.check(face, args.landmarks, previous).await?;
    print_verdict(&args.image, &verdict, json)
}

async fn run_sequence(config: LivenessConfig, args: SequenceArgs, json: bool) -> Result<()> {
    let landmarks = match &args.landmarks_file {
        Some(path) => {
            let lms = load_landmarks_file(path)?;
            if lms.len() != args.frames.len() {
                bail!(
                    "landmarks file has {} entries for {} frames",
                    lms.len(),
                    args.frames.len()
                );
            }
            lms
        }
        None => vec![None; args.frames.len()],
    };

    let handle = engine::spawn_engine(config)?;
    let mut previous: Option<RgbImage> = None;
    let mut real_frames = 0usize;

    for (path, lm) in args.frames.iter().zip(landmarks) {
        let face = normalize_crop(load_rgb(path).await?);
        let verdict = handle.check(face.clone(), lm, previous.take()).await?;
        if verdict.is_real {
            real_frames += 1;
        }
        print_verdict(path, &verdict, json)?;
        previous = Some(face);
    }

    tracing::info!(
        frames = args.frames.len(),
        real_frames,
        "sequence complete"
    );
    Ok(())
}

fn print_config(config: &LivenessConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

fn print_verdict(image: &Path, verdict: &LivenessVerdict, json: bool) -> Result<()> {
    if json {
        let report = Report {
            image: image.display().to_string(),
            label: verdict.label(),
            verdict,
        };
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!(
        "{}: {} (score {:.3})",
        image.display(),
        verdict.label(),
        verdict.total_score
    );
    for (method, score) in verdict.details.iter() {
        println!("  {method:<8} {score:.3}");
    }
    Ok(())
}

/// Bring a crop to the square size the scorers are calibrated for.
///
/// Landmarks are left in their original coordinates.
fn normalize_crop(img: RgbImage) -> RgbImage {
    if img.dimensions() == (FACE_CROP_SIZE, FACE_CROP_SIZE) {
        return img;
    }
    tracing::debug!(
        width = img.width(),
        height = img.height(),
        size = FACE_CROP_SIZE,
        "resizing face crop"
    );
    imageops::resize(&img, FACE_CROP_SIZE, FACE_CROP_SIZE, FilterType::Triangle)
}

/// Decode an image off the async runtime's worker threads.
async fn load_rgb(path: &Path) -> Result<RgbImage> {
    let owned = path.to_path_buf();
    let img = tokio::task::spawn_blocking(move || image::open(&owned))
        .await
        .context("image decode task failed")?
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(img.to_rgb8())
}

fn load_landmarks_file(path: &Path) -> Result<Vec<Option<Landmarks>>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_landmarks_json(&contents)
        .with_context(|| format!("invalid landmarks file {}", path.display()))
}

fn parse_landmarks_json(s: &str) -> Result<Vec<Option<Landmarks>>> {
    let raw: Vec<Option<[[f32; 2]; 5]>> = serde_json::from_str(s)?;
    Ok(raw
        .into_iter()
        .map(|entry| entry.map(|pts| pts.map(|[x, y]| (x, y))))
        .collect())
}

fn parse_landmarks(s: &str) -> Result<Landmarks, String> {
    let points: Vec<(f32, f32)> = s
        .split(';')
        .map(|pair| parse_pair(pair.trim()))
        .collect::<Result<_, _>>()?;
    points
        .try_into()
        .map_err(|v: Vec<_>| format!("expected 5 landmarks, got {}", v.len()))
}

fn parse_pair(s: &str) -> Result<(f32, f32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in {s:?}: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in {s:?}: {e}"))?;
    Ok((x, y))
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let v: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("bad box value {p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match v.as_slice() {
        &[x1, y1, x2, y2] => Ok(BoundingBox::new(x1, y1, x2, y2)),
        _ => Err(format!("expected \"x1,y1,x2,y2\", got {} values", v.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use image::Rgb;
    use presence_core::LivenessEngine;

    fn textured_crop(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let v = ((x * 7 + y * 13) % 64) as u8 + ((x / 8 + y / 8) % 2) as u8 * 120;
            Rgb([v, v.wrapping_add(20), v / 2])
        })
    }

    #[test]
    fn test_normalize_crop_resizes_to_calibrated_size() {
        let crop = normalize_crop(textured_crop(320));
        assert_eq!(crop.dimensions(), (FACE_CROP_SIZE, FACE_CROP_SIZE));

        let tall = normalize_crop(RgbImage::new(90, 240));
        assert_eq!(tall.dimensions(), (FACE_CROP_SIZE, FACE_CROP_SIZE));
    }

    #[test]
    fn test_normalize_crop_keeps_calibrated_size_untouched() {
        let crop = textured_crop(FACE_CROP_SIZE);
        assert_eq!(normalize_crop(crop.clone()), crop);
    }

    #[test]
    fn test_large_crop_scores_like_its_downscale() {
        let large = textured_crop(320);
        let downscaled =
            imageops::resize(&large, FACE_CROP_SIZE, FACE_CROP_SIZE, FilterType::Triangle);

        let config = LivenessConfig {
            blink: false,
            motion: false,
            ..Default::default()
        };
        let from_large =
            LivenessEngine::new(config.clone()).check_liveness(&normalize_crop(large), None, None);
        let from_small = LivenessEngine::new(config).check_liveness(&downscaled, None, None);
        assert_eq!(from_large, from_small);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check_with_landmarks() {
        let cli = Cli::try_parse_from([
            "presence",
            "check",
            "face.png",
            "--previous",
            "prev.png",
            "--landmarks",
            "30,40;70,40;50,60;35,80;65,80",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.previous, Some(PathBuf::from("prev.png")));
        let lm = args.landmarks.unwrap();
        assert_eq!(lm[0], (30.0, 40.0));
        assert_eq!(lm[4], (65.0, 80.0));
    }

    #[test]
    fn test_parse_sequence_requires_frames() {
        assert!(Cli::try_parse_from(["presence", "sequence"]).is_err());
        let cli = Cli::try_parse_from(["presence", "sequence", "a.png", "b.png"]).unwrap();
        let Commands::Sequence(args) = cli.command else {
            panic!("expected sequence");
        };
        assert_eq!(args.frames.len(), 2);
        assert!(args.landmarks_file.is_none());
    }

    #[test]
    fn test_confidence_requires_bbox() {
        assert!(
            Cli::try_parse_from(["presence", "check", "f.png", "--confidence", "0.99"]).is_err()
        );
        let cli = Cli::try_parse_from([
            "presence",
            "check",
            "f.png",
            "--bbox",
            "10,20,110,140",
            "--confidence",
            "0.99",
        ])
        .unwrap();
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.bbox, Some(BoundingBox::new(10.0, 20.0, 110.0, 140.0)));
    }

    #[test]
    fn test_parse_landmarks_errors() {
        assert!(parse_landmarks("1,2;3,4").unwrap_err().contains("expected 5"));
        assert!(parse_landmarks("1,2;3,4;5,6;7,8;9").is_err());
        assert!(parse_landmarks("1,2;3,4;5,6;7,8;9,x").is_err());
    }

    #[test]
    fn test_parse_landmarks_tolerates_spaces() {
        let lm = parse_landmarks("1, 2; 3,4 ;5,6;7,8;9,10").unwrap();
        assert_eq!(lm[0], (1.0, 2.0));
        assert_eq!(lm[1], (3.0, 4.0));
    }

    #[test]
    fn test_parse_bbox() {
        assert_eq!(
            parse_bbox("-5,0,40.5,80").unwrap(),
            BoundingBox::new(-5.0, 0.0, 40.5, 80.0)
        );
        assert!(parse_bbox("1,2,3").is_err());
    }

    #[test]
    fn test_parse_landmarks_json() {
        let lms = parse_landmarks_json(
            r#"[null, [[30, 40], [70, 40], [50, 60], [35, 80], [65, 80]]]"#,
        )
        .unwrap();
        assert_eq!(lms.len(), 2);
        assert!(lms[0].is_none());
        assert_eq!(lms[1].unwrap()[1], (70.0, 40.0));
        assert!(parse_landmarks_json("[[[1, 2]]]").is_err());
    }
}
