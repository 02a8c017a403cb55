use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use zooscan_core::{MetricsRecord, PipelineConfig};
use zooscan_ocr::{OcrPipeline, PipelineError, PipelineOutput};

/// Read reproduction report sheets and print one JSON document per image.
///
/// Log verbosity follows `RUST_LOG` (e.g. `zooscan_ocr=debug`).
#[derive(Debug, Parser)]
#[command(name = "zooscan", version)]
pub struct Args {
    /// Pipeline config (TOML). Falls back to the per-user config directory.
    #[arg(short, long, env = "ZOOSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sheet images to read, in order.
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
}

/// Pick the config file: `--config` / `$ZOOSCAN_CONFIG`, then the per-user
/// default if it exists. `None` means built-in defaults.
pub fn resolve_config_path(explicit: Option<&Path>, user_default: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| user_default.filter(|p| p.exists()))
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "zooscan", "Zooscan")
        .map(|dirs| dirs.config_dir().join("zooscan.toml"))
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// One line of output, shaped like the legacy upload endpoint's response.
#[derive(Debug, Serialize)]
pub struct SheetReport {
    pub ok: bool,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SheetReport {
    pub fn new(file: &Path, result: Result<PipelineOutput, PipelineError>) -> Self {
        let file = file.display().to_string();
        match result {
            Ok(out) => Self {
                ok: true,
                file,
                metrics: Some(out.metrics),
                text: Some(out.text),
                accepted: Some(out.accepted),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                file,
                metrics: None,
                text: None,
                accepted: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub failed: usize,
}

pub async fn run(args: Args) -> anyhow::Result<Summary> {
    let path = resolve_config_path(args.config.as_deref(), user_config_path());
    let config = load_config(path.as_deref())?;
    run_with(&config, &args.images, std::io::stdout()).await
}

pub async fn run_with<W: Write>(
    config: &PipelineConfig,
    images: &[PathBuf],
    mut out: W,
) -> anyhow::Result<Summary> {
    let pipeline = OcrPipeline::from_config(config);
    tracing::info!(engines = ?pipeline.engine_names(), "pipeline ready");

    let mut summary = Summary::default();
    for image in images {
        let result = pipeline.process_file(image).await;
        if let Err(e) = &result {
            tracing::error!(file = %image.display(), error = %e, "sheet failed");
            summary.failed += 1;
        }
        summary.total += 1;

        let report = SheetReport::new(image, result);
        serde_json::to_writer(&mut out, &report).context("writing report")?;
        writeln!(out).context("writing report")?;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

    #[test]
    fn parse_images_and_config() {
        let args = Args::try_parse_from(["zooscan", "--config", "z.toml", "a.jpg", "b.png"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("z.toml")));
        assert_eq!(args.images, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
    }

    #[test]
    fn parse_short_and_equals_forms() {
        let args = Args::try_parse_from(["zooscan", "--config=z.toml", "a.jpg"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("z.toml")));
        let args = Args::try_parse_from(["zooscan", "-c", "y.toml", "a.jpg"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("y.toml")));
    }

    #[test]
    fn parse_help_is_reported_as_display() {
        let err = Args::try_parse_from(["zooscan", "a.jpg", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn parse_rejects_missing_images_and_unknown_flags() {
        let err = Args::try_parse_from(["zooscan", "-c", "z.toml"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert!(Args::try_parse_from(["zooscan", "a.jpg", "--config"]).is_err());
        let err = Args::try_parse_from(["zooscan", "--verbose", "a.jpg"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn args_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn config_path_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("zooscan.toml");

        assert_eq!(
            resolve_config_path(Some(Path::new("flag.toml")), Some(user.clone())),
            Some(PathBuf::from("flag.toml"))
        );
        // user default only counts once it exists
        assert_eq!(resolve_config_path(None, Some(user.clone())), None);
        std::fs::write(&user, "").unwrap();
        assert_eq!(resolve_config_path(None, Some(user.clone())), Some(user));
        assert_eq!(resolve_config_path(None, None), None);
    }

    #[test]
    fn load_config_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[gate]\nmin_chars = 0\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("min_chars"));
        assert_eq!(load_config(None).unwrap(), PipelineConfig::default());
    }

    #[tokio::test]
    async fn run_reports_each_image_as_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("sheet.png");
        let img: GrayImage = ImageBuffer::from_fn(8, 8, |_, _| Luma([180u8]));
        DynamicImage::ImageLuma8(img).save(&good).unwrap();
        let bad = dir.path().join("broken.jpg");
        std::fs::write(&bad, b"not a jpeg").unwrap();

        let mut out = Vec::new();
        let summary = run_with(&PipelineConfig::default(), &[good, bad], &mut out)
            .await
            .unwrap();
        assert_eq!(summary, Summary { total: 2, failed: 1 });

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        // No engine is compiled in by default, so the sheet degrades to an empty record.
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[0]["accepted"], false);
        assert_eq!(lines[0]["metrics"]["farm_name"], zooscan_core::DEFAULT_FARM_NAME);
        assert!(lines[0].get("error").is_none());

        assert_eq!(lines[1]["ok"], false);
        assert!(lines[1]["error"].as_str().unwrap().contains("decode"));
        assert!(lines[1].get("metrics").is_none());
    }
}
