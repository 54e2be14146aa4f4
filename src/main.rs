use std::path::PathBuf;

use annotate_points::app::{read_overlays, AnnotateApp, LaunchOptions};
use annotate_points::AnnotatorConfig;
use eframe::egui;

const USAGE: &str =
    "Usage: annotate-points [--config FILE] [--overlays FILE] [--fallback URL]... IMAGE...";

// ── Arguments ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    overlays: Option<PathBuf>,
    fallbacks: Vec<String>,
    images: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{} needs a value", flag));
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--overlays" => parsed.overlays = Some(PathBuf::from(value("--overlays")?)),
            "--fallback" => parsed.fallbacks.push(value("--fallback")?),
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => return Err(format!("Unknown option {}", flag)),
            other => parsed.images.push(other.to_string()),
        }
    }
    Ok(parsed)
}

fn load_config(path: Option<&PathBuf>) -> Result<AnnotatorConfig, String> {
    let config = match path {
        Some(path) => {
            AnnotatorConfig::load(path).map_err(|e| format!("{}: {}", path.display(), e))?
        }
        None => AnnotatorConfig::default(),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("Invalid configuration: {}", msg);
            std::process::exit(1);
        }
    };

    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let overlays = match &args.overlays {
        Some(path) => read_overlays(path).unwrap_or_else(|e| {
            log::error!("Failed to read detections: {}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    if args.images.is_empty() {
        log::info!("No image given; use \"Open image…\" to pick one");
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("annotate-points"),
        ..Default::default()
    };

    let launch = LaunchOptions {
        images: args.images,
        fallbacks: args.fallbacks,
        overlays,
    };

    if let Err(e) = eframe::run_native(
        "annotate-points",
        options,
        Box::new(move |cc| Ok(Box::new(AnnotateApp::new(cc, config, launch)))),
    ) {
        log::error!("Failed to run eframe: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_command_line() {
        let parsed = parse_args(args(&[
            "--config",
            "cfg.json",
            "--fallback",
            "https://mirror/a.png",
            "a.png",
            "--overlays",
            "det.json",
            "--fallback",
            "b.png",
            "c.jpg",
        ]))
        .unwrap();

        assert_eq!(parsed.config, Some(PathBuf::from("cfg.json")));
        assert_eq!(parsed.overlays, Some(PathBuf::from("det.json")));
        assert_eq!(parsed.fallbacks, args(&["https://mirror/a.png", "b.png"]));
        assert_eq!(parsed.images, args(&["a.png", "c.jpg"]));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--zoom", "2"])).is_err());
        assert_eq!(parse_args(args(&[])).unwrap(), Args::default());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = load_config(None).unwrap();
        assert_eq!(config.categories.names, vec!["ship", "door", "chair"]);
    }
}
