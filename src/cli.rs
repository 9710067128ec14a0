use crate::config::load_config;
use crate::fluid::BoxSize;
use crate::holder::{Element, Holder, Outcome, RenderOverrides, RenderedPlaceholder, RunContext};
use crate::render::{RenderMode, RendererKind};
use crate::text_metrics::{FontLibrary, FontMeasurer, GlyphTableMeasurer, TextMeasurer};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "holdr", version, about = "Placeholder image renderer for holder.js style descriptors")]
pub struct Args {
    /// Descriptors such as `holder.js/300x200?theme=sky&text=Hello`
    #[arg(required = true)]
    pub descriptors: Vec<String>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Settings file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Extra font file loaded next to the system fonts (repeatable)
    #[arg(long = "font", value_name = "FILE")]
    pub fonts: Vec<PathBuf>,

    /// Element box used for fluid descriptors and exact captions
    #[arg(long = "box", default_value = "800x600", value_parser = parse_box)]
    pub live_box: BoxSize,

    /// Print or write the data URI instead of the raw image
    #[arg(long = "data-uri")]
    pub data_uri: bool,

    /// Render for a CSS background (base64 payload, background-size)
    #[arg(long)]
    pub background: bool,

    /// Debug logging (RUST_LOG still applies)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn renderer(self) -> RendererKind {
        match self {
            OutputFormat::Svg => RendererKind::Vector,
            OutputFormat::Png => RendererKind::Raster,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut settings = load_config(args.config.as_deref())?;
    if args.output_format == OutputFormat::Svg {
        // an explicit svg request must not be switched to raster by a custom font
        settings.engine.no_font_fallback = true;
    }

    let fonts = FontLibrary::system();
    for path in &args.fonts {
        fonts
            .load_font_file(path)
            .with_context(|| format!("Failed to load font {}", path.display()))?;
    }
    let measurer: Box<dyn TextMeasurer> = if fonts.face_count() > 0 {
        Box::new(FontMeasurer::new(fonts.clone()))
    } else {
        warn!("no system fonts found, measuring with the built-in glyph table");
        Box::new(GlyphTableMeasurer)
    };
    let mut holder = Holder::with_measurer(settings, measurer, fonts);
    let mut ctx = RunContext::new();

    let overrides = RenderOverrides {
        mode: args.background.then_some(RenderMode::Background),
        renderer: Some(args.output_format.renderer()),
    };

    let outputs: Vec<Option<PathBuf>> = if args.descriptors.len() == 1 {
        vec![args.output.clone()]
    } else {
        resolve_multi_outputs(args.output.as_deref(), args.output_format, args.descriptors.len())?
            .into_iter()
            .map(Some)
            .collect()
    };

    for (idx, (descriptor, output)) in args.descriptors.iter().zip(outputs).enumerate() {
        let element = Element::image(idx as u64 + 1).with_box(args.live_box.width, args.live_box.height);
        let rendered = match holder.process(descriptor, &element, overrides, &mut ctx)? {
            Outcome::Rendered(rendered) => rendered,
            Outcome::NotPlaceholder => {
                return Err(anyhow::anyhow!("`{descriptor}` is not a placeholder descriptor"));
            }
            Outcome::NotReady => {
                return Err(anyhow::anyhow!(
                    "element box {}x{} is empty",
                    args.live_box.width,
                    args.live_box.height
                ));
            }
            Outcome::Fallback { .. } => {
                return Err(anyhow::anyhow!(
                    "{} output is not available in this build",
                    args.output_format.extension()
                ));
            }
        };
        write_output(&rendered, output.as_deref(), args.output_format, args.data_uri)?;
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_box(value: &str) -> std::result::Result<BoxSize, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width: f32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width `{width}`"))?;
    let height: f32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height `{height}`"))?;
    Ok(BoxSize::new(width, height))
}

fn write_output(
    rendered: &RenderedPlaceholder,
    output: Option<&Path>,
    format: OutputFormat,
    data_uri: bool,
) -> Result<()> {
    if data_uri {
        match output {
            Some(path) => std::fs::write(path, &rendered.payload)?,
            None => println!("{}", rendered.payload),
        }
        return Ok(());
    }
    match (format, output) {
        (_, Some(path)) => rendered.image.write_to(path)?,
        (OutputFormat::Svg, None) => print!("{}", String::from_utf8_lossy(&rendered.image.bytes)),
        (OutputFormat::Png, None) => {
            return Err(anyhow::anyhow!("Output path required for png output"));
        }
    }
    Ok(())
}

fn resolve_multi_outputs(
    output: Option<&Path>,
    format: OutputFormat,
    count: usize,
) -> Result<Vec<PathBuf>> {
    let ext = format.extension();
    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for several descriptors"))?;
    if base.is_dir() {
        return Ok((0..count)
            .map(|idx| base.join(format!("placeholder-{}.{}", idx + 1, ext)))
            .collect());
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("placeholder");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    Ok((0..count)
        .map(|idx| parent.join(format!("{}-{}.{}", stem, idx + 1, ext)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_box_argument() {
        assert_eq!(parse_box("640x480").unwrap(), BoxSize::new(640.0, 480.0));
        assert_eq!(parse_box("10.5X3").unwrap(), BoxSize::new(10.5, 3.0));
        assert!(parse_box("640").is_err());
        assert!(parse_box("ax3").is_err());
    }

    #[test]
    fn parses_arguments() {
        let args = Args::try_parse_from([
            "holdr",
            "holder.js/100x100",
            "-e",
            "png",
            "-o",
            "out.png",
            "--box",
            "300x200",
        ])
        .unwrap();
        assert_eq!(args.descriptors, vec!["holder.js/100x100".to_string()]);
        assert_eq!(args.output_format, OutputFormat::Png);
        assert_eq!(args.live_box, BoxSize::new(300.0, 200.0));
        assert!(!args.data_uri);
        assert!(args.fonts.is_empty());
        assert!(Args::try_parse_from(["holdr"]).is_err());

        let args = Args::try_parse_from([
            "holdr",
            "holder.js/100x100?font=Lobster",
            "--font",
            "fonts/Lobster.ttf",
            "--font",
            "fonts/Other.otf",
        ])
        .unwrap();
        assert_eq!(
            args.fonts,
            vec![PathBuf::from("fonts/Lobster.ttf"), PathBuf::from("fonts/Other.otf")]
        );
    }

    #[test]
    fn numbers_multiple_outputs() {
        let outputs =
            resolve_multi_outputs(Some(Path::new("out/thumb.svg")), OutputFormat::Svg, 2).unwrap();
        assert_eq!(
            outputs,
            vec![PathBuf::from("out/thumb-1.svg"), PathBuf::from("out/thumb-2.svg")]
        );
        assert!(resolve_multi_outputs(None, OutputFormat::Png, 2).is_err());
    }
}
