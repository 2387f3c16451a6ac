use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgGroup, Parser};
use image_gen_contracts::inputs::{validate_image_count, validate_image_path};
use image_gen_contracts::output::write_results;
use image_gen_contracts::{ImageGenConfig, ImageGenError, Moderation, Quality};
use image_gen_engine::settings::{api_key, env_lookup};
use image_gen_engine::{build_backend, ApiKind, ImageBackend};
use tracing_subscriber::EnvFilter;

const DEFAULT_SIZE: &str = "1024x1024";
const DEFAULT_OUTPUT: &str = "generated.png";

#[derive(Debug, Parser)]
#[command(
    name = "image-gen",
    version,
    about = "Generate or edit images using OpenAI GPT or Google Gemini APIs."
)]
#[command(group(
    ArgGroup::new("prompt_source")
        .required(true)
        .args(["prompt", "prompt_file"])
))]
struct Cli {
    /// Input images (referenced as Image 1, Image 2, etc. in the prompt)
    images: Vec<PathBuf>,
    /// API backend to use: gpt or gemini
    #[arg(long, default_value = "gpt")]
    api: String,
    /// Output path (default: last input filename with _n suffix, or 'generated.png')
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(short, long, default_value = "high", value_parser = ["high", "medium", "low"])]
    quality: String,
    /// Output size: WxH pixels or an aspect ratio like 16:9
    #[arg(long, default_value = DEFAULT_SIZE)]
    size: String,
    /// Prompt describing the image or edit
    #[arg(short, long)]
    prompt: Option<String>,
    /// Path to a file containing the prompt
    #[arg(short = 'f', long)]
    prompt_file: Option<PathBuf>,
    /// Number of variations to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,
    /// Generate with a transparent background (GPT only)
    #[arg(long)]
    transparent: bool,
    #[arg(long, default_value = "low", value_parser = ["auto", "low"])]
    moderation: String,
}

/// Everything the driver needs once inputs have been validated.
#[derive(Debug)]
struct Invocation {
    api: ApiKind,
    config: ImageGenConfig,
    output_base: PathBuf,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        report_error(&err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("IMAGE_GEN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
}

fn report_error(err: &anyhow::Error) {
    for line in error_lines(err) {
        eprintln!("{line}");
    }
}

fn error_lines(err: &anyhow::Error) -> Vec<String> {
    match err.downcast_ref::<ImageGenError>() {
        Some(known) if !known.is_backend() => {
            let mut lines = vec![format!("[!] {known}")];
            if let Some(hint) = known.hint() {
                lines.push(format!("    {hint}"));
            }
            lines
        }
        _ => vec![format!("[!] Error: {err:#}")],
    }
}

fn run() -> Result<()> {
    let cli = parse_cli(std::env::args_os())?;
    run_invocation(cli, &env_lookup, build_backend)?;
    Ok(())
}

/// Parses arguments, turning usage errors into configuration errors so they
/// share the `[!]` report and exit status. Help and version still exit
/// through clap.
fn parse_cli<I, T>(args: I) -> image_gen_contracts::Result<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => err.exit(),
        _ => ImageGenError::Configuration(usage_message(&err)),
    })
}

fn usage_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    rendered
        .lines()
        .take_while(|line| !line.trim().is_empty())
        .map(|line| line.trim().trim_start_matches("error:").trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn run_invocation<F>(
    cli: Cli,
    lookup: &dyn Fn(&str) -> Option<String>,
    make_backend: F,
) -> Result<Vec<PathBuf>>
where
    F: FnOnce(ApiKind) -> image_gen_contracts::Result<Box<dyn ImageBackend>>,
{
    let invocation = prepare(cli, lookup)?;
    let started = Instant::now();
    let backend = make_backend(invocation.api)?;
    let written = execute(&invocation, backend.as_ref())?;
    println!("Done in {:.1}s.", started.elapsed().as_secs_f64());
    Ok(written)
}

/// Validates inputs in order; every failure is terminal.
fn prepare(
    cli: Cli,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> image_gen_contracts::Result<Invocation> {
    let api = cli.api.parse::<ApiKind>()?;
    let prompt = resolve_prompt(cli.prompt, cli.prompt_file.as_deref())?;
    if cli.count == 0 {
        return Err(ImageGenError::Configuration(
            "--count must be at least 1".to_string(),
        ));
    }
    let quality = cli.quality.parse::<Quality>()?;
    let moderation = cli.moderation.parse::<Moderation>()?;

    validate_image_count(cli.images.len(), api.max_input_images(), api.name())?;
    api_key(api, lookup)?;
    for image in &cli.images {
        validate_image_path(image)?;
    }

    let config = ImageGenConfig::new(
        prompt,
        cli.images,
        quality,
        cli.size,
        cli.count,
        cli.transparent,
        moderation,
    );
    let output_base = match (cli.output, config.last_image()) {
        (Some(output), _) => output,
        (None, Some(last)) => last.to_path_buf(),
        (None, None) => PathBuf::from(DEFAULT_OUTPUT),
    };
    Ok(Invocation {
        api,
        config,
        output_base,
    })
}

fn resolve_prompt(
    prompt: Option<String>,
    prompt_file: Option<&Path>,
) -> image_gen_contracts::Result<String> {
    let prompt = match (prompt, prompt_file) {
        (Some(prompt), None) => prompt,
        (None, Some(path)) => {
            if !path.exists() {
                return Err(ImageGenError::Configuration(format!(
                    "Prompt file not found: {}",
                    path.display()
                )));
            }
            fs::read_to_string(path)
                .map_err(|err| {
                    ImageGenError::Configuration(format!(
                        "Failed reading prompt file {}: {err}",
                        path.display()
                    ))
                })?
                .trim()
                .to_string()
        }
        _ => {
            return Err(ImageGenError::Configuration(
                "Exactly one of --prompt or --prompt-file is required".to_string(),
            ))
        }
    };
    if prompt.trim().is_empty() {
        return Err(ImageGenError::Configuration("Prompt is empty".to_string()));
    }
    Ok(prompt)
}

fn execute(invocation: &Invocation, backend: &dyn ImageBackend) -> Result<Vec<PathBuf>> {
    let config = &invocation.config;
    for warning in backend.validate_config(config) {
        eprintln!("[!] Warning: {warning}");
    }

    let results = if config.is_edit() {
        println!("Processing image edit with {}...", invocation.api);
        for (idx, image) in config.images().iter().enumerate() {
            println!("  Image {}: {}", idx + 1, image.display());
        }
        backend.edit(config)?
    } else {
        println!("Generating image with {}...", invocation.api);
        backend.generate(config)?
    };
    tracing::debug!(results = results.len(), "backend returned");

    if results.is_empty() {
        return Err(ImageGenError::NoImageData.into());
    }

    let written = write_results(&invocation.output_base, &results)?;
    for path in &written {
        println!("  Output: {}", path.display());
    }
    Ok(written)
}
