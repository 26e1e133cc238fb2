use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use jit::Program;
use render::{
    DEFAULT_MAX_ITERATIONS, Engine, ImageFormat, Viewport, category_render, init_logging, render,
};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    program: Option<String>,
    program_file: Option<PathBuf>,
    engine: Engine,
    viewport: Viewport,
    max_iterations: u32,
    format: ImageFormat,
    output: Option<PathBuf>,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            program: None,
            program_file: None,
            engine: Engine::default(),
            viewport: Viewport::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            format: ImageFormat::default(),
            output: None,
        }
    }
}

#[derive(Debug)]
enum CliAction {
    Run(Box<CliArgs>),
    Help,
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match parse_cli_args(env::args().skip(1)) {
        Ok(CliAction::Run(cli)) => *cli,
        Ok(CliAction::Help) => {
            print_cli_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("{}", binary_version_text());
            return Ok(());
        }
        Err(err) => {
            eprintln!("error: {err}\n");
            print_cli_help();
            return Err(err.into());
        }
    };

    let text = match program_text(&cli) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error: {err}\n");
            print_cli_help();
            return Err(err.into());
        }
    };

    init_logging()?;
    info!("{}", binary_version_text());

    if let Err(err) = run(&cli, &text) {
        eprintln!("error: {err}");
        return Err(err.to_string().into());
    }
    Ok(())
}

fn run(cli: &CliArgs, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let program = Program::parse(text)?;
    cli.viewport.validate()?;
    let kernel = cli.engine.kernel(&program)?;
    let image = render(&kernel, &cli.viewport, cli.max_iterations)?;

    match &cli.output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            image.write_to(cli.format, &mut out)?;
            info!(
                "{} wrote {} image to {}",
                category_render(),
                cli.format,
                path.display()
            );
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            image.write_to(cli.format, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn program_text(cli: &CliArgs) -> Result<String, String> {
    match (&cli.program, &cli.program_file) {
        (Some(_), Some(_)) => Err("pass either <PROGRAM> or --program-file, not both".to_string()),
        (Some(text), None) => Ok(text.clone()),
        (None, Some(path)) => fs::read_to_string(path)
            .map(|raw| raw.trim().to_string())
            .map_err(|err| format!("failed to read {}: {err}", path.display())),
        (None, None) => Err("missing program text".to_string()),
    }
}

fn parse_cli_args(args: impl IntoIterator<Item = String>) -> Result<CliAction, String> {
    let mut args = args.into_iter().peekable();
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "-V" | "--version" => return Ok(CliAction::Version),
            "--engine" => {
                cli.engine = next_arg_value("--engine", &mut args)?.parse()?;
            }
            "--size" => {
                let value = next_arg_value("--size", &mut args)?;
                let (width, height) = parse_size(&value)?;
                cli.viewport = cli.viewport.with_size(width, height);
            }
            "--bounds" => {
                let value = next_arg_value("--bounds", &mut args)?;
                let [re_min, re_max, im_min, im_max] = parse_bounds(&value)?;
                cli.viewport = cli.viewport.with_bounds(re_min, re_max, im_min, im_max);
            }
            "--max-iterations" => {
                let value = next_arg_value("--max-iterations", &mut args)?;
                cli.max_iterations = value
                    .parse::<u32>()
                    .ok()
                    .filter(|max| *max > 0)
                    .ok_or_else(|| format!("invalid --max-iterations: {value}"))?;
            }
            "--format" => {
                cli.format = next_arg_value("--format", &mut args)?.parse()?;
            }
            "--output" | "-o" => {
                cli.output = Some(PathBuf::from(next_arg_value("--output", &mut args)?));
            }
            "--program-file" => {
                let value = next_arg_value("--program-file", &mut args)?;
                cli.program_file = Some(PathBuf::from(value));
            }
            value if value.starts_with('-') && value.len() > 1 => {
                return Err(format!("unknown flag '{value}'"));
            }
            text => {
                if cli.program.is_some() {
                    return Err("multiple programs provided".to_string());
                }
                cli.program = Some(text.to_string());
            }
        }
    }

    Ok(CliAction::Run(Box::new(cli)))
}

fn next_arg_value(
    flag: &str,
    args: &mut std::iter::Peekable<impl Iterator<Item = String>>,
) -> Result<String, String> {
    let value = args
        .next()
        .ok_or_else(|| format!("missing value for {flag}"))?;
    if value.trim().is_empty() {
        return Err(format!("value for {flag} cannot be empty"));
    }
    Ok(value)
}

/// `1600x900`
fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let invalid = || format!("invalid --size: {value} (expected WxH)");
    let (width, height) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
    let height = height.trim().parse::<u32>().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

/// `-2,1,-1.5,1.5`
fn parse_bounds(value: &str) -> Result<[f64; 4], String> {
    let invalid = || format!("invalid --bounds: {value} (expected RE_MIN,RE_MAX,IM_MIN,IM_MAX)");
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let bounds: [f64; 4] = parts.try_into().map_err(|_| invalid())?;
    if bounds.iter().any(|bound| !bound.is_finite()) {
        return Err(invalid());
    }
    Ok(bounds)
}

fn print_cli_help() {
    eprintln!(concat!(
        "Usage: mandel-render [options] <PROGRAM>\n\n",
        "Renders the escape-time image of a MandelASM program, e.g. '*bb+ab'.\n\n",
        "Options:\n",
        "  --engine <jit|interpret|hardcoded>        Execution engine (default: jit)\n",
        "  --size <WxH>                              Image size in pixels (default: 1600x900)\n",
        "  --bounds <RE_MIN,RE_MAX,IM_MIN,IM_MAX>    Complex-plane window (default: -1.6,1.6,-0.9,0.9)\n",
        "  --max-iterations <N>                      Escape-time cap (default: 256)\n",
        "  --format <pgm|pgm-ascii|ppm>              Output image format (default: pgm)\n",
        "  -o, --output <PATH>                       Write the image to PATH (default: stdout)\n",
        "  --program-file <PATH>                     Read the program text from PATH\n",
        "  -V, --version                             Show version with git metadata\n",
        "  -h, --help                                Show this help\n\n",
        "Logs go to stderr; filter them with RUST_LOG (default: info).\n"
    ));
}

fn binary_version_text() -> String {
    let binary = env!("CARGO_PKG_NAME");
    let git_tag = option_env!("MANDEL_BUILD_GIT_TAG").unwrap_or("untagged");
    let git_commit = option_env!("MANDEL_BUILD_GIT_COMMIT").unwrap_or("unknown");
    let git_dirty = option_env!("MANDEL_BUILD_GIT_DIRTY").unwrap_or("false");
    let dirty = matches!(git_dirty, "true" | "1" | "yes" | "dirty");

    if dirty {
        format!("{binary} {git_tag} (dirty commit: {git_commit})")
    } else {
        format!("{binary} {git_tag} ({git_commit})")
    }
}
