use owo_colors::OwoColorize;
use std::sync::OnceLock;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

/// Installs the global subscriber. Logs go to stderr; stdout is reserved for
/// image data.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let ansi = detect_ansi();
    let _ = ANSI_ENABLED.set(ansi);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

pub fn category_jit() -> String {
    if ansi_enabled() {
        format!("{}", "JIT".bright_magenta().bold())
    } else {
        "JIT".to_string()
    }
}

pub fn category_render() -> String {
    if ansi_enabled() {
        format!("{}", "RENDER".bright_cyan().bold())
    } else {
        "RENDER".to_string()
    }
}

/// Engine names in log lines, coloured by how fast the engine is.
pub fn engine_label(engine: &str) -> String {
    if !ansi_enabled() {
        return engine.to_string();
    }

    match engine {
        "jit" => format!("{}", engine.bright_green()),
        "hardcoded" => format!("{}", engine.bright_blue()),
        _ => format!("{}", engine.bright_yellow()),
    }
}

fn ansi_enabled() -> bool {
    *ANSI_ENABLED.get_or_init(detect_ansi)
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        let _ = enable_ansi_support();
        return true;
    }

    let windows_vt = enable_ansi_support().is_ok();
    windows_vt || supports_color::on_cached(Stream::Stderr).is_some()
}

#[cfg(windows)]
fn enable_ansi_support() -> windows::core::Result<()> {
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Console::{
        ENABLE_VIRTUAL_TERMINAL_PROCESSING, GetConsoleMode, GetStdHandle, STD_ERROR_HANDLE,
        SetConsoleMode,
    };

    unsafe {
        let handle = GetStdHandle(STD_ERROR_HANDLE)?;
        if handle == HANDLE::default() {
            return Ok(());
        }

        let mut mode = std::mem::zeroed();
        GetConsoleMode(handle, &mut mode)?;
        SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING)?;
        Ok(())
    }
}

#[cfg(not(windows))]
fn enable_ansi_support() -> Result<(), ()> {
    Err(())
}
