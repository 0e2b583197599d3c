use std::path::{Path, PathBuf};

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::Level;
use user_handles::{ObjectType, SessionView, TableLimits, UserHandle};

mod host;
mod inspect;

/// Parse a number given in decimal or with a 0x prefix.
pub(crate) fn parse_num(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("bad number '{}': {}", s, e))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    u16::try_from(parse_num(s)?).map_err(|_| format!("'{}' does not fit in 16 bits", s))
}

pub(crate) fn parse_handle(s: &str) -> Result<UserHandle, String> {
    let raw = u32::try_from(parse_num(s)?).map_err(|_| format!("'{}' is not a handle", s))?;
    Ok(UserHandle::from_raw(raw))
}

/// Parse an object type by name ("menu") or raw tag.
pub(crate) fn parse_type(s: &str) -> Result<ObjectType, String> {
    let named = [
        ObjectType::WINDOW,
        ObjectType::MENU,
        ObjectType::ICON,
        ObjectType::WINPOS,
        ObjectType::ACCEL,
        ObjectType::HOOK,
        ObjectType::IMAGE,
    ];
    if let Some(ty) = named.into_iter().find(|ty| ty.name().eq_ignore_ascii_case(s)) {
        return Ok(ty);
    }
    ObjectType::new(parse_u16(s)?).ok_or_else(|| "type 0 means a free slot".to_string())
}

#[derive(Debug, Clone, clap::Subcommand)]
enum Subcommand {
    /// Own a file-backed session and take commands on stdin.
    Host {
        path: PathBuf,
        #[arg(long, value_parser = parse_u16)]
        first: Option<u16>,
        #[arg(long, value_parser = parse_u16)]
        last: Option<u16>,
    },
    /// Show the header of a published session.
    Stat { path: PathBuf },
    /// List live handles.
    List {
        path: PathBuf,
        #[arg(long = "type", value_parser = parse_type)]
        ty: Option<ObjectType>,
    },
    /// Resolve a handle against a type.
    Resolve {
        path: PathBuf,
        #[arg(value_parser = parse_handle)]
        handle: UserHandle,
        #[arg(value_parser = parse_type)]
        ty: ObjectType,
    },
    /// Print the full form of a possibly short handle.
    Canon {
        path: PathBuf,
        #[arg(value_parser = parse_handle)]
        handle: UserHandle,
    },
}

#[derive(clap::Parser, Clone, Debug)]
struct Cli {
    #[clap(subcommand)]
    cmd: Subcommand,
    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .without_time()
            .with_max_level(log_level(cli.verbose))
            .finish(),
    )
    .into_diagnostic()?;

    match cli.cmd {
        Subcommand::Host { path, first, last } => {
            let mut limits = TableLimits::default();
            if let Some(first) = first {
                limits = limits.first(first);
            }
            if let Some(last) = last {
                limits = limits.last(last);
            }
            host::run(path, limits)
        }
        Subcommand::Stat { path } => inspect::stat(&open(&path)?),
        Subcommand::List { path, ty } => inspect::list(&open(&path)?, ty),
        Subcommand::Resolve { path, handle, ty } => inspect::resolve(&open(&path)?, handle, ty),
        Subcommand::Canon { path, handle } => inspect::canon(&open(&path)?, handle),
    }
}

fn log_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

fn open(path: &Path) -> miette::Result<SessionView> {
    SessionView::open(path).into_diagnostic()
}
