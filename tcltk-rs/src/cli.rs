//! Command-line runner.
//!
//! Usage:
//!   tcltk [-n] [-c <script>] [<file> [<arg> …]]
//!
//! With neither `-c` nor a file (or with the file `-`), the script is read
//! from stdin.

use std::io::Read;
use std::path::PathBuf;

use tokio::task::LocalSet;

use crate::config::Config;
use crate::error::Result;
use crate::event::{self, Scheduler};
use crate::interp::Interp;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Script to evaluate instead of a file (`-c<script>`).
    pub command: Option<String>,
    /// Skip the startup script (`-n`).
    pub no_rc: bool,
    /// Script file.
    pub file: Option<PathBuf>,
    /// Remaining arguments, exposed to the script as `argv`.
    pub args: Vec<String>,
}

pub const USAGE: &str = "Usage: tcltk [-n] [-c <script>] [<file> [<arg> ...]]";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> std::result::Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> std::result::Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            break;
        }

        // First non-flag argument is the script file.
        if !arg.starts_with('-') || arg == "-" {
            break;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'n' => args.no_rc = true,

                // -c<script>
                'c' => {
                    let script = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a script argument".to_owned());
                    };
                    args.command = Some(script);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    let mut rest = argv[i.min(argv.len())..].iter().cloned();
    if args.command.is_none() {
        args.file = rest.next().map(PathBuf::from);
    }
    args.args = rest.collect();
    Ok(args)
}

// ── Running ───────────────────────────────────────────────────────────────────

/// Evaluate the requested script, then keep draining events until no
/// timers or idle callbacks remain.  Returns the result of a `-c` script.
///
/// The scheduler task is spawned into `local`, which must be the set
/// driving this future.
pub async fn run(args: CliArgs, config: &Config, local: &LocalSet) -> Result<String> {
    let interp = Interp::new();
    if config.init_tk {
        interp.init_tk()?;
    }

    let argv0 = match (&args.command, &args.file) {
        (None, Some(file)) => file.display().to_string(),
        _ => "tcltk".to_owned(),
    };
    interp.set("argv0", argv0)?;
    interp.set("argc", args.args.len())?;
    interp.set("argv", args.args.clone())?;

    if !args.no_rc {
        if let Some(rc) = config.rc_path() {
            if let Err(e) = interp.source::<()>(&rc) {
                eprintln!("tcltk: warning: {}: {e}", rc.display());
            }
        }
    }

    let output = match (&args.command, &args.file) {
        (Some(script), _) => interp.eval::<String>(script)?,
        (None, Some(file)) if file.as_os_str() != "-" => {
            interp.source::<()>(file)?;
            String::new()
        }
        (None, _) => {
            let mut script = String::new();
            std::io::stdin().read_to_string(&mut script)?;
            interp.eval::<()>(&script)?;
            String::new()
        }
    };

    if event::pending() {
        let started = Scheduler::resume_with(local, config);
        while event::pending() {
            tokio::time::sleep(config.event_interval).await;
        }
        if started {
            Scheduler::suspend();
        }
    }

    interp.delete()?;
    Ok(output)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
