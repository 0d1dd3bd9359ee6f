//! Color policy for log output.
//!
//! - The command-line choice wins.
//! - `NO_COLOR` or `EMACS` in the environment turn `Auto` off.
//! - Otherwise `Auto` colors only when stderr is a TTY.

use std::env;
use std::fmt;
use std::str::FromStr;

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorWhen {
    /// Enable colors only when output is a TTY.
    #[default]
    Auto,

    /// Always enable colors.
    Always,

    /// Never enable colors.
    Never,
}

/// Environment facts the `Auto` policy depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalEnv {
    // ---
    pub no_color: bool,
    pub emacs: bool,
    pub is_tty: bool,
}

impl TerminalEnv {
    // ---
    /// Snapshot of the current process environment for stderr.
    pub fn stderr() -> Self {
        // ---
        Self {
            no_color: env::var_os("NO_COLOR").is_some(),
            emacs: env::var_os("EMACS").is_some(),
            is_tty: atty::is(atty::Stream::Stderr),
        }
    }
}

impl ColorWhen {
    // ---
    /// Decides whether to color given an explicit environment snapshot.
    pub fn resolve(self, term: TerminalEnv) -> bool {
        match self {
            ColorWhen::Always => true,
            ColorWhen::Never => false,
            ColorWhen::Auto => !term.no_color && !term.emacs && term.is_tty,
        }
    }

    /// Whether log lines written to stderr should carry ANSI color.
    pub fn should_color_stderr(self) -> bool {
        self.resolve(TerminalEnv::stderr())
    }
}

impl FromStr for ColorWhen {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ColorWhen::Auto),
            "always" => Ok(ColorWhen::Always),
            "never" => Ok(ColorWhen::Never),
            other => Err(format!("unknown color mode '{other}' (expected auto, always or never)")),
        }
    }
}

impl fmt::Display for ColorWhen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColorWhen::Auto => "auto",
            ColorWhen::Always => "always",
            ColorWhen::Never => "never",
        };
        f.write_str(s)
    }
}
