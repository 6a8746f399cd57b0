//! Process-wide log setup for the binaries.
//!
//! Library code only emits through the `log` macros. `init` installs the
//! `env_logger` backend once: `RUST_LOG` wins over the configured level, and
//! every line can be teed into an append-mode log file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Default filter when `RUST_LOG` is unset, e.g. `info` or `traffic_cv=debug`.
    pub level: String,
    /// Optional file that receives a copy of every line.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

pub fn init(settings: &LogSettings) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.level.as_str()),
    );
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] {}",
            buf.timestamp_millis(),
            record.level(),
            record.args()
        )
    });
    if let Some(path) = &settings.file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
    }
    builder
        .try_init()
        .map_err(|e| anyhow!("logger already initialised: {}", e))
}
