//! 日志输出
//!
//! 终端处于 raw 模式时 `\n` 不会回到行首，这里把日志换行改写为 `\r\n`。

use crossterm::terminal;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

/// 将 `\n` 改写为 `\r\n` 的 writer
pub struct CrlfWriter<W: Write> {
    inner: W,
    raw: bool,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W, raw: bool) -> Self {
        Self { inner, raw }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.raw {
            return self.inner.write(buf);
        }

        let mut lines = buf.split(|&b| b == b'\n').peekable();
        while let Some(line) = lines.next() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            self.inner.write_all(line)?;
            if lines.peek().is_some() {
                self.inner.write_all(b"\r\n")?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn stderr_writer() -> CrlfWriter<io::Stderr> {
    let raw = terminal::is_raw_mode_enabled().unwrap_or(false);
    CrlfWriter::new(io::stderr(), raw)
}

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；否则默认 `info`，`--debug` 时为 `debug`。
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(stderr_writer)
        .init();
}
