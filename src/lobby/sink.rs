//! Operator-facing forwarding of worker output lines.

use std::io::{self, Write};
use std::sync::Mutex;

struct SinkInner {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

/// The sink surviving worker lines are forwarded to.
///
/// One mutex guards both writers so lines from the stdout and stderr
/// scanners never interleave mid-line. Stream origin is tagged the classic
/// way: `1>` for stdout, `2>` for stderr.
pub struct OutputSink {
    inner: Mutex<SinkInner>,
}

impl OutputSink {
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                out: Box::new(out),
                err: Box::new(err),
            }),
        }
    }

    /// Forwards to the process's own stdout/stderr.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    pub(crate) fn stdout_line(&self, line: &str) {
        let mut inner = self.lock();
        let _ = writeln!(inner.out, "1> {line}");
    }

    pub(crate) fn stderr_line(&self, line: &str) {
        let mut inner = self.lock();
        let _ = writeln!(inner.err, "2> {line}");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdio()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::OutputSink;

    /// A sink whose output can be inspected after the fact.
    pub(crate) fn capture() -> (Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>, OutputSink) {
        #[derive(Clone)]
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().expect("sink lock").extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let out = Arc::new(Mutex::new(Vec::new()));
        let err = Arc::new(Mutex::new(Vec::new()));
        let sink = OutputSink::new(Shared(out.clone()), Shared(err.clone()));
        (out, err, sink)
    }
}
