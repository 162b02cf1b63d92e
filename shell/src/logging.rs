use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Where log lines go: always stderr, plus `log` appended to when given.
///
/// Query output owns stdout.
pub(crate) fn log_writer(log: Option<&Path>) -> io::Result<BoxMakeWriter> {
    let Some(path) = log else {
        return Ok(BoxMakeWriter::new(io::stderr));
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BoxMakeWriter::new(io::stderr.and(Arc::new(file))))
}

/// Installs the global subscriber. Colors are off once a file is involved.
pub(crate) fn init(log: Option<&Path>, level: Level) -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(log_writer(log)?)
        .with_ansi(log.is_none())
        .with_target(false)
        .with_max_level(level)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[test]
    fn file_log_appends_across_runs() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("shell.log");

        for line in ["first run\n", "second run\n"] {
            let writer = log_writer(Some(&path))?;
            writer.make_writer().write_all(line.as_bytes())?;
        }

        assert_eq!(std::fs::read_to_string(&path)?, "first run\nsecond run\n");
        Ok(())
    }

    #[test]
    fn unopenable_log_path_is_an_error() {
        let missing = Path::new("/nonexistent-dir/for/shell.log");
        assert!(log_writer(Some(missing)).is_err());
    }
}
