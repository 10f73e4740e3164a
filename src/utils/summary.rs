//! Scalar summaries written as CSV rows `step,group,name,value`

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Appending scalar writer
///
/// Reopening an existing file continues it, so a resumed run keeps its history.
pub struct SummaryWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl SummaryWriter {
    /// Open `<dir>/scalars.csv`, creating the directory and header if needed
    pub fn create(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let path = dir.join("scalars.csv");
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(["step", "group", "name", "value"])?;
        }

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scalar(&mut self, step: u64, group: &str, name: &str, value: f64) -> anyhow::Result<()> {
        self.writer
            .write_record([step.to_string(), group.to_string(), name.to_string(), value.to_string()])?;
        Ok(())
    }

    /// Write a group of named scalars at one step
    pub fn scalars<'a, I>(&mut self, step: u64, group: &str, values: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (name, value) in values {
            self.scalar(step, group, name, value)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
