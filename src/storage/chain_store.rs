use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only chain log: one serialized block per line, in chain order.
pub struct ChainStore {
    path: PathBuf,
}

impl ChainStore {
    pub fn new(path: impl Into<PathBuf>) -> ChainStore {
        ChainStore { path: path.into() }
    }

    pub fn get_path(&self) -> &Path {
        self.path.as_path()
    }

    /// Read every record in order. Unparsable lines are skipped, a missing
    /// file is an empty chain.
    pub fn load(&self) -> Result<Vec<Block>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No chain file at {}, starting empty", self.path.display());
                return Ok(vec![]);
            }
            Err(e) => {
                return Err(BlockchainError::Io(format!(
                    "Failed to open {}: {e}",
                    self.path.display()
                )))
            }
        };

        let mut blocks = Vec::new();
        for (line_no, raw) in BufReader::new(file).split(b'\n').enumerate() {
            let raw = raw?;
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        "Skipping record {} of {}: {e}",
                        line_no + 1,
                        self.path.display()
                    );
                    continue;
                }
            };
            let record = line.strip_suffix('\r').unwrap_or(line.as_str());
            if record.trim().is_empty() {
                continue;
            }
            match Block::parse(record) {
                Ok(block) => blocks.push(block),
                Err(e) => warn!(
                    "Skipping record {} of {}: {e}",
                    line_no + 1,
                    self.path.display()
                ),
            }
        }

        info!(
            "Chain loaded from {} with {} blocks",
            self.path.display(),
            blocks.len()
        );
        Ok(blocks)
    }

    /// Durably append one record after all previous ones
    pub fn append(&self, block: &Block) -> Result<()> {
        self.ensure_parent_dir()?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                BlockchainError::Io(format!("Failed to open {}: {e}", self.path.display()))
            })?;

        // A torn record from an earlier crash must stay on its own line
        let needs_newline = ends_without_newline(&file)?;
        let mut writer = BufWriter::new(file);
        if needs_newline {
            warn!(
                "{} does not end with a newline, sealing the partial record",
                self.path.display()
            );
            writeln!(writer)?;
        }
        writeln!(writer, "{}", block.serialize())?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Replace the whole log with `blocks`.
    ///
    /// Records go to a sibling temporary file which is then renamed over the
    /// log, so a concurrent reader sees either the old or the new chain.
    pub fn rewrite(&self, blocks: &[Block]) -> Result<()> {
        self.ensure_parent_dir()?;
        let tmp_path = self.tmp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp_path).map_err(|e| {
                BlockchainError::Io(format!("Failed to create {}: {e}", tmp_path.display()))
            })?);
            for block in blocks {
                writeln!(writer, "{}", block.serialize())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(BlockchainError::Io(format!(
                "Failed to replace {}: {e}",
                self.path.display()
            )));
        }
        info!(
            "Rewrote {} with {} blocks",
            self.path.display(),
            blocks.len()
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "chain".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// True when `file` is non-empty and its last byte is not `\n`
fn ends_without_newline(mut file: &File) -> Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
