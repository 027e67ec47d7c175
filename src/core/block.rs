use crate::core::{CancelFlag, ProofOfWork};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, sha256_hex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Previous-hash sentinel carried by the first block of every chain
pub const GENESIS_PREVIOUS_HASH: &str = "0";
const GENESIS_DATA: &str = "Genesis Block";

const FIELD_DELIMITER: char = ';';
const ESCAPE: char = '\\';
const RECORD_FIELDS: usize = 8;

/// Attachment metadata carried by a block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaInfo {
    pub path: String,
    pub media_type: String,
    pub size: u64,
}

impl MediaInfo {
    pub fn new(path: impl Into<String>, media_type: impl Into<String>, size: u64) -> MediaInfo {
        MediaInfo {
            path: path.into(),
            media_type: media_type.into(),
            size,
        }
    }

    /// Read path and size of a media file from disk
    pub fn from_file(path: &Path, media_type: Option<String>) -> Result<MediaInfo> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(BlockchainError::Io(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }
        let absolute = fs::canonicalize(path)?;
        Ok(MediaInfo {
            path: absolute.to_string_lossy().to_string(),
            media_type: media_type.unwrap_or_else(|| "media".to_string()),
            size: metadata.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    previous_hash: String,
    data: String,
    timestamp: i64,
    nonce: u64,
    hash: String,
    media_path: String,
    media_type: String,
    media_size: u64,
}

impl Block {
    /// Build an unmined block; its hash is computed for nonce 0.
    pub fn new(previous_hash: String, data: &str, media: Option<&MediaInfo>) -> Result<Block> {
        let media = media.cloned().unwrap_or_default();
        let mut block = Block {
            previous_hash,
            data: data.to_string(),
            timestamp: current_timestamp()?,
            nonce: 0,
            hash: String::new(),
            media_path: media.path,
            media_type: media.media_type,
            media_size: media.size,
        };
        block.hash = block.compute_hash();
        Ok(block)
    }

    /// Build the (unmined) first block of a chain
    pub fn genesis() -> Result<Block> {
        Block::new(GENESIS_PREVIOUS_HASH.to_string(), GENESIS_DATA, None)
    }

    /// Reassemble a block from stored fields. Nothing is recomputed.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        previous_hash: String,
        data: String,
        timestamp: i64,
        nonce: u64,
        hash: String,
        media_path: String,
        media_type: String,
        media_size: u64,
    ) -> Block {
        Block {
            previous_hash,
            data,
            timestamp,
            nonce,
            hash,
            media_path,
            media_type,
            media_size,
        }
    }

    pub fn compute_hash(&self) -> String {
        let input = format!(
            "{}{}{}{}{}{}{}",
            self.previous_hash,
            self.timestamp,
            self.nonce,
            self.data,
            self.media_path,
            self.media_type,
            self.media_size
        );
        sha256_hex(input.as_bytes())
    }

    /// Run proof-of-work until the hash has `difficulty` leading zeros
    pub fn mine(&mut self, difficulty: usize) -> Result<()> {
        ProofOfWork::new(difficulty).run(self, None)
    }

    /// Like [`Block::mine`], but gives up once `cancel` is raised
    pub fn mine_with_cancel(&mut self, difficulty: usize, cancel: &CancelFlag) -> Result<()> {
        ProofOfWork::new(difficulty).run(self, Some(cancel))
    }

    pub(crate) fn next_nonce(&mut self) -> Result<()> {
        self.nonce = self
            .nonce
            .checked_add(1)
            .ok_or_else(|| BlockchainError::Mining("Nonce space exhausted".to_string()))?;
        self.hash = self.compute_hash();
        Ok(())
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Encode as one `;`-delimited record. Text fields are backslash-escaped so
    /// delimiters or line breaks inside a payload cannot shift field boundaries.
    pub fn serialize(&self) -> String {
        [
            escape_field(&self.previous_hash),
            escape_field(&self.data),
            self.timestamp.to_string(),
            self.nonce.to_string(),
            escape_field(&self.hash),
            escape_field(&self.media_path),
            escape_field(&self.media_type),
            self.media_size.to_string(),
        ]
        .join(";")
    }

    /// Decode a record produced by [`Block::serialize`]
    pub fn parse(record: &str) -> Result<Block> {
        let fields = split_record(record)?;
        if fields.len() != RECORD_FIELDS {
            return Err(BlockchainError::Format(format!(
                "Expected {RECORD_FIELDS} fields, found {}",
                fields.len()
            )));
        }
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();

        let previous_hash = next();
        let data = next();
        let timestamp = next().parse::<i64>()?;
        let nonce = next().parse::<u64>()?;
        let hash = next();
        let media_path = next();
        let media_type = next();
        let media_size = next().parse::<u64>()?;

        Ok(Block::from_parts(
            previous_hash,
            data,
            timestamp,
            nonce,
            hash,
            media_path,
            media_type,
            media_size,
        ))
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_data(&self) -> &str {
        self.data.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_media_path(&self) -> &str {
        self.media_path.as_str()
    }

    pub fn get_media_type(&self) -> &str {
        self.media_type.as_str()
    }

    pub fn get_media_size(&self) -> u64 {
        self.media_size
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn escape_field(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            ESCAPE => escaped.push_str("\\\\"),
            FIELD_DELIMITER => escaped.push_str("\\;"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn split_record(record: &str) -> Result<Vec<String>> {
    let mut fields = Vec::with_capacity(RECORD_FIELDS);
    let mut current = String::new();
    let mut chars = record.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other @ (ESCAPE | FIELD_DELIMITER)) => current.push(other),
                Some(other) => {
                    return Err(BlockchainError::Format(format!(
                        "Unknown escape sequence \\{other}"
                    )))
                }
                None => {
                    return Err(BlockchainError::Format(
                        "Record ends with a dangling escape".to_string(),
                    ))
                }
            },
            FIELD_DELIMITER => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    Ok(fields)
}
