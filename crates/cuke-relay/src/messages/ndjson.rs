//! Newline-delimited JSON encoding of envelope logs.

use std::io::{self, BufRead, Write};

use super::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum NdjsonError {
    #[error("Failed to read messages: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid envelope on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Read one envelope per non-blank line.
pub fn read_envelopes<R: BufRead>(reader: R) -> Result<Vec<Envelope>, NdjsonError> {
    let mut envelopes = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let envelope = serde_json::from_str(&line).map_err(|source| NdjsonError::Parse {
            line: index + 1,
            source,
        })?;
        envelopes.push(envelope);
    }
    Ok(envelopes)
}

pub fn parse_ndjson(text: &str) -> Result<Vec<Envelope>, NdjsonError> {
    read_envelopes(text.as_bytes())
}

/// Write each envelope as one JSON line terminated by `\n`.
pub fn write_envelopes<W: Write>(mut writer: W, envelopes: &[Envelope]) -> io::Result<()> {
    for envelope in envelopes {
        serde_json::to_writer(&mut writer, envelope)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

pub fn to_ndjson_string(envelopes: &[Envelope]) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_envelopes(&mut buffer, envelopes);
    String::from_utf8_lossy(&buffer).into_owned()
}
