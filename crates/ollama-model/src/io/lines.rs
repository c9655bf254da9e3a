use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading newline-delimited records from a chunk stream.
///
/// Chunk boundaries are arbitrary, a record (or even a UTF-8 sequence) may
/// be split across several chunks, so bytes are buffered until a full line
/// is available.
pub struct Lines {
    buf: Vec<u8>,
    chunks: Chunks,
    eof: bool,
}

impl Lines {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            eof: false,
        }
    }

    /// Returns the next non-blank line, without its line terminator.
    pub async fn next_line(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }

            if self.eof {
                // The last record may not be terminated.
                return self.take_rest();
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, Error> {
        while let Some(eol_idx) = self.buf.iter().position(|b| *b == b'\n') {
            let raw = self.buf.drain(..=eol_idx).collect::<Vec<_>>();
            let line = decode(&raw)?;
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    fn take_rest(&mut self) -> Result<Option<String>, Error> {
        let raw = std::mem::take(&mut self.buf);
        let line = decode(&raw)?;
        Ok((!line.is_empty()).then_some(line))
    }
}

#[inline]
fn decode(raw: &[u8]) -> Result<String, Error> {
    let Ok(s) = str::from_utf8(raw) else {
        return Err(Error::InvalidPayload);
    };
    Ok(s.trim().to_owned())
}
