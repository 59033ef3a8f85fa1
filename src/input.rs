use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read + Send>,
    size: Option<u64>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        if input_path.as_ref().to_string_lossy() == "-" {
            return Ok(Self {
                reader: Box::new(BufReader::new(io::stdin())),
                size: None,
            });
        }

        let file = File::open(input_path)?;
        let size = file.metadata().map(|metadata| metadata.len()).ok();

        Ok(Self {
            reader: Box::new(BufReader::new(file)),
            size,
        })
    }

    /// Input size in bytes, unknown for pipes
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Read a chunk of data into the provided buffer
    /// Returns the number of bytes read, 0 indicates EOF
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
        loop {
            match self.reader.read(buffer) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return Ok(result?),
            }
        }
    }

    /// Process the input as fixed-size records using a callback function
    /// The callback receives each complete record and should return Ok(true) to continue or Ok(false) to stop
    /// Returns the number of trailing bytes that did not form a complete record
    pub fn process_records<F>(&mut self, record_len: usize, mut callback: F) -> Result<usize>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; record_len];
        let mut filled = 0;

        loop {
            let bytes_read = self.read_chunk(&mut buffer[filled..])?;
            if bytes_read == 0 {
                break; // EOF
            }

            filled += bytes_read;
            if filled < record_len {
                continue; // Short read from a pipe
            }

            filled = 0;
            if !callback(&buffer)? {
                break; // Callback requested stop
            }
        }

        Ok(filled)
    }
}

#[cfg(test)]
impl InputReader {
    fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            size: None,
        }
    }
}

#[test]
fn records_across_short_reads() -> Result<()> {
    // delivers at most 3 bytes per read like a slow pipe
    struct Trickle(io::Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(3);
            self.0.read(&mut buf[..len])
        }
    }

    let data: Vec<u8> = (0..23).collect();
    let mut reader = InputReader::from_reader(Trickle(io::Cursor::new(data)));

    let mut records = Vec::new();
    let trailing = reader.process_records(5, |record| {
        records.push(record.to_vec());
        Ok(true)
    })?;

    assert_eq!(records.len(), 4);
    assert_eq!(records[3], [15, 16, 17, 18, 19]);
    assert_eq!(trailing, 3);
    Ok(())
}
