//! CSV reader for the agency's bets file
//!
//! One bet per line: `first_name,last_name,document,birthdate,number`.
//! Bets are yielded in batches so the submission loop never holds the whole
//! file in memory.

use shared::Bet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to read bets file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bet at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

pub struct BetReader {
    agency: u8,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl BetReader {
    pub fn open(path: impl AsRef<Path>, agency: u8) -> Result<Self, ReaderError> {
        let file = File::open(path)?;
        Ok(Self {
            agency,
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    /// Reads up to `batch_size` bets; an empty result means end of file.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Vec<Bet>, ReaderError> {
        let mut bets = Vec::with_capacity(batch_size);
        while bets.len() < batch_size {
            let Some(line) = self.lines.next() else {
                break;
            };
            let line = line?;
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            bets.push(self.parse_line(&line)?);
        }
        Ok(bets)
    }

    fn parse_line(&self, line: &str) -> Result<Bet, ReaderError> {
        let malformed = |reason: &str| ReaderError::Malformed {
            line: self.line_no,
            reason: reason.to_string(),
        };

        let mut fields = line.split(',');
        let first_name = fields
            .next()
            .ok_or_else(|| malformed("missing first name"))?
            .to_string();
        let last_name = fields
            .next()
            .ok_or_else(|| malformed("missing last name"))?
            .to_string();
        let document = fields
            .next()
            .ok_or_else(|| malformed("missing document"))?
            .trim()
            .parse::<u32>()
            .map_err(|_| malformed("document is not a 32-bit unsigned integer"))?;
        let birthdate = fields
            .next()
            .ok_or_else(|| malformed("missing birthdate"))?
            .to_string();
        let number = fields
            .next()
            .ok_or_else(|| malformed("missing bet number"))?
            .trim()
            .parse::<u16>()
            .map_err(|_| malformed("bet number is not a 16-bit unsigned integer"))?;
        if fields.next().is_some() {
            return Err(malformed("too many fields"));
        }

        Ok(Bet {
            agency: self.agency,
            first_name,
            last_name,
            document,
            birthdate,
            number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn write_temp_csv(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("agency-{}.csv", Uuid::new_v4()));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_reads_bets_in_batches() {
        let path = write_temp_csv(
            "Santiago Lionel,Lorca,30904465,1999-03-17,2201\n\
             Ana,Paz,1234,1990-01-01,9034\n\
             Juan,Gomez,7777,1985-12-31,5677\n",
        );
        let mut reader = BetReader::open(&path, 3).unwrap();

        let first = reader.next_batch(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].first_name, "Santiago Lionel");
        assert_eq!(first[0].document, 30904465);
        assert_eq!(first[0].number, 2201);
        assert_eq!(first[0].agency, 3);

        let second = reader.next_batch(2).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].last_name, "Gomez");

        assert!(reader.next_batch(2).unwrap().is_empty());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let path = write_temp_csv("Ana,Paz,1,1990-01-01,1\n\n\nJuan,Gomez,2,1991-02-02,2\n");
        let mut reader = BetReader::open(&path, 1).unwrap();
        assert_eq!(reader.next_batch(10).unwrap().len(), 2);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_malformed_document_is_rejected_with_line_number() {
        let path = write_temp_csv("Ana,Paz,1,1990-01-01,1\nJuan,Gomez,abc,1991-02-02,2\n");
        let mut reader = BetReader::open(&path, 1).unwrap();

        let result = reader.next_batch(10);
        assert!(matches!(
            result,
            Err(ReaderError::Malformed { line: 2, .. })
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
