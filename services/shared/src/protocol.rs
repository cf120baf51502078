//! Binary wire protocol between agency clients and the lottery server
//!
//! All integers are big-endian, fixed width, with no padding between fields.
//! Message layouts:
//! - Batch (client -> server): 2B bet count, 1B agency id, then each bet as
//!   1B+first name, 1B+last name, 4B document, 10B birthdate, 2B number.
//!   A count of zero is the agency's completion sentinel.
//! - Answer (server -> client): 1B, 0 = SUCCESS, 1 = FAIL.
//! - Winners (server -> client): 1B winner count, then 4B document each.
//! - Finish ack (client -> server): 1B, must equal 2.
//!
//! Every read loops until the exact byte count arrives (no short reads) and
//! every write loops until fully flushed (no short writes); a peer closing
//! mid-message surfaces as `ProtocolError::ConnectionClosed`.

use crate::bet::{Batch, Bet};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const STR_LEN_SIZE: usize = 1;
pub const MAX_STR_BYTES: usize = 255;
pub const AGENCY_SIZE: usize = 1;
pub const DOCUMENT_SIZE: usize = 4;
pub const BIRTHDATE_SIZE: usize = 10;
pub const NUMBER_SIZE: usize = 2;
pub const BATCH_COUNT_SIZE: usize = 2;
pub const ANSWER_SIZE: usize = 1;
pub const MAX_WINNERS: usize = 255;

/// Byte the client sends to acknowledge its winners message
pub const FINISH_ACK: u8 = 2;

/// Default cap on the decoded size of one batch, matching the sender's
/// 8kb flush threshold
pub const DEFAULT_MAX_BATCH_BYTES: usize = 8000;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed by peer mid-message")]
    ConnectionClosed,

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("string field too long: {0} bytes (max {MAX_STR_BYTES})")]
    StringTooLong(usize),

    #[error("birthdate must be exactly {BIRTHDATE_SIZE} bytes, got {0}")]
    InvalidBirthdate(usize),

    #[error("invalid answer byte: {0}")]
    InvalidAnswer(u8),

    #[error("invalid finish acknowledgment byte: {0}")]
    InvalidFinishAck(u8),

    #[error("batch exceeds byte budget: {bytes} bytes (max {max})")]
    BatchTooLarge { bytes: usize, max: usize },

    #[error("batch count {0} does not fit the 2-byte count field")]
    BatchCountOverflow(usize),

    #[error("winner list too long: {0} documents (max {MAX_WINNERS})")]
    TooManyWinners(usize),

    #[error("transport error: {0}")]
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Server answer to a submitted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Answer {
    Success = 0,
    Fail = 1,
}

impl Answer {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Answer::Success),
            1 => Ok(Answer::Fail),
            other => Err(ProtocolError::InvalidAnswer(other)),
        }
    }
}

/// Reads exactly `buf.len()` bytes, looping over partial reads.
///
/// A peer that closes before the full count arrives maps to
/// `ConnectionClosed` rather than a generic I/O error.
async fn read_exact_or_closed<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    stream.read_exact(buf).await.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(e),
    })?;
    Ok(())
}

/// Writes the whole buffer, looping over partial writes.
async fn write_all_or_closed<S>(stream: &mut S, buf: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let map = |e: io::Error| match e.kind() {
        io::ErrorKind::WriteZero | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
            ProtocolError::ConnectionClosed
        }
        _ => ProtocolError::Io(e),
    };
    stream.write_all(buf).await.map_err(map)?;
    stream.flush().await.map_err(map)?;
    Ok(())
}

/// Reads a length-prefixed UTF-8 string: 1 byte length L, then L raw bytes.
async fn read_string<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut len = [0u8; STR_LEN_SIZE];
    read_exact_or_closed(stream, &mut len).await?;

    let mut data = vec![0u8; len[0] as usize];
    read_exact_or_closed(stream, &mut data).await?;
    String::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Reads one bet body; the agency id comes from the batch header.
async fn read_bet<S>(stream: &mut S, agency: u8) -> Result<Bet>
where
    S: AsyncRead + Unpin,
{
    let first_name = read_string(stream).await?;
    let last_name = read_string(stream).await?;

    let mut document = [0u8; DOCUMENT_SIZE];
    read_exact_or_closed(stream, &mut document).await?;

    let mut birthdate = [0u8; BIRTHDATE_SIZE];
    read_exact_or_closed(stream, &mut birthdate).await?;
    let birthdate = String::from_utf8(birthdate.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;

    let mut number = [0u8; NUMBER_SIZE];
    read_exact_or_closed(stream, &mut number).await?;

    Ok(Bet {
        agency,
        first_name,
        last_name,
        document: u32::from_be_bytes(document),
        birthdate,
        number: u16::from_be_bytes(number),
    })
}

/// Encoded size of one bet on the wire
fn bet_wire_size(bet: &Bet) -> usize {
    STR_LEN_SIZE
        + bet.first_name.len()
        + STR_LEN_SIZE
        + bet.last_name.len()
        + DOCUMENT_SIZE
        + BIRTHDATE_SIZE
        + NUMBER_SIZE
}

/// Reads one batch: 2B count, 1B agency id, then `count` bets.
///
/// A count of zero is the finish sentinel and yields an empty batch.
/// `max_batch_bytes` caps the total decoded size (header included); the cap
/// is enforced while decoding so a misbehaving sender cannot stream an
/// arbitrarily large batch through a single header.
pub async fn read_batch<S>(stream: &mut S, max_batch_bytes: usize) -> Result<Batch>
where
    S: AsyncRead + Unpin,
{
    let mut count = [0u8; BATCH_COUNT_SIZE];
    read_exact_or_closed(stream, &mut count).await?;
    let count = u16::from_be_bytes(count) as usize;

    let mut agency = [0u8; AGENCY_SIZE];
    read_exact_or_closed(stream, &mut agency).await?;
    let agency = agency[0];

    let mut bytes = BATCH_COUNT_SIZE + AGENCY_SIZE;
    let mut bets = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let bet = read_bet(stream, agency).await?;
        bytes += bet_wire_size(&bet);
        if bytes > max_batch_bytes {
            return Err(ProtocolError::BatchTooLarge {
                bytes,
                max: max_batch_bytes,
            });
        }
        bets.push(bet);
    }

    Ok(Batch { agency, bets })
}

fn encode_string(message: &str, buf: &mut Vec<u8>) -> Result<()> {
    if message.len() > MAX_STR_BYTES {
        return Err(ProtocolError::StringTooLong(message.len()));
    }
    buf.push(message.len() as u8);
    buf.extend_from_slice(message.as_bytes());
    Ok(())
}

fn encode_bet(bet: &Bet, buf: &mut Vec<u8>) -> Result<()> {
    if bet.birthdate.len() != BIRTHDATE_SIZE {
        return Err(ProtocolError::InvalidBirthdate(bet.birthdate.len()));
    }
    encode_string(&bet.first_name, buf)?;
    encode_string(&bet.last_name, buf)?;
    buf.extend_from_slice(&bet.document.to_be_bytes());
    buf.extend_from_slice(bet.birthdate.as_bytes());
    buf.extend_from_slice(&bet.number.to_be_bytes());
    Ok(())
}

/// Encodes and sends one batch as a single message.
pub async fn write_batch<S>(stream: &mut S, batch: &Batch) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let count = u16::try_from(batch.bets.len())
        .map_err(|_| ProtocolError::BatchCountOverflow(batch.bets.len()))?;

    let mut buf = Vec::with_capacity(BATCH_COUNT_SIZE + AGENCY_SIZE);
    buf.extend_from_slice(&count.to_be_bytes());
    buf.push(batch.agency);
    for bet in &batch.bets {
        encode_bet(bet, &mut buf)?;
    }

    write_all_or_closed(stream, &buf).await
}

/// Sends the 1-byte SUCCESS/FAIL answer for a batch.
pub async fn write_answer<S>(stream: &mut S, answer: Answer) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_all_or_closed(stream, &[answer as u8]).await
}

/// Reads the server's answer to a batch.
pub async fn read_answer<S>(stream: &mut S) -> Result<Answer>
where
    S: AsyncRead + Unpin,
{
    let mut byte = [0u8; ANSWER_SIZE];
    read_exact_or_closed(stream, &mut byte).await?;
    Answer::from_byte(byte[0])
}

/// Sends an agency its winners: 1B count, then one 4B document per winner.
pub async fn write_winners<S>(stream: &mut S, documents: &[u32]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if documents.len() > MAX_WINNERS {
        return Err(ProtocolError::TooManyWinners(documents.len()));
    }

    let mut buf = Vec::with_capacity(1 + documents.len() * DOCUMENT_SIZE);
    buf.push(documents.len() as u8);
    for document in documents {
        buf.extend_from_slice(&document.to_be_bytes());
    }

    write_all_or_closed(stream, &buf).await
}

/// Reads the winners message addressed to this agency.
pub async fn read_winners<S>(stream: &mut S) -> Result<Vec<u32>>
where
    S: AsyncRead + Unpin,
{
    let mut count = [0u8; 1];
    read_exact_or_closed(stream, &mut count).await?;

    let mut documents = Vec::with_capacity(count[0] as usize);
    for _ in 0..count[0] {
        let mut document = [0u8; DOCUMENT_SIZE];
        read_exact_or_closed(stream, &mut document).await?;
        documents.push(u32::from_be_bytes(document));
    }
    Ok(documents)
}

/// Sends the final acknowledgment byte after receiving winners.
pub async fn write_finish_ack<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_all_or_closed(stream, &[FINISH_ACK]).await
}

/// Reads and validates the client's finish acknowledgment.
pub async fn read_finish_ack<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    read_exact_or_closed(stream, &mut byte).await?;
    if byte[0] != FINISH_ACK {
        return Err(ProtocolError::InvalidFinishAck(byte[0]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bet(agency: u8, document: u32, number: u16) -> Bet {
        Bet {
            agency,
            first_name: "Santiago Lionel".to_string(),
            last_name: "Lorca".to_string(),
            document,
            birthdate: "1999-03-17".to_string(),
            number,
        }
    }

    async fn encode_batch(batch: &Batch) -> Vec<u8> {
        let mut buf = Vec::new();
        write_batch(&mut buf, batch).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_batch_round_trip() {
        let batch = Batch::new(
            3,
            vec![
                sample_bet(3, 30904465, 2201),
                sample_bet(3, 1234, 9034),
                sample_bet(3, 7777, 5677),
            ],
        );

        let buf = encode_batch(&batch).await;
        let decoded = read_batch(&mut buf.as_slice(), DEFAULT_MAX_BATCH_BYTES)
            .await
            .unwrap();

        assert_eq!(decoded, batch);
    }

    #[tokio::test]
    async fn test_empty_batch_is_finish_sentinel() {
        let buf = encode_batch(&Batch::finished(5)).await;
        assert_eq!(buf, vec![0, 0, 5]);

        let decoded = read_batch(&mut buf.as_slice(), DEFAULT_MAX_BATCH_BYTES)
            .await
            .unwrap();
        assert!(decoded.is_finished());
        assert_eq!(decoded.agency, 5);
    }

    #[tokio::test]
    async fn test_batch_reassembles_across_fragmented_reads() {
        let batch = Batch::new(1, vec![sample_bet(1, 1234, 9034), sample_bet(1, 42, 99)]);
        let buf = encode_batch(&batch).await;

        // Deliver the message one byte at a time.
        let mut builder = tokio_test::io::Builder::new();
        for byte in &buf {
            builder.read(std::slice::from_ref(byte));
        }
        let mut stream = builder.build();

        let decoded = read_batch(&mut stream, DEFAULT_MAX_BATCH_BYTES)
            .await
            .unwrap();
        assert_eq!(decoded, batch);
    }

    #[tokio::test]
    async fn test_truncated_batch_is_connection_closed() {
        let batch = Batch::new(1, vec![sample_bet(1, 1234, 9034)]);
        let buf = encode_batch(&batch).await;

        let result = read_batch(&mut buf[..buf.len() - 3].as_ref(), DEFAULT_MAX_BATCH_BYTES).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_batch_byte_budget_enforced() {
        let batch = Batch::new(1, vec![sample_bet(1, 1, 1), sample_bet(1, 2, 2)]);
        let buf = encode_batch(&batch).await;

        // Budget large enough for the header and first bet only.
        let result = read_batch(&mut buf.as_slice(), 60).await;
        assert!(matches!(
            result,
            Err(ProtocolError::BatchTooLarge { max: 60, .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_length_birthdate_rejected_on_encode() {
        let mut bet = sample_bet(1, 1, 1);
        bet.birthdate = "1999-3-17".to_string();

        let mut buf = Vec::new();
        let result = write_batch(&mut buf, &Batch::new(1, vec![bet])).await;
        assert!(matches!(result, Err(ProtocolError::InvalidBirthdate(9))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_name_rejected() {
        // count=1, agency=1, first name of length 2 with invalid UTF-8
        let buf = vec![0, 1, 1, 2, 0xff, 0xfe];
        let result = read_batch(&mut buf.as_slice(), DEFAULT_MAX_BATCH_BYTES).await;
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[tokio::test]
    async fn test_name_over_255_bytes_rejected_on_encode() {
        let mut bet = sample_bet(1, 1, 1);
        bet.first_name = "x".repeat(300);

        let mut buf = Vec::new();
        let result = write_batch(&mut buf, &Batch::new(1, vec![bet])).await;
        assert!(matches!(result, Err(ProtocolError::StringTooLong(300))));
    }

    #[tokio::test]
    async fn test_answer_round_trip() {
        for answer in [Answer::Success, Answer::Fail] {
            let mut buf = Vec::new();
            write_answer(&mut buf, answer).await.unwrap();
            assert_eq!(read_answer(&mut buf.as_slice()).await.unwrap(), answer);
        }
    }

    #[tokio::test]
    async fn test_unknown_answer_byte_rejected() {
        let buf = [7u8];
        let result = read_answer(&mut buf.as_ref()).await;
        assert!(matches!(result, Err(ProtocolError::InvalidAnswer(7))));
    }

    #[tokio::test]
    async fn test_winners_round_trip() {
        let documents = vec![30904465, 1234, 0, u32::MAX];
        let mut buf = Vec::new();
        write_winners(&mut buf, &documents).await.unwrap();

        let decoded = read_winners(&mut buf.as_slice()).await.unwrap();
        assert_eq!(decoded, documents);
    }

    #[tokio::test]
    async fn test_empty_winners_message() {
        let mut buf = Vec::new();
        write_winners(&mut buf, &[]).await.unwrap();
        assert_eq!(buf, vec![0]);
        assert!(read_winners(&mut buf.as_slice()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_winner_count_over_one_byte_rejected() {
        let documents = vec![1u32; 256];
        let mut buf = Vec::new();
        let result = write_winners(&mut buf, &documents).await;
        assert!(matches!(result, Err(ProtocolError::TooManyWinners(256))));
    }

    #[tokio::test]
    async fn test_finish_ack_round_trip() {
        let mut buf = Vec::new();
        write_finish_ack(&mut buf).await.unwrap();
        read_finish_ack(&mut buf.as_slice()).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_finish_ack_rejected() {
        let buf = [0u8];
        let result = read_finish_ack(&mut buf.as_ref()).await;
        assert!(matches!(result, Err(ProtocolError::InvalidFinishAck(0))));
    }
}
