//! Buffers between the transport and the record layer.
//!
//! [`ReadBuffer`] collects transport bytes until one whole record is
//! present and keeps the decrypted plaintext of the current record until the
//! caller has consumed it. [`WriteBuffer`] holds framed records until the
//! transport has taken every byte.

use crate::error::{Error, Result};
use crate::tls::cipher::TAG_LEN;
use crate::tls::cryptor::RecordCryptor;
use crate::tls::record::{
    ContentType, LEGACY_RECORD_VERSION, MAX_CIPHERTEXT_LEN, MAX_PLAINTEXT_LEN, RECORD_HEADER_LEN, RecordHeader,
};

use std::ops::Range;

/// Room for exactly one record of the largest legal size.
pub(crate) const READ_BUFFER_CAPACITY: usize = RECORD_HEADER_LEN + MAX_CIPHERTEXT_LEN;

pub(crate) struct ReadBuffer {
    data: Box<[u8]>,
    /// First byte of the next unprocessed record.
    start: usize,
    /// End of the bytes received so far.
    end: usize,
    /// Decrypted content of the last record not yet handed out.
    plaintext: Range<usize>,
}

impl ReadBuffer {
    pub(crate) fn new() -> Self {
        Self {
            data: vec![0u8; READ_BUFFER_CAPACITY].into_boxed_slice(),
            start: 0,
            end: 0,
            plaintext: 0..0,
        }
    }

    /// Bytes received but not yet taken as a record.
    pub(crate) fn buffered(&self) -> usize {
        self.end - self.start
    }

    /// Header of the next record if all of its bytes are buffered.
    ///
    /// The header is validated as soon as its five bytes are present, so an
    /// oversized length fails before the body is waited for.
    pub(crate) fn complete_record(&self) -> Result<Option<RecordHeader>> {
        if self.buffered() < RECORD_HEADER_LEN {
            return Ok(None);
        }

        let header = RecordHeader::decode(&self.data[self.start..self.end])?;

        if self.buffered() < header.record_len() {
            return Ok(None);
        }

        Ok(Some(header))
    }

    /// Free space after the buffered bytes, compacting first if needed.
    pub(crate) fn spare(&mut self) -> &mut [u8] {
        if self.start == self.end && self.plaintext.is_empty() {
            self.start = 0;
            self.end = 0;
        } else if self.end == self.data.len() {
            self.compact();
        }

        &mut self.data[self.end..]
    }

    pub(crate) fn filled(&mut self, count: usize) {
        debug_assert!(self.end + count <= self.data.len());
        self.end += count;
    }

    /// Consumes the complete record described by `header` and returns the
    /// range of its body.
    ///
    /// The body stays valid until the next call to [`spare`](Self::spare)
    /// with no plaintext pending.
    pub(crate) fn take_record(&mut self, header: &RecordHeader) -> Range<usize> {
        let body = self.start + RECORD_HEADER_LEN..self.start + header.record_len();
        self.start = body.end;

        body
    }

    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    pub(crate) fn bytes_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.data[range]
    }

    /// Marks `range` (inside the record just taken) as readable plaintext.
    pub(crate) fn set_plaintext(&mut self, range: Range<usize>) {
        self.plaintext = range;
    }

    pub(crate) fn has_plaintext(&self) -> bool {
        !self.plaintext.is_empty()
    }

    /// Copies as much pending plaintext as fits into `out`.
    pub(crate) fn read_plaintext(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.plaintext.len());
        let from = self.plaintext.start;

        out[..count].copy_from_slice(&self.data[from..from + count]);
        self.plaintext.start += count;

        count
    }

    /// Moves everything still needed to the front of the buffer.
    fn compact(&mut self) {
        let origin = if self.plaintext.is_empty() {
            self.start
        } else {
            self.plaintext.start.min(self.start)
        };

        if origin == 0 {
            return;
        }

        self.data.copy_within(origin..self.end, 0);
        self.start -= origin;
        self.end -= origin;

        if self.plaintext.is_empty() {
            self.plaintext = 0..0;
        } else {
            self.plaintext = self.plaintext.start - origin..self.plaintext.end - origin;
        }
    }
}

#[derive(Default)]
pub(crate) struct WriteBuffer {
    data: Vec<u8>,
    written: usize,
}

impl WriteBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.written == self.data.len()
    }

    /// Bytes the transport has not accepted yet.
    pub(crate) fn pending(&self) -> &[u8] {
        &self.data[self.written..]
    }

    pub(crate) fn advance(&mut self, count: usize) {
        self.written += count;

        if self.is_empty() {
            self.clear();
        }
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.written = 0;
    }

    /// Frames `payload` as one unprotected record.
    pub(crate) fn push_plaintext_record(&mut self, content_type: ContentType, legacy_version: u16, payload: &[u8]) {
        debug_assert!(payload.len() <= MAX_PLAINTEXT_LEN);

        let header = RecordHeader {
            content_type,
            legacy_version,
            length: payload.len() as u16,
        };

        self.data.extend_from_slice(&header.encode());
        self.data.extend_from_slice(payload);
    }

    /// Frames `payload` as one protected record.
    ///
    /// The outer record is application_data; the real content type travels
    /// encrypted after the payload, and the tag follows the ciphertext.
    pub(crate) fn push_protected_record(
        &mut self,
        cryptor: &mut RecordCryptor,
        inner_type: ContentType,
        payload: &[u8],
    ) -> Result<()> {
        if payload.len() > MAX_PLAINTEXT_LEN {
            return Err(Error::Contract("record payload exceeds 2^14 bytes"));
        }

        let inner_len = payload.len() + 1;
        let header = RecordHeader {
            content_type: ContentType::ApplicationData,
            legacy_version: LEGACY_RECORD_VERSION,
            length: (inner_len + TAG_LEN) as u16,
        };
        let aad = header.encode();

        let start = self.data.len();
        self.data.extend_from_slice(&aad);

        let body = self.data.len();
        self.data.resize(body + inner_len, 0);

        let mut tag = [0u8; TAG_LEN];
        let sealed = cryptor.encrypt2(payload, &[inner_type as u8], &aad, &mut self.data[body..], &mut tag);

        if let Err(err) = sealed {
            self.data.truncate(start);
            return Err(err);
        }

        self.data.extend_from_slice(&tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::cipher::CipherSuite;

    fn feed(buffer: &mut ReadBuffer, bytes: &[u8]) {
        let spare = buffer.spare();
        spare[..bytes.len()].copy_from_slice(bytes);
        buffer.filled(bytes.len());
    }

    #[test]
    fn record_is_complete_only_with_its_body() {
        let mut buffer = ReadBuffer::new();
        feed(&mut buffer, &[22, 3, 3, 0, 3, 1]);
        assert_eq!(buffer.complete_record().unwrap(), None);

        feed(&mut buffer, &[2, 3, 23]);
        let header = buffer.complete_record().unwrap().unwrap();
        assert_eq!(header.length, 3);

        let body = buffer.take_record(&header);
        assert_eq!(buffer.bytes(body), &[1, 2, 3]);
        assert_eq!(buffer.buffered(), 1);
    }

    #[test]
    fn invalid_header_fails_before_body_arrives() {
        let mut buffer = ReadBuffer::new();
        feed(&mut buffer, &[23, 3, 3, 0xff, 0xff]);
        assert!(buffer.complete_record().is_err());
    }

    #[test]
    fn compaction_keeps_pending_plaintext() {
        let mut buffer = ReadBuffer::new();
        let record_len = RECORD_HEADER_LEN + 100;
        let mut record = vec![23u8, 3, 3, 0, 100];
        record.extend(0..100u8);

        // Fill the buffer with whole records up to its end.
        let count = READ_BUFFER_CAPACITY / record_len;
        for _ in 0..count {
            feed(&mut buffer, &record);
        }
        let tail = READ_BUFFER_CAPACITY - count * record_len;
        feed(&mut buffer, &record[..tail]);

        for _ in 0..count - 1 {
            let header = buffer.complete_record().unwrap().unwrap();
            buffer.take_record(&header);
        }
        let header = buffer.complete_record().unwrap().unwrap();
        let body = buffer.take_record(&header);
        buffer.set_plaintext(body.start + 10..body.end);

        let spare = buffer.spare().len();
        assert!(spare >= record_len);

        let mut out = [0u8; 4];
        assert_eq!(buffer.read_plaintext(&mut out), 4);
        assert_eq!(out, [10, 11, 12, 13]);
    }

    #[test]
    fn protected_record_layout() {
        let mut cryptor = RecordCryptor::new();
        cryptor.set_cipher_suite(CipherSuite::Aes128GcmSha256);
        cryptor.set_sender_key(&[7u8; 16], [1u8; 12]).unwrap();

        let mut buffer = WriteBuffer::new();
        buffer
            .push_protected_record(&mut cryptor, ContentType::Handshake, b"hello")
            .unwrap();

        let pending = buffer.pending();
        assert_eq!(pending.len(), RECORD_HEADER_LEN + 5 + 1 + TAG_LEN);
        assert_eq!(&pending[..5], &[23, 3, 3, 0, 22]);
        assert_eq!(cryptor.sender_sequence(), Some(1));

        buffer.advance(10);
        assert_eq!(buffer.pending().len(), 17);
        buffer.advance(17);
        assert!(buffer.is_empty());
    }
}
