//! TLS 1.3 record layer.
//!
//! [`RecordLayer`] owns the transport and the [`RecordCryptor`] of one
//! connection. It frames, protects and reassembles records; the handshake
//! drivers in [`handshake`](crate::tls::handshake) only exchange whole
//! handshake messages with it and tell it when a new key epoch starts.
//!
//! Once the handshake completes the layer carries application data until
//! either side sends `close_notify`, the peer closes the transport, or a
//! protocol error moves it to [`HandshakeState::Failed`].
//!
//! # Example
//! ```ignore
//! let mut socket = TlsSocket::client(transport, &ClientConfig::default(), Some("localhost")).await?;
//! socket.write_all(b"GET / HTTP/1.0\r\n\r\n").await?;
//!
//! let layer = socket.record_layer();
//! assert_eq!(layer.state(), HandshakeState::ApplicationData);
//! ```

use crate::error::{Error, Result};
use crate::reactor::Transport;
use crate::tls::Role;
use crate::tls::alert::{Alert, AlertDescription, AlertLevel};
use crate::tls::buffer::{ReadBuffer, WriteBuffer};
use crate::tls::cipher::{CipherSuite, TAG_LEN};
use crate::tls::config::DEFAULT_MAX_CHANGE_CIPHER_SPEC;
use crate::tls::cryptor::RecordCryptor;
use crate::tls::key_schedule::{TrafficSecrets, next_traffic_secret};
use crate::tls::messages::{HandshakeMessage, message_len};
use crate::tls::record::{
    CHANGE_CIPHER_SPEC_BODY, ContentType, INITIAL_RECORD_VERSION, LEGACY_RECORD_VERSION, MAX_PLAINTEXT_LEN,
    RecordHeader, strip_padding,
};

use std::io;
use std::ops::Range;

use tracing::{debug, trace, warn};

/// Largest handshake message accepted from the peer.
const MAX_HANDSHAKE_MESSAGE_LEN: usize = 1 << 17;

/// Where a connection is in its lifetime.
///
/// Client and server walk different subsets of these states. Only
/// `ApplicationData` and `Closed` allow reads; only `ApplicationData`
/// allows writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Start,
    SendClientHello,
    RecvClientHello,
    AwaitServerHello,
    SendServerFlight,
    AwaitEncryptedExtensions,
    AwaitCertificate,
    AwaitCertificateVerify,
    AwaitServerFinished,
    SendClientFinished,
    AwaitClientFinished,
    ApplicationData,
    /// A fatal error ended the connection.
    Failed,
    /// This side sent `close_notify`.
    Closed,
}

impl HandshakeState {
    fn is_handshaking(self) -> bool {
        !matches!(
            self,
            Self::Start | Self::ApplicationData | Self::Failed | Self::Closed
        )
    }
}

/// Record framing and protection for one connection.
pub struct RecordLayer<T: Transport> {
    transport: T,
    role: Role,
    state: HandshakeState,
    cryptor: RecordCryptor,
    read_buffer: ReadBuffer,
    write_buffer: WriteBuffer,
    /// Handshake bytes received but not yet returned as whole messages.
    handshake_buffer: Vec<u8>,
    change_cipher_spec_count: usize,
    max_change_cipher_spec: usize,
    /// Secrets of the first application epoch.
    application_secrets: Option<TrafficSecrets>,
    /// Current application secrets, advanced by KeyUpdate.
    sender_secret: Vec<u8>,
    receiver_secret: Vec<u8>,
    received_close_notify: bool,
}

impl<T: Transport> RecordLayer<T> {
    pub fn new(transport: T, role: Role) -> Self {
        Self {
            transport,
            role,
            state: HandshakeState::Start,
            cryptor: RecordCryptor::new(),
            read_buffer: ReadBuffer::new(),
            write_buffer: WriteBuffer::new(),
            handshake_buffer: Vec::new(),
            change_cipher_spec_count: 0,
            max_change_cipher_spec: DEFAULT_MAX_CHANGE_CIPHER_SPEC,
            application_secrets: None,
            sender_secret: Vec::new(),
            receiver_secret: Vec::new(),
            received_close_notify: false,
        }
    }

    pub(crate) fn set_max_change_cipher_spec(&mut self, limit: usize) {
        self.max_change_cipher_spec = limit;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_handshake_complete(&self) -> bool {
        matches!(self.state, HandshakeState::ApplicationData | HandshakeState::Closed)
    }

    /// Negotiated suite, once ServerHello has been processed.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cryptor.cipher_suite()
    }

    /// Client and server application traffic secrets of the first epoch.
    ///
    /// Both ends of a successful handshake report equal values.
    pub fn application_secrets(&self) -> Option<&TrafficSecrets> {
        self.application_secrets.as_ref()
    }

    pub fn cryptor(&self) -> &RecordCryptor {
        &self.cryptor
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub(crate) fn set_state(&mut self, next: HandshakeState) {
        debug!(role = ?self.role, from = ?self.state, to = ?next, "handshake state");
        self.state = next;
    }

    /// Reads from the transport until one whole record is buffered.
    ///
    /// A transport that ends mid-record, or before a `close_notify`, is a
    /// truncation and reported as a transport error.
    pub(crate) async fn read_full_record(&mut self) -> Result<RecordHeader> {
        loop {
            if let Some(header) = self.read_buffer.complete_record()? {
                trace!(
                    content_type = ?header.content_type,
                    length = header.length,
                    "record received"
                );
                return Ok(header);
            }

            let spare = self.read_buffer.spare();
            if spare.is_empty() {
                return Err(Error::Contract("record read with plaintext still pending"));
            }

            let read = self.transport.read(spare).await?;
            if read == 0 {
                return Err(Error::peer_closed());
            }

            self.read_buffer.filled(read);
        }
    }

    /// Next record that is not a middlebox change_cipher_spec.
    ///
    /// A change_cipher_spec is tolerated only during the handshake once
    /// protected records are expected, must carry the single byte `0x01`,
    /// and counts against the configured limit. It never touches the
    /// sequence number or the transcript.
    async fn read_record_skip_change_cipher_spec(&mut self) -> Result<(RecordHeader, Range<usize>)> {
        loop {
            let header = self.read_full_record().await?;
            let body = self.read_buffer.take_record(&header);

            if header.content_type != ContentType::ChangeCipherSpec {
                return Ok((header, body));
            }

            if !self.state.is_handshaking() || !self.cryptor.has_receiver_keys() {
                return Err(Error::handshake(
                    AlertDescription::UnexpectedMessage,
                    "change_cipher_spec outside the handshake",
                ));
            }

            if self.read_buffer.bytes(body) != CHANGE_CIPHER_SPEC_BODY {
                return Err(Error::handshake(
                    AlertDescription::UnexpectedMessage,
                    "malformed change_cipher_spec",
                ));
            }

            self.change_cipher_spec_count += 1;
            if self.change_cipher_spec_count > self.max_change_cipher_spec {
                return Err(Error::handshake(
                    AlertDescription::UnexpectedMessage,
                    "too many change_cipher_spec records",
                ));
            }

            trace!(count = self.change_cipher_spec_count, "change_cipher_spec skipped");
        }
    }

    /// Reads one record and removes its protection.
    ///
    /// Returns the true content type and the range of the plaintext inside
    /// the read buffer. Before receive keys exist only handshake and alert
    /// records are accepted in the clear.
    pub(crate) async fn read_and_decrypt_record(&mut self) -> Result<(ContentType, Range<usize>)> {
        let (header, body) = self.read_record_skip_change_cipher_spec().await?;

        if !self.cryptor.has_receiver_keys() {
            return match header.content_type {
                ContentType::Handshake | ContentType::Alert => Ok((header.content_type, body)),
                _ => Err(Error::handshake(
                    AlertDescription::UnexpectedMessage,
                    "protected record before keys were established",
                )),
            };
        }

        if header.content_type != ContentType::ApplicationData {
            return Err(Error::handshake(
                AlertDescription::UnexpectedMessage,
                "unprotected record after keys were established",
            ));
        }

        if body.len() <= TAG_LEN {
            return Err(Error::Decode("protected record shorter than its tag"));
        }

        let aad = header.encode();
        let record = self.read_buffer.bytes_mut(body.clone());
        let (ciphertext, tag_bytes) = record.split_at_mut(record.len() - TAG_LEN);

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(tag_bytes);

        self.cryptor.open_in_place(&aad, ciphertext, &tag)?;
        let (length, content_type) = strip_padding(ciphertext)?;

        if content_type == ContentType::ChangeCipherSpec {
            return Err(Error::handshake(
                AlertDescription::UnexpectedMessage,
                "protected change_cipher_spec",
            ));
        }

        trace!(?content_type, length, "record decrypted");
        Ok((content_type, body.start..body.start + length))
    }

    /// Returns the next complete handshake message, header included.
    ///
    /// Messages may be split across records or share one; the bytes are
    /// gathered here until the length in the message header is satisfied.
    pub(crate) async fn next_handshake_message(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(message) = self.take_buffered_handshake_message()? {
                return Ok(message);
            }

            let (content_type, body) = self.read_and_decrypt_record().await?;

            match content_type {
                ContentType::Handshake => {
                    if body.is_empty() {
                        return Err(Error::handshake(
                            AlertDescription::UnexpectedMessage,
                            "empty handshake record",
                        ));
                    }
                    self.handshake_buffer.extend_from_slice(self.read_buffer.bytes(body));
                }
                ContentType::Alert => {
                    self.receive_alert(body)?;
                    // close_notify in the middle of a handshake.
                    return Err(Error::peer_closed());
                }
                _ => {
                    return Err(Error::handshake(
                        AlertDescription::UnexpectedMessage,
                        "application data during the handshake",
                    ));
                }
            }
        }
    }

    fn take_buffered_handshake_message(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(length) = message_len(&self.handshake_buffer) else {
            return Ok(None);
        };

        if length > MAX_HANDSHAKE_MESSAGE_LEN {
            return Err(Error::handshake(
                AlertDescription::UnexpectedMessage,
                "handshake message too large",
            ));
        }

        if self.handshake_buffer.len() < length {
            return Ok(None);
        }

        let rest = self.handshake_buffer.split_off(length);
        Ok(Some(std::mem::replace(&mut self.handshake_buffer, rest)))
    }

    /// Handles an alert record. `close_notify` is remembered; anything else
    /// ends the connection.
    fn receive_alert(&mut self, body: Range<usize>) -> Result<()> {
        let alert = Alert::decode(self.read_buffer.bytes(body))?;

        match alert.description {
            AlertDescription::CloseNotify => {
                debug!(role = ?self.role, "close_notify received");
                self.received_close_notify = true;
                Ok(())
            }
            AlertDescription::UserCanceled if alert.level == AlertLevel::Warning => {
                trace!("user_canceled received");
                Ok(())
            }
            description => {
                warn!(role = ?self.role, ?description, "peer sent fatal alert");
                Err(Error::PeerAlert(description))
            }
        }
    }

    /// Queues a handshake message, protected once send keys exist.
    pub(crate) fn queue_handshake(&mut self, message: &[u8]) -> Result<()> {
        self.queue_records(ContentType::Handshake, LEGACY_RECORD_VERSION, message)
    }

    /// Queues the first ClientHello, whose records carry version 0x0301.
    pub(crate) fn queue_client_hello(&mut self, message: &[u8]) -> Result<()> {
        self.queue_records(ContentType::Handshake, INITIAL_RECORD_VERSION, message)
    }

    pub(crate) fn queue_change_cipher_spec(&mut self) {
        self.write_buffer.push_plaintext_record(
            ContentType::ChangeCipherSpec,
            LEGACY_RECORD_VERSION,
            &CHANGE_CIPHER_SPEC_BODY,
        );
    }

    fn queue_records(&mut self, content_type: ContentType, legacy_version: u16, payload: &[u8]) -> Result<()> {
        for fragment in payload.chunks(MAX_PLAINTEXT_LEN) {
            if self.cryptor.has_sender_keys() {
                self.write_buffer
                    .push_protected_record(&mut self.cryptor, content_type, fragment)?;
            } else {
                self.write_buffer
                    .push_plaintext_record(content_type, legacy_version, fragment);
            }

            trace!(?content_type, length = fragment.len(), "record queued");
        }

        Ok(())
    }

    /// Writes every queued byte to the transport.
    ///
    /// If the future is dropped half way, the remaining bytes stay queued
    /// and go out first on the next flush.
    pub(crate) async fn flush(&mut self) -> Result<()> {
        while !self.write_buffer.is_empty() {
            let written = self.transport.write(self.write_buffer.pending()).await?;

            if written == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "transport accepted zero bytes").into());
            }

            self.write_buffer.advance(written);
        }

        Ok(())
    }

    /// Protects `payload` as records of `content_type` and sends them.
    pub(crate) async fn encrypt_and_send_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<()> {
        if !self.cryptor.has_sender_keys() {
            return Err(Error::Contract("protected record requested before keys were installed"));
        }

        self.queue_records(content_type, LEGACY_RECORD_VERSION, payload)?;
        self.flush().await
    }

    /// A key change must fall on a message boundary.
    fn ensure_handshake_boundary(&self) -> Result<()> {
        if self.handshake_buffer.is_empty() {
            Ok(())
        } else {
            Err(Error::handshake(
                AlertDescription::UnexpectedMessage,
                "handshake message spans a key change",
            ))
        }
    }

    /// Switches both directions to the handshake traffic keys.
    pub(crate) fn install_handshake_keys(&mut self, suite: CipherSuite, secrets: &TrafficSecrets) -> Result<()> {
        self.ensure_handshake_boundary()?;

        self.cryptor.set_cipher_suite(suite);
        self.cryptor.set_handshake_traffic_secrets(secrets, self.role)?;

        debug!(role = ?self.role, ?suite, "handshake keys installed");
        Ok(())
    }

    /// Switches both directions to the application traffic keys and opens
    /// the connection for application data.
    pub(crate) fn install_application_keys(&mut self, secrets: TrafficSecrets) -> Result<()> {
        self.ensure_handshake_boundary()?;

        self.cryptor.set_application_traffic_secrets(&secrets, self.role)?;
        self.sender_secret = secrets.sender(self.role).to_vec();
        self.receiver_secret = secrets.receiver(self.role).to_vec();
        self.application_secrets = Some(secrets);

        debug!(role = ?self.role, "application keys installed");
        self.set_state(HandshakeState::ApplicationData);

        Ok(())
    }

    /// Reads application data into `buffer`.
    ///
    /// Returns `Ok(0)` once the peer has sent `close_notify` or `buffer`
    /// is empty. Calling this before the handshake finished is a contract
    /// error.
    pub async fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.state {
            HandshakeState::ApplicationData | HandshakeState::Closed => {}
            HandshakeState::Failed => return Err(Error::Contract("read on a failed connection")),
            _ => return Err(Error::Contract("read before the handshake completed")),
        }

        match self.read_application_data(buffer).await {
            Ok(read) => Ok(read),
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn read_application_data(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        loop {
            if self.read_buffer.has_plaintext() {
                return Ok(self.read_buffer.read_plaintext(buffer));
            }

            if self.received_close_notify {
                return Ok(0);
            }

            let (content_type, body) = self.read_and_decrypt_record().await?;

            match content_type {
                // Zero-length records leave nothing to hand out and the loop moves on.
                ContentType::ApplicationData => self.read_buffer.set_plaintext(body),
                ContentType::Handshake => {
                    self.handshake_buffer.extend_from_slice(self.read_buffer.bytes(body));
                    self.process_post_handshake_messages().await?;
                }
                ContentType::Alert => self.receive_alert(body)?,
                ContentType::ChangeCipherSpec => {
                    return Err(Error::handshake(
                        AlertDescription::UnexpectedMessage,
                        "change_cipher_spec after the handshake",
                    ));
                }
            }
        }
    }

    async fn process_post_handshake_messages(&mut self) -> Result<()> {
        while let Some(raw) = self.take_buffered_handshake_message()? {
            match HandshakeMessage::decode(&raw)? {
                HandshakeMessage::NewSessionTicket(_) => {
                    trace!("session ticket ignored");
                }
                HandshakeMessage::KeyUpdate { update_requested } => {
                    self.ensure_handshake_boundary()?;
                    self.update_receiver_key()?;

                    if update_requested && self.state == HandshakeState::ApplicationData {
                        self.send_key_update(false).await?;
                    }
                }
                _ => {
                    return Err(Error::handshake(
                        AlertDescription::UnexpectedMessage,
                        "handshake message after the handshake completed",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Sends `data` as application data records, splitting at 2^14 bytes.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self.state {
            HandshakeState::ApplicationData => {}
            HandshakeState::Closed => return Err(Error::Contract("write after close_notify")),
            HandshakeState::Failed => return Err(Error::Contract("write on a failed connection")),
            _ => return Err(Error::Contract("write before the handshake completed")),
        }

        match self.encrypt_and_send_record(ContentType::ApplicationData, data).await {
            Ok(()) => Ok(data.len()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Moves this side's send key to the next generation, optionally asking
    /// the peer to do the same for its own.
    pub async fn update_keys(&mut self, request_peer_update: bool) -> Result<()> {
        if self.state != HandshakeState::ApplicationData {
            return Err(Error::Contract("key update outside application data"));
        }

        match self.send_key_update(request_peer_update).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn send_key_update(&mut self, update_requested: bool) -> Result<()> {
        let message = HandshakeMessage::KeyUpdate { update_requested }.encode();
        self.queue_handshake(&message)?;
        self.flush().await?;

        self.update_sender_key()
    }

    fn update_sender_key(&mut self) -> Result<()> {
        let hash = self.current_hash()?;
        self.sender_secret = next_traffic_secret(hash, &self.sender_secret)?;
        self.cryptor.set_sender_secret(&self.sender_secret)?;

        debug!(role = ?self.role, "send key updated");
        Ok(())
    }

    fn update_receiver_key(&mut self) -> Result<()> {
        let hash = self.current_hash()?;
        self.receiver_secret = next_traffic_secret(hash, &self.receiver_secret)?;
        self.cryptor.set_receiver_secret(&self.receiver_secret)?;

        debug!(role = ?self.role, "receive key updated");
        Ok(())
    }

    fn current_hash(&self) -> Result<crate::tls::cipher::HashAlgorithm> {
        self.cryptor
            .cipher_suite()
            .map(CipherSuite::hash)
            .ok_or(Error::Contract("no cipher suite negotiated"))
    }

    /// Sends `close_notify`. Reading stays possible until the peer closes
    /// its side.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.state {
            HandshakeState::Closed => return Ok(()),
            HandshakeState::ApplicationData => {}
            _ => return Err(Error::Contract("shutdown before the handshake completed")),
        }

        self.set_state(HandshakeState::Closed);

        match self.send_alert(Alert::close_notify()).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn send_alert(&mut self, alert: Alert) -> Result<()> {
        self.queue_records(ContentType::Alert, LEGACY_RECORD_VERSION, &alert.encode())?;
        self.flush().await
    }

    /// Marks the connection failed and reports the matching alert to the
    /// peer. Returns `error` for the caller to propagate.
    pub(crate) async fn fail(&mut self, error: Error) -> Error {
        if self.state == HandshakeState::Failed {
            return error;
        }

        warn!(role = ?self.role, state = ?self.state, error = %error, "connection failed");
        self.state = HandshakeState::Failed;

        if let Some(description) = error.alert() {
            // A half written record would corrupt the alert that follows it.
            self.write_buffer.clear();

            if let Err(err) = self.send_alert(Alert::fatal(description)).await {
                trace!(error = %err, "alert not delivered");
            }
        }

        error
    }
}
