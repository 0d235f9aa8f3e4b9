//! Connection management
//!
//! Owns the serial transport and serializes access to it. Every exchange
//! (one write plus the reads that answer it, or one listener drain cycle)
//! runs under the serial access lock; the lock is never held across a
//! retry backoff.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tracing::{debug, info, trace, warn};

use super::commands::Command;
use super::stream::{SerialChannel, Transport};
use super::{
    open_port, BusMessage, Framer, ProtocolError, RetryPolicy, DEFAULT_NAME_RETRIES,
    DEFAULT_NAME_TIMEOUT_MS, DEFAULT_QUERY_RETRIES, DEFAULT_QUERY_TIMEOUT_MS,
};
use crate::entity::EntityType;

/// Login handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not logged in
    Idle,
    /// Login sent, waiting for `@A P`
    AwaitingAck,
    /// Ack received, collecting the announcement burst
    DrainingAnnouncements,
    /// Session established
    LoggedIn,
    /// Logout sent
    LoggingOut,
}

/// Timing of queries and of the login handshake
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// State query budget
    pub query: RetryPolicy,
    /// Name query budget
    pub name_query: RetryPolicy,
    /// Login ack budget
    pub login: RetryPolicy,
    /// Upper bound of the post-ack announcement drain
    pub post_ack_timeout: Duration,
    /// Silence that ends the announcement drain early
    pub quiet_period: Duration,
    /// Sleep between polls while waiting for bytes
    pub poll_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            query: RetryPolicy::new(
                Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
                DEFAULT_QUERY_RETRIES,
                Duration::from_millis(20),
            ),
            name_query: RetryPolicy::new(
                Duration::from_millis(DEFAULT_NAME_TIMEOUT_MS),
                DEFAULT_NAME_RETRIES,
                Duration::from_millis(100),
            ),
            login: RetryPolicy::new(Duration::from_secs(10), 5, Duration::from_millis(500)),
            post_ack_timeout: Duration::from_secs(15),
            quiet_period: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Messages announced by the controller right after a successful login
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginResponse {
    messages: Vec<BusMessage>,
}

impl LoginResponse {
    /// Announced messages in arrival order
    pub fn messages(&self) -> &[BusMessage] {
        &self.messages
    }

    /// Announcements as text, one per line
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(BusMessage::raw)
            .collect::<Vec<_>>()
            .join("\r")
    }

    /// Whether the controller announced nothing
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Shared handle to the bus
///
/// Clones share the transport, the serial access lock and the session state.
#[derive(Clone)]
pub struct Connection {
    transport: Arc<Mutex<Box<dyn Transport>>>,
    session: Arc<Mutex<SessionState>>,
    config: Arc<ConnectionConfig>,
}

type Guard<'a> = MutexGuard<'a, Box<dyn Transport>>;

impl Connection {
    /// Open a serial port and wrap it
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        config: ConnectionConfig,
    ) -> Result<Self, ProtocolError> {
        let port = open_port(port_name, Some(baud_rate))?;
        info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(Self::from_transport(SerialChannel::new(port), config))
    }

    /// Wrap an already opened transport
    pub fn from_transport(transport: impl Transport + 'static, config: ConnectionConfig) -> Self {
        Self {
            transport: Arc::new(Mutex::new(Box::new(transport))),
            session: Arc::new(Mutex::new(SessionState::Idle)),
            config: Arc::new(config),
        }
    }

    /// Connection timing
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn lock(&self) -> Result<Guard<'_>, ProtocolError> {
        let guard = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_open() {
            Ok(guard)
        } else {
            Err(ProtocolError::NotConnected)
        }
    }

    fn set_session(&self, state: SessionState) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if *session != state {
            trace!("Session {:?} -> {:?}", *session, state);
            *session = state;
        }
    }

    /// Current login state
    pub fn session_state(&self) -> SessionState {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the transport is still usable
    pub fn is_open(&self) -> bool {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_open()
    }

    /// Close the transport; a running listener exits on its next iteration
    pub fn close(&self) {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
        self.set_session(SessionState::Idle);
    }

    /// Write one command without waiting for any answer
    pub fn send(&self, command: &Command) -> Result<(), ProtocolError> {
        let mut transport = self.lock()?;
        write_command(&mut transport, command)
    }

    /// Send a date sync for the given local time
    pub fn send_date(&self, now: NaiveDateTime) -> Result<(), ProtocolError> {
        self.send(&Command::date(now))
    }

    /// Read whatever is waiting and feed it to `framer`
    ///
    /// One listener drain cycle: returns immediately with no messages when
    /// nothing is waiting.
    pub fn read_available(&self, framer: &mut Framer) -> Result<Vec<BusMessage>, ProtocolError> {
        let mut transport = self.lock()?;
        let bytes = read_waiting(&mut transport)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        trace!("Read {} bytes", bytes.len());
        Ok(framer.feed(&bytes))
    }

    /// Query the state of one entity
    ///
    /// Zone-wide types always address id 1. Lines that do not answer the
    /// query are discarded.
    pub fn query(&self, entity: EntityType, id: u32) -> Result<BusMessage, ProtocolError> {
        let command = Command::get(entity, id);
        self.exchange(&command, &self.config.query)
    }

    /// Query the configured name of one entity
    pub fn query_name(&self, entity: EntityType, id: u32) -> Result<String, ProtocolError> {
        let command = Command::GetName { entity, id };
        let answer = self.exchange(&command, &self.config.name_query)?;
        Ok(answer.tokens().get(4..).unwrap_or_default().join(" "))
    }

    fn exchange(
        &self,
        command: &Command,
        policy: &RetryPolicy,
    ) -> Result<BusMessage, ProtocolError> {
        let prefix = command.response_prefix().unwrap_or_default();
        let operation = command.to_string();

        policy.run(&operation, |attempt, deadline| {
            let mut transport = self.lock()?;
            debug!("Sending {} (attempt {})", command, attempt);
            write_command(&mut transport, command)?;

            let mut framer = Framer::new();
            while Instant::now() < deadline {
                let bytes = read_waiting(&mut transport)?;
                if bytes.is_empty() {
                    thread::sleep(self.config.poll_interval);
                    continue;
                }
                for message in framer.feed(&bytes) {
                    if answers(command, &prefix, &message) {
                        debug!("Answer to {}: {}", command, message);
                        return Ok(Some(message));
                    }
                    trace!("Discarding {} while waiting for {}", message, prefix.trim_end());
                }
            }
            Ok(None)
        })
    }

    /// Log in and collect the announcement burst
    ///
    /// Input already waiting before the first attempt is discarded. The ack
    /// wait is retried per the login policy. Once acknowledged, the
    /// connection keeps reading until either the line stays quiet for
    /// `quiet_period` or `post_ack_timeout` elapses.
    pub fn login(&self, password: &str) -> Result<LoginResponse, ProtocolError> {
        let command = Command::Login {
            password: password.to_string(),
        };
        let policy = self.config.login;
        self.set_session(SessionState::AwaitingAck);

        let result = policy.run("login", |attempt, deadline| {
            let mut transport = self.lock()?;
            if attempt == 1 {
                let cleared = transport.clear_input_buffer();
                cleared.map_err(|e| io_error(&transport, e))?;
            }
            info!("Logging in to Cardio2e (attempt {}/{})", attempt, policy.max_attempts);
            write_command(&mut transport, &command)?;

            let mut framer = Framer::new();
            let mut pending = Vec::new();
            while Instant::now() < deadline {
                let bytes = read_waiting(&mut transport)?;
                if bytes.is_empty() {
                    thread::sleep(self.config.poll_interval);
                    continue;
                }
                let mut messages = framer.feed(&bytes).into_iter();
                if messages.by_ref().any(|m| m.raw().contains("@A P")) {
                    // Messages sharing the read with the ack belong to the burst
                    pending.extend(messages);
                    self.set_session(SessionState::DrainingAnnouncements);
                    let burst = self.drain_announcements(&mut transport, framer, pending)?;
                    return Ok(Some(burst));
                }
            }
            Ok(None)
        });

        match result {
            Ok(burst) => {
                self.set_session(SessionState::LoggedIn);
                info!("Logged in, {} announcements", burst.len());
                Ok(LoginResponse { messages: burst })
            }
            Err(ProtocolError::RetriesExhausted { attempts, .. }) => {
                self.set_session(SessionState::Idle);
                Err(ProtocolError::LoginFailed { attempts })
            }
            Err(e) => {
                self.set_session(SessionState::Idle);
                Err(e)
            }
        }
    }

    fn drain_announcements(
        &self,
        transport: &mut Guard<'_>,
        mut framer: Framer,
        mut burst: Vec<BusMessage>,
    ) -> Result<Vec<BusMessage>, ProtocolError> {
        let started = Instant::now();
        let mut last_bytes = started;

        loop {
            let now = Instant::now();
            if now.duration_since(started) >= self.config.post_ack_timeout {
                debug!("Announcement drain hit its {:?} budget", self.config.post_ack_timeout);
                break;
            }
            if now.duration_since(last_bytes) >= self.config.quiet_period {
                break;
            }

            let bytes = read_waiting(transport)?;
            if bytes.is_empty() {
                thread::sleep(self.config.poll_interval);
                continue;
            }
            last_bytes = Instant::now();
            burst.extend(framer.feed(&bytes));
        }

        if framer.pending() > 0 {
            debug!("Dropping {} unterminated bytes after login", framer.pending());
        }
        Ok(burst)
    }

    /// Log out without waiting for an answer
    pub fn logout(&self) -> Result<(), ProtocolError> {
        self.set_session(SessionState::LoggingOut);
        let result = self.send(&Command::Logout);
        self.set_session(SessionState::Idle);
        match &result {
            Ok(()) => info!("Logged out"),
            Err(e) => warn!("Logout not sent: {}", e),
        }
        result
    }
}

fn answers(command: &Command, prefix: &str, message: &BusMessage) -> bool {
    if !message.raw().starts_with(prefix) {
        return false;
    }
    let (id, id_index) = match command {
        Command::Get { id, .. } => (*id, 2),
        Command::GetName { id, .. } => (*id, 3),
        _ => return true,
    };
    message.token(id_index).and_then(|t| t.parse::<u32>().ok()) == Some(id)
}

fn io_error(transport: &Guard<'_>, e: std::io::Error) -> ProtocolError {
    if transport.is_open() {
        ProtocolError::IoError(e)
    } else {
        ProtocolError::NotConnected
    }
}

fn write_command(transport: &mut Guard<'_>, command: &Command) -> Result<(), ProtocolError> {
    trace!("TX {}", command);
    let bytes = command.to_bytes();
    let result = transport.write_all(&bytes).and_then(|_| transport.flush());
    result.map_err(|e| io_error(transport, e))
}

fn read_waiting(transport: &mut Guard<'_>) -> Result<Vec<u8>, ProtocolError> {
    let waiting = match transport.bytes_to_read() {
        Ok(n) => n as usize,
        Err(e) => return Err(io_error(transport, e)),
    };
    if waiting == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; waiting];
    match transport.read(&mut buf) {
        Ok(n) => {
            buf.truncate(n);
            Ok(buf)
        }
        Err(e) => Err(io_error(transport, e)),
    }
}
