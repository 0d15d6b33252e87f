use crate::logbuf::{Direction, LogStore};
use crate::transport::{ConnectionState, Transport, TransportError};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use vudial_protocol::frame::RESPONSE_MARKER;
use vudial_protocol::{Command, Opcode, Response};

/// Longest reply line kept while waiting for its newline.
const MAX_LINE_LEN: usize = 4096;
/// Unsolicited replies queued for [`SerialService::events`]; newer ones are dropped.
const EVENT_QUEUE_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub flow_control: serialport::FlowControl,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub log_capacity: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115_200,
            data_bits: serialport::DataBits::Eight,
            parity: serialport::Parity::None,
            stop_bits: serialport::StopBits::One,
            flow_control: serialport::FlowControl::None,
            connect_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(1),
            log_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SerialEvent {
    /// A reply line nobody was waiting for.
    Rx(Vec<u8>),
    Opened(String),
    Closed,
    Error(String),
}

enum Request {
    Send {
        data: Vec<u8>,
        done: Sender<io::Result<()>>,
    },
    Await {
        data: Vec<u8>,
        done: Sender<io::Result<()>>,
        reply: Sender<Vec<u8>>,
    },
    Close,
}

struct Link {
    tx_cmd: Sender<Request>,
    rx_evt: Receiver<SerialEvent>,
    worker: Option<JoinHandle<()>>,
}

/// Serial link to a hub. A worker thread owns the port; commands and replies
/// cross over channels.
pub struct SerialService {
    cfg: SerialConfig,
    state: Arc<Mutex<ConnectionState>>,
    log: Arc<Mutex<LogStore>>,
    link: Option<Link>,
}

impl SerialService {
    pub fn new(cfg: SerialConfig) -> Self {
        let log = Arc::new(Mutex::new(LogStore::new(cfg.log_capacity)));
        Self {
            cfg,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            log,
            link: None,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.cfg
    }

    pub fn traffic(&self) -> Arc<Mutex<LogStore>> {
        self.log.clone()
    }

    pub fn events(&self) -> Option<&Receiver<SerialEvent>> {
        self.link.as_ref().map(|link| &link.rx_evt)
    }

    fn link(&self) -> Result<&Link, TransportError> {
        if !self.state.lock().is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.link.as_ref().ok_or(TransportError::NotConnected)
    }

    fn submit(
        &self,
        request: Request,
        done: Receiver<io::Result<()>>,
    ) -> Result<(), TransportError> {
        let link = self.link()?;
        link.tx_cmd
            .send(request)
            .map_err(|_| TransportError::WorkerGone)?;
        done.recv().map_err(|_| TransportError::WorkerGone)??;
        Ok(())
    }
}

impl Transport for SerialService {
    fn connect(&mut self) -> bool {
        if self.link.is_some() && self.state.lock().is_connected() {
            return true;
        }
        self.disconnect();
        *self.state.lock() = ConnectionState::Connecting;

        let (tx_cmd, rx_cmd) = unbounded::<Request>();
        let (tx_evt, rx_evt) = bounded::<SerialEvent>(EVENT_QUEUE_LEN);
        let (tx_open, rx_open) = bounded::<Result<String, String>>(1);
        let cfg = self.cfg.clone();
        let state = self.state.clone();
        let log = self.log.clone();

        let worker = std::thread::spawn(move || {
            match serialport::new(&cfg.port_name, cfg.baud_rate)
                .data_bits(cfg.data_bits)
                .parity(cfg.parity)
                .stop_bits(cfg.stop_bits)
                .flow_control(cfg.flow_control)
                .timeout(Duration::from_millis(50))
                .open()
            {
                Ok(port) => {
                    *state.lock() = ConnectionState::Connected(cfg.port_name.clone());
                    let _ = tx_open.send(Ok(cfg.port_name.clone()));
                    let _ = tx_evt.try_send(SerialEvent::Opened(cfg.port_name.clone()));
                    run_worker(port, rx_cmd, tx_evt, state, log);
                }
                Err(e) => {
                    let reason = format!("open failed: {e}");
                    *state.lock() = ConnectionState::Failed(reason.clone());
                    let _ = tx_open.send(Err(reason));
                }
            }
        });

        let opened = match rx_open.recv_timeout(self.cfg.connect_timeout) {
            Ok(Ok(port)) => {
                info!("connected to {port}");
                true
            }
            Ok(Err(reason)) => {
                warn!("{}: {reason}", self.cfg.port_name);
                false
            }
            Err(_) => {
                warn!("{}: open timed out", self.cfg.port_name);
                *self.state.lock() = ConnectionState::Failed("open timed out".into());
                false
            }
        };

        self.link = Some(Link {
            tx_cmd,
            rx_evt,
            worker: Some(worker),
        });
        if !opened {
            self.disconnect_keep_state();
            let mut state = self.state.lock();
            if state.is_connected() {
                *state = ConnectionState::Failed("open timed out".into());
            }
        }
        opened
    }

    fn disconnect(&mut self) {
        let was_open = self.link.is_some();
        self.disconnect_keep_state();
        if was_open {
            info!("disconnected from {}", self.cfg.port_name);
        }
        *self.state.lock() = ConnectionState::Disconnected;
    }

    fn send(&mut self, command: &Command) -> Result<(), TransportError> {
        let (done, done_rx) = bounded(1);
        self.submit(
            Request::Send {
                data: command.as_bytes().to_vec(),
                done,
            },
            done_rx,
        )
    }

    fn request(&mut self, command: &Command) -> Result<Option<Response>, TransportError> {
        let (done, done_rx) = bounded(1);
        let (reply, reply_rx) = unbounded();
        self.submit(
            Request::Await {
                data: command.as_bytes().to_vec(),
                done,
                reply,
            },
            done_rx,
        )?;

        await_reply(&reply_rx, command.opcode(), self.cfg.response_timeout)
    }

    fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }
}

impl SerialService {
    fn disconnect_keep_state(&mut self) {
        if let Some(mut link) = self.link.take() {
            let _ = link.tx_cmd.send(Request::Close);
            if let Some(worker) = link.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for SerialService {
    fn drop(&mut self) {
        self.disconnect_keep_state();
    }
}

fn run_worker(
    mut port: Box<dyn SerialPort>,
    rx_cmd: Receiver<Request>,
    tx_evt: Sender<SerialEvent>,
    state: Arc<Mutex<ConnectionState>>,
    log: Arc<Mutex<LogStore>>,
) {
    let mut buf = [0u8; 4096];
    let mut lines = LineBuffer::default();
    let mut router = ReplyRouter::default();

    loop {
        match port.read(&mut buf) {
            Ok(n) if n > 0 => {
                for line in lines.feed(&buf[..n]) {
                    log.lock().push(Direction::Rx, line.clone());
                    if let Some(line) = router.route(line) {
                        let _ = tx_evt.try_send(SerialEvent::Rx(line));
                    }
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("serial read failed: {e}");
                *state.lock() = ConnectionState::Failed(e.to_string());
                let _ = tx_evt.try_send(SerialEvent::Error(e.to_string()));
                return;
            }
        }

        loop {
            match rx_cmd.try_recv() {
                Ok(Request::Send { data, done }) => {
                    let _ = done.send(write_frame(port.as_mut(), &log, data));
                }
                Ok(Request::Await { data, done, reply }) => {
                    let result = write_frame(port.as_mut(), &log, data);
                    if result.is_ok() {
                        router.arm(reply);
                    }
                    let _ = done.send(result);
                }
                Ok(Request::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = tx_evt.try_send(SerialEvent::Closed);
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn write_frame(
    port: &mut dyn SerialPort,
    log: &Mutex<LogStore>,
    data: Vec<u8>,
) -> io::Result<()> {
    port.write_all(&data)?;
    port.flush()?;
    debug!("tx {} bytes", data.len());
    log.lock().push(Direction::Tx, data);
    Ok(())
}

/// Waits for the reply echoing `opcode`. Replies to earlier commands are
/// skipped; `Ok(None)` means nothing matching arrived in time.
fn await_reply(
    reply_rx: &Receiver<Vec<u8>>,
    opcode: Opcode,
    timeout: Duration,
) -> Result<Option<Response>, TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let line = match reply_rx.recv_timeout(remaining) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                warn!("no reply to {opcode:?} within {timeout:?}");
                return Ok(None);
            }
            Err(RecvTimeoutError::Disconnected) => return Err(TransportError::WorkerGone),
        };
        let response = Response::parse(&line)?;
        if response.opcode() == opcode {
            return Ok(Some(response));
        }
        debug!("skipping reply to {:?} while awaiting {opcode:?}", response.opcode());
    }
}

/// Hands reply lines to the request currently waiting on them.
#[derive(Debug, Default)]
struct ReplyRouter {
    pending: Option<Sender<Vec<u8>>>,
}

impl ReplyRouter {
    fn arm(&mut self, reply: Sender<Vec<u8>>) {
        self.pending = Some(reply);
    }

    /// Returns the line back when nobody takes it. Lines that are not
    /// replies are dropped.
    fn route(&mut self, line: Vec<u8>) -> Option<Vec<u8>> {
        if line.first() != Some(&RESPONSE_MARKER) {
            debug!("ignoring non-reply line ({} bytes)", line.len());
            return None;
        }
        let reply = match self.pending.take() {
            Some(reply) => reply,
            None => return Some(line),
        };
        match reply.send(line) {
            Ok(()) => {
                self.pending = Some(reply);
                None
            }
            Err(returned) => Some(returned.into_inner()),
        }
    }
}

/// Splits a byte stream into `\n`-terminated lines.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            out.push(line);
        }
        if self.buf.len() > MAX_LINE_LEN {
            warn!("dropping {} bytes without a line ending", self.buf.len());
            self.buf.clear();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_splits_across_reads() {
        let mut lines = LineBuffer::default();
        assert!(lines.feed(b"<0C01").is_empty());
        let out = lines.feed(b"0000\r\n<0B02");
        assert_eq!(out, vec![b"<0C010000\r\n".to_vec()]);
        let out = lines.feed(b"0000\n\n");
        assert_eq!(out, vec![b"<0B020000\n".to_vec(), b"\n".to_vec()]);
    }

    #[test]
    fn line_buffer_drops_runaway_input() {
        let mut lines = LineBuffer::default();
        assert!(lines.feed(&[b'A'; MAX_LINE_LEN + 1]).is_empty());
        assert_eq!(lines.feed(b"<\n"), vec![b"<\n".to_vec()]);
    }

    const UID_REPLY: &[u8] = b"<0B0200043A00FF1C\r\n";
    const VALUE_REPLY: &[u8] = b"<0305000100\r\n";

    #[test]
    fn router_hands_reply_to_waiting_request() {
        let mut router = ReplyRouter::default();
        let (reply, reply_rx) = unbounded();
        router.arm(reply);
        assert_eq!(router.route(UID_REPLY.to_vec()), None);
        assert_eq!(reply_rx.try_recv().unwrap(), UID_REPLY);
    }

    #[test]
    fn router_returns_unclaimed_lines() {
        let mut router = ReplyRouter::default();
        assert_eq!(router.route(UID_REPLY.to_vec()), Some(UID_REPLY.to_vec()));
        assert_eq!(router.route(b"boot ok\r\n".to_vec()), None);

        // The request gave up; its late reply goes back to the caller.
        let (reply, reply_rx) = unbounded();
        router.arm(reply);
        drop(reply_rx);
        assert_eq!(router.route(VALUE_REPLY.to_vec()), Some(VALUE_REPLY.to_vec()));
        assert_eq!(router.route(UID_REPLY.to_vec()), Some(UID_REPLY.to_vec()));
    }

    #[test]
    fn await_reply_skips_other_opcodes() {
        let (tx, rx) = unbounded();
        tx.send(VALUE_REPLY.to_vec()).unwrap();
        tx.send(UID_REPLY.to_vec()).unwrap();
        let response = await_reply(&rx, Opcode::GetDeviceUid, Duration::from_millis(200))
            .unwrap()
            .unwrap();
        assert_eq!(response.opcode(), Opcode::GetDeviceUid);
        assert_eq!(response.payload_hex(), "3A00FF1C");
    }

    #[test]
    fn await_reply_times_out_without_match() {
        let (tx, rx) = unbounded();
        tx.send(VALUE_REPLY.to_vec()).unwrap();
        let result = await_reply(&rx, Opcode::GetDeviceUid, Duration::from_millis(20));
        assert!(matches!(result, Ok(None)));
        drop(tx);
    }

    #[test]
    fn await_reply_reports_garbage_and_dead_worker() {
        let (tx, rx) = unbounded();
        tx.send(b"<0B0200\r\n".to_vec()).unwrap();
        assert!(matches!(
            await_reply(&rx, Opcode::GetDeviceUid, Duration::from_millis(20)),
            Err(TransportError::Decode(_))
        ));
        drop(tx);
        assert!(matches!(
            await_reply(&rx, Opcode::GetDeviceUid, Duration::from_millis(20)),
            Err(TransportError::WorkerGone)
        ));
    }

    #[test]
    fn unopened_service_rejects_commands() {
        let mut service = SerialService::new(SerialConfig::default());
        assert_eq!(service.state(), ConnectionState::Disconnected);
        assert!(matches!(
            service.send(&Command::rescan_bus()),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            service.request(&Command::get_devices_map()),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn missing_port_fails_to_connect() {
        let mut service = SerialService::new(SerialConfig {
            port_name: "/dev/vudial-does-not-exist".into(),
            ..Default::default()
        });
        assert!(!service.connect());
        assert!(matches!(service.state(), ConnectionState::Failed(_)));
        service.disconnect();
        assert_eq!(service.state(), ConnectionState::Disconnected);
    }
}
