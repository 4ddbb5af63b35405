//! Frame relay over plain TCP.
//!
//! Stands in for an RTMP publisher on desktop: it resolves and connects to
//! the host and port named by an `rtmp://` URL, then streams raw frames as
//! length-prefixed records. It does not speak the RTMP protocol.
//!
//! Wire format (all integers big-endian):
//!
//! ```text
//! header: u32 len | path bytes (UTF-8, `len` bytes)
//! frame:  u32 len | u64 timestamp_us | u32 width | u32 height | data
//! ```
//!
//! A frame's `len` counts everything after the length field.

use std::io::{BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use url::Url;

use rtmp_publisher_core::{LinkListener, PublishLink, PublisherError, StreamParameters, VideoFrame};

use crate::error::VirtualBackendError;

pub const DEFAULT_RTMP_PORT: u16 = 1935;

const CONNECT_THREAD: &str = "tcp-link-connect";
const WRITER_THREAD: &str = "tcp-link-writer";

#[derive(Debug, Clone)]
pub struct TcpLinkConfig {
    pub connect_timeout: Duration,
    /// Frames buffered for the writer before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            queue_capacity: 64,
        }
    }
}

/// Where a publish URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub host: String,
    pub port: u16,
    /// Application and stream name, e.g. `/live/stream1`.
    pub path: String,
}

impl LinkTarget {
    pub fn parse(url: &str) -> Result<Self, VirtualBackendError> {
        let invalid = |reason: &str| VirtualBackendError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        if parsed.scheme() != "rtmp" {
            return Err(invalid("unsupported scheme"));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;

        Ok(Self {
            host: host.to_string(),
            port: parsed.port().unwrap_or(DEFAULT_RTMP_PORT),
            path: parsed.path().to_string(),
        })
    }
}

/// State shared between the owner and one connection's threads.
struct Connection {
    closed: AtomicBool,
    connected: AtomicBool,
    stream: Mutex<Option<TcpStream>>,
    listener: Arc<dyn LinkListener>,
}

impl Connection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(stream) = self.stream.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

struct ActiveLink {
    connection: Arc<Connection>,
    frames: Sender<VideoFrame>,
}

/// `PublishLink` that relays frames to a TCP endpoint.
pub struct TcpPublishLink {
    config: TcpLinkConfig,
    active: Mutex<Option<ActiveLink>>,
    paused: AtomicBool,
    dropped: AtomicU64,
}

impl TcpPublishLink {
    pub fn new(config: TcpLinkConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
            paused: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Frames discarded because the writer queue was full.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_paused(&self, paused: bool) -> Result<(), PublisherError> {
        if self.active.lock().is_none() {
            return Err(VirtualBackendError::NotOpen.into());
        }
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for TcpPublishLink {
    fn default() -> Self {
        Self::new(TcpLinkConfig::default())
    }
}

impl PublishLink for TcpPublishLink {
    fn open(
        &self,
        url: &str,
        params: &StreamParameters,
        listener: Arc<dyn LinkListener>,
    ) -> Result<(), PublisherError> {
        let target = LinkTarget::parse(url)?;
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(VirtualBackendError::AlreadyOpen.into());
        }

        let connection = Arc::new(Connection {
            closed: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            stream: Mutex::new(None),
            listener,
        });
        let (tx, rx) = crossbeam_channel::bounded(self.config.queue_capacity.max(1));
        let timeout = self.config.connect_timeout;

        let conn = Arc::clone(&connection);
        thread::Builder::new()
            .name(CONNECT_THREAD.into())
            .spawn(move || connect_and_relay(conn, target, timeout, rx))
            .map_err(|source| VirtualBackendError::Spawn {
                name: CONNECT_THREAD,
                source,
            })?;

        log::debug!(
            "tcp link opening {} ({}x{}@{}, {} bps)",
            url,
            params.width,
            params.height,
            params.fps,
            params.video_bitrate
        );
        self.paused.store(false, Ordering::SeqCst);
        *active = Some(ActiveLink {
            connection,
            frames: tx,
        });
        Ok(())
    }

    fn send_frame(&self, frame: &VideoFrame) {
        if self.is_paused() {
            return;
        }
        let active = self.active.lock();
        let Some(link) = active.as_ref() else {
            return;
        };
        if !link.connection.connected.load(Ordering::SeqCst) {
            return;
        }
        match link.frames.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::trace!("tcp link queue full, {} frames dropped", dropped);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn pause(&self) -> Result<(), PublisherError> {
        self.set_paused(true)
    }

    fn resume(&self) -> Result<(), PublisherError> {
        self.set_paused(false)
    }

    fn close(&self) {
        if let Some(link) = self.active.lock().take() {
            link.connection.shutdown();
            log::debug!("tcp link closed");
        }
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl Drop for TcpPublishLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Encode one frame record.
pub fn encode_frame(frame: &VideoFrame) -> Vec<u8> {
    let body_len = 8 + 4 + 4 + frame.data.len();
    let mut record = Vec::with_capacity(4 + body_len);
    record.extend_from_slice(&(body_len as u32).to_be_bytes());
    record.extend_from_slice(&frame.timestamp_us.to_be_bytes());
    record.extend_from_slice(&frame.width.to_be_bytes());
    record.extend_from_slice(&frame.height.to_be_bytes());
    record.extend_from_slice(&frame.data);
    record
}

fn encode_header(path: &str) -> Vec<u8> {
    let mut header = Vec::with_capacity(4 + path.len());
    header.extend_from_slice(&(path.len() as u32).to_be_bytes());
    header.extend_from_slice(path.as_bytes());
    header
}

fn connect(target: &LinkTarget, timeout: Duration) -> std::io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port).to_socket_addrs()?.collect();
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

fn connect_and_relay(
    connection: Arc<Connection>,
    target: LinkTarget,
    timeout: Duration,
    frames: Receiver<VideoFrame>,
) {
    let stream = connect(&target, timeout).and_then(|mut stream| {
        stream.set_nodelay(true)?;
        stream.write_all(&encode_header(&target.path))?;
        Ok(stream)
    });

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            if !connection.is_closed() {
                log::warn!("tcp link to {}:{} failed: {}", target.host, target.port, e);
                connection.listener.on_failed(&e.to_string());
            }
            return;
        }
    };

    let writer_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            if !connection.is_closed() {
                connection.listener.on_failed(&e.to_string());
            }
            return;
        }
    };
    *connection.stream.lock() = Some(stream);
    // close() may have run while connecting; it could not shut this stream down.
    if connection.is_closed() {
        connection.shutdown();
        return;
    }

    let conn = Arc::clone(&connection);
    let spawned = thread::Builder::new()
        .name(WRITER_THREAD.into())
        .spawn(move || relay_frames(conn, writer_stream, frames));
    if let Err(e) = spawned {
        log::error!("failed to spawn {} thread: {}", WRITER_THREAD, e);
        connection.shutdown();
        connection.listener.on_failed(&e.to_string());
        return;
    }

    log::info!("tcp link connected to {}:{}{}", target.host, target.port, target.path);
    connection.connected.store(true, Ordering::SeqCst);
    connection.listener.on_opened();
}

fn relay_frames(connection: Arc<Connection>, stream: TcpStream, frames: Receiver<VideoFrame>) {
    let mut writer = BufWriter::new(stream);
    // Ends when the link is closed and its sender dropped.
    for frame in frames.iter() {
        let result = writer
            .write_all(&encode_frame(&frame))
            .and_then(|_| if frames.is_empty() { writer.flush() } else { Ok(()) });
        if let Err(e) = result {
            if !connection.is_closed() {
                log::warn!("tcp link write failed: {}", e);
                connection.connected.store(false, Ordering::SeqCst);
                connection.listener.on_closed(&e.to_string());
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;

    use rtmp_publisher_core::{CameraFacing, CaptureConfiguration, PublisherSettings};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum LinkEvent {
        Opened,
        Failed,
        Closed,
    }

    struct Events(Sender<LinkEvent>);

    impl LinkListener for Events {
        fn on_opened(&self) {
            let _ = self.0.send(LinkEvent::Opened);
        }

        fn on_failed(&self, _reason: &str) {
            let _ = self.0.send(LinkEvent::Failed);
        }

        fn on_closed(&self, _reason: &str) {
            let _ = self.0.send(LinkEvent::Closed);
        }
    }

    fn events() -> (Arc<Events>, Receiver<LinkEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Events(tx)), rx)
    }

    fn params() -> StreamParameters {
        CaptureConfiguration::new(4, 2, 30, CameraFacing::Back)
            .stream_parameters(&PublisherSettings::default())
    }

    fn frame(ts: u64) -> VideoFrame {
        VideoFrame::new(4, 2, ts, vec![7; 8])
    }

    fn read_u32(stream: &mut TcpStream) -> u32 {
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        u32::from_be_bytes(buf)
    }

    #[test]
    fn parses_rtmp_targets() {
        let target = LinkTarget::parse("rtmp://media.example.com/live/s1").unwrap();
        assert_eq!(
            target,
            LinkTarget {
                host: "media.example.com".into(),
                port: DEFAULT_RTMP_PORT,
                path: "/live/s1".into(),
            }
        );
        assert_eq!(LinkTarget::parse("rtmp://127.0.0.1:1936/a/b").unwrap().port, 1936);
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        for url in ["http://host/app", "not a url", "rtmp:///app"] {
            assert!(
                matches!(LinkTarget::parse(url), Err(VirtualBackendError::InvalidUrl { .. })),
                "{url}"
            );
        }
    }

    #[test]
    fn record_layout() {
        let record = encode_frame(&frame(0x0102));
        assert_eq!(&record[..4], &24u32.to_be_bytes());
        assert_eq!(&record[4..12], &0x0102u64.to_be_bytes());
        assert_eq!(&record[12..16], &4u32.to_be_bytes());
        assert_eq!(&record[16..20], &2u32.to_be_bytes());
        assert_eq!(&record[20..], &[7; 8]);
    }

    #[test]
    fn opens_and_relays_frames() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();
        let link = TcpPublishLink::default();
        let (listener, rx) = events();

        link.open(&format!("rtmp://127.0.0.1:{port}/live/s1"), &params(), listener)
            .unwrap();
        let (mut peer, _) = server.accept().unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), LinkEvent::Opened);

        let path_len = read_u32(&mut peer) as usize;
        let mut path = vec![0u8; path_len];
        peer.read_exact(&mut path).unwrap();
        assert_eq!(path, b"/live/s1");

        link.send_frame(&frame(42));
        let len = read_u32(&mut peer) as usize;
        let mut body = vec![0u8; len];
        peer.read_exact(&mut body).unwrap();
        assert_eq!(&body[..8], &42u64.to_be_bytes());
        assert_eq!(&body[16..], &[7; 8]);

        link.close();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn refused_connection_reports_failure() {
        let port = {
            let server = TcpListener::bind("127.0.0.1:0").unwrap();
            server.local_addr().unwrap().port()
        };
        let link = TcpPublishLink::default();
        let (listener, rx) = events();

        link.open(&format!("rtmp://127.0.0.1:{port}/a/b"), &params(), listener)
            .unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), LinkEvent::Failed);
    }

    #[test]
    fn invalid_url_is_rejected_synchronously() {
        let link = TcpPublishLink::default();
        let (listener, rx) = events();
        let result = link.open("ftp://host/a", &params(), listener);

        assert!(matches!(result, Err(PublisherError::InvalidArgument(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn second_open_without_close_is_rejected() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("rtmp://{}/a/b", server.local_addr().unwrap());
        let link = TcpPublishLink::default();
        let (listener, _rx) = events();

        link.open(&url, &params(), listener.clone()).unwrap();
        assert!(link.open(&url, &params(), listener).is_err());
    }

    #[test]
    fn pause_requires_open_link_and_drops_frames() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("rtmp://{}/a/b", server.local_addr().unwrap());
        let link = TcpPublishLink::default();
        assert!(link.pause().is_err());

        let (listener, rx) = events();
        link.open(&url, &params(), listener).unwrap();
        let (mut peer, _) = server.accept().unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), LinkEvent::Opened);
        let header_len = read_u32(&mut peer) as usize;
        let mut header = vec![0u8; header_len];
        peer.read_exact(&mut header).unwrap();

        link.pause().unwrap();
        link.send_frame(&frame(1));
        link.resume().unwrap();
        link.send_frame(&frame(2));

        let len = read_u32(&mut peer) as usize;
        let mut body = vec![0u8; len];
        peer.read_exact(&mut body).unwrap();
        assert_eq!(&body[..8], &2u64.to_be_bytes());
    }

    #[test]
    fn remote_close_is_reported_on_write() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("rtmp://{}/a/b", server.local_addr().unwrap());
        let link = TcpPublishLink::default();
        let (listener, rx) = events();

        link.open(&url, &params(), listener).unwrap();
        let (peer, _) = server.accept().unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), LinkEvent::Opened);
        drop(peer);

        let deadline = std::time::Instant::now() + WAIT;
        loop {
            link.send_frame(&frame(0));
            match rx.recv_timeout(Duration::from_millis(20)) {
                Ok(event) => {
                    assert_eq!(event, LinkEvent::Closed);
                    break;
                }
                Err(_) => assert!(std::time::Instant::now() < deadline, "no close reported"),
            }
        }
    }
}
