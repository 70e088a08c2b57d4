//! Core functionality for actual scanning behaviour.
//!
//! A scan hands every port of a [`PortStrategy`] to a fixed pool of worker
//! tasks. Workers claim ports through a shared cursor, probe them with
//! [`probe`] and send one [`ProbeResult`] per port back over a channel, so
//! results arrive in completion order.
use crate::error::ScanError;
use crate::port_strategy::PortStrategy;
use indicatif::ProgressBar;
use log::debug;

use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{self, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    time,
};

/// Outcome of probing one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeResult {
    /// The probed port.
    pub port: u16,
    /// Whether the port accepted a TCP connection.
    pub reachable: bool,
}

/// Lifecycle of a [`Scanner`].
///
/// A scan aborted by a [`ScanError::Configuration`] stays `Running`; only a
/// scan in which every port produced a result reaches `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanState {
    /// Created, workers not started.
    Pending = 0,
    /// Workers are probing.
    Running = 1,
    /// Every port has a result.
    Completed = 2,
}

impl ScanState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            _ => Self::Completed,
        }
    }
}

/// Tries one TCP connection to `ip:port`.
///
/// Returns `Ok(true)` when the connection is accepted and `Ok(false)` for
/// every ordinary network failure: refusal, timeout, unreachable host or
/// network. The stream is shut down and dropped before returning.
///
/// Port 0 and running out of file descriptors are
/// [`ScanError::Configuration`], they mean the scan itself is set up wrong.
///
/// ```rust
/// # use lmv_modules::scanner::probe;
/// # use std::time::Duration;
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let open = rt
///     .block_on(probe("127.0.0.1".parse().unwrap(), 9, Duration::from_millis(100)))
///     .unwrap();
/// println!("discard port open: {open}");
/// ```
pub async fn probe(ip: IpAddr, port: u16, timeout: Duration) -> Result<bool, ScanError> {
    if port == 0 {
        return Err(ScanError::Configuration(format!(
            "Refusing to probe port 0 on {ip}"
        )));
    }

    let socket = SocketAddr::new(ip, port);
    match connect(socket, timeout).await {
        Ok(tcp_stream) => {
            debug!("Connection was successful, shutting down stream {socket}");
            if let Err(e) = { tcp_stream }.shutdown().await {
                debug!("Shutdown stream error {e}");
            }
            Ok(true)
        }
        Err(e) => {
            let error_string = e.to_string();
            if error_string.to_lowercase().contains("too many open files") {
                return Err(ScanError::Configuration(
                    "Too many open files. Please reduce the number of threads or raise the ulimit."
                        .to_owned(),
                ));
            }
            debug!("{socket} is closed: {error_string}");
            Ok(false)
        }
    }
}

/// Performs the connection to the socket with timeout
async fn connect(socket: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    time::timeout(timeout, async move { TcpStream::connect(socket).await }).await?
}

/// Bounded concurrent TCP connect scanner for a single address.
pub struct Scanner {
    ip: IpAddr,
    port_strategy: PortStrategy,
    concurrency: usize,
    timeout: Duration,
    progress: Option<ProgressBar>,
    state: AtomicU8,
}

impl Scanner {
    /// A scanner probing `port_strategy` on `ip` with `concurrency` workers.
    /// A concurrency of zero is treated as one.
    pub fn new(
        ip: IpAddr,
        port_strategy: PortStrategy,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            ip,
            port_strategy,
            concurrency: concurrency.max(1),
            timeout,
            progress: None,
            state: AtomicU8::new(ScanState::Pending as u8),
        }
    }

    /// Advances `progress` once per finished probe.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Where the scan is in its lifecycle.
    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of ports the scan covers.
    pub fn total(&self) -> usize {
        self.port_strategy.targets().len()
    }

    fn set_state(&self, state: ScanState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Probes every port exactly once and returns the results in
    /// completion order.
    ///
    /// The first configuration error stops the workers from claiming more
    /// ports and is returned instead of the results.
    pub async fn run(&self) -> Result<Vec<ProbeResult>, ScanError> {
        let order = self.port_strategy.order();
        let total = order.len();
        let workers = self.concurrency.min(total);

        debug!(
            "Start scanning {}.\nWorkers {}\nTimeout {:?}\nNumber of ports {}",
            self.ip, workers, self.timeout, total
        );
        self.set_state(ScanState::Running);

        let cursor = Arc::new(AtomicUsize::new(0));
        let abort = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel(workers.max(1));

        let handles = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    ip: self.ip,
                    timeout: self.timeout,
                    order: Arc::clone(&order),
                    cursor: Arc::clone(&cursor),
                    abort: Arc::clone(&abort),
                    tx: tx.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();
        drop(tx);

        let cadence = (total / 10).max(1);
        let mut results = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    abort.store(true, Ordering::Release);
                    debug!("Aborting scan of {}: {err}", self.ip);
                    return Err(err);
                }
            };

            results.push(result);
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            let completed = results.len();
            if completed % cadence == 0 || completed == total {
                debug!("Progress: {completed}/{total} ports scanned");
            }
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                return Err(ScanError::Configuration(format!("Scan worker failed: {e}")));
            }
        }

        if results.len() != total {
            return Err(ScanError::Configuration(format!(
                "Scan finished with {} results for {total} ports",
                results.len()
            )));
        }

        debug!(
            "Open ports found: {:?}",
            results
                .iter()
                .filter(|r| r.reachable)
                .map(|r| r.port)
                .collect::<Vec<_>>()
        );
        self.set_state(ScanState::Completed);
        Ok(results)
    }
}

struct Worker {
    id: usize,
    ip: IpAddr,
    timeout: Duration,
    order: Arc<[u16]>,
    cursor: Arc<AtomicUsize>,
    abort: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<ProbeResult, ScanError>>,
}

impl Worker {
    async fn run(self) {
        let mut probed = 0_usize;
        while !self.abort.load(Ordering::Acquire) {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            let Some(&port) = self.order.get(index) else {
                break;
            };

            let outcome = probe(self.ip, port, self.timeout)
                .await
                .map(|reachable| ProbeResult { port, reachable });
            if outcome.is_err() {
                self.abort.store(true, Ordering::Release);
            }
            probed += 1;

            // The receiver is gone once the scan has been aborted.
            if self.tx.send(outcome).await.is_err() {
                break;
            }
        }
        debug!("Worker {} finished after {probed} probes", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScanOrder;
    use crate::port_strategy::TargetSet;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;
    use std::time::Instant;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn closed_port() -> u16 {
        let (listener, port) = listener().await;
        drop(listener);
        port
    }

    fn scanner(targets: Vec<u16>, concurrency: usize, order: ScanOrder) -> Scanner {
        let strategy = PortStrategy::pick(TargetSet::new(targets), order);
        Scanner::new(LOCALHOST, strategy, concurrency, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn probe_open_port() {
        let (_listener, port) = listener().await;
        assert_eq!(probe(LOCALHOST, port, Duration::from_secs(1)).await, Ok(true));
    }

    #[tokio::test]
    async fn probe_closed_port() {
        let port = closed_port().await;
        assert_eq!(probe(LOCALHOST, port, Duration::from_secs(1)).await, Ok(false));
    }

    #[tokio::test]
    async fn probe_port_zero_is_a_configuration_error() {
        let err = probe(LOCALHOST, 0, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
    }

    #[tokio::test]
    async fn probe_respects_timeout() {
        // Non-routable on most networks; some sandboxes accept every connect,
        // so only the time bound is checked.
        let blackhole = IpAddr::V4(Ipv4Addr::new(10, 255, 255, 1));
        let timeout = Duration::from_millis(300);
        let started = Instant::now();

        let result = probe(blackhole, 81, timeout).await;

        assert!(result.is_ok());
        assert!(started.elapsed() < timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn scanner_runs() {
        // Makes sure the program still runs and doesn't panic
        let scanner = scanner((1..=1000).collect(), 10, ScanOrder::Random);
        let results = scanner.run().await.unwrap();
        assert_eq!(results.len(), 1000);
    }

    #[tokio::test]
    async fn every_target_probed_exactly_once() {
        let (_listener, open) = listener().await;
        let mut targets = vec![open];
        for _ in 0..5 {
            targets.push(closed_port().await);
        }
        let expected: HashSet<u16> = targets.iter().copied().collect();

        for concurrency in [1, 3, 5, 64] {
            let results = scanner(targets.clone(), concurrency, ScanOrder::Serial)
                .run()
                .await
                .unwrap();
            let ports: HashSet<u16> = results.iter().map(|r| r.port).collect();

            assert_eq!(results.len(), expected.len());
            assert_eq!(ports, expected);
            assert!(results.contains(&ProbeResult {
                port: open,
                reachable: true
            }));
        }
    }

    #[tokio::test]
    async fn state_moves_from_pending_to_completed() {
        let scanner = scanner(vec![closed_port().await], 5, ScanOrder::Serial);
        assert_eq!(scanner.state(), ScanState::Pending);
        assert_eq!(scanner.total(), 1);

        scanner.run().await.unwrap();

        assert_eq!(scanner.state(), ScanState::Completed);
    }

    #[tokio::test]
    async fn empty_target_set_completes_immediately() {
        let scanner = scanner(Vec::new(), 5, ScanOrder::Serial);
        assert_eq!(scanner.run().await, Ok(Vec::new()));
        assert_eq!(scanner.state(), ScanState::Completed);
    }

    #[tokio::test]
    async fn configuration_error_aborts_the_scan() {
        let scanner = scanner(vec![0, 1, 2, 3], 2, ScanOrder::Serial);
        let err = scanner.run().await.unwrap_err();

        assert!(matches!(err, ScanError::Configuration(_)));
        assert_ne!(scanner.state(), ScanState::Completed);
    }

    #[tokio::test]
    async fn progress_bar_counts_every_probe() {
        let (_listener, open) = listener().await;
        let progress = ProgressBar::hidden();
        let scanner = scanner(vec![open, closed_port().await], 2, ScanOrder::Serial)
            .with_progress(progress.clone());

        scanner.run().await.unwrap();

        assert_eq!(progress.position(), 2);
    }
}
