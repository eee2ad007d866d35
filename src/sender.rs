//! 송신자
//!
//! - 전체 청크 순차 전송 (bulk send)
//! - 수신자의 miss 요청을 받아 가장 앞선 청크부터 재전송
//! - done 을 받으면 종료
//!
//! 상태: Init → Connecting → BulkSend → RepairWait → Done | Failed

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkPlan, ChunkReader};
use crate::message::ControlFrame;
use crate::pending::PendingSet;
use crate::progress::ProgressSink;
use crate::stats::{StatsSnapshot, TransferStats};
use crate::{Config, Error, Result, CONTROL_LEN};

/// 송신 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Init,
    Connecting,
    BulkSend,
    RepairWait,
    Done,
    Failed,
}

/// 송신 결과
#[derive(Debug, Clone)]
pub struct SendReport {
    pub plan: ChunkPlan,
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
}

/// 송신 세션
pub struct Sender {
    config: Config,
    peer: SocketAddr,
    progress: ProgressSink,
    stats: Arc<TransferStats>,
}

impl Sender {
    pub fn new(config: Config, peer: SocketAddr) -> Self {
        Self {
            config,
            peer,
            progress: ProgressSink::disabled(),
            stats: Arc::new(TransferStats::new()),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// 실시간 통계
    pub fn stats(&self) -> Arc<TransferStats> {
        self.stats.clone()
    }

    /// 파일 하나 전송. 수신자가 done 을 보낼 때까지 반환하지 않음.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<SendReport> {
        let begin = Instant::now();
        let result = self.run(path.as_ref(), begin).await;
        match &result {
            Ok(_) => self.enter(SenderState::Done),
            Err(e) => {
                self.enter(SenderState::Failed);
                warn!("송신 실패: {}", e);
            }
        }
        result
    }

    fn enter(&self, state: SenderState) {
        debug!("송신 상태 → {:?} (peer={})", state, self.peer);
    }

    async fn run(&self, path: &Path, begin: Instant) -> Result<SendReport> {
        self.config.validate()?;

        self.enter(SenderState::Init);
        let plan = ChunkPlan::for_file(path, self.config.chunk_size)?;
        let reader = Arc::new(ChunkReader::open(path, plan.clone())?);

        self.progress
            .emit(format!("sending chunk size {}", plan.chunk_size));
        self.progress.emit(format!("file length {}", plan.total_length));

        if plan.chunk_count == 0 {
            info!("빈 파일, 전송할 청크 없음: {}", plan.filename);
            return Ok(self.report(plan, begin));
        }

        self.enter(SenderState::Connecting);
        self.progress.emit(format!("connect to {}", self.peer));
        let socket = Arc::new(dial(self.peer).await?);

        self.enter(SenderState::BulkSend);
        self.progress.emit("start to send data");
        for index in 0..plan.chunk_count {
            self.send_chunk(&socket, &reader, index).await;

            if index == 0 {
                // 수신측이 출력 파일을 준비할 시간
                tokio::time::sleep(self.config.first_chunk_pause).await;
            }
        }
        self.progress
            .emit("all the data was sent, try to wait for the missing data");

        self.enter(SenderState::RepairWait);
        let pending = Arc::new(PendingSet::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let repair = RepairTask {
            socket: socket.clone(),
            reader: reader.clone(),
            pending: pending.clone(),
            stats: self.stats.clone(),
            progress: self.progress.clone(),
            idle_wait: self.config.repair_idle_wait,
            retries: self.config.send_retries,
            retry_delay: self.config.send_retry_delay,
        };
        let repair_handle = tokio::spawn(repair.run(stop_rx));

        let outcome = self.read_control(&socket, &reader, &pending).await;
        let _ = stop_tx.send(true);
        repair_handle.await.map_err(|_| Error::ChannelClosed)?;
        outcome?;

        let report = self.report(plan, begin);
        self.progress
            .emit(format!("sent over with {}", report.elapsed.as_secs_f64()));
        Ok(report)
    }

    /// 청크 하나 읽어서 전송. 실패는 기록만 하고 넘어감 (수신자가 다시 요청함)
    async fn send_chunk(&self, socket: &UdpSocket, reader: &ChunkReader, index: u64) {
        let frame = match reader.read_frame(index) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("청크 {} 읽기 실패: {}", index, e);
                TransferStats::incr(&self.stats.io_failures);
                return;
            }
        };

        let sent = send_with_retry(
            socket,
            &frame,
            self.config.send_retries,
            self.config.send_retry_delay,
        )
        .await;
        match sent {
            Ok(()) => TransferStats::incr(&self.stats.frames_sent),
            Err(e) => {
                warn!("청크 {} 전송 실패: {}", index, e);
                TransferStats::incr(&self.stats.send_failures);
            }
        }
    }

    /// done 을 받을 때까지 컨트롤 프레임 수신
    async fn read_control(
        &self,
        socket: &UdpSocket,
        reader: &ChunkReader,
        pending: &PendingSet,
    ) -> Result<()> {
        let chunk_count = reader.plan().chunk_count;
        let mut buf = [0u8; CONTROL_LEN];

        loop {
            match socket.recv(&mut buf).await {
                Ok(len) => {
                    let frame = if len == CONTROL_LEN {
                        ControlFrame::from_bytes(&buf[..len])
                    } else {
                        None
                    };

                    let Some(control) = frame else {
                        debug!("컨트롤 프레임 아님 ({} bytes)", len);
                        TransferStats::incr(&self.stats.malformed_dropped);
                        continue;
                    };
                    let Some(index) = control.missing_index() else {
                        info!("수신 완료 통지: {}", self.peer);
                        return Ok(());
                    };

                    if index < chunk_count {
                        TransferStats::incr(&self.stats.missing_received);
                        pending.insert(index);
                    } else {
                        warn!("범위 밖 누락 요청 무시: {} (chunk_count={})", index, chunk_count);
                        TransferStats::incr(&self.stats.malformed_dropped);
                    }
                }
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    // 수신자가 아직 listen 하지 않음: 재연결 후 0번 청크로 깨움
                    warn!("수신자 응답 없음 ({}), 재연결: {}", e, self.peer);
                    TransferStats::incr(&self.stats.redials);
                    tokio::time::sleep(self.config.redial_delay).await;
                    socket.connect(self.peer).await?;
                    self.send_chunk(socket, reader, 0).await;
                }
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    tokio::time::sleep(self.config.send_retry_delay).await;
                }
            }
        }
    }

    fn report(&self, plan: ChunkPlan, begin: Instant) -> SendReport {
        SendReport {
            plan,
            elapsed: begin.elapsed(),
            stats: self.stats.snapshot(),
        }
    }
}

/// 재전송 태스크
struct RepairTask {
    socket: Arc<UdpSocket>,
    reader: Arc<ChunkReader>,
    pending: Arc<PendingSet>,
    stats: Arc<TransferStats>,
    progress: ProgressSink,
    idle_wait: Duration,
    retries: usize,
    retry_delay: Duration,
}

impl RepairTask {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        self.progress.emit("checking");

        loop {
            let stopped = *stop_rx.borrow();
            if stopped {
                break;
            }

            let Some(index) = self.pending.drain_lowest() else {
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_wait) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            let frame = match self.reader.read_frame(index) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("재전송 청크 {} 읽기 실패: {}", index, e);
                    TransferStats::incr(&self.stats.io_failures);
                    continue;
                }
            };

            match send_with_retry(&self.socket, &frame, self.retries, self.retry_delay).await {
                Ok(()) => {
                    TransferStats::incr(&self.stats.frames_sent);
                    TransferStats::incr(&self.stats.retransmits);
                }
                Err(e) => {
                    warn!("재전송 실패: {}", e);
                    TransferStats::incr(&self.stats.send_failures);
                }
            }
        }

        debug!("재전송 태스크 종료");
    }
}

/// 로컬 소켓 생성 후 peer 로 connect (핸드쉐이크 없음)
pub async fn dial(peer: SocketAddr) -> Result<UdpSocket> {
    let local = match peer.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(peer).await?;
    Ok(socket)
}

/// 로컬 송신 재시도 (송신 버퍼 고갈 등). 네트워크 재전송이 아님.
pub async fn send_with_retry(
    socket: &UdpSocket,
    data: &[u8],
    retries: usize,
    delay: Duration,
) -> Result<()> {
    let mut last_error = None;
    for attempt in 1..=retries {
        match socket.send(data).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                debug!("송신 실패 {}/{}: {}", attempt, retries, e);
                last_error = Some(e);
                if attempt < retries {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(Error::SendExhausted {
        attempts: retries,
        source: last_error.unwrap_or_else(|| std::io::Error::other("재시도 횟수 0")),
    })
}
