//! 수신자
//!
//! - 첫 프레임 헤더로 전송 전체(파일 이름, 길이, 청크 수)를 결정
//! - 청크를 오프셋 위치에 바로 기록, 미수신 인덱스는 PendingSet 으로 추적
//! - 수신이 잠잠해지면 miss 요청을 반복, 모두 받으면 done 3회 전송
//!
//! 상태: Listening → HeaderWait → Receiving → Quiescing → Requesting → Finishing

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chunk::{file_checksum, ChunkPlan, ChunkWriter, DataFrame};
use crate::message::ControlFrame;
use crate::pending::PendingSet;
use crate::progress::ProgressSink;
use crate::stats::{StatsSnapshot, TransferStats};
use crate::{Config, Error, Result, MAX_DATAGRAM};

/// 수신 큐 크기
const FRAME_QUEUE: usize = 1024;

/// 수신 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Listening,
    HeaderWait,
    Receiving,
    Quiescing,
    Requesting,
    Finishing,
}

/// 수신 결과
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// 기록한 파일 경로
    pub path: PathBuf,
    pub plan: ChunkPlan,
    /// 송신자 주소
    pub peer: SocketAddr,
    pub elapsed: Duration,
    /// 출력 파일 CRC32
    pub checksum: u32,
    pub stats: StatsSnapshot,
}

/// 수신 세션 (바인드 전)
pub struct Receiver {
    config: Config,
    progress: ProgressSink,
}

impl Receiver {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            progress: ProgressSink::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// 설정된 주소/포트에 바인드
    pub async fn bind(self) -> Result<BoundReceiver> {
        self.config.validate()?;
        debug!("수신 상태 → {:?}", ReceiverState::Listening);

        let addr = SocketAddr::new(self.config.listen_addr, self.config.port);
        let socket = UdpSocket::bind(addr).await?;
        self.progress
            .emit(format!("server listening {}", socket.local_addr()?));

        Ok(BoundReceiver {
            config: self.config,
            progress: self.progress,
            socket: Arc::new(socket),
            stats: Arc::new(TransferStats::new()),
            begin: Instant::now(),
        })
    }

    /// 바인드 후 파일 하나 수신
    pub async fn receive(self) -> Result<ReceiveReport> {
        self.bind().await?.receive().await
    }
}

/// 바인드된 수신 세션
pub struct BoundReceiver {
    config: Config,
    progress: ProgressSink,
    socket: Arc<UdpSocket>,
    stats: Arc<TransferStats>,
    begin: Instant,
}

impl BoundReceiver {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 실시간 통계
    pub fn stats(&self) -> Arc<TransferStats> {
        self.stats.clone()
    }

    fn enter(&self, state: ReceiverState) {
        debug!("수신 상태 → {:?}", state);
    }

    /// 파일 하나를 끝까지 수신
    pub async fn receive(self) -> Result<ReceiveReport> {
        self.enter(ReceiverState::HeaderWait);
        let (first, plan, peer) = self.wait_header().await?;
        self.progress
            .emit(format!("start to receive data from {}", peer));

        let path = self.config.output_dir.join(&plan.filename);
        let writer = Arc::new(ChunkWriter::create(&path, plan.clone())?);
        info!(
            "수신 시작: {} ({} bytes, {} chunks x {})",
            path.display(),
            plan.total_length,
            plan.chunk_count,
            plan.chunk_size
        );

        self.enter(ReceiverState::Receiving);
        let pending = Arc::new(PendingSet::with_range(plan.chunk_count));

        // 첫 프레임도 같은 기록 경로로 보냄. 파일 I/O 는 blocking 스레드에서만 수행.
        let (frame_tx, frame_rx) = mpsc::channel::<DataFrame>(FRAME_QUEUE);
        frame_tx
            .send(first)
            .await
            .map_err(|_| Error::ChannelClosed)?;

        let write_task = {
            let writer = writer.clone();
            let pending = pending.clone();
            let stats = self.stats.clone();
            tokio::task::spawn_blocking(move || write_frames(frame_rx, &writer, &pending, &stats))
        };
        let read_task = tokio::spawn(read_frames(
            self.socket.clone(),
            plan.clone(),
            pending.clone(),
            self.stats.clone(),
            frame_tx,
            self.config.recv_poll_interval,
        ));

        self.enter(ReceiverState::Quiescing);
        self.wait_quiet(&pending).await;

        self.enter(ReceiverState::Requesting);
        self.request_missing(&pending, peer).await;
        self.progress.emit("done with checking");

        self.enter(ReceiverState::Finishing);
        read_task.await.map_err(|_| Error::ChannelClosed)?;
        write_task.await.map_err(|_| Error::ChannelClosed)?;

        writer.sync()?;
        let checksum = file_checksum(writer.path())?;
        debug!("crc32 {:08x}", checksum);

        self.progress
            .emit(format!("wrote to file {}", writer.path().display()));

        Ok(ReceiveReport {
            path,
            plan,
            peer,
            elapsed: self.begin.elapsed(),
            checksum,
            stats: self.stats.snapshot(),
        })
    }

    /// 유효한 첫 데이터 프레임 대기. 잘못된 패킷은 버리고 계속 기다림.
    async fn wait_header(&self) -> Result<(DataFrame, ChunkPlan, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    tokio::time::sleep(self.config.recv_poll_interval).await;
                    continue;
                }
            };

            let header = DataFrame::from_bytes(&buf[..len]).and_then(|frame| {
                let plan = ChunkPlan::from_frame(&frame)?;
                check_filename(&plan.filename)?;
                if plan.chunk_count > self.config.max_chunk_count {
                    return Err(Error::InvalidField {
                        field: "chunk_count",
                        value: plan.chunk_count.to_string(),
                    });
                }
                Ok((frame, plan))
            });

            match header {
                Ok((frame, plan)) => return Ok((frame.with_sender(addr), plan, addr)),
                Err(e) => {
                    debug!("헤더 아님, 버림 ({}): {}", addr, e);
                    TransferStats::incr(&self.stats.malformed_dropped);
                }
            }
        }
    }

    /// 남은 청크 수가 두 번 연속 같으면(수신 정체) 반환
    async fn wait_quiet(&self, pending: &PendingSet) {
        let mut ticker = tokio::time::interval(self.config.quiet_poll_interval);
        let mut last = None;

        loop {
            ticker.tick().await;
            let remaining = pending.len();
            if remaining == 0 {
                return;
            }
            if last == Some(remaining) {
                info!("수신 정체, 누락 요청 시작: {} chunks 남음", remaining);
                return;
            }
            last = Some(remaining);
        }
    }

    async fn request_missing(&self, pending: &PendingSet, peer: SocketAddr) {
        while !pending.is_empty() {
            let missing = pending.keys();
            debug!("누락 요청: {} chunks", missing.len());

            for index in missing {
                let request = ControlFrame::Missing(index).to_bytes();
                match self.socket.send_to(&request, peer).await {
                    Ok(_) => TransferStats::incr(&self.stats.missing_requested),
                    Err(e) => warn!("누락 요청 전송 실패: {}", e),
                }
            }
            tokio::time::sleep(self.config.request_interval).await;
        }

        let done = ControlFrame::Done.to_bytes();
        for _ in 0..self.config.done_repeats {
            if let Err(e) = self.socket.send_to(&done, peer).await {
                warn!("done 전송 실패: {}", e);
            }
            tokio::time::sleep(self.config.done_interval).await;
        }
    }
}

/// 헤더의 파일 이름은 경로 요소 없는 basename 이어야 함
fn check_filename(filename: &str) -> Result<()> {
    let name = Path::new(filename);
    let is_basename = !filename.is_empty()
        && name.file_name().map(|base| base == name.as_os_str()).unwrap_or(false);
    if is_basename {
        Ok(())
    } else {
        Err(Error::InvalidField {
            field: "filename",
            value: filename.to_string(),
        })
    }
}

/// 프레임 기록 후 PendingSet 에서 제거. 기록에 실패하면 인덱스가 남아 다시 요청됨.
fn store_frame(writer: &ChunkWriter, pending: &PendingSet, stats: &TransferStats, frame: &DataFrame) {
    match writer.write_chunk(frame.index, &frame.payload) {
        Ok(()) => {
            TransferStats::incr(&stats.frames_received);
            if !pending.remove(frame.index) {
                TransferStats::incr(&stats.duplicates);
            }
        }
        Err(e) => {
            warn!("청크 {} 기록 실패: {}", frame.index, e);
            TransferStats::incr(&stats.io_failures);
        }
    }
}

/// 소켓 → 기록 큐. PendingSet 이 빌 때까지 실행.
async fn read_frames(
    socket: Arc<UdpSocket>,
    plan: ChunkPlan,
    pending: Arc<PendingSet>,
    stats: Arc<TransferStats>,
    frame_tx: mpsc::Sender<DataFrame>,
    poll_interval: Duration,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !pending.is_empty() {
        let received = tokio::time::timeout(poll_interval, socket.recv_from(&mut buf)).await;
        match received {
            Ok(Ok((len, addr))) => {
                let frame = DataFrame::from_bytes(&buf[..len])
                    .and_then(|frame| frame.validate_against(&plan).map(|_| frame));
                match frame {
                    Ok(frame) => {
                        if frame_tx.send(frame.with_sender(addr)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) if e.is_malformed_packet() => {
                        debug!("잘못된 패킷 버림 ({}): {}", addr, e);
                        TransferStats::incr(&stats.malformed_dropped);
                    }
                    Err(e) => warn!("프레임 처리 실패 ({}): {}", addr, e),
                }
            }
            Ok(Err(e)) => {
                warn!("수신 에러: {}", e);
                tokio::time::sleep(poll_interval).await;
            }
            Err(_) => {
                // 타임아웃, 완료 여부 재확인
            }
        }
    }
}

/// 기록 큐 → 파일. blocking 스레드에서 실행, 송신측이 모두 닫히면 종료.
fn write_frames(
    mut frame_rx: mpsc::Receiver<DataFrame>,
    writer: &ChunkWriter,
    pending: &PendingSet,
    stats: &TransferStats,
) {
    while let Some(frame) = frame_rx.blocking_recv() {
        store_frame(writer, pending, stats, &frame);
    }
}
