//! 전송 통계
//!
//! 세션의 여러 태스크가 동시에 갱신하므로 원자 카운터로 유지

use std::sync::atomic::{AtomicU64, Ordering};

/// 세션 공유 카운터
#[derive(Debug, Default)]
pub struct TransferStats {
    /// 송신한 데이터 프레임 수 (재전송 포함)
    pub frames_sent: AtomicU64,

    /// 재전송한 프레임 수
    pub retransmits: AtomicU64,

    /// 재시도까지 실패한 송신 수
    pub send_failures: AtomicU64,

    /// 받은 누락 요청 수 (송신측)
    pub missing_received: AtomicU64,

    /// 보낸 누락 요청 수 (수신측)
    pub missing_requested: AtomicU64,

    /// 기록한 데이터 프레임 수
    pub frames_received: AtomicU64,

    /// 이미 기록된 청크의 중복 수신
    pub duplicates: AtomicU64,

    /// 버린 잘못된 패킷 수
    pub malformed_dropped: AtomicU64,

    /// 파일 읽기/쓰기 실패 수
    pub io_failures: AtomicU64,

    /// connection refused 로 인한 재연결 수
    pub redials: AtomicU64,
}

/// 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub retransmits: u64,
    pub send_failures: u64,
    pub missing_received: u64,
    pub missing_requested: u64,
    pub frames_received: u64,
    pub duplicates: u64,
    pub malformed_dropped: u64,
    pub io_failures: u64,
    pub redials: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            retransmits: self.retransmits.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            missing_received: self.missing_received.load(Ordering::Relaxed),
            missing_requested: self.missing_requested.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            io_failures: self.io_failures.load(Ordering::Relaxed),
            redials: self.redials.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = TransferStats::new();
        TransferStats::incr(&stats.frames_sent);
        TransferStats::incr(&stats.frames_sent);
        TransferStats::incr(&stats.duplicates);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.retransmits, 0);
    }
}
