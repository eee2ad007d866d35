//! 프로토콜 설정

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result, DEFAULT_PORT, DISCOVERY_PORT};

/// 송신 버퍼가 작은 플랫폼(macOS 기본 9216)용 청크 크기
pub const SMALL_CHUNK_SIZE: usize = 9000;

/// 그 외 플랫폼 기본 청크 크기
pub const LARGE_CHUNK_SIZE: usize = 60000;

/// 기본 최대 청크 수 (60000 bytes 청크로 약 1 TB)
pub const DEFAULT_MAX_CHUNK_COUNT: u64 = 1 << 24;

/// 전송 세션 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트, 데이터 프레임당 payload)
    pub chunk_size: usize,

    /// 전송 포트
    pub port: u16,

    /// 수신측 바인드 주소
    pub listen_addr: IpAddr,

    /// 수신 파일 저장 디렉터리
    pub output_dir: PathBuf,

    /// 로컬 송신 실패 시 재시도 횟수
    pub send_retries: usize,

    /// 송신 재시도 간격
    pub send_retry_delay: Duration,

    /// 0번 청크 전송 후 대기 (수신측 파일 준비 시간)
    pub first_chunk_pause: Duration,

    /// 재전송할 청크가 없을 때 대기
    pub repair_idle_wait: Duration,

    /// connection refused 이후 재연결 전 대기
    pub redial_delay: Duration,

    /// 수신 정체(quiet) 판정용 폴링 주기
    pub quiet_poll_interval: Duration,

    /// 수신 태스크가 완료 여부를 다시 확인하는 주기
    pub recv_poll_interval: Duration,

    /// 누락 요청 라운드 간격
    pub request_interval: Duration,

    /// done 프레임 반복 횟수
    pub done_repeats: usize,

    /// done 프레임 간격
    pub done_interval: Duration,

    /// 수신 헤더가 가질 수 있는 최대 청크 수 (미수신 집합 크기 상한)
    pub max_chunk_count: u64,

    /// 탐색용 브로드캐스트 포트
    pub discovery_port: u16,

    /// 브로드캐스트 주기
    pub broadcast_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size_for(std::env::consts::OS),
            port: DEFAULT_PORT,
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            output_dir: PathBuf::from("."),
            send_retries: 30,
            send_retry_delay: Duration::from_millis(500),
            first_chunk_pause: Duration::from_secs(1),
            repair_idle_wait: Duration::from_secs(3),
            redial_delay: Duration::from_secs(2),
            quiet_poll_interval: Duration::from_secs(5),
            recv_poll_interval: Duration::from_millis(200),
            request_interval: Duration::from_secs(1),
            done_repeats: 3,
            done_interval: Duration::from_secs(1),
            max_chunk_count: DEFAULT_MAX_CHUNK_COUNT,
            discovery_port: DISCOVERY_PORT,
            broadcast_interval: Duration::from_secs(3),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 운영체제별 기본 청크 크기
    ///
    /// 기본 UDP 송신 버퍼가 작은 macOS는 9000, 나머지는 60000.
    /// `os`는 `std::env::consts::OS` 형식의 이름.
    pub fn default_chunk_size_for(os: &str) -> usize {
        match os {
            "macos" | "ios" => SMALL_CHUNK_SIZE,
            _ => LARGE_CHUNK_SIZE,
        }
    }

    /// 같은 호스트 간 전송 / 테스트용 설정 (짧은 타이머)
    pub fn loopback() -> Self {
        Self {
            chunk_size: 1024,
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            send_retries: 5,
            send_retry_delay: Duration::from_millis(10),
            first_chunk_pause: Duration::from_millis(50),
            repair_idle_wait: Duration::from_millis(50),
            redial_delay: Duration::from_millis(100),
            quiet_poll_interval: Duration::from_millis(200),
            recv_poll_interval: Duration::from_millis(20),
            request_interval: Duration::from_millis(100),
            done_interval: Duration::from_millis(50),
            broadcast_interval: Duration::from_millis(100),
            ..Self::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// 세션 시작 전 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        if self.chunk_size + crate::HEADER_LEN > crate::MAX_DATAGRAM {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {}는 UDP 최대 크기를 넘음",
                self.chunk_size
            )));
        }
        if self.send_retries == 0 {
            return Err(Error::InvalidConfig("send_retries는 1 이상이어야 함".into()));
        }
        if self.max_chunk_count == 0 {
            return Err(Error::InvalidConfig("max_chunk_count는 1 이상이어야 함".into()));
        }
        if self.done_repeats == 0 {
            return Err(Error::InvalidConfig("done_repeats는 1 이상이어야 함".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_chunk_size() {
        assert_eq!(Config::default_chunk_size_for("macos"), 9000);
        assert_eq!(Config::default_chunk_size_for("linux"), 60000);
        assert_eq!(Config::default_chunk_size_for("windows"), 60000);
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::loopback().validate().is_ok());
        assert!(Config::default().with_chunk_size(0).validate().is_err());
        assert!(Config::default().with_chunk_size(65_500).validate().is_err());

        let mut config = Config::default();
        config.done_repeats = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_chunk_count = 0;
        assert!(config.validate().is_err());
    }
}
