//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// 전송 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("프레임이 너무 짧음: {len} bytes (150 bytes 초과 필요)")]
    FrameTooShort { len: usize },

    #[error("유효하지 않은 헤더 필드 {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("청크 인덱스 범위 초과: index={index}, chunk_count={chunk_count}")]
    IndexOutOfRange { index: u64, chunk_count: u64 },

    #[error("다른 전송의 프레임: {0}")]
    TransferMismatch(String),

    /// 로컬 송신 버퍼 고갈 등, 재시도를 모두 소진한 경우
    #[error("송신 재시도 {attempts}회 실패: {source}")]
    SendExhausted {
        attempts: usize,
        #[source]
        source: std::io::Error,
    },

    /// 파일 열기/생성/stat 실패 (세션 중단)
    #[error("파일 열기 실패 {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("채널 에러")]
    ChannelClosed,
}

impl Error {
    /// 수신 경로에서 버리고 계속 진행해도 되는 에러인지
    pub fn is_malformed_packet(&self) -> bool {
        matches!(
            self,
            Error::FrameTooShort { .. }
                | Error::InvalidField { .. }
                | Error::IndexOutOfRange { .. }
                | Error::TransferMismatch(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_classification() {
        assert!(Error::FrameTooShort { len: 3 }.is_malformed_packet());
        assert!(Error::InvalidField {
            field: "index",
            value: "x".into()
        }
        .is_malformed_packet());
        assert!(!Error::InvalidConfig("port".into()).is_malformed_packet());
        assert!(!Error::Io(std::io::Error::other("boom")).is_malformed_packet());
    }
}
