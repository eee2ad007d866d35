//! 진행 상황 알림 채널
//!
//! UI/로그 계층으로 나가는 단방향 문자열 스트림. 코어는 읽지 않는다.

use crossbeam_channel::{Receiver, Sender};
use tracing::info;

/// 진행 메시지 송신 측
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<Sender<String>>,
}

/// 연결된 (sink, receiver) 쌍 생성
pub fn progress_channel() -> (ProgressSink, Receiver<String>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ProgressSink { tx: Some(tx) }, rx)
}

impl ProgressSink {
    /// 메시지를 버리는 sink
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// 진행 메시지 전달. 절대 블록하지 않으며 수신 측이 닫혀도 무시.
    pub fn emit(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        if let Some(tx) = &self.tx {
            let _ = tx.send(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit() {
        let (sink, rx) = progress_channel();
        sink.emit("sending chunk size 60000");
        sink.clone().emit(format!("file length {}", 5));
        drop(sink);

        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(lines, vec!["sending chunk size 60000", "file length 5"]);
    }

    #[test]
    fn test_disconnected_receiver() {
        let (sink, rx) = progress_channel();
        drop(rx);
        sink.emit("ignored");
        ProgressSink::disabled().emit("ignored");
    }
}
