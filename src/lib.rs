//! # transfer
//!
//! UDP 기반 NACK 파일 전송 + LAN 피어 탐색
//!
//! ## 핵심 특징
//! - **청크 단위 전송**: 고정 폭 ASCII 헤더 + payload, 파일 오프셋에 바로 기록
//! - **NACK 기반 복구**: 수신자가 누락 청크만 요청, 완료 시 done
//! - **동시 추적**: 미수신/재전송 대상 인덱스를 스레드 안전한 집합으로 관리
//! - **브로드캐스트 탐색**: 주소 설정 없이 같은 서브넷의 수신자 발견
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use transfer::{Config, Sender};
//!
//! # async fn run() -> transfer::Result<()> {
//! let peer: SocketAddr = "192.168.0.10:3000".parse().unwrap();
//! let report = Sender::new(Config::default(), peer).send_file("movie.mkv").await?;
//! println!("{:.1}s", report.elapsed.as_secs_f64());
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod config;
pub mod discovery;
pub mod error;
pub mod message;
pub mod pending;
pub mod progress;
pub mod receiver;
pub mod sender;
pub mod stats;

pub use chunk::{ChunkPlan, ChunkReader, ChunkWriter, DataFrame};
pub use config::Config;
pub use discovery::{discover_peer, resolve_peer, Broadcaster};
pub use error::{Error, Result};
pub use message::ControlFrame;
pub use pending::PendingSet;
pub use progress::{progress_channel, ProgressSink};
pub use receiver::{BoundReceiver, ReceiveReport, Receiver};
pub use sender::{SendReport, Sender};
pub use stats::{StatsSnapshot, TransferStats};

/// 데이터 프레임 헤더 길이 (바이트)
pub const HEADER_LEN: usize = 150;

/// 컨트롤 프레임 길이 (바이트)
pub const CONTROL_LEN: usize = 14;

/// UDP 최대 payload
pub const MAX_DATAGRAM: usize = 65507;

/// 기본 전송 포트
pub const DEFAULT_PORT: u16 = 3000;

/// 탐색용 브로드캐스트 포트
pub const DISCOVERY_PORT: u16 = 9981;
