//! 컨트롤 메시지 정의
//!
//! NACK 기반 프로토콜이므로 수신자 → 송신자 방향 메시지는 두 가지뿐
//!
//! ```text
//! "miss" + 인덱스 (10 bytes, 오른쪽 정렬)   누락 청크 재전송 요청
//! "done" + "         0"                      전송 완료
//! ```

use crate::chunk::pad_left;
use crate::CONTROL_LEN;

const MISS_PREFIX: &[u8] = b"miss";
const DONE_PREFIX: &[u8] = b"done";
const INDEX_WIDTH: usize = 10;

/// 컨트롤 프레임
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// 누락 청크 재전송 요청
    Missing(u64),

    /// 수신 완료
    Done,
}

impl ControlFrame {
    /// 바이트로 직렬화 (인덱스가 10자리 이하면 정확히 14 bytes)
    pub fn to_bytes(&self) -> Vec<u8> {
        let (prefix, index) = match self {
            ControlFrame::Missing(index) => (MISS_PREFIX, *index),
            ControlFrame::Done => (DONE_PREFIX, 0),
        };

        let mut buf = Vec::with_capacity(CONTROL_LEN);
        buf.extend_from_slice(prefix);
        buf.extend_from_slice(pad_left(&index.to_string(), INDEX_WIDTH).as_bytes());
        buf
    }

    /// 바이트에서 역직렬화. 컨트롤 프레임이 아니면 None
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(MISS_PREFIX) {
            let digits = std::str::from_utf8(&bytes[MISS_PREFIX.len()..]).ok()?;
            digits.trim().parse::<u64>().ok().map(ControlFrame::Missing)
        } else if bytes.starts_with(DONE_PREFIX) {
            Some(ControlFrame::Done)
        } else {
            None
        }
    }

    /// 누락 인덱스 (Done 이면 None)
    pub fn missing_index(&self) -> Option<u64> {
        match self {
            ControlFrame::Missing(index) => Some(*index),
            ControlFrame::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(ControlFrame::Missing(12).to_bytes(), b"miss        12");
        assert_eq!(ControlFrame::Done.to_bytes(), b"done         0");
        assert_eq!(ControlFrame::Missing(0).to_bytes().len(), CONTROL_LEN);
        assert_eq!(
            ControlFrame::Missing(9_999_999_999).to_bytes().len(),
            CONTROL_LEN
        );
    }

    #[test]
    fn test_control_roundtrip() {
        for index in [0u64, 1, 3, 7, 1089, 9_999_999_999] {
            let bytes = ControlFrame::Missing(index).to_bytes();
            assert_eq!(ControlFrame::from_bytes(&bytes), Some(ControlFrame::Missing(index)));
        }
        let done = ControlFrame::from_bytes(&ControlFrame::Done.to_bytes());
        assert_eq!(done, Some(ControlFrame::Done));
        assert_eq!(done.and_then(|frame| frame.missing_index()), None);
    }

    #[test]
    fn test_not_control() {
        assert_eq!(ControlFrame::from_bytes(b"missabcdefghij"), None);
        assert_eq!(ControlFrame::from_bytes(b"miss          "), None);
        assert_eq!(ControlFrame::from_bytes(b"hello"), None);
        assert_eq!(ControlFrame::from_bytes(b""), None);
        // 숫자 부분은 무시
        assert_eq!(ControlFrame::from_bytes(b"donexxxxxxxxxx"), Some(ControlFrame::Done));
    }
}
