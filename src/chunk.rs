//! 데이터 프레임과 청크 분할
//!
//! - DataFrame: 고정 폭 ASCII 헤더(150 bytes) + 청크 payload
//! - ChunkPlan: 파일 크기와 청크 크기로 청크 수/오프셋 계산
//!
//! ```text
//! [0..20]    전체 파일 길이 (오른쪽 정렬 10진수)
//! [20..120]  파일 이름 (공백 채움)
//! [120..130] 청크 크기
//! [130..140] 청크 수
//! [140..150] 청크 인덱스
//! [150..]    payload
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Error, Result, HEADER_LEN, MAX_DATAGRAM};

const LENGTH_WIDTH: usize = 20;
const FILENAME_WIDTH: usize = 100;
const NUMBER_WIDTH: usize = 10;

/// `width`보다 짧으면 왼쪽을 공백으로 채움.
///
/// 폭은 최소값일 뿐 잘라내지 않는다. 100자를 넘는 파일 이름이나 자릿수가
/// 넘치는 숫자는 뒤 필드를 밀어내 헤더가 깨진다.
pub(crate) fn pad_left(text: &str, width: usize) -> String {
    // 바이트 길이 기준 (UTF-8 이름도 헤더 폭은 바이트 단위)
    let mut out = " ".repeat(width.saturating_sub(text.len()));
    out.push_str(text);
    out
}

fn parse_field(raw: &[u8], field: &'static str) -> Result<u64> {
    let text = String::from_utf8_lossy(raw);
    text.trim().parse::<u64>().map_err(|_| Error::InvalidField {
        field,
        value: text.into_owned(),
    })
}

/// 데이터 프레임 (송신 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// 전체 파일 길이 (바이트)
    pub total_length: u64,

    /// 파일 이름 (basename)
    pub filename: String,

    /// 청크 크기
    pub chunk_size: u64,

    /// 전송 전체 청크 수
    pub chunk_count: u64,

    /// 이 청크의 인덱스
    pub index: u64,

    /// 청크 데이터
    pub payload: Bytes,

    /// 송신자 주소 (수신 시에만 채워짐, 전송되지 않음)
    pub sender: Option<SocketAddr>,
}

impl DataFrame {
    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = format!(
            "{}{}{}{}{}",
            pad_left(&self.total_length.to_string(), LENGTH_WIDTH),
            pad_left(&self.filename, FILENAME_WIDTH),
            pad_left(&self.chunk_size.to_string(), NUMBER_WIDTH),
            pad_left(&self.chunk_count.to_string(), NUMBER_WIDTH),
            pad_left(&self.index.to_string(), NUMBER_WIDTH),
        );

        let mut buf = Vec::with_capacity(header.len() + self.payload.len());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= HEADER_LEN {
            return Err(Error::FrameTooShort { len: bytes.len() });
        }

        let total_length = parse_field(&bytes[0..20], "total_length")?;
        let filename = String::from_utf8_lossy(&bytes[20..120]).trim().to_string();
        let chunk_size = parse_field(&bytes[120..130], "chunk_size")?;
        let chunk_count = parse_field(&bytes[130..140], "chunk_count")?;
        let index = parse_field(&bytes[140..150], "index")?;

        Ok(Self {
            total_length,
            filename,
            chunk_size,
            chunk_count,
            index,
            payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
            sender: None,
        })
    }

    /// 수신 주소 첨부
    pub fn with_sender(mut self, addr: SocketAddr) -> Self {
        self.sender = Some(addr);
        self
    }

    /// 진행 중인 전송의 프레임인지 확인
    pub fn validate_against(&self, plan: &ChunkPlan) -> Result<()> {
        if self.filename != plan.filename
            || self.total_length != plan.total_length
            || self.chunk_size != plan.chunk_size
            || self.chunk_count != plan.chunk_count
        {
            return Err(Error::TransferMismatch(format!(
                "{}({} bytes, {}x{})",
                self.filename, self.total_length, self.chunk_count, self.chunk_size
            )));
        }
        if self.index >= plan.chunk_count {
            return Err(Error::IndexOutOfRange {
                index: self.index,
                chunk_count: plan.chunk_count,
            });
        }
        plan.check_payload(self.index, self.payload.len())
    }
}

/// 청크 분할 계획 (전송 하나 동안 고정)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub filename: String,
    pub total_length: u64,
    pub chunk_size: u64,
    pub chunk_count: u64,
}

impl ChunkPlan {
    pub fn new(filename: impl Into<String>, total_length: u64, chunk_size: u64) -> Self {
        // 나눗셈 대신 누적: 빈 파일은 청크 0개
        let mut chunk_count = 0;
        let mut covered = 0u64;
        while covered < total_length && chunk_size > 0 {
            covered = covered.saturating_add(chunk_size).min(total_length);
            chunk_count += 1;
        }

        Self {
            filename: filename.into(),
            total_length,
            chunk_size,
            chunk_count,
        }
    }

    /// 파일 stat 으로 계획 생성
    pub fn for_file(path: &Path, chunk_size: usize) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(filename, metadata.len(), chunk_size as u64))
    }

    /// 첫 프레임 헤더에서 계획 복원 (수신측)
    ///
    /// 헤더 필드끼리 맞지 않으면 거부. 청크 수는 길이와 청크 크기로 정해지므로
    /// 다른 값을 믿으면 채울 수 없는 인덱스를 영원히 기다리게 된다.
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        if frame.chunk_size == 0 || frame.chunk_size > (MAX_DATAGRAM - HEADER_LEN) as u64 {
            return Err(Error::InvalidField {
                field: "chunk_size",
                value: frame.chunk_size.to_string(),
            });
        }
        let expected = frame.total_length.div_ceil(frame.chunk_size);
        if frame.chunk_count != expected {
            return Err(Error::TransferMismatch(format!(
                "chunk_count {} != {} ({} bytes / {})",
                frame.chunk_count, expected, frame.total_length, frame.chunk_size
            )));
        }
        let plan = Self {
            filename: frame.filename.clone(),
            total_length: frame.total_length,
            chunk_size: frame.chunk_size,
            chunk_count: frame.chunk_count,
        };
        frame.validate_against(&plan)?;
        Ok(plan)
    }

    /// 청크 시작 오프셋
    pub fn offset(&self, index: u64) -> u64 {
        index * self.chunk_size
    }

    /// 청크 길이 (마지막 청크는 더 짧을 수 있음)
    pub fn chunk_len(&self, index: u64) -> usize {
        let start = self.offset(index).min(self.total_length);
        let end = (start + self.chunk_size).min(self.total_length);
        (end - start) as usize
    }

    /// payload 길이는 해당 청크 길이와 정확히 같아야 함
    pub fn check_payload(&self, index: u64, len: usize) -> Result<()> {
        if len != self.chunk_len(index) {
            return Err(Error::InvalidField {
                field: "payload",
                value: format!("{} bytes for chunk {} (expected {})", len, index, self.chunk_len(index)),
            });
        }
        Ok(())
    }

    /// 공통 헤더를 채운 데이터 프레임 생성
    pub fn build_frame(&self, index: u64, payload: Bytes) -> DataFrame {
        DataFrame {
            total_length: self.total_length,
            filename: self.filename.clone(),
            chunk_size: self.chunk_size,
            chunk_count: self.chunk_count,
            index,
            payload,
            sender: None,
        }
    }
}

/// 송신측 원본 파일 리더
pub struct ChunkReader {
    file: Mutex<File>,
    plan: ChunkPlan,
}

impl ChunkReader {
    pub fn open(path: &Path, plan: ChunkPlan) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            file: Mutex::new(file),
            plan,
        })
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// `index` 번 청크 읽기
    pub fn read_chunk(&self, index: u64) -> Result<Bytes> {
        let mut buf = vec![0u8; self.plan.chunk_len(index)];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.plan.offset(index)))?;
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// 프레임 인코딩까지 포함
    pub fn read_frame(&self, index: u64) -> Result<Vec<u8>> {
        let payload = self.read_chunk(index)?;
        Ok(self.plan.build_frame(index, payload).to_bytes())
    }
}

/// 수신측 출력 파일 라이터
///
/// 여러 태스크가 서로 다른 오프셋에 쓰므로 seek+write 를 한 락 안에서 수행.
pub struct ChunkWriter {
    file: Mutex<File>,
    path: PathBuf,
    plan: ChunkPlan,
}

impl ChunkWriter {
    /// 파일 생성 후 전체 길이만큼 0으로 채움
    pub fn create(path: &Path, plan: ChunkPlan) -> Result<Self> {
        let open = || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.set_len(plan.total_length)?;
            Ok(file)
        };
        let file = open().map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            plan,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `index` 번 청크 위치에 기록. 같은 내용의 중복 기록은 무해함.
    ///
    /// 길이가 다른 payload 는 기록하지 않는다 (0으로 남은 구간이 완료로 보이지 않게).
    pub fn write_chunk(&self, index: u64, payload: &[u8]) -> Result<()> {
        if index >= self.plan.chunk_count {
            return Err(Error::IndexOutOfRange {
                index,
                chunk_count: self.plan.chunk_count,
            });
        }
        self.plan.check_payload(index, payload.len())?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.plan.offset(index)))?;
        file.write_all(payload)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

/// 파일 전체 CRC32 (수신 완료 후 로그/리포트용)
pub fn file_checksum(path: &Path) -> Result<u32> {
    let mut file = File::open(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN: &[u8] = b"                   5                                                                                                fake     60000         1         1hello";

    #[test]
    fn test_pad_left() {
        assert_eq!(pad_left("hello", 5), "hello");
        assert_eq!(pad_left("hello", 3), "hello");
        assert_eq!(pad_left("hello", 8), "   hello");
        assert_eq!(pad_left("1089", 10), "      1089");
    }

    #[test]
    fn test_golden_frame() {
        let plan = ChunkPlan::new("fake", 5, 60000);
        assert_eq!(plan.chunk_count, 1);

        let bytes = plan.build_frame(1, Bytes::from_static(b"hello")).to_bytes();
        assert_eq!(bytes.len(), 155);
        assert_eq!(bytes, GOLDEN);
    }

    #[test]
    fn test_frame_serialization() {
        let frame = ChunkPlan::new("1.txt", 12, 1234).build_frame(0, Bytes::from_static(b"data"));
        let restored = DataFrame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(frame, restored);

        let decoded = DataFrame::from_bytes(GOLDEN).unwrap();
        assert_eq!(decoded.filename, "fake");
        assert_eq!(decoded.total_length, 5);
        assert_eq!(decoded.index, 1);
        assert_eq!(decoded.payload.as_ref(), b"hello");
    }

    #[test]
    fn test_too_short() {
        for len in [0usize, 1, 14, 149, 150] {
            let data = vec![b' '; len];
            assert!(matches!(
                DataFrame::from_bytes(&data),
                Err(Error::FrameTooShort { .. })
            ));
        }
    }

    #[test]
    fn test_invalid_field() {
        let mut bytes = GOLDEN.to_vec();
        bytes[145] = b'x';
        match DataFrame::from_bytes(&bytes) {
            Err(Error::InvalidField { field, .. }) => assert_eq!(field, "index"),
            other => panic!("unexpected: {other:?}"),
        }

        let mut bytes = GOLDEN.to_vec();
        bytes[0] = b'-';
        assert!(DataFrame::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_plan_counts() {
        assert_eq!(ChunkPlan::new("a", 0, 100).chunk_count, 0);
        assert_eq!(ChunkPlan::new("a", 1, 100).chunk_count, 1);
        assert_eq!(ChunkPlan::new("a", 100, 100).chunk_count, 1);
        assert_eq!(ChunkPlan::new("a", 101, 100).chunk_count, 2);
        assert_eq!(ChunkPlan::new("a", 250, 100).chunk_count, 3);

        let plan = ChunkPlan::new("a", 250, 100);
        assert_eq!(plan.chunk_len(0), 100);
        assert_eq!(plan.chunk_len(2), 50);
        assert_eq!(plan.offset(2), 200);

        for (total, size) in [(0u64, 7u64), (1, 7), (7, 7), (8, 7), (60001, 60000)] {
            assert_eq!(ChunkPlan::new("a", total, size).chunk_count, total.div_ceil(size));
        }
    }

    #[test]
    fn test_validate_against() {
        let plan = ChunkPlan::new("a", 250, 100);
        let full = Bytes::from(vec![7u8; 100]);
        assert!(plan.build_frame(1, full.clone()).validate_against(&plan).is_ok());
        assert!(plan
            .build_frame(2, full.slice(..50))
            .validate_against(&plan)
            .is_ok());
        assert!(matches!(
            plan.build_frame(3, full.slice(..50)).validate_against(&plan),
            Err(Error::IndexOutOfRange { .. })
        ));

        let other = ChunkPlan::new("b", 250, 100);
        assert!(matches!(
            other.build_frame(0, full).validate_against(&plan),
            Err(Error::TransferMismatch(_))
        ));
    }

    #[test]
    fn test_payload_length_must_match_chunk() {
        let plan = ChunkPlan::new("s.txt", 10, 4);
        for (index, payload) in [(0u64, &b"ab"[..]), (1, b"efghi"), (2, b"i")] {
            match plan
                .build_frame(index, Bytes::copy_from_slice(payload))
                .validate_against(&plan)
            {
                Err(Error::InvalidField { field, .. }) => assert_eq!(field, "payload"),
                other => panic!("unexpected: {other:?}"),
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let writer = ChunkWriter::create(&dir.path().join("s.txt"), plan).unwrap();
        assert!(writer.write_chunk(0, b"ab").is_err());
        writer.write_chunk(0, b"abcd").unwrap();
    }

    #[test]
    fn test_from_frame_rejects_inconsistent_header() {
        // 청크 수가 길이/크기와 맞지 않음
        let mut frame = ChunkPlan::new("fake", 5, 60000).build_frame(0, Bytes::from_static(b"hello"));
        frame.chunk_count = 9_999_999_999;
        assert!(matches!(
            ChunkPlan::from_frame(&frame),
            Err(Error::TransferMismatch(_))
        ));

        let mut frame = ChunkPlan::new("s.txt", 10, 4).build_frame(0, Bytes::from_static(b"abcd"));
        frame.chunk_count = 5;
        assert!(ChunkPlan::from_frame(&frame).is_err());

        // UDP 에 실을 수 없는 청크 크기
        let frame = DataFrame {
            chunk_size: 70000,
            chunk_count: 1,
            ..ChunkPlan::new("big", 1, 1).build_frame(0, Bytes::from_static(b"x"))
        };
        assert!(matches!(
            ChunkPlan::from_frame(&frame),
            Err(Error::InvalidField { field: "chunk_size", .. })
        ));

        let frame = ChunkPlan::new("s.txt", 10, 4).build_frame(2, Bytes::from_static(b"ij"));
        assert_eq!(ChunkPlan::from_frame(&frame).unwrap(), ChunkPlan::new("s.txt", 10, 4));
    }

    #[test]
    fn test_reader_writer() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let data: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
        std::fs::write(&src, &data).unwrap();

        let plan = ChunkPlan::for_file(&src, 100).unwrap();
        assert_eq!(plan.filename, "src.bin");
        assert_eq!(plan.chunk_count, 3);

        let reader = ChunkReader::open(&src, plan.clone()).unwrap();
        let dst = dir.path().join("dst.bin");
        let writer = ChunkWriter::create(&dst, plan.clone()).unwrap();
        assert_eq!(std::fs::metadata(&dst).unwrap().len(), 250);

        // 역순 + 중복 기록
        for index in [2, 1, 0, 1] {
            let chunk = reader.read_chunk(index).unwrap();
            writer.write_chunk(index, &chunk).unwrap();
        }
        writer.sync().unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), data);

        assert!(writer.write_chunk(3, b"x").is_err());
        assert!(writer.write_chunk(2, &[0u8; 51]).is_err());
        assert_eq!(file_checksum(writer.path()).unwrap(), crc32fast::hash(&data));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ChunkPlan::for_file(&missing, 100),
            Err(Error::FileOpen { .. })
        ));
    }
}
