//! 파일 수신 대기
//!
//! 로컬 서브넷에 자신을 브로드캐스트하면서 파일 하나를 받는다.
//!
//! 사용법:
//!   cargo run --release --bin transfer-wait -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin transfer-wait -- -o ~/Downloads
//!   cargo run --release --bin transfer-wait -- -l 192.168.0.10 -p 3001

use std::net::Ipv4Addr;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use transfer::discovery::broadcast_addrs;
use transfer::{progress_channel, Broadcaster, Config, Error, Receiver};

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> transfer::Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidConfig(format!("{} 값이 필요함", flag)))
}

fn print_help() {
    println!(
        r#"transfer-wait - UDP 파일 수신

사용법:
  transfer-wait [OPTIONS]

옵션:
  -p, --port <PORT>       수신 포트 (기본: 3000)
  -l, --listen <ADDR>     바인드 주소 (기본: 0.0.0.0)
  -o, --output <DIR>      저장 디렉터리 (기본: 현재 디렉터리)
  -b, --broadcast-from <ADDR>
                          추가로 브로드캐스트할 로컬 IPv4 주소 (여러 번 지정 가능,
                          기본 경로 외 서브넷용)
  --chunk-size <SIZE>     청크 크기 바이트 (수신에는 헤더 값이 쓰임)
  -h, --help              이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
"#
    );
}

/// 수신 설정
struct WaitArgs {
    config: Config,
    broadcast_from: Vec<Ipv4Addr>,
}

fn parse_args() -> transfer::Result<WaitArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut broadcast_from = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                let text = value(&args, i, "--port")?;
                config.port = text
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("잘못된 포트: {}", text)))?;
                i += 1;
            }
            "--listen" | "-l" => {
                let text = value(&args, i, "--listen")?;
                config.listen_addr = text
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("잘못된 주소: {}", text)))?;
                i += 1;
            }
            "--broadcast-from" | "-b" => {
                let text = value(&args, i, "--broadcast-from")?;
                broadcast_from.push(
                    text.parse::<Ipv4Addr>()
                        .map_err(|_| Error::InvalidConfig(format!("잘못된 IPv4 주소: {}", text)))?,
                );
                i += 1;
            }
            "--output" | "-o" => {
                config.output_dir = PathBuf::from(value(&args, i, "--output")?);
                i += 1;
            }
            "--chunk-size" => {
                let text = value(&args, i, "--chunk-size")?;
                config.chunk_size = text
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("잘못된 청크 크기: {}", text)))?;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                return Err(Error::InvalidConfig(format!("알 수 없는 인자: {}", other)));
            }
        }
        i += 1;
    }

    Ok(WaitArgs {
        config,
        broadcast_from,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let WaitArgs {
        config,
        broadcast_from,
    } = parse_args()?;

    let (progress, lines) = progress_channel();
    let printer = std::thread::spawn(move || {
        for line in lines {
            println!("{}", line);
        }
    });

    let receiver = Receiver::new(config.clone()).with_progress(progress).bind().await?;

    let addrs = broadcast_addrs(&broadcast_from);
    if addrs.is_empty() {
        info!("브로드캐스트할 주소 없음, 송신측에서 주소를 직접 지정해야 함");
    }
    let broadcaster = Broadcaster::start(&config, &addrs);

    let report = receiver.receive().await;
    broadcaster.shutdown().await;
    let _ = printer.join();
    let report = report?;

    info!(
        "수신 완료: {} ({} bytes) from {}, {:.2}s, crc32 {:08x}, 누락 요청 {}",
        report.path.display(),
        report.plan.total_length,
        report.peer,
        report.elapsed.as_secs_f64(),
        report.checksum,
        report.stats.missing_requested
    );
    Ok(())
}
