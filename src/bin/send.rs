//! 파일 송신
//!
//! 대상 주소를 주지 않으면 LAN 브로드캐스트로 수신자를 찾는다.
//!
//! 사용법:
//!   cargo run --release --bin transfer-send -- <FILE> [TARGET] [OPTIONS]
//!
//! 예시:
//!   # 같은 서브넷의 transfer-wait 자동 탐색
//!   cargo run --release --bin transfer-send -- movie.mkv
//!
//!   # 주소 직접 지정
//!   cargo run --release --bin transfer-send -- movie.mkv 192.168.0.10 -p 3000

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use transfer::{progress_channel, resolve_peer, Config, Error, Sender};

/// 송신 설정
struct SendArgs {
    file: PathBuf,
    target: Option<String>,
    config: Config,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> transfer::Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidConfig(format!("{} 값이 필요함", flag)))
}

fn number<T: std::str::FromStr>(text: &str, flag: &str) -> transfer::Result<T> {
    text.parse()
        .map_err(|_| Error::InvalidConfig(format!("{}: 유효한 숫자 필요 ({})", flag, text)))
}

fn print_help() {
    println!(
        r#"transfer-send - UDP 파일 송신

사용법:
  transfer-send <FILE> [TARGET] [OPTIONS]

인자:
  <FILE>                  보낼 파일
  [TARGET]                수신자 IP, 생략하거나 "discover" 면 브로드캐스트 탐색

옵션:
  -p, --port <PORT>       수신자 포트 (기본: 3000)
  --chunk-size <SIZE>     청크 크기 바이트 (기본: macOS 9000, 그 외 60000)
  -h, --help              이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
"#
    );
}

fn parse_args() -> transfer::Result<SendArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                config.port = number(value(&args, i, "--port")?, "--port")?;
                i += 1;
            }
            "--chunk-size" => {
                config.chunk_size = number(value(&args, i, "--chunk-size")?, "--chunk-size")?;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => {
                return Err(Error::InvalidConfig(format!("알 수 없는 옵션: {}", flag)));
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let file = positional
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| Error::InvalidConfig("보낼 파일 이름이 필요함".into()))?;
    let target = positional.next();

    Ok(SendArgs {
        file,
        target,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    args.config.validate()?;

    let ip = resolve_peer(args.target.as_deref(), &args.config).await?;
    let peer = SocketAddr::new(ip, args.config.port);
    info!("대상: {}", peer);

    let (progress, lines) = progress_channel();
    let printer = std::thread::spawn(move || {
        for line in lines {
            println!("{}", line);
        }
    });

    let report = Sender::new(args.config, peer)
        .with_progress(progress)
        .send_file(&args.file)
        .await;
    let _ = printer.join();
    let report = report?;

    info!(
        "전송 완료: {} ({} bytes), {:.2}s, 재전송 {}",
        report.plan.filename,
        report.plan.total_length,
        report.elapsed.as_secs_f64(),
        report.stats.retransmits
    );
    Ok(())
}
