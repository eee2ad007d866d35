//! LAN 피어 탐색
//!
//! 수신자는 각 로컬 주소의 서브넷 브로드캐스트로 "hello" 를 주기적으로 보내고,
//! 송신자는 탐색 포트에서 첫 "hello" 를 받아 상대 IP 를 알아낸다.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Config, Error, Result};

/// 브로드캐스트 payload
pub const HELLO: &[u8] = b"hello";

/// 외부로 나가는 로컬 IPv4 주소 (loopback, link-local, unspecified 제외)
///
/// 연결된 UDP 소켓의 로컬 주소로 라우팅 결과를 얻는다. 실제 패킷은 나가지 않음.
/// 기본 경로의 주소 하나만 나오므로 여러 NIC 호스트의 보조 서브넷은 빠진다.
/// 그런 주소는 호출측이 [`broadcast_addrs`] 에 직접 넘긴다.
pub fn local_ipv4_addrs() -> Vec<Ipv4Addr> {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(IpAddr::V4(ip)) if is_lan_addr(ip) => vec![ip],
        Ok(ip) => {
            debug!("브로드캐스트 불가 주소: {}", ip);
            Vec::new()
        }
        Err(e) => {
            warn!("로컬 주소 확인 실패: {}", e);
            Vec::new()
        }
    }
}

/// 브로드캐스트할 주소 목록: 기본 경로 주소 + 추가 주소 (중복/부적합 주소 제외)
pub fn broadcast_addrs(extra: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let mut addrs = local_ipv4_addrs();
    for &ip in extra {
        if !is_lan_addr(ip) {
            warn!("브로드캐스트에 쓸 수 없는 주소 무시: {}", ip);
        } else if !addrs.contains(&ip) {
            addrs.push(ip);
        }
    }
    addrs
}

fn is_lan_addr(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified()
}

/// `/24` 서브넷 브로드캐스트 주소 (마지막 옥텟 255)
pub fn broadcast_addr(ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 255)
}

/// 주기적 브로드캐스트 (수신자 측)
pub struct Broadcaster {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Broadcaster {
    /// 주소마다 브로드캐스트 태스크 시작. tokio 런타임 안에서 호출해야 함.
    pub fn start(config: &Config, addrs: &[Ipv4Addr]) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = addrs
            .iter()
            .map(|&addr| {
                let target = SocketAddr::new(broadcast_addr(addr).into(), config.discovery_port);
                tokio::spawn(broadcast_loop(
                    addr,
                    target,
                    config.broadcast_interval,
                    stop_rx.clone(),
                ))
            })
            .collect();

        Self { stop_tx, tasks }
    }

    pub fn cancel(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// 취소 후 모든 태스크 종료 대기
    pub async fn shutdown(mut self) {
        self.cancel();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn broadcast_loop(
    local: Ipv4Addr,
    target: SocketAddr,
    interval: std::time::Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let socket = match UdpSocket::bind((local, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("브로드캐스트 소켓 생성 실패 ({}): {}", local, e);
            return;
        }
    };
    if let Err(e) = socket.set_broadcast(true) {
        warn!("SO_BROADCAST 설정 실패 ({}): {}", local, e);
        return;
    }
    info!("브로드캐스트 시작: {} → {}", local, target);

    loop {
        let stopped = *stop_rx.borrow();
        if stopped {
            break;
        }
        if let Err(e) = socket.send_to(HELLO, target).await {
            debug!("브로드캐스트 전송 실패 ({}): {}", target, e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("브로드캐스트 종료: {}", local);
}

/// 탐색 포트에서 첫 "hello" 를 보낸 피어 IP. 타임아웃 없음.
pub async fn discover_peer(port: u16) -> Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    info!("피어 탐색 대기: {}", socket.local_addr()?);
    wait_hello(&socket).await
}

async fn wait_hello(socket: &UdpSocket) -> Result<IpAddr> {
    let mut buf = [0u8; 64];
    loop {
        let (len, addr) = socket.recv_from(&mut buf).await?;
        if &buf[..len] == HELLO {
            info!("피어 발견: {}", addr.ip());
            return Ok(addr.ip());
        }
        debug!("탐색 포트의 다른 패킷 무시 ({}, {} bytes)", addr, len);
    }
}

/// 대상 문자열을 피어 IP 로 변환. 없거나 "discover" 면 브로드캐스트 탐색.
pub async fn resolve_peer(target: Option<&str>, config: &Config) -> Result<IpAddr> {
    match target {
        None | Some("discover") => discover_peer(config.discovery_port).await,
        Some(text) => text
            .parse::<IpAddr>()
            .map_err(|_| Error::InvalidConfig(format!("잘못된 대상 주소: {}", text))),
    }
}
