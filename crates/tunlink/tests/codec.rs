//! Control-message codec laws over hand-framed kernel buffers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tunlink::cmsg::{
    CMSG_HDRLEN, CONTROL_SIZE, CmsgHdr, CmsgIter, ControlBuffer, ControlPool, Endpoint,
    GSO_SPACE, cmsg_len, cmsg_space, extract_gso_size, extract_source, inject_gso_size, inject_source,
};

/// Frame one record the way the kernel does: header, payload, zero padding.
fn record(level: i32, kind: i32, payload: &[u8]) -> Vec<u8> {
    let mut buf = CmsgHdr::new(level, kind, payload.len()).as_bytes().to_vec();
    buf.resize(CMSG_HDRLEN, 0);
    buf.extend_from_slice(payload);
    buf.resize(cmsg_space(payload.len()), 0);
    buf
}

fn pktinfo_v4(ifindex: i32, spec_dst: Ipv4Addr, addr: Ipv4Addr) -> Vec<u8> {
    let mut payload = ifindex.to_ne_bytes().to_vec();
    payload.extend_from_slice(&spec_dst.octets());
    payload.extend_from_slice(&addr.octets());
    record(libc::IPPROTO_IP, libc::IP_PKTINFO, &payload)
}

fn pktinfo_v6(addr: Ipv6Addr, ifindex: u32) -> Vec<u8> {
    let mut payload = addr.octets().to_vec();
    payload.extend_from_slice(&ifindex.to_ne_bytes());
    record(libc::IPPROTO_IPV6, libc::IPV6_PKTINFO, &payload)
}

fn peer() -> Endpoint {
    Endpoint::new(SocketAddr::from(([198, 51, 100, 7], 51820)))
}

#[test]
fn test_source_round_trip() {
    let buffers = [
        pktinfo_v4(2, Ipv4Addr::new(192, 0, 2, 10), Ipv4Addr::new(192, 0, 2, 255)),
        pktinfo_v4(i32::MAX, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::UNSPECIFIED),
        pktinfo_v6("2001:db8::10".parse().unwrap(), 4),
        pktinfo_v6(Ipv6Addr::LOCALHOST, 1),
    ];

    for original in buffers {
        let mut ep = peer();
        extract_source(&original, &mut ep);
        assert!(ep.src_ip().is_some());

        let mut out = ControlBuffer::new(original.len());
        assert!(inject_source(&mut out, &ep));
        assert_eq!(out.bytes(), &original[..]);
    }
}

#[test]
fn test_source_round_trip_as_received() {
    // The kernel leaves out trailing padding when the buffer ends at the
    // record's length.
    let mut unpadded = pktinfo_v4(2, Ipv4Addr::new(192, 0, 2, 10), Ipv4Addr::LOCALHOST);
    unpadded.truncate(cmsg_len(12));

    // Padding the kernel did not overwrite in a reused buffer.
    let mut stale = pktinfo_v4(3, Ipv4Addr::new(192, 0, 2, 11), Ipv4Addr::LOCALHOST);
    stale[cmsg_len(12)..].fill(0xaa);

    for original in [unpadded, stale] {
        let mut received = ControlBuffer::new(original.len());
        received.capacity_mut().copy_from_slice(&original);
        received.set_len(original.len()).unwrap();

        let mut ep = peer();
        extract_source(received.bytes(), &mut ep);
        assert!(ep.src_ip().is_some());

        let mut out = ControlBuffer::new(original.len());
        assert!(inject_source(&mut out, &ep));
        assert_eq!(out.bytes(), &original[..]);
    }
}

#[test]
fn test_received_buffer_with_gro() {
    let mut control = ControlBuffer::recommended();
    let mut received = pktinfo_v6("2001:db8::10".parse().unwrap(), 4);
    received.extend(record(libc::SOL_UDP, libc::UDP_GRO, &1452u16.to_ne_bytes()));

    control.capacity_mut()[..received.len()].copy_from_slice(&received);
    control.set_len(received.len()).unwrap();
    assert_eq!(CmsgIter::new(control.bytes()).count(), 2);

    let mut ep = peer();
    extract_source(control.bytes(), &mut ep);
    assert_eq!(ep.src_ip(), Some(IpAddr::V6("2001:db8::10".parse().unwrap())));
    assert_eq!(ep.src_ifindex(), 4);
    assert_eq!(extract_gso_size(control.bytes()).unwrap(), 1452);
}

#[test]
fn test_send_buffer_source_then_segment() {
    let mut ep = peer();
    extract_source(&pktinfo_v6(Ipv6Addr::LOCALHOST, 1), &mut ep);

    let mut control = ControlBuffer::recommended();
    assert!(inject_source(&mut control, &ep));
    assert!(inject_gso_size(&mut control, 1200));
    assert_eq!(control.len(), CONTROL_SIZE);

    let kinds: Vec<_> = CmsgIter::new(control.bytes())
        .map(|c| c.map(|c| (c.level, c.kind)))
        .collect::<tunlink::Result<_>>()
        .unwrap();
    assert_eq!(
        kinds,
        [
            (libc::IPPROTO_IPV6, libc::IPV6_PKTINFO),
            (libc::SOL_UDP, libc::UDP_SEGMENT),
        ]
    );
    assert_eq!(control.remaining(), 0);
}

#[test]
fn test_gso_hint_laws() {
    assert_eq!(extract_gso_size(&pktinfo_v4(1, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST)).unwrap(), 0);
    assert_eq!(
        extract_gso_size(&record(libc::SOL_UDP, libc::UDP_GRO, &u16::MAX.to_ne_bytes())).unwrap(),
        u16::MAX
    );
    assert!(
        extract_gso_size(&record(libc::SOL_UDP, libc::UDP_GRO, &[7]))
            .unwrap_err()
            .is_parse_error()
    );

    let mut full = ControlBuffer::new(GSO_SPACE + 3);
    full.set_len(4).unwrap();
    full.spare_mut().fill(0xab);
    let before = full.bytes().to_vec();
    assert!(!inject_gso_size(&mut full, 1400));
    assert_eq!(full.len(), 4);
    assert_eq!(full.bytes(), &before[..]);
}

#[tokio::test]
async fn test_pool_shared_between_tasks() {
    let pool = Arc::new(ControlPool::default());
    let mut tasks = Vec::new();
    for i in 0..4u16 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            let mut buf = pool.get();
            assert!(buf.is_empty());
            assert!(inject_gso_size(&mut buf, 1000 + i));
            pool.put(buf);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert!(pool.idle() >= 1);
    assert!(pool.get().is_empty());
}
